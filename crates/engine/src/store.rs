//! Durable storage for persistent job state.

use std::collections::HashMap;
use std::sync::RwLock;

use tasklift_core::{JobSnapshot, PersistentId};

/// Store error surface.
///
/// `update` failures are load-bearing: the consumer cancels a deferred job
/// rather than re-queueing it with stale persisted state.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("serialization failed: {0}")]
    Serialization(String),
    #[error("storage I/O failed: {0}")]
    Io(String),
}

/// Crash-recovery persistence for job state.
///
/// The engine writes snapshots on deferral and removes records on terminal
/// outcomes. Encoding and medium are the implementation's concern.
pub trait DurableStore: Send + Sync {
    /// Create or overwrite the record for this snapshot's identity.
    fn update(&self, snapshot: &JobSnapshot) -> Result<(), StoreError>;

    /// Remove the record. Removing an absent identity succeeds, so terminal
    /// finalization is idempotent.
    fn remove(&self, id: PersistentId) -> Result<(), StoreError>;
}

/// In-memory store keeping JSON-encoded snapshots. For embedding and tests.
#[derive(Debug, Default)]
pub struct InMemoryDurableStore {
    records: RwLock<HashMap<PersistentId, String>>,
}

impl InMemoryDurableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the stored snapshot for `id`, if present.
    pub fn get(&self, id: PersistentId) -> Result<Option<JobSnapshot>, StoreError> {
        let records = self.records.read().unwrap();
        records
            .get(&id)
            .map(|json| {
                serde_json::from_str(json).map_err(|e| StoreError::Serialization(e.to_string()))
            })
            .transpose()
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DurableStore for InMemoryDurableStore {
    fn update(&self, snapshot: &JobSnapshot) -> Result<(), StoreError> {
        let json = serde_json::to_string(snapshot)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.records
            .write()
            .unwrap()
            .insert(snapshot.persistent_id, json);
        Ok(())
    }

    fn remove(&self, id: PersistentId) -> Result<(), StoreError> {
        self.records.write().unwrap().remove(&id);
        Ok(())
    }
}
