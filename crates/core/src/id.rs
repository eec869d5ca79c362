//! Strongly-typed identifiers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identity of a persistent job.
///
/// Assigned when the job is created and unchanged for its lifetime; the
/// durable store keys records by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersistentId(pub Uuid);

impl PersistentId {
    /// Create a new identifier (UUIDv7, time-ordered).
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for PersistentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PersistentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for PersistentId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}
