//! Core types
//!
//! - [`OperationId`]: correlates logs and progress of one operation
//! - [`SyncReport`]: what a successful upload or download did

use crate::state::Operation;
use savesync_detect::ChangeSet;
use savesync_manifest::WorldName;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unique operation identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OperationId(pub Ulid);

impl OperationId {
    /// Generate new operation ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for OperationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of a successful operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Operation ID
    pub operation_id: OperationId,
    /// World synced
    pub world: WorldName,
    /// Direction
    pub operation: Operation,
    /// Upload change set; `None` for downloads
    pub changes: Option<ChangeSet>,
    /// Files sent or received
    pub files_transferred: usize,
    /// Bytes sent or received
    pub bytes_transferred: u64,
    /// Files now tracked for the world
    pub tracked_files: usize,
    /// `last_opened` written by this operation
    pub last_opened: u64,
    /// Wall time in milliseconds
    pub elapsed_ms: u64,
}

impl SyncReport {
    /// Whether the backend was skipped because nothing changed
    #[inline]
    #[must_use]
    pub fn was_noop(&self) -> bool {
        self.changes.as_ref().is_some_and(ChangeSet::is_empty)
    }
}
