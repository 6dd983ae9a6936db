//! Derived manifest statistics
//!
//! Folded once here so that every observer reports the same numbers.

use crate::model::ManifestSnapshot;
use serde::{Deserialize, Serialize};

const BYTES_PER_GIB: u64 = 1024 * 1024 * 1024;

/// Statistics over a manifest snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestStats {
    /// Tracked worlds
    pub world_count: usize,
    /// Tracked files across all worlds
    pub total_tracked_files: usize,
    /// Sum of known file sizes
    pub total_bytes: u64,
    /// Epoch seconds of the last successful sync
    pub last_opened: u64,
}

impl ManifestStats {
    /// Compute statistics for a snapshot
    #[must_use]
    pub fn from_snapshot(snapshot: &ManifestSnapshot) -> Self {
        Self {
            world_count: snapshot.world_count(),
            total_tracked_files: snapshot.total_tracked_files(),
            total_bytes: snapshot.total_bytes(),
            last_opened: snapshot.last_opened,
        }
    }

    /// Space used, rounded to whole GiB
    #[inline]
    #[must_use]
    pub fn total_gib(&self) -> u64 {
        (self.total_bytes + BYTES_PER_GIB / 2) / BYTES_PER_GIB
    }

    /// One-line status suitable for a startup banner
    ///
    /// `manifest_found` says whether a manifest has been persisted at all. A
    /// persisted manifest that tracks no worlds still counts as found.
    #[must_use]
    pub fn status_message(&self, manifest_found: bool) -> String {
        if !manifest_found {
            "No manifest found. Start an upload to create tracking data.".to_string()
        } else {
            format!(
                "Existing manifest found. Tracking {} files.",
                self.total_tracked_files
            )
        }
    }
}
