//! Change sets
//!
//! Provides [`diff`], which partitions the union of previous and current paths
//! into four disjoint sets.

use crate::scan::ScannedFile;
use savesync_manifest::WorldEntry;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Classification of one path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    /// New in the local scan
    Added,
    /// Present in both with a different or unknown previous size
    Modified,
    /// Tracked previously, gone locally
    Removed,
    /// Present in both with the same size
    Unchanged,
}

/// Result of comparing a local scan with the previous manifest entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    /// Paths new in the local scan
    pub added: BTreeSet<String>,
    /// Paths in both whose size differs
    pub modified: BTreeSet<String>,
    /// Paths in the previous entry but not in the scan
    pub removed: BTreeSet<String>,
    /// Everything else
    pub unchanged: BTreeSet<String>,
}

impl ChangeSet {
    /// Whether no transfer is needed
    ///
    /// `unchanged` does not count.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }

    /// Number of paths that need work
    #[inline]
    #[must_use]
    pub fn change_count(&self) -> usize {
        self.added.len() + self.modified.len() + self.removed.len()
    }

    /// Paths whose content must be sent (added then modified)
    #[inline]
    pub fn paths_to_send(&self) -> impl Iterator<Item = &str> {
        self.added.iter().chain(self.modified.iter()).map(String::as_str)
    }

    /// Classification of `path`, if it appeared on either side
    #[must_use]
    pub fn classify(&self, path: &str) -> Option<ChangeKind> {
        if self.added.contains(path) {
            Some(ChangeKind::Added)
        } else if self.modified.contains(path) {
            Some(ChangeKind::Modified)
        } else if self.removed.contains(path) {
            Some(ChangeKind::Removed)
        } else if self.unchanged.contains(path) {
            Some(ChangeKind::Unchanged)
        } else {
            None
        }
    }

    /// Bytes that must be sent, per the sizes in `scan`
    #[must_use]
    pub fn bytes_to_send(&self, scan: &[ScannedFile]) -> u64 {
        scan.iter()
            .filter(|f| self.added.contains(&f.path) || self.modified.contains(&f.path))
            .map(|f| f.size_bytes)
            .sum()
    }
}

/// Compare a local scan with the previous entry of the same world
///
/// Duplicate scan paths collapse to the last occurrence. An absent `previous`
/// means the world was never backed up.
#[must_use]
pub fn diff(local_scan: &[ScannedFile], previous: Option<&WorldEntry>) -> ChangeSet {
    let current: BTreeMap<&str, &ScannedFile> =
        local_scan.iter().map(|f| (f.path.as_str(), f)).collect();

    let mut changes = ChangeSet::default();

    for (path, file) in &current {
        let previous_record = previous.and_then(|entry| entry.get(path));
        let bucket = match previous_record {
            None => &mut changes.added,
            Some(record) => match record.file_size_bytes {
                Some(size) if size == file.size_bytes => &mut changes.unchanged,
                _ => &mut changes.modified,
            },
        };
        bucket.insert((*path).to_string());
    }

    if let Some(entry) = previous {
        changes.removed = entry
            .files()
            .keys()
            .filter(|path| !current.contains_key(path.as_str()))
            .cloned()
            .collect();
    }

    changes
}
