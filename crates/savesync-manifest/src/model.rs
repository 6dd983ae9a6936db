//! Manifest data model
//!
//! Defines the persisted backup state:
//! - [`FileRecord`]: per-file backup metadata
//! - [`WorldEntry`]: one tracked world folder and its files
//! - [`ManifestSnapshot`]: every tracked world plus bucket binding
//!
//! Snapshots are values. Writers derive a new snapshot with the `with_*`
//! methods and publish it whole; nothing is patched in place once shared.

use crate::error::ManifestError;
use crate::name::WorldName;
use crate::stats::ManifestStats;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-file backup metadata
///
/// `file_size_bytes` is the change-detection signal. `None` means the size is
/// unknown and the file is treated as changed on the next upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Owning world, informational only
    pub world_name: String,
    /// Playtime recorded with the save at backup time
    #[serde(rename = "playtime")]
    pub playtime_seconds: u64,
    /// Size at backup time
    #[serde(
        rename = "file_size",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub file_size_bytes: Option<u64>,
}

impl FileRecord {
    /// Create a record with a known size
    #[inline]
    #[must_use]
    pub fn new(world: &WorldName, playtime_seconds: u64, file_size_bytes: u64) -> Self {
        Self {
            world_name: world.to_string(),
            playtime_seconds,
            file_size_bytes: Some(file_size_bytes),
        }
    }

    /// Create a record whose size is not known
    #[inline]
    #[must_use]
    pub fn unsized_record(world: &WorldName, playtime_seconds: u64) -> Self {
        Self {
            world_name: world.to_string(),
            playtime_seconds,
            file_size_bytes: None,
        }
    }

    /// Create a record from signed inputs, rejecting negatives
    ///
    /// # Errors
    /// [`ManifestError::NegativeValue`] if playtime or size is below zero.
    pub fn try_new(
        world: &WorldName,
        playtime_seconds: i64,
        file_size_bytes: Option<i64>,
    ) -> Result<Self, ManifestError> {
        let playtime = u64::try_from(playtime_seconds).map_err(|_| ManifestError::NegativeValue {
            field: "playtime_seconds",
            value: playtime_seconds,
        })?;
        let size = file_size_bytes
            .map(|size| {
                u64::try_from(size).map_err(|_| ManifestError::NegativeValue {
                    field: "file_size_bytes",
                    value: size,
                })
            })
            .transpose()?;

        Ok(Self {
            world_name: world.to_string(),
            playtime_seconds: playtime,
            file_size_bytes: size,
        })
    }

    /// Whether two records describe the same content
    ///
    /// True only when both sizes are known and equal.
    #[inline]
    #[must_use]
    pub fn same_content(&self, other: &Self) -> bool {
        matches!(
            (self.file_size_bytes, other.file_size_bytes),
            (Some(a), Some(b)) if a == b
        )
    }
}

/// One tracked world folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldEntry {
    name: WorldName,
    files: BTreeMap<String, FileRecord>,
}

impl WorldEntry {
    /// Create an entry with no files
    #[inline]
    #[must_use]
    pub fn new(name: WorldName) -> Self {
        Self {
            name,
            files: BTreeMap::new(),
        }
    }

    /// Create an entry from `(relative path, record)` pairs
    ///
    /// Later duplicates of a path replace earlier ones.
    #[must_use]
    pub fn from_files(
        name: WorldName,
        files: impl IntoIterator<Item = (String, FileRecord)>,
    ) -> Self {
        Self {
            name,
            files: files.into_iter().collect(),
        }
    }

    /// Add or replace one file while building an entry
    #[inline]
    #[must_use]
    pub fn with_file(mut self, path: impl Into<String>, record: FileRecord) -> Self {
        self.files.insert(path.into(), record);
        self
    }

    /// World name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &WorldName {
        &self.name
    }

    /// Tracked files keyed by relative path
    #[inline]
    #[must_use]
    pub fn files(&self) -> &BTreeMap<String, FileRecord> {
        &self.files
    }

    /// Look up one file
    #[inline]
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&FileRecord> {
        self.files.get(path)
    }

    /// Number of tracked files
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether no files are tracked
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Sum of known file sizes
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.files
            .values()
            .filter_map(|f| f.file_size_bytes)
            .sum()
    }
}

/// Top-level persisted state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "repr::SnapshotRepr", into = "repr::SnapshotRepr")]
pub struct ManifestSnapshot {
    /// Epoch seconds of the last successful sync
    pub last_opened: u64,
    /// Bucket bound to the current selection
    pub current_used_bucket: String,
    worlds: BTreeMap<WorldName, WorldEntry>,
}

impl ManifestSnapshot {
    /// Empty snapshot (first run)
    #[inline]
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Look up a world by name
    #[inline]
    #[must_use]
    pub fn get_world(&self, name: &str) -> Option<&WorldEntry> {
        self.worlds.get(name)
    }

    /// Whether a world has ever been backed up
    #[inline]
    #[must_use]
    pub fn contains_world(&self, name: &str) -> bool {
        self.worlds.contains_key(name)
    }

    /// Tracked world names, sorted
    #[must_use]
    pub fn list_worlds(&self) -> Vec<&WorldName> {
        self.worlds.keys().collect()
    }

    /// Iterate over all world entries
    #[inline]
    pub fn worlds(&self) -> impl Iterator<Item = &WorldEntry> {
        self.worlds.values()
    }

    /// Number of tracked worlds
    #[inline]
    #[must_use]
    pub fn world_count(&self) -> usize {
        self.worlds.len()
    }

    /// Number of tracked files across every world
    #[must_use]
    pub fn total_tracked_files(&self) -> usize {
        self.worlds.values().map(WorldEntry::len).sum()
    }

    /// Sum of known file sizes across every world
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.worlds.values().map(WorldEntry::total_bytes).sum()
    }

    /// Derived statistics for reporting
    #[inline]
    #[must_use]
    pub fn stats(&self) -> ManifestStats {
        ManifestStats::from_snapshot(self)
    }

    /// New snapshot with `entry` replacing any entry of the same name
    #[must_use]
    pub fn with_world(&self, entry: WorldEntry) -> Self {
        let mut next = self.clone();
        next.worlds.insert(entry.name.clone(), entry);
        next
    }

    /// New snapshot with an updated sync timestamp
    #[inline]
    #[must_use]
    pub fn with_last_opened(mut self, last_opened: u64) -> Self {
        self.last_opened = last_opened;
        self
    }

    /// New snapshot bound to `bucket`
    #[inline]
    #[must_use]
    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.current_used_bucket = bucket.into();
        self
    }

    /// Check that every file record points back at its owning world
    ///
    /// # Errors
    /// [`ManifestError::Inconsistent`] naming the first mismatching record.
    pub fn validate(&self) -> Result<(), ManifestError> {
        for (key, entry) in &self.worlds {
            if key != &entry.name {
                return Err(ManifestError::Inconsistent(format!(
                    "world keyed {key} is named {}",
                    entry.name
                )));
            }
            for (path, record) in &entry.files {
                if record.world_name != key.as_str() {
                    return Err(ManifestError::Inconsistent(format!(
                        "file {path} in world {key} claims world {}",
                        record.world_name
                    )));
                }
            }
        }
        Ok(())
    }
}

/// On-disk layout, kept compatible with existing manifest files
mod repr {
    use super::{FileRecord, ManifestSnapshot, WorldEntry};
    use crate::error::ManifestError;
    use crate::name::WorldName;
    use serde::{Deserialize, Serialize};
    use std::collections::BTreeMap;

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    pub(super) struct UploadManifest {
        #[serde(default)]
        files: BTreeMap<String, FileRecord>,
    }

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    pub(super) struct SnapshotRepr {
        #[serde(default)]
        last_opened: u64,
        #[serde(default)]
        current_used_bucket: String,
        #[serde(default)]
        all_file_info: BTreeMap<String, UploadManifest>,
    }

    impl TryFrom<SnapshotRepr> for ManifestSnapshot {
        type Error = ManifestError;

        fn try_from(value: SnapshotRepr) -> Result<Self, Self::Error> {
            let worlds = value
                .all_file_info
                .into_iter()
                .map(|(key, manifest)| {
                    let name = WorldName::parse(key)?;
                    let entry = WorldEntry::from_files(name.clone(), manifest.files);
                    Ok((name, entry))
                })
                .collect::<Result<_, ManifestError>>()?;

            Ok(Self {
                last_opened: value.last_opened,
                current_used_bucket: value.current_used_bucket,
                worlds,
            })
        }
    }

    impl From<ManifestSnapshot> for SnapshotRepr {
        fn from(value: ManifestSnapshot) -> Self {
            Self {
                last_opened: value.last_opened,
                current_used_bucket: value.current_used_bucket,
                all_file_info: value
                    .worlds
                    .into_iter()
                    .map(|(name, entry)| {
                        (name.into_inner(), UploadManifest { files: entry.files })
                    })
                    .collect(),
            }
        }
    }
}
