//! Local scan results

use savesync_manifest::{FileRecord, WorldEntry, WorldName};
use serde::{Deserialize, Serialize};

/// One file reported by a local scan
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScannedFile {
    /// Path relative to the world folder, `/`-separated
    pub path: String,
    /// Current size on disk
    pub size_bytes: u64,
    /// Playtime associated with the save
    pub playtime_seconds: u64,
}

impl ScannedFile {
    /// Create a scan entry
    #[inline]
    #[must_use]
    pub fn new(path: impl Into<String>, size_bytes: u64, playtime_seconds: u64) -> Self {
        Self {
            path: path.into(),
            size_bytes,
            playtime_seconds,
        }
    }

    /// Manifest record describing this file
    #[inline]
    #[must_use]
    pub fn to_record(&self, world: &WorldName) -> FileRecord {
        FileRecord::new(world, self.playtime_seconds, self.size_bytes)
    }
}

/// Manifest entry that mirrors a scan exactly
///
/// Used as a full replacement after a successful upload, never as a patch.
#[must_use]
pub fn world_entry_from_scan(world: &WorldName, scan: &[ScannedFile]) -> WorldEntry {
    WorldEntry::from_files(
        world.clone(),
        scan.iter().map(|f| (f.path.clone(), f.to_record(world))),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_mirrors_scan() {
        let world = WorldName::parse("Alpha").unwrap();
        let scan = vec![
            ScannedFile::new("save.dat", 1000, 60),
            ScannedFile::new("icon.png", 200, 0),
        ];

        let entry = world_entry_from_scan(&world, &scan);
        assert_eq!(entry.len(), 2);
        let save = entry.get("save.dat").unwrap();
        assert_eq!(save.file_size_bytes, Some(1000));
        assert_eq!(save.playtime_seconds, 60);
        assert_eq!(save.world_name, "Alpha");
    }

    #[test]
    fn empty_scan_gives_empty_entry() {
        let world = WorldName::parse("Alpha").unwrap();
        assert!(world_entry_from_scan(&world, &[]).is_empty());
    }
}
