//! Manifest persistence
//!
//! [`ManifestStore`] is the contract the orchestrator writes through:
//! - `load` returns an empty snapshot when nothing has been persisted
//! - a failed `save` leaves the previously persisted snapshot intact
//!
//! Implementations:
//! - [`JsonFileStore`]: JSON file, written to a temporary sibling and renamed
//! - [`MemoryStore`]: in-process store for embedding and tests

use crate::error::ManifestError;
use crate::model::ManifestSnapshot;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// File name used for the manifest inside a save root
pub const MANIFEST_FILE_NAME: &str = ".cloud_save_manifest.json";

/// Default manifest location for a save root
#[inline]
#[must_use]
pub fn manifest_file_path(save_root: &Path) -> PathBuf {
    save_root.join(MANIFEST_FILE_NAME)
}

/// Persisted key-value home of the manifest snapshot
#[async_trait]
pub trait ManifestStore: Send + Sync {
    /// Load the persisted snapshot, or an empty one if none exists
    async fn load(&self) -> Result<ManifestSnapshot, ManifestError>;

    /// Replace the persisted snapshot
    ///
    /// Must not corrupt the previous snapshot on failure.
    async fn save(&self, snapshot: &ManifestSnapshot) -> Result<(), ManifestError>;

    /// Whether a snapshot has been persisted, empty ones included
    async fn exists(&self) -> Result<bool, ManifestError>;
}

/// JSON file store with write-new-then-swap saves
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Store backed by the file at `path`
    #[inline]
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the default location inside `save_root`
    #[inline]
    #[must_use]
    pub fn in_save_root(save_root: &Path) -> Self {
        Self::new(manifest_file_path(save_root))
    }

    /// Manifest file path
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl ManifestStore for JsonFileStore {
    async fn load(&self) -> Result<ManifestSnapshot, ManifestError> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no manifest persisted yet");
                return Ok(ManifestSnapshot::empty());
            }
            Err(e) => return Err(ManifestError::io(&self.path, e)),
        };

        let snapshot: ManifestSnapshot = serde_json::from_str(&text)?;
        tracing::debug!(
            path = %self.path.display(),
            worlds = snapshot.world_count(),
            "loaded manifest"
        );
        Ok(snapshot)
    }

    async fn save(&self, snapshot: &ManifestSnapshot) -> Result<(), ManifestError> {
        let json = serde_json::to_string_pretty(snapshot)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ManifestError::io(parent, e))?;
        }

        let temp = self.temp_path();
        let write = async {
            let mut file = tokio::fs::File::create(&temp).await?;
            file.write_all(json.as_bytes()).await?;
            file.sync_all().await?;
            tokio::fs::rename(&temp, &self.path).await
        };

        if let Err(e) = write.await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(ManifestError::io(&self.path, e));
        }

        tracing::debug!(path = %self.path.display(), "saved manifest");
        Ok(())
    }

    async fn exists(&self) -> Result<bool, ManifestError> {
        match tokio::fs::metadata(&self.path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(ManifestError::io(&self.path, e)),
        }
    }
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    persisted: Mutex<Option<ManifestSnapshot>>,
    saves: Mutex<usize>,
}

impl MemoryStore {
    /// Empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that already holds `snapshot`
    #[inline]
    #[must_use]
    pub fn with_snapshot(snapshot: ManifestSnapshot) -> Self {
        Self {
            persisted: Mutex::new(Some(snapshot)),
            saves: Mutex::new(0),
        }
    }

    /// Currently persisted snapshot, if any
    #[inline]
    #[must_use]
    pub fn persisted(&self) -> Option<ManifestSnapshot> {
        self.persisted.lock().clone()
    }

    /// Number of successful saves
    #[inline]
    #[must_use]
    pub fn save_count(&self) -> usize {
        *self.saves.lock()
    }
}

#[async_trait]
impl ManifestStore for MemoryStore {
    async fn load(&self) -> Result<ManifestSnapshot, ManifestError> {
        Ok(self.persisted.lock().clone().unwrap_or_default())
    }

    async fn save(&self, snapshot: &ManifestSnapshot) -> Result<(), ManifestError> {
        *self.persisted.lock() = Some(snapshot.clone());
        *self.saves.lock() += 1;
        Ok(())
    }

    async fn exists(&self) -> Result<bool, ManifestError> {
        Ok(self.persisted.lock().is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FileRecord, WorldEntry, WorldName};
    use pretty_assertions::assert_eq;

    fn sample() -> ManifestSnapshot {
        let alpha = WorldName::parse("Alpha").unwrap();
        ManifestSnapshot::empty()
            .with_world(
                WorldEntry::new(alpha.clone())
                    .with_file("save.dat", FileRecord::new(&alpha, 10, 1000)),
            )
            .with_last_opened(1_700_000_000)
            .with_bucket("bucket")
    }

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::in_save_root(dir.path());
        assert_eq!(store.load().await.unwrap(), ManifestSnapshot::empty());
    }

    #[tokio::test]
    async fn exists_follows_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::in_save_root(dir.path());
        assert!(!store.exists().await.unwrap());

        store.save(&ManifestSnapshot::empty()).await.unwrap();
        assert!(store.exists().await.unwrap());
        assert_eq!(
            store.load().await.unwrap().stats().status_message(true),
            "Existing manifest found. Tracking 0 files."
        );
    }

    #[tokio::test]
    async fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::in_save_root(dir.path());

        store.save(&sample()).await.unwrap();
        assert_eq!(store.load().await.unwrap(), sample());
        assert!(!store.temp_path().exists());
    }

    #[tokio::test]
    async fn save_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested/deeper/manifest.json"));

        store.save(&sample()).await.unwrap();
        assert!(store.path().exists());
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error_not_a_reset() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::in_save_root(dir.path());
        std::fs::write(store.path(), "{ not json").unwrap();

        let err = store.load().await.unwrap_err();
        assert!(err.is_persistence());
    }

    #[tokio::test]
    async fn failed_save_keeps_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::in_save_root(dir.path());
        store.save(&sample()).await.unwrap();

        // A directory squatting on the temp path makes File::create fail.
        std::fs::create_dir(store.temp_path()).unwrap();
        let next = sample().with_last_opened(1);
        assert!(store.save(&next).await.is_err());

        assert_eq!(store.load().await.unwrap(), sample());
    }

    #[tokio::test]
    async fn memory_store_counts_saves() {
        let store = MemoryStore::new();
        assert_eq!(store.load().await.unwrap(), ManifestSnapshot::empty());
        assert!(!store.exists().await.unwrap());

        store.save(&sample()).await.unwrap();
        assert_eq!(store.save_count(), 1);
        assert_eq!(store.persisted(), Some(sample()));
    }
}
