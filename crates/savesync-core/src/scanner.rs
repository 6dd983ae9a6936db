//! Local scanner contract and the filesystem scanner

use crate::error::ScanError;
use crate::fs;
use async_trait::async_trait;
use savesync_detect::ScannedFile;
use savesync_manifest::{WorldName, MANIFEST_FILE_NAME};
use std::path::{Path, PathBuf};

/// Files of one world folder at scan time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalScan {
    /// Folder that was scanned
    pub world_dir: PathBuf,
    /// Files found, relative to `world_dir`
    pub files: Vec<ScannedFile>,
}

impl LocalScan {
    /// Sum of scanned sizes
    #[inline]
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size_bytes).sum()
    }
}

/// Enumerates the files of a local world folder
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LocalScanner: Send + Sync {
    /// Scan `world`
    ///
    /// # Errors
    /// [`ScanError::NotFound`] when the folder does not exist.
    async fn scan(&self, world: &WorldName) -> Result<LocalScan, ScanError>;

    /// Folder that holds `world` locally
    fn world_dir(&self, world: &WorldName) -> PathBuf;
}

/// Scanner over `<save_root>/<world>`
#[derive(Debug, Clone)]
pub struct FsScanner {
    save_root: PathBuf,
}

impl FsScanner {
    /// Scanner rooted at `save_root`
    #[inline]
    #[must_use]
    pub fn new(save_root: impl Into<PathBuf>) -> Self {
        Self {
            save_root: save_root.into(),
        }
    }

    /// Directory holding the world folders
    #[inline]
    #[must_use]
    pub fn save_root(&self) -> &Path {
        &self.save_root
    }
}

fn is_excluded(key: &str) -> bool {
    let name = key.rsplit('/').next().unwrap_or(key);
    name == MANIFEST_FILE_NAME || name.ends_with(".tmp")
}

#[async_trait]
impl LocalScanner for FsScanner {
    async fn scan(&self, world: &WorldName) -> Result<LocalScan, ScanError> {
        let world_dir = self.world_dir(world);
        let display = world_dir.display().to_string();
        let io_err = |source| ScanError::Io {
            path: display.clone(),
            source,
        };

        if !fs::is_dir(&world_dir).await.map_err(io_err)? {
            return Err(ScanError::NotFound(display.clone()));
        }

        let files: Vec<ScannedFile> = fs::walk(&world_dir)
            .await
            .map_err(io_err)?
            .into_iter()
            .filter(|f| !is_excluded(&f.key))
            .map(|f| ScannedFile::new(f.key, f.size, 0))
            .collect();

        tracing::debug!(world = %world, files = files.len(), "scanned world folder");
        Ok(LocalScan { world_dir, files })
    }

    fn world_dir(&self, world: &WorldName) -> PathBuf {
        self.save_root.join(world.as_str())
    }
}
