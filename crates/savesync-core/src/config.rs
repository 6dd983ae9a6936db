//! Sync configuration
//!
//! Resolution order for every setting: config file, then environment, then
//! the platform default where one exists.

use crate::backend::DirBackend;
use crate::error::ConfigError;
use crate::scanner::FsScanner;
use savesync_manifest::{manifest_file_path, JsonFileStore};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Save directory override
pub const ENV_SAVE_DIR: &str = "VS_SAVE_DIR";
/// Bucket override
pub const ENV_BUCKET: &str = "SAVESYNC_BUCKET";
/// Remote root override
pub const ENV_REMOTE_ROOT: &str = "SAVESYNC_REMOTE_ROOT";

const DEFAULT_BUCKET: &str = "vintagestory-saves";
const DEFAULT_PROGRESS_CAPACITY: usize = 64;

/// Sync configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Directory holding one folder per world
    pub save_root: Option<PathBuf>,
    /// Manifest file; defaults to a file inside `save_root`
    pub manifest_path: Option<PathBuf>,
    /// Remote bucket identifier
    pub bucket: String,
    /// Root of the directory-backed remote
    pub remote_root: Option<PathBuf>,
    /// Remote key prefix placed before the world name
    pub prefix: Option<String>,
    /// Progress broadcast buffer
    pub progress_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            save_root: None,
            manifest_path: None,
            bucket: DEFAULT_BUCKET.to_string(),
            remote_root: None,
            prefix: None,
            progress_capacity: DEFAULT_PROGRESS_CAPACITY,
        }
    }
}

/// Filesystem collaborators built from a config
#[derive(Debug, Clone)]
pub struct LocalCollaborators {
    /// Manifest store
    pub store: JsonFileStore,
    /// World folder scanner
    pub scanner: FsScanner,
    /// Directory-backed remote
    pub backend: DirBackend,
}

impl SyncConfig {
    /// Default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse TOML text
    ///
    /// # Errors
    /// [`ConfigError::Parse`] on malformed input.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a TOML file
    ///
    /// # Errors
    /// [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// With save root
    #[inline]
    #[must_use]
    pub fn with_save_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.save_root = Some(path.into());
        self
    }

    /// With manifest path
    #[inline]
    #[must_use]
    pub fn with_manifest_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.manifest_path = Some(path.into());
        self
    }

    /// With bucket
    #[inline]
    #[must_use]
    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = bucket.into();
        self
    }

    /// With remote root
    #[inline]
    #[must_use]
    pub fn with_remote_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.remote_root = Some(path.into());
        self
    }

    /// With remote prefix
    #[inline]
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// With progress buffer size
    #[inline]
    #[must_use]
    pub fn with_progress_capacity(mut self, capacity: usize) -> Self {
        self.progress_capacity = capacity.max(1);
        self
    }

    /// Fill unset values from the process environment
    #[must_use]
    pub fn apply_env(self) -> Self {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Fill unset values from `lookup`
    ///
    /// The bucket variable always wins over the file.
    #[must_use]
    pub fn apply_env_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if self.save_root.is_none() {
            self.save_root = non_empty(ENV_SAVE_DIR).map(PathBuf::from);
        }
        if self.remote_root.is_none() {
            self.remote_root = non_empty(ENV_REMOTE_ROOT).map(PathBuf::from);
        }
        if let Some(bucket) = non_empty(ENV_BUCKET) {
            self.bucket = bucket;
        }
        self
    }

    /// Save root, falling back to the platform default
    ///
    /// # Errors
    /// [`ConfigError::Missing`] when no value exists for this platform.
    pub fn resolved_save_root(&self) -> Result<PathBuf, ConfigError> {
        match &self.save_root {
            Some(path) => Ok(path.clone()),
            None => platform_save_root(|key| std::env::var_os(key).map(PathBuf::from)),
        }
    }

    /// Manifest path, defaulting to a file inside the save root
    ///
    /// # Errors
    /// See [`Self::resolved_save_root`].
    pub fn resolved_manifest_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.manifest_path {
            Some(path) => Ok(path.clone()),
            None => Ok(manifest_file_path(&self.resolved_save_root()?)),
        }
    }

    /// Build the filesystem store, scanner and backend
    ///
    /// # Errors
    /// [`ConfigError::Missing`] for an unresolved save root or remote root.
    pub fn local_collaborators(&self) -> Result<LocalCollaborators, ConfigError> {
        let save_root = self.resolved_save_root()?;
        let manifest_path = self.resolved_manifest_path()?;
        let remote_root = self
            .remote_root
            .clone()
            .ok_or(ConfigError::Missing("remote_root"))?;

        let mut backend = DirBackend::new(remote_root, self.bucket.clone());
        if let Some(prefix) = &self.prefix {
            backend = backend.with_prefix(prefix.clone());
        }

        Ok(LocalCollaborators {
            store: JsonFileStore::new(manifest_path),
            scanner: FsScanner::new(save_root),
            backend,
        })
    }
}

fn platform_save_root(
    var: impl Fn(&str) -> Option<PathBuf>,
) -> Result<PathBuf, ConfigError> {
    if cfg!(target_os = "windows") {
        let appdata = var("APPDATA").ok_or(ConfigError::Missing("save_root"))?;
        let path = appdata.join("VintagestoryData").join("Saves");
        std::fs::create_dir_all(&path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(path)
    } else if cfg!(target_os = "macos") {
        let home = var("HOME").ok_or(ConfigError::Missing("save_root"))?;
        Ok(home
            .join("Library")
            .join("Application Support")
            .join("VintagestoryData")
            .join("Saves"))
    } else {
        Err(ConfigError::Missing("save_root"))
    }
}
