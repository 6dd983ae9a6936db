//! Transfer backend contract and the directory-backed backend
//!
//! The orchestrator treats the backend as opaque: it hands over a scan and a
//! change set on upload, and a local folder on download. Retries, timeouts
//! and object layout belong to the backend.

use crate::error::TransferError;
use crate::fs;
use crate::progress::ProgressReporter;
use crate::scanner::LocalScan;
use async_trait::async_trait;
use savesync_detect::ChangeSet;
use savesync_manifest::WorldName;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// One object in a remote world listing
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteFile {
    /// Path relative to the world, `/`-separated
    pub path: String,
    /// Object size
    pub size_bytes: u64,
}

impl RemoteFile {
    /// Create a listing entry
    #[inline]
    #[must_use]
    pub fn new(path: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            path: path.into(),
            size_bytes,
        }
    }
}

/// Moves world files between the local folder and remote storage
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TransferBackend: Send + Sync {
    /// Identifier recorded as `current_used_bucket`
    fn bucket(&self) -> String;

    /// Make the remote world match `scan`
    ///
    /// Only called with a non-empty `changes`. Deletes removed paths, then
    /// sends added and modified ones.
    async fn push(
        &self,
        world: &WorldName,
        scan: &LocalScan,
        changes: &ChangeSet,
        progress: &ProgressReporter,
    ) -> Result<(), TransferError>;

    /// Make `local_dir` match the remote world and return the remote listing
    ///
    /// # Errors
    /// [`TransferError::NotFound`] when the remote world does not exist.
    async fn pull(
        &self,
        world: &WorldName,
        local_dir: &Path,
        progress: &ProgressReporter,
    ) -> Result<Vec<RemoteFile>, TransferError>;
}

/// Object store laid out as plain directories
///
/// Objects live at `<remote_root>/<bucket>/[<prefix>/]<world>/<path>`.
#[derive(Debug, Clone)]
pub struct DirBackend {
    remote_root: PathBuf,
    bucket: String,
    prefix: Option<String>,
}

impl DirBackend {
    /// Backend over `remote_root` using `bucket`
    #[must_use]
    pub fn new(remote_root: impl Into<PathBuf>, bucket: impl Into<String>) -> Self {
        Self {
            remote_root: remote_root.into(),
            bucket: bucket.into(),
            prefix: None,
        }
    }

    /// Place every world under `prefix`
    #[inline]
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let trimmed = prefix.trim_matches('/');
        self.prefix = (!trimmed.is_empty()).then(|| trimmed.to_string());
        self
    }

    /// Remote folder of `world`
    #[must_use]
    pub fn world_root(&self, world: &WorldName) -> PathBuf {
        let bucket_root = self.remote_root.join(&self.bucket);
        let base = match &self.prefix {
            Some(prefix) => fs::key_path(&bucket_root, prefix),
            None => bucket_root,
        };
        base.join(world.as_str())
    }
}

fn failed(context: impl std::fmt::Display, err: &std::io::Error) -> TransferError {
    TransferError::Failed(format!("{context}: {err}"))
}

#[async_trait]
impl TransferBackend for DirBackend {
    fn bucket(&self) -> String {
        self.bucket.clone()
    }

    async fn push(
        &self,
        world: &WorldName,
        scan: &LocalScan,
        changes: &ChangeSet,
        progress: &ProgressReporter,
    ) -> Result<(), TransferError> {
        let remote = self.world_root(world);
        let sizes: BTreeMap<&str, u64> = scan
            .files
            .iter()
            .map(|f| (f.path.as_str(), f.size_bytes))
            .collect();

        // Removals go first so a removed file cannot block a new directory.
        for path in &changes.removed {
            fs::remove_file_if_exists(&fs::key_path(&remote, path))
                .await
                .map_err(|e| failed(format_args!("delete {path}"), &e))?;
        }

        progress.begin(changes.bytes_to_send(&scan.files));

        for path in changes.paths_to_send() {
            let from = fs::key_path(&scan.world_dir, path);
            let to = fs::make_room(&remote, path)
                .await
                .map_err(|e| failed(format_args!("upload {path}"), &e))?;
            fs::copy_file(&from, &to)
                .await
                .map_err(|e| failed(format_args!("upload {path}"), &e))?;
            progress.file_done(path, sizes.get(path).copied().unwrap_or(0));
        }

        tracing::debug!(
            world = %world,
            sent = changes.added.len() + changes.modified.len(),
            deleted = changes.removed.len(),
            "pushed world to directory backend"
        );
        Ok(())
    }

    async fn pull(
        &self,
        world: &WorldName,
        local_dir: &Path,
        progress: &ProgressReporter,
    ) -> Result<Vec<RemoteFile>, TransferError> {
        let remote = self.world_root(world);
        if !fs::is_dir(&remote)
            .await
            .map_err(|e| failed(remote.display(), &e))?
        {
            return Err(TransferError::NotFound(format!(
                "world {world} not found in bucket {}",
                self.bucket
            )));
        }

        let listing = fs::walk(&remote)
            .await
            .map_err(|e| failed(remote.display(), &e))?;

        tokio::fs::create_dir_all(local_dir)
            .await
            .map_err(|e| failed(local_dir.display(), &e))?;
        let local: BTreeMap<String, u64> = fs::walk(local_dir)
            .await
            .map_err(|e| failed(local_dir.display(), &e))?
            .into_iter()
            .map(|f| (f.key, f.size))
            .collect();

        let keep: BTreeSet<&str> = listing.iter().map(|f| f.key.as_str()).collect();
        for key in local.keys().filter(|k| !keep.contains(k.as_str())) {
            fs::remove_file_if_exists(&fs::key_path(local_dir, key))
                .await
                .map_err(|e| failed(format_args!("delete local {key}"), &e))?;
        }

        let stale: Vec<_> = listing
            .iter()
            .filter(|f| local.get(&f.key) != Some(&f.size))
            .collect();
        progress.begin(stale.iter().map(|f| f.size).sum());

        for file in stale {
            let to = fs::make_room(local_dir, &file.key)
                .await
                .map_err(|e| failed(format_args!("download {}", file.key), &e))?;
            fs::copy_file(&fs::key_path(&remote, &file.key), &to)
                .await
                .map_err(|e| failed(format_args!("download {}", file.key), &e))?;
            progress.file_done(&file.key, file.size);
        }

        Ok(listing
            .into_iter()
            .map(|f| RemoteFile::new(f.key, f.size))
            .collect())
    }
}
