//! Sync Orchestrator
//!
//! Coordinates uploads and downloads against the transfer backend:
//! - at most one operation per world; a second request is rejected as `Busy`
//! - the manifest changes only after a successful transfer, as a whole new
//!   snapshot saved through the store
//! - every finished operation is pushed to the refresh channel, failures
//!   included
//!
//! An accepted operation runs on its own task. Dropping the future returned
//! by [`SyncOrchestrator::run_upload`] does not cancel the transfer or the
//! commit that follows it.

use crate::backend::TransferBackend;
use crate::clock::{Clock, SystemClock};
use crate::error::{ErrorKind, SyncError};
use crate::progress::{ProgressReporter, TransferProgress};
use crate::refresh::{RefreshChannel, RefreshSubscription};
use crate::scanner::LocalScanner;
use crate::state::{Operation, WorldLease, WorldLocks, WorldState};
use crate::types::{OperationId, SyncReport};
use savesync_detect::{diff, world_entry_from_scan, ChangeSet};
use savesync_manifest::{
    FileRecord, ManifestSnapshot, ManifestStats, ManifestStore, WorldEntry, WorldName,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};

const DEFAULT_PROGRESS_CAPACITY: usize = 64;

/// Builder for [`SyncOrchestrator`]
pub struct OrchestratorBuilder {
    store: Arc<dyn ManifestStore>,
    scanner: Arc<dyn LocalScanner>,
    backend: Arc<dyn TransferBackend>,
    clock: Arc<dyn Clock>,
    progress_capacity: usize,
}

impl OrchestratorBuilder {
    /// Builder over the three collaborators, using the system clock
    #[must_use]
    pub fn new(
        store: Arc<dyn ManifestStore>,
        scanner: Arc<dyn LocalScanner>,
        backend: Arc<dyn TransferBackend>,
    ) -> Self {
        Self {
            store,
            scanner,
            backend,
            clock: Arc::new(SystemClock),
            progress_capacity: DEFAULT_PROGRESS_CAPACITY,
        }
    }

    /// With clock
    #[inline]
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// With progress broadcast buffer
    #[inline]
    #[must_use]
    pub fn with_progress_capacity(mut self, capacity: usize) -> Self {
        self.progress_capacity = capacity.max(1);
        self
    }

    /// Load the persisted manifest and start the orchestrator
    ///
    /// # Errors
    /// [`SyncError::PersistenceFailure`] if the manifest exists but cannot
    /// be read.
    pub async fn build(self) -> Result<SyncOrchestrator, SyncError> {
        let found = self
            .store
            .exists()
            .await
            .map_err(|e| SyncError::persistence(None, &e))?;
        let snapshot = self
            .store
            .load()
            .await
            .map_err(|e| SyncError::persistence(None, &e))?;

        if let Err(e) = snapshot.validate() {
            warn!(error = %e, "manifest has inconsistent back-references");
        }

        let stats = snapshot.stats();
        info!(
            worlds = stats.world_count,
            files = stats.total_tracked_files,
            "{}",
            stats.status_message(found)
        );

        let committed = Arc::new(snapshot);
        let (progress, _) = broadcast::channel(self.progress_capacity);

        Ok(SyncOrchestrator {
            inner: Arc::new(Inner {
                store: self.store,
                scanner: self.scanner,
                backend: self.backend,
                clock: self.clock,
                locks: WorldLocks::new(),
                refresh: RefreshChannel::new(Arc::clone(&committed)),
                commit: Mutex::new(CommitState {
                    committed,
                    pending: None,
                    generation: 0,
                }),
                manifest_found: AtomicBool::new(found),
                progress,
            }),
        })
    }
}

/// Coordinates sync operations for every world
#[derive(Clone)]
pub struct SyncOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn ManifestStore>,
    scanner: Arc<dyn LocalScanner>,
    backend: Arc<dyn TransferBackend>,
    clock: Arc<dyn Clock>,
    locks: WorldLocks,
    refresh: RefreshChannel,
    commit: Mutex<CommitState>,
    /// Set once any snapshot has been persisted
    manifest_found: AtomicBool,
    progress: broadcast::Sender<TransferProgress>,
}

/// Last persisted snapshot plus a snapshot whose save failed
struct CommitState {
    committed: Arc<ManifestSnapshot>,
    pending: Option<PendingSave>,
    generation: u64,
}

struct PendingSave {
    snapshot: ManifestSnapshot,
    world: WorldName,
}

/// Snapshot persisted by one commit
struct Commit {
    generation: u64,
    snapshot: Arc<ManifestSnapshot>,
}

/// Transfer result before it becomes a [`SyncReport`]
struct Transferred {
    changes: Option<ChangeSet>,
    files_transferred: usize,
    bytes_transferred: u64,
    commit: Commit,
}

impl std::fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("bucket", &self.inner.backend.bucket())
            .field("worlds", &self.inner.locks.snapshot())
            .field("observers", &self.inner.refresh.observer_count())
            .finish_non_exhaustive()
    }
}

impl SyncOrchestrator {
    /// Start building an orchestrator
    #[inline]
    #[must_use]
    pub fn builder(
        store: Arc<dyn ManifestStore>,
        scanner: Arc<dyn LocalScanner>,
        backend: Arc<dyn TransferBackend>,
    ) -> OrchestratorBuilder {
        OrchestratorBuilder::new(store, scanner, backend)
    }

    /// Last persisted snapshot
    ///
    /// A snapshot whose save failed is not visible here until
    /// [`Self::retry_save`] succeeds.
    #[must_use]
    pub fn get_manifest_info(&self) -> Arc<ManifestSnapshot> {
        self.inner.refresh.current().snapshot
    }

    /// Statistics of the last persisted snapshot
    #[must_use]
    pub fn stats(&self) -> ManifestStats {
        self.get_manifest_info().stats()
    }

    /// Status line for the last persisted snapshot
    #[must_use]
    pub fn status_message(&self) -> String {
        self.stats()
            .status_message(self.inner.manifest_found.load(Ordering::Acquire))
    }

    /// Observe manifest refreshes
    #[must_use]
    pub fn subscribe(&self) -> RefreshSubscription {
        self.inner.refresh.subscribe()
    }

    /// Observe transfer progress
    #[must_use]
    pub fn subscribe_progress(&self) -> broadcast::Receiver<TransferProgress> {
        self.inner.progress.subscribe()
    }

    /// State of one world
    #[must_use]
    pub fn world_state(&self, world: &str) -> WorldState {
        self.inner.locks.state(world)
    }

    /// States of every world that has run an operation
    #[must_use]
    pub fn world_states(&self) -> Vec<(WorldName, WorldState)> {
        self.inner.locks.snapshot()
    }

    /// Clear a `Failed` state
    ///
    /// Returns `false` if the world was not failed.
    pub fn acknowledge(&self, world: &str) -> bool {
        let cleared = self.inner.locks.acknowledge(world);
        if cleared {
            debug!(world, "failure acknowledged");
            self.inner.refresh.notify();
        }
        cleared
    }

    /// Back up a world
    ///
    /// # Errors
    /// - [`SyncError::InvalidArgument`] for a malformed name
    /// - [`SyncError::Busy`] if the world has an operation in flight
    /// - [`SyncError::NotFound`] if the local folder is missing
    /// - [`SyncError::TransferFailure`] if the scan or push failed
    /// - [`SyncError::PersistenceFailure`] if the push succeeded but the
    ///   manifest save failed
    pub async fn run_upload(&self, world: &str) -> Result<SyncReport, SyncError> {
        self.run(world, Operation::Upload).await
    }

    /// Restore a world from the remote
    ///
    /// # Errors
    /// Same taxonomy as [`Self::run_upload`]; `NotFound` means the remote
    /// world is missing.
    pub async fn run_download(&self, world: &str) -> Result<SyncReport, SyncError> {
        self.run(world, Operation::Download).await
    }

    /// Re-attempt a failed manifest save
    ///
    /// Returns `Ok(false)` when no save is pending.
    ///
    /// # Errors
    /// [`SyncError::PersistenceFailure`] if the save fails again.
    pub async fn retry_save(&self) -> Result<bool, SyncError> {
        self.inner.retry_save().await
    }

    /// Whether a committed snapshot is waiting to be saved
    pub async fn has_pending_save(&self) -> bool {
        self.inner.commit.lock().await.pending.is_some()
    }

    async fn run(&self, world: &str, operation: Operation) -> Result<SyncReport, SyncError> {
        let name = WorldName::parse(world)?;
        let lease = self.inner.locks.acquire(&name, operation).map_err(|e| {
            warn!(world = %name, %operation, error = %e, "rejected");
            e
        })?;

        let inner = Arc::clone(&self.inner);
        match tokio::spawn(inner.execute(lease)).await {
            Ok(result) => result,
            Err(join) => {
                error!(world = %name, %operation, error = %join, "operation task died");
                self.inner.refresh.notify();
                Err(SyncError::TransferFailure {
                    world: name.into_inner(),
                    message: format!("{operation} task failed: {join}"),
                })
            }
        }
    }
}

impl Inner {
    async fn execute(self: Arc<Self>, lease: WorldLease) -> Result<SyncReport, SyncError> {
        let world = lease.world().clone();
        let operation = lease.operation();
        let operation_id = OperationId::new();
        let started = Instant::now();
        let progress =
            ProgressReporter::new(operation_id, world.clone(), operation, self.progress.clone());

        info!(%operation_id, world = %world, %operation, "operation started");

        let result = match operation {
            Operation::Upload => self.upload(&world, &progress).await,
            Operation::Download => self.download(&world, &progress).await,
        };

        match result {
            Ok(done) => {
                lease.succeed();
                self.refresh
                    .publish(done.commit.generation, Arc::clone(&done.commit.snapshot));

                let report = SyncReport {
                    operation_id,
                    tracked_files: done
                        .commit
                        .snapshot
                        .get_world(world.as_str())
                        .map_or(0, WorldEntry::len),
                    last_opened: done.commit.snapshot.last_opened,
                    world,
                    operation,
                    changes: done.changes,
                    files_transferred: done.files_transferred,
                    bytes_transferred: done.bytes_transferred,
                    elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                };
                info!(
                    %operation_id,
                    world = %report.world,
                    %operation,
                    generation = done.commit.generation,
                    files = report.files_transferred,
                    bytes = report.bytes_transferred,
                    "operation committed"
                );
                Ok(report)
            }
            Err(err) => {
                if err.kind() == ErrorKind::PersistenceFailure {
                    error!(
                        %operation_id, world = %world, %operation, error = %err,
                        "manifest not saved"
                    );
                } else {
                    warn!(
                        %operation_id, world = %world, %operation, error = %err,
                        "operation failed"
                    );
                }
                lease.fail(err.to_string());
                self.refresh.notify();
                Err(err)
            }
        }
    }

    async fn upload(
        &self,
        world: &WorldName,
        progress: &ProgressReporter,
    ) -> Result<Transferred, SyncError> {
        let scan = self
            .scanner
            .scan(world)
            .await
            .map_err(|e| e.into_sync_error(world.as_str()))?;

        let previous = self.tracked_entry(world).await;
        let changes = diff(&scan.files, previous.as_ref());
        debug!(
            world = %world,
            added = changes.added.len(),
            modified = changes.modified.len(),
            removed = changes.removed.len(),
            unchanged = changes.unchanged.len(),
            "change set computed"
        );

        let (files_transferred, bytes_transferred) = if changes.is_empty() {
            debug!(world = %world, "no changes; skipping transfer");
            (0, 0)
        } else {
            self.backend
                .push(world, &scan, &changes, progress)
                .await
                .map_err(|e| e.into_sync_error(world.as_str()))?;
            (
                changes.added.len() + changes.modified.len(),
                changes.bytes_to_send(&scan.files),
            )
        };

        let commit = self
            .commit(world, world_entry_from_scan(world, &scan.files))
            .await?;

        Ok(Transferred {
            changes: Some(changes),
            files_transferred,
            bytes_transferred,
            commit,
        })
    }

    async fn download(
        &self,
        world: &WorldName,
        progress: &ProgressReporter,
    ) -> Result<Transferred, SyncError> {
        let local_dir = self.scanner.world_dir(world);
        let previous = self.tracked_entry(world).await;

        let listing = self
            .backend
            .pull(world, &local_dir, progress)
            .await
            .map_err(|e| e.into_sync_error(world.as_str()))?;

        let playtime = |path: &str| {
            previous
                .as_ref()
                .and_then(|entry| entry.get(path))
                .map_or(0, |record| record.playtime_seconds)
        };
        let entry = WorldEntry::from_files(
            world.clone(),
            listing.iter().map(|file| {
                (
                    file.path.clone(),
                    FileRecord::new(world, playtime(&file.path), file.size_bytes),
                )
            }),
        );

        let commit = self.commit(world, entry).await?;
        Ok(Transferred {
            changes: None,
            files_transferred: progress.files_done(),
            bytes_transferred: progress.transferred_bytes(),
            commit,
        })
    }

    /// Entry the next diff runs against; a pending snapshot counts
    async fn tracked_entry(&self, world: &WorldName) -> Option<WorldEntry> {
        let state = self.commit.lock().await;
        let base: &ManifestSnapshot = match &state.pending {
            Some(pending) => &pending.snapshot,
            None => state.committed.as_ref(),
        };
        base.get_world(world.as_str()).cloned()
    }

    async fn commit(&self, world: &WorldName, entry: WorldEntry) -> Result<Commit, SyncError> {
        let mut state = self.commit.lock().await;
        let base: &ManifestSnapshot = match &state.pending {
            Some(pending) => &pending.snapshot,
            None => state.committed.as_ref(),
        };
        let next = base
            .with_world(entry)
            .with_last_opened(self.clock.now_secs())
            .with_bucket(self.backend.bucket());

        match self.store.save(&next).await {
            Ok(()) => {
                self.manifest_found.store(true, Ordering::Release);
                let snapshot = Arc::new(next);
                state.committed = Arc::clone(&snapshot);
                state.pending = None;
                state.generation += 1;
                Ok(Commit {
                    generation: state.generation,
                    snapshot,
                })
            }
            Err(e) => {
                state.pending = Some(PendingSave {
                    snapshot: next,
                    world: world.clone(),
                });
                Err(SyncError::persistence(Some(world.as_str()), &e))
            }
        }
    }

    async fn retry_save(&self) -> Result<bool, SyncError> {
        let mut state = self.commit.lock().await;
        let Some(pending) = state.pending.take() else {
            return Ok(false);
        };

        match self.store.save(&pending.snapshot).await {
            Ok(()) => {
                self.manifest_found.store(true, Ordering::Release);
                let snapshot = Arc::new(pending.snapshot);
                state.committed = Arc::clone(&snapshot);
                state.generation += 1;
                let generation = state.generation;
                drop(state);

                info!(world = %pending.world, generation, "pending manifest saved");
                self.refresh.publish(generation, snapshot);
                Ok(true)
            }
            Err(e) => {
                let err = SyncError::persistence(Some(pending.world.as_str()), &e);
                error!(error = %err, "manifest save retry failed");
                state.pending = Some(pending);
                Err(err)
            }
        }
    }
}
