//! Testing utilities for savesync workspace
//!
//! In-memory collaborators for driving a [`SyncOrchestrator`] without disks
//! or networks, plus a [`Harness`] that wires them together.

#![allow(missing_docs)]

use async_trait::async_trait;
use parking_lot::Mutex;
use savesync_core::{
    Clock, LocalScan, LocalScanner, ProgressReporter, RemoteFile, ScanError, SyncOrchestrator,
    TransferBackend, TransferError,
};
use savesync_detect::{ChangeSet, ScannedFile};
use savesync_manifest::{ManifestError, ManifestSnapshot, ManifestStore, MemoryStore, WorldName};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Notify, Semaphore};

pub const TEST_BUCKET: &str = "test-bucket";
pub const TEST_EPOCH: u64 = 1_700_000_000;

pub fn world(name: &str) -> WorldName {
    WorldName::parse(name).unwrap()
}

/// Scan entries from `(path, size)` pairs with zero playtime
pub fn files(entries: &[(&str, u64)]) -> Vec<ScannedFile> {
    entries
        .iter()
        .map(|(path, size)| ScannedFile::new(*path, *size, 0))
        .collect()
}

/// Clock pinned to a settable value
#[derive(Debug)]
pub struct FixedClock(AtomicU64);

impl FixedClock {
    pub fn new(now: u64) -> Self {
        Self(AtomicU64::new(now))
    }

    pub fn set(&self, now: u64) {
        self.0.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: u64) {
        self.0.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_secs(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Scanner over world folders held in memory
#[derive(Debug, Default)]
pub struct MemoryScanner {
    worlds: Mutex<HashMap<String, Vec<ScannedFile>>>,
    scans: AtomicUsize,
}

impl MemoryScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace a world folder
    pub fn set_world(&self, name: &str, files: Vec<ScannedFile>) {
        self.worlds.lock().insert(name.to_string(), files);
    }

    /// Delete a world folder
    pub fn remove_world(&self, name: &str) {
        self.worlds.lock().remove(name);
    }

    pub fn scan_count(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LocalScanner for MemoryScanner {
    async fn scan(&self, world: &WorldName) -> Result<LocalScan, ScanError> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        let files = self
            .worlds
            .lock()
            .get(world.as_str())
            .cloned()
            .ok_or_else(|| ScanError::NotFound(self.world_dir(world).display().to_string()))?;
        Ok(LocalScan {
            world_dir: self.world_dir(world),
            files,
        })
    }

    fn world_dir(&self, world: &WorldName) -> PathBuf {
        Path::new("/saves").join(world.as_str())
    }
}

/// One recorded `push`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushCall {
    pub world: WorldName,
    pub changes: ChangeSet,
}

/// Backend that records calls and keeps remote listings in memory
///
/// A successful push makes the remote listing mirror the scan.
#[derive(Debug)]
pub struct RecordingBackend {
    bucket: String,
    remote: Mutex<HashMap<String, Vec<RemoteFile>>>,
    pushes: Mutex<Vec<PushCall>>,
    pulls: AtomicUsize,
    failure: Mutex<Option<TransferError>>,
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::new(TEST_BUCKET)
    }
}

impl RecordingBackend {
    pub fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            remote: Mutex::new(HashMap::new()),
            pushes: Mutex::new(Vec::new()),
            pulls: AtomicUsize::new(0),
            failure: Mutex::new(None),
        }
    }

    /// Replace the remote listing of a world
    pub fn set_remote(&self, name: &str, listing: Vec<RemoteFile>) {
        self.remote.lock().insert(name.to_string(), listing);
    }

    pub fn remote(&self, name: &str) -> Option<Vec<RemoteFile>> {
        self.remote.lock().get(name).cloned()
    }

    /// Fail every call with `error` until [`Self::heal`]
    pub fn fail_with(&self, error: TransferError) {
        *self.failure.lock() = Some(error);
    }

    pub fn heal(&self) {
        *self.failure.lock() = None;
    }

    pub fn pushes(&self) -> Vec<PushCall> {
        self.pushes.lock().clone()
    }

    pub fn push_count(&self) -> usize {
        self.pushes.lock().len()
    }

    pub fn pull_count(&self) -> usize {
        self.pulls.load(Ordering::SeqCst)
    }

    /// Total backend calls of either direction
    pub fn call_count(&self) -> usize {
        self.push_count() + self.pull_count()
    }

    fn check_failure(&self) -> Result<(), TransferError> {
        match self.failure.lock().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl TransferBackend for RecordingBackend {
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
        self.pushes.lock().push(PushCall {
            world: world.clone(),
            changes: changes.clone(),
        });
        self.check_failure()?;

        progress.begin(changes.bytes_to_send(&scan.files));
        for file in &scan.files {
            if changes.added.contains(&file.path) || changes.modified.contains(&file.path) {
                progress.file_done(&file.path, file.size_bytes);
            }
        }

        let listing = scan
            .files
            .iter()
            .map(|f| RemoteFile::new(f.path.clone(), f.size_bytes))
            .collect();
        self.set_remote(world.as_str(), listing);
        Ok(())
    }

    async fn pull(
        &self,
        world: &WorldName,
        _local_dir: &Path,
        progress: &ProgressReporter,
    ) -> Result<Vec<RemoteFile>, TransferError> {
        self.pulls.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;

        let listing = self
            .remote(world.as_str())
            .ok_or_else(|| TransferError::NotFound(format!("world {world} not in bucket")))?;
        progress.begin(listing.iter().map(|f| f.size_bytes).sum());
        for file in &listing {
            progress.file_done(&file.path, file.size_bytes);
        }
        Ok(listing)
    }
}

/// Backend that parks every call until released
///
/// Lets a test hold an operation in flight.
#[derive(Debug)]
pub struct GatedBackend {
    inner: RecordingBackend,
    entered: Notify,
    entries: AtomicUsize,
    gate: Semaphore,
}

impl GatedBackend {
    pub fn new() -> Self {
        Self {
            inner: RecordingBackend::default(),
            entered: Notify::new(),
            entries: AtomicUsize::new(0),
            gate: Semaphore::new(0),
        }
    }

    /// Calls that reached the gate, parked ones included
    ///
    /// The recorder only sees a call once it is released.
    pub fn entered_count(&self) -> usize {
        self.entries.load(Ordering::SeqCst)
    }

    pub fn recorder(&self) -> &RecordingBackend {
        &self.inner
    }

    /// Wait until a call is parked at the gate
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    /// Let one parked call through
    pub fn release(&self) {
        self.gate.add_permits(1);
    }

    async fn pass(&self) {
        self.entries.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        if let Ok(permit) = self.gate.acquire().await {
            permit.forget();
        }
    }
}

#[async_trait]
impl TransferBackend for GatedBackend {
    fn bucket(&self) -> String {
        self.inner.bucket()
    }

    async fn push(
        &self,
        world: &WorldName,
        scan: &LocalScan,
        changes: &ChangeSet,
        progress: &ProgressReporter,
    ) -> Result<(), TransferError> {
        self.pass().await;
        self.inner.push(world, scan, changes, progress).await
    }

    async fn pull(
        &self,
        world: &WorldName,
        local_dir: &Path,
        progress: &ProgressReporter,
    ) -> Result<Vec<RemoteFile>, TransferError> {
        self.pass().await;
        self.inner.pull(world, local_dir, progress).await
    }
}

/// Memory store whose saves can be made to fail
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    failing: AtomicBool,
    attempts: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: ManifestSnapshot) -> Self {
        Self {
            inner: MemoryStore::with_snapshot(snapshot),
            ..Self::default()
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Last successfully saved snapshot
    pub fn persisted(&self) -> Option<ManifestSnapshot> {
        self.inner.persisted()
    }

    pub fn save_count(&self) -> usize {
        self.inner.save_count()
    }

    /// Saves attempted, failed ones included
    pub fn save_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ManifestStore for FlakyStore {
    async fn load(&self) -> Result<ManifestSnapshot, ManifestError> {
        self.inner.load().await
    }

    async fn save(&self, snapshot: &ManifestSnapshot) -> Result<(), ManifestError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(ManifestError::io(
                "memory://manifest",
                std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
            ));
        }
        self.inner.save(snapshot).await
    }

    async fn exists(&self) -> Result<bool, ManifestError> {
        self.inner.exists().await
    }
}

/// Orchestrator wired to in-memory collaborators
pub struct Harness<B: TransferBackend + 'static = RecordingBackend> {
    pub store: Arc<FlakyStore>,
    pub scanner: Arc<MemoryScanner>,
    pub backend: Arc<B>,
    pub clock: Arc<FixedClock>,
    pub orchestrator: SyncOrchestrator,
}

impl Harness<RecordingBackend> {
    pub async fn new() -> Self {
        Self::with_backend(RecordingBackend::default()).await
    }
}

impl<B: TransferBackend + 'static> Harness<B> {
    pub async fn with_backend(backend: B) -> Self {
        Self::with_parts(FlakyStore::new(), backend).await
    }

    pub async fn with_parts(store: FlakyStore, backend: B) -> Self {
        let store = Arc::new(store);
        let scanner = Arc::new(MemoryScanner::new());
        let backend = Arc::new(backend);
        let clock = Arc::new(FixedClock::new(TEST_EPOCH));

        let orchestrator = SyncOrchestrator::builder(
            Arc::clone(&store) as Arc<dyn ManifestStore>,
            Arc::clone(&scanner) as Arc<dyn LocalScanner>,
            Arc::clone(&backend) as Arc<dyn TransferBackend>,
        )
        .with_clock(Arc::clone(&clock) as Arc<dyn Clock>)
        .build()
        .await
        .unwrap();

        Self {
            store,
            scanner,
            backend,
            clock,
            orchestrator,
        }
    }
}
