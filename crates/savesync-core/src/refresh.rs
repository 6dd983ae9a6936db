//! Manifest refresh channel
//!
//! Single-slot "latest snapshot" broadcast built on `tokio::sync::watch`:
//! - observers read the current value synchronously at any time
//! - a new subscriber sees only pushes made after it subscribed
//! - pushes faster than an observer consumes collapse to the latest value

use savesync_manifest::ManifestSnapshot;
use std::sync::Arc;
use tokio::sync::watch;

/// Published snapshot with its commit generation
#[derive(Debug, Clone)]
pub struct ManifestUpdate {
    /// Monotonic commit counter, 0 for the loaded snapshot
    pub generation: u64,
    /// Snapshot as persisted
    pub snapshot: Arc<ManifestSnapshot>,
}

/// Publisher side, owned by the orchestrator
#[derive(Debug)]
pub struct RefreshChannel {
    sender: watch::Sender<ManifestUpdate>,
}

impl RefreshChannel {
    /// Channel holding `initial` as generation 0
    #[must_use]
    pub fn new(initial: Arc<ManifestSnapshot>) -> Self {
        let (sender, _) = watch::channel(ManifestUpdate {
            generation: 0,
            snapshot: initial,
        });
        Self { sender }
    }

    /// Latest published value
    #[inline]
    #[must_use]
    pub fn current(&self) -> ManifestUpdate {
        self.sender.borrow().clone()
    }

    /// Publish a committed snapshot
    ///
    /// Ignored if a newer generation is already published, so commits that
    /// race to publish still leave the newest snapshot in the slot.
    pub fn publish(&self, generation: u64, snapshot: Arc<ManifestSnapshot>) -> bool {
        self.sender.send_if_modified(|slot| {
            if generation > slot.generation {
                *slot = ManifestUpdate {
                    generation,
                    snapshot,
                };
                true
            } else {
                false
            }
        })
    }

    /// Wake observers without changing the value
    ///
    /// Used after a failure so observers re-read world states.
    pub fn notify(&self) {
        self.sender.send_modify(|_| {});
    }

    /// New observer
    #[must_use]
    pub fn subscribe(&self) -> RefreshSubscription {
        RefreshSubscription {
            receiver: self.sender.subscribe(),
        }
    }

    /// Number of live observers
    #[inline]
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Observer side
#[derive(Debug, Clone)]
pub struct RefreshSubscription {
    receiver: watch::Receiver<ManifestUpdate>,
}

impl RefreshSubscription {
    /// Latest value, without waiting
    #[inline]
    #[must_use]
    pub fn current(&self) -> ManifestUpdate {
        self.receiver.borrow().clone()
    }

    /// Whether a push arrived that has not been consumed
    #[inline]
    #[must_use]
    pub fn has_changed(&self) -> bool {
        self.receiver.has_changed().unwrap_or(false)
    }

    /// Wait for the next push and return the latest value
    ///
    /// Returns `None` once the orchestrator is gone.
    pub async fn changed(&mut self) -> Option<ManifestUpdate> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }
}
