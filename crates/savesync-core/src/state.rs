//! Per-world state machine and single-flight leases
//!
//! Each world is `Idle`, `Uploading`, `Downloading` or `Failed(message)`.
//! A [`WorldLease`] is the only way into a running state; dropping it always
//! leaves the running state, so the lock is released on every exit path.

use crate::error::SyncError;
use dashmap::DashMap;
use savesync_manifest::WorldName;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

/// Kind of transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    /// Local to remote
    Upload,
    /// Remote to local
    Download,
}

impl Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upload => f.write_str("upload"),
            Self::Download => f.write_str("download"),
        }
    }
}

/// State of one world
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WorldState {
    /// Nothing in flight
    #[default]
    Idle,
    /// Upload in flight
    Uploading,
    /// Download in flight
    Downloading,
    /// Last operation failed; cleared by the next start or an acknowledge
    Failed {
        /// Operation that failed
        operation: Operation,
        /// Human-readable cause
        message: String,
    },
}

/// Fieldless state tag used for transition checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKind {
    Idle,
    Uploading,
    Downloading,
    Failed,
}

impl WorldState {
    /// Running state for `operation`
    #[inline]
    #[must_use]
    pub fn running(operation: Operation) -> Self {
        match operation {
            Operation::Upload => Self::Uploading,
            Operation::Download => Self::Downloading,
        }
    }

    /// Operation in flight, if any
    #[inline]
    #[must_use]
    pub fn active_operation(&self) -> Option<Operation> {
        match self {
            Self::Uploading => Some(Operation::Upload),
            Self::Downloading => Some(Operation::Download),
            Self::Idle | Self::Failed { .. } => None,
        }
    }

    /// Failure message, if failed
    #[inline]
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Failed { message, .. } => Some(message),
            _ => None,
        }
    }

    /// Tag of this state
    #[inline]
    #[must_use]
    pub fn kind(&self) -> StateKind {
        match self {
            Self::Idle => StateKind::Idle,
            Self::Uploading => StateKind::Uploading,
            Self::Downloading => StateKind::Downloading,
            Self::Failed { .. } => StateKind::Failed,
        }
    }
}

/// States reachable from `from` in one step
#[must_use]
pub fn allowed_transitions(from: StateKind) -> &'static [StateKind] {
    use StateKind::{Downloading, Failed, Idle, Uploading};
    match from {
        Idle | Failed => &[Idle, Uploading, Downloading],
        Uploading | Downloading => &[Idle, Failed],
    }
}

/// Whether `from -> to` is a legal step
#[inline]
#[must_use]
pub fn is_allowed(from: StateKind, to: StateKind) -> bool {
    allowed_transitions(from).contains(&to)
}

/// Registry of world states
///
/// Entries are created on first use; a world never seen is `Idle`.
#[derive(Debug, Clone, Default)]
pub struct WorldLocks {
    states: Arc<DashMap<WorldName, WorldState>>,
}

impl WorldLocks {
    /// Empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter the running state for `operation`
    ///
    /// # Errors
    /// [`SyncError::Busy`] if an operation is already in flight for `world`.
    pub fn acquire(
        &self,
        world: &WorldName,
        operation: Operation,
    ) -> Result<WorldLease, SyncError> {
        let mut slot = self.states.entry(world.clone()).or_default();
        if let Some(active) = slot.active_operation() {
            return Err(SyncError::Busy {
                world: world.to_string(),
                active,
            });
        }

        let next = WorldState::running(operation);
        debug_assert!(is_allowed(slot.kind(), next.kind()));
        *slot = next;
        drop(slot);

        Ok(WorldLease {
            states: Arc::clone(&self.states),
            world: world.clone(),
            operation,
            settled: false,
        })
    }

    /// Current state of `world`
    #[must_use]
    pub fn state(&self, world: &str) -> WorldState {
        self.states
            .get(world)
            .map(|s| s.value().clone())
            .unwrap_or_default()
    }

    /// States of every world seen so far, sorted by name
    #[must_use]
    pub fn snapshot(&self) -> Vec<(WorldName, WorldState)> {
        let mut all: Vec<_> = self
            .states
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Move a failed world back to `Idle`
    ///
    /// Returns `false` if the world was not failed.
    pub fn acknowledge(&self, world: &str) -> bool {
        match self.states.get_mut(world) {
            Some(mut slot) if slot.kind() == StateKind::Failed => {
                *slot = WorldState::Idle;
                true
            }
            _ => false,
        }
    }
}

/// Exclusive right to run one operation on one world
#[derive(Debug)]
#[must_use = "dropping a lease immediately releases the world"]
pub struct WorldLease {
    states: Arc<DashMap<WorldName, WorldState>>,
    world: WorldName,
    operation: Operation,
    settled: bool,
}

impl WorldLease {
    /// World held by this lease
    #[inline]
    #[must_use]
    pub fn world(&self) -> &WorldName {
        &self.world
    }

    /// Operation being run
    #[inline]
    #[must_use]
    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Release into `Idle`
    pub fn succeed(mut self) {
        self.settle(WorldState::Idle);
    }

    /// Release into `Failed` with `message`
    pub fn fail(mut self, message: impl Into<String>) {
        let state = WorldState::Failed {
            operation: self.operation,
            message: message.into(),
        };
        self.settle(state);
    }

    fn settle(&mut self, next: WorldState) {
        if let Some(mut slot) = self.states.get_mut(&self.world) {
            debug_assert!(is_allowed(slot.kind(), next.kind()));
            *slot = next;
        }
        self.settled = true;
    }
}

impl Drop for WorldLease {
    fn drop(&mut self) {
        if !self.settled {
            tracing::warn!(
                world = %self.world,
                operation = %self.operation,
                "operation ended without settling; marking failed"
            );
            let state = WorldState::Failed {
                operation: self.operation,
                message: format!("{} aborted before completion", self.operation),
            };
            self.settle(state);
        }
    }
}
