//! Transfer progress events
//!
//! Backends report through a [`ProgressReporter`]; observers receive
//! [`TransferProgress`] events from a lossy broadcast. Progress is advisory:
//! a slow observer may miss events, and no event changes the manifest.

use crate::state::Operation;
use crate::types::OperationId;
use parking_lot::Mutex;
use savesync_manifest::WorldName;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

/// One progress event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferProgress {
    /// Operation this event belongs to
    pub operation_id: OperationId,
    /// World being transferred
    pub world: WorldName,
    /// Direction
    pub operation: Operation,
    /// Bytes done so far
    pub transferred_bytes: u64,
    /// Bytes expected in total
    pub total_bytes: u64,
    /// File just finished, empty for the opening event
    pub current_file: String,
    /// Time since the transfer started
    pub elapsed: Duration,
}

impl TransferProgress {
    /// Completed fraction in `0.0..=1.0`
    #[inline]
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            1.0
        } else {
            (self.transferred_bytes as f64 / self.total_bytes as f64).min(1.0)
        }
    }
}

/// Handle a backend uses to report progress for one operation
#[derive(Debug)]
pub struct ProgressReporter {
    operation_id: OperationId,
    world: WorldName,
    operation: Operation,
    started: Instant,
    counters: Mutex<Counters>,
    sender: Option<broadcast::Sender<TransferProgress>>,
}

#[derive(Debug, Default)]
struct Counters {
    transferred: u64,
    total: u64,
    files: usize,
}

impl ProgressReporter {
    pub(crate) fn new(
        operation_id: OperationId,
        world: WorldName,
        operation: Operation,
        sender: broadcast::Sender<TransferProgress>,
    ) -> Self {
        Self {
            operation_id,
            world,
            operation,
            started: Instant::now(),
            counters: Mutex::new(Counters::default()),
            sender: Some(sender),
        }
    }

    /// Reporter that drops every event
    #[must_use]
    pub fn disabled(world: WorldName, operation: Operation) -> Self {
        Self {
            operation_id: OperationId::new(),
            world,
            operation,
            started: Instant::now(),
            counters: Mutex::new(Counters::default()),
            sender: None,
        }
    }

    /// Announce the total and emit the opening event
    pub fn begin(&self, total_bytes: u64) {
        let event = {
            let mut counters = self.counters.lock();
            counters.total = total_bytes;
            counters.transferred = 0;
            counters.files = 0;
            self.event(&counters, String::new())
        };
        self.emit(event);
    }

    /// Record one finished file
    pub fn file_done(&self, path: &str, bytes: u64) {
        let event = {
            let mut counters = self.counters.lock();
            counters.transferred = counters.transferred.saturating_add(bytes);
            counters.files += 1;
            self.event(&counters, path.to_string())
        };
        self.emit(event);
    }

    /// Bytes reported so far
    #[inline]
    #[must_use]
    pub fn transferred_bytes(&self) -> u64 {
        self.counters.lock().transferred
    }

    /// Files reported done so far
    #[inline]
    #[must_use]
    pub fn files_done(&self) -> usize {
        self.counters.lock().files
    }

    /// Operation id stamped on events
    #[inline]
    #[must_use]
    pub fn operation_id(&self) -> OperationId {
        self.operation_id
    }

    fn event(&self, counters: &Counters, current_file: String) -> TransferProgress {
        TransferProgress {
            operation_id: self.operation_id,
            world: self.world.clone(),
            operation: self.operation,
            transferred_bytes: counters.transferred,
            total_bytes: counters.total,
            current_file,
            elapsed: self.started.elapsed(),
        }
    }

    fn emit(&self, event: TransferProgress) {
        if let Some(sender) = &self.sender {
            // No subscribers is not an error.
            let _ = sender.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alpha() -> WorldName {
        WorldName::parse("Alpha").unwrap()
    }

    #[tokio::test]
    async fn events_accumulate_bytes() {
        let (tx, mut rx) = broadcast::channel(8);
        let reporter = ProgressReporter::new(OperationId::new(), alpha(), Operation::Upload, tx);

        reporter.begin(300);
        reporter.file_done("a", 100);
        reporter.file_done("b", 200);

        let opening = rx.recv().await.unwrap();
        assert_eq!(opening.transferred_bytes, 0);
        assert_eq!(opening.total_bytes, 300);
        assert!(opening.current_file.is_empty());

        let first = rx.recv().await.unwrap();
        assert_eq!(first.current_file, "a");
        assert_eq!(first.transferred_bytes, 100);

        let last = rx.recv().await.unwrap();
        assert_eq!(last.transferred_bytes, 300);
        assert!((last.fraction() - 1.0).abs() < f64::EPSILON);
        assert_eq!(reporter.transferred_bytes(), 300);
    }

    #[test]
    fn disabled_reporter_still_counts() {
        let reporter = ProgressReporter::disabled(alpha(), Operation::Download);
        reporter.begin(10);
        reporter.file_done("x", 4);
        assert_eq!(reporter.transferred_bytes(), 4);
        assert_eq!(reporter.files_done(), 1);
    }

    #[test]
    fn empty_transfer_is_complete() {
        let reporter = ProgressReporter::disabled(alpha(), Operation::Upload);
        reporter.begin(0);
        let event = reporter.event(&reporter.counters.lock(), String::new());
        assert!((event.fraction() - 1.0).abs() < f64::EPSILON);
    }
}
