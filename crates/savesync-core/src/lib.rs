//! savesync core
//!
//! Manifest-driven backup sync of world folders.
//!
//! # Core Concepts
//!
//! - [`SyncOrchestrator`]: single-flight uploads and downloads per world
//! - [`RefreshChannel`]: latest-snapshot notifications for observers
//! - [`LocalScanner`] / [`TransferBackend`]: the two i/o collaborators
//! - [`WorldState`]: `Idle`, `Uploading`, `Downloading` or `Failed`
//!
//! # Example
//!
//! ```rust,ignore
//! use savesync_core::prelude::*;
//! use std::sync::Arc;
//!
//! let local = SyncConfig::new().apply_env().local_collaborators()?;
//! let orchestrator = SyncOrchestrator::builder(
//!     Arc::new(local.store),
//!     Arc::new(local.scanner),
//!     Arc::new(local.backend),
//! )
//! .build()
//! .await?;
//!
//! let report = orchestrator.run_upload("Alpha").await?;
//! println!("sent {} files", report.files_transferred);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod backend;
pub mod clock;
pub mod config;
pub mod error;
mod fs;
pub mod orchestrator;
pub mod progress;
pub mod refresh;
pub mod scanner;
pub mod state;
pub mod types;

pub use backend::{DirBackend, RemoteFile, TransferBackend};
pub use clock::{Clock, SystemClock};
pub use config::{LocalCollaborators, SyncConfig};
pub use error::{ConfigError, ErrorKind, ScanError, SyncError, TransferError};
pub use orchestrator::{OrchestratorBuilder, SyncOrchestrator};
pub use progress::{ProgressReporter, TransferProgress};
pub use refresh::{ManifestUpdate, RefreshChannel, RefreshSubscription};
pub use scanner::{FsScanner, LocalScan, LocalScanner};
pub use state::{Operation, WorldLease, WorldLocks, WorldState};
pub use types::{OperationId, SyncReport};

/// Current version of savesync core
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude for common imports
pub mod prelude {
    //! Common imports for driving a sync orchestrator
    pub use crate::{
        LocalScanner, ManifestUpdate, Operation, RefreshSubscription, SyncConfig, SyncError,
        SyncOrchestrator, SyncReport, TransferBackend, TransferProgress, WorldState,
    };
    pub use savesync_detect::ChangeSet;
    pub use savesync_manifest::{ManifestSnapshot, ManifestStats, WorldName};
}
