//! Error types for the sync core
//!
//! [`SyncError`] is the caller-facing taxonomy:
//! - `InvalidArgument` and `Busy` are rejected before any lock or i/o
//! - `NotFound` and `TransferFailure` move the world to `Failed`
//! - `PersistenceFailure` means the transfer happened but the manifest was
//!   not saved; recover with a save retry, not another transfer

use crate::state::Operation;
use savesync_manifest::ManifestError;
use std::time::Duration;

/// Caller-facing sync error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// Empty or malformed world name
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Another operation is in flight for this world
    #[error("world {world} is busy: {active} in progress")]
    Busy {
        /// World that was requested
        world: String,
        /// Operation already running
        active: Operation,
    },

    /// Local folder or remote world missing
    #[error("not found: {0}")]
    NotFound(String),

    /// Transfer backend reported a failure
    #[error("transfer failed for {world}: {message}")]
    TransferFailure {
        /// World being transferred
        world: String,
        /// Backend message, opaque to the core
        message: String,
    },

    /// Manifest could not be loaded or saved
    #[error("manifest persistence failed: {message}")]
    PersistenceFailure {
        /// World whose commit failed, if any
        world: Option<String>,
        /// Store message
        message: String,
    },
}

/// Fieldless mirror of [`SyncError`] for matching and reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`SyncError::InvalidArgument`]
    InvalidArgument,
    /// See [`SyncError::Busy`]
    Busy,
    /// See [`SyncError::NotFound`]
    NotFound,
    /// See [`SyncError::TransferFailure`]
    TransferFailure,
    /// See [`SyncError::PersistenceFailure`]
    PersistenceFailure,
}

impl SyncError {
    /// Classification without payload
    #[inline]
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::Busy { .. } => ErrorKind::Busy,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::TransferFailure { .. } => ErrorKind::TransferFailure,
            Self::PersistenceFailure { .. } => ErrorKind::PersistenceFailure,
        }
    }

    /// Whether repeating the same operation later may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy { .. } | Self::TransferFailure { .. })
    }

    /// Whether the right recovery is to retry the manifest save
    #[inline]
    #[must_use]
    pub fn requires_save_retry(&self) -> bool {
        matches!(self, Self::PersistenceFailure { world: Some(_), .. })
    }

    /// Whether the error was raised before any lock or i/o
    #[inline]
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::InvalidArgument(_) | Self::Busy { .. })
    }

    pub(crate) fn persistence(world: Option<&str>, err: &ManifestError) -> Self {
        Self::PersistenceFailure {
            world: world.map(str::to_string),
            message: err.to_string(),
        }
    }
}

impl From<ManifestError> for SyncError {
    fn from(value: ManifestError) -> Self {
        match value {
            ManifestError::InvalidWorldName { .. } | ManifestError::NegativeValue { .. } => {
                Self::InvalidArgument(value.to_string())
            }
            other => Self::persistence(None, &other),
        }
    }
}

/// Local scan errors
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// World folder does not exist
    #[error("world folder {0} does not exist")]
    NotFound(String),

    /// Folder exists but could not be read
    #[error("failed to scan {path}: {source}")]
    Io {
        /// Path being read
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

/// Transfer backend errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransferError {
    /// Remote bucket or world prefix missing
    #[error("{0}")]
    NotFound(String),

    /// Any other backend failure
    #[error("{0}")]
    Failed(String),

    /// Backend gave up waiting
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl TransferError {
    /// Convert into the caller-facing error for `world`
    #[must_use]
    pub fn into_sync_error(self, world: &str) -> SyncError {
        match self {
            Self::NotFound(message) => SyncError::NotFound(message),
            other => SyncError::TransferFailure {
                world: world.to_string(),
                message: other.to_string(),
            },
        }
    }
}

impl ScanError {
    /// Convert into the caller-facing error for `world`
    ///
    /// Unreadable folders surface as transfer failures of the local side.
    #[must_use]
    pub fn into_sync_error(self, world: &str) -> SyncError {
        match self {
            Self::NotFound(path) => SyncError::NotFound(format!("world folder {path}")),
            io @ Self::Io { .. } => SyncError::TransferFailure {
                world: world.to_string(),
                message: io.to_string(),
            },
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read config {path}: {source}")]
    Read {
        /// Config path
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for [`crate::SyncConfig`]
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A required setting has no value from file, environment or platform
    #[error("missing setting {0}")]
    Missing(&'static str),

    /// Platform save directory could not be prepared
    #[error("failed to prepare {path}: {source}")]
    Io {
        /// Directory involved
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}
