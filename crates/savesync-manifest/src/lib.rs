//! savesync manifest
//!
//! Persisted backup state for tracked worlds.
//!
//! # Core Concepts
//!
//! - [`ManifestSnapshot`]: every tracked world plus the bound bucket
//! - [`WorldEntry`]: the files recorded for one world folder
//! - [`FileRecord`]: size and playtime of one file at backup time
//! - [`ManifestStore`]: crash-safe persistence of whole snapshots
//!
//! # Example
//!
//! ```rust,ignore
//! use savesync_manifest::{JsonFileStore, ManifestStore};
//!
//! let store = JsonFileStore::in_save_root(&save_root);
//! let snapshot = store.load().await?;
//! let found = store.exists().await?;
//! println!("{}", snapshot.stats().status_message(found));
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod error;
mod model;
mod name;
mod stats;
mod store;

pub use error::ManifestError;
pub use model::{FileRecord, ManifestSnapshot, WorldEntry};
pub use name::WorldName;
pub use stats::ManifestStats;
pub use store::{manifest_file_path, JsonFileStore, ManifestStore, MemoryStore, MANIFEST_FILE_NAME};
