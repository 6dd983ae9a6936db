//! savesync change detection
//!
//! Compares a fresh local scan with the last manifest entry of a world and
//! partitions every path into added, modified, removed or unchanged.
//!
//! # Policy
//!
//! - Equality is by file size only. Playtime is metadata, not a change signal.
//! - A previous record with an unknown size is always `modified`.
//! - With no previous entry every scanned file is `added`.
//!
//! # Example
//!
//! ```rust,ignore
//! use savesync_detect::{diff, ScannedFile};
//!
//! let scan = vec![ScannedFile::new("save.dat", 1000, 0)];
//! let changes = diff(&scan, snapshot.get_world("Alpha"));
//! if changes.is_empty() {
//!     // nothing to transfer
//! }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod change_set;
mod scan;

pub use change_set::{diff, ChangeKind, ChangeSet};
pub use scan::{world_entry_from_scan, ScannedFile};
