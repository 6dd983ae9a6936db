//! World names
//!
//! Provides [`WorldName`], the validated identifier that is at once the local
//! folder name, the manifest key and the default remote prefix.

use crate::error::ManifestError;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Validated world identifier
///
/// A world name must be usable as a single directory component:
/// - non-empty, without leading or trailing whitespace
/// - no `/` or `\` separators
/// - not `.` or `..`
/// - no control characters
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WorldName(String);

impl WorldName {
    /// Parse and validate a world name
    ///
    /// # Errors
    /// Returns [`ManifestError::InvalidWorldName`] describing the first rule broken.
    pub fn parse(name: impl Into<String>) -> Result<Self, ManifestError> {
        let name = name.into();
        let reason = if name.is_empty() {
            Some("name is empty")
        } else if name.trim() != name {
            Some("name has surrounding whitespace")
        } else if name == "." || name == ".." {
            Some("name is a relative directory marker")
        } else if name.contains(['/', '\\']) {
            Some("name contains a path separator")
        } else if name.chars().any(char::is_control) {
            Some("name contains control characters")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(ManifestError::InvalidWorldName { name, reason }),
            None => Ok(Self(name)),
        }
    }

    /// Borrow as `&str`
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the inner string
    #[inline]
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Display for WorldName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for WorldName {
    type Err = ManifestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for WorldName {
    type Error = ManifestError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<WorldName> for String {
    fn from(value: WorldName) -> Self {
        value.0
    }
}

impl AsRef<str> for WorldName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for WorldName {
    fn borrow(&self) -> &str {
        &self.0
    }
}
