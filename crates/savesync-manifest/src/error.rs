//! Error types for the manifest model and store

/// Manifest model and persistence errors
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// World name is empty or not usable as a folder name
    #[error("invalid world name {name:?}: {reason}")]
    InvalidWorldName {
        /// Rejected input
        name: String,
        /// Why it was rejected
        reason: &'static str,
    },

    /// A counter that must be non-negative was negative
    #[error("{field} must be non-negative, got {value}")]
    NegativeValue {
        /// Field name
        field: &'static str,
        /// Rejected value
        value: i64,
    },

    /// Snapshot violates a structural invariant
    #[error("inconsistent manifest: {0}")]
    Inconsistent(String),

    /// Reading or writing the persisted manifest failed
    #[error("manifest i/o failed at {path}: {source}")]
    Io {
        /// File involved
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Persisted manifest could not be encoded or decoded
    #[error("manifest serialization failed: {0}")]
    Serialization(String),
}

impl ManifestError {
    /// Wrap an i/o error with the path it happened on
    #[inline]
    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    /// Whether this error came from the persistence layer
    #[inline]
    #[must_use]
    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::Serialization(_))
    }
}

impl From<serde_json::Error> for ManifestError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_display_names_path() {
        let err = ManifestError::io(
            "/tmp/manifest.json",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let text = err.to_string();
        assert!(text.contains("/tmp/manifest.json"));
        assert!(text.contains("denied"));
        assert!(err.is_persistence());
    }

    #[test]
    fn validation_errors_are_not_persistence() {
        let err = ManifestError::NegativeValue {
            field: "playtime",
            value: -1,
        };
        assert!(!err.is_persistence());
        assert_eq!(err.to_string(), "playtime must be non-negative, got -1");
    }
}
