//! Error handling for bundlekit.
//!
//! - [`BundleError`]: the error enum for every bundle operation
//! - [`ErrorCategory`]: coarse classification used by callers to decide
//!   whether a failure is worth retrying with more remotes or versions

use std::fmt;
use std::io;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Which part of an archive member escaped the target directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveViolation {
    /// The member's own path resolves outside the target.
    Path,
    /// The member is a symlink or hardlink whose target resolves outside.
    Link,
}

impl fmt::Display for ArchiveViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path => write!(f, "path"),
            Self::Link => write!(f, "link target"),
        }
    }
}

/// Main error type for bundle operations.
#[derive(Error, Debug)]
pub enum BundleError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Not a bundle path: {}: {reason}", .path.display())]
    NotABundlePath { path: PathBuf, reason: String },

    #[error(
        "Target directory {} does not match the expected bundle directory {}",
        .actual.display(),
        .expected.display()
    )]
    TargetDirectoryMismatch { expected: PathBuf, actual: PathBuf },

    #[error("Bundle not found: {id}{}: {reason}", version_suffix(.version))]
    BundleNotFound {
        id: String,
        version: Option<u64>,
        reason: String,
    },

    #[error("No loader could load bundle {id}{}", version_suffix(.version))]
    NoBundleLoader { id: String, version: Option<u64> },

    #[error("No remotes available for bundle {id}{}", version_suffix(.version))]
    NoRemoteAvailable { id: String, version: Option<u64> },

    #[error(
        "Bundle {id} (version {version}) imports contexts outside it and its dependencies: {}",
        .ids.join(", ")
    )]
    UncoveredImports {
        id: String,
        version: u64,
        ids: Vec<String>,
    },

    #[error(
        "Archive member {member} has an unsafe {kind}: it resolves outside {}",
        .target.display()
    )]
    BadArchiveFilePath {
        member: String,
        kind: ArchiveViolation,
        target: PathBuf,
    },

    #[error("Load failed: {0}")]
    LoadFailed(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Explicitly included file does not exist: {}", .0.display())]
    MissingInclude(PathBuf),

    #[error("Invalid descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Bundle {id} (version {version}) failed verification: {problems} problem(s)")]
    VerificationFailed {
        id: String,
        version: u64,
        problems: usize,
    },
}

/// Coarse error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    PathValidation,
    NotFound,
    InstallFailed,
    Security,
    Transient,
    Io,
    Config,
}

impl BundleError {
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::NotABundlePath { .. } | Self::TargetDirectoryMismatch { .. } => {
                ErrorCategory::PathValidation
            }
            Self::BundleNotFound { .. }
            | Self::NoBundleLoader { .. }
            | Self::NoRemoteAvailable { .. } => ErrorCategory::NotFound,
            Self::UncoveredImports { .. } | Self::MissingInclude(_) => ErrorCategory::InstallFailed,
            Self::BadArchiveFilePath { .. } | Self::VerificationFailed { .. } => {
                ErrorCategory::Security
            }
            Self::LoadFailed(_) | Self::UploadFailed(_) | Self::Http(_) => ErrorCategory::Transient,
            Self::Io(_) | Self::Json(_) | Self::Yaml(_) => ErrorCategory::Io,
            Self::InvalidDescriptor(_) | Self::Config(_) => ErrorCategory::Config,
        }
    }

    /// Whether supplying more remotes or versions could make the call succeed.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::NotFound | ErrorCategory::Transient
        )
    }

    pub(crate) fn not_a_bundle(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::NotABundlePath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn not_found(id: &str, version: Option<u64>, reason: impl Into<String>) -> Self {
        Self::BundleNotFound {
            id: id.to_string(),
            version,
            reason: reason.into(),
        }
    }
}

fn version_suffix(version: &Option<u64>) -> String {
    version.map(|v| format!(" (version {v})")).unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, BundleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundle_not_found_names_version() {
        let err = BundleError::not_found("ex", Some(3), "directory does not exist");
        let message = err.to_string();
        assert!(message.contains("ex"));
        assert!(message.contains("version 3"));
        assert!(message.contains("directory does not exist"));
    }

    #[test]
    fn categories_follow_taxonomy() {
        assert_eq!(
            BundleError::NoRemoteAvailable {
                id: "ex".into(),
                version: None,
            }
            .category(),
            ErrorCategory::NotFound
        );
        assert_eq!(
            BundleError::UncoveredImports {
                id: "ex".into(),
                version: 1,
                ids: vec![],
            }
            .category(),
            ErrorCategory::InstallFailed
        );
        assert_eq!(
            BundleError::BadArchiveFilePath {
                member: "../evil".into(),
                kind: ArchiveViolation::Path,
                target: PathBuf::from("/tmp/x"),
            }
            .category(),
            ErrorCategory::Security
        );
        assert!(BundleError::LoadFailed("x".into()).is_recoverable());
        assert!(!BundleError::not_a_bundle("/x", "no manifest").is_recoverable());
    }

    #[test]
    fn uncovered_imports_lists_ids() {
        let err = BundleError::UncoveredImports {
            id: "http://example.org/bundle".into(),
            version: 4,
            ids: vec!["http://a".into(), "http://b".into()],
        };
        let message = err.to_string();
        assert!(message.contains("http://example.org/bundle (version 4)"));
        assert!(message.contains("http://a, http://b"));
    }

    #[test]
    fn no_remote_available_names_bundle() {
        let err = BundleError::NoRemoteAvailable {
            id: "ex".into(),
            version: Some(2),
        };
        assert_eq!(err.to_string(), "No remotes available for bundle ex (version 2)");
        let err = BundleError::NoRemoteAvailable {
            id: "ex".into(),
            version: None,
        };
        assert_eq!(err.to_string(), "No remotes available for bundle ex");
    }
}
