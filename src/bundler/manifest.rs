//! Bundle manifest: the identity record persisted at the root of every
//! bundle version and archive.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{BundleError, Result};

/// Newest manifest schema this crate reads and writes.
pub const CURRENT_MANIFEST_VERSION: u32 = 1;

/// Name of the manifest file at the root of a bundle directory or archive.
pub const MANIFEST_FILE: &str = "manifest";

/// Persisted identity record of an installed or archived bundle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Manifest {
    pub manifest_version: u32,
    pub id: String,
    pub version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_context_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imports_context_key: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<DependencyRef>,
}

/// Reference to another bundle by id and optional version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct DependencyRef {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
}

impl Manifest {
    pub fn new(id: impl Into<String>, version: u64) -> Self {
        Self {
            manifest_version: CURRENT_MANIFEST_VERSION,
            id: id.into(),
            version,
            default_context_key: None,
            imports_context_key: None,
            dependencies: Vec::new(),
        }
    }

    /// Parse and validate manifest JSON. `origin` is only used for error
    /// reporting.
    pub fn from_json_slice(bytes: &[u8], origin: &Path) -> Result<Self> {
        let manifest: Self = serde_json::from_slice(bytes).map_err(|err| {
            BundleError::not_a_bundle(origin, format!("invalid manifest: {err}"))
        })?;
        manifest.validate(origin)?;
        Ok(manifest)
    }

    /// Read and validate `<directory>/manifest`.
    pub fn read_from_directory(directory: &Path) -> Result<Self> {
        let path = directory.join(MANIFEST_FILE);
        let bytes = std::fs::read(&path).map_err(|err| {
            BundleError::not_a_bundle(directory, format!("cannot read manifest: {err}"))
        })?;
        Self::from_json_slice(&bytes, directory)
    }

    pub fn validate(&self, origin: &Path) -> Result<()> {
        if self.manifest_version < 1 || self.manifest_version > CURRENT_MANIFEST_VERSION {
            return Err(BundleError::not_a_bundle(
                origin,
                format!(
                    "manifest_version {} is outside the supported range 1..={CURRENT_MANIFEST_VERSION}",
                    self.manifest_version
                ),
            ));
        }
        if self.id.trim().is_empty() {
            return Err(BundleError::not_a_bundle(origin, "manifest id must be non-empty"));
        }
        if self.version == 0 {
            return Err(BundleError::not_a_bundle(
                origin,
                "manifest version must be a positive integer",
            ));
        }
        Ok(())
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn write_to_directory(&self, directory: &Path) -> Result<()> {
        std::fs::write(directory.join(MANIFEST_FILE), self.to_json_string()?)?;
        Ok(())
    }
}
