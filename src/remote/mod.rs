//! Remotes and the loader/uploader protocol.
//!
//! A [`Remote`] is a pure description: a name plus ordered
//! [`AccessorConfig`]s. Transports are chosen by capability: each factory in
//! a [`TransportRegistry`] is asked whether it can serve a config, and those
//! that can produce a [`Loader`] or [`Uploader`] for it.

pub mod deploy;
pub mod fetch;
pub mod fs;
pub mod http;
mod registry;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BundleError, Result};

pub use deploy::Deployer;
pub use fetch::Fetcher;
pub use registry::{LoaderFactory, TransportRegistry, UploaderFactory};

/// Connection parameters for reaching a remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AccessorConfig {
    /// A bare URL.
    Url { url: String },
    /// An HTTPS URL with an optional PEM root certificate to trust.
    Https {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ca_certificate: Option<PathBuf>,
    },
    /// A directory holding `<urlencoded-id>/<version>.tar.xz` archives.
    Directory { path: PathBuf },
}

impl AccessorConfig {
    pub fn url(url: impl Into<String>) -> Self {
        Self::Url { url: url.into() }
    }

    pub fn directory(path: impl Into<PathBuf>) -> Self {
        Self::Directory { path: path.into() }
    }

    /// URL for URL-shaped configs.
    pub fn url_str(&self) -> Option<&str> {
        match self {
            Self::Url { url } | Self::Https { url, .. } => Some(url),
            Self::Directory { .. } => None,
        }
    }
}

/// A named source and sink of bundles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Remote {
    pub name: String,
    #[serde(default)]
    pub accessors: Vec<AccessorConfig>,
}

impl Remote {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            accessors: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_accessor(mut self, config: AccessorConfig) -> Self {
        self.accessors.push(config);
        self
    }

    /// One loader per (accessor, factory) pair the factory accepts, in
    /// accessor order.
    pub fn generate_loaders(&self, registry: &TransportRegistry) -> Vec<Box<dyn Loader>> {
        self.accessors
            .iter()
            .flat_map(|config| registry.loaders_for(config))
            .collect()
    }

    /// Uploader counterpart of [`Remote::generate_loaders`].
    pub fn generate_uploaders(&self, registry: &TransportRegistry) -> Vec<Box<dyn Uploader>> {
        self.accessors
            .iter()
            .flat_map(|config| registry.uploaders_for(config))
            .collect()
    }
}

/// Which remotes a fetch or deploy uses: configured remotes picked by name
/// plus ad-hoc ones. With neither, every configured remote is used.
#[derive(Debug, Clone, Default)]
pub struct RemoteSelection {
    pub names: Vec<String>,
    pub extra: Vec<Remote>,
}

impl RemoteSelection {
    pub fn is_empty(&self) -> bool {
        self.names.is_empty() && self.extra.is_empty()
    }

    /// Resolve against the configured remotes. Unknown names are an error.
    pub fn resolve(&self, configured: &[Remote]) -> Result<Vec<Remote>> {
        if self.is_empty() {
            return Ok(configured.to_vec());
        }
        let mut selected = Vec::with_capacity(self.names.len() + self.extra.len());
        for name in &self.names {
            let remote = configured
                .iter()
                .find(|remote| &remote.name == name)
                .ok_or_else(|| BundleError::Config(format!("unknown remote: {name}")))?;
            selected.push(remote.clone());
        }
        selected.extend(self.extra.iter().cloned());
        Ok(selected)
    }
}

/// Pulls bundle archives from one remote accessor into a local directory.
pub trait Loader {
    /// Short description for logs.
    fn describe(&self) -> String;

    /// Whether this loader can provide `bundle_id`; with no version, whether
    /// it has any version at all.
    fn can_load(&mut self, bundle_id: &str, version: Option<u64>) -> bool;

    /// Versions available for `bundle_id`.
    fn bundle_versions(&mut self, bundle_id: &str) -> Result<Vec<u64>>;

    /// Load the bundle into `base_directory`, which must be empty or absent.
    fn load(&mut self, bundle_id: &str, version: Option<u64>, base_directory: &Path) -> Result<()>;
}

/// Pushes a bundle directory or archive to one remote accessor.
pub trait Uploader {
    fn describe(&self) -> String;

    fn can_upload(&self, bundle_path: &Path) -> bool;

    fn upload(&mut self, bundle_path: &Path) -> Result<()>;
}
