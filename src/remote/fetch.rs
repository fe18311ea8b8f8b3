//! Fetching bundles from remotes into the local store.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::bundler::lock::{DEFAULT_WAIT_INTERVAL, lock_file};
use crate::bundler::manifest::Manifest;
use crate::bundler::store::{bundle_directory, lock_path};
use crate::error::{BundleError, Result};
use crate::remote::{Loader, Remote, RemoteSelection, TransportRegistry};

/// Tries every capable loader of the selected remotes in order until one
/// delivers the bundle.
pub struct Fetcher<'r> {
    bundles_root: PathBuf,
    remotes: Vec<Remote>,
    registry: &'r TransportRegistry,
    lock_key: Option<String>,
    wait_interval: Duration,
}

impl<'r> Fetcher<'r> {
    pub fn new(
        bundles_root: impl Into<PathBuf>,
        remotes: Vec<Remote>,
        registry: &'r TransportRegistry,
    ) -> Self {
        Self {
            bundles_root: bundles_root.into(),
            remotes,
            registry,
            lock_key: None,
            wait_interval: DEFAULT_WAIT_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_lock_key(mut self, key: Option<String>) -> Self {
        self.lock_key = key;
        self
    }

    #[must_use]
    pub const fn with_wait_interval(mut self, interval: Duration) -> Self {
        self.wait_interval = interval;
        self
    }

    /// Fetch `bundle_id` and return its local directory.
    ///
    /// Without a version, each loader's newest version is used. Loader
    /// failures are logged and the next candidate is tried.
    pub fn fetch(
        &self,
        bundle_id: &str,
        version: Option<u64>,
        selection: Option<&RemoteSelection>,
    ) -> Result<PathBuf> {
        let remotes = match selection {
            Some(selection) => selection.resolve(&self.remotes)?,
            None => self.remotes.clone(),
        };
        if remotes.is_empty() {
            return Err(BundleError::NoRemoteAvailable {
                id: bundle_id.to_string(),
                version,
            });
        }

        for remote in &remotes {
            for mut loader in remote.generate_loaders(self.registry) {
                if !loader.can_load(bundle_id, version) {
                    debug!(
                        remote = %remote.name,
                        loader = %loader.describe(),
                        "loader cannot provide bundle"
                    );
                    continue;
                }
                match self.try_loader(loader.as_mut(), bundle_id, version) {
                    Ok(Some(directory)) => {
                        info!(
                            bundle = %bundle_id,
                            remote = %remote.name,
                            directory = %directory.display(),
                            "fetched bundle"
                        );
                        return Ok(directory);
                    }
                    Ok(None) => {}
                    Err(err) => warn!(
                        bundle = %bundle_id,
                        remote = %remote.name,
                        loader = %loader.describe(),
                        error = %err,
                        "loader failed"
                    ),
                }
            }
        }

        Err(BundleError::NoBundleLoader {
            id: bundle_id.to_string(),
            version,
        })
    }

    /// `Ok(None)` means the loader had nothing to offer.
    fn try_loader(
        &self,
        loader: &mut dyn Loader,
        bundle_id: &str,
        version: Option<u64>,
    ) -> Result<Option<PathBuf>> {
        let version = match version {
            Some(version) => version,
            None => match loader.bundle_versions(bundle_id)?.into_iter().max() {
                Some(version) => version,
                None => {
                    warn!(
                        bundle = %bundle_id,
                        loader = %loader.describe(),
                        "loader reports no versions"
                    );
                    return Ok(None);
                }
            },
        };

        let target = bundle_directory(&self.bundles_root, bundle_id, version);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut lock = lock_file(
            lock_path(&self.bundles_root, bundle_id, version),
            self.lock_key.as_deref(),
            self.wait_interval,
        )?;

        if is_installed(&target, bundle_id, version) {
            debug!(directory = %target.display(), "bundle already present");
            lock.release()?;
            return Ok(Some(target));
        }

        loader.load(bundle_id, Some(version), &target)?;

        let manifest = Manifest::read_from_directory(&target)?;
        if manifest.id != bundle_id || manifest.version != version {
            // The archive was not what the index promised.
            if let Err(err) = fs::remove_dir_all(&target) {
                warn!(
                    directory = %target.display(),
                    error = %err,
                    "cannot remove mismatched bundle"
                );
            }
            return Err(BundleError::LoadFailed(format!(
                "loader delivered {} version {} instead of {bundle_id} version {version}",
                manifest.id, manifest.version
            )));
        }
        lock.release()?;
        Ok(Some(target))
    }
}

fn is_installed(directory: &std::path::Path, bundle_id: &str, version: u64) -> bool {
    Manifest::read_from_directory(directory)
        .is_ok_and(|manifest| manifest.id == bundle_id && manifest.version == version)
}
