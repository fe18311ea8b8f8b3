//! Deploying bundles to remotes.

use std::path::Path;

use serde::Serialize;
use tracing::{debug, info};

use crate::bundler::archive::{ArchiveInput, Unarchiver};
use crate::bundler::manifest::Manifest;
use crate::error::{BundleError, Result};
use crate::remote::{Remote, RemoteSelection, TransportRegistry};

/// Outcome of a deploy.
#[derive(Debug, Clone, Serialize)]
pub struct DeployReport {
    pub id: String,
    pub version: u64,
    /// `<remote>: <uploader>` for every upload performed, in order.
    pub uploads: Vec<String>,
}

/// Sends a bundle to every capable uploader of the selected remotes.
///
/// Deploys are all-or-nothing in order: the first uploader error aborts the
/// deploy. Uploads that already succeeded are not undone.
pub struct Deployer<'r> {
    remotes: Vec<Remote>,
    registry: &'r TransportRegistry,
}

impl<'r> Deployer<'r> {
    pub const fn new(remotes: Vec<Remote>, registry: &'r TransportRegistry) -> Self {
        Self { remotes, registry }
    }

    /// Deploy a bundle directory or archive file.
    pub fn deploy(
        &self,
        bundle_path: &Path,
        selection: Option<&RemoteSelection>,
    ) -> Result<DeployReport> {
        let manifest = validate_bundle_path(bundle_path)?;

        let remotes = match selection {
            Some(selection) => selection.resolve(&self.remotes)?,
            None => self.remotes.clone(),
        };
        if remotes.is_empty() {
            return Err(BundleError::NoRemoteAvailable {
                id: manifest.id,
                version: Some(manifest.version),
            });
        }

        let mut uploads = Vec::new();
        for remote in &remotes {
            for mut uploader in remote.generate_uploaders(self.registry) {
                if !uploader.can_upload(bundle_path) {
                    debug!(
                        remote = %remote.name,
                        uploader = %uploader.describe(),
                        "uploader declined bundle"
                    );
                    continue;
                }
                uploader.upload(bundle_path)?;
                uploads.push(format!("{}: {}", remote.name, uploader.describe()));
            }
        }

        info!(
            id = %manifest.id,
            version = manifest.version,
            uploads = uploads.len(),
            "deployed bundle"
        );
        Ok(DeployReport {
            id: manifest.id,
            version: manifest.version,
            uploads,
        })
    }
}

/// Check that `path` is a bundle directory or archive with a valid manifest.
pub fn validate_bundle_path(path: &Path) -> Result<Manifest> {
    if path.is_dir() {
        Manifest::read_from_directory(path)
    } else if path.is_file() {
        Unarchiver::read_manifest(&ArchiveInput::File(path.to_path_buf())).map_err(|err| match err {
            err @ BundleError::NotABundlePath { .. } => err,
            other => BundleError::not_a_bundle(path, format!("unreadable archive: {other}")),
        })
    } else {
        Err(BundleError::not_a_bundle(path, "path does not exist"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{AccessorConfig, Uploader};
    use crate::test_utils::fixtures::write_bundle_directory;
    use std::cell::RefCell;
    use std::rc::Rc;
    use tempfile::tempdir;

    struct RecordingUploader {
        name: String,
        fail: bool,
        calls: Rc<RefCell<Vec<String>>>,
    }

    impl Uploader for RecordingUploader {
        fn describe(&self) -> String {
            self.name.clone()
        }

        fn can_upload(&self, _bundle_path: &Path) -> bool {
            true
        }

        fn upload(&mut self, _bundle_path: &Path) -> Result<()> {
            self.calls.borrow_mut().push(self.name.clone());
            if self.fail {
                return Err(BundleError::UploadFailed(format!("{} refused", self.name)));
            }
            Ok(())
        }
    }

    fn recording_registry(calls: &Rc<RefCell<Vec<String>>>) -> TransportRegistry {
        let calls = Rc::clone(calls);
        let mut registry = TransportRegistry::new();
        registry.register_uploader(move |config: &AccessorConfig| -> Option<Box<dyn Uploader>> {
            let spec = config.url_str()?.strip_prefix("rec:")?;
            let (name, fail) = spec
                .strip_suffix(":fail")
                .map_or((spec, false), |name| (name, true));
            Some(Box::new(RecordingUploader {
                name: name.to_string(),
                fail,
                calls: Rc::clone(&calls),
            }))
        });
        registry
    }

    fn remote(name: &str, urls: &[&str]) -> Remote {
        urls.iter().fold(Remote::new(name), |remote, url| {
            remote.with_accessor(AccessorConfig::url(*url))
        })
    }

    #[test]
    fn uploads_to_every_matching_uploader() {
        let dir = tempdir().unwrap();
        let bundle = write_bundle_directory(dir.path(), "ex", 1);
        let calls = Rc::new(RefCell::new(Vec::new()));
        let registry = recording_registry(&calls);
        let remotes = vec![remote("a", &["rec:one", "rec:two"]), remote("b", &["rec:three"])];

        let report = Deployer::new(remotes, &registry)
            .deploy(&bundle, None)
            .unwrap();
        assert_eq!(*calls.borrow(), vec!["one", "two", "three"]);
        assert_eq!(report.uploads, vec!["a: one", "a: two", "b: three"]);
        assert_eq!(report.id, "ex");
    }

    #[test]
    fn first_failure_aborts_deploy() {
        let dir = tempdir().unwrap();
        let bundle = write_bundle_directory(dir.path(), "ex", 1);
        let calls = Rc::new(RefCell::new(Vec::new()));
        let registry = recording_registry(&calls);
        let remotes = vec![remote("a", &["rec:one", "rec:two:fail", "rec:three"])];

        let err = Deployer::new(remotes, &registry)
            .deploy(&bundle, None)
            .unwrap_err();
        assert!(matches!(err, BundleError::UploadFailed(_)));
        assert_eq!(*calls.borrow(), vec!["one", "two"]);
    }

    #[test]
    fn invalid_paths_are_rejected_before_uploading() {
        let dir = tempdir().unwrap();
        let calls = Rc::new(RefCell::new(Vec::new()));
        let registry = recording_registry(&calls);
        let deployer = Deployer::new(vec![remote("a", &["rec:one"])], &registry);

        let missing = deployer.deploy(&dir.path().join("absent"), None).unwrap_err();
        assert!(matches!(missing, BundleError::NotABundlePath { .. }));

        std::fs::write(dir.path().join("manifest"), "{}").unwrap();
        let bad_manifest = deployer.deploy(dir.path(), None).unwrap_err();
        assert!(matches!(bad_manifest, BundleError::NotABundlePath { .. }));

        let junk = dir.path().join("junk.tar.xz");
        std::fs::write(&junk, b"junk").unwrap();
        assert!(matches!(
            deployer.deploy(&junk, None).unwrap_err(),
            BundleError::NotABundlePath { .. }
        ));
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn no_remotes_is_an_error() {
        let dir = tempdir().unwrap();
        let bundle = write_bundle_directory(dir.path(), "ex", 1);
        let registry = TransportRegistry::new();
        let err = Deployer::new(vec![], &registry)
            .deploy(&bundle, None)
            .unwrap_err();
        match err {
            BundleError::NoRemoteAvailable { id, version } => {
                assert_eq!(id, "ex");
                assert_eq!(version, Some(1));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
