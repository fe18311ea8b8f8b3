//! Local-directory transport.
//!
//! A remote directory holds `<urlencoded-id>/<version>.tar.xz` archives.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::bundler::archive::{ARCHIVE_EXTENSION, ArchiveInput, Unarchiver, pack_directory};
use crate::bundler::manifest::Manifest;
use crate::bundler::store::{encode_id, parse_version};
use crate::error::{BundleError, Result};
use crate::remote::{AccessorConfig, Loader, LoaderFactory, Uploader, UploaderFactory};

pub struct DirectoryLoaderFactory;

impl LoaderFactory for DirectoryLoaderFactory {
    fn try_load(&self, config: &AccessorConfig) -> Option<Box<dyn Loader>> {
        match config {
            AccessorConfig::Directory { path } => {
                Some(Box::new(DirectoryLoader::new(path.clone())))
            }
            _ => None,
        }
    }
}

pub struct DirectoryUploaderFactory;

impl UploaderFactory for DirectoryUploaderFactory {
    fn try_upload(&self, config: &AccessorConfig) -> Option<Box<dyn Uploader>> {
        match config {
            AccessorConfig::Directory { path } => {
                Some(Box::new(DirectoryUploader::new(path.clone())))
            }
            _ => None,
        }
    }
}

fn archive_path(root: &Path, bundle_id: &str, version: u64) -> PathBuf {
    root.join(encode_id(bundle_id))
        .join(format!("{version}.{ARCHIVE_EXTENSION}"))
}

pub struct DirectoryLoader {
    root: PathBuf,
}

impl DirectoryLoader {
    pub const fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn versions(&self, bundle_id: &str) -> Result<Vec<u64>> {
        let dir = self.root.join(encode_id(bundle_id));
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let suffix = format!(".{ARCHIVE_EXTENSION}");
        let mut versions = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(stem) = name.to_str().and_then(|n| n.strip_suffix(&suffix)) else {
                continue;
            };
            match parse_version(stem) {
                Some(version) if entry.path().is_file() => versions.push(version),
                Some(_) => {}
                None => warn!(
                    directory = %dir.display(),
                    file = %name.to_string_lossy(),
                    "skipping archive with non-numeric version"
                ),
            }
        }
        versions.sort_unstable();
        Ok(versions)
    }
}

impl Loader for DirectoryLoader {
    fn describe(&self) -> String {
        format!("directory {}", self.root.display())
    }

    fn can_load(&mut self, bundle_id: &str, version: Option<u64>) -> bool {
        match version {
            Some(version) => archive_path(&self.root, bundle_id, version).is_file(),
            None => self
                .versions(bundle_id)
                .is_ok_and(|versions| !versions.is_empty()),
        }
    }

    fn bundle_versions(&mut self, bundle_id: &str) -> Result<Vec<u64>> {
        self.versions(bundle_id)
    }

    fn load(&mut self, bundle_id: &str, version: Option<u64>, base_directory: &Path) -> Result<()> {
        let version = match version {
            Some(version) => version,
            None => self.versions(bundle_id)?.pop().ok_or_else(|| {
                BundleError::LoadFailed(format!(
                    "no archives for {bundle_id} under {}",
                    self.root.display()
                ))
            })?,
        };
        let path = archive_path(&self.root, bundle_id, version);
        if !path.is_file() {
            return Err(BundleError::LoadFailed(format!(
                "{} does not exist",
                path.display()
            )));
        }
        Unarchiver::new(None).unpack(&ArchiveInput::File(path), Some(base_directory))?;
        Ok(())
    }
}

pub struct DirectoryUploader {
    root: PathBuf,
}

impl DirectoryUploader {
    pub const fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

impl Uploader for DirectoryUploader {
    fn describe(&self) -> String {
        format!("directory {}", self.root.display())
    }

    fn can_upload(&self, bundle_path: &Path) -> bool {
        bundle_path.exists()
    }

    fn upload(&mut self, bundle_path: &Path) -> Result<()> {
        let manifest = if bundle_path.is_dir() {
            Manifest::read_from_directory(bundle_path)?
        } else {
            Unarchiver::read_manifest(&ArchiveInput::File(bundle_path.to_path_buf()))?
        };
        let target = archive_path(&self.root, &manifest.id, manifest.version);
        let parent = target
            .parent()
            .ok_or_else(|| BundleError::UploadFailed(format!("bad target {}", target.display())))?;
        fs::create_dir_all(parent)?;

        // Written next to the target and renamed so readers never see a
        // partial archive.
        let temp = NamedTempFile::new_in(parent)?;
        if bundle_path.is_dir() {
            pack_directory(bundle_path, temp.reopen()?)?.sync_all()?;
        } else {
            fs::copy(bundle_path, temp.path())?;
        }
        temp.persist(&target).map_err(|err| BundleError::Io(err.error))?;
        info!(path = %bundle_path.display(), target = %target.display(), "stored bundle archive");
        Ok(())
    }
}
