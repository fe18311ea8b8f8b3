//! Bundle archives: `tar` streams compressed with xz.
//!
//! The archive root holds `./manifest` with `graphs/` and `files/` as
//! siblings. Extraction validates the manifest before anything touches the
//! disk and refuses members (or link targets) that resolve outside the
//! target directory.

use std::borrow::Cow;
use std::fs::{self, File};
use std::io::{self, Cursor, Read, Write};
use std::path::{Component, Path, PathBuf};

use tar::{Archive, Builder, EntryType};
use tracing::{debug, warn};
use walkdir::WalkDir;
use xz2::read::XzDecoder;
use xz2::write::XzEncoder;

use crate::bundler::manifest::{MANIFEST_FILE, Manifest};
use crate::bundler::store::{FILES_DIR, GRAPHS_DIR, bundle_directory, encode_id};
use crate::error::{ArchiveViolation, BundleError, Result};

/// MIME type used when transferring archives.
pub const ARCHIVE_MIME_TYPE: &str = "application/x-gtar";

/// File extension of packed bundles.
pub const ARCHIVE_EXTENSION: &str = "tar.xz";

/// Maximum manifest size accepted from an archive (1 MB).
const MAX_MANIFEST_SIZE: u64 = 1024 * 1024;

const XZ_LEVEL: u32 = 6;

/// Where archive bytes come from.
#[derive(Debug, Clone)]
pub enum ArchiveInput {
    File(PathBuf),
    Bytes(Vec<u8>),
}

impl ArchiveInput {
    fn open(&self) -> Result<Archive<XzDecoder<Box<dyn Read + '_>>>> {
        let reader: Box<dyn Read + '_> = match self {
            Self::File(path) => Box::new(File::open(path)?),
            Self::Bytes(bytes) => Box::new(Cursor::new(bytes.as_slice())),
        };
        Ok(Archive::new(XzDecoder::new(reader)))
    }

    fn origin(&self) -> PathBuf {
        match self {
            Self::File(path) => path.clone(),
            Self::Bytes(_) => PathBuf::from("<in-memory archive>"),
        }
    }
}

// =============================================================================
// PACKING
// =============================================================================

/// Packs installed bundles into archives.
#[derive(Debug, Clone)]
pub struct Archiver {
    bundles_root: PathBuf,
    archives_directory: PathBuf,
}

impl Archiver {
    pub fn new(bundles_root: impl Into<PathBuf>, archives_directory: impl Into<PathBuf>) -> Self {
        Self {
            bundles_root: bundles_root.into(),
            archives_directory: archives_directory.into(),
        }
    }

    /// Archive file name for a bundle.
    pub fn archive_name(id: &str, version: u64) -> String {
        format!("{}-{version}.{ARCHIVE_EXTENSION}", encode_id(id))
    }

    /// Pack the installed bundle (id, version) into the archives directory.
    pub fn pack(&self, id: &str, version: u64) -> Result<PathBuf> {
        let source = bundle_directory(&self.bundles_root, id, version);
        if !source.is_dir() {
            return Err(BundleError::not_found(
                id,
                Some(version),
                format!("{} does not exist for the specified version", source.display()),
            ));
        }
        fs::create_dir_all(&self.archives_directory)?;
        let target = self.archives_directory.join(Self::archive_name(id, version));
        let file = File::create(&target)?;
        pack_directory(&source, file)?.sync_all()?;
        debug!(source = %source.display(), archive = %target.display(), "packed bundle");
        Ok(target)
    }
}

/// Write `directory` as a bundle archive to `writer`, returning the writer.
///
/// The directory must be a bundle directory with a valid manifest.
pub fn pack_directory<W: Write>(directory: &Path, writer: W) -> Result<W> {
    Manifest::read_from_directory(directory)?;

    let mut builder = Builder::new(XzEncoder::new(writer, XZ_LEVEL));
    builder.follow_symlinks(false);
    append_manifest(&mut builder, directory)?;

    for sub in [GRAPHS_DIR, FILES_DIR] {
        let root = directory.join(sub);
        if !root.is_dir() {
            continue;
        }
        for entry in WalkDir::new(&root).sort_by_file_name() {
            let entry = entry.map_err(io::Error::from)?;
            let rel = entry.path().strip_prefix(directory).unwrap_or(entry.path());
            if entry.file_type().is_dir() {
                builder.append_dir(rel, entry.path())?;
            } else {
                builder.append_path_with_name(entry.path(), rel)?;
            }
        }
    }

    let encoder = builder.into_inner()?;
    Ok(encoder.finish()?)
}

/// Append the manifest as the literal member `./manifest`. The builder's
/// own path setter strips the leading `./`.
fn append_manifest<W: Write>(builder: &mut Builder<W>, directory: &Path) -> Result<()> {
    let path = directory.join(MANIFEST_FILE);
    let file = File::open(&path)?;
    let mut header = tar::Header::new_old();
    header.set_metadata(&file.metadata()?);
    header.set_entry_type(EntryType::Regular);
    let name = format!("./{MANIFEST_FILE}");
    header.as_old_mut().name[..name.len()].copy_from_slice(name.as_bytes());
    header.set_cksum();
    builder.append(&header, file)?;
    Ok(())
}

/// Whether `path` is a readable xz-compressed tar archive.
pub fn is_valid_archive(path: &Path) -> bool {
    let input = ArchiveInput::File(path.to_path_buf());
    let check = || -> Result<()> {
        let mut archive = input.open()?;
        for entry in archive.entries()? {
            entry?;
        }
        Ok(())
    };
    check().is_ok()
}

// =============================================================================
// UNPACKING
// =============================================================================

/// Unpacks bundle archives into the store or an explicit directory.
#[derive(Debug, Clone, Default)]
pub struct Unarchiver {
    bundles_root: Option<PathBuf>,
}

impl Unarchiver {
    pub fn new(bundles_root: Option<PathBuf>) -> Self {
        Self { bundles_root }
    }

    /// Read and validate the manifest inside an archive without extracting.
    pub fn read_manifest(input: &ArchiveInput) -> Result<Manifest> {
        let origin = input.origin();
        let mut archive = input.open()?;
        for entry in archive.entries()? {
            let entry = entry?;
            if !is_manifest_member(&entry.path()?) {
                continue;
            }
            let mut bytes = Vec::new();
            entry.take(MAX_MANIFEST_SIZE + 1).read_to_end(&mut bytes)?;
            if bytes.len() as u64 > MAX_MANIFEST_SIZE {
                return Err(BundleError::not_a_bundle(
                    origin,
                    format!("manifest exceeds maximum size {MAX_MANIFEST_SIZE}"),
                ));
            }
            return Manifest::from_json_slice(&bytes, &origin);
        }
        Err(BundleError::not_a_bundle(origin, "archive has no manifest"))
    }

    /// Extract `input` and return the directory it landed in.
    ///
    /// With a bundles root, the destination is the store directory for the
    /// archive's (id, version); an explicit `target_directory` must agree
    /// with it. The destination must be empty or absent.
    pub fn unpack(&self, input: &ArchiveInput, target_directory: Option<&Path>) -> Result<PathBuf> {
        if self.bundles_root.is_none() && target_directory.is_none() {
            return Err(no_destination());
        }

        let manifest = Self::read_manifest(input)?;
        let expected = self
            .bundles_root
            .as_deref()
            .map(|root| bundle_directory(root, &manifest.id, manifest.version));

        let target = match (expected, target_directory) {
            (None, None) => return Err(no_destination()),
            (Some(expected), Some(explicit)) => {
                if std::path::absolute(&expected)? != std::path::absolute(explicit)? {
                    return Err(BundleError::TargetDirectoryMismatch {
                        expected,
                        actual: explicit.to_path_buf(),
                    });
                }
                explicit.to_path_buf()
            }
            (Some(expected), None) => expected,
            (None, Some(explicit)) => explicit.to_path_buf(),
        };

        if target.exists() && fs::read_dir(&target)?.next().is_some() {
            return Err(BundleError::not_a_bundle(
                &target,
                "target directory is not empty",
            ));
        }
        fs::create_dir_all(&target)?;

        match extract_into(input, &target) {
            Ok(()) => {
                debug!(
                    id = %manifest.id,
                    version = manifest.version,
                    target = %target.display(),
                    "unpacked bundle"
                );
                Ok(target)
            }
            Err(err) => {
                if let Err(cleanup) = fs::remove_dir_all(&target) {
                    warn!(
                        target = %target.display(),
                        %cleanup,
                        "failed to remove partially unpacked bundle"
                    );
                }
                Err(err)
            }
        }
    }
}

fn no_destination() -> BundleError {
    BundleError::Config(
        "cannot determine where to unpack: no bundles root and no target directory".to_string(),
    )
}

fn is_manifest_member(path: &Path) -> bool {
    let mut normal = path.components().filter(|c| !matches!(c, Component::CurDir));
    matches!(
        (normal.next(), normal.next()),
        (Some(Component::Normal(name)), None) if name == MANIFEST_FILE
    )
}

fn extract_into(input: &ArchiveInput, target: &Path) -> Result<()> {
    let root = fs::canonicalize(target)?;
    let mut archive = input.open()?;
    let mut symlinks: Vec<ExtractedLink> = Vec::new();

    for entry in archive.entries()? {
        let mut entry = entry?;
        let member: PathBuf = entry.path()?.into_owned();
        let member_name = member.display().to_string();
        let violation = |kind| BundleError::BadArchiveFilePath {
            member: member_name.clone(),
            kind,
            target: target.to_path_buf(),
        };

        let dest = member_destination(&root, &member)
            .ok_or_else(|| violation(ArchiveViolation::Path))?;
        let entry_type = entry.header().entry_type();

        if entry_type.is_dir() {
            if dest != root {
                fs::create_dir_all(&dest)?;
            }
            continue;
        }
        if dest == root {
            return Err(violation(ArchiveViolation::Path));
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
            // A directory created above could have been reached through a
            // link; check the real location again.
            if !fs::canonicalize(parent)?.starts_with(&root) {
                return Err(violation(ArchiveViolation::Path));
            }
        }

        match entry_type {
            EntryType::Symlink => {
                let link = link_target(&entry)?.ok_or_else(|| violation(ArchiveViolation::Link))?;
                let base = dest.parent().unwrap_or(&root);
                if !resolve_physical(base, &link).starts_with(&root) {
                    return Err(violation(ArchiveViolation::Link));
                }
                entry.unpack(&dest)?;
                symlinks.push(ExtractedLink {
                    path: dest,
                    target: link,
                    member: member_name.clone(),
                });
            }
            EntryType::Link => {
                let link = link_target(&entry)?.ok_or_else(|| violation(ArchiveViolation::Link))?;
                let base = dest.parent().unwrap_or(&root);
                let source = resolve_physical(&root, &link);
                if link.is_absolute()
                    || !resolve_physical(base, &link).starts_with(&root)
                    || !source.starts_with(&root)
                {
                    return Err(violation(ArchiveViolation::Link));
                }
                fs::hard_link(&source, &dest)?;
            }
            EntryType::Regular | EntryType::Continuous | EntryType::GNUSparse => {
                entry.unpack(&dest)?;
            }
            other => {
                debug!(
                    member = %member_name,
                    entry_type = ?other,
                    "skipping unsupported archive member"
                );
            }
        }
    }
    recheck_symlinks(&root, target, &symlinks)
}

struct ExtractedLink {
    path: PathBuf,
    target: PathBuf,
    member: String,
}

/// Check every extracted symlink against the finished tree. A later member
/// can turn a component of an earlier link's target into a link, so the
/// per-member check alone is not enough.
fn recheck_symlinks(root: &Path, target: &Path, links: &[ExtractedLink]) -> Result<()> {
    for link in links {
        let resolved = fs::canonicalize(&link.path).unwrap_or_else(|_| {
            // Dangling or cyclic: resolve through whatever exists.
            let base = link
                .path
                .parent()
                .and_then(|parent| fs::canonicalize(parent).ok())
                .unwrap_or_else(|| root.to_path_buf());
            resolve_physical(&base, &link.target)
        });
        if !resolved.starts_with(root) {
            return Err(BundleError::BadArchiveFilePath {
                member: link.member.clone(),
                kind: ArchiveViolation::Link,
                target: target.to_path_buf(),
            });
        }
    }
    Ok(())
}

fn link_target<R: Read>(entry: &tar::Entry<'_, R>) -> Result<Option<PathBuf>> {
    Ok(entry.link_name()?.map(Cow::into_owned))
}

/// Where `member` should be written under `root`, or `None` if it escapes.
///
/// Parent components are resolved through symlinks already on disk; the
/// final component is not followed.
fn member_destination(root: &Path, member: &Path) -> Option<PathBuf> {
    if member.has_root() {
        return None;
    }
    let dest = match member.components().next_back() {
        Some(Component::Normal(name)) => {
            resolve_physical(root, member.parent().unwrap_or(Path::new(""))).join(name)
        }
        _ => resolve_physical(root, member),
    };
    dest.starts_with(root).then_some(dest)
}

/// Apply `relative` to `start`, following symlinks that already exist so
/// `..` after a link is resolved the way the filesystem would resolve it.
fn resolve_physical(start: &Path, relative: &Path) -> PathBuf {
    let mut current = if relative.has_root() {
        PathBuf::new()
    } else {
        start.to_path_buf()
    };
    for comp in relative.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                current.pop();
            }
            Component::RootDir | Component::Prefix(_) => current.push(comp.as_os_str()),
            Component::Normal(name) => {
                current.push(name);
                let is_link = current
                    .symlink_metadata()
                    .is_ok_and(|meta| meta.file_type().is_symlink());
                if is_link {
                    if let Ok(real) = fs::canonicalize(&current) {
                        current = real;
                    }
                }
            }
        }
    }
    current
}
