//! On-disk bundle store layout.
//!
//! ```text
//! bundles_root/<urlencoded-id>/<version>/
//!     manifest
//!     graphs/index      <context-id>\0<graph-file>\n
//!     graphs/hashes     <context-id>\0<len><digest>\n
//!     graphs/<hex>.nt
//!     files/hashes      <file-name>\0<len><digest>\n
//!     files/...
//! ```

use std::fs;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Component, Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::{BundleError, Result};

pub const GRAPHS_DIR: &str = "graphs";
pub const FILES_DIR: &str = "files";
pub const INDEX_FILE: &str = "index";
pub const HASHES_FILE: &str = "hashes";
pub const GRAPH_EXTENSION: &str = "nt";

/// Directory name used for a bundle id.
pub fn encode_id(id: &str) -> String {
    urlencoding::encode(id).into_owned()
}

/// Inverse of [`encode_id`]; `None` if the name is not valid percent-encoding.
pub fn decode_id(name: &str) -> Option<String> {
    urlencoding::decode(name).ok().map(std::borrow::Cow::into_owned)
}

pub fn bundle_directory(root: &Path, id: &str, version: u64) -> PathBuf {
    root.join(encode_id(id)).join(version.to_string())
}

/// Install/fetch lock for one (id, version). Lives next to the version
/// directory so an empty target stays empty while locked.
pub fn lock_path(root: &Path, id: &str, version: u64) -> PathBuf {
    root.join(encode_id(id)).join(format!("{version}.lock"))
}

/// Parse a version directory name. Only positive integers count.
pub fn parse_version(name: &str) -> Option<u64> {
    name.parse::<u64>().ok().filter(|v| *v > 0)
}

/// Locate an installed bundle directory.
///
/// Without a version, picks the highest integer-named subdirectory and
/// ignores anything else.
pub fn find_bundle_directory(root: &Path, id: &str, version: Option<u64>) -> Result<PathBuf> {
    let id_dir = root.join(encode_id(id));
    if !id_dir.is_dir() {
        return Err(BundleError::not_found(
            id,
            version,
            format!("bundle directory {} does not exist", id_dir.display()),
        ));
    }

    if let Some(version) = version {
        let dir = id_dir.join(version.to_string());
        if !dir.is_dir() {
            return Err(BundleError::not_found(
                id,
                Some(version),
                format!("{} does not exist for the specified version", dir.display()),
            ));
        }
        return Ok(dir);
    }

    let latest = fs::read_dir(&id_dir)?
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| entry.file_name().to_str().and_then(parse_version))
        .max();

    latest.map(|v| id_dir.join(v.to_string())).ok_or_else(|| {
        BundleError::not_found(
            id,
            None,
            format!("no versioned bundle directories under {}", id_dir.display()),
        )
    })
}

// =============================================================================
// HASH RECORDS
// =============================================================================

/// One `<name>\0<len><digest>\n` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashRecord {
    pub name: String,
    pub digest: Vec<u8>,
}

impl HashRecord {
    pub fn hex_digest(&self) -> String {
        hex::encode(&self.digest)
    }
}

/// Append-only writer for a `hashes` file.
pub struct HashWriter {
    out: BufWriter<fs::File>,
}

impl HashWriter {
    pub fn create(path: &Path) -> Result<Self> {
        let file = fs::OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            out: BufWriter::new(file),
        })
    }

    pub fn append(&mut self, name: &str, digest: &[u8]) -> Result<()> {
        let len = u8::try_from(digest.len()).map_err(|_| {
            BundleError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("digest for {name} is longer than 255 bytes"),
            ))
        })?;
        self.out.write_all(name.as_bytes())?;
        self.out.write_all(&[0, len])?;
        self.out.write_all(digest)?;
        self.out.write_all(b"\n")?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

/// Parse a `hashes` file.
pub fn read_hashes(path: &Path) -> Result<Vec<HashRecord>> {
    let bytes = fs::read(path)?;
    let mut records = Vec::new();
    let mut cursor = 0usize;
    while cursor < bytes.len() {
        let nul = bytes[cursor..]
            .iter()
            .position(|b| *b == 0)
            .ok_or_else(|| malformed(path, "record without NUL separator"))?;
        let name = std::str::from_utf8(&bytes[cursor..cursor + nul])
            .map_err(|_| malformed(path, "record name is not UTF-8"))?
            .to_string();
        cursor += nul + 1;
        let len = *bytes
            .get(cursor)
            .ok_or_else(|| malformed(path, "truncated digest length"))? as usize;
        cursor += 1;
        let end = cursor + len;
        if end >= bytes.len() || bytes[end] != b'\n' {
            return Err(malformed(path, "truncated digest"));
        }
        records.push(HashRecord {
            name,
            digest: bytes[cursor..end].to_vec(),
        });
        cursor = end + 1;
    }
    Ok(records)
}

/// Append a `<context>\0<file>\n` record to `graphs/index`.
pub fn append_index(out: &mut impl Write, context: &str, graph_file: &str) -> Result<()> {
    out.write_all(context.as_bytes())?;
    out.write_all(b"\0")?;
    out.write_all(graph_file.as_bytes())?;
    out.write_all(b"\n")?;
    Ok(())
}

/// Parse `graphs/index` into `(context, graph file)` pairs.
pub fn read_index(path: &Path) -> Result<Vec<(String, String)>> {
    let content = fs::read_to_string(path)?;
    content
        .lines()
        .filter(|line| !line.is_empty())
        .map(|line| {
            line.split_once('\0')
                .map(|(ctx, file)| (ctx.to_string(), file.to_string()))
                .ok_or_else(|| malformed(path, "index line without NUL separator"))
        })
        .collect()
}

fn malformed(path: &Path, reason: &str) -> BundleError {
    BundleError::not_a_bundle(path, format!("malformed record file: {reason}"))
}

// =============================================================================
// HASHING
// =============================================================================

/// SHA-256 of everything read from `reader`.
pub fn hash_reader(mut reader: impl Read) -> Result<Vec<u8>> {
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(hasher.finalize().to_vec())
}

pub fn hash_file(path: &Path) -> Result<Vec<u8>> {
    hash_reader(fs::File::open(path)?)
}

/// Reject absolute paths and `..` so a relative name stays under its root.
pub fn ensure_relative(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(BundleError::InvalidDescriptor("empty file path".to_string()));
    }
    for comp in path.components() {
        match comp {
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(BundleError::InvalidDescriptor(format!(
                    "file path must be relative without '..': {}",
                    path.display()
                )));
            }
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn latest_version_ignores_non_integer_names() {
        let dir = tempdir().unwrap();
        for name in ["1", "2", "ignore_me"] {
            fs::create_dir_all(dir.path().join("ex").join(name)).unwrap();
        }
        let found = find_bundle_directory(dir.path(), "ex", None).unwrap();
        assert_eq!(found, dir.path().join("ex").join("2"));
    }

    #[test]
    fn latest_version_is_numeric_max() {
        let dir = tempdir().unwrap();
        for name in ["1", "3", "10"] {
            fs::create_dir_all(dir.path().join("ex").join(name)).unwrap();
        }
        let found = find_bundle_directory(dir.path(), "ex", None).unwrap();
        assert_eq!(found, dir.path().join("ex").join("10"));
    }

    #[test]
    fn missing_id_directory_is_not_found() {
        let dir = tempdir().unwrap();
        let err = find_bundle_directory(dir.path(), "ex", None).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn id_without_versions_is_not_found() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("ex").join("latest")).unwrap();
        fs::write(dir.path().join("ex").join("7"), "not a dir").unwrap();
        let err = find_bundle_directory(dir.path(), "ex", None).unwrap_err();
        assert!(err.to_string().contains("no versioned bundle directories"));
    }

    #[test]
    fn specific_missing_version_is_not_found() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("ex").join("1")).unwrap();
        let err = find_bundle_directory(dir.path(), "ex", Some(2)).unwrap_err();
        assert!(err.to_string().contains("does not exist for the specified version"));
    }

    #[test]
    fn ids_are_url_encoded() {
        let root = Path::new("/b");
        assert_eq!(
            bundle_directory(root, "http://x.org/a b", 3),
            root.join("http%3A%2F%2Fx.org%2Fa%20b").join("3")
        );
        assert_eq!(decode_id("http%3A%2F%2Fx.org").as_deref(), Some("http://x.org"));
    }

    #[test]
    fn hash_records_round_trip_through_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hashes");
        let mut writer = HashWriter::create(&path).unwrap();
        writer.append("a.txt", &[1, 2, 3]).unwrap();
        writer.append("ctx", &[10, 0, 255]).unwrap();
        writer.finish().unwrap();

        let records = read_hashes(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "a.txt");
        assert_eq!(records[1].digest, vec![10, 0, 255]);
    }

    #[test]
    fn digest_may_contain_newline_byte() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hashes");
        let mut writer = HashWriter::create(&path).unwrap();
        writer.append("n", b"\n\n\0").unwrap();
        writer.finish().unwrap();
        assert_eq!(read_hashes(&path).unwrap()[0].digest, b"\n\n\0".to_vec());
    }

    #[test]
    fn ensure_relative_rejects_escapes() {
        assert!(ensure_relative(Path::new("a/b.txt")).is_ok());
        assert!(ensure_relative(Path::new("../b.txt")).is_err());
        assert!(ensure_relative(Path::new("/etc/passwd")).is_err());
        assert!(ensure_relative(Path::new("")).is_err());
    }
}
