//! Inventory of locally installed bundles.

use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::warn;

use crate::bundler::manifest::{MANIFEST_FILE, Manifest};
use crate::bundler::store::{decode_id, parse_version};

/// A manifest found in the store, with the directory it came from.
#[derive(Debug, Clone, Serialize)]
pub struct CachedBundle {
    pub manifest: Manifest,
    pub directory: PathBuf,
}

/// Read-only view over `bundles_root/*/*/manifest`.
#[derive(Debug, Clone)]
pub struct Cache {
    bundles_root: PathBuf,
}

impl Cache {
    pub fn new(bundles_root: impl Into<PathBuf>) -> Self {
        Self {
            bundles_root: bundles_root.into(),
        }
    }

    pub fn bundles_root(&self) -> &Path {
        &self.bundles_root
    }

    /// Lazily list installed bundles, newest version first within each id.
    ///
    /// Unreadable or mismatched manifests are skipped with a warning. A missing
    /// bundles root yields nothing.
    pub fn list(&self) -> impl Iterator<Item = CachedBundle> + '_ {
        sorted_children(&self.bundles_root)
            .into_iter()
            .filter(|path| path.is_dir())
            .flat_map(|id_dir| {
                let mut versions: Vec<PathBuf> = sorted_children(&id_dir)
                    .into_iter()
                    .filter(|path| path.is_dir())
                    .collect();
                versions.sort_by(|a, b| compare_versions_desc(a, b));
                versions.into_iter().filter_map(load_entry)
            })
    }

    /// Whether any version of `id` is installed.
    pub fn contains(&self, id: &str) -> bool {
        self.list().any(|entry| entry.manifest.id == id)
    }
}

fn sorted_children(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut paths: Vec<PathBuf> = entries
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .collect();
    paths.sort();
    paths
}

fn dir_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or_default()
}

/// Numeric names descending, then everything else by name.
fn compare_versions_desc(a: &Path, b: &Path) -> Ordering {
    match (parse_version(dir_name(a)), parse_version(dir_name(b))) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => dir_name(a).cmp(dir_name(b)),
    }
}

fn load_entry(version_dir: PathBuf) -> Option<CachedBundle> {
    let manifest_path = version_dir.join(MANIFEST_FILE);
    let bytes = match fs::read(&manifest_path) {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(
                path = %manifest_path.display(),
                %err,
                "skipping bundle without readable manifest"
            );
            return None;
        }
    };
    let manifest = match Manifest::from_json_slice(&bytes, &version_dir) {
        Ok(manifest) => manifest,
        Err(err) => {
            warn!(path = %manifest_path.display(), %err, "skipping bundle with invalid manifest");
            return None;
        }
    };

    let id_dir_name = version_dir.parent().map(dir_name).unwrap_or_default();
    let expected_id = decode_id(id_dir_name);
    if expected_id.as_deref() != Some(manifest.id.as_str()) {
        warn!(
            path = %manifest_path.display(),
            manifest_id = %manifest.id,
            directory = %id_dir_name,
            "skipping bundle whose manifest id does not match its directory"
        );
        return None;
    }
    if parse_version(dir_name(&version_dir)) != Some(manifest.version) {
        warn!(
            path = %manifest_path.display(),
            manifest_version = manifest.version,
            directory = %dir_name(&version_dir),
            "skipping bundle whose manifest version does not match its directory"
        );
        return None;
    }

    Some(CachedBundle {
        manifest,
        directory: version_dir,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_manifest(root: &Path, dir: &str, version_dir: &str, json: &str) {
        let path = root.join(dir).join(version_dir);
        fs::create_dir_all(&path).unwrap();
        fs::write(path.join(MANIFEST_FILE), json).unwrap();
    }

    #[test]
    fn missing_root_is_empty() {
        let dir = tempdir().unwrap();
        let cache = Cache::new(dir.path().join("nope"));
        assert_eq!(cache.list().count(), 0);
    }

    #[test]
    fn lists_newest_first() {
        let dir = tempdir().unwrap();
        for v in [1, 10, 2] {
            write_manifest(
                dir.path(),
                "ex",
                &v.to_string(),
                &format!(r#"{{"manifest_version":1,"id":"ex","version":{v}}}"#),
            );
        }
        let versions: Vec<u64> = Cache::new(dir.path())
            .list()
            .map(|b| b.manifest.version)
            .collect();
        assert_eq!(versions, vec![10, 2, 1]);
    }

    #[test]
    fn skips_id_mismatch() {
        let dir = tempdir().unwrap();
        write_manifest(
            dir.path(),
            "bdir",
            "10",
            r#"{"id":"other","version":10,"manifest_version":1}"#,
        );
        assert_eq!(Cache::new(dir.path()).list().count(), 0);
    }

    #[test]
    fn skips_unparseable_manifest_but_keeps_others() {
        let dir = tempdir().unwrap();
        write_manifest(dir.path(), "ex", "2", "{not json");
        write_manifest(
            dir.path(),
            "ex",
            "1",
            r#"{"manifest_version":1,"id":"ex","version":1}"#,
        );
        let entries: Vec<_> = Cache::new(dir.path()).list().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].manifest.version, 1);
    }

    #[test]
    fn decodes_encoded_ids() {
        let dir = tempdir().unwrap();
        write_manifest(
            dir.path(),
            "http%3A%2F%2Fx.org%2Fb",
            "1",
            r#"{"manifest_version":1,"id":"http://x.org/b","version":1}"#,
        );
        let cache = Cache::new(dir.path());
        assert!(cache.contains("http://x.org/b"));
    }

    #[test]
    fn version_ordering_puts_non_numeric_last() {
        let mut names = vec![
            PathBuf::from("beta"),
            PathBuf::from("2"),
            PathBuf::from("alpha"),
            PathBuf::from("11"),
        ];
        names.sort_by(|a, b| compare_versions_desc(a, b));
        let names: Vec<&str> = names.iter().map(|p| dir_name(p)).collect();
        assert_eq!(names, vec!["11", "2", "alpha", "beta"]);
    }
}
