//! Handle on an installed (or fetchable) bundle.

use std::cell::OnceCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::bundler::manifest::Manifest;
use crate::bundler::store::{
    FILES_DIR, GRAPHS_DIR, HASHES_FILE, INDEX_FILE, find_bundle_directory, hash_file, read_hashes,
    read_index,
};
use crate::error::{BundleError, Result};
use crate::remote::{Fetcher, Remote, TransportRegistry};

/// A bundle id with an optional version. Resolves to a local directory,
/// fetching from remotes when it is not installed.
pub struct Bundle<'r> {
    id: String,
    version: Option<u64>,
    bundles_root: PathBuf,
    remotes: Vec<Remote>,
    registry: Option<&'r TransportRegistry>,
    directory: OnceCell<PathBuf>,
}

/// Result of [`Bundle::verify`].
#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    pub id: String,
    pub version: u64,
    pub directory: PathBuf,
    pub graphs_checked: usize,
    pub files_checked: usize,
    pub problems: Vec<VerifyProblem>,
}

impl VerifyReport {
    pub fn is_ok(&self) -> bool {
        self.problems.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct VerifyProblem {
    /// `graph` or `file`.
    pub kind: &'static str,
    pub name: String,
    pub reason: String,
}

impl<'r> Bundle<'r> {
    pub fn new(
        id: impl Into<String>,
        version: Option<u64>,
        bundles_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id: id.into(),
            version,
            bundles_root: bundles_root.into(),
            remotes: Vec::new(),
            registry: None,
            directory: OnceCell::new(),
        }
    }

    /// Remotes to fetch from when the bundle is not installed locally.
    #[must_use]
    pub fn with_remotes(mut self, remotes: Vec<Remote>, registry: &'r TransportRegistry) -> Self {
        self.remotes = remotes;
        self.registry = Some(registry);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Local directory of the bundle. A local lookup comes first; if that
    /// finds nothing, the configured remotes are tried. Without remotes the
    /// lookup error is returned.
    pub fn resolve(&self) -> Result<&Path> {
        if let Some(directory) = self.directory.get() {
            return Ok(directory.as_path());
        }
        let directory = match find_bundle_directory(&self.bundles_root, &self.id, self.version) {
            Ok(directory) => directory,
            Err(err @ BundleError::BundleNotFound { .. }) => {
                let Some(registry) = self.registry.filter(|_| !self.remotes.is_empty()) else {
                    return Err(err);
                };
                debug!(bundle = %self.id, reason = %err, "bundle not installed, fetching");
                Fetcher::new(&self.bundles_root, self.remotes.clone(), registry).fetch(
                    &self.id,
                    self.version,
                    None,
                )?
            }
            Err(err) => return Err(err),
        };
        Ok(self.directory.get_or_init(|| directory).as_path())
    }

    pub fn manifest(&self) -> Result<Manifest> {
        Manifest::read_from_directory(self.resolve()?)
    }

    /// Context ids in index order.
    pub fn contexts(&self) -> Result<Vec<String>> {
        Ok(self
            .index()?
            .into_iter()
            .map(|(context, _)| context)
            .collect())
    }

    /// Path of the graph file holding `context`, if the bundle contains it.
    pub fn graph_path(&self, context: &str) -> Result<Option<PathBuf>> {
        let graphs = self.resolve()?.join(GRAPHS_DIR);
        Ok(self
            .index()?
            .into_iter()
            .find(|(ctx, _)| ctx == context)
            .map(|(_, file)| graphs.join(file)))
    }

    /// Names of the bundled files, relative to `files/`.
    pub fn files(&self) -> Result<Vec<String>> {
        let hashes = self.resolve()?.join(FILES_DIR).join(HASHES_FILE);
        if !hashes.exists() {
            return Ok(Vec::new());
        }
        Ok(read_hashes(&hashes)?.into_iter().map(|r| r.name).collect())
    }

    /// Re-hash every graph and file against the recorded digests.
    pub fn verify(&self) -> Result<VerifyReport> {
        let directory = self.resolve()?.to_path_buf();
        let manifest = Manifest::read_from_directory(&directory)?;
        let mut problems = Vec::new();

        let graphs = directory.join(GRAPHS_DIR);
        let index: HashMap<String, String> = self.index()?.into_iter().collect();
        let graph_hashes = read_optional_hashes(&graphs.join(HASHES_FILE))?;
        for record in &graph_hashes {
            let Some(file) = index.get(&record.name) else {
                problems.push(problem("graph", &record.name, "not listed in graphs/index"));
                continue;
            };
            check_digest(&graphs.join(file), &record.digest, "graph", &record.name, &mut problems);
        }

        let files = directory.join(FILES_DIR);
        let file_hashes = read_optional_hashes(&files.join(HASHES_FILE))?;
        for record in &file_hashes {
            check_digest(
                &files.join(&record.name),
                &record.digest,
                "file",
                &record.name,
                &mut problems,
            );
        }

        Ok(VerifyReport {
            id: manifest.id,
            version: manifest.version,
            directory,
            graphs_checked: graph_hashes.len(),
            files_checked: file_hashes.len(),
            problems,
        })
    }

    fn index(&self) -> Result<Vec<(String, String)>> {
        let path = self.resolve()?.join(GRAPHS_DIR).join(INDEX_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }
        read_index(&path)
    }
}

fn read_optional_hashes(path: &Path) -> Result<Vec<crate::bundler::store::HashRecord>> {
    if path.exists() { read_hashes(path) } else { Ok(Vec::new()) }
}

fn check_digest(
    path: &Path,
    expected: &[u8],
    kind: &'static str,
    name: &str,
    problems: &mut Vec<VerifyProblem>,
) {
    match hash_file(path) {
        Ok(actual) if actual == expected => {}
        Ok(actual) => problems.push(problem(
            kind,
            name,
            &format!(
                "digest mismatch: expected {}, found {}",
                hex::encode(expected),
                hex::encode(actual)
            ),
        )),
        Err(err) => problems.push(problem(
            kind,
            name,
            &format!("cannot read {}: {err}", path.display()),
        )),
    }
}

fn problem(kind: &'static str, name: &str, reason: &str) -> VerifyProblem {
    VerifyProblem {
        kind,
        name: name.to_string(),
        reason: reason.to_string(),
    }
}
