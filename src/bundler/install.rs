//! Descriptor-driven bundle installation.

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::bundler::descriptor::Descriptor;
use crate::bundler::lock::{DEFAULT_WAIT_INTERVAL, lock_file};
use crate::bundler::manifest::{DependencyRef, Manifest};
use crate::bundler::store::{
    self, FILES_DIR, GRAPHS_DIR, GRAPH_EXTENSION, HASHES_FILE, HashWriter, INDEX_FILE,
    append_index, bundle_directory, ensure_relative, find_bundle_directory, hash_file, read_index,
};
use crate::error::{BundleError, Result};
use crate::graph::GraphSource;

/// Materializes bundle versions from a source directory and a graph.
pub struct Installer<'g> {
    bundles_root: PathBuf,
    source_directory: PathBuf,
    graph: &'g dyn GraphSource,
    default_context_key: Option<String>,
    imports_context_key: Option<String>,
    lock_key: Option<String>,
    wait_interval: Duration,
}

impl<'g> Installer<'g> {
    pub fn new(
        bundles_root: impl Into<PathBuf>,
        source_directory: impl Into<PathBuf>,
        graph: &'g dyn GraphSource,
    ) -> Self {
        Self {
            bundles_root: bundles_root.into(),
            source_directory: source_directory.into(),
            graph,
            default_context_key: None,
            imports_context_key: None,
            lock_key: None,
            wait_interval: DEFAULT_WAIT_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_default_context(mut self, key: Option<String>) -> Self {
        self.default_context_key = key;
        self
    }

    /// Context holding the imports edges. Without one, no imports are
    /// followed.
    #[must_use]
    pub fn with_imports_context(mut self, key: Option<String>) -> Self {
        self.imports_context_key = key;
        self
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

    pub fn bundles_root(&self) -> &Path {
        &self.bundles_root
    }

    /// Install `descriptor` and return its staging directory.
    ///
    /// The install lock for (id, version) is held for the whole call. On any
    /// failure after the lock is taken, `graphs/` and `files/` are removed
    /// before the error is returned.
    pub fn install(&self, descriptor: &Descriptor) -> Result<PathBuf> {
        let staging = bundle_directory(&self.bundles_root, &descriptor.id, descriptor.version);
        fs::create_dir_all(&staging)?;

        let mut lock = lock_file(
            store::lock_path(&self.bundles_root, &descriptor.id, descriptor.version),
            self.lock_key.as_deref(),
            self.wait_interval,
        )?;

        match self.install_locked(descriptor, &staging) {
            Ok(()) => {
                lock.release()?;
                info!(
                    id = %descriptor.id,
                    version = descriptor.version,
                    directory = %staging.display(),
                    "installed bundle"
                );
                Ok(staging)
            }
            Err(err) => {
                rollback(&staging);
                Err(err)
            }
        }
    }

    fn install_locked(&self, descriptor: &Descriptor, staging: &Path) -> Result<()> {
        let files_dir = staging.join(FILES_DIR);
        let graphs_dir = staging.join(GRAPHS_DIR);
        // Hash records are append-only, so a previous install of this version
        // must not leak into this one.
        remove_dir_if_exists(&files_dir)?;
        remove_dir_if_exists(&graphs_dir)?;
        let manifest_path = staging.join(crate::bundler::manifest::MANIFEST_FILE);
        if manifest_path.exists() {
            fs::remove_file(&manifest_path)?;
        }

        let selected = self.select_files(descriptor)?;
        self.write_files(&selected, &files_dir)?;

        let included = self.write_graphs(descriptor, &graphs_dir)?;
        let closure = self.import_closure(&included);
        let mut uncovered: BTreeSet<String> = closure.difference(&included).cloned().collect();
        if !uncovered.is_empty() {
            self.remove_covered(&descriptor.dependencies, &mut uncovered)?;
        }
        if !uncovered.is_empty() {
            return Err(BundleError::UncoveredImports {
                id: descriptor.id.clone(),
                version: descriptor.version,
                ids: uncovered.into_iter().collect(),
            });
        }

        let mut manifest = Manifest::new(&descriptor.id, descriptor.version);
        manifest.default_context_key.clone_from(&self.default_context_key);
        manifest.imports_context_key.clone_from(&self.imports_context_key);
        manifest.dependencies.clone_from(&descriptor.dependencies);
        manifest.write_to_directory(staging)
    }

    fn file_root(&self, descriptor: &Descriptor) -> PathBuf {
        match &descriptor.files.root {
            Some(root) if root.is_absolute() => root.clone(),
            Some(root) => self.source_directory.join(root),
            None => self.source_directory.clone(),
        }
    }

    /// Explicit includes first, then pattern matches. Every explicit include
    /// is checked before anything is written.
    fn select_files(&self, descriptor: &Descriptor) -> Result<Vec<SelectedFile>> {
        let root = self.file_root(descriptor);
        let mut selected = Vec::new();
        let mut seen = HashSet::new();

        for include in &descriptor.files.includes {
            ensure_relative(include)?;
            let source = root.join(include);
            if !source.is_file() {
                return Err(BundleError::MissingInclude(source));
            }
            let name = record_name(include);
            if seen.insert(name.clone()) {
                selected.push(SelectedFile { name, source });
            }
        }

        let escaped_root = glob::Pattern::escape(&root.to_string_lossy());
        for pattern in &descriptor.files.patterns {
            ensure_relative(Path::new(pattern))?;
            let full = format!("{escaped_root}/{pattern}");
            let matches = glob::glob(&full).map_err(|err| {
                BundleError::InvalidDescriptor(format!("invalid file pattern {pattern:?}: {err}"))
            })?;
            let mut matched = 0usize;
            for entry in matches {
                let source = entry.map_err(|err| BundleError::Io(err.into_error()))?;
                if !source.is_file() {
                    continue;
                }
                let Ok(relative) = source.strip_prefix(&root) else {
                    continue;
                };
                matched += 1;
                let name = record_name(relative);
                if seen.insert(name.clone()) {
                    selected.push(SelectedFile { name, source });
                }
            }
            if matched == 0 {
                debug!(pattern = %pattern, "file pattern matched nothing");
            }
        }
        Ok(selected)
    }

    fn write_files(&self, selected: &[SelectedFile], files_dir: &Path) -> Result<()> {
        fs::create_dir_all(files_dir)?;
        let mut hashes = HashWriter::create(&files_dir.join(HASHES_FILE))?;
        for file in selected {
            let digest = hash_file(&file.source)?;
            hashes.append(&file.name, &digest)?;
            let dest = files_dir.join(&file.name);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(&file.source, &dest)?;
        }
        hashes.finish()
    }

    /// Serialize each selected context under its content hash. Returns the
    /// included context ids.
    fn write_graphs(&self, descriptor: &Descriptor, graphs_dir: &Path) -> Result<BTreeSet<String>> {
        fs::create_dir_all(graphs_dir)?;
        let mut hashes = HashWriter::create(&graphs_dir.join(HASHES_FILE))?;
        let mut index = BufWriter::new(
            fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(graphs_dir.join(INDEX_FILE))?,
        );

        let mut included = BTreeSet::new();
        for context in self.graph.contexts() {
            if !descriptor.selects_context(&context) {
                continue;
            }
            let mut temp = NamedTempFile::new_in(graphs_dir)?;
            {
                let mut out = BufWriter::new(temp.as_file_mut());
                self.graph.write_canonical(&context, &mut out)?;
                out.flush()?;
            }
            let digest = hash_file(temp.path())?;
            let file_name = format!("{}.{GRAPH_EXTENSION}", hex::encode(&digest));
            let target = graphs_dir.join(&file_name);
            if target.exists() {
                debug!(context = %context, file = %file_name, "graph content already stored");
            } else {
                temp.persist(&target).map_err(|err| BundleError::Io(err.error))?;
            }
            hashes.append(&context, &digest)?;
            append_index(&mut index, &context, &file_name)?;
            included.insert(context);
        }

        index.flush()?;
        hashes.finish()?;
        Ok(included)
    }

    /// Contexts reachable from `included` through the imports relation,
    /// including `included` itself.
    fn import_closure(&self, included: &BTreeSet<String>) -> BTreeSet<String> {
        let mut closure = included.clone();
        let Some(imports_context) = self.imports_context_key.as_deref() else {
            return closure;
        };
        let mut queue: VecDeque<String> = included.iter().cloned().collect();
        while let Some(context) = queue.pop_front() {
            for imported in self.graph.imported_contexts(imports_context, &context) {
                if closure.insert(imported.clone()) {
                    queue.push_back(imported);
                }
            }
        }
        closure
    }

    /// Drop every context contained in a dependency, following dependencies
    /// of dependencies through their installed manifests.
    fn remove_covered(
        &self,
        dependencies: &[DependencyRef],
        uncovered: &mut BTreeSet<String>,
    ) -> Result<()> {
        let mut queue: VecDeque<DependencyRef> = dependencies.iter().cloned().collect();
        let mut visited = HashSet::new();
        while let Some(dep) = queue.pop_front() {
            if uncovered.is_empty() {
                break;
            }
            let directory = find_bundle_directory(&self.bundles_root, &dep.id, dep.version)?;
            if !visited.insert(directory.clone()) {
                continue;
            }
            let index = read_index(&directory.join(GRAPHS_DIR).join(INDEX_FILE))?;
            for (context, _) in index {
                uncovered.remove(&context);
            }
            let manifest = Manifest::read_from_directory(&directory)?;
            queue.extend(manifest.dependencies);
        }
        Ok(())
    }
}

struct SelectedFile {
    name: String,
    source: PathBuf,
}

/// Forward-slash relative name used in `files/hashes`.
fn record_name(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn remove_dir_if_exists(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn rollback(staging: &Path) {
    for dir in [GRAPHS_DIR, FILES_DIR] {
        if let Err(err) = remove_dir_if_exists(&staging.join(dir)) {
            warn!(
                directory = %staging.join(dir).display(),
                error = %err,
                "install rollback failed"
            );
        }
    }
    debug!(directory = %staging.display(), "rolled back install");
}
