use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tar::{Builder, EntryType};
use tempfile::TempDir;
use xz2::write::XzEncoder;

use crate::bundler::manifest::Manifest;
use crate::bundler::store::{
    FILES_DIR, GRAPHS_DIR, HASHES_FILE, HashWriter, INDEX_FILE, append_index, bundle_directory,
    hash_reader,
};
use crate::graph::{MemoryGraph, Term};

/// Imports context used by [`sample_graph`].
pub const SAMPLE_IMPORTS: &str = "http://example.org/imports";

/// Isolated bundles root and source directory.
pub struct BundleFixture {
    pub temp_dir: TempDir,
    pub bundles_root: PathBuf,
    pub source_dir: PathBuf,
}

impl BundleFixture {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let bundles_root = temp_dir.path().join("bundles");
        let source_dir = temp_dir.path().join("source");
        std::fs::create_dir_all(&bundles_root).expect("Failed to create bundles root");
        std::fs::create_dir_all(&source_dir).expect("Failed to create source dir");
        Self {
            temp_dir,
            bundles_root,
            source_dir,
        }
    }

    /// Create a file under the source directory.
    pub fn create_source_file(&self, relative_path: &str, content: &str) -> PathBuf {
        let full_path = self.source_dir.join(relative_path);
        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent dirs");
        }
        std::fs::write(&full_path, content).expect("Failed to write file");
        full_path
    }

    /// A scratch directory inside the fixture.
    pub fn scratch(&self, name: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        std::fs::create_dir_all(&path).expect("Failed to create scratch dir");
        path
    }
}

impl Default for BundleFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Three contexts where `a` imports `b` and `b` imports `c`.
pub fn sample_graph() -> MemoryGraph {
    let mut graph = MemoryGraph::new();
    for (ctx, label) in [
        ("http://example.org/a", "alpha"),
        ("http://example.org/b", "beta"),
        ("http://example.org/c", "gamma"),
    ] {
        graph.add(
            ctx,
            "http://example.org/thing",
            "http://www.w3.org/2000/01/rdf-schema#label",
            Term::literal(label),
        );
    }
    graph.add_import(SAMPLE_IMPORTS, "http://example.org/a", "http://example.org/b");
    graph.add_import(SAMPLE_IMPORTS, "http://example.org/b", "http://example.org/c");
    graph
}

/// Write a small, internally consistent bundle directory at
/// `<root>/<id>/<version>` and return it.
pub fn write_bundle_directory(root: &Path, id: &str, version: u64) -> PathBuf {
    let dir = bundle_directory(root, id, version);
    let graphs = dir.join(GRAPHS_DIR);
    let files = dir.join(FILES_DIR);
    std::fs::create_dir_all(&graphs).expect("Failed to create graphs dir");
    std::fs::create_dir_all(&files).expect("Failed to create files dir");

    let graph = format!("<http://example.org/{version}> <http://example.org/p> \"{id}\" .\n");
    let digest = hash_reader(graph.as_bytes()).expect("hash graph");
    let graph_file = format!("{}.nt", hex::encode(&digest));
    std::fs::write(graphs.join(&graph_file), &graph).expect("Failed to write graph");
    let mut hashes = HashWriter::create(&graphs.join(HASHES_FILE)).expect("graph hashes");
    hashes.append("http://example.org/ctx", &digest).expect("graph hash record");
    hashes.finish().expect("graph hashes flush");
    let mut index = std::fs::File::create(graphs.join(INDEX_FILE)).expect("graph index");
    append_index(&mut index, "http://example.org/ctx", &graph_file).expect("index record");
    index.flush().expect("index flush");

    let readme = "bundle fixture\n";
    std::fs::write(files.join("readme.txt"), readme).expect("Failed to write file");
    let mut hashes = HashWriter::create(&files.join(HASHES_FILE)).expect("file hashes");
    hashes
        .append("readme.txt", &hash_reader(readme.as_bytes()).expect("hash file"))
        .expect("file hash record");
    hashes.finish().expect("file hashes flush");

    Manifest::new(id, version)
        .write_to_directory(&dir)
        .expect("Failed to write manifest");
    dir
}

/// Raw tar.xz holding a valid `ex`/1 manifest followed by arbitrary
/// members. Member names and link targets are written verbatim, bypassing
/// the tar builder's own path checks.
pub fn hostile_archive(members: &[(&str, EntryType, Option<&str>)]) -> Vec<u8> {
    let mut builder = Builder::new(XzEncoder::new(Vec::new(), 1));
    let manifest = br#"{"manifest_version":1,"id":"ex","version":1}"#;
    let mut header = tar::Header::new_gnu();
    header.set_size(manifest.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append_data(&mut header, "./manifest", &manifest[..])
        .expect("append manifest");

    for (name, kind, link) in members {
        let mut header = tar::Header::new_old();
        {
            let raw = &mut header.as_old_mut().name;
            raw[..name.len()].copy_from_slice(name.as_bytes());
        }
        header.set_entry_type(*kind);
        header.set_mode(0o644);
        if let Some(link) = link {
            let raw = &mut header.as_old_mut().linkname;
            raw[..link.len()].copy_from_slice(link.as_bytes());
            header.set_size(0);
            header.set_cksum();
            builder.append(&header, io::empty()).expect("append link");
        } else {
            header.set_size(4);
            header.set_cksum();
            builder.append(&header, &b"evil"[..]).expect("append member");
        }
    }
    builder
        .into_inner()
        .and_then(|encoder| encoder.finish())
        .expect("finish archive")
}
