//! bundlekit install - build a bundle version from a descriptor

use std::path::{Path, PathBuf};

use clap::Args;
use serde::Serialize;

use crate::app::AppContext;
use crate::bundler::{Bundle, Descriptor, Installer};
use crate::cli::output::{HumanLayout, emit_human, emit_json};
use crate::error::Result;
use crate::graph::MemoryGraph;

#[derive(Args, Debug)]
pub struct InstallArgs {
    /// Descriptor file (YAML)
    pub descriptor: PathBuf,

    /// N-Quads file supplying the source graph (repeatable)
    #[arg(long = "graph", short = 'g', value_name = "FILE")]
    pub graphs: Vec<PathBuf>,

    /// Directory file selections are relative to (default: descriptor's directory)
    #[arg(long)]
    pub source: Option<PathBuf>,

    /// Context holding owl:imports edges between contexts
    #[arg(long)]
    pub imports_context: Option<String>,

    /// Context recorded as the bundle's default context
    #[arg(long)]
    pub default_context: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InstallSummary {
    pub id: String,
    pub version: u64,
    pub directory: PathBuf,
    pub contexts: Vec<String>,
    pub files: Vec<String>,
}

pub fn run(ctx: &AppContext, args: &InstallArgs) -> Result<()> {
    let descriptor = Descriptor::load(&args.descriptor)?;
    let graph = load_graphs(&args.graphs)?;
    let source = source_directory(ctx, args);

    let imports_context = args
        .imports_context
        .clone()
        .or_else(|| ctx.config.install.imports_context_key.clone());
    let default_context = args
        .default_context
        .clone()
        .or_else(|| ctx.config.install.default_context_key.clone());

    let directory = Installer::new(&ctx.config.store.bundles_root, source, &graph)
        .with_imports_context(imports_context)
        .with_default_context(default_context)
        .with_lock_key(ctx.config.store.lock_key.clone())
        .with_wait_interval(ctx.config.store.lock_wait_interval())
        .install(&descriptor)?;

    let bundle = Bundle::new(
        &descriptor.id,
        Some(descriptor.version),
        &ctx.config.store.bundles_root,
    );
    let summary = InstallSummary {
        id: descriptor.id.clone(),
        version: descriptor.version,
        directory,
        contexts: bundle.contexts()?,
        files: bundle.files()?,
    };

    if ctx.robot_mode {
        return emit_json(&summary);
    }
    let mut layout = HumanLayout::new();
    layout
        .title("Bundle Installed")
        .kv("Id", &summary.id)
        .kv("Version", &summary.version.to_string())
        .kv("Directory", &summary.directory.display().to_string())
        .kv("Contexts", &summary.contexts.len().to_string())
        .kv("Files", &summary.files.len().to_string());
    emit_human(layout);
    Ok(())
}

fn load_graphs(paths: &[PathBuf]) -> Result<MemoryGraph> {
    let mut graph = MemoryGraph::new();
    for path in paths {
        graph.merge(MemoryGraph::load_nquads(path)?);
    }
    Ok(graph)
}

fn source_directory(ctx: &AppContext, args: &InstallArgs) -> PathBuf {
    args.source
        .clone()
        .or_else(|| ctx.config.install.source_directory.clone())
        .unwrap_or_else(|| {
            args.descriptor
                .parent()
                .filter(|parent| !parent.as_os_str().is_empty())
                .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
        })
}
