//! bundlekit show - describe an installed bundle

use clap::Args;
use serde::Serialize;

use crate::app::AppContext;
use crate::bundler::{Bundle, Manifest};
use crate::cli::output::{HumanLayout, emit_human, emit_json};
use crate::error::Result;

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Bundle id
    pub id: String,

    /// Version (default: newest installed)
    #[arg(long)]
    pub version: Option<u64>,

    /// Fetch from configured remotes when not installed
    #[arg(long)]
    pub fetch: bool,
}

#[derive(Debug, Serialize)]
struct ShowOutput<'a> {
    manifest: &'a Manifest,
    directory: &'a std::path::Path,
    contexts: &'a [String],
    files: &'a [String],
}

pub fn run(ctx: &AppContext, args: &ShowArgs) -> Result<()> {
    let mut bundle = Bundle::new(&args.id, args.version, &ctx.config.store.bundles_root);
    if args.fetch {
        bundle = bundle.with_remotes(ctx.config.remotes.clone(), &ctx.registry);
    }

    let directory = bundle.resolve()?.to_path_buf();
    let manifest = bundle.manifest()?;
    let contexts = bundle.contexts()?;
    let files = bundle.files()?;

    if ctx.robot_mode {
        return emit_json(&ShowOutput {
            manifest: &manifest,
            directory: &directory,
            contexts: &contexts,
            files: &files,
        });
    }

    let mut layout = HumanLayout::new();
    layout
        .title(&manifest.id)
        .kv("Version", &manifest.version.to_string())
        .kv("Directory", &directory.display().to_string());
    if let Some(key) = &manifest.default_context_key {
        layout.kv("Default ctx", key);
    }
    if let Some(key) = &manifest.imports_context_key {
        layout.kv("Imports ctx", key);
    }

    if !manifest.dependencies.is_empty() {
        layout.section("Dependencies");
        for dep in &manifest.dependencies {
            match dep.version {
                Some(version) => layout.bullet(&format!("{} v{version}", dep.id)),
                None => layout.bullet(&dep.id),
            };
        }
    }

    layout.section("Contexts");
    for context in &contexts {
        layout.bullet(context);
    }
    if !files.is_empty() {
        layout.section("Files");
        for file in &files {
            layout.bullet(file);
        }
    }
    emit_human(layout);
    Ok(())
}
