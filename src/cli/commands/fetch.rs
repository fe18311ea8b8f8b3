//! bundlekit fetch - pull a bundle from remotes

use clap::Args;
use serde::Serialize;

use crate::app::AppContext;
use crate::bundler::Manifest;
use crate::cli::commands::RemoteSelectArgs;
use crate::cli::output::{HumanLayout, emit_human, emit_json};
use crate::error::Result;
use crate::remote::Fetcher;

#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Bundle id
    pub id: String,

    /// Version to fetch (default: newest a remote offers)
    #[arg(long)]
    pub version: Option<u64>,

    #[command(flatten)]
    pub select: RemoteSelectArgs,
}

#[derive(Debug, Serialize)]
struct FetchSummary {
    id: String,
    version: u64,
    directory: std::path::PathBuf,
}

pub fn run(ctx: &AppContext, args: &FetchArgs) -> Result<()> {
    let selection = args.select.selection();
    let directory = Fetcher::new(
        &ctx.config.store.bundles_root,
        ctx.config.remotes.clone(),
        &ctx.registry,
    )
    .with_lock_key(ctx.config.store.lock_key.clone())
    .with_wait_interval(ctx.config.store.lock_wait_interval())
    .fetch(&args.id, args.version, selection.as_ref())?;

    let manifest = Manifest::read_from_directory(&directory)?;
    let summary = FetchSummary {
        id: manifest.id,
        version: manifest.version,
        directory,
    };
    if ctx.robot_mode {
        return emit_json(&summary);
    }
    let mut layout = HumanLayout::new();
    layout
        .title("Bundle Fetched")
        .kv("Id", &summary.id)
        .kv("Version", &summary.version.to_string())
        .kv("Directory", &summary.directory.display().to_string());
    emit_human(layout);
    Ok(())
}
