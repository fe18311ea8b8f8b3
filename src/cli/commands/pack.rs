//! bundlekit pack / unpack - move bundles in and out of archives

use std::path::PathBuf;

use clap::Args;
use serde::Serialize;

use crate::app::AppContext;
use crate::bundler::{ArchiveInput, Archiver, Bundle, Unarchiver};
use crate::cli::output::{HumanLayout, emit_human, emit_json};
use crate::error::Result;

#[derive(Args, Debug)]
pub struct PackArgs {
    /// Bundle id
    pub id: String,

    /// Version (default: newest installed)
    #[arg(long)]
    pub version: Option<u64>,

    /// Output directory (default: store.archives_directory)
    #[arg(long, short = 'o')]
    pub out: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct UnpackArgs {
    /// Archive to extract
    pub archive: PathBuf,

    /// Extract here instead of the bundles root; must be empty or absent
    #[arg(long)]
    pub target: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct ArchiveOutput {
    id: String,
    version: u64,
    path: PathBuf,
}

pub fn run_pack(ctx: &AppContext, args: &PackArgs) -> Result<()> {
    let store = &ctx.config.store;
    let manifest = Bundle::new(&args.id, args.version, &store.bundles_root).manifest()?;
    let archives_directory = args
        .out
        .clone()
        .unwrap_or_else(|| store.archives_directory.clone());

    let path = Archiver::new(&store.bundles_root, archives_directory)
        .pack(&manifest.id, manifest.version)?;
    report(
        ctx,
        "Bundle Packed",
        ArchiveOutput {
            id: manifest.id,
            version: manifest.version,
            path,
        },
    )
}

pub fn run_unpack(ctx: &AppContext, args: &UnpackArgs) -> Result<()> {
    let input = ArchiveInput::File(args.archive.clone());
    let manifest = Unarchiver::read_manifest(&input)?;

    // An explicit target stands alone; it need not live in the store.
    let unarchiver = if args.target.is_some() {
        Unarchiver::new(None)
    } else {
        Unarchiver::new(Some(ctx.config.store.bundles_root.clone()))
    };
    let path = unarchiver.unpack(&input, args.target.as_deref())?;
    report(
        ctx,
        "Bundle Unpacked",
        ArchiveOutput {
            id: manifest.id,
            version: manifest.version,
            path,
        },
    )
}

fn report(ctx: &AppContext, title: &str, output: ArchiveOutput) -> Result<()> {
    if ctx.robot_mode {
        return emit_json(&output);
    }
    let mut layout = HumanLayout::new();
    layout
        .title(title)
        .kv("Id", &output.id)
        .kv("Version", &output.version.to_string())
        .kv("Path", &output.path.display().to_string());
    emit_human(layout);
    Ok(())
}
