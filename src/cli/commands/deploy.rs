//! bundlekit deploy - push a bundle to remotes

use std::path::PathBuf;

use clap::Args;

use crate::app::AppContext;
use crate::cli::commands::RemoteSelectArgs;
use crate::cli::output::{HumanLayout, emit_human, emit_json};
use crate::error::Result;
use crate::remote::Deployer;

#[derive(Args, Debug)]
pub struct DeployArgs {
    /// Bundle directory or .tar.xz archive
    pub path: PathBuf,

    #[command(flatten)]
    pub select: RemoteSelectArgs,
}

pub fn run(ctx: &AppContext, args: &DeployArgs) -> Result<()> {
    let selection = args.select.selection();
    let report = Deployer::new(ctx.config.remotes.clone(), &ctx.registry)
        .deploy(&args.path, selection.as_ref())?;

    if ctx.robot_mode {
        return emit_json(&report);
    }
    let mut layout = HumanLayout::new();
    layout
        .title("Bundle Deployed")
        .kv("Id", &report.id)
        .kv("Version", &report.version.to_string());
    if report.uploads.is_empty() {
        layout.push_line("No uploader accepted the bundle.");
    }
    for upload in &report.uploads {
        layout.bullet(upload);
    }
    emit_human(layout);
    Ok(())
}
