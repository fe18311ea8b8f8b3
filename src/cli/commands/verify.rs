//! bundlekit verify - re-hash an installed bundle against its records

use clap::Args;

use crate::app::AppContext;
use crate::bundler::Bundle;
use crate::cli::output::{HumanLayout, emit_human, emit_json};
use crate::error::{BundleError, Result};

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Bundle id
    pub id: String,

    /// Version (default: newest installed)
    #[arg(long)]
    pub version: Option<u64>,
}

pub fn run(ctx: &AppContext, args: &VerifyArgs) -> Result<()> {
    let report = Bundle::new(&args.id, args.version, &ctx.config.store.bundles_root).verify()?;

    if ctx.robot_mode {
        emit_json(&report)?;
    } else {
        let mut layout = HumanLayout::new();
        layout
            .title("Bundle Verification")
            .kv("Id", &report.id)
            .kv("Version", &report.version.to_string())
            .kv("Graphs", &report.graphs_checked.to_string())
            .kv("Files", &report.files_checked.to_string())
            .kv("Status", if report.is_ok() { "ok" } else { "FAILED" });
        for problem in &report.problems {
            layout.bullet(&format!("{} {}: {}", problem.kind, problem.name, problem.reason));
        }
        emit_human(layout);
    }

    if report.is_ok() {
        Ok(())
    } else {
        Err(BundleError::VerificationFailed {
            id: report.id,
            version: report.version,
            problems: report.problems.len(),
        })
    }
}
