//! bundlekit list - list installed bundles

use clap::Args;

use crate::app::AppContext;
use crate::bundler::{Cache, CachedBundle};
use crate::cli::output::{HumanLayout, emit_human, emit_json};
use crate::error::Result;

#[derive(Args, Debug, Default)]
pub struct ListArgs {
    /// Only list this bundle id
    #[arg(long)]
    pub id: Option<String>,

    /// Only the newest version of each bundle
    #[arg(long)]
    pub latest: bool,
}

pub fn run(ctx: &AppContext, args: &ListArgs) -> Result<()> {
    let cache = Cache::new(&ctx.config.store.bundles_root);
    let mut bundles: Vec<CachedBundle> = cache
        .list()
        .filter(|b| args.id.as_ref().is_none_or(|id| &b.manifest.id == id))
        .collect();
    if args.latest {
        // Versions come newest first within an id.
        bundles.dedup_by(|later, earlier| later.manifest.id == earlier.manifest.id);
    }

    if ctx.robot_mode {
        return emit_json(&bundles);
    }
    if bundles.is_empty() {
        println!("No bundles installed under {}", cache.bundles_root().display());
        return Ok(());
    }
    let mut layout = HumanLayout::new();
    layout.title("Installed Bundles");
    for bundle in &bundles {
        layout.kv(
            &bundle.manifest.id,
            &format!("v{}  {}", bundle.manifest.version, bundle.directory.display()),
        );
    }
    emit_human(layout);
    Ok(())
}
