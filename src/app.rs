//! Per-invocation state shared by CLI commands.

use std::path::PathBuf;

use crate::cli::Cli;
use crate::config::Config;
use crate::error::Result;
use crate::remote::TransportRegistry;

pub struct AppContext {
    pub config: Config,
    pub robot_mode: bool,
    /// Directory whose `.bundlekit/config.toml` is the project config.
    pub project_root: PathBuf,
    pub registry: TransportRegistry,
}

impl AppContext {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let project_root = std::env::current_dir()?;
        let mut config = Config::load(cli.config.as_deref(), &project_root)?;
        if let Some(root) = &cli.bundles_root {
            config.store.bundles_root.clone_from(root);
        }
        let registry = TransportRegistry::with_defaults(&config.http);
        Ok(Self {
            config,
            robot_mode: cli.robot,
            project_root,
            registry,
        })
    }
}
