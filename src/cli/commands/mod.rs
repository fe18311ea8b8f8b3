//! Command implementations.

use std::path::PathBuf;

use clap::Args;

use crate::app::AppContext;
use crate::cli::Commands;
use crate::error::Result;
use crate::remote::{AccessorConfig, Remote, RemoteSelection};

pub mod deploy;
pub mod fetch;
pub mod install;
pub mod list;
pub mod pack;
pub mod remote;
pub mod show;
pub mod verify;

pub fn run(ctx: &AppContext, command: &Commands) -> Result<()> {
    match command {
        Commands::Install(args) => install::run(ctx, args),
        Commands::Fetch(args) => fetch::run(ctx, args),
        Commands::Deploy(args) => deploy::run(ctx, args),
        Commands::List(args) => list::run(ctx, args),
        Commands::Show(args) => show::run(ctx, args),
        Commands::Verify(args) => verify::run(ctx, args),
        Commands::Pack(args) => pack::run_pack(ctx, args),
        Commands::Unpack(args) => pack::run_unpack(ctx, args),
        Commands::Remote(args) => remote::run(ctx, args),
    }
}

/// Remote selection flags shared by `fetch` and `deploy`.
#[derive(Args, Debug, Default, Clone)]
pub struct RemoteSelectArgs {
    /// Use only this configured remote (repeatable)
    #[arg(long = "remote", value_name = "NAME")]
    pub remotes: Vec<String>,

    /// Ad-hoc HTTP(S) remote URL (repeatable)
    #[arg(long = "url", value_name = "URL")]
    pub urls: Vec<String>,

    /// Ad-hoc directory remote (repeatable)
    #[arg(long = "dir", value_name = "PATH")]
    pub directories: Vec<PathBuf>,
}

impl RemoteSelectArgs {
    /// `None` when no flag was given, so every configured remote is used.
    pub fn selection(&self) -> Option<RemoteSelection> {
        let extra: Vec<Remote> = self
            .urls
            .iter()
            .map(|url| Remote::new(url.clone()).with_accessor(AccessorConfig::url(url.clone())))
            .chain(self.directories.iter().map(|path| {
                Remote::new(path.display().to_string())
                    .with_accessor(AccessorConfig::directory(path.clone()))
            }))
            .collect();
        let selection = RemoteSelection {
            names: self.remotes.clone(),
            extra,
        };
        (!selection.is_empty()).then_some(selection)
    }
}
