//! CLI module - Command-line interface definitions and handlers
//!
//! Uses clap v4 with derive macros for argument parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub mod commands;
pub mod output;

/// bundlekit - install, cache, fetch and deploy graph bundles
#[derive(Parser, Debug)]
#[command(name = "bundlekit")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Emit JSON on stdout and JSON logs on stderr
    #[arg(long, global = true)]
    pub robot: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file path (default: ~/.config/bundlekit/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Bundle store root, overriding configuration
    #[arg(long, global = true, env = "BUNDLEKIT_BUNDLES_ROOT")]
    pub bundles_root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Install a bundle from a descriptor and a graph
    Install(commands::install::InstallArgs),

    /// Fetch a bundle from remotes into the local store
    #[command(disable_version_flag = true)]
    Fetch(commands::fetch::FetchArgs),

    /// Deploy a bundle directory or archive to remotes
    Deploy(commands::deploy::DeployArgs),

    /// List installed bundles
    List(commands::list::ListArgs),

    /// Show an installed bundle's manifest, contexts and files
    #[command(disable_version_flag = true)]
    Show(commands::show::ShowArgs),

    /// Re-hash an installed bundle against its recorded digests
    #[command(disable_version_flag = true)]
    Verify(commands::verify::VerifyArgs),

    /// Pack an installed bundle into an archive
    #[command(disable_version_flag = true)]
    Pack(commands::pack::PackArgs),

    /// Unpack a bundle archive into the store or a directory
    Unpack(commands::pack::UnpackArgs),

    /// Manage remotes
    Remote(commands::remote::RemoteArgs),
}
