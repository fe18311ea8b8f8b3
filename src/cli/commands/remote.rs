//! bundlekit remote - manage project remotes

use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::app::AppContext;
use crate::cli::output::{HumanLayout, emit_human, emit_json};
use crate::config::{remove_project_remote, save_project_remote};
use crate::error::{BundleError, Result};
use crate::remote::{AccessorConfig, Remote};

#[derive(Args, Debug)]
pub struct RemoteArgs {
    #[command(subcommand)]
    pub command: RemoteCommand,
}

#[derive(Subcommand, Debug)]
pub enum RemoteCommand {
    /// Add (or replace) a remote in the project config
    Add {
        /// Remote name
        name: String,

        /// Index URL, or a directory with --directory
        location: String,

        /// Treat LOCATION as a directory of archives
        #[arg(long)]
        directory: bool,

        /// PEM root certificate to trust for an HTTPS remote
        #[arg(long, value_name = "FILE", conflicts_with = "directory")]
        ca_cert: Option<PathBuf>,
    },

    /// List configured remotes
    List,

    /// Remove a remote from the project config
    Remove {
        /// Remote name
        name: String,
    },
}

pub fn run(ctx: &AppContext, args: &RemoteArgs) -> Result<()> {
    match &args.command {
        RemoteCommand::Add {
            name,
            location,
            directory,
            ca_cert,
        } => {
            let remote = Remote::new(name.clone()).with_accessor(accessor(
                location,
                *directory,
                ca_cert.clone(),
            ));
            let path = save_project_remote(&ctx.project_root, &remote)?;
            if ctx.robot_mode {
                return emit_json(&remote);
            }
            println!("Added remote {name} to {}", path.display());
            Ok(())
        }
        RemoteCommand::List => {
            if ctx.robot_mode {
                return emit_json(&ctx.config.remotes);
            }
            if ctx.config.remotes.is_empty() {
                println!("No remotes configured.");
                return Ok(());
            }
            let mut layout = HumanLayout::new();
            layout.title("Remotes");
            for remote in &ctx.config.remotes {
                let locations: Vec<String> =
                    remote.accessors.iter().map(describe_accessor).collect();
                layout.kv(&remote.name, &locations.join(", "));
            }
            emit_human(layout);
            Ok(())
        }
        RemoteCommand::Remove { name } => {
            if !remove_project_remote(&ctx.project_root, name)? {
                return Err(BundleError::Config(format!(
                    "remote {name} is not in the project config"
                )));
            }
            if ctx.robot_mode {
                return emit_json(&serde_json::json!({ "removed": name }));
            }
            println!("Removed remote {name}");
            Ok(())
        }
    }
}

fn accessor(location: &str, directory: bool, ca_certificate: Option<PathBuf>) -> AccessorConfig {
    if directory {
        AccessorConfig::directory(location)
    } else if ca_certificate.is_some() {
        AccessorConfig::Https {
            url: location.to_string(),
            ca_certificate,
        }
    } else {
        AccessorConfig::url(location)
    }
}

fn describe_accessor(config: &AccessorConfig) -> String {
    match config {
        AccessorConfig::Url { url } => url.clone(),
        AccessorConfig::Https {
            url,
            ca_certificate: Some(ca),
        } => format!("{url} (ca {})", ca.display()),
        AccessorConfig::Https { url, .. } => url.clone(),
        AccessorConfig::Directory { path } => path.display().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn parse_remote_add() {
        let cli = crate::cli::Cli::parse_from([
            "bundlekit",
            "remote",
            "add",
            "shared",
            "/srv/bundles",
            "--directory",
        ]);
        let crate::cli::Commands::Remote(args) = cli.command else {
            panic!("expected remote command");
        };
        let RemoteCommand::Add {
            name, directory, ..
        } = args.command
        else {
            panic!("expected add");
        };
        assert_eq!(name, "shared");
        assert!(directory);
    }

    #[test]
    fn ca_cert_makes_an_https_accessor() {
        let config = accessor("https://h/index.json", false, Some(PathBuf::from("ca.pem")));
        assert!(matches!(config, AccessorConfig::Https { .. }));
        assert_eq!(accessor("/srv", true, None), AccessorConfig::directory("/srv"));
        assert_eq!(
            accessor("https://h/i", false, None),
            AccessorConfig::url("https://h/i")
        );
    }

    #[test]
    fn ca_cert_conflicts_with_directory() {
        let result = crate::cli::Cli::try_parse_from([
            "bundlekit",
            "remote",
            "add",
            "x",
            "/srv",
            "--directory",
            "--ca-cert",
            "ca.pem",
        ]);
        assert!(result.is_err());
    }
}
