pub mod app;
pub mod bundler;
pub mod cli;
pub mod config;
pub mod error;
pub mod graph;
pub mod remote;
pub mod test_utils;

pub use error::{BundleError, Result};

/// Package version from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
