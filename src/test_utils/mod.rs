//! Shared test utilities for bundlekit.

pub mod fixtures;
pub mod logging;

pub use fixtures::{
    BundleFixture, SAMPLE_IMPORTS, hostile_archive, sample_graph, write_bundle_directory,
};
pub use logging::init_test_tracing;
