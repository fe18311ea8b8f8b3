//! E2E test suite entry point.

mod fixture;
mod install_workflow;
mod remote_workflow;
mod transfer_workflow;
