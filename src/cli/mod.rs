//! Command-line interface for svc-launch.
//!
//! Provides commands for launching the API server under a deployment
//! profile, running the job-queue worker pool, flushing cache databases
//! and inspecting queue depth.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli};
