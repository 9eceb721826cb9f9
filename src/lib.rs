//! svc-launch: deployment supervisor for a cached web API.
//!
//! This library provides the orchestration layer that replaces a family of
//! shell launcher scripts: flushing cache databases before a server start,
//! launching the HTTP application server under a deployment profile, and
//! launching a pool of job-queue consumer processes.

// Core modules
pub mod cli;
pub mod flush;
pub mod launcher;
pub mod profile;
pub mod status;

// Re-export commonly used error types
pub use flush::FlushError;
pub use launcher::{LaunchError, PoolError, SpawnError};
pub use profile::ProfileError;
pub use status::StatusError;
