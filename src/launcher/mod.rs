//! Process supervision for the API server and its worker pool.
//!
//! This module launches the external collaborators the deployment is made
//! of: one foreground HTTP application server per profile, and a pool of
//! identical job-queue consumer processes.
//!
//! # Architecture
//!
//! ```text
//!              ┌────────────────┐
//!              │   svc-launch   │
//!              └───────┬────────┘
//!            flush     │    spawn
//!       ┌──────────────┼───────────────────┐
//!       ▼              ▼                   ▼
//! ┌───────────┐  ┌───────────┐   ┌──────────────────┐
//! │   Cache   │  │   ASGI    │   │ Consumer x count │
//! │   store   │  │  server   │   │   (queue jobs)   │
//! └───────────┘  └───────────┘   └──────────────────┘
//! ```
//!
//! The flush step always completes before the server spawns, and its
//! result is checked. The worker pool waits on every child and only
//! returns once all of them have exited.

pub mod child;
pub mod pool;
pub mod server;

// Re-export main types for convenience
pub use child::{ChildSpec, SpawnError};
pub use pool::{PoolConfig, PoolError, PoolOutcome, WorkerPool};
pub use server::{LaunchError, ServerLaunch, ServerStyle};
