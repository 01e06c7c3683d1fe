//! # berth-runtime
//!
//! Lifecycle supervision for planned deployments.
//!
//! Handles:
//! - **Backends**: docker containers or host processes behind one trait.
//! - **Supervisor**: dependency-gated startup, restart policies with
//!   backoff, and ordered shutdown.
//! - **Engine**: descriptor file to supervised project.
//! - **State and logs**: JSON snapshot and per-service log files under the
//!   project's `.berth/` directory.

#![cfg_attr(
    test,
    allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)
)]

pub mod backend;
pub mod engine;
pub mod env_file;
pub mod logs;
pub mod project;
pub mod state;
pub mod supervisor;

pub use engine::Engine;
pub use project::Project;
pub use supervisor::{ServiceReport, Supervisor, SupervisorReport};
