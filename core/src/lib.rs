#![deny(missing_docs)]
//! jobs_core: shared building blocks for the job scheduler (config, job
//! table, per-job logs, cron parsing, logging).

/// Configuration helpers (AppId, dirs, load_or_init, etc.)
pub mod cfg;
/// Error taxonomy shared by the daemon and the CLI.
pub mod error;
/// Append-only per-job log files.
pub mod joblog;
/// Tracing/log initialization helpers.
pub mod logx;
/// Job model shared by the engine, the web API and the CLI.
pub mod job;
/// Cron expression parsing and next-fire computation.
pub mod schedule;
/// Resolution of worker script names to paths.
pub mod script;
/// JSON-file backed job table.
pub mod store;

pub use error::{JobError, Result};
