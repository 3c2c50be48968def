#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod cron;
mod errors;
mod job;
mod registry;
mod scheduler;
/// Database row types for jobs and execution results.
pub mod schema;
mod storage;
mod util;
mod worker;

/// The compiled six-field cron schedule and its next-fire-time evaluator.
pub use self::cron::Cron;
/// Error types for cron parsing and scheduler commands.
pub use self::errors::{CronError, SchedulerError};
/// Scheduled jobs and the specs used to create and update them.
pub use self::job::{Job, JobSpec};
/// The name → runner catalogue consulted when jobs are built.
pub use self::registry::{RunnerFn, RunnerRegistry};
/// The engine and its command handle.
pub use self::scheduler::{Scheduler, SchedulerHandle};
/// Schema management and execution-record queries.
pub use self::storage::{job_results, setup_database, MIGRATOR};
