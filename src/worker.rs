//! The execution wrapper around one dispatched firing of a job.

use std::panic::AssertUnwindSafe;

use anyhow::Context;
use futures_util::FutureExt;
use sqlx::PgPool;
use tracing::{debug, error};

use crate::job::Job;
use crate::schema::JobResult;
use crate::storage;
use crate::util::try_to_extract_panic_info;

/// Run one firing of `job` and record the attempt.
///
/// A result record is inserted in the `Running` state before the runner is
/// invoked and finalised on every exit path, panics included. Nothing here
/// propagates back to the control loop.
pub(crate) async fn execute(pool: PgPool, job: Job) {
    let mut result = JobResult::start(&job);
    debug!(result.id = %result.id, "running job…");

    let outcome = run_guarded(&pool, &job, &result).await;

    let log = match &outcome {
        Ok(()) => "runner finished without error".to_string(),
        Err(error) => format!("runner failed: {error:#}"),
    };
    if let Err(error) = &outcome {
        error!(result.id = %result.id, "job failed: {error:#}");
    }

    result.finish(outcome.is_ok(), log);
    if let Err(error) = storage::finalize_result(&pool, &result).await {
        // Logged only; the record stays in whatever state the store holds.
        error!(result.id = %result.id, "failed to persist job result: {error}");
    }

    debug!(result.id = %result.id, state = %result.execute_state, "job finished");
}

/// The failure-isolation boundary: everything that must yield a `Fail`
/// record when it goes wrong, panics included.
async fn run_guarded(pool: &PgPool, job: &Job, result: &JobResult) -> anyhow::Result<()> {
    storage::insert_result(pool, result)
        .await
        .context("failed to persist the running record")?;

    let future = (job.runner)(job.runner_args.clone());
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(payload) => Err(try_to_extract_panic_info(&*payload)),
    }
}
