//! Queries against the `job` and `job_result` tables.
//!
//! Each function runs a single statement against the shared pool; no
//! cross-operation transaction is assumed. The job table is written only by
//! the control loop, result records by the dispatched workers.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use crate::job::Job;
use crate::schema::{ExecuteState, JobRecord, JobResult};

/// Embedded migrations for the `job` and `job_result` tables.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

/// Create or update the database schema.
pub async fn setup_database(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    MIGRATOR.run(pool).await
}

/// Load every non-deleted job row.
pub(crate) async fn load_jobs(pool: &PgPool) -> Result<Vec<JobRecord>, sqlx::Error> {
    sqlx::query_as::<_, JobRecord>(
        "SELECT id, ctime, utime, name, cron_rule, opened, runner_name, runner_args
         FROM job
         WHERE deleted = FALSE",
    )
    .fetch_all(pool)
    .await
}

/// Insert a freshly built job and stamp its audit times.
pub(crate) async fn insert_job(pool: &PgPool, job: &mut Job) -> Result<(), sqlx::Error> {
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO job (id, ctime, utime, deleted, name, cron_rule, opened, runner_name, runner_args)
         VALUES ($1, $2, $2, FALSE, $3, $4, $5, $6, $7)",
    )
    .bind(&job.id)
    .bind(now)
    .bind(&job.name)
    .bind(&job.cron_rule)
    .bind(job.opened)
    .bind(&job.runner_name)
    .bind(&job.runner_args)
    .execute(pool)
    .await?;

    job.create_time = now;
    job.update_time = now;
    Ok(())
}

/// Write the mutable job fields and stamp the update time.
pub(crate) async fn update_job(pool: &PgPool, job: &mut Job) -> Result<(), sqlx::Error> {
    let now = Utc::now();
    sqlx::query(
        "UPDATE job
         SET utime = $1, name = $2, cron_rule = $3, opened = $4, runner_name = $5, runner_args = $6
         WHERE id = $7",
    )
    .bind(now)
    .bind(&job.name)
    .bind(&job.cron_rule)
    .bind(job.opened)
    .bind(&job.runner_name)
    .bind(&job.runner_args)
    .bind(&job.id)
    .execute(pool)
    .await?;

    job.update_time = now;
    Ok(())
}

/// Soft-delete a job: the row stays behind for audit but is filtered on
/// every subsequent load.
pub(crate) async fn soft_delete_job(pool: &PgPool, id: &str) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE job SET utime = $1, deleted = TRUE WHERE id = $2")
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Persist a fresh result record. `end_time` stays NULL until finalisation.
pub(crate) async fn insert_result(pool: &PgPool, result: &JobResult) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO job_result (id, deleted, ctime, utime, job_id, job_name, job_cron_rule,
                                 job_runner_name, job_runner_args, start_time, end_time,
                                 execute_state, log)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NULL, $11, $12)",
    )
    .bind(&result.id)
    .bind(result.deleted)
    .bind(result.create_time)
    .bind(result.update_time)
    .bind(&result.job_id)
    .bind(&result.job_name)
    .bind(&result.job_cron_rule)
    .bind(&result.job_runner_name)
    .bind(&result.job_runner_args)
    .bind(result.start_time)
    .bind(result.execute_state.as_str())
    .bind(&result.log)
    .execute(pool)
    .await?;
    Ok(())
}

/// Write the terminal state of a result record.
pub(crate) async fn finalize_result(pool: &PgPool, result: &JobResult) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE job_result
         SET utime = $1, end_time = $2, execute_state = $3, log = $4
         WHERE id = $5",
    )
    .bind(result.update_time)
    .bind(result.end_time)
    .bind(result.execute_state.as_str())
    .bind(&result.log)
    .bind(&result.id)
    .execute(pool)
    .await?;
    Ok(())
}

#[derive(FromRow)]
struct JobResultRow {
    id: String,
    deleted: bool,
    ctime: DateTime<Utc>,
    utime: DateTime<Utc>,
    job_id: String,
    job_name: String,
    job_cron_rule: String,
    job_runner_name: String,
    job_runner_args: String,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    execute_state: String,
    log: String,
}

/// All execution records for one job, oldest first. Rows whose state column
/// holds an unknown value are skipped.
pub async fn job_results(pool: &PgPool, job_id: &str) -> Result<Vec<JobResult>, sqlx::Error> {
    let rows = sqlx::query_as::<_, JobResultRow>(
        "SELECT id, deleted, ctime, utime, job_id, job_name, job_cron_rule, job_runner_name,
                job_runner_args, start_time, end_time, execute_state, log
         FROM job_result
         WHERE job_id = $1 AND deleted = FALSE
         ORDER BY ctime",
    )
    .bind(job_id)
    .fetch_all(pool)
    .await?;

    let results = rows
        .into_iter()
        .filter_map(|row| {
            let execute_state = ExecuteState::from_column(&row.execute_state)?;
            Some(JobResult {
                id: row.id,
                deleted: row.deleted,
                create_time: row.ctime,
                update_time: row.utime,
                job_id: row.job_id,
                job_name: row.job_name,
                job_cron_rule: row.job_cron_rule,
                job_runner_name: row.job_runner_name,
                job_runner_args: row.job_runner_args,
                start_time: row.start_time,
                end_time: row.end_time,
                execute_state,
                log: row.log,
            })
        })
        .collect();

    Ok(results)
}
