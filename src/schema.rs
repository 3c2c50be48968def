//! Database row types for the `job` and `job_result` tables.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::job::Job;

/// A non-deleted row of the `job` table, as loaded by the scheduler.
#[derive(Debug, Clone, FromRow)]
pub struct JobRecord {
    /// Stable job id.
    pub id: String,
    /// Row creation time.
    pub ctime: DateTime<Utc>,
    /// Last row update time.
    pub utime: DateTime<Utc>,
    /// Human-readable job name.
    pub name: String,
    /// Six-field cron expression.
    pub cron_rule: String,
    /// Whether the job participates in scheduling.
    pub opened: bool,
    /// Registry name of the unit of work to run.
    pub runner_name: String,
    /// Opaque argument string handed to the runner.
    pub runner_args: String,
}

/// Outcome of a single dispatched execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecuteState {
    /// The runner has been dispatched and has not finished yet.
    Running,
    /// The runner returned without error.
    Success,
    /// The runner returned an error, panicked, or its record could not be
    /// persisted at start.
    Fail,
}

impl ExecuteState {
    /// Textual form stored in the `execute_state` column.
    pub fn as_str(self) -> &'static str {
        match self {
            ExecuteState::Running => "RUNNING",
            ExecuteState::Success => "SUCCESS",
            ExecuteState::Fail => "FAIL",
        }
    }

    pub(crate) fn from_column(value: &str) -> Option<Self> {
        match value {
            "RUNNING" => Some(ExecuteState::Running),
            "SUCCESS" => Some(ExecuteState::Success),
            "FAIL" => Some(ExecuteState::Fail),
            _ => None,
        }
    }
}

impl fmt::Display for ExecuteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the `job_result` table: a single execution attempt, carrying a
/// snapshot of the job fields as they were at dispatch time.
#[derive(Debug, Clone)]
pub struct JobResult {
    /// Unique record id, distinct per firing.
    pub id: String,
    /// Soft-delete marker.
    pub deleted: bool,
    /// Record creation time.
    pub create_time: DateTime<Utc>,
    /// Last record update time.
    pub update_time: DateTime<Utc>,

    /// Id of the job that was dispatched.
    pub job_id: String,
    /// Job name at dispatch time.
    pub job_name: String,
    /// Cron rule at dispatch time.
    pub job_cron_rule: String,
    /// Runner name at dispatch time.
    pub job_runner_name: String,
    /// Runner arguments at dispatch time.
    pub job_runner_args: String,

    /// When the execution started.
    pub start_time: DateTime<Utc>,
    /// When the execution finished; `None` while still running.
    pub end_time: Option<DateTime<Utc>>,
    /// Current state of the execution.
    pub execute_state: ExecuteState,
    /// Human-readable outcome description.
    pub log: String,
}

impl JobResult {
    /// A fresh record for one dispatch of `job`: `Running`, no end time.
    pub(crate) fn start(job: &Job) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            deleted: false,
            create_time: now,
            update_time: now,
            job_id: job.id.clone(),
            job_name: job.name.clone(),
            job_cron_rule: job.cron_rule.clone(),
            job_runner_name: job.runner_name.clone(),
            job_runner_args: job.runner_args.clone(),
            start_time: now,
            end_time: None,
            execute_state: ExecuteState::Running,
            log: String::new(),
        }
    }

    /// Transition to the terminal state. Called exactly once per record.
    pub(crate) fn finish(&mut self, success: bool, log: String) {
        let now = Utc::now();
        self.end_time = Some(now);
        self.update_time = now;
        self.log = log;
        self.execute_state = if success {
            ExecuteState::Success
        } else {
            ExecuteState::Fail
        };
    }
}
