use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cron::Cron;
use crate::errors::SchedulerError;
use crate::registry::{RunnerFn, RunnerRegistry};
use crate::schema::JobRecord;

/// The caller-supplied fields of a job, carried by the New and Update
/// commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    /// Human-readable job name.
    pub name: String,
    /// Six-field cron expression controlling when the job fires.
    pub cron_rule: String,
    /// Registry name of the unit of work to run.
    pub runner_name: String,
    /// Opaque argument string handed to the runner on every firing.
    pub runner_args: String,
    /// Whether the job participates in scheduling.
    pub opened: bool,
}

/// A job held by the control loop.
///
/// Cloning produces the frozen copy handed to a worker at dispatch time;
/// the runner itself is shared behind an [`Arc`].
#[derive(Clone)]
pub struct Job {
    /// Stable UUID, assigned on creation and kept across updates.
    pub id: String,
    /// Human-readable job name.
    pub name: String,
    /// Six-field cron expression, as written.
    pub cron_rule: String,
    /// Registry name of the unit of work to run.
    pub runner_name: String,
    /// Opaque argument string handed to the runner on every firing.
    pub runner_args: String,
    /// Only opened jobs are considered for dispatch.
    pub opened: bool,
    /// When the job row was created.
    pub create_time: DateTime<Utc>,
    /// When the job row was last updated.
    pub update_time: DateTime<Utc>,
    /// Next firing instant. `None` while the job is closed or when the rule
    /// has no match within the search horizon.
    pub next_run: Option<DateTime<Utc>>,

    pub(crate) cron: Cron,
    pub(crate) runner: Arc<RunnerFn>,
}

impl Job {
    /// Compile a spec into a schedulable job.
    ///
    /// Fails when the cron rule does not parse or the runner name is not
    /// registered; nothing is admitted on failure.
    pub(crate) fn build(
        id: String,
        spec: JobSpec,
        registry: &RunnerRegistry,
    ) -> Result<Self, SchedulerError> {
        let cron = Cron::parse(&spec.cron_rule)?;
        let runner = registry
            .get(&spec.runner_name)
            .ok_or_else(|| SchedulerError::UnknownRunner(spec.runner_name.clone()))?;

        let now = Utc::now();
        Ok(Self {
            id,
            name: spec.name,
            cron_rule: spec.cron_rule,
            runner_name: spec.runner_name,
            runner_args: spec.runner_args,
            opened: spec.opened,
            create_time: now,
            update_time: now,
            next_run: None,
            cron,
            runner,
        })
    }

    /// Rebuild a job from its stored row.
    pub(crate) fn from_record(
        record: JobRecord,
        registry: &RunnerRegistry,
    ) -> Result<Self, SchedulerError> {
        let cron = Cron::parse(&record.cron_rule)?;
        let runner = registry
            .get(&record.runner_name)
            .ok_or_else(|| SchedulerError::UnknownRunner(record.runner_name.clone()))?;

        Ok(Self {
            id: record.id,
            name: record.name,
            cron_rule: record.cron_rule,
            runner_name: record.runner_name,
            runner_args: record.runner_args,
            opened: record.opened,
            create_time: record.ctime,
            update_time: record.utime,
            next_run: None,
            cron,
            runner,
        })
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("cron_rule", &self.cron_rule)
            .field("runner_name", &self.runner_name)
            .field("runner_args", &self.runner_args)
            .field("opened", &self.opened)
            .field("next_run", &self.next_run)
            .finish()
    }
}
