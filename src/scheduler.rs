//! The control loop that owns all job state.
//!
//! A single task is the sole mutator of the job list and of the running
//! flag. Everything outside talks to it through a [`SchedulerHandle`],
//! which posts typed commands onto one FIFO queue; snapshot commands carry
//! a oneshot reply slot. The loop multiplexes that queue with a one-shot
//! timer armed against the soonest next firing time.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio::sync::{mpsc, oneshot};
use tokio::time::sleep;
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

use crate::errors::SchedulerError;
use crate::job::{Job, JobSpec};
use crate::registry::RunnerRegistry;
use crate::{storage, worker};

/// Timer duration used while there is nothing to wait for.
const IDLE_NAP: Duration = Duration::from_secs(24 * 60 * 60);

enum Command {
    Start,
    Stop,
    Reload,
    New(JobSpec),
    Update { id: String, spec: JobSpec },
    Delete(String),
    Open(String),
    Close(String),
    JobSnapshot(oneshot::Sender<Vec<Job>>),
    RunningSnapshot(oneshot::Sender<bool>),
}

/// What the control loop does after handling a command.
enum Effect {
    /// Keep waiting on the currently armed timer.
    Kept,
    /// The job list changed; resort and re-arm.
    JobsChanged,
    /// The running flag flipped; re-enter the load/compute phase.
    StateChanged,
}

/// Cloneable command endpoint for a [`Scheduler`].
///
/// All methods except the two snapshots are fire-and-forget: the command is
/// queued and the outcome, success or failure, lands in the log. Snapshots
/// await a reply and observe a consistent point between two commands.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl SchedulerHandle {
    /// Load jobs from the store and begin dispatching. Logged as an error
    /// if the scheduler is already running.
    pub fn start(&self) {
        let _ = self.tx.send(Command::Start);
    }

    /// Stop dispatching and drop the in-memory job list. In-flight
    /// executions are not interrupted. Logged as an error if the scheduler
    /// is already stopped.
    pub fn stop(&self) {
        let _ = self.tx.send(Command::Stop);
    }

    /// Unconditionally re-enter the load phase, starting the scheduler if
    /// it was stopped.
    pub fn reload(&self) {
        let _ = self.tx.send(Command::Reload);
    }

    /// Create a job from `spec` under a fresh id. Only valid while running.
    pub fn new_job(&self, spec: JobSpec) {
        let _ = self.tx.send(Command::New(spec));
    }

    /// Replace the descriptive fields of the job with this `id`. The job is
    /// untouched if the new spec fails to build or to persist.
    pub fn update_job(&self, id: impl Into<String>, spec: JobSpec) {
        let _ = self.tx.send(Command::Update {
            id: id.into(),
            spec,
        });
    }

    /// Soft-delete the job with this `id` and withdraw it from scheduling.
    pub fn delete_job(&self, id: impl Into<String>) {
        let _ = self.tx.send(Command::Delete(id.into()));
    }

    /// Admit the job to scheduling and compute its next firing time.
    pub fn open_job(&self, id: impl Into<String>) {
        let _ = self.tx.send(Command::Open(id.into()));
    }

    /// Withdraw the job from scheduling and clear its next firing time.
    pub fn close_job(&self, id: impl Into<String>) {
        let _ = self.tx.send(Command::Close(id.into()));
    }

    /// A deep copy of the scheduled job list.
    pub async fn jobs(&self) -> Result<Vec<Job>, SchedulerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Command::JobSnapshot(reply_tx))
            .map_err(|_| SchedulerError::Disconnected)?;
        reply_rx.await.map_err(|_| SchedulerError::Disconnected)
    }

    /// Whether the scheduler is currently in its running phase.
    pub async fn is_running(&self) -> Result<bool, SchedulerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Command::RunningSnapshot(reply_tx))
            .map_err(|_| SchedulerError::Disconnected)?;
        reply_rx.await.map_err(|_| SchedulerError::Disconnected)
    }
}

/// The scheduler engine.
///
/// Construction returns the engine and its first command handle; the caller
/// spawns [`Scheduler::run`] and keeps the handle. The engine starts in the
/// stopped phase and does nothing until a Start or Reload command arrives.
pub struct Scheduler {
    pool: PgPool,
    registry: Arc<RunnerRegistry>,
    jobs: Vec<Job>,
    running: bool,
    rx: mpsc::UnboundedReceiver<Command>,
}

impl Scheduler {
    /// Create a scheduler over `pool`, resolving runner names through
    /// `registry`. Clone the handle for additional command endpoints.
    pub fn new(pool: PgPool, registry: RunnerRegistry) -> (Self, SchedulerHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            pool,
            registry: Arc::new(registry),
            jobs: Vec::new(),
            running: false,
            rx,
        };
        (scheduler, SchedulerHandle { tx })
    }

    /// Drive the control loop until every handle has been dropped.
    pub async fn run(mut self) {
        info!("scheduler control loop started");
        loop {
            if self.running {
                self.load_jobs().await;
                self.compute_next_runs(Utc::now());
            } else {
                self.jobs.clear();
            }

            'armed: loop {
                self.sort_jobs();
                let wake = self.time_until_next();
                debug!(?wake, "timer armed");
                let timer = sleep(wake);
                tokio::pin!(timer);

                loop {
                    tokio::select! {
                        command = self.rx.recv() => {
                            let Some(command) = command else {
                                info!("all scheduler handles dropped, control loop exiting");
                                return;
                            };
                            match self.handle_command(command).await {
                                Effect::Kept => {}
                                Effect::JobsChanged => continue 'armed,
                                Effect::StateChanged => break 'armed,
                            }
                        }
                        _ = &mut timer => {
                            self.dispatch_due(Utc::now());
                            continue 'armed;
                        }
                    }
                }
            }
        }
    }

    async fn handle_command(&mut self, command: Command) -> Effect {
        match command {
            Command::Start => {
                if self.running {
                    error!("scheduler is already running");
                    Effect::Kept
                } else {
                    info!("starting scheduler");
                    self.running = true;
                    Effect::StateChanged
                }
            }

            Command::Stop => {
                if self.running {
                    info!("stopping scheduler");
                    self.running = false;
                    Effect::StateChanged
                } else {
                    error!("scheduler is already stopped");
                    Effect::Kept
                }
            }

            Command::Reload => {
                info!("reloading scheduler");
                self.running = true;
                Effect::StateChanged
            }

            Command::JobSnapshot(reply) => {
                let _ = reply.send(self.jobs.clone());
                Effect::Kept
            }

            Command::RunningSnapshot(reply) => {
                let _ = reply.send(self.running);
                Effect::Kept
            }

            Command::New(spec) => {
                if !self.running {
                    error!("scheduler is stopped, ignoring job creation");
                    return Effect::Kept;
                }
                match self.process_new(spec).await {
                    Ok(id) => {
                        info!(job.id = %id, "job created");
                        Effect::JobsChanged
                    }
                    Err(error) => {
                        error!("failed to create job: {error}");
                        Effect::Kept
                    }
                }
            }

            Command::Update { id, spec } => {
                if !self.running {
                    error!("scheduler is stopped, ignoring job update");
                    return Effect::Kept;
                }
                match self.process_update(&id, spec).await {
                    Ok(()) => {
                        info!(job.id = %id, "job updated");
                        Effect::JobsChanged
                    }
                    Err(error) => {
                        error!(job.id = %id, "failed to update job: {error}");
                        Effect::Kept
                    }
                }
            }

            Command::Delete(id) => {
                if !self.running {
                    error!("scheduler is stopped, ignoring job deletion");
                    return Effect::Kept;
                }
                match self.process_delete(&id).await {
                    Ok(()) => {
                        info!(job.id = %id, "job deleted");
                        Effect::JobsChanged
                    }
                    Err(error) => {
                        error!(job.id = %id, "failed to delete job: {error}");
                        Effect::Kept
                    }
                }
            }

            Command::Open(id) => {
                if !self.running {
                    error!("scheduler is stopped, ignoring job open");
                    return Effect::Kept;
                }
                match self.process_open(&id).await {
                    Ok(()) => {
                        info!(job.id = %id, "job opened");
                        Effect::JobsChanged
                    }
                    Err(error) => {
                        error!(job.id = %id, "failed to open job: {error}");
                        Effect::Kept
                    }
                }
            }

            Command::Close(id) => {
                if !self.running {
                    error!("scheduler is stopped, ignoring job close");
                    return Effect::Kept;
                }
                match self.process_close(&id).await {
                    Ok(()) => {
                        info!(job.id = %id, "job closed");
                        Effect::JobsChanged
                    }
                    Err(error) => {
                        error!(job.id = %id, "failed to close job: {error}");
                        Effect::Kept
                    }
                }
            }
        }
    }

    async fn load_jobs(&mut self) {
        let records = match storage::load_jobs(&self.pool).await {
            Ok(records) => records,
            Err(error) => {
                // Keep whatever is scheduled; a Reload can retry.
                error!("failed to load jobs from the store: {error}");
                return;
            }
        };

        let mut jobs = Vec::with_capacity(records.len());
        for record in records {
            let id = record.id.clone();
            match Job::from_record(record, &self.registry) {
                Ok(job) => jobs.push(job),
                Err(error) => {
                    error!(job.id = %id, "skipping stored job that no longer builds: {error}");
                }
            }
        }
        info!("loaded {} jobs from the store", jobs.len());
        self.jobs = jobs;
    }

    fn compute_next_runs(&mut self, after: DateTime<Utc>) {
        debug!("computing next firing times for {} jobs", self.jobs.len());
        for job in &mut self.jobs {
            job.next_run = if job.opened {
                job.cron.next_after(after)
            } else {
                None
            };
        }
    }

    /// Ascending by next firing time, jobs without one last.
    fn sort_jobs(&mut self) {
        self.jobs.sort_by(|a, b| match (a.next_run, b.next_run) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });
    }

    /// Duration until the soonest next firing; a 24 h nap when nothing is
    /// scheduled. A firing time already in the past yields zero, so the
    /// timer matures immediately.
    fn time_until_next(&self) -> Duration {
        match self.jobs.first().and_then(|job| job.next_run) {
            None => IDLE_NAP,
            Some(next) => (next - Utc::now()).to_std().unwrap_or(Duration::ZERO),
        }
    }

    /// Fire every job whose next time has matured. The list is sorted, so
    /// iteration stops at the first job still in the future.
    fn dispatch_due(&mut self, now: DateTime<Utc>) {
        for job in &mut self.jobs {
            let Some(next) = job.next_run else { break };
            if next > now {
                break;
            }
            job.next_run = job.cron.next_after(now);

            // The worker gets its own frozen copy; later mutations by this
            // loop cannot race with the running execution.
            let copy = job.clone();
            info!(job.id = %copy.id, job.name = %copy.name, "dispatching job");
            let span = info_span!("job", job.id = %copy.id, job.name = %copy.name);
            tokio::spawn(worker::execute(self.pool.clone(), copy).instrument(span));
        }
    }

    async fn process_new(&mut self, spec: JobSpec) -> Result<String, SchedulerError> {
        let mut job = Job::build(Uuid::new_v4().to_string(), spec, &self.registry)?;
        storage::insert_job(&self.pool, &mut job).await?;
        job.next_run = if job.opened {
            job.cron.next_after(Utc::now())
        } else {
            None
        };

        let id = job.id.clone();
        self.jobs.push(job);
        Ok(id)
    }

    async fn process_update(&mut self, id: &str, spec: JobSpec) -> Result<(), SchedulerError> {
        let index = self
            .jobs
            .iter()
            .position(|job| job.id == id)
            .ok_or_else(|| SchedulerError::JobNotFound(id.to_string()))?;

        // Build and persist a full candidate first; the scheduled job is
        // replaced only once both have succeeded.
        let mut candidate = Job::build(id.to_string(), spec, &self.registry)?;
        candidate.create_time = self.jobs[index].create_time;
        storage::update_job(&self.pool, &mut candidate).await?;
        candidate.next_run = if candidate.opened {
            candidate.cron.next_after(Utc::now())
        } else {
            None
        };

        self.jobs[index] = candidate;
        Ok(())
    }

    async fn process_delete(&mut self, id: &str) -> Result<(), SchedulerError> {
        let index = self
            .jobs
            .iter()
            .position(|job| job.id == id)
            .ok_or_else(|| SchedulerError::JobNotFound(id.to_string()))?;

        storage::soft_delete_job(&self.pool, id).await?;
        self.jobs.remove(index);
        Ok(())
    }

    async fn process_open(&mut self, id: &str) -> Result<(), SchedulerError> {
        let pool = self.pool.clone();
        let job = self
            .jobs
            .iter_mut()
            .find(|job| job.id == id)
            .ok_or_else(|| SchedulerError::JobNotFound(id.to_string()))?;
        if job.opened {
            return Err(SchedulerError::AlreadyOpened(id.to_string()));
        }

        job.opened = true;
        if let Err(error) = storage::update_job(&pool, job).await {
            // The store is the source of truth; revert the flag.
            job.opened = false;
            return Err(error.into());
        }
        job.next_run = job.cron.next_after(Utc::now());
        Ok(())
    }

    async fn process_close(&mut self, id: &str) -> Result<(), SchedulerError> {
        let pool = self.pool.clone();
        let job = self
            .jobs
            .iter_mut()
            .find(|job| job.id == id)
            .ok_or_else(|| SchedulerError::JobNotFound(id.to_string()))?;
        if !job.opened {
            return Err(SchedulerError::AlreadyClosed(id.to_string()));
        }

        job.opened = false;
        if let Err(error) = storage::update_job(&pool, job).await {
            job.opened = true;
            return Err(error.into());
        }
        job.next_run = None;
        Ok(())
    }
}
