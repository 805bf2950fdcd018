//! SweepScheduler - sweep の起動、重複排除、バックオフ
//!
//! `schedule(job_id)` semantics:
//! - a newer request for the same job supersedes one that has not started yet
//! - a sweep that is already executing always runs to completion
//! - a sweep only starts while `Connectivity::is_online` holds
//! - a sweep that leaves failures behind is retried with exponential backoff;
//!   the backoff wait counts as "not started" and can be superseded

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span, warn};

use super::backoff::RetryPolicy;
use super::driver::SweepReport;
use crate::ports::Connectivity;

/// Logical job name, e.g. `document-outbox-sweep`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A unit of work the scheduler can run. Never fails; problems are in the report.
#[async_trait]
pub trait SweepJob: Send + Sync {
    async fn run(&self) -> SweepReport;
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("job already registered: {0}")]
    DuplicateJob(JobId),

    #[error("unknown job: {0}")]
    UnknownJob(JobId),
}

/// Registry of jobs (job id -> job).
///
/// Built during initialization, read-only once handed to the scheduler.
#[derive(Default)]
pub struct SweepRegistry {
    jobs: HashMap<JobId, Arc<dyn SweepJob>>,
}

impl SweepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: JobId, job: Arc<dyn SweepJob>) -> Result<(), SchedulerError> {
        if self.jobs.contains_key(&id) {
            return Err(SchedulerError::DuplicateJob(id));
        }
        self.jobs.insert(id, job);
        Ok(())
    }

    pub fn get(&self, id: &JobId) -> Option<&Arc<dyn SweepJob>> {
        self.jobs.get(id)
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub backoff: RetryPolicy,
    /// How often to re-check connectivity while offline.
    pub connectivity_poll: Duration,
    /// Give up on a request after this many retries. `None` retries until superseded.
    pub max_retries: Option<u32>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            backoff: RetryPolicy::default(),
            connectivity_poll: Duration::from_secs(5),
            max_retries: None,
        }
    }
}

/// How a scheduled request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepOutcome {
    /// The last sweep run for this request.
    Completed(SweepReport),
    /// A newer request for the same job took over before this one started.
    Superseded,
    /// The scheduler shut down before this request started.
    Shutdown,
    /// The request's task ended without an outcome (the job panicked or the
    /// runtime dropped the task). The item state is whatever the job left.
    Aborted(String),
}

/// Handle to one scheduled request. Dropping it does not cancel the request.
pub struct SweepHandle {
    job_id: JobId,
    join: JoinHandle<SweepOutcome>,
}

impl SweepHandle {
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    pub async fn wait(self) -> SweepOutcome {
        match self.join.await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(job = %self.job_id, error = %err, "scheduled sweep task ended abnormally");
                SweepOutcome::Aborted(err.to_string())
            }
        }
    }
}

struct JobSlot {
    job: Arc<dyn SweepJob>,
    /// Bumped on every `schedule`; a request only runs while it holds the latest value.
    generation: watch::Sender<u64>,
    /// Held while the job executes, so at most one sweep per job runs at a time.
    running: Arc<Mutex<()>>,
}

pub struct SweepScheduler {
    slots: HashMap<JobId, JobSlot>,
    connectivity: Arc<dyn Connectivity>,
    config: SchedulerConfig,
    shutdown_tx: watch::Sender<bool>,
}

impl SweepScheduler {
    pub fn new(registry: SweepRegistry, connectivity: Arc<dyn Connectivity>, config: SchedulerConfig) -> Self {
        let slots = registry
            .jobs
            .into_iter()
            .map(|(id, job)| {
                let slot = JobSlot {
                    job,
                    generation: watch::Sender::new(0),
                    running: Arc::new(Mutex::new(())),
                };
                (id, slot)
            })
            .collect();
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            slots,
            connectivity,
            config,
            shutdown_tx,
        }
    }

    pub fn job_ids(&self) -> Vec<JobId> {
        let mut ids: Vec<JobId> = self.slots.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Request a sweep of `job_id`, replacing any request for it that has not started.
    pub fn schedule(&self, job_id: &JobId) -> Result<SweepHandle, SchedulerError> {
        let slot = self
            .slots
            .get(job_id)
            .ok_or_else(|| SchedulerError::UnknownJob(job_id.clone()))?;

        let mut generation = 0;
        slot.generation.send_modify(|current| {
            *current += 1;
            generation = *current;
        });
        debug!(job = %job_id, generation, "sweep scheduled");

        let request = ScheduledRequest {
            job_id: job_id.clone(),
            generation,
            job: Arc::clone(&slot.job),
            running: Arc::clone(&slot.running),
            generation_rx: slot.generation.subscribe(),
            shutdown_rx: self.shutdown_tx.subscribe(),
            connectivity: Arc::clone(&self.connectivity),
            config: self.config.clone(),
        };
        let span = info_span!("scheduled_sweep", job = %job_id, generation);
        let join = tokio::spawn(request.run().instrument(span));

        Ok(SweepHandle {
            job_id: job_id.clone(),
            join,
        })
    }

    /// Stop every request that has not started. Executing sweeps finish.
    pub fn shutdown(&self) {
        // send_replace: later requests must also observe the flag
        self.shutdown_tx.send_replace(true);
    }
}

struct ScheduledRequest {
    job_id: JobId,
    generation: u64,
    job: Arc<dyn SweepJob>,
    running: Arc<Mutex<()>>,
    generation_rx: watch::Receiver<u64>,
    shutdown_rx: watch::Receiver<bool>,
    connectivity: Arc<dyn Connectivity>,
    config: SchedulerConfig,
}

impl ScheduledRequest {
    async fn run(mut self) -> SweepOutcome {
        let mut retry = 0u32;
        loop {
            if *self.shutdown_rx.borrow() {
                return SweepOutcome::Shutdown;
            }
            if let Some(outcome) = self.wait_until_online().await {
                return outcome;
            }

            let guard = tokio::select! {
                guard = Arc::clone(&self.running).lock_owned() => guard,
                _ = superseded(&mut self.generation_rx, self.generation) => return SweepOutcome::Superseded,
                _ = shutdown_requested(&mut self.shutdown_rx) => return SweepOutcome::Shutdown,
            };
            if *self.generation_rx.borrow() != self.generation {
                return SweepOutcome::Superseded;
            }

            // ここから先は中断しない
            let report = self.job.run().await;
            drop(guard);

            if !report.needs_retry() {
                return SweepOutcome::Completed(report);
            }
            retry += 1;
            if let Some(max) = self.config.max_retries
                && retry > max
            {
                warn!(job = %self.job_id, retries = max, "giving up on sweep retries");
                return SweepOutcome::Completed(report);
            }

            let delay = self.config.backoff.jittered_delay(retry);
            info!(
                job = %self.job_id,
                retry,
                failed = report.failed,
                delay_ms = delay.as_millis() as u64,
                "sweep left failures; retrying after backoff",
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = superseded(&mut self.generation_rx, self.generation) => return SweepOutcome::Superseded,
                _ = shutdown_requested(&mut self.shutdown_rx) => return SweepOutcome::Shutdown,
            }
        }
    }

    async fn wait_until_online(&mut self) -> Option<SweepOutcome> {
        loop {
            if self.connectivity.is_online().await {
                return None;
            }
            debug!(job = %self.job_id, "offline; waiting before sweep");
            tokio::select! {
                _ = tokio::time::sleep(self.config.connectivity_poll) => {}
                _ = superseded(&mut self.generation_rx, self.generation) => return Some(SweepOutcome::Superseded),
                _ = shutdown_requested(&mut self.shutdown_rx) => return Some(SweepOutcome::Shutdown),
            }
        }
    }
}

/// Resolves once a newer generation than `mine` has been scheduled.
async fn superseded(rx: &mut watch::Receiver<u64>, mine: u64) {
    loop {
        if *rx.borrow_and_update() != mine {
            return;
        }
        if rx.changed().await.is_err() {
            // scheduler dropped: nobody can supersede us any more
            std::future::pending::<()>().await;
        }
    }
}

async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}
