//! Background worker that polls submitted jobs until they settle

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{PollingConfig, WorkerConfig};
use crate::jobs::job::Job;
use crate::jobs::refresh::JobRefresher;
use crate::jobs::store::StoreWrite;

/// Polling bounds; whichever runs out first ends the loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
    pub deadline: Duration,
}

impl PollingPolicy {
    pub fn from_config(config: &PollingConfig) -> Self {
        Self {
            interval: config.effective_interval(),
            max_attempts: config.max_attempts,
            deadline: config.deadline(),
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    tracked: AtomicU64,
    settled: AtomicU64,
    expired: AtomicU64,
    rejected: AtomicU64,
}

/// Worker statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerStats {
    pub tracked: u64,
    pub settled: u64,
    pub expired: u64,
    pub rejected: u64,
    pub active: usize,
}

/// Feeds job ids to a bounded set of polling tasks
pub struct RefreshWorker {
    tx: mpsc::Sender<String>,
    active: Arc<DashMap<String, ()>>,
    counters: Arc<Counters>,
}

impl RefreshWorker {
    /// Spawn the dispatcher task
    pub fn start(refresher: Arc<JobRefresher>, polling: PollingPolicy, config: &WorkerConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        let active = Arc::new(DashMap::new());
        let counters = Arc::new(Counters::default());

        tokio::spawn(Self::dispatch(
            rx,
            refresher,
            semaphore,
            polling,
            active.clone(),
            counters.clone(),
        ));

        info!(
            queue_capacity = config.queue_capacity,
            max_concurrent = config.max_concurrent,
            "Started job refresh worker"
        );

        Self {
            tx,
            active,
            counters,
        }
    }

    /// Ask the worker to follow a job. Never blocks; returns whether the job
    /// is now being followed.
    pub fn track(&self, job_id: &str) -> bool {
        if self.active.insert(job_id.to_string(), ()).is_some() {
            return true;
        }

        match self.tx.try_send(job_id.to_string()) {
            Ok(()) => {
                self.counters.tracked.fetch_add(1, Ordering::Relaxed);
                debug!(job_id = %job_id, "Job queued for background refresh");
                true
            }
            Err(e) => {
                self.active.remove(job_id);
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                warn!(job_id = %job_id, error = %e, "Refresh queue unavailable, job re-offered on next query");
                false
            }
        }
    }

    pub fn is_tracking(&self, job_id: &str) -> bool {
        self.active.contains_key(job_id)
    }

    pub fn stats(&self) -> WorkerStats {
        WorkerStats {
            tracked: self.counters.tracked.load(Ordering::Relaxed),
            settled: self.counters.settled.load(Ordering::Relaxed),
            expired: self.counters.expired.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            active: self.active.len(),
        }
    }

    async fn dispatch(
        mut rx: mpsc::Receiver<String>,
        refresher: Arc<JobRefresher>,
        semaphore: Arc<Semaphore>,
        polling: PollingPolicy,
        active: Arc<DashMap<String, ()>>,
        counters: Arc<Counters>,
    ) {
        while let Some(job_id) = rx.recv().await {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            let refresher = refresher.clone();
            let active = active.clone();
            let counters = counters.clone();

            tokio::spawn(async move {
                let _permit = permit;
                let outcome = poll_until_settled(&refresher, &job_id, polling).await;
                active.remove(&job_id);
                match outcome {
                    PollOutcome::Settled(_) => {
                        counters.settled.fetch_add(1, Ordering::Relaxed);
                    }
                    PollOutcome::Expired(_) => {
                        counters.expired.fetch_add(1, Ordering::Relaxed);
                    }
                    PollOutcome::Lost => {}
                }
            });
        }
    }
}

/// How a polling loop ended
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// The provider reported a terminal state
    Settled(Job),
    /// Bounds ran out; the job was failed
    Expired(Job),
    /// The job could not be read at all
    Lost,
}

/// Poll a job at a fixed interval until it is terminal, the attempts run
/// out or the deadline passes. Always terminates.
pub async fn poll_until_settled(refresher: &JobRefresher, job_id: &str, polling: PollingPolicy) -> PollOutcome {
    let started = Instant::now();

    for attempt in 1..=polling.max_attempts {
        let remaining = polling.deadline.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            break;
        }
        tokio::time::sleep(polling.interval.min(remaining)).await;

        match refresher.refresh(job_id).await {
            Ok(job) if job.is_terminal() => {
                debug!(job_id = %job_id, attempt = attempt, status = ?job.status, "Job settled");
                return PollOutcome::Settled(job);
            }
            Ok(job) => {
                debug!(job_id = %job_id, attempt = attempt, progress = job.progress, "Job still running");
            }
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "Stopped polling job");
                return PollOutcome::Lost;
            }
        }
    }

    let message = format!(
        "provider did not finish within {} polls or {:?}",
        polling.max_attempts, polling.deadline
    );
    match refresher.store().fail(job_id, message).await {
        Ok(StoreWrite::Applied(job)) => {
            warn!(job_id = %job_id, "Polling bounds exhausted, job failed");
            PollOutcome::Expired(job)
        }
        // Settled by a concurrent refresh in the meantime
        Ok(StoreWrite::Frozen(job)) => PollOutcome::Settled(job),
        Err(e) => {
            warn!(job_id = %job_id, error = %e, "Could not fail expired job");
            PollOutcome::Lost
        }
    }
}
