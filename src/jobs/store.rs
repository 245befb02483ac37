//! Job state store: one record per job id, terminal records are write-once

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{AppError, Result};
use crate::jobs::job::Job;
use crate::jobs::normalizer::ProgressReport;

/// Durable storage for job records, owned outside this crate
#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn load(&self, id: &str) -> Result<Option<Job>>;

    async fn save(&self, job: &Job) -> Result<()>;
}

/// Result of a write attempt
#[derive(Debug, Clone, PartialEq)]
pub enum StoreWrite {
    /// The record changed
    Applied(Job),
    /// The record was already terminal and stays as it was
    Frozen(Job),
}

impl StoreWrite {
    pub fn into_job(self) -> Job {
        match self {
            Self::Applied(job) | Self::Frozen(job) => job,
        }
    }

    pub fn was_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SubmissionState {
    InFlight,
    Completed(String),
}

/// Outcome of reserving a submission key
pub enum Reservation<'a> {
    /// The caller owns the key until the guard completes or drops
    Fresh(SubmissionGuard<'a>),
    /// A previous submission with this key produced the given job
    Existing(String),
}

/// Holds a submission key; releases it on drop unless completed
pub struct SubmissionGuard<'a> {
    submissions: &'a DashMap<String, SubmissionState>,
    key: String,
    completed: bool,
}

impl SubmissionGuard<'_> {
    /// Bind the key to the job it produced
    pub fn complete(mut self, job_id: &str) {
        self.submissions
            .insert(self.key.clone(), SubmissionState::Completed(job_id.to_string()));
        self.completed = true;
    }
}

impl Drop for SubmissionGuard<'_> {
    fn drop(&mut self) {
        if !self.completed {
            self.submissions.remove(&self.key);
        }
    }
}

/// In-memory arena of job records with optional write-through persistence
pub struct JobStore {
    jobs: DashMap<String, Job>,
    submissions: DashMap<String, SubmissionState>,
    repository: Option<Arc<dyn JobRepository>>,
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl JobStore {
    pub fn new() -> Self {
        Self {
            jobs: DashMap::new(),
            submissions: DashMap::new(),
            repository: None,
        }
    }

    pub fn with_repository(repository: Arc<dyn JobRepository>) -> Self {
        Self {
            repository: Some(repository),
            ..Self::new()
        }
    }

    /// Reserve `key` so only one submission for it runs at a time
    pub fn begin_submission(&self, key: &str) -> Result<Reservation<'_>> {
        match self.submissions.entry(key.to_string()) {
            Entry::Occupied(entry) => match entry.get() {
                SubmissionState::InFlight => Err(AppError::SubmissionInFlight(key.to_string())),
                SubmissionState::Completed(job_id) => Ok(Reservation::Existing(job_id.clone())),
            },
            Entry::Vacant(entry) => {
                entry.insert(SubmissionState::InFlight);
                Ok(Reservation::Fresh(SubmissionGuard {
                    submissions: &self.submissions,
                    key: key.to_string(),
                    completed: false,
                }))
            }
        }
    }

    /// Record a newly accepted job
    pub async fn insert(&self, job: Job) -> Result<Job> {
        match self.jobs.entry(job.id.clone()) {
            Entry::Occupied(_) => {
                return Err(AppError::Internal(format!("duplicate job id {}", job.id)));
            }
            Entry::Vacant(entry) => {
                entry.insert(job.clone());
            }
        }
        self.persist(&job).await;
        Ok(job)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Job>> {
        if let Some(job) = self.jobs.get(id) {
            return Ok(Some(job.clone()));
        }

        let Some(repository) = &self.repository else {
            return Ok(None);
        };

        let loaded = repository.load(id).await?;
        if let Some(job) = &loaded {
            // A concurrent load may have won; keep whichever landed first
            let cached = self
                .jobs
                .entry(id.to_string())
                .or_insert_with(|| job.clone())
                .clone();
            return Ok(Some(cached));
        }
        Ok(None)
    }

    /// Apply a status report. Terminal records are returned unchanged.
    pub async fn apply(&self, id: &str, report: &ProgressReport, result_urls: Vec<String>) -> Result<StoreWrite> {
        if !self.jobs.contains_key(id) && self.get(id).await?.is_none() {
            return Err(AppError::JobNotFound(id.to_string()));
        }

        let write = {
            let mut entry = self
                .jobs
                .get_mut(id)
                .ok_or_else(|| AppError::JobNotFound(id.to_string()))?;

            if entry.apply(report, result_urls, Utc::now()) {
                StoreWrite::Applied(entry.clone())
            } else {
                StoreWrite::Frozen(entry.clone())
            }
        };

        match &write {
            StoreWrite::Applied(job) => {
                debug!(job_id = %job.id, status = ?job.status, progress = job.progress, "Job updated");
                self.persist(job).await;
            }
            StoreWrite::Frozen(job) => {
                debug!(job_id = %job.id, status = ?job.status, "Ignored write to terminal job");
            }
        }

        Ok(write)
    }

    /// Move a job to failed unless it already finished
    pub async fn fail(&self, id: &str, message: impl Into<String>) -> Result<StoreWrite> {
        self.apply(id, &ProgressReport::failed(message), Vec::new()).await
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    async fn persist(&self, job: &Job) {
        if let Some(repository) = &self.repository {
            if let Err(e) = repository.save(job).await {
                warn!(job_id = %job.id, error = %e, "Failed to persist job record");
            }
        }
    }
}
