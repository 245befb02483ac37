//! Generation service: the contract callers use to submit and follow jobs

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::backend::registry::ProviderRegistry;
use crate::backend::traits::GenerationRequest;
use crate::config::Settings;
use crate::error::{AppError, Result};
use crate::gateway::failover::FailoverOrchestrator;
use crate::gateway::selector::ProviderSelector;
use crate::gateway::weights::WeightSource;
use crate::jobs::job::{parse_job_id, Job, JobStatus};
use crate::jobs::normalizer::{normalize, ProgressReport};
use crate::jobs::refresh::JobRefresher;
use crate::jobs::store::{JobStore, Reservation};
use crate::jobs::worker::{PollingPolicy, RefreshWorker, WorkerStats};
use crate::telemetry::TelemetrySink;

/// One generated image as handed to a caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultImage {
    pub url: String,
    /// Set when the caller has not paid and sees a preview subset
    pub preview: bool,
}

/// Images of a succeeded job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub job_id: String,
    pub paid: bool,
    pub images: Vec<ResultImage>,
}

impl ResultSet {
    /// Paid callers get every image, others the first `preview_limit`
    pub fn for_job(job: &Job, paid: bool, preview_limit: usize) -> Self {
        let images = if paid {
            job.result_urls
                .iter()
                .map(|url| ResultImage {
                    url: url.clone(),
                    preview: false,
                })
                .collect()
        } else {
            job.result_urls
                .iter()
                .take(preview_limit)
                .map(|url| ResultImage {
                    url: url.clone(),
                    preview: true,
                })
                .collect()
        };

        Self {
            job_id: job.id.clone(),
            paid,
            images,
        }
    }
}

/// Routes new requests and answers progress and result queries
pub struct GenerationService {
    selector: ProviderSelector,
    orchestrator: FailoverOrchestrator,
    store: Arc<JobStore>,
    worker: RefreshWorker,
    preview_limit: usize,
}

impl GenerationService {
    pub fn new(
        selector: ProviderSelector,
        orchestrator: FailoverOrchestrator,
        store: Arc<JobStore>,
        worker: RefreshWorker,
        preview_limit: usize,
    ) -> Self {
        Self {
            selector,
            orchestrator,
            store,
            worker,
            preview_limit,
        }
    }

    /// Wire every component from configuration. Spawns the refresh worker.
    pub fn from_settings(
        settings: &Settings,
        registry: Arc<ProviderRegistry>,
        telemetry: Arc<dyn TelemetrySink>,
        store: Arc<JobStore>,
    ) -> Result<Self> {
        let weights = Arc::new(WeightSource::new(&settings.routing)?);
        let selector = ProviderSelector::from_config(&settings.routing, weights);
        let orchestrator =
            FailoverOrchestrator::new(registry.clone(), telemetry, settings.routing.failover_enabled);
        let refresher = Arc::new(JobRefresher::new(registry, store.clone()));
        let worker = RefreshWorker::start(
            refresher,
            PollingPolicy::from_config(&settings.polling),
            &settings.worker,
        );

        Ok(Self::new(
            selector,
            orchestrator,
            store,
            worker,
            settings.results.preview_limit,
        ))
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    pub fn worker_stats(&self) -> WorkerStats {
        self.worker.stats()
    }

    /// Submit a request and record the accepted job.
    ///
    /// A submission key that already produced a job returns that job with no
    /// provider call; one still in flight is refused.
    pub async fn generate(&self, request: GenerationRequest) -> Result<Job> {
        request.validate()?;

        let guard = match request.submission_key.as_deref() {
            Some(key) => match self.store.begin_submission(key)? {
                Reservation::Existing(job_id) => {
                    info!(submission_key = %key, job_id = %job_id, "Duplicate submission, returning existing job");
                    return self.get_job(&job_id).await;
                }
                Reservation::Fresh(guard) => Some(guard),
            },
            None => None,
        };

        let chosen = self.selector.select().await;
        let accepted = self.orchestrator.generate(chosen, &request).await?;

        let mut job = Job::new(
            accepted.provider,
            accepted.submission.provider_ref.clone(),
            Utc::now(),
        );
        let report = normalize(&accepted.submission.status);
        job.apply(&report, accepted.submission.result_urls, Utc::now());
        if report.status == JobStatus::Succeeded && job.result_urls.is_empty() {
            return Err(AppError::Internal(format!(
                "{} reported success without images",
                accepted.provider
            )));
        }

        let job = self.store.insert(job).await?;
        if let Some(guard) = guard {
            guard.complete(&job.id);
        }

        if !job.is_terminal() {
            self.worker.track(&job.id);
        }

        info!(
            job_id = %job.id,
            provider = %job.provider,
            status = ?job.status,
            attempts = accepted.outcome.attempts,
            fallback_used = accepted.outcome.fallback_used,
            "Generation accepted"
        );

        Ok(job)
    }

    /// Re-arms polling for running jobs nobody is following, e.g. after a
    /// restart or a rejected enqueue
    fn follow(&self, job: &Job) {
        if !job.is_terminal() && !self.worker.is_tracking(&job.id) {
            self.worker.track(&job.id);
        }
    }

    /// Current record for a job, as stored
    pub async fn get_job(&self, job_id: &str) -> Result<Job> {
        parse_job_id(job_id)?;
        self.store
            .get(job_id)
            .await?
            .ok_or_else(|| AppError::JobNotFound(job_id.to_string()))
    }

    /// Normalized progress as last recorded. Never calls a provider; jobs
    /// still running are handed to the refresh worker instead.
    pub async fn get_progress(&self, job_id: &str) -> Result<ProgressReport> {
        let job = self.get_job(job_id).await?;
        self.follow(&job);
        Ok(ProgressReport::from_job(&job))
    }

    /// Images for a succeeded job, limited to previews unless `paid`
    pub async fn get_results(&self, job_id: &str, paid: bool) -> Result<ResultSet> {
        let job = self.get_job(job_id).await?;
        self.follow(&job);

        match job.status {
            JobStatus::Succeeded => Ok(ResultSet::for_job(&job, paid, self.preview_limit)),
            JobStatus::Failed => Err(AppError::JobFailed(job_id.to_string())),
            JobStatus::Queued | JobStatus::Processing => Err(AppError::JobNotReady(job_id.to_string())),
        }
    }
}
