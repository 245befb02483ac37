//! Refreshing a job from its provider

use std::sync::Arc;
use tracing::{debug, warn};

use crate::backend::registry::ProviderRegistry;
use crate::error::{AppError, Result};
use crate::jobs::job::{parse_job_id, Job, JobStatus};
use crate::jobs::normalizer::{normalize, normalize_failure};
use crate::jobs::store::JobStore;

/// Queries a job's provider and persists what it learns
pub struct JobRefresher {
    registry: Arc<ProviderRegistry>,
    store: Arc<JobStore>,
}

impl JobRefresher {
    pub fn new(registry: Arc<ProviderRegistry>, store: Arc<JobStore>) -> Self {
        Self { registry, store }
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    /// Bring a job up to date.
    ///
    /// Terminal jobs are returned straight from the store without any
    /// provider call. Any failure while querying the provider fails the job.
    pub async fn refresh(&self, job_id: &str) -> Result<Job> {
        let (kind, provider_ref) = parse_job_id(job_id)?;
        let job = self
            .store
            .get(job_id)
            .await?
            .ok_or_else(|| AppError::JobNotFound(job_id.to_string()))?;

        if job.is_terminal() {
            return Ok(job);
        }

        let adapter = self.registry.get(kind);

        let report = match adapter.progress(provider_ref).await {
            Ok(native) => normalize(&native),
            Err(e) => {
                warn!(job_id = %job_id, provider = %kind, error = %e, "Status query failed, failing job");
                let report = normalize_failure(kind, &e);
                return Ok(self.store.apply(job_id, &report, Vec::new()).await?.into_job());
            }
        };

        let result_urls = if report.status == JobStatus::Succeeded {
            match adapter.results(provider_ref).await {
                Ok(urls) => urls,
                Err(e) => {
                    warn!(job_id = %job_id, provider = %kind, error = %e, "Result fetch failed, failing job");
                    let message = format!("{} finished but results were unavailable: {}", kind, e);
                    return Ok(self.store.fail(job_id, message).await?.into_job());
                }
            }
        } else {
            Vec::new()
        };

        let job = self.store.apply(job_id, &report, result_urls).await?.into_job();
        debug!(job_id = %job_id, status = ?job.status, progress = job.progress, "Job refreshed");
        Ok(job)
    }
}
