//! Simulated provider driven by a clock instead of the network

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::backend::clock::Clock;
use crate::backend::traits::{
    GenerationRequest, NativeStatus, ProviderHealth, ProviderKind, Submission,
};
use crate::config::MockConfig;
use crate::error::ProviderError;

pub const STATE_PROCESSING: &str = "processing";
pub const STATE_SUCCEEDED: &str = "succeeded";

#[derive(Debug, Clone)]
struct MockJob {
    created_at: DateTime<Utc>,
    style: String,
    template: String,
}

/// Cost-free stand-in for a real provider.
///
/// Jobs live in this instance only; two instances never share state.
pub struct MockBackend {
    clock: Arc<dyn Clock>,
    duration: chrono::Duration,
    output_count: u32,
    asset_base_url: String,
    jobs: DashMap<String, MockJob>,
    status_queries: AtomicU64,
}

impl MockBackend {
    pub fn new(config: &MockConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            duration: chrono::Duration::seconds(config.duration_secs as i64),
            output_count: config.output_count.max(1),
            asset_base_url: config.asset_base_url.trim_end_matches('/').to_string(),
            jobs: DashMap::new(),
            status_queries: AtomicU64::new(0),
        }
    }

    pub async fn submit(&self, request: &GenerationRequest) -> Result<Submission, ProviderError> {
        let provider_ref = Uuid::new_v4().simple().to_string();
        let job = MockJob {
            created_at: self.clock.now(),
            style: slug(&request.style),
            template: slug(&request.template),
        };
        self.jobs.insert(provider_ref.clone(), job);

        debug!(provider_ref = %provider_ref, "Simulated job accepted");

        let (state, progress) = simulate(chrono::Duration::zero(), self.duration);
        Ok(Submission {
            provider_ref,
            status: NativeStatus::new(ProviderKind::Mock, state).with_progress(progress),
            progress: Some(progress),
            result_urls: Vec::new(),
        })
    }

    pub async fn progress(&self, provider_ref: &str) -> Result<NativeStatus, ProviderError> {
        self.status_queries.fetch_add(1, Ordering::Relaxed);
        let job = self.lookup(provider_ref)?;
        let elapsed = self.clock.now() - job.created_at;
        let (state, progress) = simulate(elapsed, self.duration);
        Ok(NativeStatus::new(ProviderKind::Mock, state).with_progress(progress))
    }

    pub async fn results(&self, provider_ref: &str) -> Result<Vec<String>, ProviderError> {
        let job = self.lookup(provider_ref)?;
        Ok((1..=self.output_count)
            .map(|i| {
                format!(
                    "{}/{}/{}/{}-{}.png",
                    self.asset_base_url, job.template, job.style, provider_ref, i
                )
            })
            .collect())
    }

    pub async fn health(&self) -> ProviderHealth {
        ProviderHealth::healthy(0)
    }

    /// Number of status queries answered so far
    pub fn status_queries(&self) -> u64 {
        self.status_queries.load(Ordering::Relaxed)
    }

    /// Forget a job, as a provider that silently dropped it would
    pub fn drop_job(&self, provider_ref: &str) -> bool {
        self.jobs.remove(provider_ref).is_some()
    }

    fn lookup(&self, provider_ref: &str) -> Result<MockJob, ProviderError> {
        self.jobs
            .get(provider_ref)
            .map(|job| job.clone())
            .ok_or_else(|| ProviderError::NotFound(provider_ref.to_string()))
    }
}

/// Status and progress of a simulated job `elapsed` into a run of `total`.
///
/// The first tenth ramps 0 to 10, the middle eight tenths ramp 10 to 95, the
/// last tenth reports success.
pub fn simulate(elapsed: chrono::Duration, total: chrono::Duration) -> (&'static str, u8) {
    let total_ms = total.num_milliseconds().max(1) as f64;
    let e = elapsed.num_milliseconds().max(0) as f64;

    let warmup = 0.1 * total_ms;
    let finish = 0.9 * total_ms;

    if e < warmup {
        let progress = (100.0 * e / total_ms).floor();
        (STATE_PROCESSING, progress.clamp(0.0, 10.0) as u8)
    } else if e < finish {
        let progress = (10.0 + 80.0 * (e - warmup) / (0.8 * total_ms)).floor();
        (STATE_PROCESSING, progress.min(95.0) as u8)
    } else {
        (STATE_SUCCEEDED, 100)
    }
}

fn slug(tag: &str) -> String {
    tag.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect()
}
