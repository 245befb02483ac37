//! Maps each provider's native status vocabulary onto [`JobStatus`]

use serde::{Deserialize, Serialize};

use crate::backend::fal::STATE_COMPLETED;
use crate::backend::mock::{STATE_PROCESSING, STATE_SUCCEEDED};
use crate::backend::traits::{NativeStatus, ProviderKind};
use crate::error::ProviderError;
use crate::jobs::job::{Job, JobStatus};

/// Canonical answer to a progress query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressReport {
    pub status: JobStatus,
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ProgressReport {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Failed,
            progress: 100,
            message: Some(message.into()),
        }
    }

    pub fn from_job(job: &Job) -> Self {
        Self {
            status: job.status,
            progress: if job.is_terminal() { 100 } else { job.progress },
            message: job.error_message.clone(),
        }
    }
}

/// Normalize a status the provider reported
pub fn normalize(native: &NativeStatus) -> ProgressReport {
    let status = canonical_status(native.provider, &native.state);

    let progress = match status {
        // 100 means "attempt concluded", whatever the outcome
        JobStatus::Succeeded | JobStatus::Failed => 100,
        JobStatus::Queued => 0,
        JobStatus::Processing => native.progress.unwrap_or(0).min(99),
    };

    let message = match status {
        JobStatus::Failed => Some(
            native
                .message
                .clone()
                .unwrap_or_else(|| format!("{} reported {}", native.provider, native.state)),
        ),
        _ => native.message.clone(),
    };

    ProgressReport {
        status,
        progress,
        message,
    }
}

/// Normalize a failed status query. Every failure, "not found" included, is
/// terminal so that a dropped job can never be polled forever.
pub fn normalize_failure(provider: ProviderKind, error: &ProviderError) -> ProgressReport {
    match error {
        ProviderError::NotFound(_) => {
            ProgressReport::failed(format!("{} no longer knows this job", provider))
        }
        ProviderError::Rejected { status, .. } => {
            ProgressReport::failed(format!("{} rejected the status query ({})", provider, status))
        }
        other => ProgressReport::failed(format!("{} status query failed: {}", provider, other)),
    }
}

fn canonical_status(provider: ProviderKind, state: &str) -> JobStatus {
    let state = state.trim();
    match provider {
        ProviderKind::Replicate => match state.to_ascii_lowercase().as_str() {
            "starting" | "queued" => JobStatus::Queued,
            "processing" => JobStatus::Processing,
            "succeeded" => JobStatus::Succeeded,
            "failed" | "canceled" | "cancelled" | "aborted" => JobStatus::Failed,
            _ => JobStatus::Processing,
        },
        // fal answers synchronously; a call that does not complete surfaces
        // as a ProviderError, so COMPLETED is the only state it records
        ProviderKind::Fal => match state {
            STATE_COMPLETED => JobStatus::Succeeded,
            _ => JobStatus::Processing,
        },
        ProviderKind::Mock => match state {
            STATE_SUCCEEDED => JobStatus::Succeeded,
            STATE_PROCESSING => JobStatus::Processing,
            _ => JobStatus::Queued,
        },
    }
}
