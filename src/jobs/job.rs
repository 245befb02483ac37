//! Job records and the id scheme

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backend::traits::ProviderKind;
use crate::error::{AppError, Result};
use crate::jobs::normalizer::ProgressReport;

/// Canonical lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Lifecycle record for one generation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// `<provider prefix><provider_ref>`
    pub id: String,
    pub provider: ProviderKind,
    pub provider_ref: String,
    pub status: JobStatus,
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default)]
    pub result_urls: Vec<String>,
}

impl Job {
    /// A freshly accepted job: queued, no progress
    pub fn new(provider: ProviderKind, provider_ref: impl Into<String>, now: DateTime<Utc>) -> Self {
        let provider_ref = provider_ref.into();
        Self {
            id: job_id(provider, &provider_ref),
            provider,
            provider_ref,
            status: JobStatus::Queued,
            progress: 0,
            created_at: now,
            updated_at: now,
            error_message: None,
            result_urls: Vec::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Fold a status report into the record.
    ///
    /// Returns `false` and leaves the record untouched once it is terminal.
    /// Non-terminal progress never moves backwards.
    pub fn apply(&mut self, report: &ProgressReport, result_urls: Vec<String>, now: DateTime<Utc>) -> bool {
        if self.is_terminal() {
            return false;
        }

        match report.status {
            JobStatus::Succeeded => {
                self.status = JobStatus::Succeeded;
                self.progress = 100;
                self.result_urls = result_urls;
                self.error_message = None;
            }
            JobStatus::Failed => {
                self.status = JobStatus::Failed;
                self.progress = 100;
                self.error_message = Some(
                    report
                        .message
                        .clone()
                        .unwrap_or_else(|| "generation failed".to_string()),
                );
            }
            JobStatus::Processing => {
                self.status = JobStatus::Processing;
                self.progress = self.progress.max(report.progress.min(99));
            }
            JobStatus::Queued => {
                // Never demote a job that already started
                self.progress = self.progress.max(report.progress.min(99));
            }
        }

        self.updated_at = now;
        true
    }
}

/// Build the id for a provider-native reference
pub fn job_id(provider: ProviderKind, provider_ref: &str) -> String {
    format!("{}{}", provider.job_prefix(), provider_ref)
}

/// Split a job id into its provider and native reference, by prefix only
pub fn parse_job_id(id: &str) -> Result<(ProviderKind, &str)> {
    for kind in ProviderKind::ALL {
        if let Some(provider_ref) = id.strip_prefix(kind.job_prefix()) {
            if provider_ref.is_empty() {
                break;
            }
            return Ok((kind, provider_ref));
        }
    }
    Err(AppError::UnknownJobPrefix(id.to_string()))
}
