//! Common types shared by every generation provider adapter

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::AppError;

/// The closed set of providers a job can be routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Polling backend, the compiled-default primary
    Replicate,
    /// Synchronous backend
    Fal,
    /// Simulated backend with no network calls
    Mock,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [Self::Replicate, Self::Fal, Self::Mock];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Replicate => "replicate",
            Self::Fal => "fal",
            Self::Mock => "mock",
        }
    }

    /// Namespace prefix carried by every job id this provider owns
    pub fn job_prefix(&self) -> &'static str {
        match self {
            Self::Replicate => "rep_",
            Self::Fal => "fal_",
            Self::Mock => "mock_",
        }
    }

    /// The provider a failed request moves to, if any
    pub fn alternate(&self) -> Option<ProviderKind> {
        match self {
            Self::Replicate => Some(Self::Fal),
            Self::Fal => Some(Self::Replicate),
            Self::Mock => None,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request to generate images from reference photos
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// URLs of the source images the output is derived from
    pub source_images: Vec<String>,

    /// Visual style tag, e.g. "watercolor"
    pub style: String,

    /// Template tag; selects the provider model
    pub template: String,

    /// Square output edge in pixels
    #[serde(default)]
    pub resolution: Option<u32>,

    /// Number of inference steps
    #[serde(default)]
    pub steps: Option<u32>,

    /// Caller-side idempotency key, e.g. an order id
    #[serde(default)]
    pub submission_key: Option<String>,
}

impl GenerationRequest {
    pub fn new(source_image: impl Into<String>, style: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            source_images: vec![source_image.into()],
            style: style.into(),
            template: template.into(),
            resolution: None,
            steps: None,
            submission_key: None,
        }
    }

    pub fn with_submission_key(mut self, key: impl Into<String>) -> Self {
        self.submission_key = Some(key.into());
        self
    }

    pub fn validate(&self) -> crate::error::Result<()> {
        if self.source_images.is_empty() {
            return Err(AppError::InvalidRequest(
                "at least one source image is required".to_string(),
            ));
        }
        if self.style.trim().is_empty() || self.template.trim().is_empty() {
            return Err(AppError::InvalidRequest(
                "style and template must not be empty".to_string(),
            ));
        }
        if matches!(self.resolution, Some(0)) || matches!(self.steps, Some(0)) {
            return Err(AppError::InvalidRequest(
                "resolution and steps must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Fill `{style}` and `{template}` placeholders
    pub fn compose_prompt(&self, template: &str) -> String {
        template
            .replace("{style}", self.style.trim())
            .replace("{template}", self.template.trim())
    }
}

/// What an adapter reports right after accepting a request
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    /// Provider-native job reference
    pub provider_ref: String,
    pub status: NativeStatus,
    pub progress: Option<u8>,
    /// Final artifacts, present when the provider answered synchronously
    pub result_urls: Vec<String>,
}

/// A provider's own status vocabulary, before normalization
#[derive(Debug, Clone, PartialEq)]
pub struct NativeStatus {
    pub provider: ProviderKind,
    pub state: String,
    pub progress: Option<u8>,
    pub message: Option<String>,
}

impl NativeStatus {
    pub fn new(provider: ProviderKind, state: impl Into<String>) -> Self {
        Self {
            provider,
            state: state.into(),
            progress: None,
            message: None,
        }
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress.min(100));
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Output of a lightweight connectivity probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderHealth {
    pub ok: bool,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProviderHealth {
    pub fn healthy(latency_ms: u64) -> Self {
        Self {
            ok: true,
            latency_ms,
            error: None,
        }
    }

    pub fn unhealthy(latency_ms: u64, error: impl Into<String>) -> Self {
        Self {
            ok: false,
            latency_ms,
            error: Some(error.into()),
        }
    }
}
