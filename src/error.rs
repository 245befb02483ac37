//! Common error types for the generation router

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use crate::backend::traits::ProviderKind;

/// Failure reported by a single provider adapter call
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// Missing credentials or an unknown template mapping. Never retried.
    #[error("provider misconfigured: {0}")]
    Config(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("rate limited by provider")]
    RateLimited,

    #[error("network error: {0}")]
    Network(String),

    /// A 4xx rejection that is not a credential problem
    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("job not found: {0}")]
    NotFound(String),

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    /// The provider accepted the call but reported the job as already failed
    #[error("job failed at submission: {0}")]
    Failed(String),

    /// The adapter's retry budget was exhausted on transient failures
    #[error("{provider} unavailable after {attempts} attempt(s): {last}")]
    Unavailable {
        provider: ProviderKind,
        attempts: u32,
        last: Box<ProviderError>,
    },
}

impl ProviderError {
    /// Whether the failure may go away on its own and is worth retrying
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::Server { .. } | Self::RateLimited | Self::Network(_)
        )
    }

    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Map a non-success HTTP status to the error taxonomy
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => Self::Config(format!("provider rejected credentials ({})", status)),
            404 => Self::NotFound(body),
            408 | 504 => Self::Server {
                status,
                message: body,
            },
            429 => Self::RateLimited,
            500..=599 => Self::Server {
                status,
                message: body,
            },
            _ => Self::Rejected {
                status,
                message: body,
            },
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            return Self::InvalidResponse(e.to_string());
        }
        if let Some(status) = e.status() {
            return Self::from_status(status.as_u16(), e.to_string());
        }
        // Strip the URL so query strings never reach logs or responses
        Self::Network(e.without_url().to_string())
    }
}

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("{provider} failed: {source}")]
    Provider {
        provider: ProviderKind,
        #[source]
        source: ProviderError,
    },

    #[error("both providers failed: {primary}: {primary_error}; {fallback}: {fallback_error}")]
    CompositeFailover {
        primary: ProviderKind,
        primary_error: ProviderError,
        fallback: ProviderKind,
        fallback_error: ProviderError,
    },

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Unrecognised job id prefix: {0}")]
    UnknownJobPrefix(String),

    #[error("Job {0} has no results yet")]
    JobNotReady(String),

    #[error("Job {0} failed and has no results")]
    JobFailed(String),

    #[error("A submission is already in flight for key {0}")]
    SubmissionInFlight(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn provider(provider: ProviderKind, source: ProviderError) -> Self {
        Self::Provider { provider, source }
    }

    /// True for errors that come out of a generation attempt
    pub fn is_generation_failure(&self) -> bool {
        matches!(
            self,
            AppError::Provider { .. } | AppError::CompositeFailover { .. } | AppError::HttpClient(_)
        )
    }

    fn classify(&self) -> (StatusCode, &'static str, Option<&'static str>) {
        match self {
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "server_error", None),
            AppError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "server_error", None),
            AppError::Json(_) => (StatusCode::BAD_REQUEST, "invalid_request_error", Some("invalid_json")),
            AppError::HttpClient(_) => (StatusCode::BAD_GATEWAY, "backend_error", None),
            AppError::Provider { source, .. } if source.is_config() => {
                (StatusCode::INTERNAL_SERVER_ERROR, "server_error", Some("provider_misconfigured"))
            }
            AppError::Provider { .. } => (StatusCode::BAD_GATEWAY, "backend_error", Some("generation_failed")),
            AppError::CompositeFailover { .. } => {
                (StatusCode::BAD_GATEWAY, "backend_error", Some("generation_failed"))
            }
            AppError::JobNotFound(_) => (StatusCode::NOT_FOUND, "not_found_error", Some("job_not_found")),
            AppError::UnknownJobPrefix(_) => (StatusCode::NOT_FOUND, "not_found_error", Some("job_not_found")),
            AppError::JobNotReady(_) => (StatusCode::CONFLICT, "invalid_request_error", Some("job_not_ready")),
            AppError::JobFailed(_) => (StatusCode::CONFLICT, "invalid_request_error", Some("job_failed")),
            AppError::SubmissionInFlight(_) => {
                (StatusCode::CONFLICT, "invalid_request_error", Some("submission_in_flight"))
            }
            AppError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request_error", None),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "server_error", None),
        }
    }

    /// Build the HTTP response, hiding provider detail unless `expose_details`
    pub fn into_response_with(self, expose_details: bool) -> Response {
        let (status, error_type, code) = self.classify();
        let message = if self.is_generation_failure() && !expose_details {
            "generation failed".to_string()
        } else {
            self.to_string()
        };

        let body = Json(ErrorResponse {
            error: ErrorDetail {
                message,
                r#type: error_type.to_string(),
                code: code.map(|c| c.to_string()),
            },
        });

        (status, body).into_response()
    }
}

/// Error response format (OpenAI compatible)
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub message: String,
    pub r#type: String,
    pub code: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.into_response_with(false)
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;
