//! Request handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::backend::traits::{GenerationRequest, ProviderHealth, ProviderKind};
use crate::jobs::{Job, JobStatus, ProgressReport};
use crate::AppState;

/// Public view of a job. Result URLs go through the results endpoint only.
#[derive(Debug, Serialize, Deserialize)]
pub struct JobView {
    pub id: String,
    pub provider: ProviderKind,
    pub status: JobStatus,
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl JobView {
    fn new(job: Job, debug: bool) -> Self {
        let message = public_message(job.status, job.error_message, debug);
        Self {
            id: job.id,
            provider: job.provider,
            status: job.status,
            progress: job.progress,
            created_at: job.created_at,
            updated_at: job.updated_at,
            message,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProgressView {
    pub job_id: String,
    #[serde(flatten)]
    pub report: ProgressReport,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResultsQuery {
    #[serde(default)]
    pub paid: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthView {
    pub status: &'static str,
    pub providers: HashMap<ProviderKind, ProviderHealth>,
    pub tracked_jobs: usize,
}

/// Failure detail stays internal unless debug output is on
fn public_message(status: JobStatus, message: Option<String>, debug: bool) -> Option<String> {
    match status {
        JobStatus::Failed if !debug => Some("generation failed".to_string()),
        _ => message,
    }
}

pub async fn create_generation(
    State(state): State<Arc<AppState>>,
    Json(request): Json<GenerationRequest>,
) -> Response {
    let debug = state.settings.debug_errors;
    match state.service.generate(request).await {
        Ok(job) => (StatusCode::ACCEPTED, Json(JobView::new(job, debug))).into_response(),
        Err(e) => e.into_response_with(debug),
    }
}

pub async fn get_job_progress(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Response {
    let debug = state.settings.debug_errors;
    match state.service.get_progress(&job_id).await {
        Ok(mut report) => {
            report.message = public_message(report.status, report.message.take(), debug);
            Json(ProgressView { job_id, report }).into_response()
        }
        Err(e) => e.into_response_with(debug),
    }
}

pub async fn get_job_results(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
    Query(query): Query<ResultsQuery>,
) -> Response {
    match state.service.get_results(&job_id, query.paid).await {
        Ok(results) => Json(results).into_response(),
        Err(e) => e.into_response_with(state.settings.debug_errors),
    }
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthView> {
    Json(HealthView {
        status: "ok",
        providers: state.health.snapshot(),
        tracked_jobs: state.service.worker_stats().active,
    })
}
