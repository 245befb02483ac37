//! Helpers shared by the HTTP provider adapters

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::backend::traits::{ProviderHealth, ProviderKind};
use crate::config::SecretString;
use crate::error::{AppError, ProviderError};

const MAX_ERROR_BODY: usize = 512;

pub fn build_client(timeout: Duration) -> Result<Client, AppError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))
}

/// Credentials are required before any call goes out
pub fn require_key(provider: ProviderKind, key: &Option<SecretString>) -> Result<String, ProviderError> {
    match key {
        Some(key) if !key.is_empty() => Ok(key.expose_secret().to_string()),
        _ => Err(ProviderError::Config(format!("no API key configured for {}", provider))),
    }
}

/// Turn a response into `T`, mapping failures onto the error taxonomy
pub async fn decode_json<T: DeserializeOwned>(response: Response) -> Result<T, ProviderError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::from_status(status.as_u16(), truncate(body)));
    }

    response
        .json::<T>()
        .await
        .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
}

/// Probe `url` once and time it. Never retried.
pub async fn probe(
    client: &Client,
    provider: ProviderKind,
    url: &str,
    auth_header: Option<(&str, String)>,
    timeout: Duration,
) -> ProviderHealth {
    let started = Instant::now();
    let mut request = client.get(url);
    if let Some((name, value)) = auth_header {
        request = request.header(name, value);
    }

    let outcome = tokio::time::timeout(timeout, request.send()).await;
    let latency_ms = started.elapsed().as_millis() as u64;

    match outcome {
        Ok(Ok(response)) if response.status().is_success() => {
            debug!(provider = %provider, latency_ms = latency_ms, "Health check passed");
            ProviderHealth::healthy(latency_ms)
        }
        Ok(Ok(response)) => {
            ProviderHealth::unhealthy(latency_ms, format!("status {}", response.status()))
        }
        Ok(Err(e)) => ProviderHealth::unhealthy(latency_ms, ProviderError::from(e).to_string()),
        Err(_) => ProviderHealth::unhealthy(latency_ms, format!("timed out after {:?}", timeout)),
    }
}

pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn truncate(mut body: String) -> String {
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
        body.push_str("...");
    }
    body
}
