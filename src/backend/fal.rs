//! fal.ai synchronous endpoint: one call returns the final images

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

use crate::backend::http::{build_client, decode_json, join_url, probe, require_key};
use crate::backend::retry::RetryPolicy;
use crate::backend::traits::{
    GenerationRequest, NativeStatus, ProviderHealth, ProviderKind, Submission,
};
use crate::config::{ProviderConfig, SecretString};
use crate::error::{AppError, ProviderError};

pub const DEFAULT_BASE_URL: &str = "https://fal.run";

/// Native state reported for a finished synchronous call
pub const STATE_COMPLETED: &str = "COMPLETED";

/// Synchronous image generation backend
pub struct FalBackend {
    client: Client,
    base_url: String,
    api_key: Option<SecretString>,
    models: HashMap<String, String>,
    prompt_template: String,
    default_resolution: u32,
    default_steps: u32,
    health_check_path: String,
    policy: RetryPolicy,
}

#[derive(Debug, Serialize)]
struct FalRequest {
    prompt: String,
    image_url: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    reference_image_urls: Vec<String>,
    image_size: ImageSize,
    num_inference_steps: u32,
    num_images: u32,
}

#[derive(Debug, Serialize)]
struct ImageSize {
    width: u32,
    height: u32,
}

#[derive(Debug, Deserialize)]
struct FalResponse {
    #[serde(default)]
    images: Vec<FalImage>,
}

#[derive(Debug, Deserialize)]
struct FalImage {
    url: String,
}

impl FalBackend {
    pub fn new(config: &ProviderConfig, policy: RetryPolicy) -> Result<Self, AppError> {
        Ok(Self {
            client: build_client(policy.timeout)?,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key: config.api_key.clone(),
            models: config.models.clone(),
            prompt_template: config.prompt_template.clone(),
            default_resolution: config.default_resolution,
            default_steps: config.default_steps,
            health_check_path: config.health_check_path.clone(),
            policy,
        })
    }

    fn endpoint_for(&self, template: &str) -> Result<String, ProviderError> {
        let model = self.models.get(template).ok_or_else(|| {
            ProviderError::Config(format!("no fal model mapped for template '{}'", template))
        })?;
        Ok(join_url(&self.base_url, model))
    }

    fn build_request(&self, request: &GenerationRequest) -> Result<FalRequest, ProviderError> {
        let (first, rest) = request
            .source_images
            .split_first()
            .ok_or_else(|| ProviderError::Rejected {
                status: 400,
                message: "no source image".to_string(),
            })?;
        let resolution = request.resolution.unwrap_or(self.default_resolution);

        Ok(FalRequest {
            prompt: request.compose_prompt(&self.prompt_template),
            image_url: first.clone(),
            reference_image_urls: rest.to_vec(),
            image_size: ImageSize {
                width: resolution,
                height: resolution,
            },
            num_inference_steps: request.steps.unwrap_or(self.default_steps),
            num_images: 1,
        })
    }

    async fn call(&self, url: &str, api_key: &str, body: &FalRequest) -> Result<FalResponse, ProviderError> {
        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Key {}", api_key))
            .json(body)
            .send()
            .await?;
        decode_json(response).await
    }

    pub async fn submit(&self, request: &GenerationRequest) -> Result<Submission, ProviderError> {
        let api_key = require_key(ProviderKind::Fal, &self.api_key)?;
        let url = self.endpoint_for(&request.template)?;
        let body = self.build_request(request)?;

        let response = self
            .policy
            .run(ProviderKind::Fal, "generate", || self.call(&url, &api_key, &body))
            .await?;

        let result_urls: Vec<String> = response.images.into_iter().map(|image| image.url).collect();
        if result_urls.is_empty() {
            return Err(ProviderError::InvalidResponse(
                "fal response contained no images".to_string(),
            ));
        }

        let provider_ref = Uuid::new_v4().simple().to_string();
        debug!(provider_ref = %provider_ref, images = result_urls.len(), "Synchronous generation finished");

        Ok(Submission {
            provider_ref,
            status: NativeStatus::new(ProviderKind::Fal, STATE_COMPLETED).with_progress(100),
            progress: Some(100),
            result_urls,
        })
    }

    /// There is no status endpoint; every accepted call already finished.
    pub async fn progress(&self, provider_ref: &str) -> Result<NativeStatus, ProviderError> {
        Err(ProviderError::NotFound(format!(
            "fal keeps no job state for {}",
            provider_ref
        )))
    }

    pub async fn results(&self, provider_ref: &str) -> Result<Vec<String>, ProviderError> {
        Err(ProviderError::NotFound(format!(
            "fal keeps no results for {}",
            provider_ref
        )))
    }

    pub async fn health(&self) -> ProviderHealth {
        let auth = self
            .api_key
            .as_ref()
            .map(|key| ("Authorization", format!("Key {}", key.expose_secret())));
        probe(
            &self.client,
            ProviderKind::Fal,
            &join_url(&self.base_url, &self.health_check_path),
            auth,
            self.policy.timeout,
        )
        .await
    }
}
