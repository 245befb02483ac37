//! Replicate predictions API: submit once, then poll for status

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

use crate::backend::http::{build_client, decode_json, join_url, probe, require_key};
use crate::backend::retry::RetryPolicy;
use crate::backend::traits::{
    GenerationRequest, NativeStatus, ProviderHealth, ProviderKind, Submission,
};
use crate::config::{ProviderConfig, SecretString};
use crate::error::{AppError, ProviderError};

pub const DEFAULT_BASE_URL: &str = "https://api.replicate.com";

/// Polling image generation backend
pub struct ReplicateBackend {
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
struct PredictionRequest {
    version: String,
    input: PredictionInput,
}

#[derive(Debug, Serialize)]
struct PredictionInput {
    prompt: String,
    image: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    reference_images: Vec<String>,
    width: u32,
    height: u32,
    num_inference_steps: u32,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    id: String,
    status: String,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    logs: Option<String>,
}

impl ReplicateBackend {
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

    fn model_for(&self, template: &str) -> Result<&str, ProviderError> {
        self.models
            .get(template)
            .map(String::as_str)
            .ok_or_else(|| {
                ProviderError::Config(format!("no replicate model mapped for template '{}'", template))
            })
    }

    fn build_prediction(&self, request: &GenerationRequest) -> Result<PredictionRequest, ProviderError> {
        let version = self.model_for(&request.template)?;
        let resolution = request.resolution.unwrap_or(self.default_resolution);
        let (first, rest) = request
            .source_images
            .split_first()
            .ok_or_else(|| ProviderError::Rejected {
                status: 400,
                message: "no source image".to_string(),
            })?;

        // Accept both "owner/model:version" and bare version ids
        let version = version.rsplit(':').next().unwrap_or(version).to_string();

        Ok(PredictionRequest {
            version,
            input: PredictionInput {
                prompt: request.compose_prompt(&self.prompt_template),
                image: first.clone(),
                reference_images: rest.to_vec(),
                width: resolution,
                height: resolution,
                num_inference_steps: request.steps.unwrap_or(self.default_steps),
            },
        })
    }

    async fn create_prediction(&self, api_key: &str, body: &PredictionRequest) -> Result<Prediction, ProviderError> {
        let response = self
            .client
            .post(join_url(&self.base_url, "/v1/predictions"))
            .bearer_auth(api_key)
            .json(body)
            .send()
            .await?;
        decode_json(response).await
    }

    async fn fetch_prediction(&self, api_key: &str, id: &str) -> Result<Prediction, ProviderError> {
        let response = self
            .client
            .get(join_url(&self.base_url, &format!("/v1/predictions/{}", id)))
            .bearer_auth(api_key)
            .send()
            .await?;
        decode_json(response).await
    }

    pub async fn submit(&self, request: &GenerationRequest) -> Result<Submission, ProviderError> {
        let api_key = require_key(ProviderKind::Replicate, &self.api_key)?;
        let body = self.build_prediction(request)?;

        let prediction = self
            .policy
            .run(ProviderKind::Replicate, "submit", || {
                self.create_prediction(&api_key, &body)
            })
            .await?;

        debug!(prediction_id = %prediction.id, status = %prediction.status, "Prediction created");

        let result_urls = if prediction.status == "succeeded" {
            output_urls(prediction.output.as_ref())?
        } else {
            Vec::new()
        };
        let status = native_status(&prediction);

        Ok(Submission {
            provider_ref: prediction.id,
            progress: status.progress,
            status,
            result_urls,
        })
    }

    pub async fn progress(&self, provider_ref: &str) -> Result<NativeStatus, ProviderError> {
        let api_key = require_key(ProviderKind::Replicate, &self.api_key)?;
        let prediction = self
            .policy
            .run(ProviderKind::Replicate, "status", || {
                self.fetch_prediction(&api_key, provider_ref)
            })
            .await?;
        Ok(native_status(&prediction))
    }

    pub async fn results(&self, provider_ref: &str) -> Result<Vec<String>, ProviderError> {
        let api_key = require_key(ProviderKind::Replicate, &self.api_key)?;
        let prediction = self
            .policy
            .run(ProviderKind::Replicate, "results", || {
                self.fetch_prediction(&api_key, provider_ref)
            })
            .await?;

        if prediction.status != "succeeded" {
            return Err(ProviderError::InvalidResponse(format!(
                "prediction {} is {}, not succeeded",
                provider_ref, prediction.status
            )));
        }
        output_urls(prediction.output.as_ref())
    }

    pub async fn health(&self) -> ProviderHealth {
        let auth = self
            .api_key
            .as_ref()
            .map(|key| ("Authorization", format!("Bearer {}", key.expose_secret())));
        probe(
            &self.client,
            ProviderKind::Replicate,
            &join_url(&self.base_url, &self.health_check_path),
            auth,
            self.policy.timeout,
        )
        .await
    }
}

fn native_status(prediction: &Prediction) -> NativeStatus {
    let mut status = NativeStatus::new(ProviderKind::Replicate, prediction.status.clone());
    if let Some(progress) = prediction.logs.as_deref().and_then(parse_log_progress) {
        status = status.with_progress(progress);
    }
    match &prediction.error {
        Some(Value::String(message)) => status.with_message(message.clone()),
        Some(Value::Null) | None => status,
        Some(other) => status.with_message(other.to_string()),
    }
}

fn output_urls(output: Option<&Value>) -> Result<Vec<String>, ProviderError> {
    match output {
        Some(Value::String(url)) => Ok(vec![url.clone()]),
        Some(Value::Array(items)) => {
            let urls: Vec<String> = items
                .iter()
                .filter_map(|item| item.as_str().map(String::from))
                .collect();
            if urls.is_empty() {
                Err(ProviderError::InvalidResponse("prediction output has no URLs".to_string()))
            } else {
                Ok(urls)
            }
        }
        _ => Err(ProviderError::InvalidResponse("prediction output missing".to_string())),
    }
}

/// Last `NN%` figure printed in the prediction logs
pub fn parse_log_progress(logs: &str) -> Option<u8> {
    for line in logs.lines().rev() {
        let bytes = line.as_bytes();
        let mut found = None;
        for (i, &b) in bytes.iter().enumerate() {
            if b != b'%' {
                continue;
            }
            let mut start = i;
            while start > 0 && bytes[start - 1].is_ascii_digit() {
                start -= 1;
            }
            if start < i {
                if let Ok(value) = line[start..i].parse::<u32>() {
                    if value <= 100 {
                        found = Some(value as u8);
                    }
                }
            }
        }
        if found.is_some() {
            return found;
        }
    }
    None
}
