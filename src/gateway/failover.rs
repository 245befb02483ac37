//! One-shot failover between the two real providers

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::backend::registry::ProviderRegistry;
use crate::backend::traits::{GenerationRequest, ProviderKind, Submission};
use crate::error::{AppError, ProviderError, Result};
use crate::jobs::job::JobStatus;
use crate::jobs::normalizer::normalize;
use crate::telemetry::{emit_routing, RoutingOutcome, TelemetrySink};

/// A submission some provider accepted
#[derive(Debug, Clone)]
pub struct Accepted {
    pub provider: ProviderKind,
    pub submission: Submission,
    pub outcome: RoutingOutcome,
}

/// Runs the chosen adapter and, once its own retries are spent, the other one
pub struct FailoverOrchestrator {
    registry: Arc<ProviderRegistry>,
    telemetry: Arc<dyn TelemetrySink>,
    failover_enabled: bool,
}

impl FailoverOrchestrator {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        telemetry: Arc<dyn TelemetrySink>,
        failover_enabled: bool,
    ) -> Self {
        Self {
            registry,
            telemetry,
            failover_enabled,
        }
    }

    pub fn failover_enabled(&self) -> bool {
        self.failover_enabled
    }

    /// Submit `request`, starting with `chosen`.
    ///
    /// A routing outcome is emitted whatever happens.
    pub async fn generate(&self, chosen: ProviderKind, request: &GenerationRequest) -> Result<Accepted> {
        let started = Instant::now();

        let primary_error = match self.attempt(chosen, request).await {
            Ok(submission) => {
                let outcome = RoutingOutcome {
                    chosen_provider: chosen,
                    attempts: 1,
                    fallback_used: false,
                    latency_ms: elapsed_ms(started),
                    error: None,
                };
                emit_routing(&self.telemetry, outcome.clone());
                debug!(provider = %chosen, "Primary provider accepted request");
                return Ok(Accepted {
                    provider: chosen,
                    submission,
                    outcome,
                });
            }
            Err(e) => e,
        };

        let Some(fallback) = self.fallback_for(chosen, &primary_error) else {
            emit_routing(
                &self.telemetry,
                RoutingOutcome {
                    chosen_provider: chosen,
                    attempts: 1,
                    fallback_used: false,
                    latency_ms: elapsed_ms(started),
                    error: Some(format!("{}: {}", chosen, primary_error)),
                },
            );
            return Err(AppError::provider(chosen, primary_error));
        };

        warn!(
            primary = %chosen,
            fallback = %fallback,
            error = %primary_error,
            "Primary provider failed, failing over"
        );

        match self.attempt(fallback, request).await {
            Ok(submission) => {
                let outcome = RoutingOutcome {
                    chosen_provider: fallback,
                    attempts: 2,
                    fallback_used: true,
                    latency_ms: elapsed_ms(started),
                    error: None,
                };
                emit_routing(&self.telemetry, outcome.clone());
                Ok(Accepted {
                    provider: fallback,
                    submission,
                    outcome,
                })
            }
            Err(fallback_error) => {
                emit_routing(
                    &self.telemetry,
                    RoutingOutcome {
                        chosen_provider: fallback,
                        attempts: 2,
                        fallback_used: true,
                        latency_ms: elapsed_ms(started),
                        error: Some(format!(
                            "{}: {}; {}: {}",
                            chosen, primary_error, fallback, fallback_error
                        )),
                    },
                );
                Err(AppError::CompositeFailover {
                    primary: chosen,
                    primary_error,
                    fallback,
                    fallback_error,
                })
            }
        }
    }

    /// One adapter call. A submission the provider already reports as failed
    /// counts as a provider failure so it can fail over like any other.
    async fn attempt(
        &self,
        provider: ProviderKind,
        request: &GenerationRequest,
    ) -> std::result::Result<Submission, ProviderError> {
        let submission = self.registry.get(provider).submit(request).await?;
        let report = normalize(&submission.status);
        if report.status == JobStatus::Failed {
            return Err(ProviderError::Failed(report.message.unwrap_or_default()));
        }
        Ok(submission)
    }

    /// Misconfiguration is a deployment defect; it never fails over
    fn fallback_for(&self, chosen: ProviderKind, error: &ProviderError) -> Option<ProviderKind> {
        if !self.failover_enabled || error.is_config() {
            return None;
        }
        chosen.alternate()
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
