//! Fire-and-forget routing and health telemetry

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::backend::traits::{ProviderHealth, ProviderKind};
use crate::error::Result;

/// Which provider served a request and how
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutingOutcome {
    /// Provider that produced the final result, or the last one tried
    pub chosen_provider: ProviderKind,
    pub attempts: u32,
    pub fallback_used: bool,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Destination for telemetry records. Errors never reach the caller.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn record_routing(&self, outcome: &RoutingOutcome) -> Result<()>;

    async fn record_health(&self, provider: ProviderKind, health: &ProviderHealth) -> Result<()>;
}

/// Writes telemetry as structured log events
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl TelemetrySink for LogSink {
    async fn record_routing(&self, outcome: &RoutingOutcome) -> Result<()> {
        info!(
            target: "telemetry",
            provider = %outcome.chosen_provider,
            attempts = outcome.attempts,
            fallback_used = outcome.fallback_used,
            latency_ms = outcome.latency_ms,
            error = outcome.error.as_deref().unwrap_or(""),
            "routing outcome"
        );
        Ok(())
    }

    async fn record_health(&self, provider: ProviderKind, health: &ProviderHealth) -> Result<()> {
        info!(
            target: "telemetry",
            provider = %provider,
            ok = health.ok,
            latency_ms = health.latency_ms,
            error = health.error.as_deref().unwrap_or(""),
            "provider health"
        );
        Ok(())
    }
}

/// Keeps every record in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    routing: Mutex<Vec<RoutingOutcome>>,
    health: Mutex<Vec<(ProviderKind, ProviderHealth)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn routing_outcomes(&self) -> Vec<RoutingOutcome> {
        self.routing.lock().clone()
    }

    pub fn health_records(&self) -> Vec<(ProviderKind, ProviderHealth)> {
        self.health.lock().clone()
    }
}

#[async_trait]
impl TelemetrySink for MemorySink {
    async fn record_routing(&self, outcome: &RoutingOutcome) -> Result<()> {
        self.routing.lock().push(outcome.clone());
        Ok(())
    }

    async fn record_health(&self, provider: ProviderKind, health: &ProviderHealth) -> Result<()> {
        self.health.lock().push((provider, health.clone()));
        Ok(())
    }
}

/// Hand a routing outcome to the sink on its own task
pub fn emit_routing(sink: &Arc<dyn TelemetrySink>, outcome: RoutingOutcome) {
    let sink = sink.clone();
    tokio::spawn(async move {
        if let Err(e) = sink.record_routing(&outcome).await {
            debug!(error = %e, "Dropped routing telemetry");
        }
    });
}

/// Hand a health probe result to the sink on its own task
pub fn emit_health(sink: &Arc<dyn TelemetrySink>, provider: ProviderKind, health: ProviderHealth) {
    let sink = sink.clone();
    tokio::spawn(async move {
        if let Err(e) = sink.record_health(provider, &health).await {
            debug!(error = %e, "Dropped health telemetry");
        }
    });
}
