//! Periodic provider probes. Results are informational and never gate routing.

use dashmap::DashMap;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::registry::ProviderRegistry;
use crate::backend::traits::{ProviderHealth, ProviderKind};
use crate::telemetry::{emit_health, TelemetrySink};

/// Health monitor for the registered providers
pub struct HealthMonitor {
    registry: Arc<ProviderRegistry>,
    telemetry: Arc<dyn TelemetrySink>,
    providers: Vec<ProviderKind>,
    health_status: Arc<DashMap<ProviderKind, ProviderHealth>>,
    check_task: RwLock<Option<JoinHandle<()>>>,
}

impl HealthMonitor {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        telemetry: Arc<dyn TelemetrySink>,
        providers: Vec<ProviderKind>,
    ) -> Self {
        Self {
            registry,
            telemetry,
            providers,
            health_status: Arc::new(DashMap::new()),
            check_task: RwLock::new(None),
        }
    }

    /// Start the probe background task
    pub async fn start(&self, interval_secs: u64) {
        let registry = self.registry.clone();
        let telemetry = self.telemetry.clone();
        let providers = self.providers.clone();
        let health_status = self.health_status.clone();
        let interval = Duration::from_secs(interval_secs.max(1));

        let handle = tokio::spawn(async move {
            loop {
                probe_all(&registry, &telemetry, &providers, &health_status).await;
                tokio::time::sleep(interval).await;
            }
        });

        if let Some(previous) = self.check_task.write().await.replace(handle) {
            previous.abort();
        }
        info!(interval_secs = interval_secs, "Started provider health checks");
    }

    /// Stop the probe background task
    pub async fn stop(&self) {
        if let Some(handle) = self.check_task.write().await.take() {
            handle.abort();
            info!("Stopped provider health checks");
        }
    }

    /// Probe every provider right away
    pub async fn check_now(&self) -> HashMap<ProviderKind, ProviderHealth> {
        probe_all(&self.registry, &self.telemetry, &self.providers, &self.health_status).await
    }

    /// Last probe result per provider
    pub fn snapshot(&self) -> HashMap<ProviderKind, ProviderHealth> {
        self.health_status
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }

    pub fn get_status(&self, provider: ProviderKind) -> Option<ProviderHealth> {
        self.health_status.get(&provider).map(|s| s.clone())
    }
}

async fn probe_all(
    registry: &ProviderRegistry,
    telemetry: &Arc<dyn TelemetrySink>,
    providers: &[ProviderKind],
    health_status: &DashMap<ProviderKind, ProviderHealth>,
) -> HashMap<ProviderKind, ProviderHealth> {
    let probes = providers.iter().map(|&kind| async move {
        (kind, registry.get(kind).health().await)
    });

    let results = join_all(probes).await;

    for (kind, health) in &results {
        if health.ok {
            debug!(provider = %kind, latency_ms = health.latency_ms, "Provider reachable");
        } else {
            warn!(
                provider = %kind,
                latency_ms = health.latency_ms,
                error = health.error.as_deref().unwrap_or("unknown"),
                "Provider probe failed"
            );
        }
        health_status.insert(*kind, health.clone());
        emit_health(telemetry, *kind, health.clone());
    }

    results.into_iter().collect()
}
