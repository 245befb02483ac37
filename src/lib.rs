//! Image Generation Router
//!
//! Routes image generation requests across interchangeable third-party
//! providers, with weighted selection, bounded retry, single failover and a
//! write-once job store behind a normalized progress contract.

pub mod api;
pub mod backend;
pub mod config;
pub mod error;
pub mod gateway;
pub mod jobs;
pub mod service;
pub mod telemetry;

pub use error::{AppError, Result};

use std::sync::Arc;

use backend::{clock::Clock, registry::ProviderRegistry, traits::ProviderKind};
use gateway::health_check::HealthMonitor;
use jobs::store::JobStore;
use service::GenerationService;
use telemetry::TelemetrySink;

/// Application state shared across all handlers
pub struct AppState {
    pub settings: Arc<config::Settings>,
    pub service: Arc<GenerationService>,
    pub health: Arc<HealthMonitor>,
}

impl AppState {
    /// Wire registry, store, service and health monitor from settings.
    /// Must run inside a tokio runtime; the refresh worker is spawned here.
    pub fn build(
        settings: config::Settings,
        telemetry: Arc<dyn TelemetrySink>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let registry = Arc::new(ProviderRegistry::from_settings(&settings, clock)?);
        Self::with_registry(settings, registry, telemetry, Arc::new(JobStore::new()))
    }

    /// Same as [`AppState::build`] with an explicit registry and store
    pub fn with_registry(
        settings: config::Settings,
        registry: Arc<ProviderRegistry>,
        telemetry: Arc<dyn TelemetrySink>,
        store: Arc<JobStore>,
    ) -> Result<Self> {
        let service = GenerationService::from_settings(&settings, registry.clone(), telemetry.clone(), store)?;

        let mut probed = settings.configured_providers();
        if settings.routing.mock_mode {
            probed.push(ProviderKind::Mock);
        }
        let health = HealthMonitor::new(registry, telemetry, probed);

        Ok(Self {
            settings: Arc::new(settings),
            service: Arc::new(service),
            health: Arc::new(health),
        })
    }
}
