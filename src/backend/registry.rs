//! The fixed set of provider adapters and dispatch over them

use std::sync::Arc;
use tracing::info;

use crate::backend::clock::Clock;
use crate::backend::fal::FalBackend;
use crate::backend::mock::MockBackend;
use crate::backend::replicate::ReplicateBackend;
use crate::backend::retry::RetryPolicy;
use crate::backend::traits::{
    GenerationRequest, NativeStatus, ProviderHealth, ProviderKind, Submission,
};
use crate::config::Settings;
use crate::error::{ProviderError, Result};

/// One adapter per provider; dispatch is an exhaustive match
pub enum ProviderAdapter {
    Replicate(ReplicateBackend),
    Fal(FalBackend),
    Mock(Arc<MockBackend>),
}

impl ProviderAdapter {
    pub fn kind(&self) -> ProviderKind {
        match self {
            Self::Replicate(_) => ProviderKind::Replicate,
            Self::Fal(_) => ProviderKind::Fal,
            Self::Mock(_) => ProviderKind::Mock,
        }
    }

    /// Translate and send a request; returns once the provider accepted it
    pub async fn submit(&self, request: &GenerationRequest) -> std::result::Result<Submission, ProviderError> {
        match self {
            Self::Replicate(backend) => backend.submit(request).await,
            Self::Fal(backend) => backend.submit(request).await,
            Self::Mock(backend) => backend.submit(request).await,
        }
    }

    pub async fn progress(&self, provider_ref: &str) -> std::result::Result<NativeStatus, ProviderError> {
        match self {
            Self::Replicate(backend) => backend.progress(provider_ref).await,
            Self::Fal(backend) => backend.progress(provider_ref).await,
            Self::Mock(backend) => backend.progress(provider_ref).await,
        }
    }

    pub async fn results(&self, provider_ref: &str) -> std::result::Result<Vec<String>, ProviderError> {
        match self {
            Self::Replicate(backend) => backend.results(provider_ref).await,
            Self::Fal(backend) => backend.results(provider_ref).await,
            Self::Mock(backend) => backend.results(provider_ref).await,
        }
    }

    pub async fn health(&self) -> ProviderHealth {
        match self {
            Self::Replicate(backend) => backend.health().await,
            Self::Fal(backend) => backend.health().await,
            Self::Mock(backend) => backend.health().await,
        }
    }
}

/// Registry holding exactly one adapter per [`ProviderKind`]
pub struct ProviderRegistry {
    replicate: ProviderAdapter,
    fal: ProviderAdapter,
    mock: ProviderAdapter,
    mock_backend: Arc<MockBackend>,
}

impl ProviderRegistry {
    pub fn new(replicate: ReplicateBackend, fal: FalBackend, mock: Arc<MockBackend>) -> Self {
        Self {
            replicate: ProviderAdapter::Replicate(replicate),
            fal: ProviderAdapter::Fal(fal),
            mock: ProviderAdapter::Mock(mock.clone()),
            mock_backend: mock,
        }
    }

    /// Build every adapter from configuration
    pub fn from_settings(settings: &Settings, clock: Arc<dyn Clock>) -> Result<Self> {
        let policy = RetryPolicy::from_config(&settings.retry);
        let replicate = ReplicateBackend::new(&settings.providers.replicate, policy)?;
        let fal = FalBackend::new(&settings.providers.fal, policy)?;
        let mock = Arc::new(MockBackend::new(&settings.mock, clock));

        info!(
            configured = ?settings.configured_providers(),
            "Registered generation providers"
        );

        Ok(Self::new(replicate, fal, mock))
    }

    pub fn get(&self, kind: ProviderKind) -> &ProviderAdapter {
        match kind {
            ProviderKind::Replicate => &self.replicate,
            ProviderKind::Fal => &self.fal,
            ProviderKind::Mock => &self.mock,
        }
    }

    /// Direct handle on the simulated provider
    pub fn mock(&self) -> &Arc<MockBackend> {
        &self.mock_backend
    }
}
