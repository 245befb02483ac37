//! Provider weights and where they come from

use parking_lot::RwLock;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::backend::traits::ProviderKind;
use crate::config::RoutingConfig;
use crate::error::{AppError, Result};

const REMOTE_FETCH_TIMEOUT: Duration = Duration::from_secs(2);

/// Relative share of traffic per real provider. Need not sum to one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProviderWeights {
    #[serde(default, alias = "providerA")]
    pub replicate: f64,
    #[serde(default, alias = "providerB")]
    pub fal: f64,
}

impl ProviderWeights {
    /// Compiled default: everything to the primary
    pub const DEFAULT: ProviderWeights = ProviderWeights {
        replicate: 1.0,
        fal: 0.0,
    };

    pub fn new(replicate: f64, fal: f64) -> Self {
        Self { replicate, fal }
    }

    pub fn is_valid(&self) -> bool {
        [self.replicate, self.fal]
            .iter()
            .all(|w| w.is_finite() && *w >= 0.0)
    }

    /// Scale to sum 1, or the compiled default when that is impossible
    pub fn normalized(&self) -> ProviderWeights {
        if !self.is_valid() {
            return Self::DEFAULT;
        }
        let total = self.replicate + self.fal;
        if total <= 0.0 {
            return Self::DEFAULT;
        }
        Self {
            replicate: self.replicate / total,
            fal: self.fal / total,
        }
    }

    pub fn weight(&self, kind: ProviderKind) -> f64 {
        match kind {
            ProviderKind::Replicate => self.replicate,
            ProviderKind::Fal => self.fal,
            ProviderKind::Mock => 0.0,
        }
    }
}

impl Default for ProviderWeights {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[derive(Debug, Clone, Copy)]
struct CachedWeights {
    fetched_at: Instant,
    /// `None` records a failed fetch so it is not repeated until expiry
    weights: Option<ProviderWeights>,
}

/// Resolves weights: override, then remote JSON (TTL cached), then default
pub struct WeightSource {
    override_weights: Option<ProviderWeights>,
    remote_url: Option<String>,
    ttl: Duration,
    client: Client,
    cache: RwLock<Option<CachedWeights>>,
}

impl WeightSource {
    pub fn new(config: &RoutingConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(REMOTE_FETCH_TIMEOUT)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            override_weights: config.weights_override,
            remote_url: config.remote_weights_url.clone(),
            ttl: Duration::from_secs(config.weights_cache_ttl_secs),
            client,
            cache: RwLock::new(None),
        })
    }

    /// Fixed weights, no remote lookups
    pub fn fixed(weights: ProviderWeights) -> Self {
        Self {
            override_weights: Some(weights),
            remote_url: None,
            ttl: Duration::ZERO,
            client: Client::new(),
            cache: RwLock::new(None),
        }
    }

    /// Current weights, already normalized
    pub async fn current(&self) -> ProviderWeights {
        if let Some(weights) = self.override_weights {
            return weights.normalized();
        }

        let Some(url) = self.remote_url.as_deref() else {
            return ProviderWeights::DEFAULT;
        };

        let cached = *self.cache.read();
        if let Some(cached) = cached {
            if cached.fetched_at.elapsed() < self.ttl {
                return cached.weights.unwrap_or_default().normalized();
            }
        }

        // Concurrent refreshes may race; the last write wins
        let fetched = match self.fetch(url).await {
            Ok(weights) => {
                debug!(replicate = weights.replicate, fal = weights.fal, "Fetched remote provider weights");
                Some(weights)
            }
            Err(e) => {
                warn!(error = %e, "Remote provider weights unavailable, using default");
                None
            }
        };

        *self.cache.write() = Some(CachedWeights {
            fetched_at: Instant::now(),
            weights: fetched,
        });

        fetched.unwrap_or_default().normalized()
    }

    async fn fetch(&self, url: &str) -> Result<ProviderWeights> {
        let weights: ProviderWeights = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if !weights.is_valid() {
            return Err(AppError::InvalidRequest(
                "remote provider weights must be finite and non-negative".to_string(),
            ));
        }
        Ok(weights)
    }
}
