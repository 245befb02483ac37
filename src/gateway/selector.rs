//! Weighted provider selection

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use tracing::debug;

use crate::backend::traits::ProviderKind;
use crate::config::RoutingConfig;
use crate::gateway::weights::{ProviderWeights, WeightSource};

/// Uniform draws in `[0, 1)`
pub trait RandomSource: Send + Sync {
    fn next_unit(&self) -> f64;
}

/// Thread-local RNG, used in production
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn next_unit(&self) -> f64 {
        rand::thread_rng().gen::<f64>()
    }
}

/// Reproducible RNG for simulations and tests
pub struct SeededRandom {
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl RandomSource for SeededRandom {
    fn next_unit(&self) -> f64 {
        self.rng.lock().gen::<f64>()
    }
}

/// Replays a fixed list of draws, cycling when exhausted
pub struct SequenceRandom {
    values: Vec<f64>,
    next: Mutex<usize>,
}

impl SequenceRandom {
    pub fn new(values: Vec<f64>) -> Self {
        Self {
            values,
            next: Mutex::new(0),
        }
    }
}

impl RandomSource for SequenceRandom {
    fn next_unit(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let mut next = self.next.lock();
        let value = self.values[*next % self.values.len()];
        *next += 1;
        value
    }
}

/// Chooses which provider serves a new request
pub struct ProviderSelector {
    weights: Arc<WeightSource>,
    random: Arc<dyn RandomSource>,
    primary: Option<ProviderKind>,
    mock_mode: bool,
}

impl ProviderSelector {
    pub fn new(
        weights: Arc<WeightSource>,
        random: Arc<dyn RandomSource>,
        primary: Option<ProviderKind>,
        mock_mode: bool,
    ) -> Self {
        Self {
            weights,
            random,
            primary,
            mock_mode,
        }
    }

    pub fn from_config(config: &RoutingConfig, weights: Arc<WeightSource>) -> Self {
        Self::new(weights, Arc::new(ThreadRandom), config.primary, config.mock_mode)
    }

    /// Select a provider for a request
    pub async fn select(&self) -> ProviderKind {
        if self.mock_mode {
            return ProviderKind::Mock;
        }

        let weights = self.weights.current().await;
        let selected = self.select_with(&weights);

        debug!(
            provider = %selected,
            replicate_weight = weights.replicate,
            fal_weight = weights.fal,
            "Selected provider for request"
        );

        selected
    }

    /// Selection against explicit weights.
    ///
    /// An explicit primary wins whenever its normalized weight is nonzero,
    /// whatever the other provider's weight. Otherwise `r < w(replicate)`
    /// picks Replicate and anything else picks Fal.
    pub fn select_with(&self, weights: &ProviderWeights) -> ProviderKind {
        let weights = weights.normalized();

        if let Some(primary) = self.primary {
            if weights.weight(primary) > 0.0 {
                return primary;
            }
        }

        let r = self.random.next_unit();
        if r < weights.replicate {
            ProviderKind::Replicate
        } else {
            ProviderKind::Fal
        }
    }
}
