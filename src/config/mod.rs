//! Configuration loading

pub mod settings;

pub use settings::{
    HealthConfig, LoggingConfig, MockConfig, PollingConfig, ProviderConfig, ProvidersConfig,
    ResultsConfig, RetryConfig, RoutingConfig, SecretString, ServerConfig, Settings, WorkerConfig,
};
