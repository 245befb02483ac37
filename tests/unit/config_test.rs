//! Unit tests for configuration loading

use imagegen_router::backend::traits::ProviderKind;
use imagegen_router::config::Settings;
use imagegen_router::gateway::weights::ProviderWeights;
use std::io::Write;
use tempfile::NamedTempFile;
use tokio_test::{assert_err, assert_ok};

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_load_full_file() {
    let file = write_config(
        r#"
debug_errors = true

[server]
port = 9090

[routing]
primary = "fal"
failover_enabled = false

[routing.weights_override]
replicate = 0.25
fal = 0.75

[retry]
timeout_ms = 3000
max_retries = 1

[providers.replicate]
api_key = "r8_test"
base_url = "http://localhost:1234"

[providers.replicate.models]
portrait = "owner/model:abc"

[mock]
duration_secs = 30

[results]
preview_limit = 2
"#,
    );

    let settings = Settings::load_from_path(file.path()).unwrap();

    assert!(settings.debug_errors);
    assert_eq!(settings.server.port, 9090);
    assert_eq!(settings.server.host, "0.0.0.0");
    assert_eq!(settings.routing.primary, Some(ProviderKind::Fal));
    assert!(!settings.routing.failover_enabled);
    assert_eq!(
        settings.routing.weights_override,
        Some(ProviderWeights::new(0.25, 0.75))
    );
    assert_eq!(settings.retry.timeout_ms, 3000);
    assert_eq!(settings.retry.max_retries, 1);
    assert_eq!(settings.retry.initial_backoff_ms, 500);
    assert_eq!(settings.mock.duration_secs, 30);
    assert_eq!(settings.results.preview_limit, 2);
    assert_eq!(
        settings.providers.replicate.models.get("portrait").map(String::as_str),
        Some("owner/model:abc")
    );
    assert_eq!(settings.configured_providers(), vec![ProviderKind::Replicate]);
}

#[test]
fn test_missing_file_uses_defaults() {
    let settings = Settings::load_from_path("does/not/exist.toml").unwrap();

    assert_eq!(settings.server.port, 8080);
    assert_eq!(settings.routing.weights_cache_ttl_secs, 5);
    assert!(settings.routing.failover_enabled);
    assert!(!settings.routing.mock_mode);
    assert_eq!(settings.polling.deadline_secs, 120);
    assert!(settings.configured_providers().is_empty());
}

#[test]
fn test_api_key_is_not_printed() {
    let file = write_config(
        r#"
[providers.fal]
api_key = "super-secret-value"
"#,
    );

    let settings = assert_ok!(Settings::load_from_path(file.path()));
    let printed = format!("{:?}", settings);

    assert!(!printed.contains("super-secret-value"));
    assert!(printed.contains("[REDACTED]"));
}

#[test]
fn test_invalid_values_are_rejected() {
    let zero_timeout = write_config(
        r#"
[retry]
timeout_ms = 0
"#,
    );
    assert_err!(Settings::load_from_path(zero_timeout.path()));

    let negative_weights = write_config(
        r#"
[routing.weights_override]
replicate = -1.0
fal = 1.0
"#,
    );
    assert_err!(Settings::load_from_path(negative_weights.path()));
}

#[test]
fn test_mock_mode_needs_a_polling_window_covering_the_job() {
    let too_short = write_config(
        r#"
[routing]
mock_mode = true

[polling]
deadline_secs = 60

[mock]
duration_secs = 90
"#,
    );
    assert_err!(Settings::load_from_path(too_short.path()));

    let defaults = write_config(
        r#"
[routing]
mock_mode = true
"#,
    );
    let settings = assert_ok!(Settings::load_from_path(defaults.path()));
    assert!(settings.polling.window().as_secs() >= settings.mock.duration_secs);
}

#[test]
fn test_blank_api_key_does_not_count_as_configured() {
    let file = write_config(
        r#"
[providers.replicate]
api_key = ""

[providers.fal]
api_key = "fal-key"
"#,
    );

    let settings = assert_ok!(Settings::load_from_path(file.path()));

    assert_eq!(settings.configured_providers(), vec![ProviderKind::Fal]);
}
