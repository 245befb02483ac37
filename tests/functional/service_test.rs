//! Functional tests for the generation service: job lifecycle end to end

use chrono::{Duration as ChronoDuration, Utc};
use imagegen_router::backend::clock::{Clock, ManualClock, TokioClock};
use imagegen_router::backend::registry::ProviderRegistry;
use imagegen_router::backend::traits::{GenerationRequest, ProviderKind};
use imagegen_router::config::{SecretString, Settings};
use imagegen_router::error::AppError;
use imagegen_router::gateway::weights::ProviderWeights;
use imagegen_router::jobs::refresh::JobRefresher;
use imagegen_router::jobs::store::{JobStore, Reservation};
use imagegen_router::jobs::worker::{poll_until_settled, PollOutcome, PollingPolicy};
use imagegen_router::jobs::JobStatus;
use imagegen_router::service::GenerationService;
use imagegen_router::telemetry::MemorySink;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Harness {
    registry: Arc<ProviderRegistry>,
    service: GenerationService,
}

fn mock_settings() -> Settings {
    let mut settings = Settings::default();
    settings.routing.mock_mode = true;
    settings.mock.asset_base_url = "https://assets.test".to_string();
    settings
}

fn harness(settings: Settings, clock: Arc<dyn Clock>) -> Harness {
    let registry = Arc::new(ProviderRegistry::from_settings(&settings, clock).unwrap());
    let service = GenerationService::from_settings(
        &settings,
        registry.clone(),
        Arc::new(MemorySink::new()),
        Arc::new(JobStore::new()),
    )
    .unwrap();

    Harness { registry, service }
}

/// Simulated jobs advance with tokio's clock; pair with `start_paused`
fn paused_harness(settings: Settings) -> Harness {
    harness(settings, Arc::new(TokioClock::new()))
}

fn request() -> GenerationRequest {
    GenerationRequest::new("https://img.test/source.png", "watercolor", "portrait")
}

async fn sleep_secs(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
}

#[tokio::test(start_paused = true)]
async fn test_mock_job_lifecycle() {
    let h = paused_harness(mock_settings());

    let job = h.service.generate(request()).await.unwrap();
    assert!(job.id.starts_with("mock_"));
    assert_eq!(job.provider, ProviderKind::Mock);
    assert!(matches!(job.status, JobStatus::Queued | JobStatus::Processing));

    sleep_secs(45).await;
    let midway = h.service.get_progress(&job.id).await.unwrap();
    assert_eq!(midway.status, JobStatus::Processing);
    assert!((10..=90).contains(&midway.progress), "progress {}", midway.progress);

    sleep_secs(50).await;
    let done = h.service.get_progress(&job.id).await.unwrap();
    assert_eq!(done.status, JobStatus::Succeeded);
    assert_eq!(done.progress, 100);
}

#[tokio::test(start_paused = true)]
async fn test_default_polling_outlasts_mock_duration() {
    let mut settings = Settings::default();
    settings.routing.mock_mode = true;
    settings.validate().unwrap();
    let mock_duration = settings.mock.duration_secs;
    let h = paused_harness(settings);

    let job = h.service.generate(request()).await.unwrap();
    sleep_secs(mock_duration + 5).await;

    let stored = h.service.get_job(&job.id).await.unwrap();
    assert_eq!(stored.status, JobStatus::Succeeded);
    assert_eq!(stored.result_urls.len(), 4);

    let stats = h.service.worker_stats();
    assert_eq!(stats.settled, 1);
    assert_eq!(stats.expired, 0);
    assert_eq!(stats.active, 0);
}

#[tokio::test]
async fn test_progress_reads_never_call_the_provider() {
    let h = harness(mock_settings(), Arc::new(ManualClock::new(Utc::now())));
    let job = h.service.generate(request()).await.unwrap();
    let queries = h.registry.mock().status_queries();

    for _ in 0..10 {
        let report = h.service.get_progress(&job.id).await.unwrap();
        assert!(!report.status.is_terminal());
    }
    assert!(matches!(
        h.service.get_results(&job.id, false).await,
        Err(AppError::JobNotReady(_))
    ));
    assert_eq!(h.registry.mock().status_queries(), queries);
}

#[tokio::test(start_paused = true)]
async fn test_terminal_job_makes_no_provider_calls() {
    let h = paused_harness(mock_settings());
    let job = h.service.generate(request()).await.unwrap();

    sleep_secs(95).await;
    let first = h.service.get_progress(&job.id).await.unwrap();
    assert_eq!(first.status, JobStatus::Succeeded);
    let queries = h.registry.mock().status_queries();

    sleep_secs(30).await;
    for _ in 0..10 {
        assert_eq!(h.service.get_progress(&job.id).await.unwrap(), first);
    }
    assert_eq!(h.registry.mock().status_queries(), queries);
}

#[tokio::test(start_paused = true)]
async fn test_lost_job_fails_and_stays_failed() {
    let h = paused_harness(mock_settings());
    let job = h.service.generate(request()).await.unwrap();

    assert!(h.registry.mock().drop_job(&job.provider_ref));
    sleep_secs(5).await;

    let failed = h.service.get_progress(&job.id).await.unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.progress, 100);
    let queries = h.registry.mock().status_queries();

    sleep_secs(30).await;
    let again = h.service.get_progress(&job.id).await.unwrap();
    assert_eq!(again, failed);
    assert_eq!(h.registry.mock().status_queries(), queries);

    assert!(matches!(
        h.service.get_results(&job.id, true).await,
        Err(AppError::JobFailed(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_results_paid_and_unpaid() {
    let h = paused_harness(mock_settings());
    let job = h.service.generate(request()).await.unwrap();

    assert!(matches!(
        h.service.get_results(&job.id, true).await,
        Err(AppError::JobNotReady(_))
    ));

    sleep_secs(95).await;

    let preview = h.service.get_results(&job.id, false).await.unwrap();
    assert_eq!(preview.images.len(), 1);
    assert!(preview.images[0].preview);
    assert!(!preview.paid);

    let full = h.service.get_results(&job.id, true).await.unwrap();
    assert_eq!(full.images.len(), 4);
    assert!(full.images.iter().all(|image| !image.preview));
    assert_eq!(full.images[0].url, preview.images[0].url);
    assert!(full.images[0]
        .url
        .starts_with("https://assets.test/portrait/watercolor/"));
}

#[tokio::test]
async fn test_unknown_job_ids() {
    let h = harness(mock_settings(), Arc::new(ManualClock::default()));

    assert!(matches!(
        h.service.get_progress("xyz_123").await,
        Err(AppError::UnknownJobPrefix(_))
    ));
    assert!(matches!(
        h.service.get_progress("mock_never-issued").await,
        Err(AppError::JobNotFound(_))
    ));
}

#[tokio::test]
async fn test_submission_key_deduplicates() {
    let h = harness(mock_settings(), Arc::new(ManualClock::default()));

    let first = h
        .service
        .generate(request().with_submission_key("order-42"))
        .await
        .unwrap();
    let second = h
        .service
        .generate(request().with_submission_key("order-42"))
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(h.service.store().len(), 1);
}

#[tokio::test]
async fn test_submission_in_flight_is_refused() {
    let h = harness(mock_settings(), Arc::new(ManualClock::default()));

    let reservation = h.service.store().begin_submission("order-7").unwrap();
    assert!(matches!(reservation, Reservation::Fresh(_)));

    let result = h
        .service
        .generate(request().with_submission_key("order-7"))
        .await;
    assert!(matches!(result, Err(AppError::SubmissionInFlight(_))));

    drop(reservation);
    assert!(h
        .service
        .generate(request().with_submission_key("order-7"))
        .await
        .is_ok());
}

#[tokio::test]
async fn test_invalid_request_is_rejected() {
    let h = harness(mock_settings(), Arc::new(ManualClock::default()));
    let mut bad = request();
    bad.source_images.clear();

    assert!(matches!(
        h.service.generate(bad).await,
        Err(AppError::InvalidRequest(_))
    ));
    assert!(h.service.store().is_empty());
}

#[tokio::test]
async fn test_polling_is_bounded() {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let h = harness(mock_settings(), clock.clone());
    let job = h.service.generate(request()).await.unwrap();
    let queries_before = h.registry.mock().status_queries();

    let refresher = JobRefresher::new(h.registry.clone(), h.service.store().clone());
    let policy = PollingPolicy {
        interval: Duration::from_millis(5),
        max_attempts: 3,
        deadline: Duration::from_secs(5),
    };

    // The clock never moves, so the job never finishes on its own
    let outcome = poll_until_settled(&refresher, &job.id, policy).await;

    match outcome {
        PollOutcome::Expired(expired) => {
            assert_eq!(expired.status, JobStatus::Failed);
            assert!(expired.error_message.is_some());
        }
        other => panic!("expected expiry, got {:?}", other),
    }
    assert_eq!(h.registry.mock().status_queries() - queries_before, 3);

    // Expiry is terminal even once the provider would report success
    clock.advance(ChronoDuration::seconds(90));
    let report = h.service.get_progress(&job.id).await.unwrap();
    assert_eq!(report.status, JobStatus::Failed);
}

fn replicate_settings(base_url: &str) -> Settings {
    let mut settings = Settings::default();
    settings.routing.weights_override = Some(ProviderWeights::new(1.0, 0.0));
    settings.routing.failover_enabled = false;
    settings.providers.replicate.api_key = Some(SecretString::new("r8_test"));
    settings.providers.replicate.base_url = Some(base_url.to_string());
    settings
        .providers
        .replicate
        .models
        .insert("portrait".to_string(), "owner/model:abc123".to_string());
    settings
}

#[tokio::test]
async fn test_hanging_provider_does_not_delay_reads() {
    let replicate = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/predictions"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "pred-slow",
            "status": "starting"
        })))
        .expect(1)
        .mount(&replicate)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/predictions/pred-slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "id": "pred-slow", "status": "processing" }))
                .set_delay(Duration::from_secs(30)),
        )
        .mount(&replicate)
        .await;

    let h = harness(replicate_settings(&replicate.uri()), Arc::new(ManualClock::default()));
    let job = h.service.generate(request()).await.unwrap();
    assert!(job.id.starts_with("rep_"));

    let report = tokio::time::timeout(Duration::from_secs(1), h.service.get_progress(&job.id))
        .await
        .expect("progress read waited on the provider")
        .unwrap();
    assert_eq!(report.status, JobStatus::Queued);

    let results = tokio::time::timeout(Duration::from_secs(1), h.service.get_results(&job.id, true))
        .await
        .expect("results read waited on the provider");
    assert!(matches!(results, Err(AppError::JobNotReady(_))));
}

#[tokio::test]
async fn test_synchronous_provider_job_is_answered_from_store() {
    let fal = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/fal-ai/flux/dev"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "images": [{ "url": "https://fal.test/a.png" }, { "url": "https://fal.test/b.png" }]
        })))
        .expect(1)
        .mount(&fal)
        .await;

    let mut settings = Settings::default();
    settings.routing.weights_override = Some(ProviderWeights::new(0.0, 1.0));
    settings.providers.fal.api_key = Some(SecretString::new("test-key"));
    settings.providers.fal.base_url = Some(fal.uri());
    settings
        .providers
        .fal
        .models
        .insert("portrait".to_string(), "fal-ai/flux/dev".to_string());
    let h = harness(settings, Arc::new(ManualClock::default()));

    let job = h.service.generate(request()).await.unwrap();
    assert!(job.id.starts_with("fal_"));
    assert_eq!(job.status, JobStatus::Succeeded);

    let report = h.service.get_progress(&job.id).await.unwrap();
    assert_eq!(report.status, JobStatus::Succeeded);
    assert_eq!(report.progress, 100);

    let results = h.service.get_results(&job.id, true).await.unwrap();
    assert_eq!(results.images.len(), 2);
}
