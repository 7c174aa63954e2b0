//! Integration tests for collection
//!
//! These tests use wiremock to serve images and exercise admission, the
//! retry loop, failure classification and deduplication over real HTTP.

use image_ledger::collect::{ChannelSink, CollectEvent, Collector};
use image_ledger::config::{Config, UserAgentConfig};
use image_ledger::fetch::{
    build_http_client, AdmissionController, Candidate, ErrorKind, FetchScheduler, HttpRetriever,
    Outcome, RetryPolicy,
};
use image_ledger::hash::digest;
use image_ledger::ledger::MemoryLedger;
use image_ledger::Harvester;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PNG: &[u8] = b"\x89PNG\r\n\x1a\nfirst-image";
const OTHER_PNG: &[u8] = b"\x89PNG\r\n\x1a\nsecond-image";

fn user_agent() -> UserAgentConfig {
    UserAgentConfig {
        collector_name: "TestBot".to_string(),
        collector_version: "1.0.0".to_string(),
        contact_url: "https://example.com/contact".to_string(),
        contact_email: "test@example.com".to_string(),
    }
}

/// Scheduler against real HTTP with short deadlines and backoff
fn scheduler(page: Option<&str>, timeout: Duration, max_per_host: usize) -> FetchScheduler {
    let client = build_http_client(&user_agent()).expect("client");
    let mut retriever = HttpRetriever::new(client, timeout);
    if let Some(page) = page {
        retriever = retriever.for_page(page);
    }

    FetchScheduler::new(
        Arc::new(AdmissionController::new(8, max_per_host)),
        Arc::new(retriever),
        RetryPolicy::new(3, Duration::from_millis(20)),
    )
}

async fn mount_image(server: &MockServer, route: &str, body: &[u8]) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(body.to_vec())
                .insert_header("content-type", "image/png"),
        )
        .mount(server)
        .await;
}

async fn requests_to(server: &MockServer, route: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == route)
        .count()
}

fn failure(outcome: &Outcome) -> (ErrorKind, u32, &str) {
    match outcome {
        Outcome::Failure {
            error_kind,
            attempts,
            detail,
            ..
        } => (*error_kind, *attempts, detail.as_str()),
        Outcome::Success { candidate, .. } => panic!("{} unexpectedly succeeded", candidate.url),
    }
}

#[tokio::test]
async fn test_success_reports_declared_media_type() {
    let server = MockServer::start().await;
    mount_image(&server, "/a.png", PNG).await;

    let outcomes = scheduler(None, Duration::from_secs(5), 2)
        .run(vec![Candidate::new(format!("{}/a.png", server.uri()))])
        .await;

    match &outcomes[0] {
        Outcome::Success {
            bytes, media_type, ..
        } => {
            assert_eq!(bytes.as_slice(), PNG);
            assert_eq!(media_type, "image/png");
        }
        Outcome::Failure { detail, .. } => panic!("unexpected failure: {}", detail),
    }
}

#[tokio::test]
async fn test_missing_content_type_is_sniffed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/bare"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"GIF89a....".to_vec()))
        .mount(&server)
        .await;

    let outcomes = scheduler(None, Duration::from_secs(5), 2)
        .run(vec![Candidate::new(format!("{}/bare", server.uri()))])
        .await;

    match &outcomes[0] {
        Outcome::Success { media_type, .. } => assert_eq!(media_type, "image/gif"),
        Outcome::Failure { detail, .. } => panic!("unexpected failure: {}", detail),
    }
}

#[tokio::test]
async fn test_not_found_attempted_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing.png"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let outcomes = scheduler(None, Duration::from_secs(5), 2)
        .run(vec![Candidate::new(format!("{}/missing.png", server.uri()))])
        .await;

    let (kind, attempts, detail) = failure(&outcomes[0]);
    assert_eq!(kind, ErrorKind::HttpError);
    assert_eq!(attempts, 1);
    assert!(detail.contains("404"));
    assert_eq!(requests_to(&server, "/missing.png").await, 1);
}

#[tokio::test]
async fn test_server_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/broken.png"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let outcomes = scheduler(None, Duration::from_secs(5), 2)
        .run(vec![Candidate::new(format!("{}/broken.png", server.uri()))])
        .await;

    let (kind, attempts, _) = failure(&outcomes[0]);
    assert_eq!((kind, attempts), (ErrorKind::HttpError, 1));
}

#[tokio::test]
async fn test_timeout_retried_until_exhausted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(PNG.to_vec())
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let outcomes = scheduler(None, Duration::from_millis(150), 2)
        .run(vec![Candidate::new(format!("{}/slow.png", server.uri()))])
        .await;

    let (kind, attempts, _) = failure(&outcomes[0]);
    assert_eq!(kind, ErrorKind::Timeout);
    assert_eq!(attempts, 3);
    assert_eq!(requests_to(&server, "/slow.png").await, 3);
}

#[tokio::test]
async fn test_resource_policy_denies_other_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/private.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(PNG.to_vec())
                .insert_header("content-type", "image/png")
                .insert_header("cross-origin-resource-policy", "same-origin"),
        )
        .mount(&server)
        .await;

    let url = format!("{}/private.png", server.uri());

    let outcomes = scheduler(Some("https://shop.example/item"), Duration::from_secs(5), 2)
        .run(vec![Candidate::new(&url)])
        .await;
    let (kind, attempts, _) = failure(&outcomes[0]);
    assert_eq!((kind, attempts), (ErrorKind::CrossOrigin, 1));

    // The same image is usable by a page on its own origin
    let own_page = format!("{}/gallery", server.uri());
    let outcomes = scheduler(Some(&own_page), Duration::from_secs(5), 2)
        .run(vec![Candidate::new(&url)])
        .await;
    assert!(outcomes[0].is_success());
}

#[tokio::test]
async fn test_per_host_ceiling_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(PNG.to_vec())
                .set_delay(Duration::from_millis(200)),
        )
        .mount(&server)
        .await;

    let candidates: Vec<Candidate> = (0..4)
        .map(|i| Candidate::new(format!("{}/{}.png", server.uri(), i)))
        .collect();

    let scheduler = scheduler(None, Duration::from_secs(5), 2);
    let admission = Arc::clone(scheduler.admission());

    let run = tokio::spawn(async move { scheduler.run(candidates).await });

    // Sample while the first pair is in flight
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(admission.in_flight() <= 2);

    let outcomes = run.await.unwrap();
    assert!(outcomes.iter().all(Outcome::is_success));
    assert_eq!(admission.in_flight(), 0);
}

#[tokio::test]
async fn test_collect_deduplicates_identical_bytes() {
    let server = MockServer::start().await;
    mount_image(&server, "/a.png", PNG).await;
    mount_image(&server, "/copy-of-a.png", PNG).await;
    mount_image(&server, "/b.png", OTHER_PNG).await;

    let (sink, mut rx) = ChannelSink::new();
    let collector = Collector::new(scheduler(None, Duration::from_secs(5), 2)).with_sink(Arc::new(sink));

    let result = collector
        .collect(vec![
            Candidate::new(format!("{}/a.png", server.uri())),
            Candidate::new(format!("{}/copy-of-a.png", server.uri())),
            Candidate::new(format!("{}/b.png", server.uri())),
        ])
        .await;

    assert_eq!(result.images.len(), 2);
    assert_eq!(result.stats.deduplicated, 1);
    assert_eq!(result.images[0].snapshot.content_hash, digest(PNG));
    assert_eq!(result.images[1].snapshot.content_hash, digest(OTHER_PNG));

    let mut finished = None;
    while let Ok(event) = rx.try_recv() {
        if let CollectEvent::Finished(report) = event {
            finished = Some(report);
        }
    }
    let finished = finished.expect("Finished event");
    assert_eq!(finished.completed, 3);
    assert_eq!(finished.deduplicated, 1);
}

#[tokio::test]
async fn test_retry_failed_subset() {
    let server = MockServer::start().await;

    // First request for /late.png fails; later ones succeed.
    Mock::given(method("GET"))
        .and(path("/late.png"))
        .respond_with(ResponseTemplate::new(404))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_image(&server, "/late.png", OTHER_PNG).await;
    mount_image(&server, "/ok.png", PNG).await;

    let collector = Collector::new(scheduler(None, Duration::from_secs(5), 2));
    let first = collector
        .collect(vec![
            Candidate::new(format!("{}/ok.png", server.uri())),
            Candidate::new(format!("{}/late.png", server.uri())),
        ])
        .await;
    assert_eq!(first.images.len(), 1);
    assert_eq!(first.failures.len(), 1);

    let retried = collector.retry_failed(&first.failures).await;

    assert_eq!(retried.stats.total, 1);
    assert_eq!(retried.images.len(), 1);
    assert_eq!(retried.images[0].snapshot.content_hash, digest(OTHER_PNG));
    assert_eq!(requests_to(&server, "/ok.png").await, 1);
}

#[tokio::test]
async fn test_harvest_retry_appends_recovered_images() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/late.png"))
        .respond_with(ResponseTemplate::new(404))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_image(&server, "/late.png", OTHER_PNG).await;
    mount_image(&server, "/ok.png", PNG).await;

    let page = format!("{}/gallery", server.uri());
    let mut config = Config::default();
    config.user_agent = user_agent();
    let harvester = Harvester::new(config, MemoryLedger::new()).unwrap();

    let first = harvester
        .harvest(
            &page,
            vec![
                Candidate::new(format!("{}/ok.png", server.uri())),
                Candidate::new(format!("{}/late.png", server.uri())),
            ],
        )
        .await
        .unwrap();
    assert!(first.diff.is_first_visit);
    assert_eq!(first.diff.new.len(), 1);

    let second = harvester
        .retry(&page, &first.collection.failures)
        .await
        .unwrap();
    assert!(!second.diff.is_first_visit);
    assert_eq!(second.diff.new.len(), 1);
    assert_eq!(second.diff.new[0].content_hash, digest(OTHER_PNG));
}
