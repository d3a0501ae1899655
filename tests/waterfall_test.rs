//! Download waterfall behavior against a local mock server: validation,
//! retry policy, stop-at-first-success and cache behavior.

use litharvest::client::providers::SourceCandidate;
use litharvest::fetch::{AttemptOutcome, FetchEngine};
use litharvest::Config;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn pdf_bytes() -> Vec<u8> {
    let mut bytes = b"%PDF-1.7\n".to_vec();
    bytes.resize(4096, b'x');
    bytes
}

fn html_paywall() -> Vec<u8> {
    let mut bytes =
        b"<!DOCTYPE html><html><head><title>Purchase this article</title></head>".to_vec();
    bytes.resize(4096, b' ');
    bytes
}

fn test_engine() -> Arc<FetchEngine> {
    let mut config = Config::default();
    config.rate_limiting.default_interval_ms = 1;
    config.downloads.max_retries = 2;
    config.downloads.retry_backoff_ms = 1;
    Arc::new(FetchEngine::new(&config).unwrap())
}

fn candidate(server: &MockServer, route: &str) -> SourceCandidate {
    SourceCandidate::new(format!("{}{}", server.uri(), route), "test_source", 10)
}

#[tokio::test]
async fn test_html_masquerading_as_pdf_falls_through_to_next_candidate() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/paywalled.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(html_paywall()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/real.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(pdf_bytes()))
        .expect(1)
        .mount(&server)
        .await;

    let engine = test_engine();
    let dir = tempfile::tempdir().unwrap();
    let candidates = vec![
        candidate(&server, "/paywalled.pdf"),
        candidate(&server, "/real.pdf"),
    ];

    let outcome = engine
        .fetch(&candidates, "pmid_1", dir.path())
        .await
        .unwrap();

    assert!(outcome.is_success());
    assert_eq!(outcome.attempts.len(), 2);
    assert_eq!(outcome.attempts[0].outcome, AttemptOutcome::InvalidContent);
    // The offending signature is recorded for diagnosis.
    let detail = outcome.attempts[0].detail.as_deref().unwrap();
    assert!(detail.contains("HTML"));
    assert_eq!(outcome.attempts[1].outcome, AttemptOutcome::Success);
    assert!(outcome.artifact_path.unwrap().exists());
}

#[tokio::test]
async fn test_waterfall_stops_at_first_validated_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/first.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(pdf_bytes()))
        .expect(1)
        .mount(&server)
        .await;
    // Lower-ranked candidate must never be touched.
    Mock::given(method("GET"))
        .and(path("/second.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(pdf_bytes()))
        .expect(0)
        .mount(&server)
        .await;

    let engine = test_engine();
    let dir = tempfile::tempdir().unwrap();
    let candidates = vec![
        candidate(&server, "/first.pdf"),
        candidate(&server, "/second.pdf"),
    ];

    let outcome = engine
        .fetch(&candidates, "pmid_2", dir.path())
        .await
        .unwrap();
    assert!(outcome.is_success());
    assert_eq!(outcome.attempts.len(), 1);
}

#[tokio::test]
async fn test_transient_errors_retried_within_budget() {
    let server = MockServer::start().await;
    // max_retries = 2 means one initial try plus two retries.
    Mock::given(method("GET"))
        .and(path("/flaky.pdf"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let engine = test_engine();
    let dir = tempfile::tempdir().unwrap();
    let outcome = engine
        .fetch(&[candidate(&server, "/flaky.pdf")], "pmid_3", dir.path())
        .await
        .unwrap();

    assert!(!outcome.is_success());
    assert_eq!(outcome.attempts.len(), 3);
    assert!(outcome
        .attempts
        .iter()
        .all(|a| a.outcome == AttemptOutcome::NetworkError));
}

#[tokio::test]
async fn test_permanent_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone.pdf"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let engine = test_engine();
    let dir = tempfile::tempdir().unwrap();
    let outcome = engine
        .fetch(&[candidate(&server, "/gone.pdf")], "pmid_4", dir.path())
        .await
        .unwrap();

    assert!(!outcome.is_success());
    assert_eq!(outcome.attempts.len(), 1);
    assert_eq!(outcome.attempts[0].outcome, AttemptOutcome::NotFound);
}

#[tokio::test]
async fn test_exhausted_waterfall_preserves_full_attempt_log() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone.pdf"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/forbidden.pdf"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let engine = test_engine();
    let dir = tempfile::tempdir().unwrap();
    let candidates = vec![
        candidate(&server, "/gone.pdf"),
        candidate(&server, "/forbidden.pdf"),
    ];
    let outcome = engine
        .fetch(&candidates, "pmid_5", dir.path())
        .await
        .unwrap();

    assert!(outcome.artifact_path.is_none());
    assert_eq!(outcome.attempts.len(), 2);
    assert_eq!(outcome.attempts[1].outcome, AttemptOutcome::AuthRequired);
}

#[tokio::test]
async fn test_existing_artifact_skips_network_entirely() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/never.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(pdf_bytes()))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("pmid_6.pdf"), pdf_bytes()).unwrap();

    let engine = test_engine();
    let outcome = engine
        .fetch(&[candidate(&server, "/never.pdf")], "pmid_6", dir.path())
        .await
        .unwrap();

    assert!(outcome.from_cache);
    assert!(outcome.attempts.is_empty());
    assert!(outcome.is_success());
}

#[tokio::test]
async fn test_identical_content_from_different_urls_stored_once() {
    let server = MockServer::start().await;
    let payload = pdf_bytes();
    Mock::given(method("GET"))
        .and(path("/copy-a.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(payload.clone()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/copy-b.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(payload))
        .mount(&server)
        .await;

    let engine = test_engine();
    let dir = tempfile::tempdir().unwrap();

    let first = engine
        .fetch(&[candidate(&server, "/copy-a.pdf")], "pmid_7", dir.path())
        .await
        .unwrap();
    let second = engine
        .fetch(&[candidate(&server, "/copy-b.pdf")], "doi_10.1_x", dir.path())
        .await
        .unwrap();

    assert_eq!(first.content_hash, second.content_hash);
    // The second fetch reuses the first artifact instead of writing a twin.
    assert_eq!(first.artifact_path, second.artifact_path);
    assert!(!dir.path().join("doi_10.1_x.pdf").exists());
}

#[tokio::test]
async fn test_tiny_payload_rejected_as_invalid_content() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/stub.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.4".to_vec()))
        .mount(&server)
        .await;

    let engine = test_engine();
    let dir = tempfile::tempdir().unwrap();
    let outcome = engine
        .fetch(&[candidate(&server, "/stub.pdf")], "pmid_8", dir.path())
        .await
        .unwrap();

    assert!(!outcome.is_success());
    assert_eq!(outcome.attempts[0].outcome, AttemptOutcome::InvalidContent);
}
