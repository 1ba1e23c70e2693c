//! Integration tests for `BackendClient` against a local mock HTTP server.

use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use bookvox_backend::{BackendClient, BackendError};
use bookvox_jobs::{JobId, JobPhase, StatusError, StatusSource};
use bookvox_speech::SpeechBackend;

fn job(raw: &str) -> JobId {
    JobId::new(raw).unwrap()
}

#[tokio::test]
async fn status_round_trip_parses_the_snapshot() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/status/job-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "phase": "guessed",
            "transcription": "find dune by frank herbert",
            "guess": { "status": "confident", "title": "Dune", "author": "Frank Herbert" }
        })))
        .mount(&server)
        .await;

    let client = BackendClient::new(&server.uri()).unwrap();
    let snapshot = client.status(&job("job-1")).await.unwrap();

    assert_eq!(snapshot.phase, Some(JobPhase::Guessed));
    assert_eq!(
        snapshot.transcription.as_deref(),
        Some("find dune by frank herbert")
    );
    assert!(snapshot.guess.is_some());
    assert_eq!(snapshot.ebook_path, None);
}

#[tokio::test]
async fn job_ids_are_lowercased_in_request_paths() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/status/job-7a"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "phase": "processing" })))
        .expect(1)
        .mount(&server)
        .await;

    let client = BackendClient::new(&server.uri()).unwrap();
    let snapshot = client.status(&job("  JOB-7A ")).await.unwrap();
    assert_eq!(snapshot.phase, Some(JobPhase::Processing));
}

#[tokio::test]
async fn server_errors_surface_as_transport_to_the_poller() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/status/job-1"))
        .respond_with(ResponseTemplate::new(500).set_body_string("redis down"))
        .mount(&server)
        .await;

    let client = BackendClient::new(&server.uri()).unwrap();
    let err = client.fetch_status(&job("job-1")).await.unwrap_err();
    match err {
        StatusError::Transport(message) => {
            assert!(message.contains("500"), "unexpected message: {message}");
            assert!(message.contains("redis down"), "unexpected message: {message}");
        }
        other => panic!("expected transport error, got {other:?}"),
    }
}

#[tokio::test]
async fn malformed_status_surfaces_as_parse_to_the_poller() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/status/job-1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .mount(&server)
        .await;

    let client = BackendClient::new(&server.uri()).unwrap();
    let err = client.fetch_status(&job("job-1")).await.unwrap_err();
    assert!(matches!(err, StatusError::Parse(_)), "got {err:?}");
}

#[tokio::test]
async fn unreachable_backend_is_a_network_error() {
    // Nothing listens on port 1.
    let client = BackendClient::new("http://127.0.0.1:1").unwrap();
    let err = client.status(&job("job-1")).await.unwrap_err();
    assert!(matches!(err, BackendError::Network(_)), "got {err:?}");
}

#[tokio::test]
async fn split_posts_the_split_flag_and_returns_sentences() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/speak"))
        .and(body_partial_json(json!({ "text": "One. Two.", "split": true })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "sentences": ["One.", "Two."] })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = BackendClient::new(&server.uri()).unwrap();
    let sentences = client.split("One. Two.").await.unwrap();
    assert_eq!(sentences, vec!["One.".to_string(), "Two.".to_string()]);
}

#[tokio::test]
async fn synthesize_returns_the_audio_bytes_untouched() {
    let wav = vec![0x52, 0x49, 0x46, 0x46, 0x00, 0x01, 0x02, 0x03];
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/speak"))
        .and(body_partial_json(json!({ "text": "One." })))
        .respond_with(ResponseTemplate::new(200).set_body_raw(wav.clone(), "audio/wav"))
        .mount(&server)
        .await;

    let client = BackendClient::new(&server.uri()).unwrap();
    let clip = client.synthesize("One.").await.unwrap();
    assert_eq!(clip.bytes(), wav.as_slice());
}

#[tokio::test]
async fn submit_recording_parses_the_receipt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/recognize"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "job_id": "B4E00EB6-367C-4495-8C2A-7CEA89DE1B8D",
            "status_url": "/status/b4e00eb6-367c-4495-8c2a-7cea89de1b8d"
        })))
        .mount(&server)
        .await;

    let client = BackendClient::new(&server.uri()).unwrap();
    let receipt = client
        .submit_recording("recording.webm", vec![1, 2, 3])
        .await
        .unwrap();

    // Ids normalize on the way in regardless of backend casing.
    assert_eq!(
        receipt.job_id.as_str(),
        "b4e00eb6-367c-4495-8c2a-7cea89de1b8d"
    );
    assert!(receipt.status_url.starts_with("/status/"));
}

#[tokio::test]
async fn clarify_and_fetch_post_to_the_job() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/clarify/job-1"))
        .and(body_partial_json(json!({ "answer": "the first one" })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/fetch/job-1"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let client = BackendClient::new(&server.uri()).unwrap();
    client
        .answer_clarification(&job("job-1"), "the first one")
        .await
        .unwrap();
    client.request_fetch(&job("job-1")).await.unwrap();
}

#[tokio::test]
async fn missing_index_reads_as_not_ready() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ebooks/job-1/parsed/index.json"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such file"))
        .mount(&server)
        .await;

    let client = BackendClient::new(&server.uri()).unwrap();
    let err = client.ebook_index(&job("job-1")).await.unwrap_err();
    assert!(matches!(err, BackendError::NotReady), "got {err:?}");
}

#[tokio::test]
async fn index_parses_the_section_list() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ebooks/job-1/parsed/index.json"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!(["0001.txt", "0002.txt", "0003.txt"])),
        )
        .mount(&server)
        .await;

    let client = BackendClient::new(&server.uri()).unwrap();
    let sections = client.ebook_index(&job("job-1")).await.unwrap();
    assert_eq!(sections, vec!["0001.txt", "0002.txt", "0003.txt"]);
}

#[tokio::test]
async fn malformed_index_is_a_parse_error_not_a_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ebooks/job-1/parsed/index.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "oops": true })))
        .mount(&server)
        .await;

    let client = BackendClient::new(&server.uri()).unwrap();
    let err = client.ebook_index(&job("job-1")).await.unwrap_err();
    assert!(matches!(err, BackendError::Parse(_)), "got {err:?}");
}

#[tokio::test]
async fn section_text_comes_back_verbatim() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ebooks/job-1/parsed/0001.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Call me Ishmael."))
        .mount(&server)
        .await;

    let client = BackendClient::new(&server.uri()).unwrap();
    let text = client.ebook_section(&job("job-1"), "0001.txt").await.unwrap();
    assert_eq!(text, "Call me Ishmael.");
}

#[tokio::test]
async fn api_failures_carry_code_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ebooks/job-1/parsed/0001.txt"))
        .respond_with(ResponseTemplate::new(500).set_body_string("disk offline"))
        .mount(&server)
        .await;

    let client = BackendClient::new(&server.uri()).unwrap();
    let err = client.ebook_section(&job("job-1"), "0001.txt").await.unwrap_err();
    match err {
        BackendError::Api { code, body } => {
            assert_eq!(code, 500);
            assert_eq!(body, "disk offline");
        }
        other => panic!("expected api error, got {other:?}"),
    }
}
