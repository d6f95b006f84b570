//! Integration tests for the interactive chat against a mock Gemini server.

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const GENERATE_PATH: &str = "/models/gemini-2.5-flash-preview-09-2025:generateContent";

fn mock_reply(text: &str) -> serde_json::Value {
    serde_json::json!({
        "candidates": [
            {
                "content": {
                    "role": "model",
                    "parts": [{"text": text}]
                },
                "finishReason": "STOP"
            }
        ],
        "usageMetadata": {
            "promptTokenCount": 10,
            "candidatesTokenCount": 20
        }
    })
}

#[tokio::test]
async fn test_chat_responds_and_exits_on_quit() {
    let home = TempDir::new().unwrap();
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(header("x-goog-api-key", "test-api-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(mock_reply("Hello there!")))
        .expect(1)
        .mount(&mock_server)
        .await;

    cargo_bin_cmd!("grace")
        .env("GRACE_HOME", home.path())
        .env("GEMINI_API_KEY", "test-api-key")
        .env("GEMINI_BASE_URL", mock_server.uri())
        .args(["chat"])
        .write_stdin("hi\n:q\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Hello there!"))
        .stdout(predicate::str::contains("Goodbye!"));
}

#[tokio::test]
async fn test_chat_handles_empty_input() {
    let home = TempDir::new().unwrap();
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(mock_reply("Got it!")))
        .expect(1)
        .mount(&mock_server)
        .await;

    // Empty lines should be skipped, only "test" should trigger an API call
    cargo_bin_cmd!("grace")
        .env("GRACE_HOME", home.path())
        .env("GEMINI_API_KEY", "test-api-key")
        .env("GEMINI_BASE_URL", mock_server.uri())
        .args(["chat"])
        .write_stdin("\n\ntest\n:q\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Got it!"));
}

#[tokio::test]
async fn test_chat_shows_welcome_message() {
    let home = TempDir::new().unwrap();
    let mock_server = MockServer::start().await;

    cargo_bin_cmd!("grace")
        .env("GRACE_HOME", home.path())
        .env("GEMINI_API_KEY", "test-api-key")
        .env("GEMINI_BASE_URL", mock_server.uri())
        .args(["chat"])
        .write_stdin(":q\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Grace Chat"))
        .stdout(predicate::str::contains(":q to quit"))
        .stdout(predicate::str::contains("New Chat 1"));
}

#[tokio::test]
async fn test_chat_api_error_offers_retry() {
    let home = TempDir::new().unwrap();
    let mock_server = MockServer::start().await;

    let error_body = serde_json::json!({
        "error": {
            "code": 429,
            "status": "RESOURCE_EXHAUSTED",
            "message": "Quota exceeded"
        }
    });

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(429).set_body_json(error_body))
        .mount(&mock_server)
        .await;

    // Chat should show the error but keep running (user can still quit)
    cargo_bin_cmd!("grace")
        .env("GRACE_HOME", home.path())
        .env("GEMINI_API_KEY", "test-api-key")
        .env("GEMINI_BASE_URL", mock_server.uri())
        .args(["chat"])
        .write_stdin("hello\n:q\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Error:"))
        .stdout(predicate::str::contains("429"))
        .stdout(predicate::str::contains(":retry"));
}

#[tokio::test]
async fn test_chat_retry_after_failure_succeeds() {
    let home = TempDir::new().unwrap();
    let mock_server = MockServer::start().await;

    let error_body = serde_json::json!({
        "error": { "code": 500, "status": "INTERNAL", "message": "Transient failure" }
    });

    // First request fails, the retried one succeeds.
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_json(error_body))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(mock_reply("Recovered!")))
        .expect(1)
        .mount(&mock_server)
        .await;

    cargo_bin_cmd!("grace")
        .env("GRACE_HOME", home.path())
        .env("GEMINI_API_KEY", "test-api-key")
        .env("GEMINI_BASE_URL", mock_server.uri())
        .args(["chat"])
        .write_stdin("hello\n:retry\n:q\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Error:"))
        .stdout(predicate::str::contains("Recovered!"));
}

#[tokio::test]
async fn test_chat_retry_without_failure_is_noop() {
    let home = TempDir::new().unwrap();
    let mock_server = MockServer::start().await;

    cargo_bin_cmd!("grace")
        .env("GRACE_HOME", home.path())
        .env("GEMINI_API_KEY", "test-api-key")
        .env("GEMINI_BASE_URL", mock_server.uri())
        .args(["chat"])
        .write_stdin(":retry\n:q\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing to retry."));
}

#[tokio::test]
async fn test_chat_fails_without_api_key() {
    let home = TempDir::new().unwrap();

    cargo_bin_cmd!("grace")
        .env("GRACE_HOME", home.path())
        .env_remove("GEMINI_API_KEY")
        .args(["chat"])
        .write_stdin(":q\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("GEMINI_API_KEY"));
}

#[tokio::test]
async fn test_chat_persists_snapshot() {
    let home = TempDir::new().unwrap();
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(mock_reply("hi")))
        .expect(1)
        .mount(&mock_server)
        .await;

    cargo_bin_cmd!("grace")
        .env("GRACE_HOME", home.path())
        .env("GEMINI_API_KEY", "test-api-key")
        .env("GEMINI_BASE_URL", mock_server.uri())
        .args(["chat"])
        .write_stdin("hello\n:q\n")
        .assert()
        .success();

    let snapshot = std::fs::read_to_string(home.path().join("chat-sessions.json")).unwrap();
    let state: serde_json::Value = serde_json::from_str(&snapshot).unwrap();

    let sessions = state["sessions"].as_object().unwrap();
    assert_eq!(sessions.len(), 1);

    let current_id = state["currentSessionId"].as_str().unwrap();
    let session = &sessions[current_id];
    assert_eq!(session["title"], "New Chat 1");
    assert_eq!(session["isTyping"], false);
    assert_eq!(session["error"], serde_json::Value::Null);

    let messages = session["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["role"], "user");
    assert_eq!(messages[0]["text"], "hello");
    assert_eq!(messages[1]["role"], "model");
    assert_eq!(messages[1]["text"], "hi");
}

#[tokio::test]
async fn test_chat_resumes_previous_session() {
    let home = TempDir::new().unwrap();
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(mock_reply("hi")))
        .expect(1)
        .mount(&mock_server)
        .await;

    cargo_bin_cmd!("grace")
        .env("GRACE_HOME", home.path())
        .env("GEMINI_API_KEY", "test-api-key")
        .env("GEMINI_BASE_URL", mock_server.uri())
        .args(["chat"])
        .write_stdin("hello\n:q\n")
        .assert()
        .success();

    // Second run loads the same session; no further API calls.
    cargo_bin_cmd!("grace")
        .env("GRACE_HOME", home.path())
        .env("GEMINI_API_KEY", "test-api-key")
        .env("GEMINI_BASE_URL", mock_server.uri())
        .args(["chat"])
        .write_stdin(":q\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Loaded 2 previous messages"));
}

#[tokio::test]
async fn test_chat_new_session_starts_empty() {
    let home = TempDir::new().unwrap();
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(mock_reply("hi")))
        .expect(1)
        .mount(&mock_server)
        .await;

    cargo_bin_cmd!("grace")
        .env("GRACE_HOME", home.path())
        .env("GEMINI_API_KEY", "test-api-key")
        .env("GEMINI_BASE_URL", mock_server.uri())
        .args(["chat"])
        .write_stdin("hello\n:new\n:q\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Started New Chat 2"));

    let snapshot = std::fs::read_to_string(home.path().join("chat-sessions.json")).unwrap();
    let state: serde_json::Value = serde_json::from_str(&snapshot).unwrap();

    let sessions = state["sessions"].as_object().unwrap();
    assert_eq!(sessions.len(), 2);

    // The new session is active and empty.
    let current_id = state["currentSessionId"].as_str().unwrap();
    let current = &sessions[current_id];
    assert_eq!(current["title"], "New Chat 2");
    assert_eq!(current["messages"].as_array().unwrap().len(), 0);
}
