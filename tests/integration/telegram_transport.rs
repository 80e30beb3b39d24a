//! Integration tests for the Telegram transport against a mock Bot API

use std::sync::Arc;

use serde_json::json;
use uptime_guard::alerts::{AlertManager, AlertPolicy, AlertTransport};
use uptime_guard::config::AlertSettings;
use uptime_guard::error::AlertError;
use uptime_guard::telegram::TelegramTransport;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SEND_PATH: &str = "/bottest-token/sendMessage";

fn settings(api_base: String) -> AlertSettings {
    AlertSettings {
        bot_token: "test-token".to_string(),
        chat_id: "-100200".to_string(),
        enabled: true,
        api_base,
        ..AlertSettings::default()
    }
}

#[tokio::test]
async fn test_send_message_payload() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .and(body_partial_json(json!({
            "chat_id": "-100200",
            "text": "hello <b>world</b>",
            "parse_mode": "HTML",
            "disable_web_page_preview": true
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": {}})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let transport = TelegramTransport::new(&settings(mock_server.uri())).unwrap();
    transport.send("hello <b>world</b>").await.unwrap();
}

#[tokio::test]
async fn test_api_rejection_carries_description() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "ok": false,
            "error_code": 400,
            "description": "Bad Request: chat not found"
        })))
        .mount(&mock_server)
        .await;

    let transport = TelegramTransport::new(&settings(mock_server.uri())).unwrap();
    let err = transport.send("hello").await.unwrap_err();

    match err {
        AlertError::Rejected(description) => assert!(description.contains("chat not found")),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_non_json_answer_is_rejected() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .respond_with(ResponseTemplate::new(502).set_body_string("<html>bad gateway</html>"))
        .mount(&mock_server)
        .await;

    let transport = TelegramTransport::new(&settings(mock_server.uri())).unwrap();
    let err = transport.send("hello").await.unwrap_err();

    assert!(matches!(err, AlertError::Rejected(ref status) if status.contains("502")));
}

#[tokio::test]
async fn test_unreachable_api_is_http_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let transport = TelegramTransport::new(&settings(format!("http://127.0.0.1:{port}"))).unwrap();
    let err = transport.send("hello").await.unwrap_err();

    assert!(matches!(err, AlertError::Http(_)));
    assert!(!err.to_string().contains("test-token"));
}

#[tokio::test]
async fn test_manager_sends_formatted_down_alert() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(2)
        .mount(&mock_server)
        .await;

    let transport = TelegramTransport::new(&settings(mock_server.uri())).unwrap();
    let manager = AlertManager::new(Arc::new(transport), AlertPolicy::default());

    manager
        .send_down_alert("shop", "https://shop.test", 10, Some("timeout"))
        .await
        .unwrap();
    manager.send_test().await.unwrap();

    let requests = mock_server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let text = body["text"].as_str().unwrap();
    assert!(text.contains("shop"));
    assert!(text.contains("https://shop.test"));
    assert!(text.contains("Consecutive failures: 10"));
    assert!(text.contains("timeout"));
}
