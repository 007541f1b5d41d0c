#![allow(clippy::unwrap_used, clippy::expect_used)]

//! HTTP+SSE transport tests against a wiremock server.

use serde_json::{json, Value};
use std::time::Duration;
use tether_core::TetherError;
use tether_protocol::{JsonRpcNotification, JsonRpcRequest};
use tether_transport::{HttpConfig, Transport, TransportConfig};
use tokio::sync::mpsc;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const WAIT: Duration = Duration::from_secs(5);

/// Answers every request with `{"method": <method>}` under the request's id;
/// notifications get `202 Accepted`.
struct EchoRpc;

impl Respond for EchoRpc {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).unwrap();
        match body.get("id") {
            Some(id) => ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": {"method": body["method"]},
            })),
            None => ResponseTemplate::new(202),
        }
    }
}

async fn echo_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .respond_with(EchoRpc)
        .mount(&server)
        .await;
    server
}

fn http(config: HttpConfig) -> Transport {
    Transport::from_config(&TransportConfig::Http(config)).unwrap()
}

// --- Connect check ---

#[tokio::test]
async fn test_connect_pings_and_sends_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(header("authorization", "Bearer token-1"))
        .and(body_partial_json(json!({"method": "ping"})))
        .respond_with(EchoRpc)
        .expect(1)
        .mount(&server)
        .await;

    let config = HttpConfig::new(format!("{}/mcp", server.uri()))
        .with_header("authorization", "Bearer token-1");
    let transport = http(config);
    transport.connect().await.unwrap();
    assert!(transport.is_connected());

    transport.disconnect().await.unwrap();
    assert!(!transport.is_connected());
}

#[tokio::test]
async fn test_connect_fails_on_http_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let transport = http(HttpConfig::new(format!("{}/mcp", server.uri())));
    let err = transport.connect().await.unwrap_err();
    assert!(matches!(err, TetherError::Http(_)));
    assert!(err.to_string().contains("500"));
    assert!(!transport.is_connected());
}

#[tokio::test]
async fn test_connect_fails_on_rpc_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {"code": -32601, "message": "Method not found"},
        })))
        .mount(&server)
        .await;

    let transport = http(HttpConfig::new(format!("{}/mcp", server.uri())));
    let err = transport.connect().await.unwrap_err();
    assert!(matches!(err, TetherError::Rpc { code: -32601, .. }));
    assert!(!transport.is_connected());
}

// --- Requests ---

#[tokio::test]
async fn test_request_round_trip() {
    let server = echo_server().await;
    let transport = http(HttpConfig::new(format!("{}/mcp", server.uri())));
    transport.connect().await.unwrap();

    let response = transport
        .send_request(JsonRpcRequest::with_next_id("tools/list", None))
        .await
        .unwrap();
    assert_eq!(response.into_result().unwrap(), json!({"method": "tools/list"}));

    transport
        .send_notification(JsonRpcNotification::new("notifications/initialized", None))
        .await
        .unwrap();
    assert_eq!(transport.pending_requests(), 0);
}

#[tokio::test]
async fn test_error_status_fails_only_that_call() {
    let server = echo_server().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "tools/call"})))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .with_priority(1)
        .mount(&server)
        .await;

    let transport = http(HttpConfig::new(format!("{}/mcp", server.uri())));
    transport.connect().await.unwrap();

    let err = transport
        .send_request(JsonRpcRequest::with_next_id("tools/call", None))
        .await
        .unwrap_err();
    assert!(matches!(err, TetherError::Http(_)));
    assert!(err.to_string().contains("overloaded"));

    assert!(transport.is_connected());
    let ok = transport
        .send_request(JsonRpcRequest::with_next_id("tools/list", None))
        .await
        .unwrap();
    assert!(!ok.is_error());
}

#[tokio::test]
async fn test_send_before_connect_fails() {
    let server = echo_server().await;
    let transport = http(HttpConfig::new(format!("{}/mcp", server.uri())));
    let err = transport
        .send_request(JsonRpcRequest::with_next_id("tools/list", None))
        .await
        .unwrap_err();
    assert!(matches!(err, TetherError::NotConnected));
}

#[tokio::test]
async fn test_event_stream_post_body_is_parsed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            "event: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\n\n",
            "text/event-stream",
        ))
        .mount(&server)
        .await;

    let transport = http(HttpConfig::new(format!("{}/mcp", server.uri())));
    // The ping reply id does not matter; only its success does.
    transport.connect().await.unwrap();
    assert!(transport.is_connected());
}

// --- Server-Sent Events ---

#[tokio::test]
async fn test_accepted_request_resolved_over_event_stream() {
    let server = echo_server().await;
    let request_id = 9_000_001_u64;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"id": request_id})))
        .respond_with(ResponseTemplate::new(202))
        .with_priority(1)
        .mount(&server)
        .await;

    let events = format!(
        ": keep-alive\n\n\
         data: {{\"jsonrpc\":\"2.0\",\"method\":\"notifications/tools/list_changed\"}}\n\n\
         data: {{\"jsonrpc\":\"2.0\",\"id\":{request_id},\"result\":{{\"via\":\"sse\"}}}}\n\n"
    );
    Mock::given(method("GET"))
        .and(path("/events"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(events, "text/event-stream")
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;

    let config = HttpConfig::new(format!("{}/mcp", server.uri()))
        .with_events_url(format!("{}/events", server.uri()));
    let transport = http(config);
    let (msg_tx, mut msg_rx) = mpsc::unbounded_channel();
    let (err_tx, mut err_rx) = mpsc::unbounded_channel::<String>();
    transport.on_message(move |m| {
        let _ = msg_tx.send(m.clone());
    });
    transport.on_error(move |e| {
        let _ = err_tx.send(e.clone());
    });
    transport.connect().await.unwrap();

    let response = transport
        .send_request(JsonRpcRequest::new(request_id, "tools/call", None))
        .await
        .unwrap();
    assert_eq!(response.into_result().unwrap(), json!({"via": "sse"}));

    let notification = tokio::time::timeout(WAIT, msg_rx.recv()).await.unwrap().unwrap();
    assert_eq!(notification.method(), Some("notifications/tools/list_changed"));

    // The stream ending is an error event; the transport stays usable.
    let ended = tokio::time::timeout(WAIT, err_rx.recv()).await.unwrap().unwrap();
    assert!(ended.contains("ended"));
    assert!(transport.is_connected());

    transport.disconnect().await.unwrap();
}
