#![allow(clippy::unwrap_used, clippy::expect_used)]

//! WebSocket transport tests against an in-process tokio-tungstenite server.

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use tether_core::TetherError;
use tether_protocol::{JsonRpcNotification, JsonRpcRequest};
use tether_transport::{CloseEvent, ReconnectEvent, Transport, TransportConfig, WebSocketConfig};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

const WAIT: Duration = Duration::from_secs(5);

/// Answer requests with `{"method": <method>}` and echo notifications back.
async fn serve_echo(ws: WebSocketStream<TcpStream>) {
    let (mut write, mut read) = ws.split();
    while let Some(Ok(message)) = read.next().await {
        let Message::Text(text) = message else {
            continue;
        };
        let value: Value = serde_json::from_str(&text).unwrap();
        let reply = match value.get("id") {
            Some(id) => json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": {"method": value["method"]},
            })
            .to_string(),
            None => text,
        };
        if write.send(Message::Text(reply)).await.is_err() {
            break;
        }
    }
}

async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    (listener, url)
}

fn websocket(config: WebSocketConfig) -> Transport {
    Transport::from_config(&TransportConfig::WebSocket(config)).unwrap()
}

// --- Messaging ---

#[tokio::test]
async fn test_request_round_trip_and_headers() {
    let (listener, url) = bind().await;
    let (header_tx, mut header_rx) = mpsc::unbounded_channel::<Option<String>>();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            let token = req
                .headers()
                .get("x-api-key")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let _ = header_tx.send(token);
            Ok(resp)
        };
        let ws = tokio_tungstenite::accept_hdr_async(stream, callback).await.unwrap();
        serve_echo(ws).await;
    });

    let transport = websocket(WebSocketConfig::new(&url).with_header("x-api-key", "secret"));
    transport.connect().await.unwrap();
    assert!(transport.is_connected());

    let header = tokio::time::timeout(WAIT, header_rx.recv()).await.unwrap().unwrap();
    assert_eq!(header.as_deref(), Some("secret"));

    let response = transport
        .send_request(JsonRpcRequest::with_next_id("tools/list", None))
        .await
        .unwrap();
    assert_eq!(response.into_result().unwrap(), json!({"method": "tools/list"}));

    transport.disconnect().await.unwrap();
    assert!(!transport.is_connected());
}

#[tokio::test]
async fn test_concurrent_requests_correlate_by_id() {
    let (listener, url) = bind().await;
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        serve_echo(tokio_tungstenite::accept_async(stream).await.unwrap()).await;
    });

    let transport = websocket(WebSocketConfig::new(&url));
    transport.connect().await.unwrap();

    let (a, b, c) = tokio::join!(
        transport.send_request(JsonRpcRequest::with_next_id("tools/list", None)),
        transport.send_request(JsonRpcRequest::with_next_id("prompts/list", None)),
        transport.send_request(JsonRpcRequest::with_next_id("resources/list", None)),
    );
    assert_eq!(a.unwrap().into_result().unwrap()["method"], "tools/list");
    assert_eq!(b.unwrap().into_result().unwrap()["method"], "prompts/list");
    assert_eq!(c.unwrap().into_result().unwrap()["method"], "resources/list");

    transport.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_notifications_are_delivered_to_listeners() {
    let (listener, url) = bind().await;
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        serve_echo(tokio_tungstenite::accept_async(stream).await.unwrap()).await;
    });

    let transport = websocket(WebSocketConfig::new(&url));
    let (tx, mut rx) = mpsc::unbounded_channel();
    transport.on_message(move |m| {
        let _ = tx.send(m.clone());
    });
    transport.connect().await.unwrap();

    transport
        .send_notification(JsonRpcNotification::new("notifications/message", Some(json!({"level": "info"}))))
        .await
        .unwrap();
    let message = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(message.method(), Some("notifications/message"));

    transport.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_connect_to_closed_port_fails() {
    let (listener, url) = bind().await;
    drop(listener);

    let transport = websocket(WebSocketConfig::new(&url));
    let err = transport.connect().await.unwrap_err();
    assert!(matches!(err, TetherError::Transport(_)));
    assert!(!transport.is_connected());
}

// --- Reconnection ---

#[tokio::test]
async fn test_reconnects_after_server_drop() {
    let (listener, url) = bind().await;
    tokio::spawn(async move {
        // First connection is closed right away, the second one is served.
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.close(None).await.unwrap();
        drop(ws);

        let (stream, _) = listener.accept().await.unwrap();
        serve_echo(tokio_tungstenite::accept_async(stream).await.unwrap()).await;
    });

    let config = WebSocketConfig::new(&url).with_reconnect(true, Duration::from_millis(20), 3);
    let transport = websocket(config);
    let (tx, mut rx) = mpsc::unbounded_channel::<ReconnectEvent>();
    transport.on_reconnect(move |e| {
        let _ = tx.send(*e);
    });

    transport.connect().await.unwrap();
    let event = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(event.attempt, 1);
    assert!(transport.is_connected());

    let response = transport
        .send_request(JsonRpcRequest::with_next_id("ping", None))
        .await
        .unwrap();
    assert!(!response.is_error());

    transport.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_gives_up_after_max_attempts() {
    let (listener, url) = bind().await;
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        // Stop listening before closing so every reconnect is refused.
        drop(listener);
        ws.close(None).await.unwrap();
    });

    let config = WebSocketConfig::new(&url).with_reconnect(true, Duration::from_millis(10), 3);
    let transport = websocket(config);
    let (err_tx, mut err_rx) = mpsc::unbounded_channel::<String>();
    let (close_tx, mut close_rx) = mpsc::unbounded_channel::<CloseEvent>();
    transport.on_error(move |e| {
        let _ = err_tx.send(e.clone());
    });
    transport.on_close(move |e| {
        let _ = close_tx.send(e.clone());
    });

    transport.connect().await.unwrap();

    let close = tokio::time::timeout(WAIT, close_rx.recv()).await.unwrap().unwrap();
    assert!(!close.initiated_by_user);
    assert!(close.reason.contains("3 reconnect attempts"));
    assert!(!transport.is_connected());

    let mut attempts = 0;
    while let Ok(message) = err_rx.try_recv() {
        if message.starts_with("Reconnect attempt") {
            attempts += 1;
        }
    }
    assert_eq!(attempts, 3);
}

#[tokio::test]
async fn test_disconnect_cancels_pending_reconnect() {
    let (listener, url) = bind().await;
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        drop(listener);
        ws.close(None).await.unwrap();
    });

    // Long interval: the first attempt is still sleeping when we disconnect.
    let config = WebSocketConfig::new(&url).with_reconnect(true, Duration::from_secs(30), 5);
    let transport = websocket(config);
    let (err_tx, mut err_rx) = mpsc::unbounded_channel::<String>();
    let (close_tx, mut close_rx) = mpsc::unbounded_channel::<CloseEvent>();
    transport.on_error(move |e| {
        let _ = err_tx.send(e.clone());
    });
    transport.on_close(move |e| {
        let _ = close_tx.send(e.clone());
    });

    transport.connect().await.unwrap();
    // Connection loss is reported as an error while reconnection is scheduled.
    tokio::time::timeout(WAIT, err_rx.recv()).await.unwrap().unwrap();

    transport.disconnect().await.unwrap();
    let close = tokio::time::timeout(WAIT, close_rx.recv()).await.unwrap().unwrap();
    assert!(close.initiated_by_user);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(close_rx.try_recv().is_err());
}
