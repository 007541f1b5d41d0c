//! Minimal MCP server speaking `Content-Length` framed JSON-RPC over stdio.
//!
//! Used by the integration tests and handy for trying the CLI by hand:
//!
//! ```text
//! tether-echo-server [--name NAME] [--page-size N] [--fail-initialize]
//! ```
//!
//! Tools: `echo`, `add`, `fail` (reports `isError`), `slow` (sleeps `ms`)
//! and `notify` (emits `notifications/tools/list_changed`). One static
//! resource `mem://greeting`, the template `mem://{key}` and one prompt
//! `greet`. With `--page-size`, every list method paginates. Subscribing to
//! a resource immediately sends one `notifications/resources/updated`, and
//! `logging/setLevel` answers with one `notifications/message`.

use serde_json::{json, Value};
use std::time::Duration;
use tether_protocol::{
    decode_frames, encode_frame, error_codes, methods, JsonRpcError, JsonRpcMessage,
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, PROTOCOL_VERSION,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
struct Options {
    name: String,
    page_size: Option<usize>,
    fail_initialize: bool,
}

impl Options {
    fn from_args() -> Self {
        let mut options = Self {
            name: "tether-echo".to_string(),
            page_size: None,
            fail_initialize: false,
        };
        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--name" => {
                    if let Some(name) = args.next() {
                        options.name = name;
                    }
                }
                "--page-size" => {
                    options.page_size = args.next().and_then(|n| n.parse().ok()).filter(|n| *n > 0);
                }
                "--fail-initialize" => options.fail_initialize = true,
                other => eprintln!("ignoring unknown argument '{other}'"),
            }
        }
        options
    }
}

#[tokio::main]
async fn main() {
    let options = Options::from_args();
    let (tx, mut rx) = mpsc::unbounded_channel::<JsonRpcMessage>();

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(message) = rx.recv().await {
            let Ok(frame) = encode_frame(&message) else {
                continue;
            };
            if stdout.write_all(&frame).await.is_err() || stdout.flush().await.is_err() {
                break;
            }
        }
    });

    let mut stdin = tokio::io::stdin();
    let mut buffer = Vec::new();
    let mut chunk = vec![0u8; 8192];
    loop {
        let n = match stdin.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        buffer.extend_from_slice(&chunk[..n]);
        let decoded = decode_frames(&buffer);
        buffer = decoded.remainder;
        for err in decoded.errors {
            eprintln!("dropping malformed frame: {err}");
        }
        for message in decoded.messages {
            if let JsonRpcMessage::Request(request) = message {
                let tx = tx.clone();
                let options = options.clone();
                tokio::spawn(async move {
                    let response = handle(&options, request, &tx).await;
                    let _ = tx.send(JsonRpcMessage::Response(response));
                });
            }
        }
    }

    drop(tx);
    let _ = writer.await;
}

async fn handle(
    options: &Options,
    request: JsonRpcRequest,
    notify: &mpsc::UnboundedSender<JsonRpcMessage>,
) -> JsonRpcResponse {
    let id = request.id;
    let params = request.params.unwrap_or(Value::Null);
    let result = match request.method.as_str() {
        methods::INITIALIZE if options.fail_initialize => Err(JsonRpcError::new(
            error_codes::INTERNAL_ERROR,
            "initialization refused",
        )),
        methods::INITIALIZE => Ok(json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": {"listChanged": true},
                "resources": {"subscribe": true},
                "prompts": {},
                "logging": {}
            },
            "serverInfo": {"name": options.name, "version": env!("CARGO_PKG_VERSION")},
            "instructions": "Echo server for tether tests"
        })),
        methods::PING => Ok(json!({})),
        methods::TOOLS_LIST => Ok(page(options, &params, "tools", tools())),
        methods::TOOLS_CALL => call_tool(&params, notify).await,
        methods::RESOURCES_LIST => Ok(page(
            options,
            &params,
            "resources",
            vec![json!({"uri": "mem://greeting", "name": "greeting", "mimeType": "text/plain"})],
        )),
        methods::RESOURCES_TEMPLATES_LIST => Ok(page(
            options,
            &params,
            "resourceTemplates",
            vec![json!({"uriTemplate": "mem://{key}", "name": "memory"})],
        )),
        methods::RESOURCES_READ => read_resource(&params),
        methods::RESOURCES_SUBSCRIBE => match params["uri"].as_str() {
            Some(uri) => {
                // One immediate update per subscription.
                let _ = notify.send(JsonRpcMessage::Notification(JsonRpcNotification::new(
                    methods::RESOURCE_UPDATED,
                    Some(json!({ "uri": uri })),
                )));
                Ok(json!({}))
            }
            None => Err(invalid_params("uri is required")),
        },
        methods::RESOURCES_UNSUBSCRIBE => {
            if params["uri"].is_string() {
                Ok(json!({}))
            } else {
                Err(invalid_params("uri is required"))
            }
        }
        methods::PROMPTS_LIST => Ok(page(
            options,
            &params,
            "prompts",
            vec![json!({
                "name": "greet",
                "description": "Greet someone",
                "arguments": [{"name": "name", "required": true}]
            })],
        )),
        methods::PROMPTS_GET => get_prompt(&params),
        methods::LOGGING_SET_LEVEL => {
            let level = params["level"].as_str().unwrap_or("info");
            let _ = notify.send(JsonRpcMessage::Notification(JsonRpcNotification::new(
                methods::LOG_MESSAGE,
                Some(json!({
                    "level": "notice",
                    "logger": options.name,
                    "data": format!("log level set to {level}")
                })),
            )));
            Ok(json!({}))
        }
        other => Err(JsonRpcError::new(
            error_codes::METHOD_NOT_FOUND,
            format!("Method not found: {other}"),
        )),
    };

    match result {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(error) => JsonRpcResponse::error(Some(id), error),
    }
}

fn tools() -> Vec<Value> {
    vec![
        tool("echo", "Echo a message", json!({"message": {"type": "string"}})),
        tool("add", "Add two numbers", json!({"a": {"type": "number"}, "b": {"type": "number"}})),
        tool("fail", "Always reports a tool error", json!({})),
        tool("slow", "Sleep before answering", json!({"ms": {"type": "integer"}})),
        tool("notify", "Announce a tool list change", json!({})),
    ]
}

fn tool(name: &str, description: &str, properties: Value) -> Value {
    json!({
        "name": name,
        "description": description,
        "inputSchema": {"type": "object", "properties": properties}
    })
}

/// Slice `items` by the numeric cursor when paging is enabled.
fn page(options: &Options, params: &Value, field: &str, items: Vec<Value>) -> Value {
    let Some(size) = options.page_size else {
        return json!({ field: items });
    };
    let start = params["cursor"]
        .as_str()
        .and_then(|c| c.parse::<usize>().ok())
        .unwrap_or(0)
        .min(items.len());
    let end = (start + size).min(items.len());
    let mut result = json!({ field: items[start..end].to_vec() });
    if end < items.len() {
        result["nextCursor"] = json!(end.to_string());
    }
    result
}

async fn call_tool(
    params: &Value,
    notify: &mpsc::UnboundedSender<JsonRpcMessage>,
) -> Result<Value, JsonRpcError> {
    let arguments = &params["arguments"];
    let text = match params["name"].as_str().unwrap_or_default() {
        "echo" => format!("Echo: {}", arguments["message"].as_str().unwrap_or_default()),
        "add" => {
            let (Some(a), Some(b)) = (arguments["a"].as_f64(), arguments["b"].as_f64()) else {
                return Err(invalid_params("'a' and 'b' must be numbers"));
            };
            (a + b).to_string()
        }
        "fail" => {
            return Ok(json!({
                "content": [{"type": "text", "text": "tool failed on purpose"}],
                "isError": true
            }))
        }
        "slow" => {
            let ms = arguments["ms"].as_u64().unwrap_or(200);
            tokio::time::sleep(Duration::from_millis(ms)).await;
            format!("slept {ms}ms")
        }
        "notify" => {
            let _ = notify.send(JsonRpcMessage::Notification(JsonRpcNotification::new(
                methods::TOOLS_LIST_CHANGED,
                None,
            )));
            "notified".to_string()
        }
        other => return Err(invalid_params(format!("Unknown tool: {other}"))),
    };
    Ok(json!({"content": [{"type": "text", "text": text}], "isError": false}))
}

fn read_resource(params: &Value) -> Result<Value, JsonRpcError> {
    let uri = params["uri"]
        .as_str()
        .ok_or_else(|| invalid_params("uri is required"))?;
    let text = match uri.strip_prefix("mem://") {
        Some("greeting") => "Hello from tether".to_string(),
        Some(key) if !key.is_empty() => format!("value of {key}"),
        _ => return Err(invalid_params(format!("Unknown resource: {uri}"))),
    };
    Ok(json!({"contents": [{"uri": uri, "mimeType": "text/plain", "text": text}]}))
}

fn get_prompt(params: &Value) -> Result<Value, JsonRpcError> {
    if params["name"].as_str() != Some("greet") {
        return Err(invalid_params("Unknown prompt"));
    }
    let who = params["arguments"]["name"].as_str().unwrap_or("stranger");
    Ok(json!({
        "description": "Greeting",
        "messages": [{"role": "user", "content": {"type": "text", "text": format!("Say hello to {who}")}}]
    }))
}

fn invalid_params(message: impl Into<String>) -> JsonRpcError {
    JsonRpcError::new(error_codes::INVALID_PARAMS, message)
}
