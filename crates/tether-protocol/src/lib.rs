//! Wire protocol for the tether MCP client.
//!
//! - [`jsonrpc`]: JSON-RPC 2.0 requests, notifications, responses and the
//!   process-wide request id counter.
//! - [`codec`]: `Content-Length` framing for byte-stream channels.
//! - [`types`]: MCP payloads (tools, resources, prompts, initialize).

pub mod codec;
pub mod jsonrpc;
pub mod types;

pub use codec::{decode_body, decode_frames, encode_body, encode_frame, Decoded, FrameDecoder};
pub use jsonrpc::{
    error_codes, next_request_id, JsonRpcError, JsonRpcMessage, JsonRpcNotification,
    JsonRpcRequest, JsonRpcResponse, ResponsePayload, JSONRPC_VERSION,
};
pub use types::*;
