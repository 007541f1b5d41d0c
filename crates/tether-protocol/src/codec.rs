//! `Content-Length` framing for byte streams that carry no message boundary.
//!
//! ```text
//! Content-Length: 47\r\n
//! \r\n
//! {"jsonrpc":"2.0","method":"ping","id":1}
//! ```

use crate::jsonrpc::{error_codes, JsonRpcMessage};
use tether_core::{TetherError, TetherResult};

/// Separates the header block from the body.
pub const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Frames declaring a larger body are rejected instead of buffered.
pub const MAX_BODY_LEN: usize = 64 * 1024 * 1024;

/// Serialize a message to its bare JSON body.
pub fn encode_body(message: &JsonRpcMessage) -> TetherResult<Vec<u8>> {
    Ok(serde_json::to_vec(message)?)
}

/// Parse one bare JSON body.
///
/// Invalid JSON yields a `PARSE_ERROR` protocol error; valid JSON of the
/// wrong shape yields `INVALID_REQUEST`.
pub fn decode_body(body: &[u8]) -> TetherResult<JsonRpcMessage> {
    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|e| TetherError::Protocol {
            code: error_codes::PARSE_ERROR,
            message: format!("invalid JSON body: {e}"),
        })?;
    JsonRpcMessage::from_value(value)
}

/// Serialize a message with its `Content-Length` header.
///
/// The declared length is the byte length of the UTF-8 body.
pub fn encode_frame(message: &JsonRpcMessage) -> TetherResult<Vec<u8>> {
    let body = encode_body(message)?;
    let mut frame = format!("Content-Length: {}\r\n\r\n", body.len()).into_bytes();
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Result of scanning a buffer for frames.
#[derive(Debug, Default)]
pub struct Decoded {
    /// Every complete message, in arrival order.
    pub messages: Vec<JsonRpcMessage>,
    /// Frames that were consumed but could not be decoded.
    pub errors: Vec<TetherError>,
    /// Bytes belonging to a frame that is not complete yet.
    pub remainder: Vec<u8>,
}

/// Extract every complete frame from `buffer`.
///
/// When the first header is unterminated or its body is short, no message
/// is returned and the whole input comes back as the remainder. Broken
/// frames are skipped and reported in [`Decoded::errors`] so that a single
/// bad message never stalls the stream.
pub fn decode_frames(buffer: &[u8]) -> Decoded {
    let mut decoded = Decoded::default();
    let mut offset = 0;

    while let Some(header_len) = find_terminator(&buffer[offset..]) {
        let header = &buffer[offset..offset + header_len];
        let body_start = offset + header_len + HEADER_TERMINATOR.len();

        let length = match content_length(header) {
            Ok(length) => length,
            Err(e) => {
                decoded.errors.push(e);
                offset = body_start;
                continue;
            }
        };

        let body_end = body_start + length;
        if buffer.len() < body_end {
            break;
        }

        match decode_body(&buffer[body_start..body_end]) {
            Ok(message) => decoded.messages.push(message),
            Err(e) => decoded.errors.push(e),
        }
        offset = body_end;
    }

    decoded.remainder = buffer[offset..].to_vec();
    decoded
}

/// Incremental decoder that keeps partial frames between reads.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return whatever became complete.
    ///
    /// The returned [`Decoded::remainder`] is always empty; the decoder
    /// keeps it for the next call.
    pub fn push(&mut self, chunk: &[u8]) -> Decoded {
        self.buffer.extend_from_slice(chunk);
        let mut decoded = decode_frames(&self.buffer);
        self.buffer = std::mem::take(&mut decoded.remainder);
        decoded
    }

    /// Bytes waiting for the rest of their frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

fn find_terminator(haystack: &[u8]) -> Option<usize> {
    haystack
        .windows(HEADER_TERMINATOR.len())
        .position(|w| w == HEADER_TERMINATOR)
}

fn content_length(header: &[u8]) -> TetherResult<usize> {
    let text = std::str::from_utf8(header).map_err(|_| parse_error("header is not valid UTF-8"))?;

    for line in text.split("\r\n") {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if !name.trim().eq_ignore_ascii_case("content-length") {
            continue;
        }
        let length: usize = value
            .trim()
            .parse()
            .map_err(|_| parse_error(format!("invalid Content-Length '{}'", value.trim())))?;
        if length > MAX_BODY_LEN {
            return Err(parse_error(format!(
                "Content-Length {length} exceeds limit of {MAX_BODY_LEN} bytes"
            )));
        }
        return Ok(length);
    }

    Err(parse_error("missing Content-Length header"))
}

fn parse_error(message: impl Into<String>) -> TetherError {
    TetherError::Protocol {
        code: error_codes::PARSE_ERROR,
        message: message.into(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::jsonrpc::{JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
    use serde_json::json;

    fn sample_messages() -> Vec<JsonRpcMessage> {
        vec![
            JsonRpcRequest::new(1, "tools/call", Some(json!({"name": "echo", "arguments": {"text": "héllo ✓"}}))).into(),
            JsonRpcNotification::new("notifications/initialized", None).into(),
            JsonRpcResponse::success(2, json!({"tools": []})).into(),
            JsonRpcResponse::error(Some(3), JsonRpcError::new(error_codes::INTERNAL_ERROR, "kaput")).into(),
        ]
    }

    #[test]
    fn test_header_counts_bytes_not_chars() {
        let msg: JsonRpcMessage =
            JsonRpcNotification::new("note", Some(json!({"text": "ünïcødé"}))).into();
        let frame = encode_frame(&msg).unwrap();
        let body = encode_body(&msg).unwrap();
        let header = format!("Content-Length: {}\r\n\r\n", body.len());
        assert!(frame.starts_with(header.as_bytes()));
        assert_ne!(body.len(), String::from_utf8(body.clone()).unwrap().chars().count());
    }

    #[test]
    fn test_round_trip() {
        for msg in sample_messages() {
            let decoded = decode_frames(&encode_frame(&msg).unwrap());
            assert_eq!(decoded.messages, vec![msg]);
            assert!(decoded.remainder.is_empty());
            assert!(decoded.errors.is_empty());
        }
    }

    #[test]
    fn test_partial_frame_at_every_offset() {
        let msg = sample_messages().remove(0);
        let frame = encode_frame(&msg).unwrap();
        for split in 1..frame.len() {
            let (head, tail) = frame.split_at(split);
            let first = decode_frames(head);
            assert!(first.messages.is_empty(), "split at {split}");
            assert_eq!(first.remainder, head);

            let mut rest = first.remainder.clone();
            rest.extend_from_slice(tail);
            let second = decode_frames(&rest);
            assert_eq!(second.messages, vec![msg.clone()]);
            assert!(second.remainder.is_empty());
        }
    }

    #[test]
    fn test_multiple_messages_in_one_buffer() {
        let messages = sample_messages();
        let mut buffer = Vec::new();
        for msg in &messages {
            buffer.extend(encode_frame(msg).unwrap());
        }
        let decoded = decode_frames(&buffer);
        assert_eq!(decoded.messages, messages);
        assert!(decoded.remainder.is_empty());
    }

    #[test]
    fn test_trailing_partial_frame_is_remainder() {
        let messages = sample_messages();
        let mut buffer = encode_frame(&messages[0]).unwrap();
        let second = encode_frame(&messages[1]).unwrap();
        buffer.extend_from_slice(&second[..10]);

        let decoded = decode_frames(&buffer);
        assert_eq!(decoded.messages.len(), 1);
        assert_eq!(decoded.remainder, &second[..10]);
    }

    #[test]
    fn test_invalid_json_body_is_skipped_and_reported() {
        let mut buffer = b"Content-Length: 5\r\n\r\n{oops".to_vec();
        buffer.extend(encode_frame(&sample_messages()[1]).unwrap());

        let decoded = decode_frames(&buffer);
        assert_eq!(decoded.messages.len(), 1);
        assert_eq!(decoded.errors.len(), 1);
        assert!(matches!(
            decoded.errors[0],
            TetherError::Protocol { code: error_codes::PARSE_ERROR, .. }
        ));
    }

    #[test]
    fn test_missing_content_length_is_reported() {
        let mut buffer = b"Content-Type: application/json\r\n\r\n".to_vec();
        buffer.extend(encode_frame(&sample_messages()[1]).unwrap());
        let decoded = decode_frames(&buffer);
        assert_eq!(decoded.errors.len(), 1);
        assert_eq!(decoded.messages.len(), 1);
    }

    #[test]
    fn test_header_name_is_case_insensitive_and_extra_headers_ignored() {
        let body = br#"{"jsonrpc":"2.0","method":"ping"}"#;
        let mut buffer = format!(
            "content-type: application/vscode-jsonrpc\r\ncontent-length: {}\r\n\r\n",
            body.len()
        )
        .into_bytes();
        buffer.extend_from_slice(body);
        let decoded = decode_frames(&buffer);
        assert_eq!(decoded.messages.len(), 1);
    }

    #[test]
    fn test_valid_json_wrong_shape_is_invalid_request() {
        let body = br#"{"jsonrpc":"2.0","id":1}"#;
        let mut buffer = format!("Content-Length: {}\r\n\r\n", body.len()).into_bytes();
        buffer.extend_from_slice(body);
        let decoded = decode_frames(&buffer);
        assert!(matches!(
            decoded.errors[0],
            TetherError::Protocol { code: error_codes::INVALID_REQUEST, .. }
        ));
    }

    #[test]
    fn test_oversized_declared_length_rejected() {
        let buffer = format!("Content-Length: {}\r\n\r\n", MAX_BODY_LEN + 1).into_bytes();
        let decoded = decode_frames(&buffer);
        assert_eq!(decoded.errors.len(), 1);
        assert!(decoded.remainder.is_empty());
    }

    #[test]
    fn test_frame_decoder_byte_by_byte() {
        let messages = sample_messages();
        let mut stream = Vec::new();
        for msg in &messages {
            stream.extend(encode_frame(msg).unwrap());
        }

        let mut decoder = FrameDecoder::new();
        let mut out = Vec::new();
        for byte in stream {
            out.extend(decoder.push(&[byte]).messages);
        }
        assert_eq!(out, messages);
        assert_eq!(decoder.buffered(), 0);
    }
}
