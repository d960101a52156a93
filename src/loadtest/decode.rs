//! Safe JSON decoding of transport responses.
//!
//! [`decode`] never fails the caller: malformed bodies come back as
//! [`DecodedPayload::DecodeFailed`] and produce a `warn` diagnostic that
//! carries at most [`BODY_PREVIEW_BYTES`] bytes of the raw body.

use bytes::Bytes;
use serde_json::Value;
use std::time::Duration;

/// Maximum number of body bytes quoted in decode diagnostics.
pub const BODY_PREVIEW_BYTES: usize = 100;

/// A response as produced by the transport. Immutable once received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// HTTP status code.
    pub status: u16,
    /// Raw response body.
    pub body: Bytes,
    /// Time from sending the request to receiving the full body.
    pub timing: Duration,
}

impl Response {
    /// Creates a response from its parts.
    pub fn new(status: u16, body: impl Into<Bytes>, timing: Duration) -> Self {
        Self {
            status,
            body: body.into(),
            timing,
        }
    }
}

/// Outcome of decoding a response body.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedPayload {
    /// The body was valid JSON.
    Decoded(Value),
    /// The body could not be decoded; carries a human-readable reason.
    DecodeFailed(String),
}

impl DecodedPayload {
    /// Returns `true` if decoding succeeded.
    pub fn is_decoded(&self) -> bool {
        matches!(self, Self::Decoded(_))
    }

    /// Returns the decoded value, if any.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Decoded(value) => Some(value),
            Self::DecodeFailed(_) => None,
        }
    }

    /// Returns `true` if the payload is an object containing every field in `fields`.
    pub fn has_fields(&self, fields: &[&str]) -> bool {
        match self.value() {
            Some(Value::Object(map)) => fields.iter().all(|f| map.contains_key(*f)),
            _ => false,
        }
    }

    /// Returns `true` if the payload is a non-empty JSON array.
    pub fn is_non_empty_array(&self) -> bool {
        matches!(self.value(), Some(Value::Array(items)) if !items.is_empty())
    }
}

/// Lossy UTF-8 preview of the first [`BODY_PREVIEW_BYTES`] bytes of `body`.
pub fn body_preview(body: &[u8]) -> String {
    let end = body.len().min(BODY_PREVIEW_BYTES);
    String::from_utf8_lossy(&body[..end]).into_owned()
}

/// Decode a response body as JSON regardless of its status.
pub fn decode(response: &Response) -> DecodedPayload {
    match serde_json::from_slice::<Value>(&response.body) {
        Ok(value) => DecodedPayload::Decoded(value),
        Err(err) => {
            tracing::warn!(
                status = response.status,
                body = %body_preview(&response.body),
                "Failed to parse JSON: {err}"
            );
            DecodedPayload::DecodeFailed(err.to_string())
        },
    }
}

/// Validate and decode a response that is expected to be a `200` JSON document.
///
/// Fails with a reason prefixed by `context` when no response was received,
/// when the status is not `200`, or when the body is not JSON.
pub fn validate_json_response(response: Option<&Response>, context: &str) -> DecodedPayload {
    let Some(response) = response else {
        tracing::warn!("{context}: No response received");
        return DecodedPayload::DecodeFailed(format!("{context}: no response received"));
    };

    if response.status != 200 {
        tracing::warn!("{context}: Status {}", response.status);
        return DecodedPayload::DecodeFailed(format!("{context}: status {}", response.status));
    }

    match decode(response) {
        DecodedPayload::DecodeFailed(reason) => {
            DecodedPayload::DecodeFailed(format!("{context}: invalid JSON ({reason})"))
        },
        decoded => decoded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, body: &'static str) -> Response {
        Response::new(status, body, Duration::from_millis(5))
    }

    #[test]
    fn test_decode_object() {
        let payload = decode(&response(200, r#"{"name":"Leanne","email":"a@b.c"}"#));
        assert!(payload.is_decoded());
        assert!(payload.has_fields(&["name", "email"]));
        assert!(!payload.has_fields(&["phone"]));
    }

    #[test]
    fn test_decode_ignores_status() {
        let payload = decode(&response(500, r#"{"error":"boom"}"#));
        assert!(payload.is_decoded());
    }

    #[test]
    fn test_decode_malformed_returns_marker() {
        let payload = decode(&response(200, "<html>oops</html>"));
        assert!(matches!(payload, DecodedPayload::DecodeFailed(_)));
        assert!(payload.value().is_none());
    }

    #[test]
    fn test_decode_truncated_json() {
        let payload = decode(&response(200, r#"[{"id":1},{"id""#));
        assert!(!payload.is_decoded());
        assert!(!payload.is_non_empty_array());
    }

    #[test]
    fn test_decode_empty_body() {
        assert!(!decode(&response(200, "")).is_decoded());
    }

    #[test]
    fn test_non_empty_array() {
        assert!(decode(&response(200, "[1,2]")).is_non_empty_array());
        assert!(!decode(&response(200, "[]")).is_non_empty_array());
        assert!(!decode(&response(200, r#"{"a":1}"#)).is_non_empty_array());
    }

    #[test]
    fn test_has_fields_on_array_is_false() {
        assert!(!decode(&response(200, "[]")).has_fields(&["name"]));
    }

    #[test]
    fn test_body_preview_is_bounded() {
        let body = "x".repeat(500);
        assert_eq!(body_preview(body.as_bytes()).len(), BODY_PREVIEW_BYTES);
        assert_eq!(body_preview(b"short"), "short");
    }

    #[test]
    fn test_body_preview_splits_multibyte_lossily() {
        // 99 ASCII bytes followed by a 2-byte character straddling the cut.
        let mut body = "a".repeat(99);
        body.push('é');
        let preview = body_preview(body.as_bytes());
        assert!(preview.starts_with(&"a".repeat(99)));
        assert!(preview.ends_with('\u{FFFD}'));
    }

    #[test]
    fn test_validate_json_response_missing() {
        let payload = validate_json_response(None, "GetUser");
        match payload {
            DecodedPayload::DecodeFailed(reason) => {
                assert_eq!(reason, "GetUser: no response received")
            },
            other => panic!("Expected DecodeFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_json_response_bad_status() {
        let resp = response(404, r#"{"error":"not found"}"#);
        match validate_json_response(Some(&resp), "GetPosts") {
            DecodedPayload::DecodeFailed(reason) => assert_eq!(reason, "GetPosts: status 404"),
            other => panic!("Expected DecodeFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_json_response_invalid_json() {
        let resp = response(200, "not json");
        match validate_json_response(Some(&resp), "GetComments") {
            DecodedPayload::DecodeFailed(reason) => {
                assert!(reason.starts_with("GetComments: invalid JSON"))
            },
            other => panic!("Expected DecodeFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_json_response_ok() {
        let resp = response(200, r#"[{"id":1}]"#);
        assert!(validate_json_response(Some(&resp), "GetComments").is_non_empty_array());
    }
}
