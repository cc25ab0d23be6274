//! Line-framed JSON request/response shapes (spec §3, §4.6).
//!
//! A request is exactly one JSON object terminated by `\n`. A `run` request
//! may produce zero or more `run_chunk` response lines followed by exactly
//! one `run_end` line; every other request produces exactly one response
//! line.

use serde::{Deserialize, Serialize};

/// A request frame sent by the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireRequest {
	pub token: String,
	#[serde(flatten)]
	pub kind: RequestKind,
}

impl WireRequest {
	pub fn ping(token: impl Into<String>) -> Self {
		Self {
			token: token.into(),
			kind: RequestKind::Ping,
		}
	}

	pub fn shutdown(token: impl Into<String>) -> Self {
		Self {
			token: token.into(),
			kind: RequestKind::Shutdown,
		}
	}

	pub fn run(token: impl Into<String>, argv: Vec<String>) -> Self {
		Self {
			token: token.into(),
			kind: RequestKind::Run { argv },
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequestKind {
	Ping,
	Shutdown,
	Run { argv: Vec<String> },
}

/// Which output stream a `run_chunk` carries bytes for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
	Stdout,
	Stderr,
}

/// The body of a successful response, tagged by `kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OkBody {
	Pong,
	Shutdown,
	RunChunk { stream: StreamKind, data: String },
	RunEnd { code: i32 },
}

/// A successful response line: `{ok: true, kind: ..., ...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkResponse {
	pub ok: bool,
	#[serde(flatten)]
	pub body: OkBody,
}

/// A failed response line: `{ok: false, code, message, ...}`.
///
/// Deliberately minimal on the token-mismatch path (§4.6): exactly
/// `{ok, code, message}`, no extra fields, so the shape is a stable subset
/// of this struct (the optional fields are simply omitted).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrResponse {
	pub ok: bool,
	pub code: String,
	pub message: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub retryable: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub phase: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub recovery: Option<String>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub hints: Vec<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub hint_context: Option<serde_json::Value>,
}

impl ErrResponse {
	pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			ok: false,
			code: code.into(),
			message: message.into(),
			retryable: None,
			phase: None,
			recovery: None,
			hints: Vec::new(),
			hint_context: None,
		}
	}

	pub fn retryable(mut self, retryable: bool) -> Self {
		self.retryable = Some(retryable);
		self
	}
}

/// A response frame: either a success body or a typed failure.
///
/// Deserialized with `#[serde(untagged)]`: the `Ok` variant requires a
/// `kind` field, which failure frames never carry, so the two shapes never
/// collide regardless of the `ok` value on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireResponse {
	Ok(OkResponse),
	Err(ErrResponse),
}

impl WireResponse {
	pub fn pong() -> Self {
		Self::Ok(OkResponse { ok: true, body: OkBody::Pong })
	}

	pub fn shutdown() -> Self {
		Self::Ok(OkResponse { ok: true, body: OkBody::Shutdown })
	}

	pub fn run_chunk(stream: StreamKind, data: String) -> Self {
		Self::Ok(OkResponse {
			ok: true,
			body: OkBody::RunChunk { stream, data },
		})
	}

	pub fn run_end(code: i32) -> Self {
		Self::Ok(OkResponse {
			ok: true,
			body: OkBody::RunEnd { code },
		})
	}

	pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
		Self::Err(ErrResponse::new(code, message))
	}

	pub fn is_ok(&self) -> bool {
		matches!(self, Self::Ok(_))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn ping_request_round_trips() {
		let req = WireRequest::ping("abc123");
		let line = serde_json::to_string(&req).unwrap();
		let back: WireRequest = serde_json::from_str(&line).unwrap();
		assert_eq!(back.token, "abc123");
		assert!(matches!(back.kind, RequestKind::Ping));
	}

	#[test]
	fn run_request_carries_argv() {
		let req = WireRequest::run("tok", vec!["open".into(), "https://example.com".into()]);
		let line = serde_json::to_string(&req).unwrap();
		let back: WireRequest = serde_json::from_str(&line).unwrap();
		match back.kind {
			RequestKind::Run { argv } => assert_eq!(argv, vec!["open", "https://example.com"]),
			other => panic!("expected Run, got {other:?}"),
		}
	}

	#[test]
	fn pong_serializes_as_ok_true_kind_pong() {
		let value = serde_json::to_value(WireResponse::pong()).unwrap();
		assert_eq!(value["ok"], true);
		assert_eq!(value["kind"], "pong");
	}

	#[test]
	fn token_invalid_error_has_minimal_shape() {
		let resp = WireResponse::error("E_DAEMON_TOKEN_INVALID", "token mismatch");
		let value = serde_json::to_value(&resp).unwrap();
		assert_eq!(value["ok"], false);
		assert_eq!(value["code"], "E_DAEMON_TOKEN_INVALID");
		assert!(value.get("kind").is_none());
		assert!(value.get("hints").is_none());
	}

	#[test]
	fn error_response_round_trips_through_untagged_enum() {
		let resp = WireResponse::Err(ErrResponse::new("E_DAEMON_QUEUE_TIMEOUT", "wait budget exceeded").retryable(true));
		let line = serde_json::to_string(&resp).unwrap();
		let back: WireResponse = serde_json::from_str(&line).unwrap();
		assert!(!back.is_ok());
	}

	#[test]
	fn run_chunk_round_trips_with_stream_tag() {
		let resp = WireResponse::run_chunk(StreamKind::Stdout, "hello".into());
		let line = serde_json::to_string(&resp).unwrap();
		let back: WireResponse = serde_json::from_str(&line).unwrap();
		match back {
			WireResponse::Ok(OkResponse { body: OkBody::RunChunk { stream, data }, .. }) => {
				assert_eq!(stream, StreamKind::Stdout);
				assert_eq!(data, "hello");
			}
			other => panic!("expected RunChunk, got {other:?}"),
		}
	}
}
