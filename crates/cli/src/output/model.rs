//! The result envelope every command prints to stdout (spec §6, §7): a
//! single deterministic JSON record, `ok:true` with a payload or `ok:false`
//! with a typed failure.

use serde::{Deserialize, Serialize};

/// Current schema version for command output.
pub const SCHEMA_VERSION: u32 = 1;

/// The envelope returned by every command, whether run locally or relayed
/// through the daemon. `data` carries whatever JSON value the handler
/// produced; an opaque (non-JSON) stdout string is wrapped in a JSON string.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
	pub schema_version: u32,
	pub ok: bool,
	pub command: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub data: Option<serde_json::Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<CommandError>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub duration_ms: Option<u64>,
}

/// The `{code, message, retryable?, phase?, recovery?, hints?, hintContext?}`
/// failure shape from §3/§7, shared between locally-rendered and
/// daemon-relayed failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandError {
	pub code: String,
	pub message: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub retryable: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub phase: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub recovery: Option<String>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub hints: Vec<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub hint_context: Option<serde_json::Value>,
}

impl CommandError {
	pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
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
