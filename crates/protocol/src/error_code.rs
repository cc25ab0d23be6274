//! The fixed taxonomy of errors the daemon itself (not a command handler)
//! can produce. Handler-originated codes (`E_URL_INVALID`, `E_TARGET_NOT_FOUND`,
//! ...) are not enumerated here — they pass through the wire as opaque
//! strings written by the handler.

use std::fmt;

/// Errors produced by the transport, scheduler, or runtime pool layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonErrorCode {
	/// Shared-secret token on the request did not match the daemon's.
	TokenInvalid,
	/// Frame was blank, non-JSON, an unknown `kind`, or oversized.
	RequestInvalid,
	/// Lane wait budget elapsed before the task was dispatched.
	QueueTimeout,
	/// Lane `pending + active` reached `depthCap` at enqueue time.
	QueueSaturated,
	/// Internal transport/scheduler failure; never a handler error.
	RunFailed,
	/// A `session:<id>` lane was asked to authorize a second CDP origin.
	SessionMismatch,
	/// Catch-all for anything that doesn't fit another variant.
	Internal,
}

impl DaemonErrorCode {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::TokenInvalid => "E_DAEMON_TOKEN_INVALID",
			Self::RequestInvalid => "E_DAEMON_REQUEST_INVALID",
			Self::QueueTimeout => "E_DAEMON_QUEUE_TIMEOUT",
			Self::QueueSaturated => "E_DAEMON_QUEUE_SATURATED",
			Self::RunFailed => "E_DAEMON_RUN_FAILED",
			Self::SessionMismatch => "E_RUNTIME_POOL_SESSION_MISMATCH",
			Self::Internal => "E_INTERNAL",
		}
	}

	/// Whether a client may retry a request that failed with this code.
	pub const fn retryable(self) -> bool {
		matches!(self, Self::QueueTimeout | Self::QueueSaturated)
	}
}

impl fmt::Display for DaemonErrorCode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn queue_pressure_codes_are_retryable() {
		assert!(DaemonErrorCode::QueueTimeout.retryable());
		assert!(DaemonErrorCode::QueueSaturated.retryable());
	}

	#[test]
	fn other_codes_are_not_retryable() {
		assert!(!DaemonErrorCode::TokenInvalid.retryable());
		assert!(!DaemonErrorCode::RequestInvalid.retryable());
		assert!(!DaemonErrorCode::RunFailed.retryable());
		assert!(!DaemonErrorCode::SessionMismatch.retryable());
		assert!(!DaemonErrorCode::Internal.retryable());
	}

	#[test]
	fn display_matches_wire_string() {
		assert_eq!(DaemonErrorCode::TokenInvalid.to_string(), "E_DAEMON_TOKEN_INVALID");
		assert_eq!(DaemonErrorCode::QueueSaturated.to_string(), "E_DAEMON_QUEUE_SATURATED");
	}
}
