//! The daemon/client error taxonomy (spec §7), plus the `Result` alias used
//! throughout this crate.

use thiserror::Error;

use surfwright_protocol::DaemonErrorCode;

pub type Result<T> = std::result::Result<T, CliError>;

/// Everything that can go wrong inside the dispatcher, scheduler, transport,
/// or lifecycle controller. Handler-originated failures are *not* modeled
/// here — they cross the worker boundary as opaque strings written by the
/// handler itself (spec §4.7, §7).
#[derive(Debug, Error)]
pub enum CliError {
	#[error("token mismatch")]
	TokenInvalid,

	#[error("malformed request: {0}")]
	RequestInvalid(String),

	#[error("queue wait budget exceeded for lane '{lane_key}'")]
	QueueTimeout { lane_key: String },

	#[error("lane '{lane_key}' is at its queue depth cap")]
	QueueSaturated { lane_key: String },

	#[error("session '{key}' is bound to a different origin")]
	SessionMismatch { key: String },

	#[error("daemon run failed: {0}")]
	RunFailed(String),

	#[error(transparent)]
	Pool(#[from] surfwright_runtime::PoolError),

	#[error("io error: {0}")]
	Io(#[from] std::io::Error),

	#[error("json error: {0}")]
	Json(#[from] serde_json::Error),

	#[error("{0}")]
	Internal(String),
}

impl CliError {
	/// The wire error code (`E_*`) this maps to.
	pub fn code(&self) -> DaemonErrorCode {
		match self {
			Self::TokenInvalid => DaemonErrorCode::TokenInvalid,
			Self::RequestInvalid(_) => DaemonErrorCode::RequestInvalid,
			Self::QueueTimeout { .. } => DaemonErrorCode::QueueTimeout,
			Self::QueueSaturated { .. } => DaemonErrorCode::QueueSaturated,
			Self::SessionMismatch { .. } => DaemonErrorCode::SessionMismatch,
			Self::Pool(err) => DaemonErrorCode::from(err),
			Self::RunFailed(_) | Self::Io(_) | Self::Json(_) | Self::Internal(_) => DaemonErrorCode::RunFailed,
		}
	}

	/// Whether a client may retry this failure (queue-pressure codes only).
	pub fn retryable(&self) -> bool {
		self.code().retryable()
	}
}
