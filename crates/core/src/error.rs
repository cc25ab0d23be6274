use thiserror::Error;

/// Errors a handler can raise; the dispatcher maps these onto a `run_end`
/// exit code and, for wire-level failures, an `E_*` response code.
#[derive(Debug, Error)]
pub enum HandlerError {
	#[error("invalid input: {0}")]
	InvalidInput(String),

	#[error("session error: {0}")]
	Session(String),

	#[error(transparent)]
	Pool(#[from] surfwright_runtime::PoolError),

	#[error("internal error: {0}")]
	Internal(String),
}

impl HandlerError {
	/// Exit code a shell would see for this failure, matching the
	/// conventions of commands run directly (not through the daemon).
	pub fn exit_code(&self) -> i32 {
		match self {
			Self::InvalidInput(_) => 2,
			Self::Session(_) => 3,
			Self::Pool(_) => 4,
			Self::Internal(_) => 1,
		}
	}

	/// The daemon-level wire code to report when this error surfaces from a
	/// command run through the socket rather than invoked directly.
	pub fn wire_code(&self) -> surfwright_protocol::DaemonErrorCode {
		match self {
			Self::InvalidInput(_) => surfwright_protocol::DaemonErrorCode::RequestInvalid,
			Self::Session(_) => surfwright_protocol::DaemonErrorCode::SessionMismatch,
			Self::Pool(err) => surfwright_protocol::DaemonErrorCode::from(err),
			Self::Internal(_) => surfwright_protocol::DaemonErrorCode::Internal,
		}
	}
}
