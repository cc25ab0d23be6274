//! The command handler contract.
//!
//! Everything upstream of this crate — argv normalization, lane scheduling,
//! session leasing, transport framing — is generic over *what* a command
//! actually does. A [`Handler`] is the seam where that generic machinery
//! hands off to command-specific logic: driving a browser tab, reading a
//! page, running a script. This crate defines the contract and a handful
//! of always-available stub handlers (`ping`, `contract`, `echo`,
//! `session.status`); real browser-automation handlers are out of scope
//! here and register against the same trait from their own crate.

pub mod context;
pub mod error;
pub mod registry;
pub mod stubs;

pub use context::HandlerContext;
pub use error::HandlerError;
pub use registry::HandlerRegistry;

use async_trait::async_trait;

/// The result of running one command to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerOutcome {
	pub exit_code: i32,
	pub stdout: String,
	pub stderr: String,
}

impl HandlerOutcome {
	pub fn ok(stdout: impl Into<String>) -> Self {
		Self {
			exit_code: 0,
			stdout: stdout.into(),
			stderr: String::new(),
		}
	}

	pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
		Self {
			exit_code,
			stdout: String::new(),
			stderr: stderr.into(),
		}
	}
}

/// Implemented by anything the dispatcher can route an argv vector to.
///
/// `argv` has already had its leading program name stripped and any
/// dot-alias rewritten to its canonical form; `ctx` carries the per-request
/// identity the handler needs (agent id, workspace dir, a lease on the
/// session runtime pool when the command's lane is `session:<id>`-scoped).
#[async_trait]
pub trait Handler: Send + Sync {
	async fn run(&self, argv: &[String], ctx: &HandlerContext) -> Result<HandlerOutcome, HandlerError>;
}
