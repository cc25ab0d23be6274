use std::path::PathBuf;
use std::sync::Arc;

use surfwright_runtime::SessionRuntimePool;

/// The `OUTPUT_SHAPE` request-context override (spec §3, §6): how far a
/// success payload is narrowed before it reaches the wire. Orthogonal to
/// the CLI's presentation format (`--no-json`/`--pretty`), which lives in
/// `surfwright-cli::output` and is applied after this projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputShape {
	/// Every field a handler produces.
	#[default]
	Full,
	/// A narrowed subset sufficient for an agent to act on.
	Compact,
	/// Pass/fail plus the minimum evidence needed to trust it.
	Proof,
}

/// Per-invocation identity and resources threaded into a handler.
///
/// Built fresh for every request; nothing here is shared mutable state
/// except the pool handle, which is a cheap `Arc` clone.
#[derive(Clone)]
pub struct HandlerContext {
	pub agent_id: Option<String>,
	pub workspace_dir: PathBuf,
	pub output_shape: OutputShape,
	pub debug_logs: bool,
	pub pool: Arc<SessionRuntimePool>,
}

impl HandlerContext {
	pub fn new(workspace_dir: PathBuf, pool: Arc<SessionRuntimePool>) -> Self {
		Self {
			agent_id: None,
			workspace_dir,
			output_shape: OutputShape::default(),
			debug_logs: false,
			pool,
		}
	}

	pub fn with_agent_id(mut self, agent_id: impl Into<String>) -> Self {
		self.agent_id = Some(agent_id.into());
		self
	}

	pub fn with_output_shape(mut self, shape: OutputShape) -> Self {
		self.output_shape = shape;
		self
	}

	pub fn with_debug_logs(mut self, debug_logs: bool) -> Self {
		self.debug_logs = debug_logs;
		self
	}
}
