//! Request-scoped context (spec §4.9): the redesign away from mutating
//! process-wide environment variables. Every accepted connection spawns its
//! own task, and `tokio::task_local!` storage is scoped to that task's
//! future — concurrent requests can never observe each other's overrides,
//! and leaving the scope restores whatever was visible before it.

use std::path::PathBuf;

use surfwright_handlers::OutputShape;

/// The request-local state a handler invocation runs inside.
#[derive(Debug, Clone)]
pub struct RequestScope {
	pub agent_id: Option<String>,
	pub workspace_dir: Option<PathBuf>,
	pub output_shape: OutputShape,
	pub debug_logs: bool,
	/// Set by a handler to override the process-visible exit code for this
	/// request only; read back by the dispatcher after the handler returns.
	pub exit_code: std::cell::Cell<Option<i32>>,
}

impl RequestScope {
	pub fn new() -> Self {
		Self {
			agent_id: None,
			workspace_dir: None,
			output_shape: OutputShape::Full,
			debug_logs: false,
			exit_code: std::cell::Cell::new(None),
		}
	}

	pub fn with_agent_id(mut self, agent_id: Option<String>) -> Self {
		self.agent_id = agent_id;
		self
	}

	pub fn with_workspace_dir(mut self, workspace_dir: Option<PathBuf>) -> Self {
		self.workspace_dir = workspace_dir;
		self
	}

	pub fn with_output_shape(mut self, output_shape: OutputShape) -> Self {
		self.output_shape = output_shape;
		self
	}

	pub fn with_debug_logs(mut self, debug_logs: bool) -> Self {
		self.debug_logs = debug_logs;
		self
	}
}

impl Default for RequestScope {
	fn default() -> Self {
		Self::new()
	}
}

tokio::task_local! {
	static SCOPE: RequestScope;
}

/// Pulls the request-scope overrides (`--agent-id`, `--workspace`,
/// `--output-shape`) out of a `run` request's argv and returns both the
/// scope they describe and the remaining argv with those tokens removed, so
/// the handler never sees global dispatch options (spec §4.8, §4.9).
pub fn extract_request_scope(argv: &[String]) -> (RequestScope, Vec<String>) {
	let mut scope = RequestScope::new();
	let mut remaining = Vec::with_capacity(argv.len());

	let mut iter = argv.iter().cloned().peekable();
	while let Some(token) = iter.next() {
		match token.as_str() {
			"--agent-id" => scope.agent_id = iter.next(),
			"--workspace" => scope.workspace_dir = iter.next().map(PathBuf::from),
			"--output-shape" => {
				scope.output_shape = match iter.next().as_deref() {
					Some("compact") => OutputShape::Compact,
					Some("proof") => OutputShape::Proof,
					_ => OutputShape::Full,
				}
			}
			_ => remaining.push(token),
		}
	}

	(scope, remaining)
}

/// Runs `fut` with `scope` installed as the ambient request context for the
/// duration of that future only. This is the only way to install a scope;
/// there is no process-global mutation to race on.
pub async fn with_scope<F, T>(scope: RequestScope, fut: F) -> T
where
	F: std::future::Future<Output = T>,
{
	SCOPE.scope(scope, fut).await
}

/// Reads a field out of the ambient scope. Panics if called outside
/// [`with_scope`] — every handler invocation is wrapped in one by the
/// dispatcher, so this is a programmer error, not a runtime condition.
pub fn get<T>(f: impl FnOnce(&RequestScope) -> T) -> T {
	SCOPE.with(f)
}

/// Sets this request's exit code override. Request-local: concurrent
/// requests each see their own `RequestScope::exit_code` cell.
pub fn set_exit_code(code: i32) {
	SCOPE.with(|scope| scope.exit_code.set(Some(code)));
}

pub fn take_exit_code() -> Option<i32> {
	SCOPE.with(|scope| scope.exit_code.take())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn concurrent_scopes_do_not_observe_each_other() {
		let a = with_scope(RequestScope::new().with_agent_id(Some("agent-a".into())), async {
			tokio::time::sleep(std::time::Duration::from_millis(20)).await;
			get(|scope| scope.agent_id.clone())
		});
		let b = with_scope(RequestScope::new().with_agent_id(Some("agent-b".into())), async {
			get(|scope| scope.agent_id.clone())
		});

		let (a, b) = tokio::join!(a, b);
		assert_eq!(a, Some("agent-a".into()));
		assert_eq!(b, Some("agent-b".into()));
	}

	#[tokio::test]
	async fn exit_code_is_request_local() {
		let a = with_scope(RequestScope::new(), async {
			set_exit_code(7);
			take_exit_code()
		});
		let b = with_scope(RequestScope::new(), async { take_exit_code() });

		let (a, b) = tokio::join!(a, b);
		assert_eq!(a, Some(7));
		assert_eq!(b, None);
	}

	#[test]
	fn extract_request_scope_pulls_overrides_out_of_argv() {
		let argv: Vec<String> = ["echo", "--agent-id", "agent-a", "--output-shape", "compact", "hello"].iter().map(|s| s.to_string()).collect();
		let (scope, remaining) = extract_request_scope(&argv);
		assert_eq!(scope.agent_id.as_deref(), Some("agent-a"));
		assert_eq!(scope.output_shape, OutputShape::Compact);
		assert_eq!(remaining, vec!["echo".to_string(), "hello".to_string()]);
	}

	#[test]
	fn extract_request_scope_defaults_when_absent() {
		let argv: Vec<String> = ["ping"].iter().map(|s| s.to_string()).collect();
		let (scope, remaining) = extract_request_scope(&argv);
		assert_eq!(scope.agent_id, None);
		assert_eq!(remaining, vec!["ping".to_string()]);
	}
}
