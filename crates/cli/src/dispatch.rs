//! Argv normalization (spec §6) and top-level routing (spec §4.8 step 1–3):
//! the glue between the raw trailing argv `cli.rs` parses and either local
//! in-process execution or the daemon client proxy.

use std::path::PathBuf;
use std::sync::Arc;

use surfwright_handlers::{HandlerContext, HandlerRegistry};
use surfwright_runtime::SessionRuntimePool;

use crate::config::ClientConfig;
use crate::context::{self};
use crate::output;
use crate::transport::{ClientProxy, DaemonWorker};

/// Rewrites a leading `--` separator away and expands a dot-alias command
/// head into its space-separated form. Idempotent (spec §8): re-normalizing
/// already-normalized argv is a no-op, since the rewritten head no longer
/// contains a dot and the leading `--` is already gone.
pub fn normalize_argv(argv: &[String]) -> Vec<String> {
	rewrite_dot_alias(&strip_leading_double_dash(argv))
}

fn strip_leading_double_dash(argv: &[String]) -> Vec<String> {
	match argv.first().map(String::as_str) {
		Some("--") => argv[1..].to_vec(),
		_ => argv.to_vec(),
	}
}

fn rewrite_dot_alias(argv: &[String]) -> Vec<String> {
	let Some(head) = argv.first() else { return Vec::new() };
	if head.contains('.') && crate::commands::lookup_command(head).is_some() {
		let mut rewritten: Vec<String> = head.split('.').map(str::to_string).collect();
		rewritten.extend(argv[1..].iter().cloned());
		return rewritten;
	}
	argv.to_vec()
}

/// A command the client proxy runs locally without ever contacting the
/// daemon (spec §4.8 step 3, glossary "bypass class").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BypassClass {
	InternalWorker,
	ContractOnly,
	Streaming,
	Skill,
	PlanFromStdin,
	DaemonControl,
}

/// Classifies a normalized argv against the bypass classes. `None` means the
/// invocation should go through the daemon client proxy.
pub fn classify_bypass(argv: &[String]) -> Option<BypassClass> {
	let head = argv.first()?.as_str();
	match head {
		"__network-worker" | "__daemon-worker" => return Some(BypassClass::InternalWorker),
		"contract" => return Some(BypassClass::ContractOnly),
		"console-tail" | "network-tail" => return Some(BypassClass::Streaming),
		"skill" => return Some(BypassClass::Skill),
		"daemon" => return Some(BypassClass::DaemonControl),
		_ => {}
	}
	if head == "run" && has_stdin_plan(argv) {
		return Some(BypassClass::PlanFromStdin);
	}
	None
}

fn has_stdin_plan(argv: &[String]) -> bool {
	argv.windows(2).any(|pair| pair[0] == "--plan" && pair[1] == "-")
}

/// Resolves the matched command name out of `argv`, preferring a two-token
/// dotted form (`session status` → `session.status`) before a single token,
/// and returns it with the rest of the argv the handler receives.
pub fn resolve_command_name(argv: &[String]) -> (String, Vec<String>) {
	if argv.len() >= 2 {
		let dotted = format!("{}.{}", argv[0], argv[1]);
		if crate::commands::lookup_command(&dotted).is_some() {
			return (dotted, argv[2..].to_vec());
		}
	}
	if let Some(first) = argv.first() {
		if crate::commands::lookup_command(first).is_some() {
			return (first.clone(), argv[1..].to_vec());
		}
	}
	(argv.first().cloned().unwrap_or_default(), argv.get(1..).map(<[String]>::to_vec).unwrap_or_default())
}

/// Runs one normalized argv to completion in-process, with no lane
/// scheduling — used both for bypass-class commands and for the client
/// proxy's local fallback (spec §4.8). There is only one caller in this
/// process, so there is no contention to serialize against.
pub async fn run_locally(argv: &[String], registry: &HandlerRegistry, pool: &Arc<SessionRuntimePool>, default_workspace: &PathBuf) -> (String, i32) {
	let (scope, remaining) = context::extract_request_scope(argv);
	let (command_name, command_args) = resolve_command_name(&remaining);
	let registry_scope = scope.clone();
	let output_shape = scope.output_shape;

	let result = context::with_scope(scope, async move {
		match registry.get(&command_name) {
			None => output::render_dispatch_error(&command_name, "E_DAEMON_REQUEST_INVALID", format!("unknown command '{command_name}'")),
			Some(handler) => {
				let ctx = HandlerContext::new(registry_scope.workspace_dir.clone().unwrap_or_else(|| default_workspace.clone()), Arc::clone(pool))
					.with_output_shape(registry_scope.output_shape)
					.with_debug_logs(registry_scope.debug_logs);
				let ctx = match &registry_scope.agent_id {
					Some(agent_id) => ctx.with_agent_id(agent_id.clone()),
					None => ctx,
				};
				match handler.run(&command_args, &ctx).await {
					Ok(outcome) => output::render_outcome(&command_name, &outcome),
					Err(err) => output::render_handler_error(&command_name, &err),
				}
			}
		}
	})
	.await;

	let exit_code = if result.ok { 0 } else { 1 };
	let projected = output::project(&result, output_shape);
	let stdout = serde_json::to_string(&projected).unwrap_or_default();
	(stdout, exit_code)
}

/// Top-level entry point (spec §4.8): normalizes argv, recognizes the
/// internal `__daemon-worker` entrypoint and the other bypass classes plus
/// hard-off, and otherwise relays through the daemon client proxy — falling
/// back to local execution if the daemon is unreachable. Returns the
/// rendered envelope string and the process exit code.
pub async fn dispatch(raw_argv: Vec<String>, config: ClientConfig, registry: Arc<HandlerRegistry>, pool: Arc<SessionRuntimePool>) -> (String, i32) {
	let argv = normalize_argv(&raw_argv);

	if argv.first().map(String::as_str) == Some("__daemon-worker") {
		return run_daemon_worker_foreground(&argv, registry).await;
	}

	let bypass = classify_bypass(&argv);
	if bypass == Some(BypassClass::DaemonControl) {
		return run_daemon_control(&argv, &config, registry).await;
	}

	let default_workspace = config.workspace_dir.clone().unwrap_or_else(|| config.state_dir.clone());

	let locally_bypassed = bypass.is_some() || matches!(config.daemon_mode, crate::config::DaemonMode::Off);
	if locally_bypassed {
		return run_locally(&argv, &registry, &pool, &default_workspace).await;
	}

	let proxy = ClientProxy::new(config.clone());
	match proxy.dispatch(argv.clone()).await {
		Ok((stdout, exit_code)) => (stdout, exit_code),
		Err(_unreachable) => run_locally(&argv, &registry, &pool, &default_workspace).await,
	}
}

/// The `__daemon-worker` entrypoint (spec §4.2): the detached process the
/// client proxy spawns. `argv[1]` is the namespace root to bind metadata and
/// diagnostics under; this process blocks in [`DaemonWorker::run_foreground`]
/// until idle shutdown or a client `shutdown` request.
async fn run_daemon_worker_foreground(argv: &[String], registry: Arc<HandlerRegistry>) -> (String, i32) {
	let Some(namespace_root) = argv.get(1).map(PathBuf::from) else {
		let result = output::render_dispatch_error("__daemon-worker", "E_DAEMON_REQUEST_INVALID", "missing namespace root argument");
		return (serde_json::to_string(&result).unwrap_or_default(), 1);
	};

	let daemon_config = crate::config::DaemonConfig::from_env(namespace_root.clone());
	let worker = DaemonWorker::new(daemon_config, registry);

	match worker.run_foreground(namespace_root).await {
		Ok(()) => {
			let result = output::ResultBuilder::new("__daemon-worker").data(serde_json::json!({ "exited": true })).build();
			(serde_json::to_string(&result).unwrap_or_default(), 0)
		}
		Err(err) => {
			let result = output::render_dispatch_error("__daemon-worker", "E_DAEMON_RUN_FAILED", err.to_string());
			(serde_json::to_string(&result).unwrap_or_default(), 1)
		}
	}
}

/// `daemon start`/`daemon stop`/`daemon status` (spec §3 supplemented
/// feature): these control the daemon lifecycle itself, so they never go
/// through the handler registry or the daemon's own request queue — they
/// talk to the lifecycle metadata/start-lock state directly via the same
/// [`ClientProxy`] the ordinary command path uses to find-or-start a daemon.
async fn run_daemon_control(argv: &[String], config: &ClientConfig, registry: Arc<HandlerRegistry>) -> (String, i32) {
	let Some(sub) = argv.get(1).map(String::as_str) else {
		let result = output::render_dispatch_error("daemon", "E_DAEMON_REQUEST_INVALID", "missing daemon subcommand");
		return (serde_json::to_string(&result).unwrap_or_default(), 1);
	};

	let proxy = ClientProxy::new(config.clone());
	match sub {
		"start" => {
			let foreground = argv[2..].iter().any(|arg| arg == "--foreground");
			proxy.start(foreground, registry).await
		}
		"stop" => proxy.stop().await,
		"status" => proxy.status().await,
		other => {
			let result = output::render_dispatch_error("daemon", "E_DAEMON_REQUEST_INVALID", format!("unknown daemon subcommand '{other}'"));
			(serde_json::to_string(&result).unwrap_or_default(), 1)
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn strips_leading_double_dash() {
		let argv: Vec<String> = ["--", "open", "https://example.com"].iter().map(|s| s.to_string()).collect();
		assert_eq!(normalize_argv(&argv), vec!["open".to_string(), "https://example.com".to_string()]);
	}

	#[test]
	fn rewrites_known_dotted_alias() {
		let argv: Vec<String> = ["session.attach".into(), "--session".into(), "s-1".into()];
		assert_eq!(normalize_argv(&argv), vec!["session".to_string(), "attach".to_string(), "--session".to_string(), "s-1".to_string()]);
	}

	#[test]
	fn leaves_unknown_dotted_token_alone() {
		let argv: Vec<String> = ["example.com".into()];
		assert_eq!(normalize_argv(&argv), argv);
	}

	#[test]
	fn normalization_is_idempotent() {
		let argv: Vec<String> = ["--".into(), "daemon.status".into(), "extra".into()];
		let once = normalize_argv(&argv);
		let twice = normalize_argv(&once);
		assert_eq!(once, twice);
	}

	#[test]
	fn classifies_internal_worker_modes() {
		assert_eq!(classify_bypass(&["__daemon-worker".to_string()]), Some(BypassClass::InternalWorker));
		assert_eq!(classify_bypass(&["__network-worker".to_string()]), Some(BypassClass::InternalWorker));
	}

	#[test]
	fn classifies_streaming_and_skill_and_plan_from_stdin() {
		assert_eq!(classify_bypass(&["console-tail".to_string()]), Some(BypassClass::Streaming));
		assert_eq!(classify_bypass(&["skill".to_string(), "run".to_string()]), Some(BypassClass::Skill));
		assert_eq!(classify_bypass(&["run".to_string(), "--plan".to_string(), "-".to_string()]), Some(BypassClass::PlanFromStdin));
	}

	#[test]
	fn ordinary_commands_are_not_bypassed() {
		assert_eq!(classify_bypass(&["open".to_string(), "https://example.com".to_string()]), None);
	}

	#[tokio::test]
	async fn run_locally_dispatches_a_registered_handler() {
		let registry = Arc::new(HandlerRegistry::with_stub_handlers());
		let pool = SessionRuntimePool::new(4);
		let dir = tempfile::tempdir().unwrap();
		let (stdout, exit_code) = run_locally(&["ping".to_string()], &registry, &pool, &dir.path().to_path_buf()).await;
		assert_eq!(exit_code, 0);
		assert!(stdout.contains("\"pong\""));
	}
}
