//! The daemon worker (spec §4.7): ties the lane scheduler and session
//! runtime pool behind the RPC listener, manages idle shutdown, and performs
//! ownership-gated metadata cleanup on exit.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::RngCore;
use tokio::net::TcpListener;
use tokio::sync::Notify;

use surfwright_handlers::{HandlerContext, HandlerRegistry};
use surfwright_runtime::SessionRuntimePool;

use crate::config::DaemonConfig;
use crate::context;
use crate::diagnostics::{Diagnostics, RequestOutcome};
use crate::error::{CliError, Result};
use crate::lane::{LaneScheduler, SchedulerError, resolve_lane_key};
use crate::lifecycle::{self, DaemonMetadata};
use crate::output;
use crate::transport::server::{ConnectionEvent, serve_connection};

const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(200);
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(2);

/// The outcome of running one `run` request to completion, after shape
/// projection has already turned any handler-level failure into a rendered
/// envelope (spec §7: handler failures are never collapsed into a worker
/// error — only scheduler/transport failures are `RunOutcome::Failed`).
pub enum RunOutcome {
	Completed { stdout: String, stderr: String, exit_code: i32 },
	Failed(CliError),
}

/// Composes the lane scheduler, session runtime pool, and handler registry
/// behind a single TCP listener.
pub struct DaemonWorker {
	token: String,
	config: DaemonConfig,
	scheduler: Arc<LaneScheduler>,
	pool: Arc<SessionRuntimePool>,
	registry: Arc<HandlerRegistry>,
	diagnostics: Arc<Diagnostics>,
}

impl DaemonWorker {
	pub fn new(config: DaemonConfig, registry: Arc<HandlerRegistry>) -> Arc<Self> {
		let diagnostics = Arc::new(Diagnostics::new(&config.state_dir, config.debug_logs));
		let scheduler = LaneScheduler::new(config.queue_depth_cap, config.global_active_lanes, config.wait_budget, Arc::clone(&diagnostics));
		let pool = SessionRuntimePool::new(config.pool_max_entries);
		Arc::new(Self {
			token: generate_token(),
			config,
			scheduler,
			pool,
			registry,
			diagnostics,
		})
	}

	pub fn token(&self) -> &str {
		&self.token
	}

	/// Resolves the request's lane, enqueues it on the scheduler, and runs
	/// the matched handler — or a dispatch-level failure if the argv matches
	/// no known command. Worker-level failures (queue pressure) are the only
	/// ones returned as [`RunOutcome::Failed`]; everything a handler itself
	/// raises is folded into a rendered `Completed` envelope by
	/// [`output::render_handler_error`].
	pub async fn run(self: &Arc<Self>, argv: Vec<String>) -> RunOutcome {
		let resolution = resolve_lane_key(&argv);
		let lane_key = resolution.lane_key.clone();
		let worker = Arc::clone(self);

		let dispatched = self
			.scheduler
			.enqueue(lane_key.clone(), move || async move { worker.dispatch(argv).await })
			.await;

		match dispatched {
			Ok((stdout, exit_code)) => {
				self.diagnostics.record_request_event("run", &lane_key, None, RequestOutcome::Success, None);
				RunOutcome::Completed { stdout, stderr: String::new(), exit_code }
			}
			Err(SchedulerError::Saturated { lane_key }) => {
				self.diagnostics.record_request_event("run", &lane_key, None, RequestOutcome::TypedError, Some("E_DAEMON_QUEUE_SATURATED"));
				RunOutcome::Failed(CliError::QueueSaturated { lane_key })
			}
			Err(SchedulerError::Timeout { lane_key }) => {
				self.diagnostics.record_request_event("run", &lane_key, None, RequestOutcome::Timeout, Some("E_DAEMON_QUEUE_TIMEOUT"));
				RunOutcome::Failed(CliError::QueueTimeout { lane_key })
			}
		}
	}

	/// Runs inside the lane's exclusive slot: resolves the command, builds a
	/// request-scoped [`HandlerContext`], invokes the handler, and renders
	/// the result to the final envelope string. Never returns an `Err` —
	/// every handler-level failure is rendered into the returned stdout.
	async fn dispatch(self: &Arc<Self>, argv: Vec<String>) -> (String, i32) {
		let (scope, remaining) = context::extract_request_scope(&argv);
		let start = Instant::now();

		let (command_name, command_args) = crate::dispatch::resolve_command_name(&remaining);

		let result = context::with_scope(scope.clone(), async move {
			match self.registry.get(&command_name) {
				None => output::render_dispatch_error(&command_name, "E_DAEMON_REQUEST_INVALID", format!("unknown command '{command_name}'")),
				Some(handler) => {
					let ctx = HandlerContext::new(scope.workspace_dir.clone().unwrap_or_else(|| self.config.state_dir.clone()), Arc::clone(&self.pool))
						.with_output_shape(scope.output_shape)
						.with_debug_logs(scope.debug_logs);
					let ctx = match &scope.agent_id {
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

		self.diagnostics.record_request_duration_ms(&command_name, start.elapsed().as_millis() as u64);

		let exit_code = if result.ok { 0 } else { 1 };
		let projected = output::project(&result, scope.output_shape);
		let stdout = serde_json::to_string(&projected).unwrap_or_default();
		(stdout, exit_code)
	}

	/// Runs the listener loop until the idle timeout elapses or a client
	/// sends `shutdown`, writing and then removing the metadata record.
	pub async fn run_foreground(self: Arc<Self>, namespace_root: PathBuf) -> Result<()> {
		let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
		let port = listener.local_addr()?.port();

		let metadata = DaemonMetadata::new(std::process::id(), "127.0.0.1", port, self.token.clone(), now_unix_ms());
		lifecycle::metadata::write_atomic(&namespace_root, &metadata)?;

		let in_flight = Arc::new(AtomicUsize::new(0));
		let last_activity = Arc::new(Mutex::new(Instant::now()));
		let shutdown = Arc::new(Notify::new());

		loop {
			tokio::select! {
				accepted = listener.accept() => {
					let Ok((stream, _)) = accepted else { continue };
					*last_activity.lock() = Instant::now();
					in_flight.fetch_add(1, Ordering::SeqCst);

					let worker = Arc::clone(&self);
					let in_flight = Arc::clone(&in_flight);
					let shutdown = Arc::clone(&shutdown);
					tokio::spawn(async move {
						let event = serve_connection(stream, &worker).await;
						in_flight.fetch_sub(1, Ordering::SeqCst);
						if matches!(event, ConnectionEvent::ShutdownRequested) {
							shutdown.notify_one();
						}
					});
				}
				_ = shutdown.notified() => break,
				_ = tokio::time::sleep(IDLE_POLL_INTERVAL) => {
					if in_flight.load(Ordering::SeqCst) == 0 && last_activity.lock().elapsed() >= self.config.idle_timeout {
						break;
					}
				}
			}
		}

		// Grace period for any connection still draining (spec §4.7,
		// §5 "shutdown" row); a socket still open past this is destroyed by
		// its own task simply finishing or being abandoned at process exit.
		let deadline = Instant::now() + SHUTDOWN_GRACE_PERIOD;
		while in_flight.load(Ordering::SeqCst) > 0 && Instant::now() < deadline {
			tokio::time::sleep(Duration::from_millis(20)).await;
		}

		if let Some(current) = lifecycle::metadata::read(&namespace_root) {
			if current.matches_owner(std::process::id(), &self.token) {
				lifecycle::metadata::remove(&namespace_root);
			}
		}

		Ok(())
	}
}

fn generate_token() -> String {
	let mut bytes = [0u8; 20];
	rand::thread_rng().fill_bytes(&mut bytes);
	bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

fn now_unix_ms() -> u64 {
	std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn generated_tokens_meet_minimum_length_and_differ() {
		let a = generate_token();
		let b = generate_token();
		assert!(a.len() >= surfwright_protocol::MIN_TOKEN_HEX_LEN);
		assert_ne!(a, b);
	}

	#[tokio::test]
	async fn ping_dispatches_through_the_registry() {
		let config = DaemonConfig::from_env(tempfile::tempdir().unwrap().keep());
		let worker = DaemonWorker::new(config, Arc::new(HandlerRegistry::with_stub_handlers()));
		let (stdout, exit_code) = worker.dispatch(vec!["ping".to_string()]).await;
		assert_eq!(exit_code, 0);
		assert!(stdout.contains("\"pong\""));
	}

	#[tokio::test]
	async fn unknown_command_renders_a_typed_dispatch_error() {
		let config = DaemonConfig::from_env(tempfile::tempdir().unwrap().keep());
		let worker = DaemonWorker::new(config, Arc::new(HandlerRegistry::with_stub_handlers()));
		let (stdout, exit_code) = worker.dispatch(vec!["does-not-exist".to_string()]).await;
		assert_eq!(exit_code, 1);
		assert!(stdout.contains("E_DAEMON_REQUEST_INVALID"));
	}
}
