//! The client proxy (spec §4.8): finds or starts the daemon under the
//! start-lock, relays one `run` request with retry-on-queue-pressure, and
//! reports when the caller should fall back to local execution.
//!
//! Grounded on the teacher's `pw-cli/src/commands/daemon.rs::send_request`/
//! `send_request_stream` (connect, write one line, read one line), extended
//! for a TCP transport, a streamed `run_chunk*`/`run_end` response, and the
//! start-or-locate/retry/fallback policy this spec adds on top.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use surfwright_handlers::HandlerRegistry;
use surfwright_protocol::{DaemonErrorCode, ErrResponse, MAX_LINE_BYTES, OkBody, OkResponse, StreamKind, WireRequest, WireResponse};

use crate::config::ClientConfig;
use crate::diagnostics::Diagnostics;
use crate::dispatch;
use crate::lifecycle::{self, DaemonMetadata};
use crate::lifecycle::startlock::{self, AcquireOutcome};
use crate::output;
use crate::transport::DaemonWorker;

const STARTUP_DEADLINE: Duration = Duration::from_secs(5);
const START_POLL_INTERVAL: Duration = Duration::from_millis(50);
const PROBE_TIMEOUT: Duration = Duration::from_millis(300);
const CONNECT_TIMEOUT: Duration = Duration::from_millis(500);
const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_QUEUE_RETRIES: u32 = 2;
const QUEUE_RETRY_DELAY: Duration = Duration::from_millis(60);

/// Speaks the daemon's line-framed RPC from the CLI side and implements the
/// start-or-locate/retry/fallback policy of spec §4.8.
pub struct ClientProxy {
	config: ClientConfig,
}

/// What went wrong sending one `run` request.
enum SendFailure {
	/// A typed daemon-level response (`E_DAEMON_*`); not a transport problem.
	Typed(ErrResponse),
	/// Connect/read/parse failure, oversized frame, or unexpected frame kind.
	Unreachable,
}

impl ClientProxy {
	pub fn new(config: ClientConfig) -> Self {
		Self { config }
	}

	fn namespace_root(&self) -> PathBuf {
		match &self.config.agent_id {
			Some(agent_id) => self.config.state_dir.join("agents").join(agent_id),
			None => self.config.state_dir.clone(),
		}
	}

	/// Relays `argv` through the daemon, retrying queue-pressure responses a
	/// bounded number of times. `Err(())` means the caller should fall back
	/// to local execution (spec §4.8 step 5 / §7 "transport error").
	pub async fn dispatch(&self, argv: Vec<String>) -> Result<(String, i32), ()> {
		let argv = self.inject_agent_id(argv);
		let namespace_root = self.namespace_root();

		let Some(metadata) = self.find_or_start_daemon(&namespace_root).await else {
			return Err(());
		};

		let (_, scope_stripped) = crate::context::extract_request_scope(&argv);
		let (command_name, _) = dispatch::resolve_command_name(&scope_stripped);

		let mut attempt = 0;
		loop {
			match send_run_once(&metadata, argv.clone()).await {
				Ok(outcome) => return Ok(outcome),
				Err(SendFailure::Typed(err)) if is_retryable(&err) && attempt < MAX_QUEUE_RETRIES => {
					attempt += 1;
					tokio::time::sleep(QUEUE_RETRY_DELAY).await;
				}
				Err(SendFailure::Typed(err)) => {
					let result = output::render_dispatch_error(&command_name, &err.code, err.message.clone());
					return Ok((serde_json::to_string(&result).unwrap_or_default(), 1));
				}
				Err(SendFailure::Unreachable) => {
					lifecycle::metadata::remove(&namespace_root);
					if self.config.debug_logs {
						Diagnostics::new(&namespace_root, true).record_daemon_cli_fallback("transport_error");
					}
					return Err(());
				}
			}
		}
	}

	/// Injects `--agent-id` into the forwarded argv if the caller didn't
	/// already supply one and a request-context agent id is configured (spec
	/// §4.8 "Agent-id injection"). An explicit argv flag always wins.
	fn inject_agent_id(&self, mut argv: Vec<String>) -> Vec<String> {
		let has_explicit = argv.iter().any(|token| token == "--agent-id");
		if !has_explicit {
			if let Some(agent_id) = &self.config.agent_id {
				argv.push("--agent-id".to_string());
				argv.push(agent_id.clone());
			}
		}
		argv
	}

	/// Reads the metadata store; if the recorded daemon is live, uses it.
	/// Otherwise attempts to start one under the start-lock (spec §4.2).
	async fn find_or_start_daemon(&self, namespace_root: &Path) -> Option<DaemonMetadata> {
		if let Some(metadata) = lifecycle::metadata::read(namespace_root) {
			if probe_ping(&metadata).await {
				return Some(metadata);
			}
			lifecycle::metadata::remove(namespace_root);
		}
		self.start_daemon(namespace_root).await
	}

	async fn start_daemon(&self, namespace_root: &Path) -> Option<DaemonMetadata> {
		let deadline = Instant::now() + STARTUP_DEADLINE;

		loop {
			if Instant::now() >= deadline {
				return None;
			}

			match startlock::try_acquire(namespace_root).ok()? {
				AcquireOutcome::Acquired => {
					// Double-checked locking: someone may have finished starting
					// a daemon between our initial read and winning the lock.
					if let Some(metadata) = lifecycle::metadata::read(namespace_root) {
						if probe_ping(&metadata).await {
							startlock::release(namespace_root);
							return Some(metadata);
						}
					}

					let child = spawn_worker(namespace_root);
					let started = wait_for_metadata(namespace_root, deadline).await;
					startlock::release(namespace_root);

					return match started {
						Some(metadata) => Some(metadata),
						None => {
							if let Ok(mut child) = child {
								let _ = child.kill();
							}
							lifecycle::metadata::remove(namespace_root);
							None
						}
					};
				}
				AcquireOutcome::RemovedStale => continue,
				AcquireOutcome::HeldByOther => {
					tokio::time::sleep(START_POLL_INTERVAL).await;
					if let Some(metadata) = lifecycle::metadata::read(namespace_root) {
						if probe_ping(&metadata).await {
							return Some(metadata);
						}
					}
				}
			}
		}
	}

	/// `daemon start` (spec §3 supplemented feature): either blocks running
	/// the worker in this process (`--foreground`, for tests/debugging — no
	/// start-lock dance) or finds-or-starts a detached daemon the same way
	/// `dispatch` does and reports its metadata.
	pub async fn start(&self, foreground: bool, registry: Arc<HandlerRegistry>) -> (String, i32) {
		let namespace_root = self.namespace_root();

		if foreground {
			let daemon_config = crate::config::DaemonConfig::from_env(namespace_root.clone());
			let worker = DaemonWorker::new(daemon_config, registry);
			return match worker.run_foreground(namespace_root).await {
				Ok(()) => {
					let result = output::ResultBuilder::new("daemon.start").data(serde_json::json!({ "started": true, "foreground": true })).build();
					(serde_json::to_string(&result).unwrap_or_default(), 0)
				}
				Err(err) => {
					let result = output::render_dispatch_error("daemon.start", "E_DAEMON_RUN_FAILED", err.to_string());
					(serde_json::to_string(&result).unwrap_or_default(), 1)
				}
			};
		}

		match self.find_or_start_daemon(&namespace_root).await {
			Some(metadata) => {
				let result = output::ResultBuilder::new("daemon.start")
					.data(serde_json::json!({
						"started": true,
						"pid": metadata.pid,
						"host": metadata.host,
						"port": metadata.port,
						"startedAtUnixMs": metadata.started_at_unix_ms,
					}))
					.build();
				(serde_json::to_string(&result).unwrap_or_default(), 0)
			}
			None => {
				let result = output::render_dispatch_error("daemon.start", "E_DAEMON_RUN_FAILED", "daemon did not start within the startup deadline");
				(serde_json::to_string(&result).unwrap_or_default(), 1)
			}
		}
	}

	/// `daemon stop` (spec §3): sends a `shutdown` request to the recorded
	/// daemon if one is live, then removes the metadata file regardless —
	/// the daemon removes its own metadata on the way down, but a client
	/// that can't confirm that shouldn't leave a record pointing at a dead
	/// process either.
	pub async fn stop(&self) -> (String, i32) {
		let namespace_root = self.namespace_root();
		let Some(metadata) = lifecycle::metadata::read(&namespace_root) else {
			let result = output::ResultBuilder::new("daemon.stop").data(serde_json::json!({ "stopped": false, "reason": "not running" })).build();
			return (serde_json::to_string(&result).unwrap_or_default(), 0);
		};

		let acknowledged = send_shutdown(&metadata).await;
		lifecycle::metadata::remove(&namespace_root);
		let result = output::ResultBuilder::new("daemon.stop").data(serde_json::json!({ "stopped": true, "acknowledged": acknowledged })).build();
		(serde_json::to_string(&result).unwrap_or_default(), 0)
	}

	/// `daemon status` (spec §3): live metadata plus a hygiene sweep of this
	/// namespace, run opportunistically on every status check.
	pub async fn status(&self) -> (String, i32) {
		let namespace_root = self.namespace_root();
		let metadata = lifecycle::metadata::read(&namespace_root);
		let running = match &metadata {
			Some(metadata) => probe_ping(metadata).await,
			None => false,
		};
		let sweep = lifecycle::hygiene::sweep(&namespace_root, &[]);

		let mut data = serde_json::json!({
			"running": running,
			"sweep": {
				"scanned": sweep.scanned,
				"kept": sweep.kept,
				"removed": sweep.removed,
			},
		});
		if let Some(metadata) = metadata {
			data["pid"] = serde_json::json!(metadata.pid);
			data["host"] = serde_json::json!(metadata.host);
			data["port"] = serde_json::json!(metadata.port);
			data["startedAtUnixMs"] = serde_json::json!(metadata.started_at_unix_ms);
		}

		let result = output::ResultBuilder::new("daemon.status").data(data).build();
		(serde_json::to_string(&result).unwrap_or_default(), 0)
	}
}

/// Sends a `shutdown` request and waits briefly for its acknowledgement.
/// `false` (connect failure, timeout, or unexpected response) still means
/// the caller should proceed with removing the metadata record — the
/// daemon is either already gone or about to be.
async fn send_shutdown(metadata: &DaemonMetadata) -> bool {
	let Ok(Ok(stream)) = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect((metadata.host.as_str(), metadata.port))).await else {
		return false;
	};
	let (read_half, mut write_half) = stream.into_split();
	let mut reader = BufReader::new(read_half);

	if write_line(&mut write_half, &WireRequest::shutdown(metadata.token.clone())).await.is_err() {
		return false;
	}

	let mut line = String::new();
	let Ok(Ok(bytes_read)) = tokio::time::timeout(PROBE_TIMEOUT, reader.read_line(&mut line)).await else {
		return false;
	};
	if bytes_read == 0 {
		return false;
	}

	matches!(
		serde_json::from_str::<WireResponse>(line.trim_end()),
		Ok(WireResponse::Ok(OkResponse { body: OkBody::Shutdown, .. }))
	)
}

fn spawn_worker(namespace_root: &Path) -> std::io::Result<std::process::Child> {
	let exe = std::env::current_exe()?;
	std::process::Command::new(exe)
		.arg("__daemon-worker")
		.arg(namespace_root)
		.stdin(std::process::Stdio::null())
		.stdout(std::process::Stdio::null())
		.stderr(std::process::Stdio::null())
		.spawn()
}

/// Polls the metadata file until it appears and responds to `ping`, or the
/// start-up deadline elapses.
async fn wait_for_metadata(namespace_root: &Path, deadline: Instant) -> Option<DaemonMetadata> {
	while Instant::now() < deadline {
		if let Some(metadata) = lifecycle::metadata::read(namespace_root) {
			if probe_ping(&metadata).await {
				return Some(metadata);
			}
		}
		tokio::time::sleep(START_POLL_INTERVAL).await;
	}
	None
}

async fn probe_ping(metadata: &DaemonMetadata) -> bool {
	let Ok(Ok(stream)) = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect((metadata.host.as_str(), metadata.port))).await else {
		return false;
	};
	let (read_half, mut write_half) = stream.into_split();
	let mut reader = BufReader::new(read_half);

	if write_line(&mut write_half, &WireRequest::ping(metadata.token.clone())).await.is_err() {
		return false;
	}

	let mut line = String::new();
	let Ok(Ok(bytes_read)) = tokio::time::timeout(PROBE_TIMEOUT, reader.read_line(&mut line)).await else {
		return false;
	};
	if bytes_read == 0 {
		return false;
	}

	matches!(
		serde_json::from_str::<WireResponse>(line.trim_end()),
		Ok(WireResponse::Ok(OkResponse { body: OkBody::Pong, .. }))
	)
}

/// Sends one `run` request and collects its streamed response into the final
/// stdout string and exit code (spec §4.6: stdout chunks, then stderr chunks
/// — this worker never writes to the stderr stream — then `run_end`).
async fn send_run_once(metadata: &DaemonMetadata, argv: Vec<String>) -> Result<(String, i32), SendFailure> {
	let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect((metadata.host.as_str(), metadata.port)))
		.await
		.map_err(|_| SendFailure::Unreachable)?
		.map_err(|_| SendFailure::Unreachable)?;

	let (read_half, mut write_half) = stream.into_split();
	let mut reader = BufReader::new(read_half);

	write_line(&mut write_half, &WireRequest::run(metadata.token.clone(), argv)).await.map_err(|_| SendFailure::Unreachable)?;

	let mut stdout_buf = String::new();
	loop {
		let mut line = String::new();
		let bytes_read = tokio::time::timeout(REQUEST_READ_TIMEOUT, reader.read_line(&mut line))
			.await
			.map_err(|_| SendFailure::Unreachable)?
			.map_err(|_| SendFailure::Unreachable)?;

		if bytes_read == 0 || line.len() > MAX_LINE_BYTES {
			return Err(SendFailure::Unreachable);
		}

		let response: WireResponse = serde_json::from_str(line.trim_end()).map_err(|_| SendFailure::Unreachable)?;
		match response {
			WireResponse::Ok(OkResponse { body: OkBody::RunChunk { stream: StreamKind::Stdout, data }, .. }) => stdout_buf.push_str(&data),
			WireResponse::Ok(OkResponse { body: OkBody::RunChunk { stream: StreamKind::Stderr, .. }, .. }) => {}
			WireResponse::Ok(OkResponse { body: OkBody::RunEnd { code }, .. }) => return Ok((stdout_buf, code)),
			WireResponse::Ok(_) => return Err(SendFailure::Unreachable),
			WireResponse::Err(err) => return Err(SendFailure::Typed(err)),
		}
	}
}

fn is_retryable(err: &ErrResponse) -> bool {
	err.code == DaemonErrorCode::QueueTimeout.as_str() || err.code == DaemonErrorCode::QueueSaturated.as_str()
}

async fn write_line<W: tokio::io::AsyncWrite + Unpin>(writer: &mut W, request: &WireRequest) -> std::io::Result<()> {
	let mut body = serde_json::to_vec(request)?;
	body.push(b'\n');
	writer.write_all(&body).await?;
	writer.flush().await
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample_config(state_dir: PathBuf, agent_id: Option<&str>) -> ClientConfig {
		ClientConfig {
			daemon_mode: crate::config::DaemonMode::Auto,
			state_dir,
			agent_id: agent_id.map(str::to_string),
			workspace_dir: None,
			output_shape: surfwright_handlers::OutputShape::Full,
			debug_logs: false,
		}
	}

	#[test]
	fn namespace_root_is_per_agent_when_set() {
		let proxy = ClientProxy::new(sample_config(PathBuf::from("/tmp/surfwright-state"), Some("agent-a")));
		assert_eq!(proxy.namespace_root(), PathBuf::from("/tmp/surfwright-state/agents/agent-a"));
	}

	#[test]
	fn namespace_root_is_state_dir_without_agent() {
		let proxy = ClientProxy::new(sample_config(PathBuf::from("/tmp/surfwright-state"), None));
		assert_eq!(proxy.namespace_root(), PathBuf::from("/tmp/surfwright-state"));
	}

	#[test]
	fn agent_id_is_injected_when_absent() {
		let proxy = ClientProxy::new(sample_config(PathBuf::from("/tmp/surfwright-state"), Some("agent-a")));
		let argv = proxy.inject_agent_id(vec!["ping".to_string()]);
		assert_eq!(argv, vec!["ping".to_string(), "--agent-id".to_string(), "agent-a".to_string()]);
	}

	#[test]
	fn explicit_agent_id_is_not_overridden() {
		let proxy = ClientProxy::new(sample_config(PathBuf::from("/tmp/surfwright-state"), Some("agent-a")));
		let argv = proxy.inject_agent_id(vec!["ping".to_string(), "--agent-id".to_string(), "agent-b".to_string()]);
		assert_eq!(argv, vec!["ping".to_string(), "--agent-id".to_string(), "agent-b".to_string()]);
	}

	#[test]
	fn queue_pressure_codes_are_retryable() {
		assert!(is_retryable(&ErrResponse::new(DaemonErrorCode::QueueTimeout.as_str(), "x")));
		assert!(is_retryable(&ErrResponse::new(DaemonErrorCode::QueueSaturated.as_str(), "x")));
		assert!(!is_retryable(&ErrResponse::new(DaemonErrorCode::TokenInvalid.as_str(), "x")));
	}

	#[tokio::test]
	async fn stop_without_a_running_daemon_reports_not_stopped() {
		let dir = tempfile::tempdir().unwrap();
		let proxy = ClientProxy::new(sample_config(dir.path().to_path_buf(), None));
		let (stdout, exit_code) = proxy.stop().await;
		assert_eq!(exit_code, 0);
		assert!(stdout.contains("\"stopped\":false"));
	}

	#[tokio::test]
	async fn status_without_a_running_daemon_reports_not_running() {
		let dir = tempfile::tempdir().unwrap();
		let proxy = ClientProxy::new(sample_config(dir.path().to_path_buf(), None));
		let (stdout, exit_code) = proxy.status().await;
		assert_eq!(exit_code, 0);
		assert!(stdout.contains("\"running\":false"));
	}

	#[tokio::test]
	async fn unreachable_daemon_yields_fallback() {
		let dir = tempfile::tempdir().unwrap();
		let proxy = ClientProxy::new(sample_config(dir.path().to_path_buf(), None));
		// No daemon running and a startup attempt will fail quickly because
		// `current_exe` in a `cargo test` binary is the test harness, not the
		// `surfwright` binary; the spawned process exits immediately without
		// ever writing metadata, so `start_daemon` times out and we fall back.
		let result = tokio::time::timeout(Duration::from_secs(10), proxy.dispatch(vec!["ping".to_string()])).await;
		assert!(matches!(result, Ok(Err(()))));
	}
}
