//! The diagnostics sink (spec §4.7, §4.9 component 9): a best-effort event
//! and metric emitter. Writes are non-blocking and never propagate errors
//! into the command path — a diagnostics write failure is logged at
//! `tracing::warn!` and otherwise swallowed.
//!
//! Session ids and daemon tokens must never appear here: callers pass
//! already-resolved lane *keys* (which are either a fixed string or a hash,
//! per spec §4.3), not raw session ids or endpoints.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde_json::json;

/// Outcome of one dispatched request, reported in the per-request event
/// when `SURFWRIGHT_DEBUG_LOGS` is set (spec §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
	Success,
	TypedError,
	Timeout,
	Unreachable,
	Cancelled,
}

impl RequestOutcome {
	fn as_str(self) -> &'static str {
		match self {
			Self::Success => "success",
			Self::TypedError => "typed_error",
			Self::Timeout => "timeout",
			Self::Unreachable => "unreachable",
			Self::Cancelled => "cancelled",
		}
	}
}

/// Writes ndjson metric/event lines under the agent namespace's
/// `diagnostics/` directory, matching `target = "surfwright.daemon"` in
/// `tracing` output for anything structured enough to also page an
/// operator's log aggregator.
pub struct Diagnostics {
	events_path: Option<PathBuf>,
	metrics_path: Option<PathBuf>,
	next_request_id: AtomicU64,
	lock: Mutex<()>,
}

impl Diagnostics {
	/// Diagnostics rooted at `state_dir/diagnostics/`. Debug-only per-request
	/// events are written only when `debug_logs` is set; metrics are always
	/// written (they carry no session identifiers).
	pub fn new(state_dir: &Path, debug_logs: bool) -> Self {
		let dir = state_dir.join("diagnostics");
		let _ = std::fs::create_dir_all(&dir);
		Self {
			events_path: debug_logs.then(|| dir.join("daemon.ndjson")),
			metrics_path: Some(dir.join("daemon.metrics.ndjson")),
			next_request_id: AtomicU64::new(0),
			lock: Mutex::new(()),
		}
	}

	/// A sink that writes nothing, for tests and bare library use.
	pub fn noop() -> Self {
		Self {
			events_path: None,
			metrics_path: None,
			next_request_id: AtomicU64::new(0),
			lock: Mutex::new(()),
		}
	}

	pub fn record_queue_depth(&self, scope: &str, depth: usize) {
		self.write_metric("queue_depth", scope, depth as f64);
	}

	pub fn record_queue_wait_ms(&self, scope: &str, millis: u64) {
		self.write_metric("queue_wait_ms", scope, millis as f64);
		tracing::debug!(target: "surfwright.daemon", scope, millis, "queue_wait_ms");
	}

	pub fn record_reject(&self, scope: &str, reason: &str) {
		self.write_metric(&format!("rejects_total{{reason={reason}}}"), scope, 1.0);
		tracing::debug!(target: "surfwright.daemon", scope, reason, "rejects_total");
	}

	pub fn record_request_duration_ms(&self, command: &str, millis: u64) {
		self.write_metric("daemon_request_duration_ms", command, millis as f64);
	}

	pub fn record_worker_rss_mb(&self, rss_mb: u64) {
		self.write_metric("daemon_worker_rss_mb", "worker", rss_mb as f64);
	}

	/// Emits the client-side `daemon_cli_fallback` event (spec §4.8) when a
	/// daemon-bound request falls back to local execution.
	pub fn record_daemon_cli_fallback(&self, reason: &str) {
		let Some(path) = &self.events_path else { return };
		let line = json!({ "event": "daemon_cli_fallback", "reason": reason });
		self.append_line(path, &line.to_string());
		tracing::debug!(target: "surfwright.daemon", reason, "daemon_cli_fallback");
	}

	/// Emits a per-request event (debug-only). `session_hash` must already
	/// be redacted by the caller — this sink performs no redaction itself.
	pub fn record_request_event(&self, command: &str, lane_scope: &str, session_hash: Option<&str>, outcome: RequestOutcome, error_code: Option<&str>) {
		let Some(path) = &self.events_path else { return };
		let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
		let line = json!({
			"requestId": request_id,
			"command": command,
			"laneScope": lane_scope,
			"sessionHash": session_hash,
			"result": outcome.as_str(),
			"errorCode": error_code,
		});
		self.append_line(path, &line.to_string());
	}

	fn write_metric(&self, name: &str, scope: &str, value: f64) {
		let Some(path) = &self.metrics_path else { return };
		let line = json!({ "metric": name, "scope": scope, "value": value });
		self.append_line(path, &line.to_string());
	}

	fn append_line(&self, path: &Path, line: &str) {
		let _guard = self.lock.lock();
		let result = OpenOptions::new().create(true).append(true).open(path).and_then(|mut file| writeln!(file, "{line}"));
		if let Err(err) = result {
			tracing::warn!(target: "surfwright.daemon", %err, path = %path.display(), "diagnostics write failed");
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn noop_sink_writes_nothing() {
		let diagnostics = Diagnostics::noop();
		diagnostics.record_queue_depth("control", 3);
		diagnostics.record_reject("control", "saturated");
	}

	#[test]
	fn metrics_are_appended_as_ndjson() {
		let dir = tempfile::tempdir().unwrap();
		let diagnostics = Diagnostics::new(dir.path(), true);
		diagnostics.record_queue_depth("session:s-1", 2);
		diagnostics.record_request_event("ping", "control", None, RequestOutcome::Success, None);

		let metrics = std::fs::read_to_string(dir.path().join("diagnostics/daemon.metrics.ndjson")).unwrap();
		assert_eq!(metrics.lines().count(), 1);

		let events = std::fs::read_to_string(dir.path().join("diagnostics/daemon.ndjson")).unwrap();
		assert_eq!(events.lines().count(), 1);
		assert!(events.contains("\"result\":\"success\""));
	}

	#[test]
	fn events_file_absent_without_debug_logs() {
		let dir = tempfile::tempdir().unwrap();
		let diagnostics = Diagnostics::new(dir.path(), false);
		diagnostics.record_request_event("ping", "control", None, RequestOutcome::Success, None);
		assert!(!dir.path().join("diagnostics/daemon.ndjson").exists());
	}
}
