//! Environment variables (spec §6), read once at process start into explicit
//! structs instead of scattered `std::env::var` calls at deep call sites.

use std::path::PathBuf;
use std::time::Duration;

use surfwright_handlers::OutputShape;

const DEFAULT_IDLE_MS: u64 = 15_000;
const DEFAULT_QUEUE_DEPTH_CAP: usize = 8;
const DEFAULT_GLOBAL_ACTIVE_LANES: usize = 4;
const DEFAULT_WAIT_BUDGET_MS: u64 = 5_000;
const DEFAULT_POOL_MAX_ENTRIES: usize = 16;

/// Configuration the daemon worker reads once at startup.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
	pub idle_timeout: Duration,
	pub state_dir: PathBuf,
	pub queue_depth_cap: usize,
	pub global_active_lanes: usize,
	pub wait_budget: Duration,
	pub pool_max_entries: usize,
	pub debug_logs: bool,
}

impl DaemonConfig {
	pub fn from_env(state_dir: PathBuf) -> Self {
		Self {
			idle_timeout: Duration::from_millis(env_positive_u64("SURFWRIGHT_DAEMON_IDLE_MS").unwrap_or(DEFAULT_IDLE_MS)),
			state_dir,
			queue_depth_cap: DEFAULT_QUEUE_DEPTH_CAP,
			global_active_lanes: DEFAULT_GLOBAL_ACTIVE_LANES,
			wait_budget: Duration::from_millis(DEFAULT_WAIT_BUDGET_MS),
			pool_max_entries: DEFAULT_POOL_MAX_ENTRIES,
			debug_logs: env_flag_set("SURFWRIGHT_DEBUG_LOGS"),
		}
	}
}

/// What the client proxy / local dispatcher reads from the environment
/// before a request-context override narrows any of it per-request.
#[derive(Debug, Clone)]
pub struct ClientConfig {
	pub daemon_mode: DaemonMode,
	pub state_dir: PathBuf,
	pub agent_id: Option<String>,
	pub workspace_dir: Option<PathBuf>,
	pub output_shape: OutputShape,
	pub debug_logs: bool,
}

/// The three-way reading of `SURFWRIGHT_DAEMON`/`DAEMON` (spec §4.8, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonMode {
	On,
	Auto,
	Off,
}

impl ClientConfig {
	pub fn from_env() -> Self {
		Self {
			daemon_mode: daemon_mode_from_env(),
			state_dir: state_dir_from_env(),
			agent_id: non_empty_env("SURFWRIGHT_AGENT_ID"),
			workspace_dir: non_empty_env("SURFWRIGHT_WORKSPACE_DIR").map(PathBuf::from),
			output_shape: output_shape_from_env(),
			debug_logs: env_flag_set("SURFWRIGHT_DEBUG_LOGS"),
		}
	}
}

fn daemon_mode_from_env() -> DaemonMode {
	match std::env::var("SURFWRIGHT_DAEMON").ok().as_deref() {
		Some("0") | Some("false") | Some("off") => DaemonMode::Off,
		Some("1") | Some("true") | Some("on") => DaemonMode::On,
		_ => DaemonMode::Auto,
	}
}

fn state_dir_from_env() -> PathBuf {
	non_empty_env("SURFWRIGHT_STATE_DIR")
		.map(PathBuf::from)
		.unwrap_or_else(|| dirs::home_dir().unwrap_or_else(std::env::temp_dir).join(".surfwright"))
}

fn output_shape_from_env() -> OutputShape {
	match std::env::var("SURFWRIGHT_OUTPUT_SHAPE").ok().as_deref() {
		Some("compact") => OutputShape::Compact,
		Some("proof") => OutputShape::Proof,
		_ => OutputShape::Full,
	}
}

fn non_empty_env(name: &str) -> Option<String> {
	std::env::var(name).ok().filter(|value| !value.is_empty())
}

fn env_flag_set(name: &str) -> bool {
	matches!(std::env::var(name).ok().as_deref(), Some("1") | Some("true"))
}

fn env_positive_u64(name: &str) -> Option<u64> {
	std::env::var(name).ok()?.parse::<u64>().ok().filter(|value| *value > 0)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn daemon_config_defaults_idle_timeout() {
		// SAFETY: test-local env mutation, single-threaded test binary per crate.
		unsafe { std::env::remove_var("SURFWRIGHT_DAEMON_IDLE_MS") };
		let config = DaemonConfig::from_env(PathBuf::from("/tmp/surfwright-test"));
		assert_eq!(config.idle_timeout, Duration::from_millis(DEFAULT_IDLE_MS));
	}

	#[test]
	fn daemon_mode_off_recognizes_all_spellings() {
		for value in ["0", "false", "off"] {
			unsafe { std::env::set_var("SURFWRIGHT_DAEMON", value) };
			assert_eq!(daemon_mode_from_env(), DaemonMode::Off, "value={value}");
		}
		unsafe { std::env::remove_var("SURFWRIGHT_DAEMON") };
	}

	#[test]
	fn daemon_mode_defaults_to_auto() {
		unsafe { std::env::remove_var("SURFWRIGHT_DAEMON") };
		assert_eq!(daemon_mode_from_env(), DaemonMode::Auto);
	}
}
