//! Atomic daemon metadata record (spec §3, §4.1).
//!
//! `daemon.json` tells a client where the live daemon is listening and what
//! shared secret to present. It is only trustworthy if it is readable by
//! nobody but its owner — `read()` enforces that gate before it even
//! attempts to parse the file, and deletes anything that fails the gate so
//! the next starter is never wedged behind a record it cannot trust.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use surfwright_runtime::process::pid_is_alive;

pub const METADATA_SCHEMA_VERSION: u32 = 1;
const METADATA_FILE_NAME: &str = "daemon.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DaemonMetadata {
	pub schema_version: u32,
	pub pid: u32,
	pub host: String,
	pub port: u16,
	pub token: String,
	pub started_at_unix_ms: u64,
}

impl DaemonMetadata {
	pub fn new(pid: u32, host: impl Into<String>, port: u16, token: impl Into<String>, started_at_unix_ms: u64) -> Self {
		Self {
			schema_version: METADATA_SCHEMA_VERSION,
			pid,
			host: host.into(),
			port,
			token: token.into(),
			started_at_unix_ms,
		}
	}

	pub fn is_owner_alive(&self) -> bool {
		pid_is_alive(self.pid)
	}

	pub fn matches_owner(&self, pid: u32, token: &str) -> bool {
		self.pid == pid && self.token == token
	}
}

fn metadata_path(namespace_root: &Path) -> PathBuf {
	namespace_root.join(METADATA_FILE_NAME)
}

/// Reads the metadata record for `namespace_root`, or `None` if it is
/// missing, stale (owner dead), or fails the ownership/permission gate.
/// Any failure other than "file does not exist" removes the file.
pub fn read(namespace_root: &Path) -> Option<DaemonMetadata> {
	let path = metadata_path(namespace_root);

	match std::fs::metadata(&path) {
		Ok(_) if !ownership_gate_ok(&path) => {
			let _ = std::fs::remove_file(&path);
			None
		}
		Ok(_) => match std::fs::read_to_string(&path).ok().and_then(|body| serde_json::from_str::<DaemonMetadata>(&body).ok()) {
			Some(record) if record.is_owner_alive() => Some(record),
			Some(_) => {
				let _ = std::fs::remove_file(&path);
				None
			}
			None => {
				let _ = std::fs::remove_file(&path);
				None
			}
		},
		Err(_) => None,
	}
}

/// Writes `record` atomically: to a sibling temp file, then `rename`d into
/// place, with owner-only mode applied both at creation and after rename
/// (POSIX; a no-op gate on Windows, per spec §3).
pub fn write_atomic(namespace_root: &Path, record: &DaemonMetadata) -> std::io::Result<()> {
	std::fs::create_dir_all(namespace_root)?;
	let path = metadata_path(namespace_root);
	let tmp_path = path.with_extension("json.tmp");

	let body = serde_json::to_string(record)?;
	std::fs::write(&tmp_path, body)?;
	apply_owner_only_mode(&tmp_path)?;
	std::fs::rename(&tmp_path, &path)?;
	apply_owner_only_mode(&path)?;
	Ok(())
}

pub fn remove(namespace_root: &Path) {
	let _ = std::fs::remove_file(metadata_path(namespace_root));
}

#[cfg(unix)]
fn apply_owner_only_mode(path: &Path) -> std::io::Result<()> {
	use std::os::unix::fs::PermissionsExt;
	std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn apply_owner_only_mode(_path: &Path) -> std::io::Result<()> {
	Ok(())
}

/// `true` unless the file is readable by group/world or owned by a
/// different uid than the current process (POSIX only; always `true` on
/// Windows, per spec §3's "skipped on Windows" clause).
#[cfg(unix)]
fn ownership_gate_ok(path: &Path) -> bool {
	use std::os::unix::fs::MetadataExt;
	let Ok(meta) = std::fs::metadata(path) else { return false };
	let mode = meta.mode();
	let group_or_world_readable = mode & 0o077 != 0;
	let owned_by_us = meta.uid() == current_uid();
	!group_or_world_readable && owned_by_us
}

#[cfg(unix)]
fn current_uid() -> u32 {
	// SAFETY: getuid takes no arguments, has no preconditions, and cannot fail.
	unsafe { libc::getuid() }
}

#[cfg(not(unix))]
fn ownership_gate_ok(_path: &Path) -> bool {
	true
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample(pid: u32) -> DaemonMetadata {
		DaemonMetadata::new(pid, "127.0.0.1", 9999, "a".repeat(40), 0)
	}

	#[test]
	fn round_trips_through_write_and_read() {
		let dir = tempfile::tempdir().unwrap();
		let record = sample(std::process::id());
		write_atomic(dir.path(), &record).unwrap();
		let read_back = read(dir.path()).unwrap();
		assert_eq!(read_back, record);
	}

	#[test]
	fn missing_file_reads_as_none() {
		let dir = tempfile::tempdir().unwrap();
		assert!(read(dir.path()).is_none());
	}

	#[test]
	#[cfg(unix)]
	fn dead_owner_pid_is_removed_on_read() {
		let dir = tempfile::tempdir().unwrap();
		let mut child = std::process::Command::new("true").spawn().expect("spawn short-lived process");
		let pid = child.id();
		child.wait().unwrap();

		write_atomic(dir.path(), &sample(pid)).unwrap();
		assert!(read(dir.path()).is_none());
		assert!(!dir.path().join("daemon.json").exists());
	}

	#[cfg(unix)]
	#[test]
	fn write_atomic_sets_owner_only_mode() {
		use std::os::unix::fs::PermissionsExt;
		let dir = tempfile::tempdir().unwrap();
		write_atomic(dir.path(), &sample(std::process::id())).unwrap();
		let mode = std::fs::metadata(dir.path().join("daemon.json")).unwrap().permissions().mode();
		assert_eq!(mode & 0o777, 0o600);
	}

	#[cfg(unix)]
	#[test]
	fn loosely_permissioned_file_is_rejected_and_removed() {
		use std::os::unix::fs::PermissionsExt;
		let dir = tempfile::tempdir().unwrap();
		write_atomic(dir.path(), &sample(std::process::id())).unwrap();
		let path = dir.path().join("daemon.json");
		std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

		assert!(read(dir.path()).is_none());
		assert!(!path.exists());
	}

	#[test]
	fn remove_is_idempotent_on_missing_file() {
		let dir = tempfile::tempdir().unwrap();
		remove(dir.path());
		remove(dir.path());
	}
}
