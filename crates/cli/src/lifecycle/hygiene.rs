//! The hygiene sweeper (spec §4.10): reaps metadata and start-lock files
//! left behind by daemons or starters that died without cleaning up after
//! themselves. Runs periodically inside the worker and opportunistically on
//! client ingress.

use std::path::Path;

use super::{metadata, startlock};

/// Per-reason removal counters from one sweep pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
	pub scanned: usize,
	pub kept: usize,
	pub removed: usize,
	pub removed_dead_owner: usize,
	pub removed_loose_permissions: usize,
	pub removed_stale_lock: usize,
}

/// Sweeps `namespace_root` and each of `sub_namespaces` (e.g.
/// `agents/<agentId>/`) for stale metadata/start-lock files.
///
/// Idempotent: a directory already cleaned by a prior sweep contributes
/// zero further removals on a second call (spec §8).
pub fn sweep(namespace_root: &Path, sub_namespaces: &[std::path::PathBuf]) -> SweepReport {
	let mut report = SweepReport::default();
	for root in std::iter::once(namespace_root.to_path_buf()).chain(sub_namespaces.iter().cloned()) {
		sweep_one(&root, &mut report);
	}
	report
}

fn sweep_one(root: &Path, report: &mut SweepReport) {
	let metadata_path = root.join("daemon.json");
	if metadata_path.exists() {
		report.scanned += 1;
		// `metadata::read` already performs the ownership/permission gate
		// and dead-owner check, removing the file itself on any failure; we
		// just need to attribute the removal to a reason bucket here.
		let existed_before = metadata_path.exists();
		let had_loose_perms = !ownership_gate_ok(&metadata_path);
		match metadata::read(root) {
			Some(_) => report.kept += 1,
			None if existed_before => {
				report.removed += 1;
				if had_loose_perms {
					report.removed_loose_permissions += 1;
				} else {
					report.removed_dead_owner += 1;
				}
			}
			None => {}
		}
	}

	let lock_path = root.join("daemon.start.lock");
	if lock_path.exists() {
		report.scanned += 1;
		let stale = std::fs::read_to_string(&lock_path)
			.ok()
			.and_then(|body| serde_json::from_str::<startlock::StartLockRecord>(&body).ok())
			.map(|record| record.is_stale())
			.unwrap_or(true);

		if stale {
			let _ = std::fs::remove_file(&lock_path);
			report.removed += 1;
			report.removed_stale_lock += 1;
		} else {
			report.kept += 1;
		}
	}
}

#[cfg(unix)]
fn ownership_gate_ok(path: &Path) -> bool {
	use std::os::unix::fs::MetadataExt;
	let Ok(meta) = std::fs::metadata(path) else { return false };
	let mode = meta.mode();
	let group_or_world_readable = mode & 0o077 != 0;
	// SAFETY: getuid takes no arguments and cannot fail.
	let current_uid = unsafe { libc::getuid() };
	!group_or_world_readable && meta.uid() == current_uid
}

#[cfg(not(unix))]
fn ownership_gate_ok(_path: &Path) -> bool {
	true
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::lifecycle::metadata::DaemonMetadata;

	#[test]
	fn sweep_is_idempotent_on_clean_namespace() {
		let dir = tempfile::tempdir().unwrap();
		let first = sweep(dir.path(), &[]);
		let second = sweep(dir.path(), &[]);
		assert_eq!(first, second);
		assert_eq!(first.removed, 0);
	}

	#[test]
	#[cfg(unix)]
	fn dead_owner_metadata_is_swept() {
		let dir = tempfile::tempdir().unwrap();
		let mut child = std::process::Command::new("true").spawn().unwrap();
		let pid = child.id();
		child.wait().unwrap();

		let record = DaemonMetadata::new(pid, "127.0.0.1", 1234, "a".repeat(40), 0);
		metadata::write_atomic(dir.path(), &record).unwrap();

		let report = sweep(dir.path(), &[]);
		assert_eq!(report.removed_dead_owner, 1);
		assert!(!dir.path().join("daemon.json").exists());

		let second = sweep(dir.path(), &[]);
		assert_eq!(second.removed, 0);
	}

	#[test]
	fn sub_namespaces_are_included_in_the_scan() {
		let dir = tempfile::tempdir().unwrap();
		let agent_dir = dir.path().join("agents/agent-a");
		std::fs::create_dir_all(&agent_dir).unwrap();
		let record = DaemonMetadata::new(std::process::id(), "127.0.0.1", 1234, "a".repeat(40), 0);
		metadata::write_atomic(&agent_dir, &record).unwrap();

		let report = sweep(dir.path(), &[agent_dir]);
		assert_eq!(report.kept, 1);
	}
}
