//! The start-lock arbiter (spec §3, §4.2): arbitrates between racing client
//! processes that each want to be the one to spawn the daemon.
//!
//! Acquisition is `O_EXCL`-create-only, so at most one process can ever hold
//! the lock at a time; staleness detection lets a crashed starter's lock be
//! reclaimed without a manual `rm`.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use surfwright_runtime::process::pid_is_alive;

const START_LOCK_FILE_NAME: &str = "daemon.start.lock";

/// A start-lock is considered stale if it is older than this and its owner
/// is no longer alive by the time we check (spec §3: "owner pid dead OR
/// older than a staleness threshold with no live owner" — in practice the
/// liveness check alone settles it; age is a defense-in-depth ceiling for
/// clock skew or pid reuse windows).
pub const STALENESS_WINDOW: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartLockRecord {
	pub pid: u32,
	pub created_at_unix_ms: u64,
}

impl StartLockRecord {
	pub fn for_current_process() -> Self {
		Self {
			pid: std::process::id(),
			created_at_unix_ms: now_unix_ms(),
		}
	}

	pub fn is_stale(&self) -> bool {
		if !pid_is_alive(self.pid) {
			return true;
		}
		let age = now_unix_ms().saturating_sub(self.created_at_unix_ms);
		age >= STALENESS_WINDOW.as_millis() as u64 && !pid_is_alive(self.pid)
	}
}

fn now_unix_ms() -> u64 {
	SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

fn lock_path(namespace_root: &Path) -> PathBuf {
	namespace_root.join(START_LOCK_FILE_NAME)
}

/// What `try_acquire` observed.
pub enum AcquireOutcome {
	/// The lock is now held by the current process.
	Acquired,
	/// Another live process holds it.
	HeldByOther,
	/// A stale lock was found and removed; caller should retry.
	RemovedStale,
}

/// Attempts an exclusive-create of the lock file. Never blocks; callers
/// loop on [`AcquireOutcome::HeldByOther`] with their own retry/backoff and
/// overall start-up deadline (spec §4.2).
pub fn try_acquire(namespace_root: &Path) -> std::io::Result<AcquireOutcome> {
	std::fs::create_dir_all(namespace_root)?;
	let path = lock_path(namespace_root);

	let record = StartLockRecord::for_current_process();
	let body = serde_json::to_string(&record)?;

	match std::fs::OpenOptions::new().write(true).create_new(true).open(&path) {
		Ok(mut file) => {
			use std::io::Write;
			file.write_all(body.as_bytes())?;
			Ok(AcquireOutcome::Acquired)
		}
		Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
			let existing = std::fs::read_to_string(&path).ok().and_then(|body| serde_json::from_str::<StartLockRecord>(&body).ok());

			match existing {
				Some(record) if record.is_stale() => {
					let _ = std::fs::remove_file(&path);
					Ok(AcquireOutcome::RemovedStale)
				}
				Some(_) => Ok(AcquireOutcome::HeldByOther),
				// Unparseable lock content is itself a stale condition.
				None => {
					let _ = std::fs::remove_file(&path);
					Ok(AcquireOutcome::RemovedStale)
				}
			}
		}
		Err(err) => Err(err),
	}
}

/// Releases the lock, but only if we are still its recorded owner — a
/// defensive check against releasing a lock a later starter has since
/// reclaimed.
pub fn release(namespace_root: &Path) {
	let path = lock_path(namespace_root);
	let owned_by_us = std::fs::read_to_string(&path)
		.ok()
		.and_then(|body| serde_json::from_str::<StartLockRecord>(&body).ok())
		.is_some_and(|record| record.pid == std::process::id());

	if owned_by_us {
		let _ = std::fs::remove_file(&path);
	}
}
