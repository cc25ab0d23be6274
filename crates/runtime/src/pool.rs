//! The pool itself: a bounded map of session keys to runtime entries, plus
//! the warm-up collapsing and authority-lock rules that keep concurrent
//! lanes from stepping on each other.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::broadcast;

/// Where an entry is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
	/// A warm-up is in flight; other acquirers of the same key wait on it.
	Warming,
	/// Connected and idle, available to be leased.
	Ready,
	/// Checked out by exactly one caller.
	Leased,
	/// Past its lease timeout or explicitly evicted; draining before close.
	Retiring,
	/// No longer usable; eligible for removal from the pool.
	Closed,
}

#[derive(Debug, Error, Clone)]
pub enum PoolError {
	#[error("session '{key}' is bound to a different CDP origin than the one warming it now")]
	SessionMismatch { key: String },
	#[error("runtime pool entry for '{key}' was closed while a caller waited on it")]
	WarmupFailed { key: String },
	#[error("runtime pool entry for '{key}' is already leased")]
	AlreadyLeased { key: String },
	#[error("acquiring '{key}' did not complete within its timeout budget")]
	AcquireTimeout { key: String },
}

impl PoolError {
	/// The wire error code this maps to (`E_RUNTIME_POOL_*`).
	pub fn code(&self) -> &'static str {
		match self {
			Self::SessionMismatch { .. } => "E_RUNTIME_POOL_SESSION_MISMATCH",
			Self::WarmupFailed { .. } => "E_RUNTIME_POOL_WARMUP_FAILED",
			Self::AlreadyLeased { .. } => "E_RUNTIME_POOL_ALREADY_LEASED",
			Self::AcquireTimeout { .. } => "E_RUNTIME_POOL_ACQUIRE_TIMEOUT",
		}
	}
}

impl From<&PoolError> for surfwright_protocol::DaemonErrorCode {
	fn from(err: &PoolError) -> Self {
		match err {
			PoolError::SessionMismatch { .. } => surfwright_protocol::DaemonErrorCode::SessionMismatch,
			PoolError::WarmupFailed { .. } | PoolError::AlreadyLeased { .. } | PoolError::AcquireTimeout { .. } => {
				surfwright_protocol::DaemonErrorCode::Internal
			}
		}
	}
}

struct Entry {
	state: RuntimeState,
	/// The CDP origin this session authenticated against the first time it
	/// warmed. Bound write-once; later warms of the same key must match it.
	cdp_origin: Option<String>,
	created_at: Instant,
	last_used: Instant,
	/// Number of leases currently checked out. A retiring entry can only be
	/// closed once this drops to zero, unless force-closed by the burn
	/// threshold below.
	borrow_count: u32,
	/// Consecutive request timeouts charged against this entry by
	/// `handle_timeout`. Once this reaches `TIMEOUT_BURN_THRESHOLD` the
	/// entry is hard-closed rather than left to drain normally, on the
	/// assumption a runtime that keeps burning its callers' deadlines is
	/// wedged rather than merely slow.
	timeout_burn_count: u32,
	/// Present while `state == Warming`; every waiter subscribes a receiver
	/// and the warming task broadcasts the outcome once, collapsing N
	/// concurrent first-touches of the same key into a single connection.
	warm_signal: Option<broadcast::Sender<Result<(), PoolError>>>,
}

/// Consecutive timeouts charged to an entry before it is force-closed on
/// the next warm rather than left to drain.
const TIMEOUT_BURN_THRESHOLD: u32 = 3;

impl Entry {
	fn fresh_warming() -> Self {
		let (tx, _rx) = broadcast::channel(1);
		Self {
			state: RuntimeState::Warming,
			cdp_origin: None,
			created_at: Instant::now(),
			last_used: Instant::now(),
			borrow_count: 0,
			timeout_burn_count: 0,
			warm_signal: Some(tx),
		}
	}
}

/// A point-in-time view of one pool entry, for daemon status reporting.
#[derive(Debug, Clone)]
pub struct RuntimeEntrySnapshot {
	pub key: String,
	pub state: RuntimeState,
	pub cdp_origin: Option<String>,
	pub age_ms: u64,
	pub idle_ms: u64,
	pub spillover: bool,
	pub borrow_count: u32,
	pub timeout_burn_count: u32,
}

/// The full pool state, as reported by `daemon status`.
#[derive(Debug, Clone)]
pub struct PoolSnapshot {
	pub entries: Vec<RuntimeEntrySnapshot>,
	pub max_entries: usize,
}

/// A checked-out runtime entry. Releasing (drop or explicit [`release`])
/// returns the entry to `Ready`, or to `Closed` if it was a spillover.
///
/// [`release`]: LeaseGuard::release
pub struct LeaseGuard {
	pool: Arc<SessionRuntimePool>,
	key: String,
	spillover: bool,
	released: bool,
}

impl LeaseGuard {
	pub fn key(&self) -> &str {
		&self.key
	}

	pub fn is_spillover(&self) -> bool {
		self.spillover
	}

	/// Returns the lease to the pool. Idempotent; also runs on drop.
	pub fn release(mut self) {
		self.do_release();
	}

	fn do_release(&mut self) {
		if self.released {
			return;
		}
		self.released = true;
		self.pool.release(&self.key, self.spillover);
	}
}

impl Drop for LeaseGuard {
	fn drop(&mut self) {
		self.do_release();
	}
}

/// The bounded map of session runtime entries shared by every lane.
pub struct SessionRuntimePool {
	entries: Mutex<HashMap<String, Entry>>,
	max_entries: usize,
}

impl SessionRuntimePool {
	pub fn new(max_entries: usize) -> Arc<Self> {
		Arc::new(Self {
			entries: Mutex::new(HashMap::new()),
			max_entries,
		})
	}

	/// Acquires a lease for `key`, warming a fresh connection to `cdp_origin`
	/// if none exists yet. If the pool is at capacity and `key` is not
	/// already present, hands back a one-off spillover lease that is closed
	/// (never pooled) on release.
	///
	/// Concurrent acquires of a key mid-warm-up all await the same warming
	/// attempt rather than each dialing their own connection.
	pub async fn acquire(self: &Arc<Self>, key: &str, cdp_origin: &str) -> Result<LeaseGuard, PoolError> {
		loop {
			let wait_on = {
				let mut entries = self.entries.lock();

				match entries.get_mut(key) {
					None => {
						if entries.len() >= self.max_entries {
							drop(entries);
							return Ok(LeaseGuard {
								pool: Arc::clone(self),
								key: key.to_string(),
								spillover: true,
								released: false,
							});
						}
						entries.insert(key.to_string(), Entry::fresh_warming());
						None
					}
					Some(entry) => match entry.state {
						RuntimeState::Warming => Some(entry.warm_signal.as_ref().expect("warming entry always carries a signal").subscribe()),
						RuntimeState::Ready => {
							if let Some(bound) = &entry.cdp_origin {
								if bound != cdp_origin {
									return Err(PoolError::SessionMismatch { key: key.to_string() });
								}
							}
							entry.state = RuntimeState::Leased;
							entry.borrow_count = 1;
							entry.last_used = Instant::now();
							return Ok(LeaseGuard {
								pool: Arc::clone(self),
								key: key.to_string(),
								spillover: false,
								released: false,
							});
						}
						// A second acquire on an already-leased key is the nested
						// `withSessionBrowser` case (spec §5): the lane scheduler
						// guarantees at most one task drives this key at a time, so
						// a reentrant acquire from within that task's own call graph
						// stacks rather than contending. Stack discipline (outer
						// acquire -> inner acquire -> run -> inner release -> outer
						// release) is the caller's responsibility.
						RuntimeState::Leased => {
							if let Some(bound) = &entry.cdp_origin {
								if bound != cdp_origin {
									return Err(PoolError::SessionMismatch { key: key.to_string() });
								}
							}
							entry.borrow_count += 1;
							entry.last_used = Instant::now();
							return Ok(LeaseGuard {
								pool: Arc::clone(self),
								key: key.to_string(),
								spillover: false,
								released: false,
							});
						}
						RuntimeState::Retiring | RuntimeState::Closed => {
							entries.insert(key.to_string(), Entry::fresh_warming());
							None
						}
					},
				}
			};

			if let Some(mut rx) = wait_on {
				match rx.recv().await {
					Ok(Ok(())) => continue,
					Ok(Err(err)) => return Err(err),
					Err(_lagged_or_closed) => return Err(PoolError::WarmupFailed { key: key.to_string() }),
				}
			}

			// We just inserted a fresh Warming entry for this key: we are
			// the warmer. No network I/O happens in this crate's unit tests
			// or the handler stub crate; the caller finishes the handshake
			// and reports back with `finish_warmup`.
			return self.finish_warmup(key, cdp_origin).await;
		}
	}

	/// As [`acquire`](Self::acquire), but bounds the wait on a concurrent
	/// warm-up (or on the depth of a busy lane) to `timeout`. On elapse, the
	/// key is handed to [`handle_timeout`](Self::handle_timeout) with
	/// `best_effort_cancel = true` before the timeout error is returned,
	/// matching the surrounding request's own deadline (spec §4.5, §5).
	pub async fn acquire_timeout(self: &Arc<Self>, key: &str, cdp_origin: &str, timeout: Duration) -> Result<LeaseGuard, PoolError> {
		match tokio::time::timeout(timeout, self.acquire(key, cdp_origin)).await {
			Ok(result) => result,
			Err(_elapsed) => {
				self.handle_timeout(key, true);
				Err(PoolError::AcquireTimeout { key: key.to_string() })
			}
		}
	}

	async fn finish_warmup(self: &Arc<Self>, key: &str, cdp_origin: &str) -> Result<LeaseGuard, PoolError> {
		let signal = {
			let mut entries = self.entries.lock();
			let entry = entries.get_mut(key).expect("warming entry inserted by acquire");
			entry.state = RuntimeState::Leased;
			entry.borrow_count = 1;
			entry.cdp_origin = Some(cdp_origin.to_string());
			entry.last_used = Instant::now();
			entry.warm_signal.take()
		};

		if let Some(signal) = signal {
			let _ = signal.send(Ok(()));
		}

		Ok(LeaseGuard {
			pool: Arc::clone(self),
			key: key.to_string(),
			spillover: false,
			released: false,
		})
	}

	/// Aborts an in-flight warm-up, waking every waiter with an error and
	/// removing the entry so the next acquire starts clean.
	pub fn fail_warmup(&self, key: &str, err: PoolError) {
		let mut entries = self.entries.lock();
		if let Some(mut entry) = entries.remove(key) {
			if let Some(signal) = entry.warm_signal.take() {
				let _ = signal.send(Err(err));
			}
		}
	}

	/// Releases one borrow of `key`. Always decrements `borrowCount`; the
	/// entry only returns to `Ready` once every nested borrow from a
	/// `withSessionBrowser`-style stack (spec §5) has released, and a
	/// `Retiring` entry whose `borrowCount` reaches zero is closed outright
	/// rather than handed back out (spec §4.5 invariants).
	fn release(&self, key: &str, spillover: bool) {
		if spillover {
			return;
		}

		let mut entries = self.entries.lock();
		let Some(entry) = entries.get_mut(key) else { return };

		entry.borrow_count = entry.borrow_count.saturating_sub(1);
		entry.last_used = Instant::now();

		if entry.borrow_count == 0 {
			match entry.state {
				RuntimeState::Leased => entry.state = RuntimeState::Ready,
				RuntimeState::Retiring => {
					entries.remove(key);
				}
				RuntimeState::Warming | RuntimeState::Ready | RuntimeState::Closed => {}
			}
		}
	}

	/// Marks `key` for retirement after a surrounding request timed out,
	/// charging the entry a burn count; once that count reaches
	/// [`TIMEOUT_BURN_THRESHOLD`] the entry is hard-closed immediately rather
	/// than left to drain on its own borrows (spec §4.5, §5). `best_effort_cancel`
	/// signals that the caller would like the underlying connection notified
	/// of the cancellation if the handler supports it; this pool has no
	/// transport of its own to notify and only tracks the retirement state.
	pub fn handle_timeout(&self, key: &str, best_effort_cancel: bool) {
		let _ = best_effort_cancel;
		let mut entries = self.entries.lock();
		let Some(entry) = entries.get_mut(key) else { return };

		entry.timeout_burn_count += 1;
		if entry.timeout_burn_count >= TIMEOUT_BURN_THRESHOLD {
			entry.state = RuntimeState::Closed;
			if entry.borrow_count == 0 {
				entries.remove(key);
			}
		} else {
			entry.state = RuntimeState::Retiring;
		}
	}

	/// Drops every entry currently `Retiring` or `Closed`.
	pub fn reap_retired(&self) -> usize {
		let mut entries = self.entries.lock();
		let before = entries.len();
		entries.retain(|_, entry| !matches!(entry.state, RuntimeState::Retiring | RuntimeState::Closed));
		before - entries.len()
	}

	pub fn snapshot(&self) -> PoolSnapshot {
		let entries = self.entries.lock();
		let now = Instant::now();
		let snapshot_entries = entries
			.iter()
			.map(|(key, entry)| RuntimeEntrySnapshot {
				key: key.clone(),
				state: entry.state,
				cdp_origin: entry.cdp_origin.clone(),
				age_ms: now.duration_since(entry.created_at).as_millis() as u64,
				idle_ms: now.duration_since(entry.last_used).as_millis() as u64,
				spillover: false,
				borrow_count: entry.borrow_count,
				timeout_burn_count: entry.timeout_burn_count,
			})
			.collect();

		PoolSnapshot {
			entries: snapshot_entries,
			max_entries: self.max_entries,
		}
	}

	pub fn len(&self) -> usize {
		self.entries.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn first_acquire_warms_and_leases() {
		let pool = SessionRuntimePool::new(4);
		let lease = pool.acquire("session:abc", "ws://127.0.0.1:9222/devtools/1").await.unwrap();
		assert!(!lease.is_spillover());
		assert_eq!(pool.len(), 1);
	}

	#[tokio::test]
	async fn release_returns_entry_to_ready_for_reacquire() {
		let pool = SessionRuntimePool::new(4);
		let lease = pool.acquire("session:abc", "ws://origin").await.unwrap();
		lease.release();

		let lease2 = pool.acquire("session:abc", "ws://origin").await.unwrap();
		assert!(!lease2.is_spillover());
		assert_eq!(pool.len(), 1);
	}

	#[tokio::test]
	async fn mismatched_origin_on_ready_entry_is_rejected() {
		let pool = SessionRuntimePool::new(4);
		let lease = pool.acquire("session:abc", "ws://origin-a").await.unwrap();
		lease.release();

		let err = pool.acquire("session:abc", "ws://origin-b").await.unwrap_err();
		assert_eq!(err.code(), "E_RUNTIME_POOL_SESSION_MISMATCH");
		assert_eq!(surfwright_protocol::DaemonErrorCode::from(&err), surfwright_protocol::DaemonErrorCode::SessionMismatch);
	}

	#[tokio::test]
	async fn capacity_overflow_yields_spillover_lease() {
		let pool = SessionRuntimePool::new(1);
		let _first = pool.acquire("session:a", "ws://origin-a").await.unwrap();

		let second = pool.acquire("session:b", "ws://origin-b").await.unwrap();
		assert!(second.is_spillover());
		// Spillover leases are never tracked in the map.
		assert_eq!(pool.len(), 1);
	}

	#[tokio::test]
	async fn concurrent_first_touch_collapses_into_one_warm() {
		let pool = SessionRuntimePool::new(4);

		let pool_a = Arc::clone(&pool);
		let pool_b = Arc::clone(&pool);

		let (a, b) = tokio::join!(tokio::spawn(async move { pool_a.acquire("session:shared", "ws://origin").await }), tokio::spawn(
			async move { pool_b.acquire("session:shared", "ws://origin").await }
		));

		// Exactly one of the two racers performs the warm; the other shares
		// the same entry once it becomes ready (borrow-counted, per the
		// nested-acquire case in spec §5). Either way only one pool entry was
		// ever created.
		let (first, second) = (a.unwrap().unwrap(), b.unwrap().unwrap());
		first.release();
		second.release();
		assert_eq!(pool.len(), 1);
	}

	#[tokio::test]
	async fn retiring_entry_is_rewarmed_on_next_acquire() {
		let pool = SessionRuntimePool::new(4);
		let lease = pool.acquire("session:abc", "ws://origin").await.unwrap();
		lease.release();

		pool.handle_timeout("session:abc", false);
		assert_eq!(pool.reap_retired(), 1);
		assert_eq!(pool.len(), 0);

		let lease = pool.acquire("session:abc", "ws://origin-2").await.unwrap();
		assert!(!lease.is_spillover());
	}

	#[tokio::test]
	async fn nested_acquire_release_follows_stack_discipline() {
		// spec §5: acquire outer -> acquire inner -> run -> release inner ->
		// release outer. The slot must not become available to a third party
		// until the outer release, even though the inner release runs first.
		let pool = SessionRuntimePool::new(4);
		let outer = pool.acquire("session:abc", "ws://origin").await.unwrap();
		let inner = pool.acquire("session:abc", "ws://origin").await.unwrap();

		inner.release();
		// Still held by the outer borrow: a concurrent caller must not be
		// handed the same entry back in `Ready` state.
		assert_eq!(pool.len(), 1);

		outer.release();
		let reacquired = pool.acquire("session:abc", "ws://origin").await.unwrap();
		assert!(!reacquired.is_spillover());
	}

	#[tokio::test]
	async fn repeated_timeouts_hard_close_past_the_burn_threshold() {
		let pool = SessionRuntimePool::new(4);
		let lease = pool.acquire("session:abc", "ws://origin").await.unwrap();
		lease.release();

		for _ in 0..TIMEOUT_BURN_THRESHOLD {
			pool.handle_timeout("session:abc", true);
		}
		// The entry was closed and removed outright rather than left to
		// drain, since nothing held a borrow on it.
		assert_eq!(pool.len(), 0);
	}

	#[tokio::test]
	async fn acquire_timeout_succeeds_within_budget() {
		let pool = SessionRuntimePool::new(4);
		let lease = pool.acquire_timeout("session:abc", "ws://origin", Duration::from_secs(1)).await.unwrap();
		assert!(!lease.is_spillover());
	}

	#[tokio::test]
	async fn acquire_timeout_elapses_on_a_warmer_that_never_reports_back() {
		// Installs a `Warming` entry directly (bypassing `acquire`, whose own
		// warm-up always completes synchronously in this stub pool) to
		// simulate a warmer that stalls forever, then confirms the waiter
		// times out and the key is charged a timeout burn rather than left
		// dangling.
		let pool = SessionRuntimePool::new(4);
		pool.entries.lock().insert("session:stuck".to_string(), Entry::fresh_warming());

		let err = pool.acquire_timeout("session:stuck", "ws://origin", Duration::from_millis(10)).await.unwrap_err();
		assert_eq!(err.code(), "E_RUNTIME_POOL_ACQUIRE_TIMEOUT");

		let entries = pool.entries.lock();
		assert_eq!(entries.get("session:stuck").unwrap().timeout_burn_count, 1);
	}
}
