//! The lane scheduler (spec §4.4): at-most-one-active-task-per-lane, bounded
//! per-lane queue depth, a wait budget per task, and a global cap on how
//! many lanes may be active at once. The cross-lane tie-break is FIFO by
//! arrival timestamp of each ready lane's head task.
//!
//! The mutex here (`parking_lot::Mutex`) guards only in-memory bookkeeping
//! and is never held across an `.await` — the invariant the design notes
//! (spec §5, §9) call out explicitly. `pending -> active` and
//! `pending -> timeout` are the two ways a task leaves the queue, and both
//! happen while holding this lock, which is what makes them mutually
//! exclusive: whichever side observes the task still queued first wins.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::diagnostics::Diagnostics;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedulerError {
	#[error("lane '{lane_key}' queue depth cap reached")]
	Saturated { lane_key: String },
	#[error("lane '{lane_key}' wait budget exceeded")]
	Timeout { lane_key: String },
}

impl SchedulerError {
	pub fn lane_key(&self) -> &str {
		match self {
			Self::Saturated { lane_key } | Self::Timeout { lane_key } => lane_key,
		}
	}
}

enum DispatchSignal {
	Go,
	TimedOut,
}

struct Waiter {
	id: u64,
	arrival: Instant,
	tx: oneshot::Sender<DispatchSignal>,
}

#[derive(Default)]
struct Lane {
	queue: VecDeque<Waiter>,
	active: bool,
}

struct State {
	lanes: HashMap<String, Lane>,
	active_lane_count: usize,
	next_id: u64,
}

/// Per-lane FIFO with a global active-lane cap, a per-lane depth cap, and a
/// per-task wait budget.
pub struct LaneScheduler {
	state: Mutex<State>,
	depth_cap: usize,
	global_active_lanes: usize,
	wait_budget: Duration,
	diagnostics: Arc<Diagnostics>,
}

impl LaneScheduler {
	pub fn new(depth_cap: usize, global_active_lanes: usize, wait_budget: Duration, diagnostics: Arc<Diagnostics>) -> Arc<Self> {
		Arc::new(Self {
			state: Mutex::new(State {
				lanes: HashMap::new(),
				active_lane_count: 0,
				next_id: 0,
			}),
			depth_cap,
			global_active_lanes,
			wait_budget,
			diagnostics,
		})
	}

	/// Enqueues one unit of work on `lane_key` and runs it once the lane and
	/// global caps allow, honoring the wait budget (spec §4.4).
	pub async fn enqueue<F, Fut, T>(self: &Arc<Self>, lane_key: impl Into<String>, execute: F) -> Result<T, SchedulerError>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = T>,
	{
		let lane_key = lane_key.into();
		let (tx, rx) = oneshot::channel();
		let arrival = Instant::now();

		{
			let mut state = self.state.lock();
			let lane = state.lanes.entry(lane_key.clone()).or_default();
			let occupied = lane.queue.len() + usize::from(lane.active);
			if occupied >= self.depth_cap {
				self.diagnostics.record_reject(&lane_key, "saturated");
				return Err(SchedulerError::Saturated { lane_key });
			}

			let id = state.next_id;
			state.next_id += 1;
			let lane = state.lanes.get_mut(&lane_key).expect("lane entry just inserted");
			lane.queue.push_back(Waiter { id, arrival, tx });
			self.diagnostics.record_queue_depth(&lane_key, lane.queue.len());

			try_promote(&mut state, self.global_active_lanes);

			drop_if_empty(&mut state, &lane_key);

			// id is used only by the timeout task below, captured by value.
			self.spawn_timeout_guard(lane_key.clone(), id);
		}

		match rx.await {
			Ok(DispatchSignal::Go) => {
				self.diagnostics.record_queue_wait_ms(&lane_key, arrival.elapsed().as_millis() as u64);
				let result = execute().await;
				self.finish(&lane_key);
				Ok(result)
			}
			Ok(DispatchSignal::TimedOut) | Err(_) => {
				self.diagnostics.record_reject(&lane_key, "timeout");
				Err(SchedulerError::Timeout { lane_key })
			}
		}
	}

	fn spawn_timeout_guard(self: &Arc<Self>, lane_key: String, id: u64) {
		let scheduler = Arc::clone(self);
		let wait_budget = self.wait_budget;
		tokio::spawn(async move {
			tokio::time::sleep(wait_budget).await;
			let mut state = scheduler.state.lock();
			if let Some(lane) = state.lanes.get_mut(&lane_key) {
				if let Some(pos) = lane.queue.iter().position(|w| w.id == id) {
					let waiter = lane.queue.remove(pos).expect("position just located");
					let _ = waiter.tx.send(DispatchSignal::TimedOut);
				}
				drop_if_empty(&mut state, &lane_key);
			}
		});
	}

	/// Called after `execute()` resolves or rejects: frees the lane's active
	/// slot and attempts to promote the next task on this lane and on any
	/// other idle lane up to the global cap.
	fn finish(&self, lane_key: &str) {
		let mut state = self.state.lock();
		if let Some(lane) = state.lanes.get_mut(lane_key) {
			lane.active = false;
		}
		state.active_lane_count = state.active_lane_count.saturating_sub(1);
		try_promote(&mut state, self.global_active_lanes);
		drop_if_empty(&mut state, lane_key);
	}

	/// Current queue depth + active flag for a lane, for tests/diagnostics.
	pub fn lane_depth(&self, lane_key: &str) -> usize {
		let state = self.state.lock();
		state.lanes.get(lane_key).map(|lane| lane.queue.len() + usize::from(lane.active)).unwrap_or(0)
	}

	pub fn active_lane_count(&self) -> usize {
		self.state.lock().active_lane_count
	}
}

/// Promotes as many ready lanes as the global cap allows, breaking ties by
/// the arrival timestamp of each lane's head task (fair across lanes).
/// Never promotes more than one task per lane in a single call, since a
/// lane is removed from consideration the moment it is marked active.
fn try_promote(state: &mut State, global_active_lanes: usize) {
	loop {
		if state.active_lane_count >= global_active_lanes {
			return;
		}

		let next_lane = state
			.lanes
			.iter()
			.filter(|(_, lane)| !lane.active && !lane.queue.is_empty())
			.min_by_key(|(_, lane)| lane.queue.front().expect("non-empty").arrival)
			.map(|(key, _)| key.clone());

		let Some(lane_key) = next_lane else {
			return;
		};

		let lane = state.lanes.get_mut(&lane_key).expect("lane key just observed");
		let waiter = lane.queue.pop_front().expect("lane selected for non-empty queue");

		match waiter.tx.send(DispatchSignal::Go) {
			Ok(()) => {
				lane.active = true;
				state.active_lane_count += 1;
			}
			Err(_) => {
				// The waiter gave up (request cancelled) between enqueue and
				// promotion; the slot was never actually claimed, so loop
				// again without counting it against the active-lane cap.
				continue;
			}
		}
	}
}

fn drop_if_empty(state: &mut State, lane_key: &str) {
	if let Some(lane) = state.lanes.get(lane_key) {
		if !lane.active && lane.queue.is_empty() {
			state.lanes.remove(lane_key);
		}
	}
}
