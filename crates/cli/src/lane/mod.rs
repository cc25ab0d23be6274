//! The lane-key resolver (§4.3) and lane scheduler (§4.4) — the hard part
//! of the daemon. Everything above this module is generic over what a
//! lane's task actually does; this module is the only place that enforces
//! per-lane serialization.

pub mod key;
pub mod scheduler;

pub use key::{LaneKeyResolution, LaneKeySource, resolve_lane_key};
pub use scheduler::{LaneScheduler, SchedulerError};

/// The command-family tag reported alongside a lane key, used by the
/// resolver to pick a derivation rule and by diagnostics to group metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandFamily {
	SessionAttach,
	Open,
	Run,
	Target,
	Control,
	Other,
}

impl CommandFamily {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::SessionAttach => "session.attach",
			Self::Open => "open",
			Self::Run => "run",
			Self::Target => "target",
			Self::Control => "control",
			Self::Other => "other",
		}
	}
}
