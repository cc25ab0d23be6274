//! Session runtime pool: tracks the bounded set of warm/leased/retiring
//! browser runtime connections that command handlers share.
//!
//! The pool hands out leases, deduplicates concurrent warm-ups of the same
//! session key, enforces that a `session:<id>` lane's authority is bound
//! write-once to whichever CDP origin warmed it first, and spills over to
//! one-off unpooled entries once `max_entries` is reached.

pub mod descriptor;
pub mod pool;
pub mod process;

pub use descriptor::{SessionDescriptor, new_session_id};
pub use pool::{LeaseGuard, PoolError, PoolSnapshot, RuntimeEntrySnapshot, RuntimeState, SessionRuntimePool};
