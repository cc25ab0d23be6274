//! The daemon lifecycle controller (spec §4.1, §4.2, §4.10): the atomic
//! metadata file, start-lock arbitration between racing client processes,
//! and the hygiene sweeper that reaps stale state left behind by crashed
//! workers.

pub mod hygiene;
pub mod metadata;
pub mod startlock;

pub use hygiene::{SweepReport, sweep};
pub use metadata::DaemonMetadata;
pub use startlock::StartLockRecord;
