//! Line-framed JSON RPC transport (spec §4.6), the daemon worker that
//! serves it (§4.7), and the client proxy that speaks to it (§4.8).

pub mod client;
pub mod server;
pub mod worker;

pub use client::ClientProxy;
pub use worker::DaemonWorker;
