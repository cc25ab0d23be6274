//! Wire types for the SurfWright daemon RPC protocol.
//!
//! This crate contains the serde-serializable types exchanged between the
//! CLI client and the daemon worker over the line-framed localhost socket.
//!
//! # Design philosophy
//!
//! Types in this crate are:
//! * Pure data: no behavior beyond serialization/deserialization.
//! * 1:1 with the wire: one JSON line in, one value out.
//! * Stable: the daemon and every client CLI version must agree on these
//!   shapes across a restart boundary.

pub mod error_code;
pub mod wire;

pub use error_code::DaemonErrorCode;
pub use wire::{ErrResponse, OkBody, OkResponse, RequestKind, StreamKind, WireRequest, WireResponse};

/// Maximum size, in bytes, of a single framed line (request or response).
pub const MAX_LINE_BYTES: usize = 4 * 1024 * 1024;

/// Maximum size, in bytes, of a single `run_chunk` payload.
pub const MAX_CHUNK_BYTES: usize = 64 * 1024;

/// Minimum length, in hex characters, of a valid shared-secret token.
pub const MIN_TOKEN_HEX_LEN: usize = 36;
