//! Serializable session descriptors, persisted by the CLI so a later
//! invocation can find and re-lease a session the daemon already warmed.

use serde::{Deserialize, Serialize};

/// Everything a client needs to ask the pool for the same session again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDescriptor {
	pub id: String,
	pub cdp_origin: String,
	pub created_at_unix_ms: u64,
}

impl SessionDescriptor {
	pub fn new(cdp_origin: impl Into<String>, created_at_unix_ms: u64) -> Self {
		Self {
			id: new_session_id(),
			cdp_origin: cdp_origin.into(),
			created_at_unix_ms,
		}
	}

	/// The pool/lane key this descriptor addresses.
	pub fn lane_key(&self) -> String {
		format!("session:{}", self.id)
	}
}

/// A fresh, unguessable session id.
pub fn new_session_id() -> String {
	uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn lane_key_is_prefixed_with_session() {
		let descriptor = SessionDescriptor::new("ws://127.0.0.1:9222/devtools/1", 0);
		assert!(descriptor.lane_key().starts_with("session:"));
	}

	#[test]
	fn new_session_ids_are_unique() {
		assert_ne!(new_session_id(), new_session_id());
	}
}
