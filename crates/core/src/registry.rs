use std::collections::HashMap;
use std::sync::Arc;

use crate::stubs::{ContractHandler, EchoHandler, PingHandler, SessionStatusHandler};
use crate::Handler;

/// Maps a canonical command name to the handler that implements it.
///
/// Browser-automation handlers register here from their own crate; this
/// crate only seeds the always-available stub commands.
pub struct HandlerRegistry {
	handlers: HashMap<String, Arc<dyn Handler>>,
}

impl HandlerRegistry {
	pub fn new() -> Self {
		Self { handlers: HashMap::new() }
	}

	/// A registry with the built-in stub commands already registered.
	pub fn with_stub_handlers() -> Self {
		let mut registry = Self::new();
		registry.register("ping", Arc::new(PingHandler));
		registry.register("contract", Arc::new(ContractHandler));
		registry.register("echo", Arc::new(EchoHandler));
		registry.register("session.status", Arc::new(SessionStatusHandler));
		registry
	}

	pub fn register(&mut self, canonical_name: impl Into<String>, handler: Arc<dyn Handler>) {
		self.handlers.insert(canonical_name.into(), handler);
	}

	pub fn get(&self, canonical_name: &str) -> Option<Arc<dyn Handler>> {
		self.handlers.get(canonical_name).cloned()
	}

	pub fn len(&self) -> usize {
		self.handlers.len()
	}

	pub fn is_empty(&self) -> bool {
		self.handlers.is_empty()
	}
}

impl Default for HandlerRegistry {
	fn default() -> Self {
		Self::with_stub_handlers()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn stub_handlers_are_registered_under_canonical_names() {
		let registry = HandlerRegistry::with_stub_handlers();
		assert!(registry.get("ping").is_some());
		assert!(registry.get("contract").is_some());
		assert!(registry.get("echo").is_some());
		assert!(registry.get("session.status").is_some());
		assert!(registry.get("does.not.exist").is_none());
		assert_eq!(registry.len(), 4);
	}
}
