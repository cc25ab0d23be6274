//! Always-available handlers that don't need a browser: liveness, a fixed
//! contract echo for integration tests, argv echo, and session pool status.

use async_trait::async_trait;

use crate::context::HandlerContext;
use crate::error::HandlerError;
use crate::{Handler, HandlerOutcome};

/// Answers `ping` with `pong`, used by the daemon worker's own liveness
/// probe as well as by agents checking the daemon is responsive.
pub struct PingHandler;

#[async_trait]
impl Handler for PingHandler {
	async fn run(&self, _argv: &[String], _ctx: &HandlerContext) -> Result<HandlerOutcome, HandlerError> {
		Ok(HandlerOutcome::ok("pong"))
	}
}

/// Returns a fixed payload agents can assert against without depending on
/// a live browser, useful for testing the dispatch path end to end.
pub struct ContractHandler;

#[async_trait]
impl Handler for ContractHandler {
	async fn run(&self, _argv: &[String], _ctx: &HandlerContext) -> Result<HandlerOutcome, HandlerError> {
		Ok(HandlerOutcome::ok(r#"{"contract":"surfwright/v1","ok":true}"#))
	}
}

/// Echoes back the argv it was given, joined by spaces.
pub struct EchoHandler;

#[async_trait]
impl Handler for EchoHandler {
	async fn run(&self, argv: &[String], _ctx: &HandlerContext) -> Result<HandlerOutcome, HandlerError> {
		if argv.is_empty() {
			return Err(HandlerError::InvalidInput("echo requires at least one argument".into()));
		}
		Ok(HandlerOutcome::ok(argv.join(" ")))
	}
}

/// Reports the session runtime pool's current occupancy as JSON.
pub struct SessionStatusHandler;

#[async_trait]
impl Handler for SessionStatusHandler {
	async fn run(&self, _argv: &[String], ctx: &HandlerContext) -> Result<HandlerOutcome, HandlerError> {
		let snapshot = ctx.pool.snapshot();
		let entries: Vec<_> = snapshot
			.entries
			.iter()
			.map(|entry| {
				serde_json::json!({
					"key": entry.key,
					"state": format!("{:?}", entry.state),
					"cdpOrigin": entry.cdp_origin,
					"ageMs": entry.age_ms,
					"idleMs": entry.idle_ms,
				})
			})
			.collect();

		let payload = serde_json::json!({
			"maxEntries": snapshot.max_entries,
			"entries": entries,
		});

		Ok(HandlerOutcome::ok(payload.to_string()))
	}
}

#[cfg(test)]
mod tests {
	use std::path::PathBuf;

	use surfwright_runtime::SessionRuntimePool;

	use super::*;

	fn ctx() -> HandlerContext {
		HandlerContext::new(PathBuf::from("/tmp"), SessionRuntimePool::new(4))
	}

	#[tokio::test]
	async fn ping_answers_pong() {
		let outcome = PingHandler.run(&[], &ctx()).await.unwrap();
		assert_eq!(outcome.stdout, "pong");
		assert_eq!(outcome.exit_code, 0);
	}

	#[tokio::test]
	async fn echo_rejects_empty_argv() {
		let err = EchoHandler.run(&[], &ctx()).await.unwrap_err();
		assert_eq!(err.exit_code(), 2);
	}

	#[tokio::test]
	async fn echo_joins_argv_with_spaces() {
		let outcome = EchoHandler.run(&["hello".into(), "world".into()], &ctx()).await.unwrap();
		assert_eq!(outcome.stdout, "hello world");
	}

	#[tokio::test]
	async fn session_status_reports_empty_pool() {
		let outcome = SessionStatusHandler.run(&[], &ctx()).await.unwrap();
		let parsed: serde_json::Value = serde_json::from_str(&outcome.stdout).unwrap();
		assert_eq!(parsed["maxEntries"], 4);
		assert_eq!(parsed["entries"].as_array().unwrap().len(), 0);
	}
}
