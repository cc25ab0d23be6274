//! Builds a [`CommandResult`] from a handler's outcome and prints it,
//! applying shape projection then presentation format. Ported from the
//! teacher's `ResultBuilder`/`print_result` idiom
//! (`crates/cli/src/output/result_builder.rs`), collapsed onto this crate's
//! `{ok,code,message,...}` failure shape instead of the teacher's
//! browser-specific `ErrorCode` enum.

use std::io::{self, Write};
use std::time::Instant;

use surfwright_handlers::{HandlerError, HandlerOutcome, OutputShape};

use super::format::OutputFormat;
use super::model::{CommandError, CommandResult, SCHEMA_VERSION};
use super::shape;

/// Accumulates the pieces of a [`CommandResult`] as a command runs.
pub struct ResultBuilder {
	command: String,
	data: Option<serde_json::Value>,
	error: Option<CommandError>,
	start: Instant,
}

impl ResultBuilder {
	pub fn new(command: impl Into<String>) -> Self {
		Self {
			command: command.into(),
			data: None,
			error: None,
			start: Instant::now(),
		}
	}

	pub fn data(mut self, data: serde_json::Value) -> Self {
		self.data = Some(data);
		self
	}

	pub fn error(mut self, error: CommandError) -> Self {
		self.error = Some(error);
		self
	}

	pub fn build(self) -> CommandResult {
		CommandResult {
			schema_version: SCHEMA_VERSION,
			ok: self.error.is_none(),
			command: self.command,
			data: self.data,
			error: self.error,
			duration_ms: Some(self.start.elapsed().as_millis() as u64),
		}
	}
}

/// Renders a handler's outcome into the final envelope. A [`HandlerOutcome`]
/// with a nonzero exit code is still `ok:true` at the envelope level — that
/// convention belongs to the handler's own payload, not the dispatch layer's
/// success/failure split (spec §6: envelope `ok` reflects whether dispatch
/// itself succeeded).
pub fn render_outcome(command: &str, outcome: &HandlerOutcome) -> CommandResult {
	let data = parse_or_wrap(&outcome.stdout);
	ResultBuilder::new(command).data(data).build()
}

/// Renders a handler-originated failure (spec §7: "handler typed failures
/// are never collapsed" — the `code`/`message` here are whatever the handler
/// raised, passed through verbatim).
pub fn render_handler_error(command: &str, err: &HandlerError) -> CommandResult {
	let code = err.wire_code().as_str();
	ResultBuilder::new(command).error(CommandError::new(code, err.to_string())).build()
}

/// Renders a dispatch-level failure: unknown command, malformed request.
pub fn render_dispatch_error(command: &str, code: &str, message: impl Into<String>) -> CommandResult {
	ResultBuilder::new(command).error(CommandError::new(code, message)).build()
}

fn parse_or_wrap(stdout: &str) -> serde_json::Value {
	serde_json::from_str(stdout).unwrap_or_else(|_| serde_json::Value::String(stdout.to_string()))
}

/// Prints `result` to stdout, projected to `output_shape` and formatted per
/// `format`. Returns the process exit code: 0 on `ok:true`, 1 otherwise
/// (spec §6), independent of any exit code carried inside handler data.
pub fn print_result(result: &CommandResult, output_shape: OutputShape, format: OutputFormat) -> i32 {
	let projected = shape::project(result, output_shape);
	let mut stdout = io::stdout().lock();

	match format {
		OutputFormat::Json => {
			if let Ok(json) = serde_json::to_string(&projected) {
				let _ = writeln!(stdout, "{json}");
			}
		}
		OutputFormat::Pretty => {
			if let Ok(json) = serde_json::to_string_pretty(&projected) {
				let _ = writeln!(stdout, "{json}");
			}
		}
		OutputFormat::NoJson => print_human_summary(&mut stdout, result),
	}

	if result.ok { 0 } else { 1 }
}

fn print_human_summary(stdout: &mut impl Write, result: &CommandResult) {
	if result.ok {
		match &result.data {
			Some(data) => {
				let _ = writeln!(stdout, "{}", render_human(data));
			}
			None => {
				let _ = writeln!(stdout, "{} ok", result.command);
			}
		}
	} else if let Some(error) = &result.error {
		let _ = writeln!(stdout, "error [{}]: {}", error.code, error.message);
	}
}

fn render_human(data: &serde_json::Value) -> String {
	match data {
		serde_json::Value::String(text) => text.clone(),
		other => serde_json::to_string_pretty(other).unwrap_or_default(),
	}
}

/// Prints a typed failure straight to stderr, for paths that fail before a
/// command name is even known (argv parse errors).
pub fn print_error_stderr(error: &CommandError) {
	eprintln!("error [{}]: {}", error.code, error.message);
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn render_outcome_wraps_plain_text_as_json_string() {
		let outcome = HandlerOutcome::ok("pong");
		let result = render_outcome("ping", &outcome);
		assert!(result.ok);
		assert_eq!(result.data, Some(serde_json::json!("pong")));
	}

	#[test]
	fn render_outcome_parses_json_payloads() {
		let outcome = HandlerOutcome::ok(r#"{"contract":"surfwright/v1","ok":true}"#);
		let result = render_outcome("contract", &outcome);
		assert_eq!(result.data.unwrap()["contract"], "surfwright/v1");
	}

	#[test]
	fn render_handler_error_preserves_the_handlers_code() {
		let err = HandlerError::InvalidInput("missing argument".into());
		let result = render_handler_error("echo", &err);
		assert!(!result.ok);
		assert_eq!(result.error.unwrap().code, "E_DAEMON_REQUEST_INVALID");
	}

	#[test]
	fn print_result_exit_code_matches_ok() {
		let ok_result = ResultBuilder::new("ping").data(serde_json::json!("pong")).build();
		assert_eq!(print_result(&ok_result, OutputShape::Full, OutputFormat::Json), 0);

		let err_result = render_dispatch_error("bogus", "E_DAEMON_REQUEST_INVALID", "unknown command");
		assert_eq!(print_result(&err_result, OutputShape::Full, OutputFormat::Json), 1);
	}
}
