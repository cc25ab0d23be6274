//! The stable CLI surface (spec §6): global options the lane resolver and
//! the dispatcher inspect, plus the raw command argv forwarded verbatim to
//! the local registry or the daemon. Grounded on the teacher's
//! `pw-cli/src/cli.rs` derive style; per spec §1 ("CLI argument parsing
//! beyond what the lane resolver and dispatcher inspect" is out of scope
//! here), this struct stops at the command head — it never models a
//! command's own flags.

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "surfwright", version, about = "Agent-first control surface for a local Chrome/Chromium browser", disable_version_flag = true)]
pub struct Cli {
	/// Agent namespace for state, metadata, and diagnostics (spec §6).
	#[arg(long, global = true, value_name = "ID")]
	pub agent_id: Option<String>,

	/// Workspace/profile root override (spec §6).
	#[arg(long, global = true, value_name = "DIR")]
	pub workspace: Option<String>,

	/// Session id, folded into the forwarded argv as `--session` if a
	/// command doesn't already carry one (the lane resolver reads it either
	/// way; this flag just saves repeating `--session` on every call).
	#[arg(long, global = true, value_name = "ID")]
	pub session: Option<String>,

	/// Narrows a success payload without altering its semantics.
	#[arg(long, global = true, value_enum, value_name = "SHAPE")]
	pub output_shape: Option<OutputShapeArg>,

	/// Human-readable summary instead of JSON.
	#[arg(long)]
	pub no_json: bool,

	/// Pretty-printed JSON.
	#[arg(long)]
	pub pretty: bool,

	/// Accepted no-op, kept for back-compat (spec §6).
	#[arg(long)]
	pub json: bool,

	/// Prints the version and exits, matching the spec's `-v/--version`
	/// (clap's usual `-V` is disabled above so this doesn't collide).
	#[arg(short = 'v', long = "version", action = clap::ArgAction::Version)]
	pub version: Option<bool>,

	/// The command path and its own arguments, forwarded untouched to the
	/// dot-alias rewrite and then to the registry or daemon.
	#[arg(trailing_var_arg = true, allow_hyphen_values = true)]
	pub argv: Vec<String>,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputShapeArg {
	Full,
	Compact,
	Proof,
}

impl From<OutputShapeArg> for surfwright_handlers::OutputShape {
	fn from(value: OutputShapeArg) -> Self {
		match value {
			OutputShapeArg::Full => Self::Full,
			OutputShapeArg::Compact => Self::Compact,
			OutputShapeArg::Proof => Self::Proof,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use clap::CommandFactory;

	#[test]
	fn cli_definition_is_valid() {
		Cli::command().debug_assert();
	}

	#[test]
	fn global_options_parse_ahead_of_trailing_argv() {
		let cli = Cli::parse_from(["surfwright", "--agent-id", "a-1", "--output-shape", "compact", "open", "--session", "s-1", "https://example.com"]);
		assert_eq!(cli.agent_id.as_deref(), Some("a-1"));
		assert_eq!(cli.output_shape, Some(OutputShapeArg::Compact));
		assert_eq!(cli.argv, vec!["open", "--session", "s-1", "https://example.com"]);
	}

	#[test]
	fn format_flags_default_to_json() {
		let cli = Cli::parse_from(["surfwright", "ping"]);
		assert!(!cli.no_json);
		assert!(!cli.pretty);
	}
}
