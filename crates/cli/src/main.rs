//! Process entrypoint: parses the stable CLI surface (spec §6), initializes
//! tracing, and dispatches one invocation to completion.
//!
//! Grounded on the teacher's `pw-cli/src/main.rs` (`Cli::parse()` +
//! `tracing`-based logging init + dispatch + `std::process::exit`).

mod cli;
mod commands;
mod config;
mod context;
mod diagnostics;
mod dispatch;
mod error;
mod lane;
mod lifecycle;
mod output;
mod transport;

use std::sync::Arc;

use clap::Parser;
use surfwright_handlers::HandlerRegistry;
use surfwright_runtime::SessionRuntimePool;

use crate::cli::Cli;
use crate::config::ClientConfig;
use crate::output::OutputFormat;

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	init_tracing();

	let mut config = ClientConfig::from_env();
	if let Some(agent_id) = cli.agent_id.clone() {
		config.agent_id = Some(agent_id);
	}
	if let Some(workspace) = cli.workspace.clone() {
		config.workspace_dir = Some(std::path::PathBuf::from(workspace));
	}
	if let Some(shape) = cli.output_shape {
		config.output_shape = shape.into();
	}

	let mut argv = cli.argv.clone();
	if let Some(session) = cli.session.clone() {
		if !argv.iter().any(|token| token == "--session") {
			argv.push("--session".to_string());
			argv.push(session);
		}
	}

	let registry = Arc::new(HandlerRegistry::with_stub_handlers());
	let pool = SessionRuntimePool::new(16);

	let (stdout, exit_code) = dispatch::dispatch(argv, config, registry, pool).await;

	let format = OutputFormat::from_flags(cli.no_json, cli.pretty);
	print_envelope(&stdout, format);

	std::process::exit(exit_code);
}

/// The daemon/worker already rendered the shape-projected envelope; here we
/// only apply the final presentation format (spec §6 `--no-json`/`--pretty`).
fn print_envelope(stdout: &str, format: OutputFormat) {
	match format {
		OutputFormat::Json => println!("{stdout}"),
		OutputFormat::Pretty => match serde_json::from_str::<serde_json::Value>(stdout) {
			Ok(value) => println!("{}", serde_json::to_string_pretty(&value).unwrap_or_else(|_| stdout.to_string())),
			Err(_) => println!("{stdout}"),
		},
		OutputFormat::NoJson => print_human_summary(stdout),
	}
}

fn print_human_summary(stdout: &str) {
	let Ok(value) = serde_json::from_str::<serde_json::Value>(stdout) else {
		println!("{stdout}");
		return;
	};

	match value.get("ok").and_then(serde_json::Value::as_bool) {
		Some(true) => match value.get("data") {
			Some(serde_json::Value::String(text)) => println!("{text}"),
			Some(data) => println!("{}", serde_json::to_string_pretty(data).unwrap_or_default()),
			None => println!("ok"),
		},
		_ => {
			let code = value.get("error").and_then(|error| error.get("code")).and_then(serde_json::Value::as_str).unwrap_or("E_INTERNAL");
			let message = value.get("error").and_then(|error| error.get("message")).and_then(serde_json::Value::as_str).unwrap_or("unknown error");
			println!("error [{code}]: {message}");
		}
	}
}

fn init_tracing() {
	use tracing_subscriber::EnvFilter;

	let filter = EnvFilter::try_from_env("SURFWRIGHT_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
	let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_ansi(true).try_init();
}
