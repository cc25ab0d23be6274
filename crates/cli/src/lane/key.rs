//! Pure lane-key derivation (spec §3, §4.3).
//!
//! `resolve_lane_key` never touches I/O and never includes user secrets
//! (tokens, query strings, raw endpoints) in the key it returns — CDP
//! origins are hashed, everything else is taken from argv verbatim only
//! when it is already an identifier-shaped value (a session id, a profile
//! name).

use sha2::{Digest, Sha256};

use super::CommandFamily;
use crate::commands::{lookup_command, command_meta};

/// Which rule in the precedence list produced the lane key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaneKeySource {
	SessionId,
	CdpOrigin,
	Profile,
	Control,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaneKeyResolution {
	pub lane_key: String,
	pub family: CommandFamily,
	pub source: LaneKeySource,
}

/// Global options the resolver must skip without mistaking them for the
/// command head (spec §4.3). Value-taking options consume the next token.
const VALUE_OPTIONS: &[&str] = &["--agent-id", "--workspace", "--output-shape"];
const FLAG_OPTIONS: &[&str] = &["--no-json", "--pretty", "--json", "-v", "--version"];

struct Scan {
	head: Vec<String>,
	session_id: Option<String>,
	cdp_endpoint: Option<String>,
	workspace_profile: Option<String>,
	shared_isolation: bool,
}

fn scan(argv: &[String]) -> Scan {
	let mut head = Vec::new();
	let mut session_id = None;
	let mut cdp_endpoint = None;
	let mut workspace_profile = None;
	let mut shared_isolation = false;

	let mut iter = argv.iter().peekable();
	while let Some(token) = iter.next() {
		match token.as_str() {
			"--session" => session_id = iter.next().cloned(),
			"--cdp-endpoint" | "--endpoint" => cdp_endpoint = iter.next().cloned(),
			"--profile" => workspace_profile = iter.next().cloned(),
			"--shared" => shared_isolation = true,
			opt if VALUE_OPTIONS.contains(&opt) => {
				iter.next();
			}
			opt if FLAG_OPTIONS.contains(&opt) => {}
			other if other.starts_with("--") || other.starts_with('-') => {}
			other if head.len() < 2 => head.push(other.to_string()),
			_ => {}
		}
	}

	Scan {
		head,
		session_id,
		cdp_endpoint,
		workspace_profile,
		shared_isolation,
	}
}

fn classify_family(scan: &Scan) -> CommandFamily {
	if scan.head.len() >= 2 {
		let dotted = format!("{}.{}", scan.head[0], scan.head[1]);
		if let Some(id) = lookup_command(&dotted) {
			return command_meta(id).family;
		}
	}
	if let Some(first) = scan.head.first() {
		if let Some(id) = lookup_command(first) {
			return command_meta(id).family;
		}
	}
	CommandFamily::Other
}

/// Lowercase first 12 hex characters of the SHA-256 digest of `origin`,
/// enough lane diversity without ever putting the raw endpoint on the wire
/// or in diagnostics (spec §4.3).
fn hash_origin(origin: &str) -> String {
	let mut hasher = Sha256::new();
	hasher.update(origin.as_bytes());
	let digest = hasher.finalize();
	digest.iter().take(6).map(|byte| format!("{byte:02x}")).collect()
}

/// Strips anything that isn't ASCII alphanumeric, `-`, or `_` so a
/// malformed or adversarial argv value can never smuggle a secret or a
/// path separator into the lane key.
fn sanitize_component(raw: &str) -> String {
	raw.chars().filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_').collect()
}

/// Extracts `scheme://host[:port]` from a CDP endpoint string, ignoring any
/// path or query component, so the hashed lane key is stable across
/// `ws://host:9222/devtools/browser/<uuid>` invocations that share an
/// origin.
fn cdp_origin(endpoint: &str) -> Option<String> {
	let url = url::Url::parse(endpoint).ok()?;
	let host = url.host_str()?;
	match url.port() {
		Some(port) => Some(format!("{}://{}:{}", url.scheme(), host, port)),
		None => Some(format!("{}://{}", url.scheme(), host)),
	}
}

/// Derives the lane key for one invocation's argv. Deterministic: equal
/// argv (as a sequence, not as a set) always returns an equal result.
pub fn resolve_lane_key(argv: &[String]) -> LaneKeyResolution {
	let scan = scan(argv);
	let family = classify_family(&scan);

	if let Some(session_id) = &scan.session_id {
		let sanitized = sanitize_component(session_id);
		if !sanitized.is_empty() {
			return LaneKeyResolution {
				lane_key: format!("session:{sanitized}"),
				family,
				source: LaneKeySource::SessionId,
			};
		}
	}

	if family == CommandFamily::SessionAttach {
		if let Some(endpoint) = &scan.cdp_endpoint {
			if let Some(origin) = cdp_origin(endpoint) {
				return LaneKeyResolution {
					lane_key: format!("origin:{}", hash_origin(&origin)),
					family,
					source: LaneKeySource::CdpOrigin,
				};
			}
		}
	}

	if matches!(family, CommandFamily::Open | CommandFamily::Run) {
		if let Some(profile) = &scan.workspace_profile {
			let sanitized = sanitize_component(profile);
			if !sanitized.is_empty() {
				return LaneKeyResolution {
					lane_key: format!("origin:profile:{sanitized}"),
					family,
					source: LaneKeySource::Profile,
				};
			}
		}
		if scan.shared_isolation {
			return LaneKeyResolution {
				lane_key: "origin:shared".to_string(),
				family,
				source: LaneKeySource::Profile,
			};
		}
	}

	LaneKeyResolution {
		lane_key: "control".to_string(),
		family,
		source: LaneKeySource::Control,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn argv(tokens: &[&str]) -> Vec<String> {
		tokens.iter().map(|t| t.to_string()).collect()
	}

	#[test]
	fn session_id_takes_precedence_over_everything() {
		let resolution = resolve_lane_key(&argv(&["open", "--session", "s-1", "--profile", "work", "https://example.com"]));
		assert_eq!(resolution.lane_key, "session:s-1");
		assert_eq!(resolution.source, LaneKeySource::SessionId);
	}

	#[test]
	fn session_attach_hashes_cdp_origin() {
		let resolution = resolve_lane_key(&argv(&["session", "attach", "--cdp-endpoint", "ws://127.0.0.1:9222/devtools/browser/abc"]));
		assert_eq!(resolution.family, CommandFamily::SessionAttach);
		assert!(resolution.lane_key.starts_with("origin:"));
		assert!(!resolution.lane_key.contains("9222") || resolution.lane_key.len() < 20);
	}

	#[test]
	fn distinct_cdp_origins_hash_differently() {
		let a = resolve_lane_key(&argv(&["session", "attach", "--cdp-endpoint", "ws://host-a:9222/x"]));
		let b = resolve_lane_key(&argv(&["session", "attach", "--cdp-endpoint", "ws://host-b:9222/x"]));
		assert_ne!(a.lane_key, b.lane_key);
	}

	#[test]
	fn same_cdp_origin_hashes_identically_regardless_of_path() {
		let a = resolve_lane_key(&argv(&["session", "attach", "--cdp-endpoint", "ws://host:9222/devtools/browser/aaa"]));
		let b = resolve_lane_key(&argv(&["session", "attach", "--cdp-endpoint", "ws://host:9222/devtools/browser/bbb"]));
		assert_eq!(a.lane_key, b.lane_key);
	}

	#[test]
	fn open_with_profile_gets_profile_lane() {
		let resolution = resolve_lane_key(&argv(&["open", "--profile", "work", "https://example.com"]));
		assert_eq!(resolution.lane_key, "origin:profile:work");
	}

	#[test]
	fn run_with_shared_flag_gets_shared_lane() {
		let resolution = resolve_lane_key(&argv(&["run", "--shared", "--plan", "-"]));
		assert_eq!(resolution.lane_key, "origin:shared");
	}

	#[test]
	fn unmatched_invocation_falls_back_to_control_lane() {
		let resolution = resolve_lane_key(&argv(&["ping"]));
		assert_eq!(resolution.lane_key, "control");
		assert_eq!(resolution.source, LaneKeySource::Control);
	}

	#[test]
	fn resolution_is_deterministic() {
		let argv = argv(&["target", "--session", "s-9", "list"]);
		assert_eq!(resolve_lane_key(&argv), resolve_lane_key(&argv));
	}

	#[test]
	fn lane_key_never_contains_raw_token_values() {
		let resolution = resolve_lane_key(&argv(&["session", "attach", "--cdp-endpoint", "ws://host:9222/devtools/browser/super-secret-token-value"]));
		assert!(!resolution.lane_key.contains("super-secret-token-value"));
	}
}
