//! Shape projection (spec glossary: "Shape projection"): narrows a rendered
//! [`CommandResult`] to `full`, `compact`, or `proof` without altering its
//! success/failure semantics. Applied after the handler produces its result
//! and before the presentation format ([`super::format::OutputFormat`]) is
//! chosen — the two are independent axes.

use sha2::{Digest, Sha256};
use surfwright_handlers::OutputShape;

use super::model::CommandResult;

/// Projects `result` to a `serde_json::Value` matching `shape`. `full` is the
/// identity projection; `compact` drops timing; `proof` drops the payload
/// entirely in favor of a content hash an agent can compare across calls
/// without re-reading the full result.
pub fn project(result: &CommandResult, shape: OutputShape) -> serde_json::Value {
	match shape {
		OutputShape::Full => serde_json::to_value(result).unwrap_or(serde_json::Value::Null),
		OutputShape::Compact => serde_json::json!({
			"ok": result.ok,
			"command": result.command,
			"data": result.data,
			"error": result.error,
		}),
		OutputShape::Proof => {
			let proof = result.data.as_ref().map(|data| hash_value(data));
			serde_json::json!({
				"ok": result.ok,
				"command": result.command,
				"proof": proof,
				"error": result.error.as_ref().map(|err| &err.code),
			})
		}
	}
}

fn hash_value(value: &serde_json::Value) -> String {
	let mut hasher = Sha256::new();
	hasher.update(value.to_string().as_bytes());
	let digest = hasher.finalize();
	digest.iter().map(|byte| format!("{byte:02x}")).collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::output::model::CommandError;

	fn sample(ok: bool) -> CommandResult {
		CommandResult {
			schema_version: 1,
			ok,
			command: "ping".into(),
			data: ok.then(|| serde_json::json!("pong")),
			error: (!ok).then(|| CommandError::new("E_INTERNAL", "boom")),
			duration_ms: Some(5),
		}
	}

	#[test]
	fn full_is_identity() {
		let result = sample(true);
		let projected = project(&result, OutputShape::Full);
		assert_eq!(projected["durationMs"], 5);
	}

	#[test]
	fn compact_drops_duration() {
		let projected = project(&sample(true), OutputShape::Compact);
		assert!(projected.get("durationMs").is_none());
		assert_eq!(projected["data"], "pong");
	}

	#[test]
	fn proof_drops_data_in_favor_of_hash() {
		let projected = project(&sample(true), OutputShape::Proof);
		assert!(projected.get("data").is_none());
		assert!(projected["proof"].as_str().unwrap().len() == 64);
	}

	#[test]
	fn proof_hash_is_deterministic() {
		let a = project(&sample(true), OutputShape::Proof);
		let b = project(&sample(true), OutputShape::Proof);
		assert_eq!(a["proof"], b["proof"]);
	}
}
