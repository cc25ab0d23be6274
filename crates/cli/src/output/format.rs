//! CLI presentation format (spec §6): orthogonal to
//! [`surfwright_handlers::OutputShape`], which narrows the payload *before*
//! it reaches here. This only controls how the (already-shaped) envelope is
//! printed.

/// How the final envelope is written to stdout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
	/// Compact JSON (default).
	#[default]
	Json,
	/// Human-readable summary instead of JSON.
	NoJson,
	/// Pretty-printed JSON.
	Pretty,
}

impl OutputFormat {
	/// Resolves the three presentation flags (`--no-json`, `--pretty`,
	/// `--json`) into one format. `--json` is an accepted no-op (spec §6);
	/// `--no-json` and `--pretty` are mutually exclusive in practice but if
	/// both are set `--pretty` wins, since it is still valid JSON output.
	pub fn from_flags(no_json: bool, pretty: bool) -> Self {
		if pretty {
			Self::Pretty
		} else if no_json {
			Self::NoJson
		} else {
			Self::Json
		}
	}
}

impl std::fmt::Display for OutputFormat {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Json => write!(f, "json"),
			Self::NoJson => write!(f, "no-json"),
			Self::Pretty => write!(f, "pretty"),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn pretty_wins_when_both_set() {
		assert_eq!(OutputFormat::from_flags(true, true), OutputFormat::Pretty);
	}

	#[test]
	fn defaults_to_json() {
		assert_eq!(OutputFormat::from_flags(false, false), OutputFormat::Json);
	}
}
