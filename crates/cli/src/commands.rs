//! The declarative command table (spec §6, §4.3): one list that produces
//! the command id enum, canonical-name/alias lookup (used by the dot-alias
//! rewrite), and the family tag the lane-key resolver classifies on.

surfwright_cli_command_macros::command_table! {
	Ping => { names: ["ping"], family: Control },
	Contract => { names: ["contract"], family: Control },
	Echo => { names: ["echo"], family: Control },
	SessionStatus => { names: ["session.status"], family: Control },
	SessionAttach => { names: ["session.attach"], family: SessionAttach },
	Open => { names: ["open"], family: Open },
	Run => { names: ["run"], family: Run },
	Target => { names: ["target"], family: Target },
	DaemonStart => { names: ["daemon.start"], family: Control },
	DaemonStop => { names: ["daemon.stop"], family: Control },
	DaemonStatus => { names: ["daemon.status"], family: Control },
	ConsoleTail => { names: ["console-tail"], family: Other },
	NetworkTail => { names: ["network-tail"], family: Other },
	Skill => { names: ["skill"], family: Other },
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::lane::CommandFamily;

	#[test]
	fn dotted_and_aliased_names_resolve() {
		assert_eq!(lookup_command("session.attach"), Some(CommandId::SessionAttach));
		assert_eq!(lookup_command("does-not-exist"), None);
	}

	#[test]
	fn canonical_name_is_first_listed() {
		assert_eq!(command_name(CommandId::SessionAttach), "session.attach");
	}

	#[test]
	fn family_tags_match_table() {
		assert_eq!(command_meta(CommandId::Open).family, CommandFamily::Open);
		assert_eq!(command_meta(CommandId::Ping).family, CommandFamily::Control);
	}
}
