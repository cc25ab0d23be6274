//! Proc macro that generates the SurfWright command table from a single
//! declarative list.
//!
//! One list produces: the `CommandId` enum, name/alias lookup, the
//! canonical (first) name used for dot-alias rewriting, and the family tag
//! the lane-key resolver uses to classify an invocation.

use proc_macro::TokenStream;
use quote::quote;
use syn::parse::{Parse, ParseStream};
use syn::{Error, Ident, LitStr, Result, Token, braced, bracketed, parse_macro_input};

struct TableInput {
	entries: Vec<CommandEntry>,
}

impl Parse for TableInput {
	fn parse(input: ParseStream<'_>) -> Result<Self> {
		let entries = input.parse_terminated(CommandEntry::parse, Token![,])?.into_iter().collect::<Vec<_>>();

		if entries.is_empty() {
			return Err(Error::new(proc_macro2::Span::call_site(), "command_table! must list at least one command"));
		}

		Ok(Self { entries })
	}
}

struct CommandEntry {
	id: Ident,
	names: Vec<LitStr>,
	family: Ident,
}

impl Parse for CommandEntry {
	fn parse(input: ParseStream<'_>) -> Result<Self> {
		let id: Ident = input.parse()?;
		input.parse::<Token![=>]>()?;

		let content;
		braced!(content in input);

		let mut names: Option<Vec<LitStr>> = None;
		let mut family: Option<Ident> = None;

		while !content.is_empty() {
			let key: Ident = content.parse()?;
			content.parse::<Token![:]>()?;

			match key.to_string().as_str() {
				"names" => {
					let names_content;
					bracketed!(names_content in content);
					let parsed = names_content.parse_terminated(<LitStr as Parse>::parse, Token![,])?.into_iter().collect::<Vec<_>>();
					if parsed.is_empty() {
						return Err(Error::new(key.span(), "'names' must include at least one command name"));
					}
					names = Some(parsed);
				}
				"family" => {
					family = Some(content.parse()?);
				}
				other => {
					return Err(Error::new(key.span(), format!("unsupported command field '{other}', expected names/family")));
				}
			}

			if content.peek(Token![,]) {
				content.parse::<Token![,]>()?;
			}
		}

		let names = names.ok_or_else(|| Error::new(id.span(), "missing required field 'names'"))?;
		let family = family.ok_or_else(|| Error::new(id.span(), "missing required field 'family'"))?;

		Ok(Self { id, names, family })
	}
}

/// Generates the command table described above.
///
/// ```ignore
/// command_table! {
///     Navigate => { names: ["navigate", "nav"], family: Open },
///     SessionAttach => { names: ["session.attach"], family: SessionAttach },
/// }
/// ```
#[proc_macro]
pub fn command_table(input: TokenStream) -> TokenStream {
	let table = parse_macro_input!(input as TableInput);

	let ids = table.entries.iter().map(|entry| &entry.id);

	let lookup_arms = table.entries.iter().map(|entry| {
		let id = &entry.id;
		let names = &entry.names;
		quote! {
			#(#names)|* => Some(CommandId::#id),
		}
	});

	let meta_entries = table.entries.iter().map(|entry| {
		let id = &entry.id;
		let canonical = &entry.names[0];
		let aliases = &entry.names[1..];
		let family = &entry.family;
		quote! {
			CommandMeta {
				id: CommandId::#id,
				canonical: #canonical,
				aliases: &[#(#aliases),*],
				family: crate::lane::CommandFamily::#family,
			}
		}
	});

	let meta_match_arms = table.entries.iter().enumerate().map(|(index, entry)| {
		let id = &entry.id;
		quote! { CommandId::#id => &ALL_COMMANDS[#index], }
	});

	TokenStream::from(quote! {
		#[derive(Debug, Clone, Copy, PartialEq, Eq)]
		pub enum CommandId {
			#(#ids),*
		}

		/// Static metadata for one command: its canonical name, aliases, and
		/// the family tag the lane-key resolver uses to classify it.
		#[derive(Debug, Clone, Copy)]
		pub struct CommandMeta {
			pub id: CommandId,
			pub canonical: &'static str,
			pub aliases: &'static [&'static str],
			pub family: crate::lane::CommandFamily,
		}

		static ALL_COMMANDS: &[CommandMeta] = &[ #(#meta_entries),* ];

		/// Every known command, in declaration order.
		pub fn all_commands() -> &'static [CommandMeta] {
			ALL_COMMANDS
		}

		/// Resolves a canonical name or alias to its `CommandId`.
		pub fn lookup_command(name: &str) -> Option<CommandId> {
			match name {
				#(#lookup_arms)*
				_ => None,
			}
		}

		/// The canonical (first-listed) name for a command.
		pub fn command_name(id: CommandId) -> &'static str {
			command_meta(id).canonical
		}

		/// Full static metadata for a command id.
		pub fn command_meta(id: CommandId) -> &'static CommandMeta {
			match id {
				#(#meta_match_arms)*
			}
		}
	})
}
