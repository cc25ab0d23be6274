//! The result envelope (spec §6, §7): one deterministic JSON record per
//! invocation, shape-projected then format-rendered.

mod format;
mod model;
mod result_builder;
mod shape;

pub use format::OutputFormat;
pub use model::{CommandError, CommandResult};
pub use result_builder::{ResultBuilder, print_error_stderr, print_result, render_dispatch_error, render_handler_error, render_outcome};
pub use shape::project;
