//! CLI module for aeroquery
//!
//! Provides command-line interface for:
//! - compile: Compile a query definition to its backend form
//! - explain: Describe how a query compiles, or why it was rejected
//! - filter: Strip protected fields from records for a caller

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command, FilterArgs, QueryArgs};
pub use commands::{compile, compile_value, explain, explain_plan, filter, filter_value, run, run_command};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{read_json_file, write_response, write_text};
