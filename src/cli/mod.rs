//! Command-line driver
//!
//! One command per invocation against one store file:
//! tags, get, put, delete, length, verify, export, import.
//! Results are single JSON objects on stdout.

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{
    delete, export, get, import, length, put, run, run_command, tags, verify,
};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{value_json, write_error, write_response};
