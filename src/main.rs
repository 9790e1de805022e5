//! tagstore CLI entry point
//!
//! Parses arguments and dispatches through `cli::run`. Errors have already
//! been reported as JSON on stdout; the text form goes to stderr.

use tagstore::cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
