// CLI module
// Command-line interface, argument parsing and subcommand runners

mod args;
mod commands;

pub use args::{AccountKind, CliArgs, Command, OpenAccountArgs, ReconcileArgs};
pub use commands::run;

use clap::Parser;

/// Parse command-line arguments using clap
///
/// If parsing fails (invalid arguments, a missing subcommand, or `--help`),
/// clap prints an error or the help text and exits the process.
pub fn parse_args() -> CliArgs {
    CliArgs::parse()
}
