//! # Kit Merge CLI
//!
//! This is the binary entry point for the `kit-merge` command-line tool.
//!
//! Its primary responsibilities are:
//! - Parsing command-line arguments using `clap`.
//! - Setting up logging.
//! - Executing the selected command and mapping failures to an exit status.
//!
//! The generation logic lives in the `kit_merge` library; the binary is a
//! thin wrapper around it.

mod cli;
mod commands;

use clap::Parser;

fn main() {
    let cli = cli::Cli::parse();
    if let Err(err) = cli.execute() {
        eprintln!("Error: {:#}", err);
        let code = err
            .downcast_ref::<kit_merge::error::Error>()
            .map(|e| e.exit_code())
            .unwrap_or(1);
        std::process::exit(code);
    }
}
