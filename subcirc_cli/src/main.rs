//! `scshell` entry point.
//!
//! Reads commands from a script file or standard input and drives the
//! matching engine. Exits with status 1 when an `expect` check fails.

mod args;
mod shell;

use std::fs::File;
use std::io::{self, BufReader};
use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use args::Args;
use shell::{Shell, ShellError};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let mut shell = Shell::new();
    if args.verbose {
        shell.set_verbose();
    }

    let mut stdout = io::stdout();
    let result = match &args.script {
        Some(path) => match File::open(path) {
            Ok(file) => shell.run(BufReader::new(file), &mut stdout),
            Err(err) => {
                error!("cannot open '{path}': {err}");
                return ExitCode::FAILURE;
            }
        },
        None => shell.run(io::stdin().lock(), &mut stdout),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err @ ShellError::ExpectMismatch { .. }) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}
