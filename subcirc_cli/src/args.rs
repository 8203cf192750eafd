//! Command-line arguments for `scshell`.

use clap::Parser;

/// Line-oriented driver for the subcircuit matching engine.
#[derive(Parser, Debug)]
#[command(name = "scshell")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Script to execute; reads standard input when omitted.
    pub script: Option<String>,

    /// Enable per-step trace output.
    #[arg(short = 'v', long, default_value_t = false)]
    pub verbose: bool,
}
