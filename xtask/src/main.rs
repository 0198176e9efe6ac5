// Licensed under the Apache-2.0 license

mod check;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "rp-i2c-dma development tasks", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run host unit tests
    Test {
        /// Only run tests whose name contains this string
        filter: Option<String>,
    },
    /// Cross-check the library for the bare-metal targets
    Check {
        /// Check a single target triple instead of the default set
        #[arg(long)]
        target: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Test { filter } => test::run(filter.as_deref()),
        Commands::Check { target } => check::run(target.as_deref()),
    }
}
