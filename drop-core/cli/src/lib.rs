//! arkdrop-cli library
//!
//! Command line front end for `drop_core`: the sender publishes files and
//! prints a ticket with its confirmation code, the receiver picks the code
//! shown on the sender before anything is downloaded.
//!
//! Configuration
//! - Stored in $XDG_CONFIG_HOME/arkdrop/config.toml or
//!   $HOME/.config/arkdrop/config.toml if XDG_CONFIG_HOME is not set.
//!
//! Logging
//! - Diagnostics go to stderr through `tracing`. `RUST_LOG` takes
//!   precedence; otherwise `--verbose` selects `debug` and the default is
//!   `warn`.
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

pub mod commands;
pub mod config;
pub mod display;
pub mod progress;

use commands::{Commands, Globals};

#[derive(Parser, Debug)]
#[command(
    name = "arkdrop-cli",
    version,
    about = "ARK Drop tool for sending and receiving files",
    long_about = None
)]
pub struct Cli {
    #[arg(short, long, global = true, help = "Show debug logs")]
    pub verbose: bool,
    #[arg(
        long,
        global = true,
        env = "ARKDROP_SPOOL_DIR",
        value_name = "DIR",
        help = "Directory where offers are published"
    )]
    pub spool_dir: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let globals = Globals {
        spool_dir: cli.spool_dir,
    };
    cli.command.run(&globals).await
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
