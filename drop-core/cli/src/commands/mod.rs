use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Subcommand;
use drop_core::{CancelHandle, DropInstance, LocalEngine};

use crate::config::CliConfig;

mod config;
mod receive;
mod send;

/// Options shared by every subcommand.
#[derive(Clone, Debug, Default)]
pub struct Globals {
    pub spool_dir: Option<PathBuf>,
}

impl Globals {
    /// Builds a drop instance over the local spool engine.
    fn instance(&self, config: &CliConfig) -> Result<DropInstance> {
        let engine_config = config.engine_config(self.spool_dir.as_deref())?;
        std::fs::create_dir_all(&engine_config.spool_dir).with_context(
            || {
                format!(
                    "Failed to create spool directory: {}",
                    engine_config.spool_dir.display()
                )
            },
        )?;
        Ok(DropInstance::new(Arc::new(LocalEngine::new(engine_config))))
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Send(send::Send),
    Receive(receive::Receive),
    /// Manage CLI configuration
    #[command(subcommand)]
    Config(config::Config),
}

impl Commands {
    pub async fn run(&self, globals: &Globals) -> Result<()> {
        match self {
            Commands::Send(send) => send.run(globals).await,
            Commands::Receive(receive) => receive.run(globals).await,
            Commands::Config(config) => config.run(),
        }
    }
}

/// Cancels `cancel` on Ctrl+C until the returned task is aborted.
fn cancel_on_ctrl_c(cancel: CancelHandle) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("Cancelling file transfer...");
            cancel.cancel();
        }
    })
}
