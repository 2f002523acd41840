use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;

use crate::config::CliConfig;

#[derive(Subcommand, Debug, Clone)]
pub enum Config {
    #[command(about = "Show the current configuration")]
    Show,
    #[command(about = "Set the default directory for received files")]
    SetReceiveDir {
        #[arg(help = "Directory to store received files in")]
        dir: PathBuf,
    },
    #[command(about = "Forget the default receive directory")]
    ClearReceiveDir,
}

impl Config {
    pub fn run(&self) -> Result<()> {
        let mut config = CliConfig::load()?;
        match self {
            Config::Show => {
                match &config.default_receive_dir {
                    Some(dir) => println!("Default receive directory: {dir}"),
                    None => println!(
                        "No default receive directory set (using {})",
                        config.receive_dir().display()
                    ),
                }
                match config.spool_dir(None) {
                    Ok(dir) => println!("Spool directory: {}", dir.display()),
                    Err(e) => println!("Spool directory: unavailable ({e})"),
                }
                if let Some(chunk_size) = config.chunk_size {
                    println!("Chunk size: {chunk_size} bytes");
                }
                println!(
                    "Config file: {}",
                    CliConfig::config_file()?.display()
                );
            }
            Config::SetReceiveDir { dir } => {
                config.default_receive_dir = Some(dir.display().to_string());
                config
                    .save()
                    .context("Failed to save default receive directory")?;
                println!("Default receive directory set to {}", dir.display());
            }
            Config::ClearReceiveDir => {
                config.default_receive_dir = None;
                config.save()?;
                println!("Default receive directory cleared");
            }
        }
        Ok(())
    }
}
