use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result, anyhow};
use drop_core::{CancelHandle, SessionStatus, SessionSubscriber};

use super::{Globals, cancel_on_ctrl_c};
use crate::{config::CliConfig, display, progress::SessionProgress};

#[derive(Clone, Debug, clap::Args)]
#[command(name = "send", about = "Send files and generate a shareable ticket")]
pub struct Send {
    #[arg(required = true, help = "List of file paths to send")]
    files: Vec<PathBuf>,
    #[arg(long, help = "Print the ticket and exit without waiting")]
    no_wait: bool,
}

impl Send {
    pub async fn run(&self, globals: &Globals) -> Result<()> {
        let config = CliConfig::load()?;
        let app = globals.instance(&config)?;

        let outgoing = app
            .send_files(self.files.clone())
            .await
            .context("Failed to initiate file sending")?;

        display::display_session_info(&outgoing.ticket, !self.no_wait);
        if self.no_wait {
            return Ok(());
        }

        let progress: Arc<dyn SessionSubscriber> =
            Arc::new(SessionProgress::new("Sending"));
        let cancel = CancelHandle::new();
        let ctrl_c = cancel_on_ctrl_c(cancel.clone());
        let session = app.watch_outgoing(outgoing, &[progress], cancel).await;
        ctrl_c.abort();

        match (session.status(), session.failure()) {
            (SessionStatus::Completed, _) => {
                println!("All files sent successfully!");
                Ok(())
            }
            (SessionStatus::Aborted, Some("cancelled")) => {
                println!("Transfer cancelled");
                Ok(())
            }
            (_, failure) => Err(anyhow!(
                "Transfer aborted: {}",
                failure.unwrap_or("the offer is no longer watched")
            )),
        }
    }
}
