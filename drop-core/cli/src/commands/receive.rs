use std::{io, path::PathBuf, sync::Arc};

use anyhow::{Context, Result, anyhow};
use drop_core::{CancelHandle, SessionStatus, SessionSubscriber};
use uuid::Uuid;

use super::{Globals, cancel_on_ctrl_c};
use crate::{config::CliConfig, display, progress::SessionProgress};

#[derive(Clone, Debug, clap::Args)]
#[command(
    name = "receive",
    about = "Receive files using a ticket and its confirmation code"
)]
pub struct Receive {
    #[arg(help = "Ticket string shown by the sender")]
    ticket: String,
    #[arg(short, long, help = "Parent directory for received files")]
    output: Option<PathBuf>,
    #[arg(long, requires = "output", help = "Remember --output as default")]
    save_dir: bool,
    #[arg(
        short,
        long,
        value_name = "CODE",
        help = "Confirmation code shown by the sender; asked for when absent"
    )]
    confirm: Option<u8>,
    #[arg(long, help = "Open the output directory when done")]
    open: bool,
}

impl Receive {
    pub async fn run(&self, globals: &Globals) -> Result<()> {
        let mut config = CliConfig::load()?;
        let app = globals.instance(&config)?;

        let pending = app
            .prepare_receive(self.ticket.trim())
            .context("Failed to read ticket")?;

        let selected = match self.confirm {
            Some(code) => code,
            None => display::read_choice(
                pending.challenge(),
                &mut io::stdin().lock(),
                &mut io::stdout(),
            )?,
        };
        let ticket = pending.confirm(selected).ok_or_else(|| {
            anyhow!(
                "Confirmation code {selected:02} does not match the sender"
            )
        })?;

        let output_dir = match &self.output {
            Some(dir) => {
                if self.save_dir {
                    config.default_receive_dir =
                        Some(dir.display().to_string());
                    config
                        .save()
                        .context("Failed to save default receive directory")?;
                    println!(
                        "Saved '{}' as default receive directory",
                        dir.display()
                    );
                }
                dir.clone()
            }
            None => config.receive_dir(),
        };
        let receiving_path = output_dir.join(Uuid::new_v4().to_string());

        println!("Files will be saved to: {}", receiving_path.display());
        println!("Receiving files... (Press Ctrl+C to cancel)");

        let progress: Arc<dyn SessionSubscriber> =
            Arc::new(SessionProgress::new("Receiving"));
        let cancel = CancelHandle::new();
        let ctrl_c = cancel_on_ctrl_c(cancel.clone());
        let session = app
            .receive_files(ticket, receiving_path.clone(), &[progress], cancel)
            .await;
        ctrl_c.abort();

        if session.status() != SessionStatus::Completed {
            return Err(anyhow!(
                "Transfer aborted: {}",
                session.failure().unwrap_or("unknown reason")
            ));
        }

        println!("All files received successfully!");
        if self.open {
            app.open_directory(&receiving_path);
        }
        Ok(())
    }
}
