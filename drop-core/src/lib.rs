pub mod challenge;
pub mod confirmation;
pub mod driver;
pub mod engine;
pub mod error;
pub mod event;
pub mod local;
pub mod metadata;
pub mod progress;
pub mod session;
pub mod ticket;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use tracing::{error, info, warn};

pub use challenge::{resolve_challenge, Challenge, ChallengeOutcome};
pub use confirmation::{derive_confirmation_code, ConfirmationCode};
pub use driver::{SessionDriver, SessionSubscriber};
pub use engine::{
    event_channel, CancelHandle, EventReceiver, EventSender, ReceiveRequest,
    TransferEngine,
};
pub use error::{DropError, DropResult};
pub use event::TransferEvent;
pub use local::{LocalEngine, LocalEngineConfig};
pub use progress::{estimated_time_remaining, BlobProgress, ProgressTable};
pub use session::{reduce, SessionStatus, TransferSession};
pub use ticket::Ticket;

/// Extra attempts at building a challenge before giving up.
const CHALLENGE_RETRIES: usize = 2;

/// An offer published by [`DropInstance::send_files`].
#[derive(Clone, Debug)]
pub struct Outgoing {
    pub ticket: Ticket,
    pub session: TransferSession,
}

/// A decoded ticket whose confirmation code the user still has to pick.
#[derive(Clone, Debug)]
pub struct PendingReceive {
    ticket: Ticket,
    challenge: Challenge,
}

impl PendingReceive {
    pub fn ticket(&self) -> &Ticket {
        &self.ticket
    }

    pub fn challenge(&self) -> &Challenge {
        &self.challenge
    }

    /// Returns the ticket to receive with when `selected` is the code shown
    /// on the sender, or `None` when the pairing attempt must be dropped.
    pub fn confirm(self, selected: u8) -> Option<Ticket> {
        match self.challenge.resolve(selected) {
            ChallengeOutcome::Match => Some(self.ticket),
            ChallengeOutcome::Mismatch => {
                warn!(selected, "Confirmation code mismatch");
                None
            }
        }
    }
}

pub struct DropInstance {
    engine: Arc<dyn TransferEngine>,
}

impl DropInstance {
    pub fn new(engine: Arc<dyn TransferEngine>) -> Self {
        Self { engine }
    }

    pub async fn send_files(
        &self,
        files: Vec<PathBuf>,
    ) -> DropResult<Outgoing> {
        let count = files.len();
        let handle = self.engine.share(files).await.map_err(|e| match e {
            DropError::TicketGenerationFailed(_) => e,
            other => DropError::TicketGenerationFailed(other.to_string()),
        })?;
        let ticket = Ticket::for_handle(handle)
            .map_err(|e| DropError::TicketGenerationFailed(e.to_string()))?;

        info!(%ticket, files = count, "Files ready to send");
        Ok(Outgoing {
            ticket,
            session: TransferSession::new(count),
        })
    }

    /// Follows an offer from the sending side until a receiver finishes,
    /// aborts, or `cancel` fires.
    pub async fn watch_outgoing(
        &self,
        outgoing: Outgoing,
        subscribers: &[Arc<dyn SessionSubscriber>],
        cancel: CancelHandle,
    ) -> TransferSession {
        let Outgoing { ticket, session } = outgoing;
        let mut driver = SessionDriver::new(session);
        subscribers.iter().for_each(|s| driver.subscribe(s.clone()));

        let (tx, rx) = event_channel();
        let (result, ()) = tokio::join!(
            self.engine.watch_offer(
                ticket.handle().to_string(),
                tx,
                cancel.clone()
            ),
            driver.run(rx, cancel),
        );
        if let Err(e) = result {
            error!("Watching offer {ticket} failed: {e}");
            driver.dispatch(TransferEvent::Failed {
                reason: e.to_string(),
            });
        }
        driver.into_session()
    }

    /// Decodes `raw` and builds the three-code challenge for it.
    pub fn prepare_receive(&self, raw: &str) -> DropResult<PendingReceive> {
        let ticket = ticket::decode(raw)?;
        ticket.verify()?;

        let mut attempt = 0;
        let challenge = loop {
            match Challenge::build(ticket.code()) {
                Ok(challenge) => break challenge,
                Err(e) if e.is_transient() && attempt < CHALLENGE_RETRIES => {
                    warn!("Rebuilding pairing challenge: {e}");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        };

        Ok(PendingReceive { ticket, challenge })
    }

    pub fn is_valid_ticket(&self, raw: &str) -> bool {
        ticket::decode(raw)
            .and_then(|t| t.verify().map(|_| t))
            .is_ok_and(|t| self.engine.is_valid_handle(t.handle()))
    }

    /// Downloads the files behind a confirmed ticket into `out_dir`.
    ///
    /// The returned session is terminal unless the engine stopped without
    /// resolving it either way.
    pub async fn receive_files(
        &self,
        ticket: Ticket,
        out_dir: PathBuf,
        subscribers: &[Arc<dyn SessionSubscriber>],
        cancel: CancelHandle,
    ) -> TransferSession {
        let mut driver = SessionDriver::new(TransferSession::new(0));
        subscribers.iter().for_each(|s| driver.subscribe(s.clone()));

        let (tx, rx) = event_channel();
        let request = ReceiveRequest {
            ticket,
            out_dir,
            events: tx,
            cancel: cancel.clone(),
        };
        let (result, ()) = tokio::join!(
            self.engine.receive_files(request),
            driver.run(rx, cancel),
        );

        match result {
            Ok(dir) => {
                info!("Files received into {}", dir.display());
                let tracked =
                    driver.session().connection_id().map(str::to_string);
                match tracked {
                    Some(connection_id) => {
                        driver.dispatch(TransferEvent::TransferCompleted {
                            connection_id,
                        })
                    }
                    None => driver.dispatch(TransferEvent::Failed {
                        reason: "engine finished before a peer connected"
                            .to_string(),
                    }),
                }
            }
            Err(e) => {
                let e = match e {
                    DropError::ReceiveFailed(_) => e,
                    other => DropError::ReceiveFailed(other.to_string()),
                };
                error!("{e}");
                driver.dispatch(TransferEvent::Failed {
                    reason: e.to_string(),
                });
            }
        }
        driver.into_session()
    }

    /// Opens `dir` in the platform file manager. Failures are only logged.
    pub fn open_directory(&self, dir: &Path) {
        if let Err(e) = self.engine.open_directory(dir) {
            warn!("{e}");
        }
    }
}
