use thiserror::Error;

pub type DropResult<T> = Result<T, DropError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DropError {
    #[error("Invalid ticket: {0}")]
    InvalidTicket(String),
    #[error("Could not build a pairing challenge after {0} draws")]
    ChallengeGenerationFailed(usize),
    #[error("Ticket generation failed: {0}")]
    TicketGenerationFailed(String),
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),
    #[error("Transfer rate unavailable")]
    RateUnavailable,
    #[error("Invalid event: {0}")]
    InvalidEvent(String),
    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),
    #[error("Could not open {0}")]
    OpenFailed(String),
}

impl DropError {
    /// Whether rebuilding the failed value may succeed without new input
    /// from the user.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DropError::ChallengeGenerationFailed(_)
                | DropError::RateUnavailable
        )
    }
}
