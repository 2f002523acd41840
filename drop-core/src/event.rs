//! Events consumed by the transfer session.
//!
//! Engine events are correlated by `connection_id`. The structured form is
//! the JSON encoding of [`TransferEvent`]; older engines emitted
//! `"<connection id> <action text>"` lines, which [`TransferEvent::from_legacy`]
//! still accepts.

use serde::{Deserialize, Serialize};

use crate::{
    error::{DropError, DropResult},
    progress::BlobProgress,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransferEvent {
    PeerConnected {
        connection_id: String,
        /// Number of files in the transfer, when the peer announces it.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        blob_count: Option<usize>,
    },
    BlobCompleted {
        connection_id: String,
        name: String,
    },
    ProgressSnapshot {
        connection_id: String,
        blobs: Vec<BlobProgress>,
    },
    TransferCompleted {
        connection_id: String,
    },
    TransferAborted {
        connection_id: String,
    },
    /// The local user asked to stop.
    Cancelled,
    /// A pending engine request resolved with an error.
    Failed {
        reason: String,
    },
}

impl TransferEvent {
    pub fn connection_id(&self) -> Option<&str> {
        match self {
            TransferEvent::PeerConnected { connection_id, .. }
            | TransferEvent::BlobCompleted { connection_id, .. }
            | TransferEvent::ProgressSnapshot { connection_id, .. }
            | TransferEvent::TransferCompleted { connection_id }
            | TransferEvent::TransferAborted { connection_id } => {
                Some(connection_id)
            }
            TransferEvent::Cancelled | TransferEvent::Failed { .. } => None,
        }
    }

    pub fn to_json(&self) -> DropResult<String> {
        serde_json::to_string(self)
            .map_err(|e| DropError::InvalidEvent(e.to_string()))
    }

    pub fn from_json(raw: &str) -> DropResult<Self> {
        serde_json::from_str(raw)
            .map_err(|e| DropError::InvalidEvent(e.to_string()))
    }

    /// Parses the space-delimited text form:
    ///
    /// - `<id> client connected`
    /// - `<id> transfer blob completed <hash> <index> <size>`
    /// - `<id> transfer completed <stats>`
    /// - `<id> transfer aborted`
    ///
    /// The blob hash stands in for the name, since the text form never
    /// carried one.
    pub fn from_legacy(line: &str) -> DropResult<Self> {
        let invalid = || DropError::InvalidEvent(line.to_string());

        let (connection_id, action) =
            line.trim().split_once(' ').ok_or_else(invalid)?;
        if connection_id.is_empty() {
            return Err(invalid());
        }
        let connection_id = connection_id.to_string();
        let words: Vec<&str> = action.split_whitespace().collect();

        match words.as_slice() {
            ["client", "connected"] => Ok(TransferEvent::PeerConnected {
                connection_id,
                blob_count: None,
            }),
            ["transfer", "blob", "completed", hash, ..] => {
                Ok(TransferEvent::BlobCompleted {
                    connection_id,
                    name: hash.to_string(),
                })
            }
            ["transfer", "completed", ..] => {
                Ok(TransferEvent::TransferCompleted { connection_id })
            }
            ["transfer", "aborted", ..] => {
                Ok(TransferEvent::TransferAborted { connection_id })
            }
            _ => Err(invalid()),
        }
    }
}
