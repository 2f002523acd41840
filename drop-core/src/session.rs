//! Transfer session state machine.
//!
//! ```text
//! Waiting ──PeerConnected──▶ Transferring ──TransferCompleted──▶ Completed
//!    │                            │
//!    └──Cancelled/Failed──▶ Aborted ◀──TransferAborted/Cancelled/Failed
//! ```
//!
//! A session changes only through [`reduce`]. Terminal states absorb every
//! event, which settles races such as a late snapshot arriving after an
//! abort. Events carrying a connection id other than the tracked one are
//! stale and dropped.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::debug;

use crate::{
    event::TransferEvent,
    progress::{BlobProgress, ProgressTable},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Waiting,
    Transferring,
    Completed,
    Aborted,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Aborted)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferSession {
    status: SessionStatus,
    connection_id: Option<String>,
    progress: ProgressTable,
    announced: BTreeSet<String>,
    total_blob_count: usize,
    completed_blob_count: usize,
    failure: Option<String>,
}

impl TransferSession {
    /// A session waiting for its peer, expecting `total_blob_count` files.
    /// Receivers that learn the count from the peer pass 0.
    pub fn new(total_blob_count: usize) -> Self {
        Self {
            status: SessionStatus::Waiting,
            connection_id: None,
            progress: ProgressTable::default(),
            announced: BTreeSet::new(),
            total_blob_count,
            completed_blob_count: 0,
            failure: None,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn connection_id(&self) -> Option<&str> {
        self.connection_id.as_deref()
    }

    pub fn progress(&self) -> &ProgressTable {
        &self.progress
    }

    pub fn total_blob_count(&self) -> usize {
        self.total_blob_count
    }

    pub fn completed_blob_count(&self) -> usize {
        self.completed_blob_count
    }

    /// Why the session was aborted, when it was.
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn overall_percent(&self) -> u8 {
        if self.status == SessionStatus::Completed {
            return 100;
        }
        self.progress.overall_percent()
    }

    pub fn totals(&self) -> BlobProgress {
        self.progress.totals()
    }

    /// Applies `event`, returning the next state.
    pub fn apply(mut self, event: &TransferEvent) -> Self {
        if self.is_terminal() {
            debug!(
                status = ?self.status,
                ?event,
                "Ignoring event after end of session"
            );
            return self;
        }

        match event {
            TransferEvent::Cancelled => {
                self.abort("cancelled".to_string());
                return self;
            }
            TransferEvent::Failed { reason } => {
                self.abort(reason.clone());
                return self;
            }
            _ => {}
        }

        match (self.status, event) {
            (
                SessionStatus::Waiting,
                TransferEvent::PeerConnected {
                    connection_id,
                    blob_count,
                },
            ) => {
                self.status = SessionStatus::Transferring;
                self.connection_id = Some(connection_id.clone());
                self.announced.clear();
                self.completed_blob_count = 0;
                if let Some(count) = blob_count {
                    self.total_blob_count = *count;
                }
            }
            (SessionStatus::Transferring, event) if !self.tracks(event) => {
                debug!(
                    tracked = ?self.connection_id,
                    ?event,
                    "Ignoring event from another connection"
                );
            }
            (
                SessionStatus::Transferring,
                TransferEvent::BlobCompleted { name, .. },
            ) => {
                self.announced.insert(name.clone());
                self.progress.mark_complete(name);
                self.recount();
            }
            (
                SessionStatus::Transferring,
                TransferEvent::ProgressSnapshot { blobs, .. },
            ) => {
                self.progress.apply_snapshot(blobs.iter().cloned());
                self.recount();
            }
            (
                SessionStatus::Transferring,
                TransferEvent::TransferCompleted { .. },
            ) => {
                self.status = SessionStatus::Completed;
                // A peer that never announced a count leaves the total at
                // what was observed.
                if self.total_blob_count == 0 {
                    self.total_blob_count = self
                        .completed_blob_count
                        .max(self.progress.len());
                }
                self.completed_blob_count = self.total_blob_count;
            }
            (
                SessionStatus::Transferring,
                TransferEvent::TransferAborted { .. },
            ) => {
                self.abort("aborted by peer".to_string());
            }
            (status, event) => {
                debug!(?status, ?event, "Ignoring event in current state");
            }
        }

        self
    }

    fn tracks(&self, event: &TransferEvent) -> bool {
        match event.connection_id() {
            Some(id) => self.connection_id.as_deref() == Some(id),
            None => true,
        }
    }

    /// Files known complete either from the last snapshot or from an explicit
    /// completion event. Counting names keeps redelivered events idempotent.
    fn recount(&mut self) {
        let done: BTreeSet<&String> = self
            .progress
            .completed_names()
            .chain(self.announced.iter())
            .collect();
        let mut count = done.len();
        if self.total_blob_count > 0 {
            count = count.min(self.total_blob_count);
        }
        self.completed_blob_count = count;
    }

    fn abort(&mut self, reason: String) {
        self.status = SessionStatus::Aborted;
        self.failure = Some(reason);
    }
}

/// The session reducer: `(state, event) -> state`.
pub fn reduce(
    session: TransferSession,
    event: &TransferEvent,
) -> TransferSession {
    session.apply(event)
}

#[cfg(test)]
mod test {
    use super::*;

    fn connected(id: &str) -> TransferEvent {
        TransferEvent::PeerConnected {
            connection_id: id.into(),
            blob_count: None,
        }
    }

    fn blob_done(id: &str, name: &str) -> TransferEvent {
        TransferEvent::BlobCompleted {
            connection_id: id.into(),
            name: name.into(),
        }
    }

    fn snapshot(id: &str, blobs: Vec<BlobProgress>) -> TransferEvent {
        TransferEvent::ProgressSnapshot {
            connection_id: id.into(),
            blobs,
        }
    }

    fn aborted(id: &str) -> TransferEvent {
        TransferEvent::TransferAborted {
            connection_id: id.into(),
        }
    }

    fn completed(id: &str) -> TransferEvent {
        TransferEvent::TransferCompleted {
            connection_id: id.into(),
        }
    }

    #[test]
    fn test_connection_correlation() {
        let session = TransferSession::new(2);
        assert_eq!(session.status(), SessionStatus::Waiting);

        let session = reduce(session, &connected("c1"));
        assert_eq!(session.status(), SessionStatus::Transferring);
        assert_eq!(session.connection_id(), Some("c1"));

        let session = reduce(session, &aborted("c2"));
        assert_eq!(session.status(), SessionStatus::Transferring);

        let session = reduce(session, &aborted("c1"));
        assert_eq!(session.status(), SessionStatus::Aborted);

        for event in [connected("c1"), completed("c1"), blob_done("c1", "a")] {
            let session = reduce(session.clone(), &event);
            assert_eq!(session.status(), SessionStatus::Aborted);
        }
    }

    #[test]
    fn test_completion_is_authoritative() {
        let session = [
            connected("c1"),
            snapshot("c1", vec![BlobProgress::new("a", 10, 100)]),
            completed("c1"),
        ]
        .iter()
        .fold(TransferSession::new(3), reduce);

        assert_eq!(session.status(), SessionStatus::Completed);
        assert_eq!(session.completed_blob_count(), 3);
        assert_eq!(session.overall_percent(), 100);
    }

    #[test]
    fn test_blob_completed_counts_once() {
        let session = [
            connected("c1"),
            blob_done("c1", "a"),
            blob_done("c1", "a"),
            blob_done("c1", "b"),
        ]
        .iter()
        .fold(TransferSession::new(3), reduce);

        assert_eq!(session.completed_blob_count(), 2);
    }

    #[test]
    fn test_snapshot_recounts_and_is_idempotent() {
        let blobs = vec![
            BlobProgress::new("a", 50, 100),
            BlobProgress::new("b", 100, 100),
        ];
        let once = [connected("c1"), snapshot("c1", blobs.clone())]
            .iter()
            .fold(TransferSession::new(2), reduce);
        assert_eq!(once.completed_blob_count(), 1);
        assert_eq!(once.overall_percent(), 75);

        let twice = reduce(once.clone(), &snapshot("c1", blobs));
        assert_eq!(once, twice);
    }

    #[test]
    fn test_stale_snapshot_is_ignored() {
        let session = [
            connected("c1"),
            snapshot("c2", vec![BlobProgress::new("a", 100, 100)]),
        ]
        .iter()
        .fold(TransferSession::new(1), reduce);
        assert!(session.progress().is_empty());
        assert_eq!(session.completed_blob_count(), 0);
    }

    #[test]
    fn test_peer_announces_blob_count() {
        let session = reduce(
            TransferSession::new(0),
            &TransferEvent::PeerConnected {
                connection_id: "c1".into(),
                blob_count: Some(4),
            },
        );
        assert_eq!(session.total_blob_count(), 4);
    }

    #[test]
    fn test_completion_without_announced_count() {
        let session = [
            "c1 client connected",
            "c1 transfer blob completed h1 12 bytes",
            "c1 transfer blob completed h2 12 bytes",
            "c1 transfer blob completed h3 12 bytes",
        ]
        .iter()
        .map(|line| TransferEvent::from_legacy(line).unwrap())
        .fold(TransferSession::new(0), |s, e| reduce(s, &e));
        assert_eq!(session.completed_blob_count(), 3);
        assert_eq!(session.total_blob_count(), 0);

        let session = reduce(
            session,
            &TransferEvent::from_legacy("c1 transfer completed").unwrap(),
        );
        assert_eq!(session.status(), SessionStatus::Completed);
        assert_eq!(session.completed_blob_count(), 3);
        assert_eq!(session.total_blob_count(), 3);
    }

    #[test]
    fn test_completion_counts_snapshot_blobs() {
        let session = [
            connected("c1"),
            snapshot(
                "c1",
                vec![
                    BlobProgress::new("a", 100, 100),
                    BlobProgress::new("b", 60, 100),
                ],
            ),
            completed("c1"),
        ]
        .iter()
        .fold(TransferSession::new(0), reduce);
        assert_eq!(session.total_blob_count(), 2);
        assert_eq!(session.completed_blob_count(), 2);
    }

    #[test]
    fn test_cancel_while_waiting() {
        let session =
            reduce(TransferSession::new(1), &TransferEvent::Cancelled);
        assert_eq!(session.status(), SessionStatus::Aborted);
        assert_eq!(session.failure(), Some("cancelled"));

        let session = reduce(session, &connected("c1"));
        assert_eq!(session.status(), SessionStatus::Aborted);
    }

    #[test]
    fn test_failure_keeps_last_progress() {
        let session = [
            connected("c1"),
            snapshot("c1", vec![BlobProgress::new("a", 40, 100)]),
            TransferEvent::Failed {
                reason: "Receive failed: disk full".into(),
            },
        ]
        .iter()
        .fold(TransferSession::new(1), reduce);

        assert_eq!(session.status(), SessionStatus::Aborted);
        assert_eq!(session.failure(), Some("Receive failed: disk full"));
        assert_eq!(session.progress().get("a").unwrap().transferred, 40);
    }

    #[test]
    fn test_events_before_connection_are_ignored() {
        let session = [blob_done("c1", "a"), completed("c1")]
            .iter()
            .fold(TransferSession::new(1), reduce);
        assert_eq!(session.status(), SessionStatus::Waiting);
        assert_eq!(session.completed_blob_count(), 0);
    }

    #[test]
    fn test_second_connection_is_ignored() {
        let session = [connected("c1"), connected("c2"), completed("c2")]
            .iter()
            .fold(TransferSession::new(1), reduce);
        assert_eq!(session.status(), SessionStatus::Transferring);
        assert_eq!(session.connection_id(), Some("c1"));
    }
}
