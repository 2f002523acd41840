use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use futures::future::BoxFuture;
use tokio::sync::{mpsc, watch};

use crate::{error::DropResult, event::TransferEvent, ticket::Ticket};

pub type EventSender = mpsc::UnboundedSender<TransferEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<TransferEvent>;

pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Byte transport between two devices.
///
/// Implementations push [`TransferEvent`]s while a call is pending; the
/// resolution of the call itself is reported through its return value.
pub trait TransferEngine: Send + Sync {
    /// Offers `paths` to a future receiver and returns the content handle.
    fn share(&self, paths: Vec<PathBuf>) -> BoxFuture<'_, DropResult<String>>;

    fn is_valid_handle(&self, handle: &str) -> bool;

    /// Downloads the files behind `request.ticket` into `request.out_dir`.
    fn receive_files(
        &self,
        request: ReceiveRequest,
    ) -> BoxFuture<'_, DropResult<PathBuf>>;

    /// Streams the sender-side events of an offer until the transfer ends
    /// or `cancel` fires.
    fn watch_offer(
        &self,
        handle: String,
        events: EventSender,
        cancel: CancelHandle,
    ) -> BoxFuture<'_, DropResult<()>>;

    fn open_directory(&self, dir: &Path) -> DropResult<()>;
}

pub struct ReceiveRequest {
    pub ticket: Ticket,
    pub out_dir: PathBuf,
    pub events: EventSender,
    pub cancel: CancelHandle,
}

/// Shared cancellation intent between the UI, the session driver and the
/// engine.
#[derive(Clone, Debug)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelHandle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_cancel_wakes_waiter() {
        let cancel = CancelHandle::new();
        let waiter = {
            let cancel = cancel.clone();
            tokio::spawn(async move { cancel.cancelled().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!cancel.is_cancelled());

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_resolves_when_already_cancelled() {
        let cancel = CancelHandle::new();
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), cancel.cancelled())
            .await
            .unwrap();
    }
}
