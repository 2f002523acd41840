use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use tracing::{debug, info};

use crate::{
    engine::{CancelHandle, EventReceiver},
    event::TransferEvent,
    session::{reduce, TransferSession},
};

/// Observer of session changes. Called after every applied event, from the
/// task running the driver.
pub trait SessionSubscriber: Send + Sync {
    fn get_id(&self) -> String;
    fn notify_session(&self, session: &TransferSession);
}

/// Owns a [`TransferSession`] and feeds it the events of one engine call.
pub struct SessionDriver {
    session: TransferSession,
    subscribers: Arc<RwLock<HashMap<String, Arc<dyn SessionSubscriber>>>>,
}

impl SessionDriver {
    pub fn new(session: TransferSession) -> Self {
        Self {
            session,
            subscribers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn session(&self) -> &TransferSession {
        &self.session
    }

    pub fn subscribe(&self, subscriber: Arc<dyn SessionSubscriber>) {
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(subscriber.get_id(), subscriber);
    }

    pub fn unsubscribe(&self, subscriber: Arc<dyn SessionSubscriber>) {
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&subscriber.get_id());
    }

    pub fn into_session(self) -> TransferSession {
        self.session
    }

    /// Applies `event` and notifies subscribers. Events reaching an ended
    /// session are dropped without a notification.
    pub fn dispatch(&mut self, event: TransferEvent) {
        let before = self.session.status();
        if before.is_terminal() {
            debug!(?event, "Session already ended");
            return;
        }
        let session = std::mem::replace(
            &mut self.session,
            TransferSession::new(0),
        );
        self.session = reduce(session, &event);

        let after = self.session.status();
        if before != after {
            info!(?before, ?after, "Transfer session changed status");
        }

        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .for_each(|s| s.notify_session(&self.session));
    }

    /// Consumes events until the session ends or the channel closes.
    ///
    /// Cancellation moves the session to aborted right away, without waiting
    /// for the engine to acknowledge it.
    pub async fn run(
        &mut self,
        mut events: EventReceiver,
        cancel: CancelHandle,
    ) {
        while !self.session.is_terminal() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.dispatch(TransferEvent::Cancelled);
                }
                event = events.recv() => match event {
                    Some(event) => self.dispatch(event),
                    None => {
                        debug!("Event channel closed");
                        break;
                    }
                },
            }
        }
    }
}
