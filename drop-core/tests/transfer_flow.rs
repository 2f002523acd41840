use std::{
    fs,
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};

use drop_core::{
    CancelHandle, ChallengeOutcome, DropInstance, LocalEngine,
    LocalEngineConfig, SessionStatus, SessionSubscriber, TransferSession,
};
use tempfile::TempDir;

struct Recorder {
    sessions: Mutex<Vec<TransferSession>>,
}

impl Recorder {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            sessions: Mutex::new(Vec::new()),
        })
    }

    fn statuses(&self) -> Vec<SessionStatus> {
        self.sessions
            .lock()
            .unwrap()
            .iter()
            .map(|s| s.status())
            .collect()
    }
}

impl SessionSubscriber for Recorder {
    fn get_id(&self) -> String {
        "recorder".to_string()
    }

    fn notify_session(&self, session: &TransferSession) {
        self.sessions.lock().unwrap().push(session.clone());
    }
}

fn instance(spool: &TempDir) -> DropInstance {
    let config = LocalEngineConfig::new(spool.path()).with_chunk_size(3);
    DropInstance::new(Arc::new(LocalEngine::new(config)))
}

fn sample_files(dir: &TempDir) -> Vec<PathBuf> {
    [("a.txt", "alpha"), ("b.txt", "bravo!"), ("c.txt", "")]
        .iter()
        .map(|(name, content)| {
            let path = dir.path().join(name);
            fs::write(&path, content).unwrap();
            path
        })
        .collect()
}

#[tokio::test]
async fn test_send_and_receive() {
    let spool = TempDir::new().unwrap();
    let src = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let app = instance(&spool);

    let outgoing = app.send_files(sample_files(&src)).await.unwrap();
    assert_eq!(outgoing.session.total_blob_count(), 3);
    assert_eq!(outgoing.session.status(), SessionStatus::Waiting);

    let raw = outgoing.ticket.to_string();
    assert!(app.is_valid_ticket(&raw));

    let pending = app.prepare_receive(&raw).unwrap();
    let shown = outgoing.ticket.code();
    assert!(pending.challenge().options().contains(&shown));
    assert_eq!(
        pending.challenge().clone().resolve(shown.value()),
        ChallengeOutcome::Match
    );
    let ticket = pending.confirm(shown.value()).unwrap();

    let recorder = Recorder::new();
    let subscribers: Vec<Arc<dyn SessionSubscriber>> =
        vec![recorder.clone()];
    let session = app
        .receive_files(
            ticket,
            out.path().to_path_buf(),
            &subscribers,
            CancelHandle::new(),
        )
        .await;

    assert_eq!(session.status(), SessionStatus::Completed);
    assert_eq!(session.total_blob_count(), 3);
    assert_eq!(session.completed_blob_count(), 3);
    assert_eq!(session.overall_percent(), 100);
    assert_eq!(
        fs::read_to_string(out.path().join("a.txt")).unwrap(),
        "alpha"
    );
    assert_eq!(
        fs::read_to_string(out.path().join("b.txt")).unwrap(),
        "bravo!"
    );
    assert!(out.path().join("c.txt").is_file());

    let statuses = recorder.statuses();
    assert_eq!(statuses.first(), Some(&SessionStatus::Transferring));
    assert_eq!(statuses.last(), Some(&SessionStatus::Completed));
}

#[tokio::test]
async fn test_sender_follows_receiver() {
    let spool = TempDir::new().unwrap();
    let src = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let app = Arc::new(instance(&spool));

    let outgoing = app.send_files(sample_files(&src)).await.unwrap();
    let ticket = outgoing.ticket.clone();

    let sender = {
        let app = app.clone();
        tokio::spawn(async move {
            app.watch_outgoing(outgoing, &[], CancelHandle::new()).await
        })
    };

    let pending = app.prepare_receive(&ticket.to_string()).unwrap();
    let ticket = pending.confirm(ticket.code().value()).unwrap();
    let received = app
        .receive_files(
            ticket,
            out.path().to_path_buf(),
            &[],
            CancelHandle::new(),
        )
        .await;
    assert_eq!(received.status(), SessionStatus::Completed);

    let sent = tokio::time::timeout(Duration::from_secs(5), sender)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sent.status(), SessionStatus::Completed);
    assert_eq!(sent.completed_blob_count(), 3);
    assert_eq!(sent.connection_id(), received.connection_id());
}

#[tokio::test]
async fn test_sender_cancel_withdraws_offer() {
    let spool = TempDir::new().unwrap();
    let src = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let app = instance(&spool);

    let outgoing = app.send_files(sample_files(&src)).await.unwrap();
    let raw = outgoing.ticket.to_string();

    let cancel = CancelHandle::new();
    cancel.cancel();
    let sent = app.watch_outgoing(outgoing, &[], cancel).await;
    assert_eq!(sent.status(), SessionStatus::Aborted);
    assert_eq!(sent.failure(), Some("cancelled"));
    assert!(!app.is_valid_ticket(&raw));

    let pending = app.prepare_receive(&raw).unwrap();
    let code = pending.ticket().code().value();
    let ticket = pending.confirm(code).unwrap();
    let received = app
        .receive_files(
            ticket,
            out.path().to_path_buf(),
            &[],
            CancelHandle::new(),
        )
        .await;
    assert_eq!(received.status(), SessionStatus::Aborted);
    assert!(received.failure().unwrap().contains("withdrawn"));
}

#[tokio::test]
async fn test_receive_unknown_handle_aborts() {
    let spool = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let app = instance(&spool);

    let ticket = drop_core::Ticket::for_handle("0123abcd").unwrap();
    assert!(!app.is_valid_ticket(&ticket.to_string()));

    let session = app
        .receive_files(
            ticket,
            out.path().to_path_buf(),
            &[],
            CancelHandle::new(),
        )
        .await;
    assert_eq!(session.status(), SessionStatus::Aborted);
    assert!(session.failure().unwrap().starts_with("Receive failed"));
}

#[tokio::test]
async fn test_wrong_code_drops_pairing() {
    let spool = TempDir::new().unwrap();
    let src = TempDir::new().unwrap();
    let app = instance(&spool);

    let outgoing = app.send_files(sample_files(&src)).await.unwrap();
    let pending = app.prepare_receive(&outgoing.ticket.to_string()).unwrap();
    let correct = outgoing.ticket.code();
    let wrong = pending
        .challenge()
        .distractors()
        .iter()
        .find(|c| **c != correct)
        .unwrap()
        .value();
    assert!(pending.confirm(wrong).is_none());
}

#[test]
fn test_prepare_rejects_tampered_ticket() {
    let spool = TempDir::new().unwrap();
    let app = instance(&spool);
    assert!(app.prepare_receive("no-separator").is_err());
    assert!(app.prepare_receive("abc:100").is_err());
    assert!(!app.is_valid_ticket("abc:7"));
}

#[tokio::test]
async fn test_send_rejects_missing_file() {
    let spool = TempDir::new().unwrap();
    let app = instance(&spool);
    let err = app
        .send_files(vec![spool.path().join("nope.txt")])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("File does not exist"));
}
