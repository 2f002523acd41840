use std::{
    collections::HashMap,
    sync::{
        Mutex, RwLock,
        atomic::{AtomicBool, Ordering},
    },
    time::Instant,
};

use drop_core::{
    BlobProgress, SessionStatus, SessionSubscriber, TransferSession,
    estimated_time_remaining,
};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use uuid::Uuid;

use crate::display::format_eta;

/// Per-file bars plus an overall bar, fed from session snapshots.
pub struct SessionProgress {
    id: String,
    verb: &'static str,
    mp: MultiProgress,
    overall: ProgressBar,
    bars: RwLock<HashMap<String, ProgressBar>>,
    connected: AtomicBool,
    // First observation with bytes known, used for the average rate.
    start: Mutex<Option<(Instant, BlobProgress)>>,
}

impl SessionProgress {
    pub fn new(verb: &'static str) -> Self {
        let mp = MultiProgress::new();
        let overall = mp.add(ProgressBar::new(0));
        overall.set_style(Self::overall_style());
        overall.set_message("waiting for peer");
        Self {
            id: Uuid::new_v4().to_string(),
            verb,
            mp,
            overall,
            bars: RwLock::new(HashMap::new()),
            connected: AtomicBool::new(false),
            start: Mutex::new(None),
        }
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::with_template(
            "{spinner:.green} {msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
    }

    fn overall_style() -> ProgressStyle {
        ProgressStyle::with_template(
            "{prefix:.bold} [{bar:40.green/white}] {percent:>3}% {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
    }

    fn eta(&self, totals: &BlobProgress) -> String {
        let mut start = match self.start.lock() {
            Ok(start) => start,
            Err(_) => return format_eta(None),
        };
        if let Some((at, first)) = start.as_ref() {
            return format_eta(
                estimated_time_remaining(first, totals, at.elapsed()).ok(),
            );
        }
        *start = Some((Instant::now(), totals.clone()));
        format_eta(None)
    }

    fn update_files(&self, session: &TransferSession) {
        let mut bars = match self.bars.write() {
            Ok(bars) => bars,
            Err(e) => {
                eprintln!("Error accessing progress bars: {e}");
                return;
            }
        };
        for blob in session.progress().iter() {
            let pb = bars.entry(blob.name.clone()).or_insert_with(|| {
                let pb = ProgressBar::new(blob.total);
                let pb = self.mp.insert_before(&self.overall, pb);
                pb.set_style(Self::bar_style());
                pb.set_message(format!("{} {}", self.verb, blob.name));
                pb
            });
            if pb.is_finished() {
                continue;
            }
            pb.set_length(blob.total);
            pb.set_position(blob.transferred);
            if blob.is_complete() {
                pb.finish_with_message(format!("[DONE] {}", blob.name));
            }
        }
    }
}

impl SessionSubscriber for SessionProgress {
    fn get_id(&self) -> String {
        self.id.clone()
    }

    fn notify_session(&self, session: &TransferSession) {
        if session.connection_id().is_some()
            && !self.connected.swap(true, Ordering::Relaxed)
        {
            let _ = self.mp.println(format!(
                "Connected: {} file(s) to transfer",
                session.total_blob_count()
            ));
        }

        self.update_files(session);

        let totals = session.totals();
        self.overall.set_prefix(self.verb);
        self.overall.set_length(totals.total);
        self.overall.set_position(totals.transferred);

        match session.status() {
            SessionStatus::Waiting => {}
            SessionStatus::Transferring => {
                self.overall.set_message(format!(
                    "{}/{} files, ETA {}",
                    session.completed_blob_count(),
                    session.total_blob_count(),
                    self.eta(&totals)
                ));
            }
            SessionStatus::Completed => {
                self.overall.set_position(totals.total);
                self.overall.finish_with_message(format!(
                    "{}/{} files",
                    session.completed_blob_count(),
                    session.total_blob_count()
                ));
            }
            SessionStatus::Aborted => {
                self.overall.abandon_with_message(format!(
                    "aborted: {}",
                    session.failure().unwrap_or("unknown reason")
                ));
            }
        }
    }
}
