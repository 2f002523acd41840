//! Loopback engine backed by a spool directory.
//!
//! Every offer lives in `<spool>/<handle>/`:
//!
//! - `collection`: postcard-encoded [`CollectionMetadata`]
//! - `events`: JSON lines appended by receivers, read by the sender
//! - `withdrawn`: present once the sender cancelled the offer
//!
//! Sender and receiver may be separate processes sharing the spool.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    time::Duration,
};

use futures::future::BoxFuture;
use tokio::{
    fs::{self, File, OpenOptions},
    io::{AsyncReadExt, AsyncWriteExt},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    engine::{CancelHandle, EventSender, ReceiveRequest, TransferEngine},
    error::{DropError, DropResult},
    event::TransferEvent,
    metadata::{CollectionFile, CollectionMetadata},
    progress::BlobProgress,
};

const COLLECTION_FILE: &str = "collection";
const EVENTS_FILE: &str = "events";
const WITHDRAWN_FILE: &str = "withdrawn";
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalEngineConfig {
    pub spool_dir: PathBuf,
    pub chunk_size: u64,
}

impl LocalEngineConfig {
    pub const DEFAULT_CHUNK_SIZE: u64 = 64 * 1024;

    pub fn new(spool_dir: impl Into<PathBuf>) -> Self {
        Self {
            spool_dir: spool_dir.into(),
            chunk_size: Self::DEFAULT_CHUNK_SIZE,
        }
    }

    /// A chunk size of 0 is treated as 1.
    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }
}

pub struct LocalEngine {
    config: LocalEngineConfig,
}

impl LocalEngine {
    pub fn new(config: LocalEngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LocalEngineConfig {
        &self.config
    }

    fn offer_dir(&self, handle: &str) -> PathBuf {
        self.config.spool_dir.join(handle)
    }

    async fn create_offer(&self, paths: Vec<PathBuf>) -> DropResult<String> {
        if paths.is_empty() {
            return Err(DropError::TicketGenerationFailed(
                "Cannot send an empty list of files".to_string(),
            ));
        }

        let mut names = HashSet::new();
        let mut files = Vec::with_capacity(paths.len());
        for path in &paths {
            let metadata = fs::metadata(path).await.map_err(|_| {
                DropError::TicketGenerationFailed(format!(
                    "File does not exist: {}",
                    path.display()
                ))
            })?;
            if !metadata.is_file() {
                return Err(DropError::TicketGenerationFailed(format!(
                    "Path is not a file: {}",
                    path.display()
                )));
            }
            let name = file_name_of(path)?;
            if !names.insert(name.clone()) {
                return Err(DropError::TicketGenerationFailed(format!(
                    "Duplicate file name: {name}"
                )));
            }
            let path = fs::canonicalize(path).await.map_err(|e| {
                DropError::TicketGenerationFailed(format!(
                    "{}: {e}",
                    path.display()
                ))
            })?;
            files.push(CollectionFile {
                name,
                path,
                len: metadata.len(),
            });
        }

        let collection = CollectionMetadata::new(files);
        let bytes = collection.to_bytes()?;

        let handle = Uuid::new_v4().simple().to_string();
        let dir = self.offer_dir(&handle);
        let spool_err = |e: std::io::Error| {
            DropError::TicketGenerationFailed(e.to_string())
        };
        fs::create_dir_all(&dir).await.map_err(spool_err)?;
        fs::write(dir.join(COLLECTION_FILE), bytes)
            .await
            .map_err(spool_err)?;
        File::create(dir.join(EVENTS_FILE))
            .await
            .map_err(spool_err)?;

        info!(
            %handle,
            files = collection.files.len(),
            bytes = collection.total_len(),
            "Offer created"
        );
        Ok(handle)
    }

    async fn load_collection(
        &self,
        handle: &str,
    ) -> DropResult<CollectionMetadata> {
        if !is_handle_shaped(handle) {
            return Err(DropError::ReceiveFailed(format!(
                "Malformed handle: {handle}"
            )));
        }
        let dir = self.offer_dir(handle);
        if is_withdrawn(&dir).await {
            return Err(DropError::ReceiveFailed(
                "Offer was withdrawn by the sender".to_string(),
            ));
        }
        let bytes = fs::read(dir.join(COLLECTION_FILE)).await.map_err(|_| {
            DropError::ReceiveFailed(format!("No offer for handle {handle}"))
        })?;
        CollectionMetadata::from_bytes(&bytes)
    }

    async fn receive(&self, request: ReceiveRequest) -> DropResult<PathBuf> {
        let ReceiveRequest {
            ticket,
            out_dir,
            events,
            cancel,
        } = request;
        let handle = ticket.handle();

        let collection = self.load_collection(handle).await?;
        fs::create_dir_all(&out_dir)
            .await
            .map_err(|e| DropError::ReceiveFailed(e.to_string()))?;

        let offer_dir = self.offer_dir(handle);
        let mut emitter = Emitter::open(&offer_dir, events).await?;
        let connection_id = Uuid::new_v4().to_string();
        info!(handle, %connection_id, "Connected to offer");

        emitter
            .emit(TransferEvent::PeerConnected {
                connection_id: connection_id.clone(),
                blob_count: Some(collection.files.len()),
            })
            .await;

        let mut copier = Copier {
            connection_id: &connection_id,
            offer_dir: &offer_dir,
            out_dir: &out_dir,
            chunk_size: self.config.chunk_size.max(1),
            cancel: &cancel,
            emitter: &mut emitter,
            blobs: collection
                .files
                .iter()
                .map(|f| BlobProgress::new(&f.name, 0, f.len))
                .collect(),
        };

        let copied = copier.copy_all(&collection.files).await;
        match copied {
            Ok(()) => {
                emitter
                    .emit(TransferEvent::TransferCompleted {
                        connection_id: connection_id.clone(),
                    })
                    .await;
                info!(%connection_id, "Transfer completed");
                Ok(out_dir)
            }
            Err(e) => {
                warn!(%connection_id, "Transfer aborted: {e}");
                emitter
                    .emit(TransferEvent::TransferAborted { connection_id })
                    .await;
                Err(e)
            }
        }
    }

    async fn watch(
        &self,
        handle: String,
        events: EventSender,
        cancel: CancelHandle,
    ) -> DropResult<()> {
        if !is_handle_shaped(&handle) {
            return Err(DropError::ReceiveFailed(format!(
                "Malformed handle: {handle}"
            )));
        }
        let dir = self.offer_dir(&handle);
        let mut log = File::open(dir.join(EVENTS_FILE)).await.map_err(|_| {
            DropError::ReceiveFailed(format!("No offer for handle {handle}"))
        })?;
        // Bytes read past the last complete line.
        let mut pending = Vec::new();

        loop {
            if cancel.is_cancelled() {
                fs::write(dir.join(WITHDRAWN_FILE), b"")
                    .await
                    .map_err(|e| DropError::ReceiveFailed(e.to_string()))?;
                info!(%handle, "Offer withdrawn");
                return Ok(());
            }
            if events.is_closed() {
                debug!(%handle, "Nobody is listening to the offer anymore");
                return Ok(());
            }

            log.read_to_end(&mut pending)
                .await
                .map_err(|e| DropError::ReceiveFailed(e.to_string()))?;
            forward_lines(&mut pending, &events);

            tokio::select! {
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
                _ = cancel.cancelled() => {}
            }
        }
    }
}

impl TransferEngine for LocalEngine {
    fn share(&self, paths: Vec<PathBuf>) -> BoxFuture<'_, DropResult<String>> {
        Box::pin(self.create_offer(paths))
    }

    fn is_valid_handle(&self, handle: &str) -> bool {
        if !is_handle_shaped(handle) {
            return false;
        }
        let dir = self.offer_dir(handle);
        dir.join(COLLECTION_FILE).is_file()
            && !dir.join(WITHDRAWN_FILE).exists()
    }

    fn receive_files(
        &self,
        request: ReceiveRequest,
    ) -> BoxFuture<'_, DropResult<PathBuf>> {
        Box::pin(self.receive(request))
    }

    fn watch_offer(
        &self,
        handle: String,
        events: EventSender,
        cancel: CancelHandle,
    ) -> BoxFuture<'_, DropResult<()>> {
        Box::pin(self.watch(handle, events, cancel))
    }

    fn open_directory(&self, dir: &Path) -> DropResult<()> {
        open::that(dir).map_err(|e| {
            DropError::OpenFailed(format!("{}: {e}", dir.display()))
        })
    }
}

/// Copies the files of one collection, reporting each chunk.
struct Copier<'a> {
    connection_id: &'a str,
    offer_dir: &'a Path,
    out_dir: &'a Path,
    chunk_size: u64,
    cancel: &'a CancelHandle,
    emitter: &'a mut Emitter,
    blobs: Vec<BlobProgress>,
}

impl Copier<'_> {
    async fn copy_all(&mut self, files: &[CollectionFile]) -> DropResult<()> {
        for (index, file) in files.iter().enumerate() {
            self.copy_one(index, file).await?;
            self.emitter
                .emit(TransferEvent::BlobCompleted {
                    connection_id: self.connection_id.to_string(),
                    name: file.name.clone(),
                })
                .await;
        }
        Ok(())
    }

    async fn copy_one(
        &mut self,
        index: usize,
        file: &CollectionFile,
    ) -> DropResult<()> {
        let io_err = |e: std::io::Error| {
            DropError::ReceiveFailed(format!("{}: {e}", file.name))
        };

        let mut source =
            File::open(&file.path).await.map_err(io_err)?.take(file.len);
        let mut target = File::create(self.out_dir.join(&file.name))
            .await
            .map_err(io_err)?;
        let mut buf = vec![0u8; self.chunk_size.min(file.len.max(1)) as usize];

        loop {
            if self.should_stop().await {
                return Err(DropError::ReceiveFailed(
                    "transfer cancelled".to_string(),
                ));
            }
            let read = source.read(&mut buf).await.map_err(io_err)?;
            if read == 0 {
                break;
            }
            target.write_all(&buf[..read]).await.map_err(io_err)?;

            let blob = &mut self.blobs[index];
            *blob = BlobProgress::new(
                &file.name,
                blob.transferred + read as u64,
                blob.total,
            );
            self.emitter
                .emit(TransferEvent::ProgressSnapshot {
                    connection_id: self.connection_id.to_string(),
                    blobs: self.blobs.clone(),
                })
                .await;
        }
        target.flush().await.map_err(io_err)?;

        if self.blobs[index].transferred < file.len {
            return Err(DropError::ReceiveFailed(format!(
                "{} changed since it was shared",
                file.name
            )));
        }
        Ok(())
    }

    async fn should_stop(&self) -> bool {
        self.cancel.is_cancelled() || is_withdrawn(self.offer_dir).await
    }
}

/// Pushes events to the caller and appends them to the offer's log.
struct Emitter {
    events: EventSender,
    log: File,
}

impl Emitter {
    async fn open(offer_dir: &Path, events: EventSender) -> DropResult<Self> {
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(offer_dir.join(EVENTS_FILE))
            .await
            .map_err(|e| DropError::ReceiveFailed(e.to_string()))?;
        Ok(Self { events, log })
    }

    async fn emit(&mut self, event: TransferEvent) {
        match event.to_json() {
            Ok(mut line) => {
                line.push('\n');
                if let Err(e) = self.log.write_all(line.as_bytes()).await {
                    warn!("Failed to append to the offer log: {e}");
                }
            }
            Err(e) => warn!("Failed to encode event: {e}"),
        }
        // The caller may have stopped listening; the transfer goes on.
        let _ = self.events.send(event);
    }
}

/// Forwards every complete line buffered in `pending`, leaving a partial
/// tail in place for the next read.
fn forward_lines(pending: &mut Vec<u8>, events: &EventSender) {
    let Some(end) = pending.iter().rposition(|&b| b == b'\n') else {
        return;
    };
    let complete: Vec<u8> = pending.drain(..=end).collect();
    let text = String::from_utf8_lossy(&complete);
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        match TransferEvent::from_json(line) {
            Ok(event) => {
                let _ = events.send(event);
            }
            Err(e) => warn!("Skipping offer log line: {e}"),
        }
    }
}

async fn is_withdrawn(offer_dir: &Path) -> bool {
    fs::try_exists(offer_dir.join(WITHDRAWN_FILE))
        .await
        .unwrap_or(false)
}

fn is_handle_shaped(handle: &str) -> bool {
    !handle.is_empty()
        && handle.len() <= 64
        && handle.bytes().all(|b| b.is_ascii_alphanumeric())
}

fn file_name_of(path: &Path) -> DropResult<String> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            DropError::TicketGenerationFailed(format!(
                "Unsupported file name: {}",
                path.display()
            ))
        })?;
    if name.contains(['/', '\\']) || name == ".." {
        return Err(DropError::TicketGenerationFailed(format!(
            "Unsupported file name: {name}"
        )));
    }
    Ok(name.to_string())
}
