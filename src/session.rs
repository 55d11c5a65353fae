use log::info;
use reqwest::Client;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::copier::{CopyEnd, StreamCopier};
use crate::error::{DownloadError, Outcome};
use crate::listener::{DownloadListener, ListenerRegistry};
use crate::probe::LengthProbe;
use crate::record::{TransferRecord, LENGTH_UNDETERMINED, LENGTH_UNKNOWN};
use crate::store::CheckpointStore;

/// Events produced by the background transfer task, consumed in order by the
/// delivery task. The channel is bounded so a slow listener back-pressures
/// the copy loop instead of buffering without limit.
pub(crate) enum SessionEvent {
    Progress(TransferRecord),
    Completed(TransferRecord),
    Cancelled(TransferRecord),
    Failed(DownloadError),
}

const EVENT_QUEUE: usize = 64;

/// Orchestrates one download: resolves the checkpoint, decides
/// resume-vs-restart, runs the copier on a background task and delivers
/// progress and terminal events to registered listeners.
///
/// Sessions are single-use. Resumability comes from starting a new session
/// with the same key, which picks up from the last persisted position.
pub struct DownloadSession {
    client: Client,
    store: Arc<dyn CheckpointStore>,
    listeners: ListenerRegistry,
    cancel: Arc<AtomicBool>,
    started: AtomicBool,
}

impl DownloadSession {
    pub fn new(store: Arc<dyn CheckpointStore>) -> Self {
        let client = Client::builder()
            .user_agent(concat!("rangepull/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self::with_client(client, store)
    }

    /// Transport configuration (timeouts, TLS policy, proxies) belongs to the
    /// caller's client; the session imposes none of its own.
    pub fn with_client(client: Client, store: Arc<dyn CheckpointStore>) -> Self {
        Self {
            client,
            store,
            listeners: ListenerRegistry::new(),
            cancel: Arc::new(AtomicBool::new(false)),
            started: AtomicBool::new(false),
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn DownloadListener>) {
        self.listeners.add(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn DownloadListener>) -> bool {
        self.listeners.remove(listener)
    }

    /// Requests cooperative cancellation. The copy loop honors the flag at
    /// its next iteration boundary; in-flight reads and writes complete
    /// first. Idempotent.
    pub fn exit(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Starts the resolve+stream pipeline for `record` on a background task,
    /// with `observer` registered before the first event. Rejects reuse.
    pub fn start(
        &self,
        record: TransferRecord,
        observer: Arc<dyn DownloadListener>,
    ) -> Result<SessionHandle, DownloadError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(DownloadError::AlreadyStarted);
        }
        self.listeners.add(observer);

        let (tx, rx) = mpsc::channel(EVENT_QUEUE);
        let dispatcher = tokio::spawn(Self::dispatch(self.listeners.clone(), rx));
        let worker = tokio::spawn(Self::transfer(
            self.client.clone(),
            self.store.clone(),
            self.cancel.clone(),
            record,
            tx,
        ));
        Ok(SessionHandle { worker, dispatcher })
    }

    /// Delivery loop: forwards events to listeners in production order and
    /// ends on the first terminal event.
    async fn dispatch(
        listeners: ListenerRegistry,
        mut rx: mpsc::Receiver<SessionEvent>,
    ) -> Option<Outcome> {
        while let Some(event) = rx.recv().await {
            match event {
                SessionEvent::Progress(snapshot) => listeners.notify_progress(&snapshot),
                SessionEvent::Completed(snapshot) => {
                    listeners.notify_complete(&snapshot);
                    return Some(Outcome::Completed(snapshot));
                }
                SessionEvent::Cancelled(snapshot) => {
                    listeners.notify_cancelled(&snapshot);
                    return Some(Outcome::Cancelled(snapshot));
                }
                SessionEvent::Failed(error) => {
                    listeners.notify_error(&error);
                    return Some(Outcome::Failed(error));
                }
            }
        }
        None
    }

    async fn transfer(
        client: Client,
        store: Arc<dyn CheckpointStore>,
        cancel: Arc<AtomicBool>,
        record: TransferRecord,
        tx: mpsc::Sender<SessionEvent>,
    ) {
        let event = match Self::drive(client, store, cancel, record, &tx).await {
            Ok((CopyEnd::Completed, snapshot)) => SessionEvent::Completed(snapshot),
            Ok((CopyEnd::Cancelled, snapshot)) => SessionEvent::Cancelled(snapshot),
            Err(error) => SessionEvent::Failed(error),
        };
        let _ = tx.send(event).await;
    }

    async fn drive(
        client: Client,
        store: Arc<dyn CheckpointStore>,
        cancel: Arc<AtomicBool>,
        record: TransferRecord,
        tx: &mpsc::Sender<SessionEvent>,
    ) -> Result<(CopyEnd, TransferRecord), DownloadError> {
        let record = Self::resolve(&client, &store, record).await?;

        // Nothing left to transfer: one visible snapshot, then complete,
        // without issuing any range request.
        if record.is_finished() {
            let _ = tx.send(SessionEvent::Progress(record.clone())).await;
            return Ok((CopyEnd::Completed, record));
        }

        let copier = StreamCopier::new(client, store, cancel);
        copier.run(record, tx).await
    }

    /// Resolves the effective record for this session: fresh initialization
    /// for an unseen key, or the stored checkpoint reconciled against the
    /// physical file and re-validated against the server.
    async fn resolve(
        client: &Client,
        store: &Arc<dyn CheckpointStore>,
        mut record: TransferRecord,
    ) -> Result<TransferRecord, DownloadError> {
        let stored = store.load(&record.key).map_err(DownloadError::Store)?;
        let Some(mut stored) = stored else {
            // First time this key is seen: drop any stray bytes at the
            // destination so two content versions never mix.
            discard_file(&record.save_path).await?;
            record.download_position = 0;
            record.total_size = LENGTH_UNKNOWN;
            record.exited = false;
            return Ok(record);
        };

        // The physical file length wins over the stored position.
        stored.sync_with_file();

        if stored.download_position != 0 {
            let probe = LengthProbe::new(client.clone());
            match probe.probe(&stored.url).await {
                Some(len) if len == stored.total_size => {}
                Some(len) => {
                    info!(
                        "content changed on server for {} ({} -> {} bytes), restarting",
                        stored.url, stored.total_size, len
                    );
                    discard_file(&stored.save_path).await?;
                    stored.reset_for_length(len);
                }
                None => {
                    // The stored total can no longer be validated, which
                    // also makes the partial bytes unusable.
                    discard_file(&stored.save_path).await?;
                    stored.reset_for_length(LENGTH_UNDETERMINED);
                    return Err(DownloadError::LengthUndeterminable {
                        url: stored.url.clone(),
                    });
                }
            }
        }
        Ok(stored)
    }
}

async fn discard_file(path: &std::path::Path) -> Result<(), DownloadError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Handle to a started session's background tasks.
pub struct SessionHandle {
    worker: JoinHandle<()>,
    dispatcher: JoinHandle<Option<Outcome>>,
}

impl SessionHandle {
    /// Waits for the terminal event. Every listener callback for this
    /// session has been delivered by the time this returns.
    pub async fn join(self) -> Outcome {
        let _ = self.worker.await;
        match self.dispatcher.await {
            Ok(Some(outcome)) => outcome,
            _ => Outcome::Failed(DownloadError::Interrupted),
        }
    }
}
