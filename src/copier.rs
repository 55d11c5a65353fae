use futures::StreamExt;
use log::debug;
use reqwest::{header, Client, StatusCode};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, SeekFrom};
use tokio::sync::mpsc;
use tokio_util::io::StreamReader;

use crate::error::DownloadError;
use crate::record::{TransferRecord, LENGTH_UNKNOWN};
use crate::session::SessionEvent;
use crate::store::CheckpointStore;

/// Copy buffer size. Progress snapshots advance in steps of at most this.
pub const CHUNK_SIZE: usize = 16 * 1024;

pub(crate) enum CopyEnd {
    Completed,
    Cancelled,
}

/// Performs the ranged fetch and the chunked copy loop for one session.
/// The destination file is exclusively owned by this copier while it runs.
pub(crate) struct StreamCopier {
    client: Client,
    store: Arc<dyn CheckpointStore>,
    cancel: Arc<AtomicBool>,
}

impl StreamCopier {
    pub(crate) fn new(
        client: Client,
        store: Arc<dyn CheckpointStore>,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        Self { client, store, cancel }
    }

    /// Streams `record.url` into `record.save_path` starting at the resolved
    /// position, emitting a snapshot after every flushed chunk. Returns the
    /// record at its final position together with how the copy ended.
    pub(crate) async fn run(
        &self,
        mut record: TransferRecord,
        events: &mpsc::Sender<SessionEvent>,
    ) -> Result<(CopyEnd, TransferRecord), DownloadError> {
        if let Some(parent) = record.save_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let ranged = record.total_size != LENGTH_UNKNOWN;
        let mut request = self.client.get(&record.url);
        if ranged {
            request = request.header(
                header::RANGE,
                format!("bytes={}-{}", record.download_position, record.total_size),
            );
        }
        let response = request.send().await?.error_for_status()?;

        // Server ignored the range: the recorded offset cannot be trusted
        // against a full-content response, so restart from zero.
        let mut truncate = false;
        if ranged
            && record.download_position > 0
            && response.status() != StatusCode::PARTIAL_CONTENT
        {
            debug!(
                "{} answered a range request with {}, restarting from zero",
                record.url,
                response.status()
            );
            record.download_position = 0;
            truncate = true;
        }

        // The initial probe found nothing; the transfer response is the last
        // chance to learn the length.
        if record.total_size == LENGTH_UNKNOWN {
            match response.content_length() {
                Some(len) if len > 0 => record.total_size = len as i64,
                _ => {
                    return Err(DownloadError::LengthUndeterminable {
                        url: record.url.clone(),
                    })
                }
            }
        }

        // First snapshot precedes the first byte written.
        let _ = events.send(SessionEvent::Progress(record.clone())).await;

        // Resume state is written once, when length negotiation for a fresh
        // transfer completes. Per-chunk updates stay in memory.
        if record.download_position == 0 {
            self.store.save(&record).map_err(DownloadError::Store)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .read(true)
            .open(&record.save_path)
            .await?;
        if truncate {
            file.set_len(0).await?;
        }
        file.seek(SeekFrom::Start(record.download_position as u64))
            .await?;

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| io::Error::new(io::ErrorKind::Other, e)));
        let mut body = StreamReader::new(stream);
        let mut buf = vec![0u8; CHUNK_SIZE];

        loop {
            // Cooperative cancellation, checked at each iteration boundary.
            if self.cancel.load(Ordering::SeqCst) {
                break;
            }
            let n = body.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n]).await?;
            // Flush before emitting so the snapshot never describes bytes
            // that are not yet on disk.
            file.flush().await?;
            record.download_position += n as i64;
            let _ = events.send(SessionEvent::Progress(record.clone())).await;
        }

        file.flush().await?;
        drop(file);

        if self.cancel.load(Ordering::SeqCst) {
            record.exited = true;
            debug!(
                "transfer {} cancelled at {}/{}",
                record.key, record.download_position, record.total_size
            );
            return Ok((CopyEnd::Cancelled, record));
        }
        Ok((CopyEnd::Completed, record))
    }
}
