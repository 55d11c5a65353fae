use std::sync::{Arc, Mutex};

use crate::error::DownloadError;
use crate::record::TransferRecord;

/// Observer of one session's progress and terminal events.
///
/// `on_progress` fires once per copied chunk with a snapshot of the record.
/// Exactly one terminal callback follows: `on_complete`, `on_cancelled`
/// (snapshot has `exited` set), or `on_error`. Callbacks run on the session's
/// delivery task; keep them short or hand the snapshot off elsewhere.
pub trait DownloadListener: Send + Sync {
    fn on_progress(&self, snapshot: &TransferRecord);
    fn on_complete(&self, _snapshot: &TransferRecord) {}
    fn on_cancelled(&self, _snapshot: &TransferRecord) {}
    fn on_error(&self, _error: &DownloadError) {}
}

/// Thread-safe add/remove/broadcast over registered listeners.
///
/// The lock is held for the whole of a broadcast, so once `remove` returns
/// the listener is guaranteed to see nothing emitted afterwards.
#[derive(Clone, Default)]
pub struct ListenerRegistry {
    inner: Arc<Mutex<Vec<Arc<dyn DownloadListener>>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener. Adding the same listener twice is a no-op.
    pub fn add(&self, listener: Arc<dyn DownloadListener>) {
        let mut listeners = self.inner.lock().unwrap();
        if !listeners.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            listeners.push(listener);
        }
    }

    /// Removes a listener; returns true if it was registered.
    pub fn remove(&self, listener: &Arc<dyn DownloadListener>) -> bool {
        let mut listeners = self.inner.lock().unwrap();
        let before = listeners.len();
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn notify_progress(&self, snapshot: &TransferRecord) {
        for l in self.inner.lock().unwrap().iter() {
            l.on_progress(snapshot);
        }
    }

    pub fn notify_complete(&self, snapshot: &TransferRecord) {
        for l in self.inner.lock().unwrap().iter() {
            l.on_complete(snapshot);
        }
    }

    pub fn notify_cancelled(&self, snapshot: &TransferRecord) {
        for l in self.inner.lock().unwrap().iter() {
            l.on_cancelled(snapshot);
        }
    }

    pub fn notify_error(&self, error: &DownloadError) {
        for l in self.inner.lock().unwrap().iter() {
            l.on_error(error);
        }
    }
}
