//! Resumable, cancellable, progress-observable HTTP downloads.
//!
//! One [`DownloadSession`] drives one transfer: it resolves the persisted
//! [`TransferRecord`] through a [`CheckpointStore`], decides resume-vs-restart
//! (re-probing the server length and discarding partial bytes on drift),
//! then streams the body with a range request into the destination file,
//! emitting a snapshot to registered [`DownloadListener`]s after every
//! flushed chunk. `exit()` cancels cooperatively; a later session with the
//! same key resumes from the checkpoint.

mod copier;
pub mod error;
pub mod listener;
mod probe;
pub mod record;
pub mod session;
pub mod store;
pub mod utils;

pub use copier::CHUNK_SIZE;
pub use error::{DownloadError, Outcome};
pub use listener::{DownloadListener, ListenerRegistry};
pub use record::{TransferRecord, LENGTH_UNDETERMINED, LENGTH_UNKNOWN};
pub use session::{DownloadSession, SessionHandle};
pub use store::{CheckpointStore, JsonFileStore};
