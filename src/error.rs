use crate::record::TransferRecord;
use thiserror::Error;

/// Fatal session errors. Cancellation is not an error; it is a distinct
/// terminal [`Outcome`].
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("could not determine content length for {url}")]
    LengthUndeterminable { url: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("checkpoint store error: {0}")]
    Store(anyhow::Error),

    #[error("session already started")]
    AlreadyStarted,

    #[error("session ended without a terminal event")]
    Interrupted,
}

/// Terminal result of one download session.
#[derive(Debug)]
pub enum Outcome {
    /// Body exhausted normally; snapshot holds the final position.
    Completed(TransferRecord),
    /// `exit()` was observed mid-copy; `exited` is set on the snapshot and
    /// the file length equals its `download_position`.
    Cancelled(TransferRecord),
    Failed(DownloadError),
}

impl Outcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled(_))
    }
}
