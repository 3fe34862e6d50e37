use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RecorderError>;

#[derive(Debug, Error)]
pub enum RecorderError {
    /// The log file could not be opened, written, or read.
    #[error("log store {} unavailable: {source}", .path.display())]
    StoreUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode records: {0}")]
    Encode(#[from] serde_json::Error),
}

impl RecorderError {
    pub(crate) fn store(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::StoreUnavailable {
            path: path.into(),
            source,
        }
    }

    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. })
    }
}
