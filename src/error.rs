use std::{io, path::PathBuf};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Every way a run can fail. All of them are fatal: the engine never
/// returns a partial report.
#[derive(Debug, Error)]
pub enum Error {
    #[error("i/o error on `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("read failed: {0}")]
    Read(#[from] io::Error),

    /// No line terminator inside a probe window, so some line is longer
    /// than the configured maximum and the file cannot be split safely.
    #[error("no newline within {window} bytes before offset {offset}; a line exceeds the max line length")]
    BoundaryNotFound { offset: u64, window: usize },

    #[error("malformed line at byte offset {offset}: {reason}")]
    MalformedLine { offset: u64, reason: &'static str },

    #[error("key table full: {len} keys exceed half of capacity {capacity}")]
    TableFull { capacity: usize, len: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to spawn a worker thread: {0}")]
    Spawn(#[source] io::Error),

    #[error("worker thread {worker} panicked")]
    WorkerPanicked { worker: usize },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}
