//! Sorting errors.

use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::io;

use crate::run::RunId;

/// Sorting error.
#[derive(Debug)]
pub enum SortError {
    /// Input unit could not be converted into a record.
    Parse(Box<dyn Error + Send + Sync>),
    /// A single record does not fit into a read block.
    OversizedRecord { run: RunId, block_size: usize },
    /// Run storage operation failed.
    Storage(io::Error),
    /// Persisted run data could not be decoded.
    Decode { run: RunId, source: Box<dyn Error + Send + Sync> },
    /// Run ends in the middle of a record.
    CorruptRun(RunId),
    /// Temporary directory or file creation error.
    TempDir(io::Error),
    /// Workers thread pool initialization error.
    ThreadPoolBuildError(rayon::ThreadPoolBuildError),
    /// Sorter configuration is unusable.
    InvalidConfig(String),
}

impl Error for SortError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self {
            SortError::Parse(err) => Some(err.as_ref()),
            SortError::Storage(err) => Some(err),
            SortError::Decode { source, .. } => Some(source.as_ref()),
            SortError::TempDir(err) => Some(err),
            SortError::ThreadPoolBuildError(err) => Some(err),
            SortError::OversizedRecord { .. } | SortError::CorruptRun(_) | SortError::InvalidConfig(_) => None,
        }
    }
}

impl Display for SortError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            SortError::Parse(err) => write!(f, "input record parsing error: {}", err),
            SortError::OversizedRecord { run, block_size } => write!(
                f,
                "{} contains a record larger than the block size of {} bytes",
                run, block_size
            ),
            SortError::Storage(err) => write!(f, "run storage operation failed: {}", err),
            SortError::Decode { run, source } => write!(f, "{} decoding error: {}", run, source),
            SortError::CorruptRun(run) => write!(f, "{} ends with an incomplete record", run),
            SortError::TempDir(err) => write!(f, "temporary directory or file not created: {}", err),
            SortError::ThreadPoolBuildError(err) => write!(f, "thread pool initialization failed: {}", err),
            SortError::InvalidConfig(msg) => write!(f, "invalid sorter configuration: {}", msg),
        }
    }
}

impl From<io::Error> for SortError {
    fn from(err: io::Error) -> Self {
        SortError::Storage(err)
    }
}
