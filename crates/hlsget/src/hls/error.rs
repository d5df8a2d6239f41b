use std::sync::Arc;

use reqwest::StatusCode;

#[derive(Debug, thiserror::Error, Clone)]
pub enum HlsDownloaderError {
    #[error("Manifest error: {0}")]
    ManifestError(String),
    #[error("Network error: {source}")]
    NetworkError {
        #[from]
        source: Arc<reqwest::Error>,
    },
    #[error("Server returned status {status} for {url}")]
    StatusError { status: StatusCode, url: String },
    #[error("Operation timed out: {0}")]
    TimeoutError(String),
    #[error("Empty segment received from {0}")]
    EmptySegment(String),
    #[error("Decryption error: {0}")]
    DecryptionError(String),
    #[error("Missing segments after reconciliation: {missing:?}")]
    OrderingError { missing: Vec<usize> },
    #[error("Muxer error: {0}")]
    MuxError(String),
    #[error("I/O error: {source}")]
    IoError {
        #[from]
        source: Arc<std::io::Error>,
    },
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Operation cancelled")]
    Cancelled,
}

impl HlsDownloaderError {
    /// Whether a segment attempt that failed with this error should be retried.
    ///
    /// Transport failures, timeouts, non-2xx responses and empty bodies are transient;
    /// everything else fails the segment (or the run) outright.
    pub fn is_retryable(&self) -> bool {
        match self {
            HlsDownloaderError::NetworkError { source } => !source.is_builder(),
            HlsDownloaderError::StatusError { .. }
            | HlsDownloaderError::TimeoutError(_)
            | HlsDownloaderError::EmptySegment(_) => true,
            _ => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, HlsDownloaderError::Cancelled)
    }
}

// Manual implementation of From<reqwest::Error> for HlsDownloaderError
// because of the Arc wrapping.
impl From<reqwest::Error> for HlsDownloaderError {
    fn from(err: reqwest::Error) -> Self {
        HlsDownloaderError::NetworkError {
            source: Arc::new(err),
        }
    }
}

impl From<std::io::Error> for HlsDownloaderError {
    fn from(err: std::io::Error) -> Self {
        HlsDownloaderError::IoError {
            source: Arc::new(err),
        }
    }
}
