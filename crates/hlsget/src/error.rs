use crate::hls::HlsDownloaderError;

// Custom error type for download operations
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    UrlError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("HLS error: {0}")]
    HlsError(#[from] HlsDownloaderError),
}

impl DownloadError {
    /// The underlying HLS error, if this failure came from the download pipeline.
    pub fn as_hls(&self) -> Option<&HlsDownloaderError> {
        match self {
            DownloadError::HlsError(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.as_hls().is_some_and(HlsDownloaderError::is_cancelled)
    }
}
