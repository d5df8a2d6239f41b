use hlsget_engine::DownloadError;
use hlsget_engine::hls::HlsDownloaderError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Download error: {0}")]
    Download(#[from] DownloadError),

    #[error("{0}")]
    Hls(#[from] HlsDownloaderError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Initialization failed: {0}")]
    Initialization(String),
}

impl AppError {
    pub fn is_cancelled(&self) -> bool {
        match self {
            AppError::Download(e) => e.is_cancelled(),
            AppError::Hls(e) => e.is_cancelled(),
            _ => false,
        }
    }
}
