// HLS VOD downloader: manifest resolution, key handling, bounded segment
// downloads, order reconciliation and concat-list output.

pub mod config;
pub mod decryption;
pub mod error;
pub mod events;
pub mod fetcher;
pub mod hls_downloader;
pub mod output;
pub mod playlist;
pub mod reconciler;
pub mod retry;
pub mod scheduler;

// Re-exports for easier access
pub use config::{HlsConfig, VariantSelection};
pub use error::HlsDownloaderError;
pub use events::{OnProgress, ProgressEvent};
pub use hls_downloader::{DownloadOutcome, HlsDownloader};
pub use playlist::{Manifest, Variant};
pub use scheduler::PoolReport;
