use std::time::Duration;

use crate::DownloaderConfig;

// --- Top-Level Configuration ---
#[derive(Debug, Clone, Default)]
pub struct HlsConfig {
    /// Base downloader configuration
    pub base: DownloaderConfig,
    pub playlist_config: HlsPlaylistConfig,
    pub scheduler_config: HlsSchedulerConfig,
    pub fetcher_config: HlsFetcherConfig,
    pub decryption_config: HlsDecryptionConfig,
    pub output_config: HlsOutputConfig,
}

// --- Playlist Configuration ---
#[derive(Debug, Clone)]
pub struct HlsPlaylistConfig {
    pub playlist_fetch_timeout: Duration,
}

impl Default for HlsPlaylistConfig {
    fn default() -> Self {
        Self {
            playlist_fetch_timeout: Duration::from_secs(15),
        }
    }
}

/// How a rendition is picked from the bandwidth-sorted variant list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VariantSelection {
    #[default]
    Highest,
    /// Index into the list after sorting by bandwidth, highest first.
    Index(usize),
}

// --- Scheduler Configuration ---
#[derive(Debug, Clone, Default)]
pub struct HlsSchedulerConfig {
    /// Max concurrent segment fetch attempts. `None` derives it from the
    /// segment count and the number of available cores.
    pub download_concurrency: Option<usize>,
}

impl HlsSchedulerConfig {
    pub fn effective_concurrency(&self, segment_count: usize) -> usize {
        match self.download_concurrency {
            Some(n) => n.max(1),
            None => {
                let cores = std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1);
                (segment_count / cores).max(1)
            }
        }
    }
}

// --- Fetcher Configuration ---
#[derive(Debug, Clone)]
pub struct HlsFetcherConfig {
    /// Fixed timeout applied to every single segment attempt
    pub segment_download_timeout: Duration,
    /// `None` retries transient failures until cancelled
    pub max_segment_retries: Option<u32>,
    pub segment_retry_delay_base: Duration, // Base for exponential backoff
    pub segment_retry_delay_max: Duration,
    pub retry_jitter: bool,
    pub key_download_timeout: Duration,
    pub max_key_retries: u32,
    pub key_retry_delay_base: Duration,
}

impl Default for HlsFetcherConfig {
    fn default() -> Self {
        Self {
            segment_download_timeout: Duration::from_secs(60),
            max_segment_retries: None,
            segment_retry_delay_base: Duration::from_millis(500),
            segment_retry_delay_max: Duration::from_secs(30),
            retry_jitter: true,
            key_download_timeout: Duration::from_secs(15),
            max_key_retries: 3,
            key_retry_delay_base: Duration::from_millis(200),
        }
    }
}

// --- Decryption Configuration ---
#[derive(Debug, Clone)]
pub struct HlsDecryptionConfig {
    pub offload_decryption_to_cpu_pool: bool, // Whether to use the blocking thread pool for decryption
}

impl Default for HlsDecryptionConfig {
    fn default() -> Self {
        Self {
            offload_decryption_to_cpu_pool: true,
        }
    }
}

// --- Output Configuration ---
#[derive(Debug, Clone)]
pub struct HlsOutputConfig {
    /// Extension of the per-segment files written into the workspace
    pub segment_extension: String,
    /// Name of the concat list written into the workspace
    pub list_file_name: String,
}

impl Default for HlsOutputConfig {
    fn default() -> Self {
        Self {
            segment_extension: "ts".to_string(),
            list_file_name: "list.txt".to_string(),
        }
    }
}
