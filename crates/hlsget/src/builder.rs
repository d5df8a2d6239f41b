//! # Builder for HlsConfig
//!
//! Fluent construction of an [`HlsConfig`], covering both the HTTP client
//! options and the download pipeline knobs.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use hlsget_engine::HlsConfigBuilder;
//!
//! let config = HlsConfigBuilder::new()
//!     .with_user_agent("MyApp/1.0")
//!     .with_header("Referer", "https://example.com/")
//!     .with_download_concurrency(8)
//!     .with_segment_timeout(Duration::from_secs(30))
//!     .with_max_segment_retries(10)
//!     .build();
//!
//! assert_eq!(config.scheduler_config.download_concurrency, Some(8));
//! ```

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};

use crate::hls::config::HlsConfig;

/// Builder for creating HlsConfig instances with a fluent API
#[derive(Debug, Clone, Default)]
pub struct HlsConfigBuilder {
    config: HlsConfig,
}

impl HlsConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connection timeout (time to establish initial connection)
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.base.connect_timeout = timeout;
        self
    }

    /// Set whether to follow redirects
    pub fn with_follow_redirects(mut self, follow: bool) -> Self {
        self.config.base.follow_redirects = follow;
        self
    }

    /// Set the user agent string
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.base.user_agent = user_agent.into();
        self
    }

    /// Add a custom HTTP header. Invalid names or values are ignored.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        if let (Ok(name), Ok(value)) = (
            name.as_ref().parse::<reqwest::header::HeaderName>(),
            HeaderValue::from_str(value.as_ref()),
        ) {
            self.config.base.headers.insert(name, value);
        }
        self
    }

    /// Merge headers over the current set
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.config.base = self.config.base.with_extra_headers(headers);
        self
    }

    pub fn with_playlist_timeout(mut self, timeout: Duration) -> Self {
        self.config.playlist_config.playlist_fetch_timeout = timeout;
        self
    }

    /// Fix the number of concurrent segment requests instead of deriving it
    /// from the segment count
    pub fn with_download_concurrency(mut self, workers: usize) -> Self {
        self.config.scheduler_config.download_concurrency = Some(workers);
        self
    }

    /// Per-attempt deadline for a segment request
    pub fn with_segment_timeout(mut self, timeout: Duration) -> Self {
        self.config.fetcher_config.segment_download_timeout = timeout;
        self
    }

    /// Bound the retries of a failing segment. Unbounded by default.
    pub fn with_max_segment_retries(mut self, retries: u32) -> Self {
        self.config.fetcher_config.max_segment_retries = Some(retries);
        self
    }

    pub fn with_retry_delays(mut self, base: Duration, max: Duration) -> Self {
        self.config.fetcher_config.segment_retry_delay_base = base;
        self.config.fetcher_config.segment_retry_delay_max = max;
        self
    }

    pub fn with_decryption_offload(mut self, enabled: bool) -> Self {
        self.config.decryption_config.offload_decryption_to_cpu_pool = enabled;
        self
    }

    /// Build the HlsConfig instance
    pub fn build(self) -> HlsConfig {
        self.config
    }
}
