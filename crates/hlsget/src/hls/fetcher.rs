// HLS Resource Fetcher: plain HTTP GET of manifests, keys and media segments.

use crate::hls::HlsDownloaderError;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, trace};
use url::Url;

/// A single GET of a remote resource.
///
/// Implementations perform exactly one attempt; retrying is the caller's
/// business. A non-2xx answer must surface as [`HlsDownloaderError::StatusError`].
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    async fn fetch(&self, url: &Url, timeout: Duration) -> Result<Bytes, HlsDownloaderError>;
}

pub struct HttpFetcher {
    http_client: Client,
}

impl HttpFetcher {
    pub fn new(http_client: Client) -> Self {
        Self { http_client }
    }
}

#[async_trait]
impl ResourceFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url, timeout: Duration) -> Result<Bytes, HlsDownloaderError> {
        trace!(%url, "GET");
        let response = self
            .http_client
            .get(url.clone())
            .timeout(timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(HlsDownloaderError::StatusError {
                status,
                url: url.to_string(),
            });
        }

        let body = response.bytes().await?;
        debug!("Downloaded {} bytes from {}", body.len(), url);
        Ok(body)
    }
}

/// One segment attempt: fetch under a hard deadline and reject empty bodies.
pub async fn fetch_segment_attempt(
    fetcher: &dyn ResourceFetcher,
    url: &Url,
    timeout: Duration,
) -> Result<Bytes, HlsDownloaderError> {
    let body = tokio::time::timeout(timeout, fetcher.fetch(url, timeout))
        .await
        .map_err(|_| {
            HlsDownloaderError::TimeoutError(format!("segment {url} exceeded {timeout:?}"))
        })??;

    if body.is_empty() {
        return Err(HlsDownloaderError::EmptySegment(url.to_string()));
    }
    Ok(body)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use reqwest::StatusCode;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory fetcher serving canned bodies keyed by URL. Unknown URLs
    /// answer 404.
    #[derive(Default)]
    pub struct MockFetcher {
        responses: Mutex<HashMap<String, Bytes>>,
        failing: Mutex<HashMap<String, StatusCode>>,
        hits: Mutex<HashMap<String, usize>>,
        pub total_requests: AtomicUsize,
    }

    impl MockFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with(self, url: &str, body: impl Into<Bytes>) -> Self {
            self.responses
                .lock()
                .unwrap()
                .insert(url.to_string(), body.into());
            self
        }

        pub fn failing(self, url: &str, status: StatusCode) -> Self {
            self.failing
                .lock()
                .unwrap()
                .insert(url.to_string(), status);
            self
        }

        pub fn hits(&self, url: &str) -> usize {
            self.hits.lock().unwrap().get(url).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl ResourceFetcher for MockFetcher {
        async fn fetch(&self, url: &Url, _timeout: Duration) -> Result<Bytes, HlsDownloaderError> {
            self.total_requests.fetch_add(1, Ordering::SeqCst);
            *self
                .hits
                .lock()
                .unwrap()
                .entry(url.to_string())
                .or_default() += 1;

            if let Some(status) = self.failing.lock().unwrap().get(url.as_str()) {
                return Err(HlsDownloaderError::StatusError {
                    status: *status,
                    url: url.to_string(),
                });
            }
            match self.responses.lock().unwrap().get(url.as_str()) {
                Some(body) => Ok(body.clone()),
                None => Err(HlsDownloaderError::StatusError {
                    status: StatusCode::NOT_FOUND,
                    url: url.to_string(),
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::MockFetcher;
    use super::*;

    #[tokio::test]
    async fn empty_body_is_reported_as_empty_segment() {
        let fetcher = MockFetcher::new().with("http://cdn.test/0.ts", Bytes::new());
        let url = Url::parse("http://cdn.test/0.ts").unwrap();

        let err = fetch_segment_attempt(&fetcher, &url, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, HlsDownloaderError::EmptySegment(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn non_empty_body_is_returned_unchanged() {
        let fetcher = MockFetcher::new().with("http://cdn.test/0.ts", &b"payload"[..]);
        let url = Url::parse("http://cdn.test/0.ts").unwrap();

        let body = fetch_segment_attempt(&fetcher, &url, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(body.as_ref(), b"payload");
    }

    struct StallingFetcher;

    #[async_trait]
    impl ResourceFetcher for StallingFetcher {
        async fn fetch(&self, _url: &Url, _timeout: Duration) -> Result<Bytes, HlsDownloaderError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_attempt_times_out() {
        let url = Url::parse("http://cdn.test/0.ts").unwrap();
        let err = fetch_segment_attempt(&StallingFetcher, &url, Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(matches!(err, HlsDownloaderError::TimeoutError(_)));
        assert!(err.is_retryable());
    }
}
