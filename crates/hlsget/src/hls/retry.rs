// HLS Retry Utility: retry-with-backoff shared by segment and key fetching.
//
// Exponential backoff with jitter and a max delay cap. Without an attempt
// bound the loop only ends on success, a terminal error or cancellation.

use crate::hls::HlsDownloaderError;
use crate::hls::config::HlsFetcherConfig;
use rand::RngExt;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries (not counting the initial attempt).
    /// `None` keeps retrying transient failures until cancelled.
    pub max_retries: Option<u32>,
    /// Base delay between retries. Actual delay = base * 2^attempt + jitter.
    pub base_delay: Duration,
    /// Hard cap on the computed delay.
    pub max_delay: Duration,
    /// When true, adds random jitter of [0, base_delay/2).
    pub jitter: bool,
}

impl RetryPolicy {
    pub fn for_segments(config: &HlsFetcherConfig) -> Self {
        Self {
            max_retries: config.max_segment_retries,
            base_delay: config.segment_retry_delay_base,
            max_delay: config.segment_retry_delay_max,
            jitter: config.retry_jitter,
        }
    }

    pub fn for_keys(config: &HlsFetcherConfig) -> Self {
        Self {
            max_retries: Some(config.max_key_retries),
            base_delay: config.key_retry_delay_base,
            max_delay: config.segment_retry_delay_max,
            jitter: config.retry_jitter,
        }
    }

    /// Compute the delay for a given attempt number (0-indexed).
    pub(crate) fn delay_for_attempt(&self, attempt: u32) -> Duration {
        // 2^attempt with a checked shift so attempts >= 32 saturate.
        let multiplier = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        let exp_delay = self
            .base_delay
            .checked_mul(multiplier)
            .unwrap_or(self.max_delay);
        let capped = exp_delay.min(self.max_delay);

        if !self.jitter {
            return capped;
        }

        let jitter_range_ms = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX) / 2;
        let remaining_ms =
            u64::try_from(self.max_delay.saturating_sub(capped).as_millis()).unwrap_or(0);
        let jitter_limit_ms = jitter_range_ms.min(remaining_ms);
        if jitter_limit_ms == 0 {
            return capped;
        }

        let jitter_ms = rand::rng().random_range(0..jitter_limit_ms);
        (capped + Duration::from_millis(jitter_ms)).min(self.max_delay)
    }

    fn exhausted(&self, attempt: u32) -> bool {
        self.max_retries.is_some_and(|max| attempt >= max)
    }
}

/// Execute an async operation with retry-and-backoff.
///
/// The `operation` closure receives the current attempt number (0-indexed).
/// Errors for which [`HlsDownloaderError::is_retryable`] is false end the loop
/// immediately. Cancellation is checked before every attempt and raced against
/// the backoff sleep; it always wins with [`HlsDownloaderError::Cancelled`].
pub async fn retry_with_backoff<F, Fut, T>(
    policy: &RetryPolicy,
    token: &CancellationToken,
    mut operation: F,
) -> Result<T, HlsDownloaderError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, HlsDownloaderError>>,
{
    let mut attempt: u32 = 0;
    loop {
        if token.is_cancelled() {
            return Err(HlsDownloaderError::Cancelled);
        }

        let err = match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_cancelled() || token.is_cancelled() => {
                return Err(HlsDownloaderError::Cancelled);
            }
            Err(err) if !err.is_retryable() => return Err(err),
            Err(err) => err,
        };

        if policy.exhausted(attempt) {
            return Err(err);
        }

        let delay = policy.delay_for_attempt(attempt);
        debug!(
            attempt = attempt + 1,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Retrying after transient error"
        );
        tokio::select! {
            _ = token.cancelled() => {
                return Err(HlsDownloaderError::Cancelled);
            }
            _ = tokio::time::sleep(delay) => {}
        }
        attempt = attempt.saturating_add(1);
    }
}
