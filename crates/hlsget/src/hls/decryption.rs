// HLS Decryption: key resolution for playlist-level and per-segment keys, and
// AES-128-CBC segment decryption.

use crate::hls::HlsDownloaderError;
use crate::hls::config::HlsConfig;
use crate::hls::fetcher::ResourceFetcher;
use crate::hls::playlist::{KeyMethod, PlaylistKey, SegmentDescriptor, resolve_uri};
use crate::hls::retry::{RetryPolicy, retry_with_backoff};
use crate::hls::scheduler::acquire_permit;
use aes::Aes128;
use bytes::Bytes;
use cipher::{BlockDecryptMut, KeyIvInit, block_padding::NoPadding};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

type Aes128CbcDec = cbc::Decryptor<Aes128>;

pub const AES_BLOCK_SIZE: usize = 16;

/// Key material for one encrypted segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentKey {
    pub key: [u8; 16],
    pub iv: [u8; 16],
}

/// Parse a hex IV, accepting an optional `0x`/`0X` prefix.
pub fn parse_iv(iv_hex_str: &str) -> Result<[u8; 16], HlsDownloaderError> {
    let trimmed = iv_hex_str.trim();
    let iv_str = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let mut iv_bytes = [0u8; 16];
    hex::decode_to_slice(iv_str, &mut iv_bytes).map_err(|e| {
        HlsDownloaderError::DecryptionError(format!("Failed to parse IV '{iv_hex_str}': {e}"))
    })?;
    Ok(iv_bytes)
}

/// IV used when a key tag carries none: the media sequence number as a
/// 128-bit big-endian integer.
pub fn iv_from_sequence(media_sequence: u64) -> [u8; 16] {
    (media_sequence as u128).to_be_bytes()
}

/// Decrypt an AES-128-CBC payload and strip its PKCS#7 padding.
pub fn decrypt_aes128_cbc(
    data: &[u8],
    key: &[u8; 16],
    iv: &[u8; 16],
) -> Result<Vec<u8>, HlsDownloaderError> {
    if data.is_empty() || data.len() % AES_BLOCK_SIZE != 0 {
        return Err(HlsDownloaderError::DecryptionError(format!(
            "Ciphertext length {} is not a positive multiple of {AES_BLOCK_SIZE}",
            data.len()
        )));
    }

    let mut buffer = data.to_vec();
    let cipher = Aes128CbcDec::new_from_slices(key, iv).map_err(|e| {
        HlsDownloaderError::DecryptionError(format!("Failed to initialize AES decryptor: {e}"))
    })?;
    cipher
        .decrypt_padded_mut::<NoPadding>(&mut buffer)
        .map_err(|e| HlsDownloaderError::DecryptionError(format!("Decryption failed: {e}")))?;

    strip_pkcs7(&mut buffer)?;
    Ok(buffer)
}

// The pad length must lie in 1..=16 and every pad byte must repeat it.
fn strip_pkcs7(buffer: &mut Vec<u8>) -> Result<(), HlsDownloaderError> {
    let Some(&pad) = buffer.last() else {
        return Err(HlsDownloaderError::DecryptionError(
            "Cannot unpad empty plaintext".to_string(),
        ));
    };
    let pad_len = pad as usize;
    if pad_len == 0 || pad_len > AES_BLOCK_SIZE || pad_len > buffer.len() {
        return Err(HlsDownloaderError::DecryptionError(format!(
            "Invalid PKCS#7 padding length {pad_len}"
        )));
    }
    let start = buffer.len() - pad_len;
    if buffer[start..].iter().any(|&b| b != pad) {
        return Err(HlsDownloaderError::DecryptionError(
            "Inconsistent PKCS#7 padding bytes".to_string(),
        ));
    }
    buffer.truncate(start);
    Ok(())
}

/// Offloads CPU-intensive decryption to the blocking thread pool
pub struct DecryptionOffloader {
    enabled: bool,
}

impl DecryptionOffloader {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub async fn decrypt(&self, data: Bytes, key: SegmentKey) -> Result<Bytes, HlsDownloaderError> {
        if self.enabled {
            tokio::task::spawn_blocking(move || decrypt_aes128_cbc(&data, &key.key, &key.iv))
                .await
                .map_err(|e| {
                    HlsDownloaderError::DecryptionError(format!(
                        "Decryption offload task failed: {e}"
                    ))
                })?
                .map(Bytes::from)
        } else {
            decrypt_aes128_cbc(&data, &key.key, &key.iv).map(Bytes::from)
        }
    }
}

/// The playlist-level key, resolved once per run before segments are dispatched.
#[derive(Debug, Clone)]
pub enum CachedPlaylistKey {
    /// No playlist key, or `METHOD=NONE`
    Clear,
    Ready { key: PlaylistKey, bytes: [u8; 16] },
    /// The fetch failed; every segment relying on this key fails with the error.
    Failed(HlsDownloaderError),
}

pub struct KeyResolver {
    fetcher: Arc<dyn ResourceFetcher>,
    config: Arc<HlsConfig>,
    rendition_url: Url,
    token: CancellationToken,
    gate: Option<Arc<Semaphore>>,
}

impl KeyResolver {
    pub fn new(
        fetcher: Arc<dyn ResourceFetcher>,
        config: Arc<HlsConfig>,
        rendition_url: Url,
        token: CancellationToken,
    ) -> Self {
        Self {
            fetcher,
            config,
            rendition_url,
            token,
            gate: None,
        }
    }

    /// Take a permit from `gate` for every key request attempt.
    pub fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Fetch the playlist-level key once so segments without an override can
    /// share it. A failure is cached rather than returned.
    pub async fn resolve_playlist_key(&self, key: Option<&PlaylistKey>) -> CachedPlaylistKey {
        let Some(key) = key else {
            return CachedPlaylistKey::Clear;
        };
        if key.method == KeyMethod::None {
            return CachedPlaylistKey::Clear;
        }
        match self.fetch_key(key).await {
            Ok(bytes) => CachedPlaylistKey::Ready {
                key: key.clone(),
                bytes,
            },
            Err(e) => {
                if !e.is_cancelled() {
                    warn!(error = %e, "Failed to fetch playlist decryption key");
                }
                CachedPlaylistKey::Failed(e)
            }
        }
    }

    /// Key material for `segment`, or `None` when it is not encrypted.
    ///
    /// A segment with its own key always triggers a fresh fetch; the others
    /// reuse the cached playlist key.
    pub async fn resolve_segment_key(
        &self,
        segment: &SegmentDescriptor,
        cached: &CachedPlaylistKey,
        media_sequence: u64,
    ) -> Result<Option<SegmentKey>, HlsDownloaderError> {
        let sequence = media_sequence + segment.index as u64;

        if let Some(own) = &segment.key_override {
            if own.method == KeyMethod::None {
                return Ok(None);
            }
            let key = self.fetch_key(own).await?;
            debug!(index = segment.index, "Segment decryption key fetched");
            return Ok(Some(SegmentKey {
                key,
                iv: Self::iv_for(own, sequence)?,
            }));
        }

        match cached {
            CachedPlaylistKey::Clear => Ok(None),
            CachedPlaylistKey::Ready { key, bytes } => Ok(Some(SegmentKey {
                key: *bytes,
                iv: Self::iv_for(key, sequence)?,
            })),
            CachedPlaylistKey::Failed(e) => Err(e.clone()),
        }
    }

    fn iv_for(key: &PlaylistKey, sequence: u64) -> Result<[u8; 16], HlsDownloaderError> {
        match &key.iv {
            Some(iv) => parse_iv(iv),
            None => Ok(iv_from_sequence(sequence)),
        }
    }

    async fn fetch_key(&self, key: &PlaylistKey) -> Result<[u8; 16], HlsDownloaderError> {
        if key.method != KeyMethod::Aes128 {
            return Err(HlsDownloaderError::DecryptionError(format!(
                "Unsupported encryption method: {}",
                key.method
            )));
        }
        let Some(uri) = &key.uri else {
            return Err(HlsDownloaderError::DecryptionError(
                "Key URI is missing".to_string(),
            ));
        };
        let key_url = resolve_uri(&self.rendition_url, uri)?;
        let fetcher_config = &self.config.fetcher_config;
        let policy = RetryPolicy::for_keys(fetcher_config);

        let body = retry_with_backoff(&policy, &self.token, |_| {
            let fetcher = Arc::clone(&self.fetcher);
            let gate = self.gate.clone();
            let token = self.token.clone();
            let key_url = key_url.clone();
            let timeout = fetcher_config.key_download_timeout;
            async move {
                let _permit = match &gate {
                    Some(gate) => Some(acquire_permit(gate, &token).await?),
                    None => None,
                };
                fetcher.fetch(&key_url, timeout).await
            }
        })
        .await
        .map_err(|e| match e {
            HlsDownloaderError::Cancelled => e,
            other => HlsDownloaderError::DecryptionError(format!(
                "Failed to fetch key from {key_url}: {other}"
            )),
        })?;

        debug!(url = %key_url, "Decryption key fetched");
        body.as_ref().try_into().map_err(|_| {
            HlsDownloaderError::DecryptionError(format!(
                "Decryption key from {key_url} has incorrect length: {} bytes (expected 16)",
                body.len()
            ))
        })
    }
}
