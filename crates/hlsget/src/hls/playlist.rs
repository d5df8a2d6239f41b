// HLS Playlist Engine: fetches the master and rendition manifests, picks a
// rendition and turns its segment list into ordered descriptors.

use crate::hls::HlsDownloaderError;
use crate::hls::config::{HlsConfig, VariantSelection};
use crate::hls::fetcher::ResourceFetcher;
use m3u8_rs::{MasterPlaylist, MediaPlaylist, parse_playlist_res};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// One rendition advertised by a master playlist.
#[derive(Debug, Clone, PartialEq)]
pub struct Variant {
    pub bandwidth: u64,
    pub name: Option<String>,
    pub resolution: Option<(u64, u64)>,
    pub uri: String,
}

impl Variant {
    /// Human readable label: name, then resolution, then bandwidth.
    pub fn label(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        if let Some((w, h)) = self.resolution {
            return format!("{w}x{h}");
        }
        self.bandwidth.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyMethod {
    None,
    Aes128,
    Other(String),
}

impl fmt::Display for KeyMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyMethod::None => f.write_str("NONE"),
            KeyMethod::Aes128 => f.write_str("AES-128"),
            KeyMethod::Other(method) => f.write_str(method),
        }
    }
}

/// Encryption metadata as declared by an `EXT-X-KEY` tag. Playlist-level and
/// per-segment keys share this shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistKey {
    pub method: KeyMethod,
    pub uri: Option<String>,
    /// Hex IV, optionally `0x` prefixed
    pub iv: Option<String>,
}

impl From<&m3u8_rs::Key> for PlaylistKey {
    fn from(key: &m3u8_rs::Key) -> Self {
        let method = match &key.method {
            m3u8_rs::KeyMethod::None => KeyMethod::None,
            m3u8_rs::KeyMethod::AES128 => KeyMethod::Aes128,
            other => KeyMethod::Other(format!("{other:?}")),
        };
        Self {
            method,
            uri: key.uri.clone(),
            iv: key.iv.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SegmentDescriptor {
    /// Dense position in manifest order
    pub index: usize,
    pub uri: String,
    pub key_override: Option<PlaylistKey>,
    pub duration: f32,
}

/// A resolved rendition-level playlist.
#[derive(Debug, Clone)]
pub struct Rendition {
    pub url: Url,
    pub segments: Vec<SegmentDescriptor>,
    pub playlist_key: Option<PlaylistKey>,
    pub media_sequence: u64,
}

#[derive(Debug, Clone)]
pub enum Manifest {
    Master(Vec<Variant>),
    Media(Rendition),
}

pub struct PlaylistEngine {
    fetcher: Arc<dyn ResourceFetcher>,
    config: Arc<HlsConfig>,
}

impl PlaylistEngine {
    pub fn new(fetcher: Arc<dyn ResourceFetcher>, config: Arc<HlsConfig>) -> Self {
        Self { fetcher, config }
    }

    async fn fetch_document(&self, url: &Url) -> Result<m3u8_rs::Playlist, HlsDownloaderError> {
        debug!(%url, "Fetching playlist");
        let bytes = self
            .fetcher
            .fetch(url, self.config.playlist_config.playlist_fetch_timeout)
            .await?;
        parse_playlist_res(&bytes).map_err(|e| {
            HlsDownloaderError::ManifestError(format!("Failed to parse playlist {url}: {e}"))
        })
    }

    /// Fetch whatever `url` points at, master or media playlist.
    pub async fn load_manifest(&self, url: &Url) -> Result<Manifest, HlsDownloaderError> {
        match self.fetch_document(url).await? {
            m3u8_rs::Playlist::MasterPlaylist(pl) => Ok(Manifest::Master(variants_from(pl)?)),
            m3u8_rs::Playlist::MediaPlaylist(pl) => {
                Ok(Manifest::Media(rendition_from(url.clone(), pl)))
            }
        }
    }

    /// Fetch a master playlist and return its variants in document order.
    pub async fn fetch_master(&self, url: &Url) -> Result<Vec<Variant>, HlsDownloaderError> {
        match self.fetch_document(url).await? {
            m3u8_rs::Playlist::MasterPlaylist(pl) => variants_from(pl),
            m3u8_rs::Playlist::MediaPlaylist(_) => Err(HlsDownloaderError::ManifestError(
                "Master playlist expected, media playlist found".to_string(),
            )),
        }
    }

    /// Fetch a rendition playlist and build its ordered segment descriptors.
    pub async fn fetch_rendition(&self, url: &Url) -> Result<Rendition, HlsDownloaderError> {
        match self.fetch_document(url).await? {
            m3u8_rs::Playlist::MediaPlaylist(pl) => Ok(rendition_from(url.clone(), pl)),
            m3u8_rs::Playlist::MasterPlaylist(_) => Err(HlsDownloaderError::ManifestError(
                "Media playlist expected, master playlist found".to_string(),
            )),
        }
    }
}

/// Sort variants by bandwidth, highest first. Equal bandwidths keep their
/// document order.
pub fn sort_variants(variants: &mut [Variant]) {
    variants.sort_by(|a, b| b.bandwidth.cmp(&a.bandwidth));
}

/// Sort `variants` and pick one according to `selection`.
///
/// Returns the position in the sorted list together with the chosen variant.
pub fn select_variant(
    mut variants: Vec<Variant>,
    selection: VariantSelection,
) -> Result<(usize, Variant), HlsDownloaderError> {
    if variants.is_empty() {
        return Err(HlsDownloaderError::ManifestError(
            "No variants found in master playlist".to_string(),
        ));
    }
    sort_variants(&mut variants);

    let index = match selection {
        VariantSelection::Highest => 0,
        VariantSelection::Index(i) if i < variants.len() => i,
        VariantSelection::Index(i) => {
            return Err(HlsDownloaderError::ManifestError(format!(
                "Variant index {i} out of range (0..{})",
                variants.len()
            )));
        }
    };
    Ok((index, variants.swap_remove(index)))
}

/// Resolve a URI found inside a playlist against the playlist's own URL.
///
/// Absolute URIs pass through. Relative ones are joined against the directory
/// of the referring document, so its file name and query never leak into the
/// result.
pub fn resolve_uri(base: &Url, uri: &str) -> Result<Url, HlsDownloaderError> {
    let uri = uri.trim();
    if let Ok(absolute) = Url::parse(uri) {
        return Ok(absolute);
    }
    base.join(uri).map_err(|e| {
        HlsDownloaderError::ManifestError(format!("Could not join {base} with {uri}: {e}"))
    })
}

fn variants_from(master: MasterPlaylist) -> Result<Vec<Variant>, HlsDownloaderError> {
    let variants: Vec<Variant> = master
        .variants
        .iter()
        .filter(|v| !v.is_i_frame)
        .map(|v| {
            let name = v.video.as_ref().and_then(|group| {
                master
                    .alternatives
                    .iter()
                    .find(|alt| &alt.group_id == group)
                    .map(|alt| alt.name.clone())
            });
            Variant {
                bandwidth: v.bandwidth,
                name,
                resolution: v.resolution.map(|r| (r.width, r.height)),
                uri: v.uri.clone(),
            }
        })
        .collect();

    if variants.is_empty() {
        return Err(HlsDownloaderError::ManifestError(
            "No variants found in master playlist".to_string(),
        ));
    }
    Ok(variants)
}

fn rendition_from(url: Url, playlist: MediaPlaylist) -> Rendition {
    let mut playlist_key = None;
    let mut active_override: Option<PlaylistKey> = None;
    let mut segments = Vec::with_capacity(playlist.segments.len());

    for segment in &playlist.segments {
        // A blank entry marks the end of the usable segment list.
        if segment.uri.trim().is_empty() {
            warn!(
                parsed = segments.len(),
                "Placeholder segment entry found, treating the playlist as truncated"
            );
            break;
        }

        let index = segments.len();
        if let Some(key) = &segment.key {
            let key = PlaylistKey::from(key);
            if index == 0 {
                playlist_key = Some(key);
            } else if playlist_key.as_ref() == Some(&key) {
                active_override = None;
            } else {
                active_override = Some(key);
            }
        }

        segments.push(SegmentDescriptor {
            index,
            uri: segment.uri.clone(),
            key_override: active_override.clone(),
            duration: segment.duration,
        });
    }

    info!(
        url = %url,
        segments = segments.len(),
        encrypted = playlist_key.as_ref().is_some_and(|k| k.method != KeyMethod::None),
        "Rendition playlist resolved"
    );

    Rendition {
        url,
        segments,
        playlist_key,
        media_sequence: playlist.media_sequence,
    }
}
