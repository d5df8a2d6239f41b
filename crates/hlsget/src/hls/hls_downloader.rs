use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::{DownloadError, create_client, hls::HlsDownloaderError};

use super::config::VariantSelection;
use super::events::OnProgress;
use super::fetcher::{HttpFetcher, ResourceFetcher};
use super::output::write_concat_list;
use super::playlist::{Manifest, PlaylistEngine, Rendition, Variant, resolve_uri, select_variant};
use super::reconciler::reconcile;
use super::scheduler::{DownloadJob, FinishedTask, PoolReport, SegmentScheduler};
use super::HlsConfig;

/// Result of a completed run: an ordered list ready for the muxer.
#[derive(Debug)]
pub struct DownloadOutcome {
    pub list_path: PathBuf,
    pub segments: Vec<FinishedTask>,
    pub report: PoolReport,
    /// The chosen variant and its position in the sorted list, when the input
    /// was a master playlist.
    pub variant: Option<(usize, Variant)>,
    pub rendition_url: Url,
}

pub struct HlsDownloader {
    fetcher: Arc<dyn ResourceFetcher>,
    config: Arc<HlsConfig>,
}

impl HlsDownloader {
    pub fn new(config: HlsConfig) -> Result<Self, DownloadError> {
        let client = create_client(&config.base)?;
        Ok(Self::with_fetcher(config, Arc::new(HttpFetcher::new(client))))
    }

    /// Create a downloader on top of a custom fetcher
    pub fn with_fetcher(config: HlsConfig, fetcher: Arc<dyn ResourceFetcher>) -> Self {
        Self {
            fetcher,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &HlsConfig {
        &self.config
    }

    fn playlists(&self) -> PlaylistEngine {
        PlaylistEngine::new(Arc::clone(&self.fetcher), Arc::clone(&self.config))
    }

    fn parse_url(url: &str) -> Result<Url, DownloadError> {
        Url::parse(url).map_err(|e| DownloadError::UrlError(format!("{url}: {e}")))
    }

    /// Fetch the entry manifest without downloading anything else.
    pub async fn probe(&self, url: &str) -> Result<Manifest, DownloadError> {
        let url = Self::parse_url(url)?;
        Ok(self.playlists().load_manifest(&url).await?)
    }

    /// Download the rendition picked by `selection` into `workspace` and write
    /// the ordered concat list next to the segments.
    pub async fn download(
        &self,
        url: &str,
        selection: VariantSelection,
        workspace: &Path,
        token: CancellationToken,
        on_progress: Option<OnProgress>,
    ) -> Result<DownloadOutcome, DownloadError> {
        let url = Self::parse_url(url)?;

        let (variant, rendition) = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(HlsDownloaderError::Cancelled.into()),
            resolved = self.resolve_rendition(&url, selection) => resolved?,
        };

        if rendition.segments.is_empty() {
            return Err(HlsDownloaderError::ManifestError(format!(
                "Rendition {} lists no segments",
                rendition.url
            ))
            .into());
        }

        let total = rendition.segments.len();
        let concurrency = self.config.scheduler_config.effective_concurrency(total);
        info!(
            url = %rendition.url,
            segments = total,
            workers = concurrency,
            encrypted = rendition.playlist_key.is_some(),
            "Rendition resolved"
        );

        let job = DownloadJob {
            rendition_url: rendition.url.clone(),
            segments: rendition.segments,
            playlist_key: rendition.playlist_key,
            media_sequence: rendition.media_sequence,
            concurrency,
            workspace: workspace.to_path_buf(),
        };

        let mut scheduler = SegmentScheduler::new(
            Arc::clone(&self.config),
            Arc::clone(&self.fetcher),
            token.clone(),
        );
        if let Some(on_progress) = on_progress {
            scheduler = scheduler.with_progress(on_progress);
        }
        let (slots, report) = scheduler.run(job).await;

        for failure in &report.failures {
            debug!(index = failure.index, error = %failure.error, "Segment failure");
        }
        if report.cancelled {
            // Segments still retrying when the run stopped are named here.
            return Err(match reconcile(&slots) {
                Err(missing @ HlsDownloaderError::OrderingError { .. }) => {
                    warn!(error = %missing, "Download cancelled before every segment finished");
                    missing.into()
                }
                _ => HlsDownloaderError::Cancelled.into(),
            });
        }

        let segments = reconcile(&slots)?;
        let list_path = workspace.join(&self.config.output_config.list_file_name);
        write_concat_list(&segments, &list_path).await?;

        Ok(DownloadOutcome {
            list_path,
            segments,
            report,
            variant,
            rendition_url: rendition.url,
        })
    }

    /// Manifests are fetched one after another: master first, then the chosen
    /// rendition.
    async fn resolve_rendition(
        &self,
        url: &Url,
        selection: VariantSelection,
    ) -> Result<(Option<(usize, Variant)>, Rendition), HlsDownloaderError> {
        let playlists = self.playlists();
        match playlists.load_manifest(url).await? {
            Manifest::Media(rendition) => {
                if selection != VariantSelection::Highest {
                    warn!("Input is a media playlist; variant selection ignored");
                }
                Ok((None, rendition))
            }
            Manifest::Master(variants) => {
                let count = variants.len();
                let (index, variant) = select_variant(variants, selection)?;
                info!(
                    variant = %variant.label(),
                    bandwidth = variant.bandwidth,
                    position = index,
                    available = count,
                    "Variant selected"
                );
                let rendition_url = resolve_uri(url, &variant.uri)?;
                let rendition = playlists.fetch_rendition(&rendition_url).await?;
                Ok((Some((index, variant)), rendition))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hls::decryption::test_support::encrypt_data;
    use crate::hls::fetcher::test_support::MockFetcher;
    use reqwest::StatusCode;
    use std::time::Duration;
    use tempfile::TempDir;

    const MASTER: &str = "#EXTM3U
#EXT-X-STREAM-INF:BANDWIDTH=500,RESOLUTION=640x360
low/index.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=2000,RESOLUTION=1920x1080
high/index.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=1000,RESOLUTION=1280x720
mid/index.m3u8
";

    const KEY: [u8; 16] = *b"0123456789abcdef";

    fn media(segments: usize, encrypted: bool) -> String {
        let mut doc = String::from("#EXTM3U\n#EXT-X-TARGETDURATION:4\n#EXT-X-MEDIA-SEQUENCE:0\n");
        if encrypted {
            doc.push_str("#EXT-X-KEY:METHOD=AES-128,URI=\"key.bin\",IV=0x00000000000000000000000000000000\n");
        }
        for i in 0..segments {
            doc.push_str(&format!("#EXTINF:4.0,\nseg{i}.ts\n"));
        }
        doc.push_str("#EXT-X-ENDLIST\n");
        doc
    }

    fn downloader(fetcher: MockFetcher, retries: Option<u32>) -> HlsDownloader {
        let mut config = HlsConfig::default();
        config.fetcher_config.max_segment_retries = retries;
        config.fetcher_config.segment_retry_delay_base = Duration::from_millis(1);
        config.fetcher_config.retry_jitter = false;
        config.scheduler_config.download_concurrency = Some(3);
        HlsDownloader::with_fetcher(config, Arc::new(fetcher))
    }

    #[tokio::test]
    async fn downloads_highest_variant_in_order() {
        let iv = [0u8; 16];
        let mut fetcher = MockFetcher::new()
            .with("https://cdn.test/master.m3u8", MASTER)
            .with("https://cdn.test/high/index.m3u8", media(5, true))
            .with("https://cdn.test/high/key.bin", KEY.to_vec());
        for i in 0..5 {
            let plain = format!("payload-{i}");
            fetcher = fetcher.with(
                &format!("https://cdn.test/high/seg{i}.ts"),
                encrypt_data(plain.as_bytes(), &KEY, &iv),
            );
        }
        let downloader = downloader(fetcher, None);
        let workspace = TempDir::new().unwrap();

        let outcome = downloader
            .download(
                "https://cdn.test/master.m3u8",
                VariantSelection::Highest,
                workspace.path(),
                CancellationToken::new(),
                None,
            )
            .await
            .unwrap();

        let (position, variant) = outcome.variant.unwrap();
        assert_eq!(position, 0);
        assert_eq!(variant.bandwidth, 2000);
        assert_eq!(outcome.segments.len(), 5);
        for (i, finished) in outcome.segments.iter().enumerate() {
            assert_eq!(finished.task.index, i);
            let stored = std::fs::read_to_string(&finished.path).unwrap();
            assert_eq!(stored, format!("payload-{i}"));
        }

        let list = std::fs::read_to_string(&outcome.list_path).unwrap();
        assert_eq!(list.lines().count(), 5);
        assert!(list.lines().next().unwrap().ends_with("0.ts'"));
    }

    #[tokio::test]
    async fn media_playlist_input_is_downloaded_directly() {
        let mut fetcher =
            MockFetcher::new().with("https://cdn.test/vod/index.m3u8", media(3, false));
        for i in 0..3 {
            fetcher = fetcher.with(&format!("https://cdn.test/vod/seg{i}.ts"), format!("ts-{i}"));
        }
        let downloader = downloader(fetcher, None);
        let workspace = TempDir::new().unwrap();

        let outcome = downloader
            .download(
                "https://cdn.test/vod/index.m3u8",
                VariantSelection::Highest,
                workspace.path(),
                CancellationToken::new(),
                None,
            )
            .await
            .unwrap();
        assert!(outcome.variant.is_none());
        assert_eq!(outcome.segments.len(), 3);
    }

    #[tokio::test]
    async fn failed_segment_surfaces_as_ordering_error() {
        let mut fetcher = MockFetcher::new()
            .with("https://cdn.test/master.m3u8", MASTER)
            .with("https://cdn.test/low/index.m3u8", media(5, false));
        for i in 0..5 {
            fetcher = fetcher.with(&format!("https://cdn.test/low/seg{i}.ts"), format!("ts-{i}"));
        }
        let fetcher = fetcher.failing("https://cdn.test/low/seg3.ts", StatusCode::NOT_FOUND);
        let downloader = downloader(fetcher, Some(1));
        let workspace = TempDir::new().unwrap();

        let err = downloader
            .download(
                "https://cdn.test/master.m3u8",
                VariantSelection::Index(2),
                workspace.path(),
                CancellationToken::new(),
                None,
            )
            .await
            .unwrap_err();
        match err.as_hls() {
            Some(HlsDownloaderError::OrderingError { missing }) => assert_eq!(missing, &vec![3]),
            other => panic!("expected ordering error, got {other:?}"),
        }
        assert!(!workspace.path().join("list.txt").exists());
    }

    #[tokio::test(start_paused = true)]
    async fn segment_failing_until_cancelled_is_named_missing() {
        let mut fetcher =
            MockFetcher::new().with("https://cdn.test/vod/index.m3u8", media(5, false));
        for i in 0..5 {
            fetcher = fetcher.with(&format!("https://cdn.test/vod/seg{i}.ts"), format!("ts-{i}"));
        }
        let fetcher = fetcher.failing("https://cdn.test/vod/seg3.ts", StatusCode::BAD_GATEWAY);
        let downloader = downloader(fetcher, None);
        let workspace = TempDir::new().unwrap();

        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            canceller.cancel();
        });

        let err = downloader
            .download(
                "https://cdn.test/vod/index.m3u8",
                VariantSelection::Highest,
                workspace.path(),
                token,
                None,
            )
            .await
            .unwrap_err();
        match err.as_hls() {
            Some(HlsDownloaderError::OrderingError { missing }) => assert_eq!(missing, &vec![3]),
            other => panic!("expected ordering error, got {other:?}"),
        }
        for i in [0, 1, 2, 4] {
            let stored = std::fs::read_to_string(workspace.path().join(format!("{i}.ts"))).unwrap();
            assert_eq!(stored, format!("ts-{i}"));
        }
        assert!(!workspace.path().join("3.ts").exists());
    }

    #[tokio::test]
    async fn out_of_range_variant_is_a_manifest_error() {
        let fetcher = MockFetcher::new().with("https://cdn.test/master.m3u8", MASTER);
        let downloader = downloader(fetcher, None);
        let workspace = TempDir::new().unwrap();

        let err = downloader
            .download(
                "https://cdn.test/master.m3u8",
                VariantSelection::Index(7),
                workspace.path(),
                CancellationToken::new(),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err.as_hls(),
            Some(HlsDownloaderError::ManifestError(_))
        ));
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits() {
        let fetcher = Arc::new(MockFetcher::new().with("https://cdn.test/master.m3u8", MASTER));
        let downloader = HlsDownloader::with_fetcher(HlsConfig::default(), fetcher.clone());
        let workspace = TempDir::new().unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let err = downloader
            .download(
                "https://cdn.test/master.m3u8",
                VariantSelection::Highest,
                workspace.path(),
                token,
                None,
            )
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(
            fetcher
                .total_requests
                .load(std::sync::atomic::Ordering::SeqCst),
            0
        );
    }

    #[tokio::test]
    async fn invalid_url_is_rejected() {
        let downloader = downloader(MockFetcher::new(), None);
        let workspace = TempDir::new().unwrap();
        let err = downloader
            .download(
                "not a url",
                VariantSelection::Highest,
                workspace.path(),
                CancellationToken::new(),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::UrlError(_)));
    }

    #[tokio::test]
    async fn probe_lists_master_variants() {
        let downloader = downloader(
            MockFetcher::new().with("https://cdn.test/master.m3u8", MASTER),
            None,
        );
        match downloader.probe("https://cdn.test/master.m3u8").await.unwrap() {
            Manifest::Master(variants) => assert_eq!(variants.len(), 3),
            other => panic!("expected master playlist, got {other:?}"),
        }
    }
}
