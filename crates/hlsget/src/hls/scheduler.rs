// HLS Segment Scheduler: bounded worker pool that downloads, decrypts and
// stores every segment of a rendition.
//
// Each segment gets its own task; the number of requests in flight is bounded
// by a semaphore permit taken per attempt, so a segment sitting in backoff does
// not hold a slot. Results land in a fixed-size index-addressed store and are
// only read after every task has been joined.

use crate::hls::HlsDownloaderError;
use crate::hls::config::HlsConfig;
use crate::hls::decryption::{CachedPlaylistKey, DecryptionOffloader, KeyResolver};
use crate::hls::events::{OnProgress, ProgressEvent};
use crate::hls::fetcher::{ResourceFetcher, fetch_segment_attempt};
use crate::hls::playlist::{PlaylistKey, SegmentDescriptor, resolve_uri};
use crate::hls::retry::{RetryPolicy, retry_with_backoff};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

/// A unit of work: one segment at its manifest position.
#[derive(Debug, Clone)]
pub struct Task {
    pub index: usize,
    pub segment: SegmentDescriptor,
}

/// A task whose plaintext has been written to `path`.
#[derive(Debug, Clone)]
pub struct FinishedTask {
    pub task: Task,
    pub path: PathBuf,
}

/// Everything the pool needs to download one rendition.
#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub rendition_url: Url,
    pub segments: Vec<SegmentDescriptor>,
    pub playlist_key: Option<PlaylistKey>,
    pub media_sequence: u64,
    pub concurrency: usize,
    pub workspace: PathBuf,
}

/// Fixed-size result store addressed by segment index. Each slot is written at
/// most once.
#[derive(Debug)]
pub struct SegmentSlots {
    slots: Box<[OnceLock<FinishedTask>]>,
}

impl SegmentSlots {
    pub fn new(len: usize) -> Self {
        Self {
            slots: (0..len).map(|_| OnceLock::new()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Store a finished task at its own index. Returns `false` when the index is
    /// out of range or already filled.
    pub fn publish(&self, finished: FinishedTask) -> bool {
        match self.slots.get(finished.task.index) {
            Some(slot) => slot.set(finished).is_ok(),
            None => false,
        }
    }

    pub fn get(&self, index: usize) -> Option<&FinishedTask> {
        self.slots.get(index).and_then(OnceLock::get)
    }
}

#[derive(Debug, Clone)]
pub struct SegmentFailure {
    pub index: usize,
    pub error: HlsDownloaderError,
}

/// Summary of one pool run.
#[derive(Debug, Clone, Default)]
pub struct PoolReport {
    pub total: usize,
    pub workers: usize,
    pub completed: usize,
    pub failures: Vec<SegmentFailure>,
    pub cancelled: bool,
}

struct WorkerContext {
    config: Arc<HlsConfig>,
    fetcher: Arc<dyn ResourceFetcher>,
    key_resolver: KeyResolver,
    playlist_key: CachedPlaylistKey,
    offloader: DecryptionOffloader,
    semaphore: Arc<Semaphore>,
    slots: Arc<SegmentSlots>,
    rendition_url: Url,
    workspace: PathBuf,
    media_sequence: u64,
    token: CancellationToken,
    done: Arc<AtomicUsize>,
    on_progress: Option<OnProgress>,
}

pub struct SegmentScheduler {
    config: Arc<HlsConfig>,
    fetcher: Arc<dyn ResourceFetcher>,
    token: CancellationToken,
    on_progress: Option<OnProgress>,
    done: Arc<AtomicUsize>,
}

impl SegmentScheduler {
    pub fn new(
        config: Arc<HlsConfig>,
        fetcher: Arc<dyn ResourceFetcher>,
        token: CancellationToken,
    ) -> Self {
        Self {
            config,
            fetcher,
            token,
            on_progress: None,
            done: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_progress(mut self, on_progress: OnProgress) -> Self {
        self.on_progress = Some(on_progress);
        self
    }

    /// Number of segments that reached success or terminal failure so far.
    pub fn completed_segments(&self) -> usize {
        self.done.load(Ordering::Relaxed)
    }

    /// Download every segment of `job` and wait for all workers to finish.
    pub async fn run(&self, job: DownloadJob) -> (Arc<SegmentSlots>, PoolReport) {
        let total = job.segments.len();
        let workers = job.concurrency.max(1);
        let mut report = PoolReport {
            total,
            workers,
            ..Default::default()
        };

        // Key requests count against the same bound as segment requests.
        let semaphore = Arc::new(Semaphore::new(workers));
        let slots = Arc::new(SegmentSlots::new(total));
        let key_resolver = KeyResolver::new(
            Arc::clone(&self.fetcher),
            Arc::clone(&self.config),
            job.rendition_url.clone(),
            self.token.clone(),
        )
        .with_gate(Arc::clone(&semaphore));
        // Fetched once here, before any segment is dispatched.
        let playlist_key = key_resolver
            .resolve_playlist_key(job.playlist_key.as_ref())
            .await;

        let ctx = Arc::new(WorkerContext {
            config: Arc::clone(&self.config),
            fetcher: Arc::clone(&self.fetcher),
            key_resolver,
            playlist_key,
            offloader: DecryptionOffloader::new(
                self.config.decryption_config.offload_decryption_to_cpu_pool,
            ),
            semaphore,
            slots: Arc::clone(&slots),
            rendition_url: job.rendition_url,
            workspace: job.workspace,
            media_sequence: job.media_sequence,
            token: self.token.clone(),
            done: Arc::clone(&self.done),
            on_progress: self.on_progress.clone(),
        });

        info!(segments = total, workers, "Starting segment downloads");
        if let Some(cb) = &ctx.on_progress {
            cb(ProgressEvent::Started { total, workers });
        }

        let mut join_set = JoinSet::new();
        for (index, segment) in job.segments.into_iter().enumerate() {
            let ctx = Arc::clone(&ctx);
            let task = Task { index, segment };
            join_set.spawn(async move {
                let index = task.index;
                (index, Self::process_segment(&ctx, task).await)
            });
        }

        // Barrier: nothing reads the slots before every worker has finished.
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((_, Ok(()))) => report.completed += 1,
                Ok((_, Err(HlsDownloaderError::Cancelled))) => report.cancelled = true,
                Ok((index, Err(error))) => report.failures.push(SegmentFailure { index, error }),
                Err(e) => error!(error = %e, "Segment worker panicked"),
            }
        }
        if self.token.is_cancelled() {
            report.cancelled = true;
        }
        report.failures.sort_by_key(|f| f.index);

        info!(
            completed = report.completed,
            failed = report.failures.len(),
            cancelled = report.cancelled,
            "Segment downloads finished"
        );

        (slots, report)
    }

    async fn process_segment(ctx: &Arc<WorkerContext>, task: Task) -> Result<(), HlsDownloaderError> {
        let index = task.index;
        let result = match Self::download_segment(ctx, task).await {
            Err(HlsDownloaderError::Cancelled) => return Err(HlsDownloaderError::Cancelled),
            Err(e) if ctx.token.is_cancelled() => {
                debug!(index, error = %e, "Segment aborted by cancellation");
                return Err(HlsDownloaderError::Cancelled);
            }
            result => result,
        };
        if let Err(e) = &result {
            error!(index, error = %e, "Segment failed");
        }

        ctx.done.fetch_add(1, Ordering::Relaxed);
        if let Some(cb) = &ctx.on_progress {
            cb(ProgressEvent::SegmentDone {
                index,
                ok: result.is_ok(),
            });
        }
        result
    }

    async fn download_segment(ctx: &Arc<WorkerContext>, task: Task) -> Result<(), HlsDownloaderError> {
        let url = resolve_uri(&ctx.rendition_url, &task.segment.uri)?;

        let key = tokio::select! {
            biased;
            _ = ctx.token.cancelled() => return Err(HlsDownloaderError::Cancelled),
            key = ctx.key_resolver.resolve_segment_key(
                &task.segment,
                &ctx.playlist_key,
                ctx.media_sequence,
            ) => key?,
        };

        let policy = RetryPolicy::for_segments(&ctx.config.fetcher_config);
        let timeout = ctx.config.fetcher_config.segment_download_timeout;
        let body = retry_with_backoff(&policy, &ctx.token, |attempt| {
            let ctx = Arc::clone(ctx);
            let url = url.clone();
            async move {
                let _permit = acquire_permit(&ctx.semaphore, &ctx.token).await?;
                if attempt > 0 {
                    debug!(%url, attempt, "Retrying segment");
                }
                tokio::select! {
                    biased;
                    _ = ctx.token.cancelled() => Err(HlsDownloaderError::Cancelled),
                    body = fetch_segment_attempt(ctx.fetcher.as_ref(), &url, timeout) => body,
                }
            }
        })
        .await?;

        let data = match key {
            Some(key) => ctx.offloader.decrypt(body, key).await?,
            None => body,
        };

        let path = ctx.workspace.join(format!(
            "{}.{}",
            task.index, ctx.config.output_config.segment_extension
        ));
        tokio::fs::write(&path, &data).await?;
        debug!(index = task.index, bytes = data.len(), path = %path.display(), "Segment stored");

        if !ctx.slots.publish(FinishedTask { task, path }) {
            warn!("Segment result published twice; keeping the first");
        }
        Ok(())
    }
}

/// Wait for one of the pool's permits, giving up when the run is cancelled.
pub(crate) async fn acquire_permit<'a>(
    semaphore: &'a Semaphore,
    token: &CancellationToken,
) -> Result<SemaphorePermit<'a>, HlsDownloaderError> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(HlsDownloaderError::Cancelled),
        permit = semaphore.acquire() => permit.map_err(|_| HlsDownloaderError::Cancelled),
    }
}
