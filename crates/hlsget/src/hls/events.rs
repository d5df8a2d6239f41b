use std::sync::Arc;

/// Progress notifications emitted by the worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressEvent {
    /// The pool is about to dispatch `total` segments with `workers` permits.
    Started { total: usize, workers: usize },
    /// A segment reached success or terminal failure. Fired once per segment.
    SegmentDone { index: usize, ok: bool },
}

/// Increment-only progress callback. Invoked from worker tasks, so it must be
/// cheap and thread-safe.
pub type OnProgress = Arc<dyn Fn(ProgressEvent) + Send + Sync>;
