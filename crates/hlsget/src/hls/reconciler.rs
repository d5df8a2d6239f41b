// Order reconciliation: turn the index-addressed result store into the dense,
// playback-ordered list of finished segments.

use crate::hls::HlsDownloaderError;
use crate::hls::scheduler::{FinishedTask, SegmentSlots};
use tracing::{debug, warn};

/// Collect every finished segment in index order.
///
/// Must only be called after the worker pool has been joined. Fails with
/// [`HlsDownloaderError::OrderingError`] naming every index that has no result.
pub fn reconcile(slots: &SegmentSlots) -> Result<Vec<FinishedTask>, HlsDownloaderError> {
    let mut ordered = Vec::with_capacity(slots.len());
    let mut missing = Vec::new();

    for index in 0..slots.len() {
        match slots.get(index) {
            Some(finished) => ordered.push(finished.clone()),
            None => missing.push(index),
        }
    }

    if !missing.is_empty() {
        warn!(
            missing = missing.len(),
            total = slots.len(),
            "Segments missing after download"
        );
        return Err(HlsDownloaderError::OrderingError { missing });
    }

    debug!(segments = ordered.len(), "Segments reconciled");
    Ok(ordered)
}
