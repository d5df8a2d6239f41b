use hlsget_engine::hls::ProgressEvent;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn segment_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} {msg}\n[{elapsed_precise}] [{bar:40.green/white}] {pos}/{len} segments (eta {eta})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

/// Segment progress bar fed from the engine's progress callback.
#[derive(Clone)]
pub struct ProgressManager {
    bar: Arc<Mutex<Option<ProgressBar>>>,
    disabled: bool,
}

impl ProgressManager {
    pub fn new() -> Self {
        Self {
            bar: Arc::new(Mutex::new(None)),
            disabled: false,
        }
    }

    pub fn new_disabled() -> Self {
        Self {
            bar: Arc::new(Mutex::new(None)),
            disabled: true,
        }
    }

    pub fn handle_event(&self, event: ProgressEvent) {
        if self.disabled {
            return;
        }

        let Ok(mut bar) = self.bar.lock() else {
            return;
        };
        match event {
            ProgressEvent::Started { total, workers } => {
                let new_bar = ProgressBar::with_draw_target(
                    Some(total as u64),
                    ProgressDrawTarget::stderr(),
                );
                new_bar.set_style(segment_style());
                new_bar.set_message(format!("Downloading with {workers} workers"));
                new_bar.enable_steady_tick(Duration::from_millis(500));
                *bar = Some(new_bar);
            }
            ProgressEvent::SegmentDone { .. } => {
                if let Some(bar) = bar.as_ref() {
                    bar.inc(1);
                }
            }
        }
    }

    /// Remove the bar so later log lines are not interleaved with it.
    pub fn finish(&self) {
        if let Ok(mut bar) = self.bar.lock()
            && let Some(bar) = bar.take()
        {
            bar.finish_and_clear();
        }
    }

    #[inline]
    #[allow(unused)]
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bar_tracks_finished_segments() {
        let progress = ProgressManager::new();
        progress.handle_event(ProgressEvent::Started {
            total: 3,
            workers: 2,
        });
        progress.handle_event(ProgressEvent::SegmentDone { index: 1, ok: true });
        progress.handle_event(ProgressEvent::SegmentDone { index: 0, ok: false });

        let position = progress
            .bar
            .lock()
            .unwrap()
            .as_ref()
            .map(|bar| bar.position());
        assert_eq!(position, Some(2));
        progress.finish();
        assert!(progress.bar.lock().unwrap().is_none());
    }

    #[test]
    fn disabled_manager_ignores_events() {
        let progress = ProgressManager::new_disabled();
        progress.handle_event(ProgressEvent::Started {
            total: 3,
            workers: 1,
        });
        assert!(progress.bar.lock().unwrap().is_none());
        assert!(progress.is_disabled());
    }
}
