//! # Muxer driver
//!
//! Thin wrapper around an external `ffmpeg` binary that stream-copies the
//! ordered concat list into the final container.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::hls::HlsDownloaderError;

pub const DEFAULT_FFMPEG: &str = "ffmpeg";

#[derive(Debug, Clone)]
pub struct FfmpegMuxer {
    program: PathBuf,
}

impl Default for FfmpegMuxer {
    fn default() -> Self {
        Self::new(DEFAULT_FFMPEG)
    }
}

impl FfmpegMuxer {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Run `ffmpeg -version` and return the first line of its banner.
    pub async fn check_available(&self) -> Result<String, HlsDownloaderError> {
        let output = Command::new(&self.program)
            .arg("-version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                HlsDownloaderError::MuxError(format!(
                    "{} is not available: {e}",
                    self.program.display()
                ))
            })?;

        if !output.status.success() {
            return Err(HlsDownloaderError::MuxError(format!(
                "{} -version exited with {}",
                self.program.display(),
                output.status
            )));
        }

        let banner = String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .unwrap_or_default()
            .to_string();
        debug!(%banner, "Muxer available");
        Ok(banner)
    }

    /// Stream-copy every entry of `list` into `output`, overwriting it.
    ///
    /// The child process is killed if `token` is cancelled first.
    pub async fn concat(
        &self,
        list: &Path,
        output: &Path,
        token: &CancellationToken,
    ) -> Result<(), HlsDownloaderError> {
        let mut command = Command::new(&self.program);
        command
            .args(["-v", "error", "-y", "-f", "concat", "-safe", "0", "-i"])
            .arg(list)
            .args(["-c", "copy"])
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        info!(output = %output.display(), "Muxing segments");
        let child = command.spawn().map_err(|e| {
            HlsDownloaderError::MuxError(format!(
                "Failed to start {}: {e}",
                self.program.display()
            ))
        })?;

        let result = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(HlsDownloaderError::Cancelled),
            result = child.wait_with_output() => result?,
        };

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(HlsDownloaderError::MuxError(format!(
                "{} exited with {}: {}",
                self.program.display(),
                result.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}
