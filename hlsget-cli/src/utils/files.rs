use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};

use crate::error::AppError;

/// Default output name: the local start time as `YYYYmmdd_HHMMSS.mp4`.
pub fn default_output_name<Tz: TimeZone>(now: &DateTime<Tz>) -> PathBuf
where
    Tz::Offset: std::fmt::Display,
{
    PathBuf::from(format!("{}.mp4", now.format("%Y%m%d_%H%M%S")))
}

/// Check that `path` is an `.mp4` file that may be written.
///
/// An existing file is only accepted with `force`.
pub fn validate_output(path: &Path, force: bool) -> Result<(), AppError> {
    let is_mp4 = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("mp4"));
    if !is_mp4 {
        return Err(AppError::InvalidInput(format!(
            "Output file must be an .mp4 file: {}",
            path.display()
        )));
    }

    if path.exists() && !force {
        return Err(AppError::InvalidInput(format!(
            "Output file {} already exists, use -f to overwrite",
            path.display()
        )));
    }
    Ok(())
}
