use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, TimeZone};
use hlsget_engine::HlsConfigBuilder;
use hlsget_engine::hls::{HlsConfig, VariantSelection};

use crate::cli::CliArgs;
use crate::error::AppError;
use crate::utils::{default_output_name, parse_headers, validate_output};

/// Configuration for the entire program
#[derive(Debug, Clone)]
pub struct ProgramConfig {
    /// Engine configuration
    pub hls_config: HlsConfig,

    /// Variant to download when not prompting
    pub selection: VariantSelection,

    /// Prompt for the variant on stdin
    pub interactive: bool,

    /// Validated output file
    pub output: PathBuf,

    /// ffmpeg executable
    pub ffmpeg: PathBuf,

    pub show_progress: bool,
}

impl ProgramConfig {
    /// Build the program configuration from parsed arguments, validating the
    /// output path. `now` names the output when none was given.
    pub fn from_args<Tz: TimeZone>(args: &CliArgs, now: &DateTime<Tz>) -> Result<Self, AppError>
    where
        Tz::Offset: std::fmt::Display,
    {
        let output = args
            .output
            .clone()
            .unwrap_or_else(|| default_output_name(now));
        validate_output(&output, args.force)?;

        if args.segment_timeout == 0 {
            return Err(AppError::InvalidInput(
                "Segment timeout must be at least one second".to_string(),
            ));
        }

        let mut builder = HlsConfigBuilder::new()
            .with_headers(parse_headers(&args.headers)?)
            .with_segment_timeout(Duration::from_secs(args.segment_timeout));
        if let Some(user_agent) = &args.user_agent {
            builder = builder.with_user_agent(user_agent);
        }
        if args.workers > 0 {
            builder = builder.with_download_concurrency(args.workers);
        }
        if let Some(retries) = args.retries {
            builder = builder.with_max_segment_retries(retries);
        }

        let selection = match args.variant {
            Some(index) => VariantSelection::Index(index),
            None => VariantSelection::Highest,
        };
        let hls_config = builder.build();

        Ok(Self {
            hls_config,
            selection,
            interactive: args.interactive,
            output,
            ffmpeg: args.ffmpeg.clone(),
            show_progress: !args.no_progress,
        })
    }
}
