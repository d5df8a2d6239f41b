use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use config::ProgramConfig;
use error::AppError;
use hlsget_engine::FfmpegMuxer;
use hlsget_engine::hls::{
    HlsDownloader, HlsDownloaderError, Manifest, OnProgress, ProgressEvent, VariantSelection,
};
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};

mod cli;
mod config;
mod error;
mod utils;

use cli::CliArgs;
use utils::progress::ProgressManager;

fn main() {
    if let Err(e) = bootstrap() {
        if e.is_cancelled() {
            eprintln!("Interrupted, temporary files removed");
        } else {
            eprintln!("Error: {e}");
        }
        // Log the full error for debugging
        error!(error = ?e, "Application failed");
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool, log_file: Option<&Path>) -> Result<(), AppError> {
    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let writer = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(path)?;
            BoxMakeWriter::new(MakeWriterExt::and(std::io::stderr, Arc::new(file)))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(writer)
        .with_ansi(log_file.is_none())
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| AppError::Initialization(e.to_string()))
}

#[tokio::main]
async fn bootstrap() -> Result<(), AppError> {
    // Parse command-line arguments
    let args = CliArgs::parse();
    init_logging(args.verbose, args.log_file.as_deref())?;

    let started = Instant::now();
    let program_config = ProgramConfig::from_args(&args, &chrono::Local::now())?;

    // Fail before any network work if the muxer is missing
    let muxer = FfmpegMuxer::new(&program_config.ffmpeg);
    let banner = muxer.check_available().await?;
    debug!(%banner, "Found muxer");

    let token = CancellationToken::new();
    {
        let token = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling downloads");
                token.cancel();
            }
        });
    }

    // Removed when dropped, on every exit path out of this function
    let workspace = tempfile::Builder::new().prefix("hlsget-").tempdir()?;
    debug!(path = %workspace.path().display(), "Created temporary workspace");

    let downloader = HlsDownloader::new(program_config.hls_config.clone())?;

    let selection = if program_config.interactive {
        choose_variant(&downloader, &args.url, &token).await?
    } else {
        program_config.selection
    };

    let progress_manager = if program_config.show_progress {
        ProgressManager::new()
    } else {
        ProgressManager::new_disabled()
    };
    let on_progress: OnProgress = {
        let progress_manager = progress_manager.clone();
        Arc::new(move |event: ProgressEvent| progress_manager.handle_event(event))
    };

    info!(url = %args.url, "Fetching playlist");
    let result = downloader
        .download(
            &args.url,
            selection,
            workspace.path(),
            token.clone(),
            Some(on_progress),
        )
        .await;
    progress_manager.finish();
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) if token.is_cancelled() => {
            warn!(error = %e, "Download interrupted");
            return Err(HlsDownloaderError::Cancelled.into());
        }
        Err(e) => return Err(e.into()),
    };

    info!(
        segments = outcome.segments.len(),
        output = %program_config.output.display(),
        "Stitching segments"
    );
    muxer
        .concat(&outcome.list_path, &program_config.output, &token)
        .await?;

    info!(
        output = %program_config.output.display(),
        elapsed = ?started.elapsed(),
        "Done"
    );
    Ok(())
}

/// Show the master playlist's variants and read the choice from stdin.
/// A media playlist has nothing to choose from.
async fn choose_variant(
    downloader: &HlsDownloader,
    url: &str,
    token: &CancellationToken,
) -> Result<VariantSelection, AppError> {
    let variants = match downloader.probe(url).await? {
        Manifest::Master(variants) => variants,
        Manifest::Media(_) => {
            info!("Input is a media playlist, nothing to choose");
            return Ok(VariantSelection::Highest);
        }
    };

    let pending = utils::prompt_variant_in_background(variants);
    let index = utils::await_choice(pending, token).await?;
    Ok(VariantSelection::Index(index))
}
