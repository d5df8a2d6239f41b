//! # hlsget
//!
//! A library for downloading HLS video-on-demand assets.
//!
//! ## Features
//!
//! - Master and media playlist resolution with bandwidth-based variant selection
//! - Bounded concurrent segment downloads with retry and backoff
//! - AES-128 segment decryption with key rotation
//! - Strict playback-order reconciliation and ffmpeg concat-list output

pub mod builder;
pub mod config;
pub mod downloader;
pub mod error;
pub mod hls;
pub mod muxer;

pub use builder::HlsConfigBuilder;
pub use config::DownloaderConfig;
pub use error::DownloadError;

pub use downloader::create_client;
pub use muxer::FfmpegMuxer;
