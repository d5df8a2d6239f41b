use clap::Parser;
use std::path::PathBuf;

/// Define CLI arguments
#[derive(Parser, Debug)]
#[command(
    author = "hua0512 <https://github.com/hua0512>",
    version,
    about = "Concurrent HLS video-on-demand downloader",
    long_about = "Downloads every segment of an HLS rendition in parallel, decrypts AES-128\n\
                  protected segments and stitches them into a single MP4 with ffmpeg.\n\
                  \n\
                  The input may be a master playlist (the highest bandwidth variant is picked\n\
                  unless --variant or --interactive is given) or a media playlist."
)]
pub struct CliArgs {
    /// Master or media playlist URL
    #[arg(required = true, help = "Master or media playlist URL")]
    pub url: String,

    /// Output file
    #[arg(
        short,
        long,
        help = "Output file, must end in .mp4 (default: <YYYYmmdd_HHMMSS>.mp4)"
    )]
    pub output: Option<PathBuf>,

    /// Number of concurrent segment requests
    #[arg(
        short = 'p',
        long = "workers",
        default_value = "0",
        help = "Number of concurrent segment requests. 0 derives it from the segment count and CPU cores"
    )]
    pub workers: usize,

    /// Overwrite the output file
    #[arg(short, long, help = "Overwrite the output file if it already exists")]
    pub force: bool,

    /// Pick a variant by position
    #[arg(
        long,
        conflicts_with = "interactive",
        help = "Variant to download, by position in the bandwidth-sorted list (0 is the highest)"
    )]
    pub variant: Option<usize>,

    /// Prompt for the variant
    #[arg(short, long, help = "List the available variants and prompt for one")]
    pub interactive: bool,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable detailed debug logging")]
    pub verbose: bool,

    /// Per-attempt segment timeout in seconds
    #[arg(
        long,
        default_value = "60",
        help = "Timeout for a single segment request in seconds"
    )]
    pub segment_timeout: u64,

    /// Retry bound for failing segments
    #[arg(
        long,
        help = "Maximum retries per segment (default: retry until interrupted)"
    )]
    pub retries: Option<u32>,

    /// Custom HTTP headers for download requests
    #[arg(
        long = "header",
        short = 'H',
        help = "Add custom HTTP header to requests (can be used multiple times). Format: 'Name: Value'",
        value_name = "HEADER"
    )]
    pub headers: Vec<String>,

    /// Override the User-Agent header
    #[arg(long, help = "User-Agent sent with every request")]
    pub user_agent: Option<String>,

    /// ffmpeg executable
    #[arg(long, default_value = "ffmpeg", help = "Path to the ffmpeg executable")]
    pub ffmpeg: PathBuf,

    /// Hide the progress bar
    #[arg(long, help = "Disable the progress bar")]
    pub no_progress: bool,

    /// Mirror logs into a file
    #[arg(long, help = "Also write logs to this file")]
    pub log_file: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = CliArgs::try_parse_from(["hlsget", "https://cdn.test/master.m3u8"]).unwrap();
        assert_eq!(args.url, "https://cdn.test/master.m3u8");
        assert_eq!(args.workers, 0);
        assert_eq!(args.segment_timeout, 60);
        assert!(args.retries.is_none());
        assert!(args.output.is_none());
        assert!(!args.force);
        assert_eq!(args.ffmpeg, PathBuf::from("ffmpeg"));
    }

    #[test]
    fn short_flags() {
        let args = CliArgs::try_parse_from([
            "hlsget",
            "-o",
            "movie.mp4",
            "-p",
            "8",
            "-f",
            "-v",
            "-H",
            "Referer: https://example.com",
            "https://cdn.test/master.m3u8",
        ])
        .unwrap();
        assert_eq!(args.output, Some(PathBuf::from("movie.mp4")));
        assert_eq!(args.workers, 8);
        assert!(args.force);
        assert!(args.verbose);
        assert_eq!(args.headers, vec!["Referer: https://example.com"]);
    }

    #[test]
    fn variant_and_interactive_conflict() {
        let result = CliArgs::try_parse_from([
            "hlsget",
            "--variant",
            "1",
            "--interactive",
            "https://cdn.test/master.m3u8",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn url_is_required() {
        assert!(CliArgs::try_parse_from(["hlsget"]).is_err());
    }
}
