//! Startup configuration from command line flags and environment variables.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use clap::Parser;
use tracing::{debug, warn};

use crate::coordinator::{is_valid_scratch_name, DEFAULT_SCRATCH_DIR};

/// Desktop downloader for video-sharing site URLs
#[derive(Debug, Parser)]
#[command(name = "tubegrab", version, about)]
pub struct Args {
    /// Path to the yt-dlp binary used to resolve URLs
    #[arg(long, env = "TUBEGRAB_YT_DLP")]
    pub yt_dlp: Option<PathBuf>,

    /// Path to the ffmpeg binary used to merge split streams
    #[arg(long, env = "TUBEGRAB_FFMPEG")]
    pub ffmpeg: Option<PathBuf>,

    /// Initial download folder
    #[arg(long, env = "TUBEGRAB_DOWNLOAD_DIR")]
    pub download_dir: Option<PathBuf>,

    /// Quiet period after the last keystroke before a URL is resolved
    #[arg(long, default_value_t = 600)]
    pub debounce_ms: u64,

    /// Upper bound for one metadata lookup
    #[arg(long, default_value_t = 30)]
    pub metadata_timeout_secs: u64,

    /// HTTP connect timeout for stream transfers
    #[arg(long, default_value_t = 15)]
    pub connect_timeout_secs: u64,

    /// Name of the temporary folder created under the destination for split streams
    #[arg(long, default_value = DEFAULT_SCRATCH_DIR, value_parser = parse_scratch_name)]
    pub scratch_dir_name: String,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Resolved settings the application runs with
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub yt_dlp: PathBuf,
    pub ffmpeg: PathBuf,
    pub download_dir: PathBuf,
    pub debounce: Duration,
    pub metadata_timeout: Duration,
    pub connect_timeout: Duration,
    pub scratch_dir_name: String,
}

impl AppConfig {
    pub fn from_args(args: &Args) -> Self {
        let config = Self {
            yt_dlp: locate_tool("yt-dlp", args.yt_dlp.as_deref()),
            ffmpeg: locate_tool("ffmpeg", args.ffmpeg.as_deref()),
            download_dir: args.download_dir.clone().unwrap_or_else(default_download_dir),
            debounce: Duration::from_millis(args.debounce_ms),
            metadata_timeout: Duration::from_secs(args.metadata_timeout_secs),
            connect_timeout: Duration::from_secs(args.connect_timeout_secs),
            scratch_dir_name: args.scratch_dir_name.clone(),
        };
        debug!(?config, "configuration loaded");
        config
    }
}

/// The user's Downloads folder, falling back to `~/Downloads` and then the working directory.
pub fn default_download_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Downloads")))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn parse_scratch_name(name: &str) -> Result<String, String> {
    if is_valid_scratch_name(name) {
        Ok(name.to_string())
    } else {
        Err("must be a single folder name".to_string())
    }
}

/// Explicit path wins; otherwise search PATH. A bare name is kept as a last
/// resort so the failure surfaces on first use rather than at startup.
fn locate_tool(name: &str, explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    match which::which(name) {
        Ok(path) => path,
        Err(e) => {
            warn!(tool = name, error = %e, "tool not found in PATH");
            PathBuf::from(name)
        }
    }
}
