//! Desktop video downloader: resolve a link, pick a quality, save it.

// egui window and form state
mod app;
// Command line / environment configuration
mod config;
// Download orchestration (select, fetch, merge, clean up)
mod coordinator;
// Error types per component
mod error;
// Data models for resolved videos and download requests
mod model;
// ffmpeg stream-copy merge
mod muxer;
// Progress computation for byte transfers
mod progress;
// yt-dlp metadata resolution
mod resolver;
// Thumbnail fetching module
mod thumbnail;
// Ranged HTTP stream transfer
mod transfer;

use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::Parser;
// eframe/egui for GUI application framework
use eframe::egui::{self, Visuals};
// OnceCell for single-time runtime initialization
use once_cell::sync::OnceCell;
use tokio::runtime::Runtime;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use app::DownloaderApp;
use config::{AppConfig, Args};
use coordinator::Coordinator;
use muxer::FfmpegMuxer;
use resolver::{Resolver, YtDlpResolver};
use transfer::HttpTransfer;

// Global Tokio runtime stored in a OnceCell for lazy init
static RUNTIME: OnceCell<Arc<Runtime>> = OnceCell::new();

/// Program entry point: loads configuration, builds the workers and launches the GUI
fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose)?;
    let config = AppConfig::from_args(&args);

    let rt = RUNTIME
        .get_or_try_init(|| Runtime::new().map(Arc::new))
        .context("failed to start the async runtime")?;

    // The blocking HTTP client must be built outside the runtime context
    let transfer = HttpTransfer::new(config.connect_timeout).context("failed to build the HTTP client")?;
    let coordinator = Arc::new(
        Coordinator::new(Arc::new(transfer), Arc::new(FfmpegMuxer::new(&config.ffmpeg)))
            .with_scratch_name(&config.scratch_dir_name),
    );
    let resolver: Arc<dyn Resolver> = Arc::new(YtDlpResolver::new(&config.yt_dlp, config.metadata_timeout));

    info!(
        yt_dlp = %config.yt_dlp.display(),
        ffmpeg = %config.ffmpeg.display(),
        "starting downloader"
    );

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([720.0, 560.0])
            .with_min_inner_size([480.0, 420.0]),
        ..Default::default()
    };
    let runtime = Arc::clone(rt);
    eframe::run_native(
        "Video Downloader",
        options,
        Box::new(move |cc| {
            // Use dark theme visuals
            cc.egui_ctx.set_visuals(Visuals::dark());
            Box::new(DownloaderApp::new(
                config.download_dir,
                config.debounce,
                resolver,
                coordinator,
                runtime,
            ))
        }),
    )
    .map_err(|e| anyhow!("window failed: {e}"))
}

fn init_logging(verbose: bool) -> anyhow::Result<()> {
    let filter = if verbose {
        EnvFilter::new("tubegrab=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .try_init()
        .context("failed to initialise logging")
}
