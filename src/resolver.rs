//! Turns a source URL into a [`VideoDescriptor`] by asking `yt-dlp` for its metadata.

use std::{collections::BTreeMap, io, path::PathBuf, process::Stdio, time::Duration};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::{process::Command, time::timeout};
use tracing::{debug, info, warn};

use crate::{
    error::ResolveError,
    model::{StreamDescriptor, StreamKind, VideoDescriptor},
};

/// Resolution seam between the shell and whatever knows how to read a video page.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, source: &str) -> Result<VideoDescriptor, ResolveError>;
}

/// `yt-dlp --dump-json` backed resolver.
#[derive(Debug, Clone)]
pub struct YtDlpResolver {
    binary: PathBuf,
    timeout: Duration,
}

impl YtDlpResolver {
    pub fn new(binary: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }
}

#[async_trait]
impl Resolver for YtDlpResolver {
    async fn resolve(&self, source: &str) -> Result<VideoDescriptor, ResolveError> {
        info!(%source, "resolving video");

        let mut cmd = Command::new(&self.binary);
        cmd.args(["--dump-json", "--no-playlist", "--no-warnings", "--"])
            .arg(source)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let out = match timeout(self.timeout, cmd.output()).await {
            Err(_) => return Err(ResolveError::Timeout(self.timeout)),
            Ok(Err(e)) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ResolveError::ToolMissing(self.binary.clone()));
            }
            Ok(Err(e)) => return Err(e.into()),
            Ok(Ok(out)) => out,
        };

        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            warn!(%source, code = ?out.status.code(), "yt-dlp failed");
            return Err(classify_failure(&stderr));
        }

        let video = parse_dump(&out.stdout, source)?;
        info!(title = %video.title, streams = video.streams.len(), "resolved video");
        Ok(video)
    }
}

#[derive(Debug, Deserialize)]
struct Dump {
    title: Option<String>,
    thumbnail: Option<String>,
    #[serde(default)]
    formats: Vec<RawFormat>,
}

#[derive(Debug, Deserialize)]
struct RawFormat {
    format_id: String,
    #[serde(default)]
    ext: String,
    url: Option<String>,
    protocol: Option<String>,
    vcodec: Option<String>,
    acodec: Option<String>,
    height: Option<u32>,
    filesize: Option<u64>,
    filesize_approx: Option<u64>,
    abr: Option<f64>,
    #[serde(default)]
    http_headers: BTreeMap<String, String>,
}

impl RawFormat {
    fn has_track(codec: &Option<String>) -> bool {
        codec.as_deref().is_some_and(|c| !c.is_empty() && c != "none")
    }

    fn into_stream(self) -> Option<StreamDescriptor> {
        // manifests (HLS/DASH) and storyboards cannot be fetched as one file
        if !matches!(self.protocol.as_deref(), Some("http" | "https")) {
            return None;
        }
        let url = self.url?;

        let video = Self::has_track(&self.vcodec);
        let audio = Self::has_track(&self.acodec);
        let kind = match (video, audio) {
            (true, true) => StreamKind::Combined,
            (true, false) => StreamKind::VideoOnly,
            (false, true) => StreamKind::AudioOnly,
            (false, false) => return None,
        };

        let resolution = match kind {
            StreamKind::AudioOnly => None,
            _ => Some(format!("{}p", self.height?)),
        };

        Some(StreamDescriptor {
            format_id: self.format_id,
            kind,
            resolution,
            container: self.ext,
            filesize: self.filesize.or(self.filesize_approx),
            audio_bitrate: self.abr,
            url,
            headers: self.http_headers,
        })
    }
}

/// Builds a descriptor from the first JSON object `yt-dlp --dump-json` printed.
/// The object may span several lines; anything before it is skipped.
pub fn parse_dump(stdout: &[u8], source: &str) -> Result<VideoDescriptor, ResolveError> {
    let no_metadata = || ResolveError::Failed("resolver printed no metadata".to_string());
    let start = stdout.iter().position(|b| *b == b'{').ok_or_else(no_metadata)?;

    let dump: Dump = serde_json::Deserializer::from_slice(&stdout[start..])
        .into_iter::<Dump>()
        .next()
        .ok_or_else(no_metadata)??;
    let total = dump.formats.len();
    let streams: Vec<StreamDescriptor> = dump
        .formats
        .into_iter()
        .filter_map(RawFormat::into_stream)
        .collect();
    debug!(total, kept = streams.len(), "filtered formats");

    Ok(VideoDescriptor {
        source: source.to_string(),
        title: dump.title.unwrap_or_default(),
        thumbnail: dump.thumbnail,
        streams,
    })
}

const UNAVAILABLE_MARKERS: &[&str] = &[
    "video unavailable",
    "private video",
    "this video is not available",
    "has been removed",
    "is not a valid url",
    "unsupported url",
    "incomplete youtube id",
];

/// Maps `yt-dlp` stderr to an error, singling out unavailable or invalid links.
pub fn classify_failure(stderr: &str) -> ResolveError {
    let lower = stderr.to_lowercase();
    if UNAVAILABLE_MARKERS.iter().any(|m| lower.contains(m)) {
        return ResolveError::VideoUnavailable;
    }

    let message = stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| l.starts_with("ERROR:"))
        .or_else(|| stderr.lines().rev().map(str::trim).find(|l| !l.is_empty()))
        .unwrap_or("resolver exited without output");
    ResolveError::Failed(message.to_string())
}
