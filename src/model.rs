use std::{
    cmp,
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

/// Which tracks a downloadable stream carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// Audio and video in a single file ("progressive")
    Combined,
    /// Video track only; needs an audio track merged in
    VideoOnly,
    /// Audio track only
    AudioOnly,
}

/// One downloadable variant of a resolved video
#[derive(Debug, Clone, PartialEq)]
pub struct StreamDescriptor {
    /// Resolver-side identifier of the format
    pub format_id: String,
    /// Track composition
    pub kind: StreamKind,
    /// Quality label such as "720p"; `None` for audio-only streams
    pub resolution: Option<String>,
    /// Container / file extension ("mp4", "webm", "m4a", ...)
    pub container: String,
    /// Total byte size, when the resolver knows it
    pub filesize: Option<u64>,
    /// Average audio bitrate in kbit/s
    pub audio_bitrate: Option<f64>,
    /// Direct media URL
    pub url: String,
    /// HTTP headers the media host expects
    pub headers: BTreeMap<String, String>,
}

impl StreamDescriptor {
    fn is_mp4_family(&self) -> bool {
        matches!(self.container.as_str(), "mp4" | "m4a")
    }
}

/// Result of resolving a source URL
#[derive(Debug, Clone, PartialEq)]
pub struct VideoDescriptor {
    /// The URL this descriptor was resolved from
    pub source: String,
    /// Human-readable title
    pub title: String,
    /// Preview image URL
    pub thumbnail: Option<String>,
    /// Streams in discovery order
    pub streams: Vec<StreamDescriptor>,
}

impl VideoDescriptor {
    /// Resolution labels offered to the user: mp4 combined streams first, then
    /// mp4 video-only streams, de-duplicated in first-seen order.
    pub fn resolutions(&self) -> Vec<String> {
        let combined = self
            .streams
            .iter()
            .filter(|s| s.kind == StreamKind::Combined && s.container == "mp4");
        let video_only = self
            .streams
            .iter()
            .filter(|s| s.kind == StreamKind::VideoOnly && s.container == "mp4");

        let mut labels: Vec<String> = Vec::new();
        for label in combined.chain(video_only).filter_map(|s| s.resolution.as_deref()) {
            if !labels.iter().any(|l| l == label) {
                labels.push(label.to_string());
            }
        }
        labels
    }

    /// First combined stream at `resolution`, mp4 preferred.
    pub fn combined_at(&self, resolution: &str) -> Option<&StreamDescriptor> {
        self.first_at(StreamKind::Combined, resolution)
    }

    /// First video-only stream at `resolution`, mp4 preferred.
    pub fn video_only_at(&self, resolution: &str) -> Option<&StreamDescriptor> {
        self.first_at(StreamKind::VideoOnly, resolution)
    }

    /// Best audio-only stream: highest bitrate in the mp4/m4a family, falling
    /// back to the highest bitrate of any container.
    pub fn audio_only(&self) -> Option<&StreamDescriptor> {
        let audio = || self.streams.iter().filter(|s| s.kind == StreamKind::AudioOnly);
        audio()
            .filter(|s| s.is_mp4_family())
            .max_by(by_bitrate)
            .or_else(|| audio().max_by(by_bitrate))
    }

    /// File name a stream is saved under: sanitized title plus container.
    pub fn default_filename(&self, stream: &StreamDescriptor) -> String {
        let stem = sanitize_filename::sanitize(self.title.trim());
        let stem = if stem.trim().is_empty() { "video".to_string() } else { stem };
        format!("{}.{}", stem, stream.container)
    }

    fn first_at(&self, kind: StreamKind, resolution: &str) -> Option<&StreamDescriptor> {
        let mut matching = self
            .streams
            .iter()
            .filter(|s| s.kind == kind && s.resolution.as_deref() == Some(resolution));
        let first = matching.next()?;
        if first.container == "mp4" {
            return Some(first);
        }
        matching.find(|s| s.container == "mp4").or(Some(first))
    }
}

fn by_bitrate(a: &&StreamDescriptor, b: &&StreamDescriptor) -> cmp::Ordering {
    a.audio_bitrate
        .unwrap_or(0.0)
        .total_cmp(&b.audio_bitrate.unwrap_or(0.0))
}

/// What the user asked to download
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    /// Selected resolution label; ignored in audio-only mode
    pub resolution: String,
    /// Download only the audio track
    pub audio_only: bool,
    /// Destination folder
    pub destination: PathBuf,
}

/// Stages of a download, reported to the shell as status text
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Starting { title: String },
    FetchingVideo,
    FetchingAudio,
    Merging,
}

impl Stage {
    pub fn message(&self) -> String {
        match self {
            Stage::Starting { title } => format!("Downloading '{}'...", title),
            Stage::FetchingVideo => "Downloading video stream...".into(),
            Stage::FetchingAudio => "Downloading audio stream...".into(),
            Stage::Merging => "Merging video and audio...".into(),
        }
    }
}

/// Progress messages emitted by a running download
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadEvent {
    Stage(Stage),
    /// Percent complete of the current transfer, 0.0 - 100.0
    Progress(f32),
}

/// Which path a successful download took, and where the file landed
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadOutcome {
    Audio(PathBuf),
    Progressive(PathBuf),
    Merged(PathBuf),
}

impl DownloadOutcome {
    pub fn path(&self) -> &Path {
        match self {
            Self::Audio(p) | Self::Progressive(p) | Self::Merged(p) => p,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::Audio(_) => "Audio Download Complete!",
            Self::Progressive(_) => "Download Complete!",
            Self::Merged(_) => "Download and Merge Complete!",
        }
    }
}

/// Cooperative cancellation shared between the shell and a worker
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn stream(kind: StreamKind, resolution: Option<&str>, container: &str) -> StreamDescriptor {
        StreamDescriptor {
            format_id: format!("{:?}-{}-{}", kind, resolution.unwrap_or("audio"), container),
            kind,
            resolution: resolution.map(str::to_string),
            container: container.to_string(),
            filesize: Some(4096),
            audio_bitrate: None,
            url: "https://media.invalid/stream".to_string(),
            headers: BTreeMap::new(),
        }
    }

    pub fn audio(container: &str, bitrate: f64) -> StreamDescriptor {
        StreamDescriptor {
            audio_bitrate: Some(bitrate),
            ..stream(StreamKind::AudioOnly, None, container)
        }
    }

    pub fn video(streams: Vec<StreamDescriptor>) -> VideoDescriptor {
        VideoDescriptor {
            source: "https://www.youtube.com/watch?v=dQw4w9WgXcQ".to_string(),
            title: "Never Gonna Give You Up".to_string(),
            thumbnail: None,
            streams,
        }
    }
}
