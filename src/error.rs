//! Error types for resolution, transfer, muxing and the download as a whole.

use std::{io, path::PathBuf, time::Duration};

use thiserror::Error;

/// Failure to turn a source URL into a [`crate::model::VideoDescriptor`]
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The URL does not point at an accessible video
    #[error("video unavailable")]
    VideoUnavailable,

    #[error("resolver not found: {}", .0.display())]
    ToolMissing(PathBuf),

    #[error("resolver timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("{0}")]
    Failed(String),

    #[error("could not parse resolver output: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ResolveError {
    /// Status line shown below the form.
    pub fn status_text(&self) -> String {
        match self {
            Self::VideoUnavailable => "Video is unavailable or the link is invalid.".to_string(),
            other => format!("An error occurred: {}", other),
        }
    }

    /// Replacement for the title label.
    pub fn title_text(&self) -> &'static str {
        match self {
            Self::VideoUnavailable => "Video Not Found",
            _ => "Error",
        }
    }
}

/// Failure while moving the bytes of one stream to disk
#[derive(Debug, Error)]
pub enum TransferError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("server answered with HTTP {0}")]
    Status(u16),

    #[error("stream ended after {done} of {total} bytes")]
    Incomplete { done: u64, total: u64 },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("transfer cancelled")]
    Cancelled,
}

/// Failure while combining a video and an audio track
#[derive(Debug, Error)]
pub enum MuxError {
    #[error("muxer not found: {}", .0.display())]
    ToolMissing(PathBuf),

    #[error("muxer exited with {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Everything a download attempt can end with besides success
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Please fetch video info first.")]
    NoVideo,

    #[error("Please select a download path.")]
    NoDestination,

    #[error("Audio stream not available.")]
    AudioUnavailable,

    #[error("Selected quality or audio stream not available.")]
    QualityUnavailable,

    #[error("A download is already in progress.")]
    Busy,

    #[error("Download cancelled.")]
    Cancelled,

    #[error("download worker stopped unexpectedly: {0}")]
    Worker(String),

    #[error(transparent)]
    Transfer(TransferError),

    #[error(transparent)]
    Mux(#[from] MuxError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<TransferError> for DownloadError {
    fn from(err: TransferError) -> Self {
        match err {
            TransferError::Cancelled => Self::Cancelled,
            other => Self::Transfer(other),
        }
    }
}

impl DownloadError {
    /// Local validation failures that are shown verbatim rather than as errors.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::NoVideo
                | Self::NoDestination
                | Self::AudioUnavailable
                | Self::QualityUnavailable
                | Self::Busy
                | Self::Cancelled
        )
    }

    pub fn status_text(&self) -> String {
        if self.is_rejection() {
            self.to_string()
        } else {
            format!("An error occurred: {}", self)
        }
    }
}
