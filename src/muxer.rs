//! Combines a video-only file and an audio-only file into one container via ffmpeg.

use std::{
    ffi::OsString,
    io,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use tracing::{debug, info};

use crate::error::MuxError;

/// Attaches the audio of one file to the video timeline of another.
pub trait Muxer: Send + Sync {
    fn mux(&self, video: &Path, audio: &Path, output: &Path) -> Result<(), MuxError>;
}

/// Stream-copy mux through an external `ffmpeg` binary.
pub struct FfmpegMuxer {
    binary: PathBuf,
}

impl FfmpegMuxer {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn build_args(video: &Path, audio: &Path, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-hide_banner", "-loglevel", "error", "-y", "-i"]
            .into_iter()
            .map(OsString::from)
            .collect();
        args.push(video.into());
        args.push("-i".into());
        args.push(audio.into());
        // first video track of input 0, first audio track of input 1, no re-encode
        for arg in ["-map", "0:v:0", "-map", "1:a:0", "-c", "copy"] {
            args.push(arg.into());
        }
        args.push(output.into());
        args
    }
}

impl Muxer for FfmpegMuxer {
    fn mux(&self, video: &Path, audio: &Path, output: &Path) -> Result<(), MuxError> {
        let args = Self::build_args(video, audio, output);
        debug!(binary = %self.binary.display(), ?args, "running muxer");

        let result = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output();

        let out = match result {
            Ok(out) => out,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(MuxError::ToolMissing(self.binary.clone()));
            }
            Err(e) => return Err(e.into()),
        };

        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
            return Err(MuxError::Failed {
                code: out.status.code(),
                stderr,
            });
        }

        info!(output = %output.display(), "merged video and audio");
        Ok(())
    }
}
