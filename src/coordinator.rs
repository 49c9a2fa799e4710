//! Decides how a download request is served and runs it to completion.
//!
//! A combined ("progressive") stream at the requested resolution is always
//! preferred. Otherwise a video-only and an audio-only stream are fetched into
//! a scratch directory under the destination and muxed into the final file.

use std::{
    fs, io,
    path::{Component, Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use tracing::{debug, info, warn};

use crate::{
    error::DownloadError,
    model::{
        CancelFlag, DownloadEvent, DownloadOutcome, DownloadRequest, Stage, StreamDescriptor,
        VideoDescriptor,
    },
    muxer::Muxer,
    progress::ProgressMeter,
    transfer::Transfer,
};

pub const DEFAULT_SCRATCH_DIR: &str = "temp_downloads";

const MAX_SCRATCH_ATTEMPTS: u32 = 100;

/// A scratch directory name must be exactly one plain path component, so it
/// always names a fresh child of the destination.
pub fn is_valid_scratch_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Streams chosen for a request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Selection<'a> {
    Audio(&'a StreamDescriptor),
    Progressive(&'a StreamDescriptor),
    Split {
        video: &'a StreamDescriptor,
        audio: &'a StreamDescriptor,
    },
}

/// Picks the streams that satisfy `request`, without touching anything.
pub fn select<'a>(
    video: &'a VideoDescriptor,
    request: &DownloadRequest,
) -> Result<Selection<'a>, DownloadError> {
    if request.audio_only {
        return video
            .audio_only()
            .map(Selection::Audio)
            .ok_or(DownloadError::AudioUnavailable);
    }

    if let Some(stream) = video.combined_at(&request.resolution) {
        return Ok(Selection::Progressive(stream));
    }

    match (video.video_only_at(&request.resolution), video.audio_only()) {
        (Some(v), Some(a)) => Ok(Selection::Split { video: v, audio: a }),
        _ => Err(DownloadError::QualityUnavailable),
    }
}

pub struct Coordinator {
    transfer: Arc<dyn Transfer>,
    muxer: Arc<dyn Muxer>,
    scratch_name: String,
    busy: AtomicBool,
}

impl Coordinator {
    pub fn new(transfer: Arc<dyn Transfer>, muxer: Arc<dyn Muxer>) -> Self {
        Self {
            transfer,
            muxer,
            scratch_name: DEFAULT_SCRATCH_DIR.to_string(),
            busy: AtomicBool::new(false),
        }
    }

    pub fn with_scratch_name(mut self, name: impl Into<String>) -> Self {
        self.scratch_name = name.into();
        self
    }

    /// Serves one download request. Only one call may run at a time; a
    /// concurrent call is rejected with [`DownloadError::Busy`].
    pub fn download<F>(
        &self,
        video: Option<&VideoDescriptor>,
        request: &DownloadRequest,
        cancel: &CancelFlag,
        report: F,
    ) -> Result<DownloadOutcome, DownloadError>
    where
        F: Fn(DownloadEvent),
    {
        let _slot = InFlight::acquire(&self.busy).ok_or(DownloadError::Busy)?;

        let video = video.ok_or(DownloadError::NoVideo)?;
        if request.destination.as_os_str().is_empty() {
            return Err(DownloadError::NoDestination);
        }

        report(DownloadEvent::Stage(Stage::Starting {
            title: video.title.clone(),
        }));

        let selection = select(video, request)?;
        info!(
            title = %video.title,
            source = %video.source,
            resolution = %request.resolution,
            audio_only = request.audio_only,
            ?selection,
            "starting download"
        );

        let dest = &request.destination;
        fs::create_dir_all(dest)?;

        let outcome = match selection {
            Selection::Audio(stream) => {
                let target = dest.join(video.default_filename(stream));
                self.fetch(stream, &target, cancel, &report)?;
                DownloadOutcome::Audio(target)
            }
            Selection::Progressive(stream) => {
                let target = dest.join(video.default_filename(stream));
                self.fetch(stream, &target, cancel, &report)?;
                DownloadOutcome::Progressive(target)
            }
            Selection::Split { video: v, audio: a } => {
                let output = dest.join(video.default_filename(v));
                self.fetch_and_merge(v, a, dest, &output, cancel, &report)?;
                DownloadOutcome::Merged(output)
            }
        };

        info!(path = %outcome.path().display(), "download finished");
        Ok(outcome)
    }

    fn fetch_and_merge<F>(
        &self,
        video: &StreamDescriptor,
        audio: &StreamDescriptor,
        dest: &Path,
        output: &Path,
        cancel: &CancelFlag,
        report: &F,
    ) -> Result<(), DownloadError>
    where
        F: Fn(DownloadEvent),
    {
        let mut scratch = ScratchDir::create(dest, &self.scratch_name)?;

        report(DownloadEvent::Stage(Stage::FetchingVideo));
        let video_file = scratch.file(format!("video.{}", video.container));
        self.fetch(video, &video_file, cancel, report)?;

        report(DownloadEvent::Stage(Stage::FetchingAudio));
        let audio_file = scratch.file(format!("audio.{}", audio.container));
        self.fetch(audio, &audio_file, cancel, report)?;

        if cancel.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }

        report(DownloadEvent::Stage(Stage::Merging));
        if let Err(e) = self.muxer.mux(&video_file, &audio_file, output) {
            remove_quietly(output);
            return Err(e.into());
        }
        Ok(())
    }

    fn fetch<F>(
        &self,
        stream: &StreamDescriptor,
        target: &Path,
        cancel: &CancelFlag,
        report: &F,
    ) -> Result<(), DownloadError>
    where
        F: Fn(DownloadEvent),
    {
        debug!(format_id = %stream.format_id, target = %target.display(), "fetching stream");
        let mut meter = ProgressMeter::default();
        self.transfer.fetch(stream, target, cancel, &mut |total, remaining| {
            if let Some(pct) = meter.observe(total, remaining) {
                report(DownloadEvent::Progress(pct));
            }
        })?;
        Ok(())
    }
}

/// Holds the single download slot of a [`Coordinator`] until dropped.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Directory for elementary streams. It is always created fresh, and on drop
/// only the files handed out by [`ScratchDir::file`] and the directory itself
/// are removed.
struct ScratchDir {
    path: PathBuf,
    files: Vec<PathBuf>,
}

impl ScratchDir {
    /// Creates `dest/name`, or `dest/name-N` when that is already taken.
    fn create(dest: &Path, name: &str) -> io::Result<Self> {
        if !is_valid_scratch_name(name) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid scratch directory name {:?}", name),
            ));
        }
        for attempt in 0..MAX_SCRATCH_ATTEMPTS {
            let candidate = match attempt {
                0 => dest.join(name),
                n => dest.join(format!("{}-{}", name, n)),
            };
            match fs::create_dir(&candidate) {
                Ok(()) => {
                    debug!(path = %candidate.display(), "created scratch directory");
                    return Ok(Self {
                        path: candidate,
                        files: Vec::new(),
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e),
            }
        }
        Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("no free scratch directory name under {}", dest.display()),
        ))
    }

    /// Path of a file inside the directory, owned by this guard.
    fn file(&mut self, name: String) -> PathBuf {
        let path = self.path.join(name);
        self.files.push(path.clone());
        path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        for file in &self.files {
            remove_quietly(file);
        }
        match fs::remove_dir(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "removed scratch directory"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "could not remove scratch directory"),
        }
    }
}

fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "could not remove file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::{MuxError, TransferError},
        model::{fixtures::*, StreamKind},
    };
    use std::{
        cell::RefCell,
        sync::{mpsc, Mutex},
        thread,
    };

    const CHUNK: usize = 1024;

    /// Writes `filesize` bytes in fixed chunks, optionally failing for one stream kind.
    #[derive(Default)]
    struct FakeTransfer {
        fail_on: Option<StreamKind>,
        cancel_after_first: bool,
        calls: Mutex<Vec<(StreamKind, PathBuf)>>,
    }

    impl Transfer for FakeTransfer {
        fn fetch(
            &self,
            stream: &StreamDescriptor,
            target: &Path,
            cancel: &CancelFlag,
            on_chunk: &mut dyn FnMut(u64, u64),
        ) -> Result<u64, TransferError> {
            self.calls.lock().unwrap().push((stream.kind, target.to_path_buf()));
            if cancel.is_cancelled() {
                return Err(TransferError::Cancelled);
            }
            if self.fail_on == Some(stream.kind) {
                return Err(TransferError::Status(500));
            }
            let total = stream.filesize.unwrap_or(0);
            let mut written = 0u64;
            let mut data = Vec::new();
            while written < total {
                let n = (total - written).min(CHUNK as u64);
                data.extend(std::iter::repeat(0u8).take(n as usize));
                written += n;
                on_chunk(total, total - written);
            }
            fs::write(target, &data)?;
            if self.cancel_after_first {
                cancel.cancel();
            }
            Ok(written)
        }
    }

    #[derive(Default)]
    struct FakeMuxer {
        fail: bool,
        calls: Mutex<Vec<PathBuf>>,
        scratch_listing: Mutex<Vec<String>>,
    }

    impl Muxer for FakeMuxer {
        fn mux(&self, video: &Path, audio: &Path, output: &Path) -> Result<(), MuxError> {
            assert_eq!(video.parent(), audio.parent());
            let mut names: Vec<String> = fs::read_dir(video.parent().unwrap())
                .unwrap()
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect();
            names.sort();
            *self.scratch_listing.lock().unwrap() = names;
            self.calls.lock().unwrap().push(output.to_path_buf());
            if self.fail {
                fs::write(output, b"half")?;
                return Err(MuxError::Failed {
                    code: Some(1),
                    stderr: "Invalid data found when processing input".into(),
                });
            }
            fs::write(output, b"merged")?;
            Ok(())
        }
    }

    struct Harness {
        transfer: Arc<FakeTransfer>,
        muxer: Arc<FakeMuxer>,
        coordinator: Coordinator,
        dir: tempfile::TempDir,
    }

    fn harness(transfer: FakeTransfer, muxer: FakeMuxer) -> Harness {
        let transfer = Arc::new(transfer);
        let muxer = Arc::new(muxer);
        let coordinator = Coordinator::new(transfer.clone(), muxer.clone());
        Harness {
            transfer,
            muxer,
            coordinator,
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn request(dest: &Path, resolution: &str, audio_only: bool) -> DownloadRequest {
        DownloadRequest {
            resolution: resolution.to_string(),
            audio_only,
            destination: dest.to_path_buf(),
        }
    }

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    fn scenario_a_video() -> VideoDescriptor {
        video(vec![
            stream(StreamKind::Combined, Some("360p"), "mp4"),
            stream(StreamKind::Combined, Some("720p"), "mp4"),
            stream(StreamKind::VideoOnly, Some("1080p"), "mp4"),
            audio("m4a", 128.0),
        ])
    }

    #[test]
    fn split_stream_fetches_both_tracks_merges_and_cleans_up() {
        let h = harness(FakeTransfer::default(), FakeMuxer::default());
        let v = scenario_a_video();
        let dest = h.dir.path();

        let outcome = h
            .coordinator
            .download(Some(&v), &request(dest, "1080p", false), &CancelFlag::default(), |_| {})
            .unwrap();

        let expected = dest.join("Never Gonna Give You Up.mp4");
        assert_eq!(outcome, DownloadOutcome::Merged(expected.clone()));
        assert_eq!(*h.muxer.calls.lock().unwrap(), vec![expected]);
        assert_eq!(*h.muxer.scratch_listing.lock().unwrap(), vec!["audio.m4a", "video.mp4"]);

        let calls = h.transfer.calls.lock().unwrap();
        let scratch = dest.join(DEFAULT_SCRATCH_DIR);
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], (StreamKind::VideoOnly, scratch.join("video.mp4")));
        assert_eq!(calls[1], (StreamKind::AudioOnly, scratch.join("audio.m4a")));

        assert!(!scratch.exists());
        assert_eq!(entries(dest), vec!["Never Gonna Give You Up.mp4"]);
    }

    #[test]
    fn combined_stream_is_fetched_directly() {
        let h = harness(FakeTransfer::default(), FakeMuxer::default());
        let v = video(vec![stream(StreamKind::Combined, Some("480p"), "mp4")]);
        let dest = h.dir.path();

        let outcome = h
            .coordinator
            .download(Some(&v), &request(dest, "480p", false), &CancelFlag::default(), |_| {})
            .unwrap();

        let target = dest.join("Never Gonna Give You Up.mp4");
        assert_eq!(outcome, DownloadOutcome::Progressive(target.clone()));
        assert_eq!(*h.transfer.calls.lock().unwrap(), vec![(StreamKind::Combined, target)]);
        assert!(h.muxer.calls.lock().unwrap().is_empty());
        assert_eq!(entries(dest), vec!["Never Gonna Give You Up.mp4"]);
    }

    #[test]
    fn combined_is_preferred_over_split_at_same_resolution() {
        let h = harness(FakeTransfer::default(), FakeMuxer::default());
        let v = scenario_a_video();
        let outcome = h
            .coordinator
            .download(Some(&v), &request(h.dir.path(), "720p", false), &CancelFlag::default(), |_| {})
            .unwrap();
        assert!(matches!(outcome, DownloadOutcome::Progressive(_)));
        assert!(!h.dir.path().join(DEFAULT_SCRATCH_DIR).exists());
    }

    #[test]
    fn audio_only_ignores_resolution() {
        let h = harness(FakeTransfer::default(), FakeMuxer::default());
        let v = scenario_a_video();
        let outcome = h
            .coordinator
            .download(Some(&v), &request(h.dir.path(), "no-such-quality", true), &CancelFlag::default(), |_| {})
            .unwrap();

        assert_eq!(
            outcome,
            DownloadOutcome::Audio(h.dir.path().join("Never Gonna Give You Up.m4a"))
        );
        let calls = h.transfer.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, StreamKind::AudioOnly);
    }

    #[test]
    fn missing_audio_stream_leaves_destination_untouched() {
        let h = harness(FakeTransfer::default(), FakeMuxer::default());
        let v = video(vec![stream(StreamKind::Combined, Some("720p"), "mp4")]);
        let err = h
            .coordinator
            .download(Some(&v), &request(h.dir.path(), "720p", true), &CancelFlag::default(), |_| {})
            .unwrap_err();

        assert!(matches!(err, DownloadError::AudioUnavailable));
        assert_eq!(err.to_string(), "Audio stream not available.");
        assert!(entries(h.dir.path()).is_empty());
        assert!(h.transfer.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn no_resolved_video_is_rejected_without_touching_disk() {
        let h = harness(FakeTransfer::default(), FakeMuxer::default());
        let dest = h.dir.path().join("not-yet-created");
        let err = h
            .coordinator
            .download(None, &request(&dest, "720p", false), &CancelFlag::default(), |_| {})
            .unwrap_err();

        assert!(matches!(err, DownloadError::NoVideo));
        assert_eq!(err.to_string(), "Please fetch video info first.");
        assert!(!dest.exists());
    }

    #[test]
    fn empty_destination_is_rejected() {
        let h = harness(FakeTransfer::default(), FakeMuxer::default());
        let v = scenario_a_video();
        let err = h
            .coordinator
            .download(Some(&v), &request(Path::new(""), "720p", false), &CancelFlag::default(), |_| {})
            .unwrap_err();
        assert!(matches!(err, DownloadError::NoDestination));
    }

    #[test]
    fn unknown_quality_is_rejected() {
        let h = harness(FakeTransfer::default(), FakeMuxer::default());
        let no_audio = video(vec![stream(StreamKind::VideoOnly, Some("1080p"), "mp4")]);
        for (v, res) in [(scenario_a_video(), "144p"), (no_audio, "1080p")] {
            let err = h
                .coordinator
                .download(Some(&v), &request(h.dir.path(), res, false), &CancelFlag::default(), |_| {})
                .unwrap_err();
            assert!(matches!(err, DownloadError::QualityUnavailable));
        }
        assert!(entries(h.dir.path()).is_empty());
    }

    #[test]
    fn failed_audio_transfer_still_removes_scratch_dir() {
        let h = harness(
            FakeTransfer {
                fail_on: Some(StreamKind::AudioOnly),
                ..Default::default()
            },
            FakeMuxer::default(),
        );
        let v = scenario_a_video();
        let err = h
            .coordinator
            .download(Some(&v), &request(h.dir.path(), "1080p", false), &CancelFlag::default(), |_| {})
            .unwrap_err();

        assert!(matches!(err, DownloadError::Transfer(TransferError::Status(500))));
        assert!(h.muxer.calls.lock().unwrap().is_empty());
        assert!(entries(h.dir.path()).is_empty());
    }

    #[test]
    fn failed_mux_removes_scratch_dir_and_partial_output() {
        let h = harness(
            FakeTransfer::default(),
            FakeMuxer {
                fail: true,
                ..Default::default()
            },
        );
        let v = scenario_a_video();
        let err = h
            .coordinator
            .download(Some(&v), &request(h.dir.path(), "1080p", false), &CancelFlag::default(), |_| {})
            .unwrap_err();

        assert!(matches!(err, DownloadError::Mux(_)));
        assert!(err.status_text().starts_with("An error occurred: "));
        assert!(entries(h.dir.path()).is_empty());
    }

    #[test]
    fn cancellation_between_tracks_skips_merge() {
        let h = harness(
            FakeTransfer {
                cancel_after_first: true,
                ..Default::default()
            },
            FakeMuxer::default(),
        );
        let v = scenario_a_video();
        let err = h
            .coordinator
            .download(Some(&v), &request(h.dir.path(), "1080p", false), &CancelFlag::default(), |_| {})
            .unwrap_err();

        assert!(matches!(err, DownloadError::Cancelled));
        assert!(h.muxer.calls.lock().unwrap().is_empty());
        assert!(entries(h.dir.path()).is_empty());
    }

    #[test]
    fn progress_is_monotonic_per_transfer_and_bounded() {
        let h = harness(FakeTransfer::default(), FakeMuxer::default());
        let v = scenario_a_video();
        let events = RefCell::new(Vec::new());
        h.coordinator
            .download(Some(&v), &request(h.dir.path(), "1080p", false), &CancelFlag::default(), |e| {
                events.borrow_mut().push(e)
            })
            .unwrap();

        let events = events.into_inner();
        assert_eq!(
            events[0],
            DownloadEvent::Stage(Stage::Starting {
                title: "Never Gonna Give You Up".into()
            })
        );

        // split the event stream into one progress run per transfer
        let mut runs: Vec<Vec<f32>> = Vec::new();
        for e in &events {
            match e {
                DownloadEvent::Stage(Stage::FetchingVideo | Stage::FetchingAudio) => runs.push(Vec::new()),
                DownloadEvent::Progress(p) => runs.last_mut().unwrap().push(*p),
                _ => {}
            }
        }
        assert_eq!(runs.len(), 2);
        for run in runs {
            assert_eq!(run, vec![25.0, 50.0, 75.0, 100.0]);
        }
        assert_eq!(events.last(), Some(&DownloadEvent::Stage(Stage::Merging)));
    }

    /// Blocks inside `fetch` until released, so a second call can race it.
    struct GateTransfer {
        started: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl Transfer for GateTransfer {
        fn fetch(
            &self,
            _stream: &StreamDescriptor,
            target: &Path,
            _cancel: &CancelFlag,
            _on_chunk: &mut dyn FnMut(u64, u64),
        ) -> Result<u64, TransferError> {
            self.started.lock().unwrap().send(()).unwrap();
            self.release.lock().unwrap().recv().unwrap();
            fs::write(target, b"x")?;
            Ok(1)
        }
    }

    #[test]
    fn overlapping_download_is_rejected() {
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let coordinator = Arc::new(Coordinator::new(
            Arc::new(GateTransfer {
                started: Mutex::new(started_tx),
                release: Mutex::new(release_rx),
            }),
            Arc::new(FakeMuxer::default()),
        ));
        let dir = tempfile::tempdir().unwrap();
        let v = Arc::new(video(vec![stream(StreamKind::Combined, Some("480p"), "mp4")]));
        let req = request(dir.path(), "480p", false);

        let first = {
            let coordinator = Arc::clone(&coordinator);
            let v = Arc::clone(&v);
            let req = req.clone();
            thread::spawn(move || coordinator.download(Some(v.as_ref()), &req, &CancelFlag::default(), |_| {}))
        };
        started_rx.recv().unwrap();

        let second = coordinator.download(Some(v.as_ref()), &req, &CancelFlag::default(), |_| {});
        assert!(matches!(second, Err(DownloadError::Busy)));

        release_tx.send(()).unwrap();
        assert!(first.join().unwrap().is_ok());

        // the slot is free again once the first download returned
        let third = {
            let coordinator = Arc::clone(&coordinator);
            let v = Arc::clone(&v);
            thread::spawn(move || coordinator.download(Some(v.as_ref()), &req, &CancelFlag::default(), |_| {}))
        };
        started_rx.recv().unwrap();
        release_tx.send(()).unwrap();
        assert!(third.join().unwrap().is_ok());
    }

    #[test]
    fn existing_scratch_directory_is_never_adopted() {
        let h = harness(FakeTransfer::default(), FakeMuxer::default());
        let dest = h.dir.path();
        let taken = dest.join(DEFAULT_SCRATCH_DIR);
        fs::create_dir(&taken).unwrap();
        fs::write(taken.join("my_thesis.docx"), b"years of work").unwrap();

        let outcome = h
            .coordinator
            .download(Some(&scenario_a_video()), &request(dest, "1080p", false), &CancelFlag::default(), |_| {})
            .unwrap();

        assert!(outcome.path().exists());
        assert_eq!(fs::read(taken.join("my_thesis.docx")).unwrap(), b"years of work");
        let calls = h.transfer.calls.lock().unwrap();
        let fresh = dest.join(format!("{}-1", DEFAULT_SCRATCH_DIR));
        assert_eq!(calls[0].1, fresh.join("video.mp4"));
        assert!(!fresh.exists());
        assert_eq!(
            entries(dest),
            vec!["Never Gonna Give You Up.mp4", DEFAULT_SCRATCH_DIR]
        );
    }

    #[test]
    fn scratch_names_outside_a_single_child_are_refused() {
        for name in ["", ".", "..", "nested/dir", "/tmp"] {
            assert!(!is_valid_scratch_name(name), "{name:?}");

            let h = harness(FakeTransfer::default(), FakeMuxer::default());
            let coordinator = Coordinator::new(h.transfer.clone(), h.muxer.clone()).with_scratch_name(name);
            let dest = h.dir.path();
            fs::write(dest.join("keep.txt"), b"mine").unwrap();

            let err = coordinator
                .download(Some(&scenario_a_video()), &request(dest, "1080p", false), &CancelFlag::default(), |_| {})
                .unwrap_err();

            assert!(matches!(&err, DownloadError::Io(e) if e.kind() == io::ErrorKind::InvalidInput), "{name:?}");
            assert!(h.transfer.calls.lock().unwrap().is_empty());
            assert_eq!(entries(dest), vec!["keep.txt"]);
        }
        assert!(is_valid_scratch_name("temp_downloads"));
        assert!(is_valid_scratch_name(".parts"));
    }

    #[test]
    fn scratch_dir_name_is_configurable() {
        let h = harness(FakeTransfer::default(), FakeMuxer::default());
        let coordinator = Coordinator::new(h.transfer.clone(), h.muxer.clone()).with_scratch_name(".parts");
        coordinator
            .download(Some(&scenario_a_video()), &request(h.dir.path(), "1080p", false), &CancelFlag::default(), |_| {})
            .unwrap();
        let calls = h.transfer.calls.lock().unwrap();
        assert_eq!(calls[0].1, h.dir.path().join(".parts").join("video.mp4"));
        assert!(!h.dir.path().join(".parts").exists());
    }
}
