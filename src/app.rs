//! The window: form state, event handling and worker dispatch.

use std::{
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

use eframe::{
    egui::{self, Color32, ColorImage, TextureOptions},
    App, Frame,
};
use rfd::FileDialog;
use tokio::{
    runtime::Runtime,
    sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
};
use tracing::{debug, warn};

use crate::{
    coordinator::Coordinator,
    error::{DownloadError, ResolveError},
    model::{CancelFlag, DownloadEvent, DownloadOutcome, DownloadRequest, Stage, VideoDescriptor},
    resolver::Resolver,
    thumbnail,
};

const PLACEHOLDER_QUALITY: &str = "Loading...";
const NO_QUALITY: &str = "N/A";

/// Messages from background tasks to the UI thread
pub enum ShellEvent {
    Resolved {
        seq: u64,
        result: Result<VideoDescriptor, ResolveError>,
    },
    Thumbnail {
        seq: u64,
        image: ColorImage,
    },
    Download(DownloadEvent),
    DownloadFinished(Result<DownloadOutcome, DownloadError>),
}

/// Colour class of a label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Neutral,
    Info,
    Success,
    Error,
}

impl Tone {
    fn color(self) -> Color32 {
        match self {
            Tone::Neutral => Color32::GRAY,
            Tone::Info => Color32::LIGHT_GRAY,
            Tone::Success => Color32::GREEN,
            Tone::Error => Color32::RED,
        }
    }
}

/// Debounces URL edits and numbers every lookup so late answers can be dropped.
#[derive(Debug)]
pub struct ResolveGate {
    debounce: Duration,
    pending: Option<(String, Instant)>,
    seq: u64,
}

impl ResolveGate {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            pending: None,
            seq: 0,
        }
    }

    /// Records an edit. Any lookup already in flight becomes stale.
    pub fn input_changed(&mut self, text: &str, now: Instant) {
        self.seq += 1;
        self.pending = (!text.is_empty()).then(|| (text.to_string(), now));
    }

    /// The lookup to start, once the input has been quiet for the debounce interval.
    pub fn due(&mut self, now: Instant) -> Option<(u64, String)> {
        let quiet = self
            .pending
            .as_ref()
            .is_some_and(|(_, at)| now.duration_since(*at) >= self.debounce);
        if !quiet {
            return None;
        }
        self.pending.take().map(|(url, _)| (self.seq, url))
    }

    pub fn is_current(&self, seq: u64) -> bool {
        seq == self.seq
    }
}

/// Everything the form shows, independent of egui.
#[derive(Debug)]
pub struct FormState {
    pub url: String,
    pub title: String,
    pub title_tone: Tone,
    pub resolutions: Vec<String>,
    pub selected_resolution: String,
    pub quality_enabled: bool,
    pub audio_only: bool,
    pub audio_toggle_enabled: bool,
    pub download_path: String,
    /// 0.0 - 1.0
    pub progress: f32,
    pub status: String,
    pub status_tone: Tone,
    pub downloading: bool,
    pub current: Option<Arc<VideoDescriptor>>,
    /// The preview belongs to the video currently shown
    pub thumbnail_visible: bool,
    gate: ResolveGate,
}

impl FormState {
    pub fn new(download_path: String, debounce: Duration) -> Self {
        let mut form = Self {
            url: String::new(),
            title: String::new(),
            title_tone: Tone::Neutral,
            resolutions: Vec::new(),
            selected_resolution: String::new(),
            quality_enabled: false,
            audio_only: false,
            audio_toggle_enabled: false,
            download_path,
            progress: 0.0,
            status: String::new(),
            status_tone: Tone::Neutral,
            downloading: false,
            current: None,
            thumbnail_visible: false,
            gate: ResolveGate::new(debounce),
        };
        form.reset();
        form
    }

    fn reset(&mut self) {
        self.current = None;
        self.thumbnail_visible = false;
        self.title.clear();
        self.title_tone = Tone::Neutral;
        self.set_qualities(vec![PLACEHOLDER_QUALITY.to_string()], false);
        self.audio_toggle_enabled = false;
        self.status.clear();
        self.status_tone = Tone::Neutral;
    }

    fn set_qualities(&mut self, labels: Vec<String>, enabled: bool) {
        self.selected_resolution = labels.last().cloned().unwrap_or_default();
        self.resolutions = labels;
        self.quality_enabled = enabled;
    }

    fn set_status(&mut self, text: impl Into<String>, tone: Tone) {
        self.status = text.into();
        self.status_tone = tone;
    }

    /// The URL field changed. An empty field returns to the neutral state
    /// without any lookup.
    pub fn url_edited(&mut self, now: Instant) {
        let text = self.url.trim().to_string();
        self.gate.input_changed(&text, now);
        if text.is_empty() {
            self.reset();
        } else {
            self.current = None;
            self.thumbnail_visible = false;
            self.set_status("Fetching video information...", Tone::Info);
        }
    }

    pub fn poll_resolve(&mut self, now: Instant) -> Option<(u64, String)> {
        self.gate.due(now)
    }

    pub fn is_current(&self, seq: u64) -> bool {
        self.gate.is_current(seq)
    }

    /// Accepts a preview for lookup `seq` unless a newer edit superseded it.
    pub fn accept_thumbnail(&mut self, seq: u64) -> bool {
        let accepted = self.is_current(seq) && self.current.is_some();
        if accepted {
            self.thumbnail_visible = true;
        }
        accepted
    }

    /// Applies a lookup result; returns false when it was superseded by a newer edit.
    pub fn apply_resolved(&mut self, seq: u64, result: Result<VideoDescriptor, ResolveError>) -> bool {
        if !self.gate.is_current(seq) {
            debug!(seq, "discarding stale resolution");
            return false;
        }
        self.thumbnail_visible = false;

        match result {
            Ok(video) => {
                self.title = video.title.clone();
                self.title_tone = Tone::Success;
                let labels = video.resolutions();
                if labels.is_empty() {
                    self.set_qualities(vec![NO_QUALITY.to_string()], false);
                } else {
                    self.set_qualities(labels, true);
                }
                self.audio_toggle_enabled = true;
                self.set_status("", Tone::Neutral);
                self.current = Some(Arc::new(video));
            }
            Err(e) => {
                warn!(error = %e, "resolution failed");
                self.current = None;
                self.title = e.title_text().to_string();
                self.title_tone = Tone::Error;
                self.set_qualities(vec![NO_QUALITY.to_string()], false);
                self.audio_toggle_enabled = false;
                self.set_status(e.status_text(), Tone::Error);
            }
        }
        true
    }

    pub fn can_download(&self) -> bool {
        self.current.is_some() && !self.downloading
    }

    pub fn url_editable(&self) -> bool {
        !self.downloading
    }

    /// Locks the form and snapshots what the worker needs.
    pub fn begin_download(&mut self) -> (Option<Arc<VideoDescriptor>>, DownloadRequest) {
        self.downloading = true;
        self.progress = 0.0;
        self.set_status("Starting download...", Tone::Info);
        let request = DownloadRequest {
            resolution: self.selected_resolution.clone(),
            audio_only: self.audio_only,
            destination: PathBuf::from(self.download_path.trim()),
        };
        (self.current.clone(), request)
    }

    pub fn apply_download_event(&mut self, event: DownloadEvent) {
        match event {
            DownloadEvent::Stage(stage) => {
                if matches!(stage, Stage::FetchingVideo | Stage::FetchingAudio) {
                    self.progress = 0.0;
                }
                self.set_status(stage.message(), Tone::Info);
            }
            DownloadEvent::Progress(pct) => {
                self.progress = (pct / 100.0).clamp(0.0, 1.0);
                self.set_status(format!("Downloading: {}%", pct as u32), Tone::Info);
            }
        }
    }

    /// Unlocks the form, whatever the outcome.
    pub fn finish_download(&mut self, result: Result<DownloadOutcome, DownloadError>) {
        self.downloading = false;
        match result {
            Ok(outcome) => {
                self.progress = 1.0;
                self.set_status(outcome.message(), Tone::Success);
            }
            Err(e) => self.set_status(e.status_text(), Tone::Error),
        }
    }
}

/// eframe application wiring the form to the resolver and the coordinator
pub struct DownloaderApp {
    form: FormState,
    resolver: Arc<dyn Resolver>,
    coordinator: Arc<Coordinator>,
    runtime: Arc<Runtime>,
    events_tx: UnboundedSender<ShellEvent>,
    events_rx: UnboundedReceiver<ShellEvent>,
    thumbnail: Option<egui::TextureHandle>,
    cancel: Option<CancelFlag>,
}

impl DownloaderApp {
    pub fn new(
        download_dir: PathBuf,
        debounce: Duration,
        resolver: Arc<dyn Resolver>,
        coordinator: Arc<Coordinator>,
        runtime: Arc<Runtime>,
    ) -> Self {
        let (events_tx, events_rx) = unbounded_channel();
        Self {
            form: FormState::new(download_dir.display().to_string(), debounce),
            resolver,
            coordinator,
            runtime,
            events_tx,
            events_rx,
            thumbnail: None,
            cancel: None,
        }
    }

    fn drain_events(&mut self, ctx: &egui::Context) {
        while let Ok(event) = self.events_rx.try_recv() {
            match event {
                ShellEvent::Resolved { seq, result } => {
                    let thumb = result.as_ref().ok().and_then(|v| v.thumbnail.clone());
                    if self.form.apply_resolved(seq, result) {
                        self.thumbnail = None;
                        if let Some(url) = thumb {
                            self.spawn_thumbnail(ctx, seq, url);
                        }
                    }
                }
                ShellEvent::Thumbnail { seq, image } => {
                    if self.form.accept_thumbnail(seq) {
                        self.thumbnail = Some(ctx.load_texture("thumbnail", image, TextureOptions::default()));
                    }
                }
                ShellEvent::Download(event) => self.form.apply_download_event(event),
                ShellEvent::DownloadFinished(result) => {
                    self.cancel = None;
                    self.form.finish_download(result);
                }
            }
        }
    }

    fn spawn_resolve(&self, ctx: &egui::Context, seq: u64, url: String) {
        let resolver = Arc::clone(&self.resolver);
        let tx = self.events_tx.clone();
        let ctx = ctx.clone();
        self.runtime.spawn(async move {
            let result = resolver.resolve(&url).await;
            let _ = tx.send(ShellEvent::Resolved { seq, result });
            ctx.request_repaint();
        });
    }

    fn spawn_thumbnail(&self, ctx: &egui::Context, seq: u64, url: String) {
        let tx = self.events_tx.clone();
        let ctx = ctx.clone();
        self.runtime.spawn_blocking(move || {
            if let Some(image) = thumbnail::fetch_thumbnail(&url) {
                let _ = tx.send(ShellEvent::Thumbnail { seq, image });
                ctx.request_repaint();
            }
        });
    }

    fn start_download(&mut self, ctx: &egui::Context) {
        let (video, request) = self.form.begin_download();
        let cancel = CancelFlag::default();
        self.cancel = Some(cancel.clone());

        let coordinator = Arc::clone(&self.coordinator);
        let tx = self.events_tx.clone();
        let ctx = ctx.clone();
        self.runtime.spawn(async move {
            let progress_tx = tx.clone();
            let progress_ctx = ctx.clone();
            let worker = tokio::task::spawn_blocking(move || {
                coordinator.download(video.as_deref(), &request, &cancel, |event| {
                    let _ = progress_tx.send(ShellEvent::Download(event));
                    progress_ctx.request_repaint();
                })
            });

            // a panicking worker must still hand the controls back
            let result = match worker.await {
                Ok(result) => result,
                Err(e) => Err(DownloadError::Worker(e.to_string())),
            };
            if let Err(e) = &result {
                warn!(error = %e, "download did not complete");
            }
            let _ = tx.send(ShellEvent::DownloadFinished(result));
            ctx.request_repaint();
        });
    }
}

impl App for DownloaderApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut Frame) {
        self.drain_events(ctx);

        if let Some((seq, url)) = self.form.poll_resolve(Instant::now()) {
            self.spawn_resolve(ctx, seq, url);
        }

        let mut start = false;
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.vertical_centered(|ui| ui.heading("Video Downloader"));
            ui.add_space(12.0);

            ui.label("Insert a video link");
            let url_field = ui.add_enabled(
                self.form.url_editable(),
                egui::TextEdit::singleline(&mut self.form.url)
                    .hint_text("e.g., https://www.youtube.com/watch?v=dQw4w9WgXcQ")
                    .desired_width(f32::INFINITY),
            );
            if url_field.changed() {
                self.form.url_edited(Instant::now());
                self.thumbnail = None;
            }

            ui.horizontal(|ui| {
                if let Some(tex) = self.thumbnail.as_ref().filter(|_| self.form.thumbnail_visible) {
                    ui.add(egui::Image::new(tex).max_height(90.0));
                }
                ui.colored_label(self.form.title_tone.color(), &self.form.title);
            });
            ui.add_space(8.0);

            ui.horizontal(|ui| {
                ui.label("Select Quality:");
                let enabled = self.form.quality_enabled && !self.form.downloading;
                ui.add_enabled_ui(enabled, |ui| {
                    egui::ComboBox::from_id_source("quality")
                        .selected_text(self.form.selected_resolution.clone())
                        .show_ui(ui, |ui| {
                            for label in &self.form.resolutions {
                                ui.selectable_value(&mut self.form.selected_resolution, label.clone(), label);
                            }
                        });
                });
            });
            ui.add_enabled(
                self.form.audio_toggle_enabled && !self.form.downloading,
                egui::Checkbox::new(&mut self.form.audio_only, "Download Audio Only"),
            );
            ui.add_space(8.0);

            ui.horizontal(|ui| {
                ui.label("Download folder:");
                ui.add_enabled(
                    !self.form.downloading,
                    egui::TextEdit::singleline(&mut self.form.download_path).hint_text("Select download path..."),
                );
                if ui.add_enabled(!self.form.downloading, egui::Button::new("Browse")).clicked() {
                    let start_dir = PathBuf::from(self.form.download_path.trim());
                    if let Some(folder) = FileDialog::new().set_directory(&start_dir).pick_folder() {
                        self.form.download_path = folder.display().to_string();
                    }
                }
            });
            ui.add_space(12.0);

            ui.colored_label(self.form.status_tone.color(), &self.form.status);
            ui.add(egui::ProgressBar::new(self.form.progress).show_percentage());
            ui.add_space(12.0);

            ui.horizontal(|ui| {
                if ui.add_enabled(self.form.can_download(), egui::Button::new("Download")).clicked() {
                    start = true;
                }
                if self.form.downloading {
                    let cancellable = self.cancel.as_ref().is_some_and(|c| !c.is_cancelled());
                    if ui.add_enabled(cancellable, egui::Button::new("Cancel")).clicked() {
                        if let Some(cancel) = &self.cancel {
                            cancel.cancel();
                            self.form.status = "Cancelling...".to_string();
                        }
                    }
                }
            });
        });

        if start {
            self.start_download(ctx);
        }

        // keeps the debounce timer and progress bar ticking
        ctx.request_repaint_after(Duration::from_millis(100));
    }
}
