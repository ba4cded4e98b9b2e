//! Recording state machine.
//!
//! ```text
//! idle -> arming -> recording -> rendering -> idle
//!            \          \            \
//!             +----------+------------+--> error -> (start) arming
//! ```
//!
//! The encoder's `Stop` event, not the stop request, finalizes a recording.
//! Data delivered between the request and that event still belongs to the
//! session.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::artifact::{Artifact, ArtifactStore, ArtifactUrl};
use super::encoder::{EncoderEvent, EncoderFactory, EncoderState, MimeType, StreamEncoder};
use super::probe::HostCapabilities;
use super::session::RecordingSession;
use super::stream::{capture_element, capture_surface, MediaStream};
use crate::analysis::AnalysisTap;
use crate::config::RecordingConfig;
use crate::error::{Result, VisualizerError};
use crate::media::AudioElement;
use crate::render::Surface;

pub const READY_MESSAGE: &str = "Ready to animate the entire podcast episode.";
pub const RECORDING_MESSAGE: &str = "Recording the animated performance in real time…";
pub const FINISHING_MESSAGE: &str = "Finishing up your video export…";
pub const DONE_MESSAGE: &str = "Video ready. Download and share your animated episode.";
pub const ENCODER_MISSING_MESSAGE: &str = "The video encoder is not available in this environment.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderStatus {
    Idle,
    Arming,
    Recording,
    /// Stop requested, waiting for the encoder to finish
    Rendering,
    Error,
}

impl fmt::Display for RecorderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Arming => "arming",
            Self::Recording => "recording",
            Self::Rendering => "rendering",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub frame_rate: u32,
    pub timeslice: Duration,
    pub mime_type: String,
    pub file_name: String,
}

impl From<&RecordingConfig> for CaptureSettings {
    fn from(config: &RecordingConfig) -> Self {
        Self {
            frame_rate: config.frame_rate,
            timeslice: Duration::from_millis(config.timeslice_ms),
            mime_type: config.mime_type.clone(),
            file_name: config.download_name.clone(),
        }
    }
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self::from(&RecordingConfig::default())
    }
}

pub struct CaptureController {
    settings: CaptureSettings,
    status: RecorderStatus,
    message: String,
    /// Bumped on every status line change
    revision: u64,
    encoder: Option<Box<dyn StreamEncoder>>,
    session: Option<RecordingSession>,
    artifacts: ArtifactStore,
    download: Option<ArtifactUrl>,
}

impl CaptureController {
    pub fn new(settings: CaptureSettings) -> Self {
        Self {
            settings,
            status: RecorderStatus::Idle,
            message: READY_MESSAGE.to_string(),
            revision: 0,
            encoder: None,
            session: None,
            artifacts: ArtifactStore::new(),
            download: None,
        }
    }

    /// Arms and starts a recording of the surface and the element.
    ///
    /// Capabilities are checked in order (video capture, audio capture, encoder);
    /// the first failure decides the error. On success playback restarts from
    /// the beginning of the track. Requests while a recording is in flight are
    /// ignored.
    ///
    /// # Errors
    /// Every failure also moves the controller to `error` with its message:
    /// - `UnsupportedEnvironment` if the tap cannot attach or no encoder exists
    /// - `CaptureUnavailable` if a stream cannot be captured
    /// - `EncoderStartFailure` if the encoder or playback cannot start
    pub fn start_recording(
        &mut self,
        tap: &mut AnalysisTap,
        element: &mut AudioElement,
        surface: &Surface,
        caps: &HostCapabilities,
        factory: &dyn EncoderFactory,
        now: Duration,
    ) -> Result<()> {
        if matches!(
            self.status,
            RecorderStatus::Arming | RecorderStatus::Recording | RecorderStatus::Rendering
        ) {
            tracing::debug!("Start ignored while {}", self.status);
            return Ok(());
        }
        self.status = RecorderStatus::Arming;
        tracing::info!("Arming recording");

        if let Err(e) = tap.attach(element) {
            return Err(self.fail(e));
        }

        let video = match capture_surface(surface, self.settings.frame_rate, caps.surface_capture) {
            Ok(stream) => stream,
            Err(e) => return Err(self.fail(e)),
        };
        let audio = match capture_element(element, caps.element_capture) {
            Ok(stream) => stream,
            Err(e) => return Err(self.fail(e)),
        };
        if !factory.is_available() {
            return Err(self.fail(VisualizerError::UnsupportedEnvironment(
                ENCODER_MISSING_MESSAGE.to_string(),
            )));
        }
        let composed = MediaStream::compose(video, audio);

        self.teardown_recorder();
        let mut encoder = match MimeType::parse(&self.settings.mime_type)
            .and_then(|mime| factory.create(composed, &mime))
        {
            Ok(encoder) => encoder,
            Err(e) => return Err(self.fail(as_start_failure(e))),
        };
        self.session = Some(RecordingSession::new());
        if let Err(e) = encoder.start(self.settings.timeslice, now) {
            self.session = None;
            return Err(self.fail(as_start_failure(e)));
        }
        self.encoder = Some(encoder);

        self.status = RecorderStatus::Recording;
        self.set_message(RECORDING_MESSAGE);
        self.withdraw_download();
        tracing::info!("Recording started ({})", self.settings.mime_type);

        element.set_current_time(0.0);
        if let Err(e) = element.play() {
            self.teardown_recorder();
            return Err(self.fail(as_start_failure(e)));
        }
        Ok(())
    }

    /// Requests the encoder to finish. A no-op unless an encoder is recording.
    pub fn stop_recording(&mut self) -> bool {
        match self.encoder.as_mut() {
            Some(encoder) if encoder.state() != EncoderState::Inactive => {
                encoder.stop();
                self.status = RecorderStatus::Rendering;
                self.set_message(FINISHING_MESSAGE);
                tracing::info!("Recording stop requested");
                true
            }
            _ => false,
        }
    }

    /// Drives the encoder and handles the events it raised.
    pub fn pump(&mut self, now: Duration) {
        let Some(encoder) = self.encoder.as_mut() else {
            return;
        };
        encoder.pump(now);
        let mut events = Vec::new();
        while let Some(event) = encoder.poll_event() {
            events.push(event);
        }

        for event in events {
            match event {
                EncoderEvent::DataAvailable(chunk) => {
                    if let Some(session) = self.session.as_mut() {
                        session.append(chunk);
                    }
                }
                EncoderEvent::Stop => {
                    self.handle_stop();
                    break;
                }
                EncoderEvent::Error(message) => {
                    self.teardown_recorder();
                    self.fail(VisualizerError::Encoder(message));
                    break;
                }
            }
        }
    }

    fn handle_stop(&mut self) {
        let mime = self
            .encoder
            .take()
            .map(|encoder| encoder.mime_type().essence().to_string())
            .unwrap_or_else(|| "video/webm".to_string());
        let Some(mut session) = self.session.take() else {
            return;
        };
        session.seal();
        if session.is_empty() {
            self.fail(VisualizerError::EmptyRecording);
            return;
        }

        self.status = RecorderStatus::Rendering;
        let chunks = session.chunk_count();
        let bytes = session.total_bytes();
        let artifact = Artifact::new(session.assemble(), mime, self.settings.file_name.clone());
        if let Some(previous) = self.download.take() {
            self.artifacts.revoke(&previous);
        }
        let url = self.artifacts.create(artifact);
        tracing::info!("Recording finalized from {} chunks ({} bytes) as {}", chunks, bytes, url);
        self.download = Some(url);
        self.status = RecorderStatus::Idle;
        self.set_message(DONE_MESSAGE);
    }

    /// Stops and discards any encoder and pending chunks. Safe in every state.
    pub fn teardown(&mut self) {
        self.teardown_recorder();
        if matches!(
            self.status,
            RecorderStatus::Arming | RecorderStatus::Recording | RecorderStatus::Rendering
        ) {
            self.status = RecorderStatus::Idle;
        }
    }

    /// Teardown plus release of the offered download.
    pub fn dispose(&mut self) {
        self.teardown();
        self.withdraw_download();
    }

    fn teardown_recorder(&mut self) {
        if let Some(mut encoder) = self.encoder.take() {
            if encoder.state() != EncoderState::Inactive {
                encoder.stop();
            }
            tracing::debug!("Recorder torn down");
        }
        self.session = None;
    }

    fn withdraw_download(&mut self) {
        if let Some(url) = self.download.take() {
            self.artifacts.revoke(&url);
        }
    }

    /// Moves to `error` after playback was rejected, discarding any
    /// recording in flight.
    pub fn fail_playback(&mut self, message: &str) {
        self.teardown_recorder();
        tracing::warn!("Playback failed while {}", self.status);
        self.status = RecorderStatus::Error;
        self.set_message(message);
    }

    fn fail(&mut self, error: VisualizerError) -> VisualizerError {
        tracing::warn!("Recording error: {} ({})", error, error.detail());
        self.status = RecorderStatus::Error;
        self.set_message(error.to_string());
        error
    }

    fn set_message(&mut self, message: impl Into<String>) {
        self.message = message.into();
        self.revision += 1;
    }

    /// Replaces the status line without changing state.
    pub fn report(&mut self, message: impl Into<String>) {
        self.set_message(message);
    }

    /// Bumped on every status line change.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn status(&self) -> RecorderStatus {
        self.status
    }

    pub fn status_message(&self) -> &str {
        &self.message
    }

    pub fn is_recording(&self) -> bool {
        self.status == RecorderStatus::Recording
    }

    #[cfg(test)]
    pub fn download_url(&self) -> Option<&ArtifactUrl> {
        self.download.as_ref()
    }

    pub fn download(&self) -> Option<Arc<Artifact>> {
        self.download.as_ref().and_then(|url| self.artifacts.resolve(url))
    }

    #[cfg(test)]
    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    #[cfg(test)]
    /// Chunks gathered by the open session, if any.
    pub fn pending_chunks(&self) -> Option<usize> {
        self.session.as_ref().map(RecordingSession::chunk_count)
    }

    #[cfg(test)]
    pub fn encoder_active(&self) -> bool {
        self.encoder.is_some()
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        self.encoder.as_ref().and_then(|encoder| encoder.next_deadline())
    }

    /// Writes the current download to `destination`.
    ///
    /// # Errors
    /// - If no download is offered or it cannot be written
    pub fn save_download(&self, destination: &Path) -> anyhow::Result<PathBuf> {
        let url = self
            .download
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("No finished recording to save"))?;
        self.artifacts.save(url, destination)
    }
}

fn as_start_failure(error: VisualizerError) -> VisualizerError {
    match error {
        VisualizerError::EncoderStartFailure(_) => error,
        other => VisualizerError::EncoderStartFailure(other.detail().to_string()),
    }
}
