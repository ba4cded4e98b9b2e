//! The assembled visualizer: element, tap, render loop, recorder and
//! transport driven from one event loop.
//!
//! Every mutation happens inside [`Visualizer::pump`] or one of the control
//! hooks, so frame ticks and encoder callbacks never interleave mid-step.
//! Their relative order across pumps is not fixed.

use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use crate::analysis::{AnalyserSettings, AnalysisTap};
use crate::capture::{
    recording_support, Artifact, CaptureController, CaptureSettings, EncoderFactory,
    HostCapabilities, RecorderStatus, Support,
};
use crate::clock::Clock;
use crate::config::WavereelConfig;
use crate::error::Result;
use crate::media::{AudioElement, Track};
use crate::render::{FrameScheduler, RenderLoop, Surface};
use crate::transport::{Transport, TransportSignal};

pub struct Visualizer {
    clock: Rc<dyn Clock>,
    element: AudioElement,
    tap: AnalysisTap,
    surface: Surface,
    scheduler: FrameScheduler,
    render_loop: RenderLoop,
    controller: CaptureController,
    transport: Transport,
    caps: HostCapabilities,
    /// Recording support probed when the visualizer was built
    support: Support,
    factory: Box<dyn EncoderFactory>,
    status: String,
    /// Controller revision already reflected in `status`
    seen_revision: u64,
    torn_down: bool,
}

impl Visualizer {
    /// Builds the visualizer for the configured track. Nothing plays until
    /// a track is loaded and `toggle_play` is called.
    ///
    /// # Errors
    /// - If the drawing surface cannot be allocated
    pub fn new(
        config: &WavereelConfig,
        clock: Rc<dyn Clock>,
        caps: HostCapabilities,
        factory: Box<dyn EncoderFactory>,
    ) -> anyhow::Result<Self> {
        let surface = Surface::new(
            config.render.width as f32,
            config.render.height as f32,
            config.render.device_pixel_ratio,
        )?;
        let controller = CaptureController::new(CaptureSettings::from(&config.recording));
        let transport = Transport::new();
        let status = transport.message().to_string();
        let seen_revision = controller.revision();
        let support = recording_support(&caps);
        if let Some(reason) = support.reason() {
            tracing::warn!("Recording disabled: {}", reason);
        }
        tracing::info!(
            "Visualizer ready: {}x{} @{}x, {} Hz refresh",
            config.render.width,
            config.render.height,
            config.render.device_pixel_ratio,
            config.render.refresh_rate
        );
        Ok(Self {
            element: AudioElement::new(config.audio.stream_url.clone(), Rc::clone(&clock)),
            clock,
            tap: AnalysisTap::new(
                AnalyserSettings::from(&config.audio),
                config.audio.output,
                caps.audio_context,
            ),
            surface,
            scheduler: FrameScheduler::new(config.render.refresh_rate),
            render_loop: RenderLoop::new(),
            controller,
            transport,
            caps,
            support,
            factory,
            status,
            seen_revision,
            torn_down: false,
        })
    }

    pub fn load_track(&mut self, track: Track) {
        self.element.load(track);
    }

    /// Runs everything that is due: element events, frame ticks, encoder work.
    pub fn pump(&mut self) {
        if self.torn_down {
            return;
        }
        let now = self.clock.now();

        for event in self.element.poll_events() {
            let signal = self
                .transport
                .handle_event(&event, &mut self.render_loop, &mut self.scheduler);
            if signal == TransportSignal::TrackEnded && self.controller.is_recording() {
                tracing::info!("Track ended while recording, finishing export");
                self.controller.stop_recording();
            }
        }

        let due = self.scheduler.poll(now);
        if !due.is_empty() {
            let handle = self.tap.handle();
            for id in due {
                self.render_loop.on_frame(
                    id,
                    &mut self.scheduler,
                    &mut self.surface,
                    handle.as_ref(),
                    now,
                );
            }
        }

        self.controller.pump(now);
        self.sync_status();
    }

    /// Earliest time something is due, if anything is scheduled.
    pub fn next_wakeup(&self) -> Option<Duration> {
        [self.scheduler.next_deadline(), self.controller.next_deadline()]
            .into_iter()
            .flatten()
            .min()
    }

    /// How long the event loop may sleep before the next pump.
    pub fn time_until_wakeup(&self) -> Option<Duration> {
        self.next_wakeup()
            .map(|deadline| deadline.saturating_sub(self.clock.now()))
    }

    /// Plays when paused, pauses when playing.
    ///
    /// # Errors
    /// - `PlaybackDenied` if playback cannot start
    pub fn toggle_play(&mut self) -> Result<()> {
        if self.transport.is_playing() {
            self.transport
                .pause(&mut self.element, &mut self.render_loop, &mut self.scheduler);
            self.status = self.transport.message().to_string();
            return Ok(());
        }
        self.play()
    }

    fn play(&mut self) -> Result<()> {
        let now = self.clock.now();
        let result = self.transport.play(
            &mut self.tap,
            &mut self.element,
            &mut self.render_loop,
            &mut self.scheduler,
            now,
        );
        self.status = self.transport.message().to_string();
        if result.is_err() {
            self.controller.fail_playback(self.transport.message());
            self.sync_status();
        }
        result
    }

    /// Starts a recording of the whole track from the beginning.
    ///
    /// # Errors
    /// - The capability or encoder failure that moved the recorder to `error`
    pub fn start_recording(&mut self) -> Result<()> {
        let now = self.clock.now();
        let result = self.controller.start_recording(
            &mut self.tap,
            &mut self.element,
            &self.surface,
            &self.caps,
            self.factory.as_ref(),
            now,
        );
        if result.is_ok() && self.controller.is_recording() && !self.transport.is_playing() {
            self.play()?;
        }
        self.sync_status();
        result
    }

    pub fn stop_recording(&mut self) -> bool {
        let stopped = self.controller.stop_recording();
        self.sync_status();
        stopped
    }

    /// Writes the finished video to `destination` (a file or a directory).
    ///
    /// # Errors
    /// - If no video is ready or it cannot be written
    pub fn save_download(&mut self, destination: &Path) -> anyhow::Result<PathBuf> {
        let path = self.controller.save_download(destination)?;
        self.controller.report(format!("Saved {}", path.display()));
        self.sync_status();
        Ok(path)
    }

    fn sync_status(&mut self) {
        let revision = self.controller.revision();
        if revision != self.seen_revision {
            self.seen_revision = revision;
            self.status = self.controller.status_message().to_string();
        }
    }

    /// Stops the render loop, releases the recorder and closes the audio
    /// context. Only the first call has an effect.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        self.render_loop.stop(&mut self.scheduler);
        self.controller.dispose();
        self.element.pause();
        self.tap.dispose();
        tracing::info!("Visualizer torn down");
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    /// Why recording is unavailable on this host, if it is.
    pub fn disabled_reason(&self) -> Option<&str> {
        self.support.reason()
    }

    pub fn can_start_recording(&self) -> bool {
        self.disabled_reason().is_none()
            && !matches!(
                self.controller.status(),
                RecorderStatus::Arming | RecorderStatus::Recording | RecorderStatus::Rendering
            )
    }

    pub fn is_playing(&self) -> bool {
        self.transport.is_playing()
    }

    pub fn recorder_status(&self) -> RecorderStatus {
        self.controller.status()
    }

    pub fn readout(&self) -> String {
        self.transport.readout()
    }

    /// Spectrum painted by the most recent frame.
    pub fn spectrum(&self) -> &[u8] {
        &self.render_loop.frame().frequency
    }

    #[cfg(test)]
    pub fn download_url(&self) -> Option<&crate::capture::artifact::ArtifactUrl> {
        self.controller.download_url()
    }

    pub fn download(&self) -> Option<Arc<Artifact>> {
        self.controller.download()
    }

    #[cfg(test)]
    pub fn element(&self) -> &AudioElement {
        &self.element
    }

    #[cfg(test)]
    pub fn element_mut(&mut self) -> &mut AudioElement {
        &mut self.element
    }

    #[cfg(test)]
    pub fn tap(&self) -> &AnalysisTap {
        &self.tap
    }

    #[cfg(test)]
    pub fn render_loop(&self) -> &RenderLoop {
        &self.render_loop
    }

    #[cfg(test)]
    pub fn controller(&self) -> &CaptureController {
        &self.controller
    }

    #[cfg(test)]
    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }
}

impl Drop for Visualizer {
    fn drop(&mut self) {
        self.teardown();
    }
}
