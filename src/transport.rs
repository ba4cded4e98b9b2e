//! Play/pause transport and the position readout.

use std::time::Duration;

use crate::analysis::AnalysisTap;
use crate::capture::controller::READY_MESSAGE;
use crate::error::Result;
use crate::media::{AudioElement, MediaEvent};
use crate::render::{FrameScheduler, RenderLoop};

pub const PLAYING_MESSAGE: &str = "Visualizing live audio in real time.";
pub const PAUSED_MESSAGE: &str = "Paused. Resume playback to continue the animation.";
pub const PLAYBACK_FAILED_MESSAGE: &str = "Playback failed. Please tap the play button to allow audio.";

/// What a media event asks of the rest of the visualizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportSignal {
    None,
    /// The track ended; a recording in progress must finish
    TrackEnded,
}

pub struct Transport {
    playing: bool,
    duration: Option<f64>,
    position: f64,
    message: String,
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport {
    pub fn new() -> Self {
        Self {
            playing: false,
            duration: None,
            position: 0.0,
            message: READY_MESSAGE.to_string(),
        }
    }

    /// Starts playback and the render loop.
    ///
    /// The tap is attached (which resumes its context) before the element
    /// plays. A tap that cannot attach leaves the scene animating without
    /// audio reactivity.
    ///
    /// # Errors
    /// - `PlaybackDenied` if the element refuses to play
    pub fn play(
        &mut self,
        tap: &mut AnalysisTap,
        element: &mut AudioElement,
        render_loop: &mut RenderLoop,
        scheduler: &mut FrameScheduler,
        now: Duration,
    ) -> Result<()> {
        if let Err(e) = tap.attach(element) {
            tracing::warn!("Audio analysis unavailable, visuals will not react: {}", e.detail());
        }
        if let Err(e) = element.play() {
            tracing::warn!("Playback rejected: {}", e.detail());
            self.playing = false;
            self.message = PLAYBACK_FAILED_MESSAGE.to_string();
            return Err(e);
        }
        self.playing = true;
        self.message = PLAYING_MESSAGE.to_string();
        render_loop.start(scheduler, now);
        tracing::info!("Playback started at {}", format_seconds(element.current_time()));
        Ok(())
    }

    pub fn pause(
        &mut self,
        element: &mut AudioElement,
        render_loop: &mut RenderLoop,
        scheduler: &mut FrameScheduler,
    ) {
        element.pause();
        render_loop.stop(scheduler);
        self.playing = false;
        self.position = element.current_time();
        self.message = PAUSED_MESSAGE.to_string();
        tracing::info!("Playback paused at {}", format_seconds(self.position));
    }

    /// Applies an element notification.
    pub fn handle_event(
        &mut self,
        event: &MediaEvent,
        render_loop: &mut RenderLoop,
        scheduler: &mut FrameScheduler,
    ) -> TransportSignal {
        match event {
            MediaEvent::LoadedMetadata { duration } => {
                self.duration = Some(*duration);
                TransportSignal::None
            }
            MediaEvent::TimeUpdate { position } => {
                self.position = *position;
                TransportSignal::None
            }
            MediaEvent::Ended => {
                render_loop.stop(scheduler);
                self.playing = false;
                if let Some(duration) = self.duration {
                    self.position = duration;
                }
                tracing::info!("Track ended");
                TransportSignal::TrackEnded
            }
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    #[cfg(test)]
    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    #[cfg(test)]
    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// `MM:SS / MM:SS`, with the duration shown as zero until known.
    pub fn readout(&self) -> String {
        format!(
            "{} / {}",
            format_seconds(self.position),
            format_seconds(self.duration.unwrap_or(0.0))
        )
    }
}

/// Formats seconds as zero-padded `MM:SS`, rounding down.
pub fn format_seconds(secs: f64) -> String {
    if !secs.is_finite() || secs <= 0.0 {
        return "00:00".to_string();
    }
    let whole = secs.floor() as u64;
    format!("{:02}:{:02}", whole / 60, whole % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AnalyserSettings;
    use crate::clock::{Clock, ManualClock};
    use crate::config::OutputMode;
    use crate::media::Track;
    use std::rc::Rc;

    struct Rig {
        clock: ManualClock,
        tap: AnalysisTap,
        element: AudioElement,
        render_loop: RenderLoop,
        scheduler: FrameScheduler,
        transport: Transport,
    }

    fn rig(loaded: bool) -> Rig {
        let clock = ManualClock::new();
        let mut element = AudioElement::new("episode.mp3", Rc::new(clock.clone()));
        if loaded {
            element.load(Track::from_samples("episode.mp3", 8000, vec![0.0; 8000 * 2 * 3]));
        }
        Rig {
            clock,
            tap: AnalysisTap::new(AnalyserSettings::default(), OutputMode::Headless, true),
            element,
            render_loop: RenderLoop::new(),
            scheduler: FrameScheduler::new(60),
            transport: Transport::new(),
        }
    }

    impl Rig {
        fn play(&mut self) -> Result<()> {
            let now = self.clock.now();
            self.transport.play(
                &mut self.tap,
                &mut self.element,
                &mut self.render_loop,
                &mut self.scheduler,
                now,
            )
        }
    }

    #[test]
    fn test_format_seconds() {
        assert_eq!(format_seconds(0.0), "00:00");
        assert_eq!(format_seconds(59.99), "00:59");
        assert_eq!(format_seconds(61.0), "01:01");
        assert_eq!(format_seconds(3725.4), "62:05");
        assert_eq!(format_seconds(f64::NAN), "00:00");
        assert_eq!(format_seconds(-3.0), "00:00");
    }

    #[test]
    fn test_play_attaches_and_starts_loop() {
        let mut rig = rig(true);
        rig.play().unwrap();
        assert!(rig.transport.is_playing());
        assert!(rig.tap.is_attached());
        assert!(rig.render_loop.is_running());
        assert!(!rig.element.paused());
        assert_eq!(rig.transport.message(), PLAYING_MESSAGE);
    }

    #[test]
    fn test_play_without_media_fails() {
        let mut rig = rig(false);
        assert!(rig.play().is_err());
        assert!(!rig.transport.is_playing());
        assert!(!rig.render_loop.is_running());
        assert_eq!(rig.transport.message(), PLAYBACK_FAILED_MESSAGE);
    }

    #[test]
    fn test_pause_stops_loop() {
        let mut rig = rig(true);
        rig.play().unwrap();
        rig.clock.advance(Duration::from_millis(500));
        rig.transport
            .pause(&mut rig.element, &mut rig.render_loop, &mut rig.scheduler);
        assert!(!rig.render_loop.is_running());
        assert_eq!(rig.scheduler.pending(), 0);
        assert!(rig.element.paused());
        assert_eq!(rig.transport.message(), PAUSED_MESSAGE);
        assert!((rig.transport.position() - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_events_update_readout_and_end() {
        let mut rig = rig(true);
        for event in rig.element.poll_events() {
            rig.transport
                .handle_event(&event, &mut rig.render_loop, &mut rig.scheduler);
        }
        assert_eq!(rig.transport.readout(), "00:00 / 00:03");

        rig.play().unwrap();
        let mut ended = false;
        for _ in 0..40 {
            rig.clock.advance(Duration::from_millis(100));
            for event in rig.element.poll_events() {
                let signal = rig
                    .transport
                    .handle_event(&event, &mut rig.render_loop, &mut rig.scheduler);
                ended |= signal == TransportSignal::TrackEnded;
            }
        }
        assert!(ended);
        assert!(!rig.transport.is_playing());
        assert!(!rig.render_loop.is_running());
        assert_eq!(rig.transport.readout(), "00:03 / 00:03");
    }
}
