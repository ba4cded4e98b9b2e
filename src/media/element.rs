//! The playing media element.
//!
//! Owns the loaded track, the paused flag and the playback cursor. The cursor
//! advances with the injected clock while playing and is shared, read-only,
//! through a [`Playhead`] with the output device, the analyser and the audio
//! capture track.

use std::rc::Rc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::track::Track;
use crate::clock::Clock;
use crate::error::{Result, VisualizerError};

/// Minimum media time between two `TimeUpdate` events.
const TIME_UPDATE_INTERVAL: f64 = 0.25;

/// Notifications raised by the element, drained by [`AudioElement::poll_events`].
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    /// Track metadata is known
    LoadedMetadata { duration: f64 },
    /// Playback position moved
    TimeUpdate { position: f64 },
    /// Playback reached the end of the track
    Ended,
}

/// Thread-safe view of what the element is currently playing.
#[derive(Clone)]
pub struct Playhead {
    track: Arc<Track>,
    cursor: Arc<AtomicU64>,
    playing: Arc<AtomicBool>,
    seek: Arc<SeekMarker>,
}

/// Counts seeks and remembers where the latest one landed.
#[derive(Default)]
struct SeekMarker {
    count: AtomicU64,
    origin: AtomicU64,
}

impl SeekMarker {
    fn mark(&self, frame: u64) {
        self.origin.store(frame, Ordering::Release);
        self.count.fetch_add(1, Ordering::AcqRel);
    }
}

impl Playhead {
    pub fn track(&self) -> &Track {
        &self.track
    }

    /// Current position in frames.
    pub fn frame(&self) -> u64 {
        self.cursor.load(Ordering::Acquire)
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    /// Fills `out` with the mono signal ending at the current position.
    ///
    /// Samples before the start of the track are silence.
    pub fn recent_mono(&self, out: &mut [f32]) {
        let end = self.frame();
        let len = out.len() as u64;
        for (i, slot) in out.iter_mut().enumerate() {
            let offset = len - i as u64;
            *slot = if offset > end {
                0.0
            } else {
                self.track.mono(end - offset)
            };
        }
    }

    /// Number of seeks so far and the frame the latest one landed on.
    pub fn last_seek(&self) -> (u64, u64) {
        let count = self.seek.count.load(Ordering::Acquire);
        (count, self.seek.origin.load(Ordering::Acquire))
    }

    /// Whether both handles observe the same element.
    pub fn same_source(&self, other: &Playhead) -> bool {
        Arc::ptr_eq(&self.cursor, &other.cursor)
    }
}

/// Native stand-in for an HTML audio element.
pub struct AudioElement {
    src: String,
    clock: Rc<dyn Clock>,
    track: Option<Arc<Track>>,
    cursor: Arc<AtomicU64>,
    playing: Arc<AtomicBool>,
    seek: Arc<SeekMarker>,
    /// Clock reading at the last cursor advance while playing
    last_advance: Option<Duration>,
    last_time_update: f64,
    ended: bool,
    events: Vec<MediaEvent>,
}

impl AudioElement {
    /// Creates an element for `src` with nothing loaded yet.
    pub fn new(src: impl Into<String>, clock: Rc<dyn Clock>) -> Self {
        Self {
            src: src.into(),
            clock,
            track: None,
            cursor: Arc::new(AtomicU64::new(0)),
            playing: Arc::new(AtomicBool::new(false)),
            seek: Arc::new(SeekMarker::default()),
            last_advance: None,
            last_time_update: 0.0,
            ended: false,
            events: Vec::new(),
        }
    }

    /// Installs the decoded track and announces its metadata.
    pub fn load(&mut self, track: Track) {
        let duration = track.duration();
        tracing::debug!("Element loaded {} ({:.1}s)", track.url(), duration);
        self.track = Some(Arc::new(track));
        self.cursor.store(0, Ordering::Release);
        self.seek.mark(0);
        self.playing.store(false, Ordering::Release);
        self.last_advance = None;
        self.last_time_update = 0.0;
        self.ended = false;
        self.events.push(MediaEvent::LoadedMetadata { duration });
    }

    pub fn src(&self) -> &str {
        &self.src
    }

    /// Duration in seconds, once metadata is known.
    pub fn duration(&self) -> Option<f64> {
        self.track.as_ref().map(|t| t.duration())
    }

    /// Playback position in seconds.
    pub fn current_time(&self) -> f64 {
        match &self.track {
            Some(track) => self.cursor.load(Ordering::Acquire) as f64 / track.sample_rate() as f64,
            None => 0.0,
        }
    }

    /// Seeks to `secs`, clamped to the track.
    pub fn set_current_time(&mut self, secs: f64) {
        let Some(track) = &self.track else {
            return;
        };
        let frame = (secs.max(0.0) * track.sample_rate() as f64) as u64;
        let frame = frame.min(track.frames());
        self.cursor.store(frame, Ordering::Release);
        self.seek.mark(frame);
        if frame < track.frames() {
            self.ended = false;
        }
        if self.last_advance.is_some() {
            self.last_advance = Some(self.clock.now());
        }
        let position = self.current_time();
        self.last_time_update = position;
        self.events.push(MediaEvent::TimeUpdate { position });
    }

    /// Starts or resumes playback.
    ///
    /// Playing from the end restarts the track.
    ///
    /// # Errors
    /// - `PlaybackDenied` if no decodable media is loaded
    pub fn play(&mut self) -> Result<()> {
        let Some(track) = &self.track else {
            return Err(VisualizerError::PlaybackDenied(format!(
                "No decodable media loaded from {}",
                self.src
            )));
        };
        if self.ended || self.cursor.load(Ordering::Acquire) >= track.frames() {
            self.cursor.store(0, Ordering::Release);
            self.seek.mark(0);
        }
        self.ended = false;
        self.playing.store(true, Ordering::Release);
        self.last_advance = Some(self.clock.now());
        Ok(())
    }

    pub fn pause(&mut self) {
        self.advance();
        self.playing.store(false, Ordering::Release);
        self.last_advance = None;
    }

    #[cfg(test)]
    pub fn paused(&self) -> bool {
        !self.playing.load(Ordering::Acquire)
    }

    #[cfg(test)]
    pub fn ended(&self) -> bool {
        self.ended
    }

    /// Shared view of the playing signal, if a track is loaded.
    pub fn playhead(&self) -> Option<Playhead> {
        self.track.as_ref().map(|track| Playhead {
            track: Arc::clone(track),
            cursor: Arc::clone(&self.cursor),
            playing: Arc::clone(&self.playing),
            seek: Arc::clone(&self.seek),
        })
    }

    /// Advances playback to the clock's current time and returns pending events.
    pub fn poll_events(&mut self) -> Vec<MediaEvent> {
        self.advance();
        std::mem::take(&mut self.events)
    }

    fn advance(&mut self) {
        let (Some(track), Some(since)) = (&self.track, self.last_advance) else {
            return;
        };
        let now = self.clock.now();
        let elapsed = now.saturating_sub(since);
        let step = (elapsed.as_secs_f64() * track.sample_rate() as f64) as u64;
        if step == 0 {
            return;
        }
        // Keep the fractional remainder so the cursor does not drift behind the clock.
        let consumed = Duration::from_secs_f64(step as f64 / track.sample_rate() as f64);
        self.last_advance = Some(since + consumed);

        let total = track.frames();
        let frame = (self.cursor.load(Ordering::Acquire) + step).min(total);
        self.cursor.store(frame, Ordering::Release);

        let position = frame as f64 / track.sample_rate() as f64;
        if position - self.last_time_update >= TIME_UPDATE_INTERVAL || frame == total {
            self.last_time_update = position;
            self.events.push(MediaEvent::TimeUpdate { position });
        }

        if frame == total {
            self.playing.store(false, Ordering::Release);
            self.last_advance = None;
            self.ended = true;
            self.events.push(MediaEvent::Ended);
            tracing::info!("Playback reached end of track");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn element_with_seconds(seconds: u32) -> (AudioElement, ManualClock) {
        let clock = ManualClock::new();
        let mut element = AudioElement::new("episode.mp3", Rc::new(clock.clone()));
        let rate = 100;
        element.load(Track::from_samples(
            "episode.mp3",
            rate,
            vec![0.25; (rate * seconds) as usize * 2],
        ));
        (element, clock)
    }

    #[test]
    fn test_play_without_media_is_denied() {
        let clock = ManualClock::new();
        let mut element = AudioElement::new("missing.mp3", Rc::new(clock));
        assert!(matches!(element.play(), Err(VisualizerError::PlaybackDenied(_))));
        assert!(element.playhead().is_none());
    }

    #[test]
    fn test_load_announces_metadata() {
        let (mut element, _clock) = element_with_seconds(10);
        assert_eq!(element.poll_events(), vec![MediaEvent::LoadedMetadata { duration: 10.0 }]);
        assert_eq!(element.duration(), Some(10.0));
        assert!(element.paused());
    }

    #[test]
    fn test_cursor_follows_clock_only_while_playing() {
        let (mut element, clock) = element_with_seconds(10);
        element.poll_events();
        clock.advance(Duration::from_secs(1));
        element.poll_events();
        assert_eq!(element.current_time(), 0.0);

        element.play().unwrap();
        clock.advance(Duration::from_millis(1500));
        let events = element.poll_events();
        assert!((element.current_time() - 1.5).abs() < 1e-9);
        assert!(events.contains(&MediaEvent::TimeUpdate { position: 1.5 }));

        element.pause();
        clock.advance(Duration::from_secs(3));
        element.poll_events();
        assert!((element.current_time() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_time_updates_are_throttled() {
        let (mut element, clock) = element_with_seconds(10);
        element.poll_events();
        element.play().unwrap();
        let mut updates = 0;
        for _ in 0..100 {
            clock.advance(Duration::from_millis(10));
            updates += element
                .poll_events()
                .iter()
                .filter(|e| matches!(e, MediaEvent::TimeUpdate { .. }))
                .count();
        }
        assert_eq!(updates, 4);
    }

    #[test]
    fn test_ended_fires_once_and_pauses() {
        let (mut element, clock) = element_with_seconds(2);
        element.poll_events();
        element.play().unwrap();
        clock.advance(Duration::from_secs(5));
        let events = element.poll_events();
        assert_eq!(events.iter().filter(|e| **e == MediaEvent::Ended).count(), 1);
        assert!(element.paused());
        assert!(element.ended());
        assert_eq!(element.current_time(), 2.0);

        clock.advance(Duration::from_secs(1));
        assert!(!element.poll_events().contains(&MediaEvent::Ended));
    }

    #[test]
    fn test_seek_resets_position_and_clears_ended() {
        let (mut element, clock) = element_with_seconds(2);
        element.play().unwrap();
        clock.advance(Duration::from_secs(3));
        element.poll_events();
        element.set_current_time(0.0);
        assert_eq!(element.current_time(), 0.0);
        assert!(!element.ended());
        element.set_current_time(99.0);
        assert_eq!(element.current_time(), 2.0);
    }

    #[test]
    fn test_playhead_reads_recent_signal() {
        let (mut element, clock) = element_with_seconds(1);
        element.play().unwrap();
        clock.advance(Duration::from_millis(50));
        element.poll_events();
        let playhead = element.playhead().unwrap();
        assert_eq!(playhead.frame(), 5);
        let mut window = [1.0f32; 8];
        playhead.recent_mono(&mut window);
        assert_eq!(&window[..3], &[0.0, 0.0, 0.0]);
        assert!(window[3..].iter().all(|&s| (s - 0.25).abs() < 1e-6));
        assert!(playhead.same_source(&element.playhead().unwrap()));

        let (seeks, _) = playhead.last_seek();
        element.set_current_time(0.5);
        assert_eq!(playhead.last_seek(), (seeks + 1, 50));
    }
}
