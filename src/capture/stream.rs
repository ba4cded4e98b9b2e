//! Capture streams: the surface as a video track, the element as an audio track.
//!
//! A video track always yields whatever was most recently published to the
//! surface's frame slot. An audio track yields the PCM the playhead has moved
//! over since the previous read and silence when playback is not advancing.

use tiny_skia::{Color, FilterQuality, Pixmap, PixmapPaint, Transform};

use crate::error::{Result, VisualizerError};
use crate::media::track::TRACK_CHANNELS;
use crate::media::{AudioElement, Playhead};
use crate::render::surface::{FrameSlot, Surface, BACKGROUND};

pub const SURFACE_CAPTURE_FAILED: &str = "Surface capture is not supported on this host.";
pub const ELEMENT_CAPTURE_FAILED: &str = "Audio capture is not supported on this host.";

/// Audio the encoder may fall behind playback before the track skips ahead, in seconds.
const MAX_AUDIO_LAG_SECS: f64 = 0.5;

pub struct VideoTrack {
    slot: FrameSlot,
    frame_rate: u32,
    /// Output frame, sized at capture time
    buffer: Pixmap,
}

impl VideoTrack {
    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    pub fn frame_rate(&self) -> u32 {
        self.frame_rate
    }

    /// RGBA bytes of the latest published frame.
    ///
    /// Frames published at another size are scaled to the capture size;
    /// before the first publish the track is the plain background.
    pub fn read_frame(&mut self) -> &[u8] {
        let slot = self.slot.borrow();
        match slot.as_ref() {
            Some(frame) if frame.width() == self.buffer.width() && frame.height() == self.buffer.height() => {
                self.buffer.data_mut().copy_from_slice(frame.data());
            }
            Some(frame) => {
                let (r, g, b) = BACKGROUND;
                self.buffer.fill(Color::from_rgba8(r, g, b, 255));
                let sx = self.buffer.width() as f32 / frame.width() as f32;
                let sy = self.buffer.height() as f32 / frame.height() as f32;
                let paint = PixmapPaint {
                    quality: FilterQuality::Bilinear,
                    ..PixmapPaint::default()
                };
                self.buffer
                    .draw_pixmap(0, 0, frame.as_ref(), &paint, Transform::from_scale(sx, sy), None);
            }
            None => {
                let (r, g, b) = BACKGROUND;
                self.buffer.fill(Color::from_rgba8(r, g, b, 255));
            }
        }
        self.buffer.data()
    }
}

pub struct AudioTrack {
    playhead: Playhead,
    /// Frame up to which PCM has been handed out
    read: u64,
    /// Seek count seen by the previous read
    seeks: u64,
}

impl AudioTrack {
    pub fn sample_rate(&self) -> u32 {
        self.playhead.track().sample_rate()
    }

    pub fn channels(&self) -> usize {
        TRACK_CHANNELS
    }

    /// Appends exactly `frames` interleaved stereo frames to `out`.
    pub fn pull(&mut self, frames: usize, out: &mut Vec<f32>) {
        let (seeks, origin) = self.playhead.last_seek();
        if seeks != self.seeks {
            self.seeks = seeks;
            self.read = origin;
        }
        let cursor = self.playhead.frame();
        if cursor < self.read {
            self.read = cursor;
        }
        let max_lag = (f64::from(self.sample_rate()) * MAX_AUDIO_LAG_SECS) as u64 + frames as u64;
        if cursor - self.read > max_lag {
            tracing::debug!("Audio capture skipped {} frames", cursor - self.read - frames as u64);
            self.read = cursor - frames as u64;
        }

        let available = ((cursor - self.read) as usize).min(frames);
        let track = self.playhead.track();
        out.reserve(frames * TRACK_CHANNELS);
        for frame in self.read..self.read + available as u64 {
            let (left, right) = track.frame(frame);
            out.push(left);
            out.push(right);
        }
        self.read += available as u64;
        out.resize(out.len() + (frames - available) * TRACK_CHANNELS, 0.0);
    }
}

/// A set of captured tracks.
#[derive(Default)]
pub struct MediaStream {
    pub video: Vec<VideoTrack>,
    pub audio: Vec<AudioTrack>,
}

impl MediaStream {
    /// Combines the video tracks of `video` with the audio tracks of `audio`.
    pub fn compose(video: MediaStream, audio: MediaStream) -> Self {
        Self {
            video: video.video,
            audio: audio.audio,
        }
    }
}

/// Captures the surface as a video stream at `frame_rate`.
///
/// # Errors
/// - `CaptureUnavailable` if surface capture is not supported or the frame
///   buffer cannot be allocated
pub fn capture_surface(surface: &Surface, frame_rate: u32, supported: bool) -> Result<MediaStream> {
    if !supported || frame_rate == 0 {
        return Err(VisualizerError::CaptureUnavailable(SURFACE_CAPTURE_FAILED.to_string()));
    }
    let (width, height) = surface.backing_size();
    let (width, height) = (even_floor(width), even_floor(height));
    let buffer = Pixmap::new(width, height)
        .ok_or_else(|| VisualizerError::CaptureUnavailable(SURFACE_CAPTURE_FAILED.to_string()))?;
    tracing::debug!("Capturing surface at {}x{} {}fps", width, height, frame_rate);
    Ok(MediaStream {
        video: vec![VideoTrack {
            slot: surface.frame_slot(),
            frame_rate,
            buffer,
        }],
        audio: Vec::new(),
    })
}

/// Largest even size not above `size`, at least 2. yuv420p needs even dimensions.
fn even_floor(size: u32) -> u32 {
    (size & !1).max(2)
}

/// Captures the element's playing signal as an audio stream.
///
/// # Errors
/// - `CaptureUnavailable` if element capture is not supported or nothing is loaded
pub fn capture_element(element: &AudioElement, supported: bool) -> Result<MediaStream> {
    let playhead = element
        .playhead()
        .filter(|_| supported)
        .ok_or_else(|| VisualizerError::CaptureUnavailable(ELEMENT_CAPTURE_FAILED.to_string()))?;
    let read = playhead.frame();
    let (seeks, _) = playhead.last_seek();
    Ok(MediaStream {
        video: Vec::new(),
        audio: vec![AudioTrack {
            playhead,
            read,
            seeks,
        }],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::media::Track;
    use std::rc::Rc;
    use std::time::Duration;

    fn element(clock: &ManualClock) -> AudioElement {
        let mut element = AudioElement::new("episode.mp3", Rc::new(clock.clone()));
        let samples = (0..100 * 10).flat_map(|i| [i as f32, -(i as f32)]).collect();
        element.load(Track::from_samples("episode.mp3", 100, samples));
        element
    }

    #[test]
    fn test_unsupported_surface_capture() {
        let surface = Surface::new(16.0, 9.0, 1.0).unwrap();
        assert!(matches!(
            capture_surface(&surface, 60, false),
            Err(VisualizerError::CaptureUnavailable(_))
        ));
    }

    #[test]
    fn test_video_track_follows_published_frame() {
        let mut surface = Surface::new(16.0, 10.0, 1.0).unwrap();
        let mut stream = capture_surface(&surface, 60, true).unwrap();
        let track = &mut stream.video[0];
        assert_eq!((track.width(), track.height()), (16, 10));
        assert_eq!(&track.read_frame()[..4], &[5, 8, 20, 255]);

        surface.pixmap_mut().fill(Color::WHITE);
        surface.publish();
        assert_eq!(&track.read_frame()[..4], &[255, 255, 255, 255]);
    }

    #[test]
    fn test_video_track_scales_resized_surface() {
        let mut surface = Surface::new(16.0, 10.0, 1.0).unwrap();
        let mut stream = capture_surface(&surface, 30, true).unwrap();
        surface.set_layout_size(32.0, 20.0);
        surface.sync_backing_size();
        surface.pixmap_mut().fill(Color::WHITE);
        surface.publish();
        let track = &mut stream.video[0];
        let pixels = track.read_frame();
        assert_eq!(pixels.len(), 16 * 10 * 4);
        assert!(pixels[0] > 250 && pixels[3] == 255);
    }

    #[test]
    fn test_capture_size_rounds_down_to_even() {
        let surface = Surface::new(33.0, 19.0, 1.0).unwrap();
        let stream = capture_surface(&surface, 30, true).unwrap();
        let track = &stream.video[0];
        assert_eq!((track.width(), track.height()), (32, 18));

        let tiny = Surface::new(1.0, 1.0, 1.0).unwrap();
        let stream = capture_surface(&tiny, 30, true).unwrap();
        assert_eq!((stream.video[0].width(), stream.video[0].height()), (2, 2));
    }

    #[test]
    fn test_audio_without_media_is_unavailable() {
        let clock = ManualClock::new();
        let empty = AudioElement::new("missing.mp3", Rc::new(clock));
        assert!(capture_element(&empty, true).is_err());
    }

    #[test]
    fn test_audio_track_pads_silence_while_paused() {
        let clock = ManualClock::new();
        let mut element = element(&clock);
        let mut stream = capture_element(&element, true).unwrap();
        let track = &mut stream.audio[0];

        let mut out = Vec::new();
        track.pull(4, &mut out);
        assert_eq!(out, vec![0.0; 8]);

        element.play().unwrap();
        clock.advance(Duration::from_millis(30));
        element.poll_events();
        out.clear();
        track.pull(5, &mut out);
        assert_eq!(out, vec![0.0, -0.0, 1.0, -1.0, 2.0, -2.0, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_audio_track_resyncs_on_rewind() {
        let clock = ManualClock::new();
        let mut element = element(&clock);
        element.set_current_time(5.0);
        let mut stream = capture_element(&element, true).unwrap();
        let track = &mut stream.audio[0];

        element.set_current_time(0.0);
        element.play().unwrap();
        clock.advance(Duration::from_millis(20));
        element.poll_events();
        let mut out = Vec::new();
        track.pull(2, &mut out);
        assert_eq!(out, vec![0.0, -0.0, 1.0, -1.0]);
    }
}
