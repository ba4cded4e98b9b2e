//! Track loading and decoding.
//!
//! Fetches the episode (HTTP(S) or local path), decodes it with symphonia and
//! normalizes it to interleaved stereo `f32` so every consumer (output device,
//! analyser, audio capture) reads one layout.

use anyhow::{anyhow, Result};
use std::sync::Arc;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Channel count of every decoded track.
pub const TRACK_CHANNELS: usize = 2;

/// A fully decoded audio track.
#[derive(Debug, Clone)]
pub struct Track {
    url: String,
    sample_rate: u32,
    /// Interleaved stereo samples
    samples: Arc<[f32]>,
}

impl Track {
    /// Loads and decodes the track at `src`.
    ///
    /// `src` is fetched over HTTP(S) when it carries such a scheme, otherwise it is
    /// read from the filesystem.
    ///
    /// # Errors
    /// - If the resource cannot be fetched or read
    /// - If the media cannot be decoded
    pub async fn load(src: &str) -> Result<Self> {
        let bytes = if src.starts_with("http://") || src.starts_with("https://") {
            tracing::info!("Fetching track: {}", src);
            let response = reqwest::get(src)
                .await
                .map_err(|e| anyhow!("Failed to fetch {src}: {e}"))?
                .error_for_status()
                .map_err(|e| anyhow!("Track request failed: {e}"))?;
            response.bytes().await?.to_vec()
        } else {
            tokio::fs::read(src)
                .await
                .map_err(|e| anyhow!("Failed to read {src}: {e}"))?
        };
        tracing::debug!("Track fetched: {} bytes", bytes.len());

        let hint = extension_hint(src);
        let url = src.to_string();
        tokio::task::spawn_blocking(move || Self::decode(url, bytes, hint.as_deref()))
            .await
            .map_err(|e| anyhow!("Decoder task failed: {e}"))?
    }

    /// Decodes an in-memory media resource.
    ///
    /// # Errors
    /// - If no decodable audio track is found
    pub fn decode(url: String, bytes: Vec<u8>, extension: Option<&str>) -> Result<Self> {
        let mss = MediaSourceStream::new(Box::new(std::io::Cursor::new(bytes)), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = extension {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| anyhow!("Unsupported media format: {e}"))?;
        let mut format = probed.format;

        let track = format
            .default_track()
            .ok_or_else(|| anyhow!("No audio track found"))?;
        let track_id = track.id;
        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| anyhow!("Track does not declare a sample rate"))?;

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| anyhow!("No decoder for track: {e}"))?;

        let mut samples: Vec<f32> = Vec::new();
        let mut sample_buf: Option<SampleBuffer<f32>> = None;

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    break
                }
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => return Err(anyhow!("Failed to read packet: {e}")),
            };
            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    let channels = spec.channels.count();
                    let buf = sample_buf.get_or_insert_with(|| {
                        SampleBuffer::<f32>::new(decoded.capacity() as u64, spec)
                    });
                    if buf.capacity() < decoded.capacity() * channels {
                        *buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                    }
                    buf.copy_interleaved_ref(decoded);
                    append_as_stereo(&mut samples, buf.samples(), channels);
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    tracing::debug!("Skipping undecodable packet: {}", e);
                }
                Err(e) => return Err(anyhow!("Decoding failed: {e}")),
            }
        }

        if samples.is_empty() {
            return Err(anyhow!("Track contains no audio"));
        }

        let track = Self {
            url,
            sample_rate,
            samples: samples.into(),
        };
        tracing::info!(
            "Track decoded: {:.1}s at {}Hz",
            track.duration(),
            track.sample_rate
        );
        Ok(track)
    }

    #[cfg(test)]
    /// Builds a track from interleaved stereo samples.
    pub fn from_samples(url: impl Into<String>, sample_rate: u32, samples: Vec<f32>) -> Self {
        Self {
            url: url.into(),
            sample_rate,
            samples: samples.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of stereo frames.
    pub fn frames(&self) -> u64 {
        (self.samples.len() / TRACK_CHANNELS) as u64
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Left/right pair at `frame`, silence past the end.
    pub fn frame(&self, frame: u64) -> (f32, f32) {
        let idx = frame as usize * TRACK_CHANNELS;
        match self.samples.get(idx..idx + TRACK_CHANNELS) {
            Some(pair) => (pair[0], pair[1]),
            None => (0.0, 0.0),
        }
    }

    /// Mono mix at `frame`, silence past the end.
    pub fn mono(&self, frame: u64) -> f32 {
        let (l, r) = self.frame(frame);
        (l + r) * 0.5
    }
}

/// Appends interleaved samples of any channel count as stereo.
///
/// Mono is duplicated to both sides; extra channels beyond two are dropped.
fn append_as_stereo(out: &mut Vec<f32>, interleaved: &[f32], channels: usize) {
    match channels {
        0 => {}
        1 => {
            for &s in interleaved {
                out.push(s);
                out.push(s);
            }
        }
        _ => {
            for chunk in interleaved.chunks_exact(channels) {
                out.push(chunk[0]);
                out.push(chunk[1]);
            }
        }
    }
}

/// File extension of a URL or path with any query string removed.
fn extension_hint(src: &str) -> Option<String> {
    let path = src.split(['?', '#']).next().unwrap_or(src);
    let name = path.rsplit('/').next()?;
    let (_, ext) = name.rsplit_once('.')?;
    if ext.is_empty() {
        None
    } else {
        Some(ext.to_ascii_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine_wav(sample_rate: u32, channels: u16, seconds: f32) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut bytes = Vec::new();
        {
            let mut writer = hound::WavWriter::new(std::io::Cursor::new(&mut bytes), spec).unwrap();
            let total = (sample_rate as f32 * seconds) as usize;
            for i in 0..total {
                let t = i as f32 / sample_rate as f32;
                let s = (t * 440.0 * std::f32::consts::TAU).sin() * 0.5;
                for _ in 0..channels {
                    writer.write_sample((s * i16::MAX as f32) as i16).unwrap();
                }
            }
            writer.finalize().unwrap();
        }
        bytes
    }

    #[test]
    fn test_decode_mono_wav_as_stereo() {
        let bytes = sine_wav(8000, 1, 0.5);
        let track = Track::decode("tone.wav".into(), bytes, Some("wav")).unwrap();
        assert_eq!(track.sample_rate(), 8000);
        assert_eq!(track.frames(), 4000);
        assert!((track.duration() - 0.5).abs() < 1e-6);
        let (l, r) = track.frame(100);
        assert_eq!(l, r);
    }

    #[test]
    fn test_decode_stereo_wav() {
        let bytes = sine_wav(22050, 2, 0.25);
        let track = Track::decode("tone.wav".into(), bytes, None).unwrap();
        assert_eq!(track.frames(), 5512);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(Track::decode("x.mp3".into(), vec![0u8; 64], Some("mp3")).is_err());
    }

    #[test]
    fn test_frame_past_end_is_silence() {
        let track = Track::from_samples("t", 10, vec![0.5, -0.5]);
        assert_eq!(track.frame(0), (0.5, -0.5));
        assert_eq!(track.frame(1), (0.0, 0.0));
        assert_eq!(track.mono(0), 0.0);
    }

    #[test]
    fn test_extension_hint() {
        assert_eq!(extension_hint("https://cdn/x/episode-full.MP3?sig=1").as_deref(), Some("mp3"));
        assert_eq!(extension_hint("/tmp/tone.wav").as_deref(), Some("wav"));
        assert_eq!(extension_hint("https://cdn/stream"), None);
    }
}
