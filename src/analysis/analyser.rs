//! Spectral and time-domain snapshots of the playing signal.
//!
//! Byte encodings follow the Web Audio analyser so the scene math stays the
//! same regardless of host: waveform bytes are centered on 128, frequency bytes
//! map the smoothed magnitude in dB linearly onto 0-255.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

use crate::config::AudioConfig;
use crate::error::{Result, VisualizerError};
use crate::media::Playhead;

/// Analysis window and scaling parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalyserSettings {
    pub fft_size: usize,
    pub smoothing: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,
}

impl Default for AnalyserSettings {
    fn default() -> Self {
        Self {
            fft_size: 2048,
            smoothing: 0.85,
            min_decibels: -100.0,
            max_decibels: -30.0,
        }
    }
}

impl From<&AudioConfig> for AnalyserSettings {
    fn from(config: &AudioConfig) -> Self {
        Self {
            fft_size: config.fft_size,
            smoothing: config.smoothing,
            min_decibels: config.min_decibels,
            max_decibels: config.max_decibels,
        }
    }
}

/// Stateful analyser with a planned FFT and smoothed magnitudes.
pub struct Analyser {
    settings: AnalyserSettings,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    scratch: Vec<Complex<f32>>,
    /// Last `fft_size` mono samples
    time_domain: Vec<f32>,
    /// Smoothed linear magnitudes, one per bin
    smoothed: Vec<f32>,
}

impl Analyser {
    /// Creates an analyser.
    ///
    /// # Errors
    /// - If `fft_size` is not a power of two in 32..=32768
    /// - If smoothing is outside 0..=1 or the dB range is empty
    pub fn new(settings: AnalyserSettings) -> Result<Self> {
        let n = settings.fft_size;
        if !(32..=32768).contains(&n) || !n.is_power_of_two() {
            return Err(VisualizerError::UnsupportedEnvironment(format!(
                "Analysis window {n} must be a power of two between 32 and 32768"
            )));
        }
        if !(0.0..=1.0).contains(&settings.smoothing) {
            return Err(VisualizerError::UnsupportedEnvironment(format!(
                "Smoothing {} must be between 0 and 1",
                settings.smoothing
            )));
        }
        if settings.min_decibels >= settings.max_decibels {
            return Err(VisualizerError::UnsupportedEnvironment(
                "Minimum decibels must be below maximum decibels".to_string(),
            ));
        }

        let fft = FftPlanner::new().plan_fft_forward(n);
        Ok(Self {
            settings,
            fft,
            window: blackman_window(n),
            scratch: vec![Complex::new(0.0, 0.0); n],
            time_domain: vec![0.0; n],
            smoothed: vec![0.0; n / 2],
        })
    }

    pub fn fft_size(&self) -> usize {
        self.settings.fft_size
    }

    pub fn frequency_bin_count(&self) -> usize {
        self.settings.fft_size / 2
    }

    /// Snapshots the most recent window of the playing signal.
    pub fn capture(&mut self, playhead: &Playhead) {
        playhead.recent_mono(&mut self.time_domain);
    }

    /// Replaces the window with explicit samples (zero-padded at the front).
    #[cfg(test)]
    pub fn capture_samples(&mut self, samples: &[f32]) {
        let n = self.time_domain.len();
        let take = samples.len().min(n);
        let pad = n - take;
        self.time_domain[..pad].fill(0.0);
        self.time_domain[pad..].copy_from_slice(&samples[samples.len() - take..]);
    }

    /// Writes byte waveform data for the captured window into `out`.
    pub fn byte_time_domain_data(&self, out: &mut [u8]) {
        for (slot, &sample) in out.iter_mut().zip(self.time_domain.iter()) {
            *slot = (128.0 * (1.0 + sample)).floor().clamp(0.0, 255.0) as u8;
        }
    }

    /// Runs the transform over the captured window, updates the smoothed
    /// magnitudes and writes byte frequency data into `out`.
    pub fn byte_frequency_data(&mut self, out: &mut [u8]) {
        let n = self.settings.fft_size;
        for ((slot, &sample), &w) in self
            .scratch
            .iter_mut()
            .zip(self.time_domain.iter())
            .zip(self.window.iter())
        {
            *slot = Complex::new(sample * w, 0.0);
        }
        self.fft.process(&mut self.scratch);

        let tau = self.settings.smoothing;
        let min_db = self.settings.min_decibels;
        let range = self.settings.max_decibels - min_db;
        let scale = 1.0 / n as f32;

        for (k, smoothed) in self.smoothed.iter_mut().enumerate() {
            let magnitude = self.scratch[k].norm() * scale;
            let next = tau * *smoothed + (1.0 - tau) * magnitude;
            // Flush denormals and non-finite values so silence decays to zero.
            *smoothed = if next.is_finite() && next > 1e-30 { next } else { 0.0 };
        }

        for (slot, &magnitude) in out.iter_mut().zip(self.smoothed.iter()) {
            *slot = magnitude_to_byte(magnitude, min_db, range);
        }
    }
}

/// Maps a linear magnitude onto 0-255 through the configured dB range.
fn magnitude_to_byte(magnitude: f32, min_db: f32, range: f32) -> u8 {
    if magnitude <= 0.0 {
        return 0;
    }
    let db = 20.0 * magnitude.log10();
    (255.0 / range * (db - min_db)).floor().clamp(0.0, 255.0) as u8
}

fn blackman_window(n: usize) -> Vec<f32> {
    let (a0, a1, a2) = (0.42, 0.5, 0.08);
    (0..n)
        .map(|i| {
            let x = i as f32 / n as f32;
            a0 - a1 * (std::f32::consts::TAU * x).cos() + a2 * (2.0 * std::f32::consts::TAU * x).cos()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: f32, amplitude: f32, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| (i as f32 / sample_rate * freq * std::f32::consts::TAU).sin() * amplitude)
            .collect()
    }

    #[test]
    fn test_rejects_invalid_window() {
        let bad = AnalyserSettings {
            fft_size: 1000,
            ..Default::default()
        };
        assert!(Analyser::new(bad).is_err());
        let tiny = AnalyserSettings {
            fft_size: 16,
            ..Default::default()
        };
        assert!(Analyser::new(tiny).is_err());
    }

    #[test]
    fn test_bin_count_is_half_window() {
        let analyser = Analyser::new(AnalyserSettings::default()).unwrap();
        assert_eq!(analyser.fft_size(), 2048);
        assert_eq!(analyser.frequency_bin_count(), 1024);
    }

    #[test]
    fn test_silence_centers_waveform_and_zeroes_spectrum() {
        let mut analyser = Analyser::new(AnalyserSettings::default()).unwrap();
        analyser.capture_samples(&[]);
        let mut wave = vec![0u8; 2048];
        let mut freq = vec![255u8; 1024];
        analyser.byte_time_domain_data(&mut wave);
        analyser.byte_frequency_data(&mut freq);
        assert!(wave.iter().all(|&b| b == 128));
        assert!(freq.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_waveform_bytes_saturate() {
        let mut analyser = Analyser::new(AnalyserSettings::default()).unwrap();
        analyser.capture_samples(&[-1.5, -1.0, 0.5, 1.0, 2.0]);
        let mut wave = vec![0u8; 2048];
        analyser.byte_time_domain_data(&mut wave);
        assert_eq!(&wave[2043..], &[0, 0, 192, 255, 255]);
    }

    #[test]
    fn test_tone_peaks_at_its_bin() {
        let settings = AnalyserSettings {
            smoothing: 0.0,
            ..Default::default()
        };
        let mut analyser = Analyser::new(settings).unwrap();
        // 2048-sample window at 48 kHz: bin width 23.4375 Hz, bin 64 = 1500 Hz.
        analyser.capture_samples(&sine(1500.0, 48_000.0, 0.8, 2048));
        let mut freq = vec![0u8; 1024];
        analyser.byte_frequency_data(&mut freq);
        let peak = freq
            .iter()
            .enumerate()
            .max_by_key(|(_, &v)| v)
            .map(|(i, _)| i)
            .unwrap();
        assert!((63..=65).contains(&peak), "peak at bin {peak}");
        assert!(freq[peak] > 200);
        assert!(freq[400] < freq[peak] / 2);
    }

    #[test]
    fn test_smoothing_lags_behind_sudden_silence() {
        let mut analyser = Analyser::new(AnalyserSettings::default()).unwrap();
        // Quiet enough to stay below the 255 ceiling.
        let tone = sine(1500.0, 48_000.0, 0.02, 2048);
        let mut freq = vec![0u8; 1024];
        for _ in 0..20 {
            analyser.capture_samples(&tone);
            analyser.byte_frequency_data(&mut freq);
        }
        let loud = freq[64];
        assert!(loud > 0 && loud < 255);
        analyser.capture_samples(&[]);
        analyser.byte_frequency_data(&mut freq);
        assert!(freq[64] > 0, "smoothed magnitude should decay gradually");
        assert!(freq[64] < loud);
    }
}
