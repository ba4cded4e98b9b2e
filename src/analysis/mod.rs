//! Audio analysis: the processing graph, the analyser and the tap that joins
//! them to the playing element.

pub mod analyser;
pub mod graph;
pub mod tap;

pub use analyser::AnalyserSettings;
pub use tap::{AnalysisHandle, AnalysisTap};

/// Buffers pulled from the analyser for one paint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisFrame {
    pub frequency: Vec<u8>,
    pub waveform: Vec<u8>,
}

impl AnalysisFrame {
    /// Silent frame: zero spectrum, centered waveform.
    pub fn silent(bins: usize, window: usize) -> Self {
        Self {
            frequency: vec![0; bins],
            waveform: vec![128; window],
        }
    }

    /// Refills both buffers from `handle`, resizing only when the analyser
    /// dimensions differ.
    pub fn read_from(&mut self, handle: &AnalysisHandle) {
        let bins = handle.frequency_bin_count();
        let window = handle.fft_size();
        if self.frequency.len() != bins {
            self.frequency.resize(bins, 0);
        }
        if self.waveform.len() != window {
            self.waveform.resize(window, 128);
        }
        handle.read_frequency(&mut self.frequency);
        handle.read_waveform(&mut self.waveform);
    }

    /// Resets to silence in place.
    pub fn clear(&mut self) {
        self.frequency.fill(0);
        self.waveform.fill(128);
    }

    /// Mean of the frequency buffer normalized to [0, 1].
    pub fn average_intensity(&self) -> f32 {
        average_intensity(&self.frequency)
    }
}

/// Mean byte value of `bins` divided by 255. Empty input is silent.
pub fn average_intensity(bins: &[u8]) -> f32 {
    if bins.is_empty() {
        return 0.0;
    }
    let sum: u64 = bins.iter().map(|&b| u64::from(b)).sum();
    (sum as f64 / bins.len() as f64 / 255.0) as f32
}
