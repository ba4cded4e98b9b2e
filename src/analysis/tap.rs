//! Attaches the analyser to the playing element.
//!
//! The context, the wrapped source and the analyser are created once per tap
//! and reused by every later `attach`. Reattaching rewires the same nodes
//! instead of stacking new connections.

use std::cell::RefCell;
use std::rc::Rc;

use super::analyser::{Analyser, AnalyserSettings};
use super::graph::{AudioContext, ContextState, NodeId};
use crate::config::OutputMode;
use crate::error::{Result, VisualizerError};
use crate::media::{AudioElement, Playhead};

/// Pull-based access to the analysis buffers of an attached element.
#[derive(Clone)]
pub struct AnalysisHandle {
    analyser: Rc<RefCell<Analyser>>,
    playhead: Playhead,
}

impl AnalysisHandle {
    pub fn frequency_bin_count(&self) -> usize {
        self.analyser.borrow().frequency_bin_count()
    }

    pub fn fft_size(&self) -> usize {
        self.analyser.borrow().fft_size()
    }

    /// Snapshots the current spectrum into `out`, one byte per bin.
    pub fn read_frequency(&self, out: &mut [u8]) {
        let mut analyser = self.analyser.borrow_mut();
        analyser.capture(&self.playhead);
        analyser.byte_frequency_data(out);
    }

    /// Snapshots the current waveform into `out`, one byte per sample.
    pub fn read_waveform(&self, out: &mut [u8]) {
        let mut analyser = self.analyser.borrow_mut();
        analyser.capture(&self.playhead);
        analyser.byte_time_domain_data(out);
    }

}

/// Owning handle over the audio context and its single node graph.
pub struct AnalysisTap {
    settings: AnalyserSettings,
    output: OutputMode,
    available: bool,
    context: Option<AudioContext>,
    source: Option<Playhead>,
    source_wraps: usize,
    analyser: Option<Rc<RefCell<Analyser>>>,
    disposed: bool,
}

impl AnalysisTap {
    /// Creates a detached tap. `available` reports whether the host can run
    /// an audio context at all.
    pub fn new(settings: AnalyserSettings, output: OutputMode, available: bool) -> Self {
        Self {
            settings,
            output,
            available,
            context: None,
            source: None,
            source_wraps: 0,
            analyser: None,
            disposed: false,
        }
    }

    /// Attaches to `element`, creating the graph on first use.
    ///
    /// # Errors
    /// - `UnsupportedEnvironment` if no audio context can be created or resumed,
    ///   if the analyser settings are invalid, or after `dispose`
    /// - `PlaybackDenied` if the element has no decodable media yet
    pub fn attach(&mut self, element: &AudioElement) -> Result<AnalysisHandle> {
        if self.disposed {
            return Err(VisualizerError::UnsupportedEnvironment(
                "Audio analysis has been released.".to_string(),
            ));
        }
        let playhead = element.playhead().ok_or_else(|| {
            VisualizerError::PlaybackDenied(format!("No decodable media loaded from {}", element.src()))
        })?;

        if let Some(existing) = &self.source {
            if !existing.same_source(&playhead) {
                return Err(VisualizerError::UnsupportedEnvironment(
                    "Another audio element is already being analysed.".to_string(),
                ));
            }
        }

        if self.context.is_none() {
            self.context = Some(AudioContext::new(self.output, self.available)?);
        }
        let Some(context) = self.context.as_mut() else {
            return Err(VisualizerError::UnsupportedEnvironment(
                "Audio context unavailable.".to_string(),
            ));
        };
        if context.state() == ContextState::Suspended {
            context.resume()?;
        }

        // Wrapping happens once; a reloaded track only refreshes the signal.
        if self.source.is_none() {
            self.source_wraps += 1;
            tracing::debug!("Wrapping {} as analysis source", element.src());
        }
        context.set_source(playhead.clone());
        self.source = Some(playhead.clone());

        let analyser = match &self.analyser {
            Some(analyser) => Rc::clone(analyser),
            None => {
                let analyser = Rc::new(RefCell::new(Analyser::new(self.settings)?));
                self.analyser = Some(Rc::clone(&analyser));
                analyser
            }
        };

        context.disconnect(NodeId::Source);
        context.disconnect(NodeId::Analyser);
        context.connect(NodeId::Source, NodeId::Analyser);
        context.connect(NodeId::Analyser, NodeId::Destination);

        Ok(AnalysisHandle { analyser, playhead })
    }

    /// Handle of the current attachment, if any.
    pub fn handle(&self) -> Option<AnalysisHandle> {
        match (&self.analyser, &self.source) {
            (Some(analyser), Some(playhead)) if !self.disposed => Some(AnalysisHandle {
                analyser: Rc::clone(analyser),
                playhead: playhead.clone(),
            }),
            _ => None,
        }
    }

    #[cfg(test)]
    pub fn is_attached(&self) -> bool {
        self.handle().is_some()
    }

    #[cfg(test)]
    pub fn context_state(&self) -> Option<ContextState> {
        self.context.as_ref().map(AudioContext::state)
    }

    #[cfg(test)]
    /// Number of times an element was wrapped as a source node.
    pub fn source_wraps(&self) -> usize {
        self.source_wraps
    }

    #[cfg(test)]
    pub fn live_paths(&self) -> usize {
        self.context.as_ref().map_or(0, AudioContext::live_paths)
    }

    /// Closes the context. Returns `false` when already disposed.
    pub fn dispose(&mut self) -> bool {
        if self.disposed {
            return false;
        }
        self.disposed = true;
        if let Some(mut context) = self.context.take() {
            context.close();
        }
        self.analyser = None;
        self.source = None;
        tracing::debug!("Analysis tap disposed after {} source wraps", self.source_wraps);
        true
    }
}

impl Drop for AnalysisTap {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::media::Track;
    use std::time::Duration;

    fn loaded_element(clock: &ManualClock) -> AudioElement {
        let mut element = AudioElement::new("episode.mp3", Rc::new(clock.clone()));
        let samples = (0..48_000 * 2)
            .map(|i| ((i / 2) as f32 / 48_000.0 * 1500.0 * std::f32::consts::TAU).sin() * 0.5)
            .collect();
        element.load(Track::from_samples("episode.mp3", 48_000, samples));
        element
    }

    fn tap() -> AnalysisTap {
        AnalysisTap::new(AnalyserSettings::default(), OutputMode::Headless, true)
    }

    #[test]
    fn test_attach_is_idempotent() {
        let clock = ManualClock::new();
        let element = loaded_element(&clock);
        let mut tap = tap();
        let first = tap.attach(&element).unwrap();
        let second = tap.attach(&element).unwrap();
        tap.attach(&element).unwrap();

        assert_eq!(tap.source_wraps(), 1);
        assert_eq!(tap.live_paths(), 1);
        assert!(Rc::ptr_eq(&first.analyser, &second.analyser));
        assert_eq!(tap.context_state(), Some(ContextState::Running));
        assert_eq!(first.frequency_bin_count(), 1024);
        assert_eq!(first.fft_size(), 2048);
    }

    #[test]
    fn test_unavailable_host_fails_attach() {
        let clock = ManualClock::new();
        let element = loaded_element(&clock);
        let mut tap = AnalysisTap::new(AnalyserSettings::default(), OutputMode::Headless, false);
        assert!(matches!(
            tap.attach(&element),
            Err(VisualizerError::UnsupportedEnvironment(_))
        ));
        assert!(!tap.is_attached());
    }

    #[test]
    fn test_attach_without_media_is_denied() {
        let clock = ManualClock::new();
        let element = AudioElement::new("missing.mp3", Rc::new(clock));
        let mut tap = tap();
        assert!(matches!(tap.attach(&element), Err(VisualizerError::PlaybackDenied(_))));
    }

    #[test]
    fn test_second_element_is_rejected() {
        let clock = ManualClock::new();
        let first = loaded_element(&clock);
        let other = loaded_element(&clock);
        let mut tap = tap();
        tap.attach(&first).unwrap();
        assert!(tap.attach(&other).is_err());
        assert_eq!(tap.source_wraps(), 1);
    }

    #[test]
    fn test_reads_follow_playback() {
        let clock = ManualClock::new();
        let mut element = loaded_element(&clock);
        let mut tap = tap();
        let handle = tap.attach(&element).unwrap();

        let mut wave = vec![0u8; 2048];
        handle.read_waveform(&mut wave);
        assert!(wave.iter().all(|&b| b == 128));

        element.play().unwrap();
        clock.advance(Duration::from_millis(100));
        element.poll_events();
        handle.read_waveform(&mut wave);
        assert!(wave.iter().any(|&b| b != 128));

        let mut freq = vec![0u8; 1024];
        handle.read_frequency(&mut freq);
        assert!(freq[64] > 0);
    }

    #[test]
    fn test_dispose_closes_once() {
        let clock = ManualClock::new();
        let element = loaded_element(&clock);
        let mut tap = tap();
        tap.attach(&element).unwrap();
        assert!(tap.dispose());
        assert!(!tap.dispose());
        assert!(tap.handle().is_none());
        assert_eq!(tap.context_state(), None);
        assert!(tap.attach(&element).is_err());
    }
}
