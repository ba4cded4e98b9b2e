//! Capability probing.
//!
//! `recording_support` and `playback_support` are pure; `HostCapabilities::detect`
//! does the actual feature detection.

use crate::config::{OutputMode, WavereelConfig};

pub const ENCODER_UNAVAILABLE: &str = "The video encoder is not available on this host.";
pub const SURFACE_CAPTURE_UNAVAILABLE: &str = "Surface capture is unsupported on this host.";
pub const ELEMENT_CAPTURE_UNAVAILABLE: &str = "Audio capture is unsupported on this host.";
pub const AUDIO_UNAVAILABLE: &str = "Audio processing is not supported on this host.";

/// What the host can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HostCapabilities {
    /// An audio context (and its destination) can be created
    pub audio_context: bool,
    /// The drawing surface can be captured as a video stream
    pub surface_capture: bool,
    /// The media element can be captured as an audio stream
    pub element_capture: bool,
    /// A stream encoder for the configured mime type exists
    pub stream_encoder: bool,
}

impl HostCapabilities {
    #[cfg(test)]
    pub fn all() -> Self {
        Self {
            audio_context: true,
            surface_capture: true,
            element_capture: true,
            stream_encoder: true,
        }
    }

    /// Probes the host.
    ///
    /// Headless output always has an audio context since it needs no device.
    pub fn detect(config: &WavereelConfig) -> Self {
        let audio_context = match config.audio.output {
            OutputMode::Headless => true,
            OutputMode::Device => output_device_present(),
        };
        let caps = Self {
            audio_context,
            surface_capture: true,
            element_capture: cfg!(unix),
            stream_encoder: super::ffmpeg::encoder_available(&config.recording),
        };
        tracing::info!("Host capabilities: {:?}", caps);
        caps
    }
}

fn output_device_present() -> bool {
    use cpal::traits::HostTrait;
    crate::analysis::graph::suppress_alsa_warnings(|| Ok(cpal::default_host().default_output_device()))
        .map(|device| device.is_some())
        .unwrap_or(false)
}

/// Outcome of a capability check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Support {
    Supported,
    Unsupported { reason: String },
}

impl Support {
    fn unsupported(reason: &str) -> Self {
        Self::Unsupported {
            reason: reason.to_string(),
        }
    }

    #[cfg(test)]
    pub fn is_supported(&self) -> bool {
        matches!(self, Self::Supported)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Supported => None,
            Self::Unsupported { reason } => Some(reason),
        }
    }
}

/// Whether recording can be offered, with the reason shown next to the
/// disabled control when it cannot.
pub fn recording_support(caps: &HostCapabilities) -> Support {
    if !caps.stream_encoder {
        return Support::unsupported(ENCODER_UNAVAILABLE);
    }
    if !caps.surface_capture {
        return Support::unsupported(SURFACE_CAPTURE_UNAVAILABLE);
    }
    if !caps.element_capture {
        return Support::unsupported(ELEMENT_CAPTURE_UNAVAILABLE);
    }
    if !caps.audio_context {
        return Support::unsupported(AUDIO_UNAVAILABLE);
    }
    Support::Supported
}

/// Whether the reactive visualization can run.
pub fn playback_support(caps: &HostCapabilities) -> Support {
    if caps.audio_context {
        Support::Supported
    } else {
        Support::unsupported(AUDIO_UNAVAILABLE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_host_supports_everything() {
        let caps = HostCapabilities::all();
        assert!(recording_support(&caps).is_supported());
        assert!(playback_support(&caps).is_supported());
        assert_eq!(recording_support(&caps).reason(), None);
    }

    #[test]
    fn test_encoder_reason_wins() {
        let caps = HostCapabilities::default();
        assert_eq!(recording_support(&caps).reason(), Some(ENCODER_UNAVAILABLE));
    }

    #[test]
    fn test_reasons_follow_probe_order() {
        let mut caps = HostCapabilities::all();
        caps.surface_capture = false;
        caps.element_capture = false;
        assert_eq!(recording_support(&caps).reason(), Some(SURFACE_CAPTURE_UNAVAILABLE));
        caps.surface_capture = true;
        assert_eq!(recording_support(&caps).reason(), Some(ELEMENT_CAPTURE_UNAVAILABLE));
        caps.element_capture = true;
        caps.audio_context = false;
        assert_eq!(recording_support(&caps).reason(), Some(AUDIO_UNAVAILABLE));
        assert!(!playback_support(&caps).is_supported());
    }
}
