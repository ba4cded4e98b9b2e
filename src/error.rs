//! Error taxonomy for the visualizer core.
//!
//! Every variant carries the human-readable explanation that ends up in the
//! status line. None of these are meant to escape as a crash: the component
//! boundary converts them into the recorder's `error` state.

/// Result type alias for core visualizer operations.
pub type Result<T> = std::result::Result<T, VisualizerError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VisualizerError {
    /// A required audio, capture or encoding capability is missing on this host
    #[error("{0}")]
    UnsupportedEnvironment(String),

    /// Starting playback was rejected
    #[error("{0}")]
    PlaybackDenied(String),

    /// The surface or element could not provide a stream when recording started
    #[error("{0}")]
    CaptureUnavailable(String),

    /// The encoder stopped without delivering any chunk
    #[error("Recording produced no data. Try once more.")]
    EmptyRecording,

    /// Constructing or starting the encoder over the composed stream failed
    #[error("Unable to start the recording. Please try again.")]
    EncoderStartFailure(String),

    /// The encoder failed while a recording was running
    #[error("Recording failed: {0}")]
    Encoder(String),
}

impl VisualizerError {
    /// Underlying diagnostic detail, used for logging rather than the status line.
    pub fn detail(&self) -> &str {
        match self {
            Self::UnsupportedEnvironment(msg)
            | Self::PlaybackDenied(msg)
            | Self::CaptureUnavailable(msg)
            | Self::EncoderStartFailure(msg)
            | Self::Encoder(msg) => msg,
            Self::EmptyRecording => "encoder delivered zero chunks",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_text_hides_encoder_detail() {
        let err = VisualizerError::EncoderStartFailure("ffmpeg exited with 1".to_string());
        assert_eq!(err.to_string(), "Unable to start the recording. Please try again.");
        assert_eq!(err.detail(), "ffmpeg exited with 1");
    }

    #[test]
    fn test_capability_messages_pass_through() {
        let err = VisualizerError::CaptureUnavailable("Audio capture is not supported.".into());
        assert_eq!(err.to_string(), "Audio capture is not supported.");
    }
}
