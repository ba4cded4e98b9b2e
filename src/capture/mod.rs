//! Video export: capability probing, stream capture, encoding and the
//! recording state machine.

pub mod artifact;
pub mod controller;
pub mod encoder;
#[cfg(test)]
pub mod fake;
pub mod ffmpeg;
pub mod probe;
pub mod session;
pub mod stream;

pub use artifact::Artifact;
pub use controller::{CaptureController, CaptureSettings, RecorderStatus};
pub use encoder::EncoderFactory;
pub use ffmpeg::FfmpegEncoderFactory;
pub use probe::{playback_support, recording_support, HostCapabilities, Support};
