//! Stream encoder seam.
//!
//! An encoder consumes a composed [`MediaStream`] and, once started, delivers
//! encoded chunks every timeslice. `stop` is asynchronous: remaining data and
//! the final `Stop` event arrive through later `poll_event` calls.

use std::fmt;
use std::time::Duration;

use super::stream::MediaStream;
use crate::error::{Result, VisualizerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderState {
    Inactive,
    Recording,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncoderEvent {
    /// A chunk of encoded container bytes
    DataAvailable(Vec<u8>),
    /// The encoder has flushed everything; always the last event
    Stop,
    /// The encoder failed while running
    Error(String),
}

/// A container mime type with its codec pairing, e.g. `video/webm;codecs=vp9,opus`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimeType {
    essence: String,
    codecs: Vec<String>,
}

impl MimeType {
    /// Parses a mime type with an optional `codecs` parameter.
    ///
    /// # Errors
    /// - `EncoderStartFailure` if the value is not a `type/subtype` pair
    pub fn parse(raw: &str) -> Result<Self> {
        let mut parts = raw.split(';');
        let essence = parts.next().unwrap_or_default().trim().to_ascii_lowercase();
        let valid = essence
            .split_once('/')
            .is_some_and(|(kind, sub)| !kind.is_empty() && !sub.is_empty());
        if !valid {
            return Err(VisualizerError::EncoderStartFailure(format!(
                "Invalid mime type: {raw}"
            )));
        }

        let mut codecs = Vec::new();
        for param in parts {
            if let Some((key, value)) = param.split_once('=') {
                if key.trim().eq_ignore_ascii_case("codecs") {
                    codecs = value
                        .trim()
                        .trim_matches('"')
                        .split(',')
                        .map(|c| c.trim().to_ascii_lowercase())
                        .filter(|c| !c.is_empty())
                        .collect();
                }
            }
        }
        Ok(Self { essence, codecs })
    }

    /// `type/subtype` without parameters.
    pub fn essence(&self) -> &str {
        &self.essence
    }

    /// Container name, the subtype.
    pub fn container(&self) -> &str {
        self.essence.split_once('/').map_or("", |(_, sub)| sub)
    }

    pub fn video_codec(&self) -> Option<&str> {
        self.codecs.first().map(String::as_str)
    }

    pub fn audio_codec(&self) -> Option<&str> {
        self.codecs.get(1).map(String::as_str)
    }
}

impl fmt::Display for MimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.codecs.is_empty() {
            write!(f, "{}", self.essence)
        } else {
            write!(f, "{};codecs={}", self.essence, self.codecs.join(","))
        }
    }
}

pub trait StreamEncoder {
    fn mime_type(&self) -> &MimeType;

    fn state(&self) -> EncoderState;

    /// Begins encoding, delivering data every `timeslice`.
    ///
    /// # Errors
    /// - `EncoderStartFailure` if the encoder cannot begin
    fn start(&mut self, timeslice: Duration, now: Duration) -> Result<()>;

    /// Feeds due frames and audio and collects output; called from the event loop.
    fn pump(&mut self, now: Duration);

    /// Requests the final flush. Calling it while inactive has no effect.
    fn stop(&mut self);

    fn poll_event(&mut self) -> Option<EncoderEvent>;

    /// When the encoder next needs a `pump`.
    fn next_deadline(&self) -> Option<Duration>;
}

pub trait EncoderFactory {
    /// Whether the host can construct encoders at all.
    fn is_available(&self) -> bool;

    /// Builds an encoder over `stream`.
    ///
    /// # Errors
    /// - `EncoderStartFailure` if the encoder cannot be constructed for this
    ///   stream or mime type
    fn create(&self, stream: MediaStream, mime_type: &MimeType) -> Result<Box<dyn StreamEncoder>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_codec_pairing() {
        let mime = MimeType::parse("video/webm;codecs=vp9,opus").unwrap();
        assert_eq!(mime.essence(), "video/webm");
        assert_eq!(mime.container(), "webm");
        assert_eq!(mime.video_codec(), Some("vp9"));
        assert_eq!(mime.audio_codec(), Some("opus"));
        assert_eq!(mime.to_string(), "video/webm;codecs=vp9,opus");
    }

    #[test]
    fn test_parse_quoted_and_bare() {
        let mime = MimeType::parse("Video/WebM; codecs=\"VP9, Opus\"").unwrap();
        assert_eq!(mime.audio_codec(), Some("opus"));
        let bare = MimeType::parse("video/webm").unwrap();
        assert_eq!(bare.video_codec(), None);
        assert_eq!(bare.to_string(), "video/webm");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            MimeType::parse("webm"),
            Err(VisualizerError::EncoderStartFailure(_))
        ));
        assert!(MimeType::parse("/webm").is_err());
    }
}
