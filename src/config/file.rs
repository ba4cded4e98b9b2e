//! Configuration file management for wavereel.
//!
//! This module handles loading and saving application configuration from TOML files.
//! Configuration is stored in the user's config directory and created from defaults
//! on first run.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Episode played by default.
pub const DEFAULT_STREAM_URL: &str = "https://nyc3.digitaloceanspaces.com/imagine-explainers/audio-explainers/677d671ccefba3c7c5245cb9/0640663b-c6f7-489c-ba8f-3d076c1ace3c-full.mp3";

/// Where decoded audio is sent while it plays.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// System default output device
    #[default]
    Device,
    /// No audible output; playback is paced by the clock alone
    Headless,
}

impl std::fmt::Display for OutputMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Device => write!(f, "device"),
            Self::Headless => write!(f, "headless"),
        }
    }
}

/// Audio source and analysis configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// URL or local path of the track to play
    #[serde(default = "default_stream_url")]
    pub stream_url: String,
    /// Audible output: "device" or "headless"
    #[serde(default)]
    pub output: OutputMode,
    /// Analysis transform window in samples (power of two, 32-32768)
    #[serde(default = "default_fft_size")]
    pub fft_size: usize,
    /// Frame-to-frame smoothing of spectral magnitudes (0.0-1.0)
    #[serde(default = "default_smoothing")]
    pub smoothing: f32,
    /// Magnitude in dB mapped to byte value 0
    #[serde(default = "default_min_decibels")]
    pub min_decibels: f32,
    /// Magnitude in dB mapped to byte value 255
    #[serde(default = "default_max_decibels")]
    pub max_decibels: f32,
}

/// Drawing surface configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Logical surface width
    #[serde(default = "default_width")]
    pub width: u32,
    /// Logical surface height
    #[serde(default = "default_height")]
    pub height: u32,
    /// Backing pixels per logical pixel
    #[serde(default = "default_device_pixel_ratio")]
    pub device_pixel_ratio: f32,
    /// Display refresh rate driving the paint cycle, in Hz
    #[serde(default = "default_refresh_rate")]
    pub refresh_rate: u32,
}

/// Video export configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingConfig {
    /// Surface capture frame rate
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,
    /// Interval between delivered chunks, in milliseconds
    #[serde(default = "default_timeslice_ms")]
    pub timeslice_ms: u64,
    /// Container and codec pairing requested from the encoder
    #[serde(default = "default_mime_type")]
    pub mime_type: String,
    /// Suggested file name of the exported video
    #[serde(default = "default_download_name")]
    pub download_name: String,
    /// Directory where saved downloads land (defaults to the current directory)
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    /// Explicit ffmpeg binary; searched for when unset
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,
}

fn default_stream_url() -> String {
    DEFAULT_STREAM_URL.to_string()
}

fn default_fft_size() -> usize {
    2048
}

fn default_smoothing() -> f32 {
    0.85
}

fn default_min_decibels() -> f32 {
    -100.0
}

fn default_max_decibels() -> f32 {
    -30.0
}

fn default_width() -> u32 {
    1280
}

fn default_height() -> u32 {
    720
}

fn default_device_pixel_ratio() -> f32 {
    1.0
}

fn default_refresh_rate() -> u32 {
    60
}

fn default_frame_rate() -> u32 {
    60
}

fn default_timeslice_ms() -> u64 {
    250
}

fn default_mime_type() -> String {
    "video/webm;codecs=vp9,opus".to_string()
}

fn default_download_name() -> String {
    "navigating-the-autonomous-frontier.webm".to_string()
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            stream_url: default_stream_url(),
            output: OutputMode::default(),
            fft_size: default_fft_size(),
            smoothing: default_smoothing(),
            min_decibels: default_min_decibels(),
            max_decibels: default_max_decibels(),
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            device_pixel_ratio: default_device_pixel_ratio(),
            refresh_rate: default_refresh_rate(),
        }
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            frame_rate: default_frame_rate(),
            timeslice_ms: default_timeslice_ms(),
            mime_type: default_mime_type(),
            download_name: default_download_name(),
            output_dir: None,
            ffmpeg_path: None,
        }
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WavereelConfig {
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub recording: RecordingConfig,
}

impl WavereelConfig {
    /// Loads configuration from the user's config directory.
    ///
    /// Writes a default file first if none exists yet.
    ///
    /// # Errors
    /// - If the config directory cannot be determined or created
    /// - If the config file cannot be read or written
    /// - If the TOML is malformed
    pub fn load() -> anyhow::Result<Self> {
        let config_path = get_config_path()?;
        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            tracing::info!("Default configuration written to {}", config_path.display());
            return Ok(config);
        }
        let config_content = fs::read_to_string(&config_path)?;
        Self::parse(&config_content)
    }

    /// Parses configuration from TOML text, filling in defaults for missing fields.
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: WavereelConfig = toml::from_str(content)?;
        Ok(config)
    }

    /// Saves configuration to the user's config directory.
    ///
    /// # Errors
    /// - If the config directory cannot be determined or created
    /// - If the file cannot be written
    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = get_config_path()?;
        let config_content = toml::to_string_pretty(self)?;
        fs::write(&config_path, config_content)?;
        tracing::info!("Configuration saved");
        Ok(())
    }
}

/// Retrieves the path to the config file, creating its directory if needed.
///
/// # Errors
/// - If the home directory cannot be determined
/// - If the config directory cannot be created
pub fn get_config_path() -> anyhow::Result<PathBuf> {
    let config_dir = dirs::home_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?
        .join(".config")
        .join("wavereel");

    fs::create_dir_all(&config_dir)
        .map_err(|e| anyhow::anyhow!("Failed to create config directory: {e}"))?;

    Ok(config_dir.join("wavereel.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_yields_defaults() {
        let config = WavereelConfig::parse("").unwrap();
        assert_eq!(config.audio.fft_size, 2048);
        assert!((config.audio.smoothing - 0.85).abs() < f32::EPSILON);
        assert_eq!(config.recording.frame_rate, 60);
        assert_eq!(config.recording.timeslice_ms, 250);
        assert_eq!(config.recording.mime_type, "video/webm;codecs=vp9,opus");
        assert_eq!(config.audio.output, OutputMode::Device);
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let config = WavereelConfig::parse(
            r#"
            [audio]
            output = "headless"
            stream_url = "episode.mp3"

            [render]
            device_pixel_ratio = 2.0
            "#,
        )
        .unwrap();
        assert_eq!(config.audio.output, OutputMode::Headless);
        assert_eq!(config.audio.stream_url, "episode.mp3");
        assert_eq!(config.audio.fft_size, 2048);
        assert_eq!(config.render.width, 1280);
        assert!((config.render.device_pixel_ratio - 2.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_round_trip_through_toml() {
        let config = WavereelConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed = WavereelConfig::parse(&text).unwrap();
        assert_eq!(parsed.recording.download_name, config.recording.download_name);
    }

    #[test]
    fn test_unknown_output_mode_is_rejected() {
        assert!(WavereelConfig::parse("[audio]\noutput = \"speakers\"").is_err());
    }
}
