//! Application command handlers for wavereel.
//!
//! # Commands
//! - `play`: Interactive visualizer with recording controls (default)
//! - `record`: Record the whole track to a WebM file without the controls
//! - `probe`: Report which capabilities this host offers
//! - `config`: Open the configuration file in the user's editor
//! - `logs`: Display recent log entries

pub mod config;
pub mod logs;
pub mod play;
pub mod probe;
pub mod record;

pub use config::handle_config;
pub use logs::handle_logs;
pub use play::handle_play;
pub use probe::handle_probe;
pub use record::handle_record;

use std::path::PathBuf;
use std::rc::Rc;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::capture::{FfmpegEncoderFactory, HostCapabilities};
use crate::clock::SystemClock;
use crate::config::WavereelConfig;
use crate::media::Track;
use crate::visualizer::Visualizer;

/// Loads the configuration and applies command-line overrides.
///
/// # Errors
/// - If the configuration cannot be read or parsed
pub fn load_config(source: Option<String>) -> anyhow::Result<WavereelConfig> {
    let mut config = WavereelConfig::load()?;
    if let Some(source) = source {
        tracing::info!("Track source overridden: {}", source);
        config.audio.stream_url = source;
    }
    tracing::info!(
        "Configuration loaded: output={}, fft_size={}, {}x{} @{}Hz, recording {} at {}fps",
        config.audio.output,
        config.audio.fft_size,
        config.render.width,
        config.render.height,
        config.render.refresh_rate,
        config.recording.mime_type,
        config.recording.frame_rate
    );
    Ok(config)
}

/// Probes the host, builds the visualizer and loads the configured track.
///
/// # Errors
/// - If the surface cannot be allocated
/// - If the track cannot be fetched or decoded
pub async fn open_visualizer(config: &WavereelConfig) -> anyhow::Result<Visualizer> {
    let caps = HostCapabilities::detect(config);
    let factory = FfmpegEncoderFactory::detect(&config.recording);
    let mut visualizer = Visualizer::new(
        config,
        Rc::new(SystemClock::new()),
        caps,
        Box::new(factory),
    )?;
    let track = Track::load(&config.audio.stream_url).await?;
    visualizer.load_track(track);
    visualizer.pump();
    Ok(visualizer)
}

/// Where saved videos go: the configured directory, else the working directory.
pub fn download_dir(config: &WavereelConfig) -> PathBuf {
    config
        .recording
        .output_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Flag raised when SIGUSR1 asks an in-progress recording to finish.
///
/// # Errors
/// - If the signal handler cannot be registered
pub fn register_finish_signal() -> anyhow::Result<Arc<AtomicBool>> {
    let flag = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGUSR1, Arc::clone(&flag))
        .map_err(|e| anyhow::anyhow!("Failed to register signal handler: {e}"))?;
    Ok(flag)
}
