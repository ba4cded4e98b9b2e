//! Non-interactive export of the whole episode.
//!
//! Plays the track from the start while recording it, then saves the video.
//! Ctrl+C or SIGUSR1 finishes early with what has been captured so far.

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use crate::capture::RecorderStatus;
use crate::config::OutputMode;

const MAX_IDLE: Duration = Duration::from_millis(20);
const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// Records the configured track and writes the WebM to `output`.
///
/// `output` may be a file or a directory; it defaults to the configured
/// download directory.
///
/// # Errors
/// - If configuration or track loading fails
/// - If recording cannot start or produces no data
/// - If the video cannot be written
pub async fn handle_record(
    source: Option<String>,
    output: Option<PathBuf>,
    headless: bool,
) -> anyhow::Result<()> {
    tracing::info!("=== wavereel export started ===");
    let mut config = super::load_config(source)?;
    if headless {
        config.audio.output = OutputMode::Headless;
    }
    let destination = output.unwrap_or_else(|| super::download_dir(&config));

    let mut visualizer = super::open_visualizer(&config).await?;
    if let Some(reason) = visualizer.disabled_reason() {
        return Err(anyhow::anyhow!("Recording unavailable: {reason}"));
    }
    let finish = super::register_finish_signal()?;

    visualizer.start_recording()?;
    eprintln!("{}", visualizer.status());

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;
    let mut last_progress = Instant::now();

    loop {
        let wait = visualizer
            .time_until_wakeup()
            .map_or(MAX_IDLE, |wait| wait.min(MAX_IDLE));
        tokio::select! {
            result = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                if let Err(e) = result {
                    tracing::warn!("Ctrl+C handler failed: {e}");
                }
                tracing::info!("Interrupted: finishing recording early");
                visualizer.stop_recording();
            }
            _ = tokio::time::sleep(wait) => {}
        }
        if finish.swap(false, Ordering::Relaxed) {
            tracing::info!("Received SIGUSR1: finishing recording");
            visualizer.stop_recording();
        }

        visualizer.pump();

        match visualizer.recorder_status() {
            RecorderStatus::Idle => break,
            RecorderStatus::Error => {
                let message = visualizer.status().to_string();
                visualizer.teardown();
                return Err(anyhow::anyhow!(message));
            }
            RecorderStatus::Recording if last_progress.elapsed() >= PROGRESS_INTERVAL => {
                last_progress = Instant::now();
                eprintln!("Recording {}", visualizer.readout());
            }
            _ => {}
        }
    }

    eprintln!("{}", visualizer.status());
    let path = visualizer.save_download(&destination)?;
    visualizer.teardown();
    println!("{}", path.display());
    tracing::info!("=== wavereel export finished: {} ===", path.display());
    Ok(())
}
