//! Interactive visualizer.
//!
//! Plays the episode with the live spectrum and exposes the recording controls.
//! SIGUSR1 finishes a recording in progress, like the 'f' key.

use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::ui::{PlayerCommand, PlayerTui};

/// Longest wait for input between pumps.
const MAX_IDLE: Duration = Duration::from_millis(50);

/// Runs the interactive visualizer until the user quits.
///
/// # Errors
/// - If the terminal cannot be driven
/// - If configuration or track loading fails (shown on screen first)
pub async fn handle_play(source: Option<String>) -> anyhow::Result<()> {
    tracing::info!("=== wavereel player started ===");
    let mut tui = PlayerTui::new()?;

    let config = match super::load_config(source) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!("Failed to load configuration: {err}");
            tui.show_error(&format!(
                "Configuration Error:\n\n{err}\n\nPlease check ~/.config/wavereel/wavereel.toml and try again."
            ))?;
            return Err(anyhow::anyhow!("Configuration error: {err}"));
        }
    };

    let mut visualizer = match super::open_visualizer(&config).await {
        Ok(visualizer) => visualizer,
        Err(err) => {
            tracing::error!("Failed to open track: {err}");
            tui.show_error(&format!(
                "Unable to load the episode:\n\n{err}\n\nCheck the stream URL or pass --source."
            ))?;
            return Err(err);
        }
    };
    let download_dir = super::download_dir(&config);
    let finish = super::register_finish_signal()?;

    if let Err(e) = visualizer.toggle_play() {
        tracing::warn!("Autoplay failed: {}", e.detail());
    }

    loop {
        if finish.swap(false, Ordering::Relaxed) {
            tracing::info!("Received SIGUSR1: finishing recording");
            visualizer.stop_recording();
        }

        let wait = visualizer
            .time_until_wakeup()
            .map_or(MAX_IDLE, |wait| wait.min(MAX_IDLE));
        match tui.handle_input(wait)? {
            PlayerCommand::Continue => {}
            PlayerCommand::TogglePlay => {
                if let Err(e) = visualizer.toggle_play() {
                    tracing::warn!("Playback failed: {}", e.detail());
                }
            }
            PlayerCommand::StartRecording => {
                if visualizer.can_start_recording() {
                    if let Err(e) = visualizer.start_recording() {
                        tracing::warn!("Recording did not start: {}", e.detail());
                    }
                }
            }
            PlayerCommand::StopRecording => {
                visualizer.stop_recording();
            }
            PlayerCommand::SaveDownload => {
                if let Err(e) = visualizer.save_download(&download_dir) {
                    tracing::warn!("Save failed: {e}");
                }
            }
            PlayerCommand::Quit => break,
        }

        visualizer.pump();
        tui.render(&visualizer)?;
    }

    visualizer.teardown();
    tui.cleanup()?;
    tracing::info!("=== wavereel player exited ===");
    Ok(())
}
