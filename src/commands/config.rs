//! Opens the wavereel configuration file in the user's editor.

use std::process::Command;

use crate::config::{get_config_path, WavereelConfig};

/// Opens `~/.config/wavereel/wavereel.toml`, writing the defaults first if it
/// does not exist yet.
///
/// Editors are tried in order: `$EDITOR`, nano, vi.
///
/// # Errors
/// - If the config file cannot be created
/// - If no editor can be found or it exits with an error
pub fn handle_config() -> anyhow::Result<()> {
    let config_path = get_config_path()?;
    if !config_path.exists() {
        WavereelConfig::default().save()?;
    }
    tracing::info!("Opening config file: {}", config_path.display());

    let editor = find_editor()?;
    tracing::debug!("Using editor: {}", editor);

    let status = Command::new(&editor)
        .arg(&config_path)
        .status()
        .map_err(|e| anyhow::anyhow!("Failed to open editor '{editor}': {e}"))?;
    if !status.success() {
        return Err(anyhow::anyhow!(
            "Editor exited with error code: {}",
            status.code().unwrap_or(-1)
        ));
    }

    // Surface mistakes now instead of on the next launch.
    let content = std::fs::read_to_string(&config_path)?;
    if let Err(e) = WavereelConfig::parse(&content) {
        eprintln!("Warning: {} does not parse: {e}", config_path.display());
    }
    Ok(())
}

fn find_editor() -> anyhow::Result<String> {
    if let Ok(editor) = std::env::var("EDITOR") {
        if !editor.is_empty() {
            return Ok(editor);
        }
    }
    for editor in ["nano", "vi"] {
        if crate::capture::ffmpeg::find_in_path(editor).is_ok() {
            return Ok(editor.to_string());
        }
    }
    Err(anyhow::anyhow!(
        "No editor found. Please set the $EDITOR environment variable."
    ))
}
