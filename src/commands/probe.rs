//! Capability report for this host.

use crate::capture::ffmpeg::find_ffmpeg;
use crate::capture::{playback_support, recording_support, HostCapabilities, Support};

/// Prints which parts of the visualizer this host supports.
///
/// # Errors
/// - If the configuration cannot be loaded
pub fn handle_probe(source: Option<String>) -> anyhow::Result<()> {
    let config = super::load_config(source)?;
    let caps = HostCapabilities::detect(&config);

    println!("Audio output:     {}", config.audio.output);
    println!("Audio context:    {}", yes_no(caps.audio_context));
    println!("Surface capture:  {}", yes_no(caps.surface_capture));
    println!("Element capture:  {}", yes_no(caps.element_capture));
    println!("Stream encoder:   {}", yes_no(caps.stream_encoder));
    match find_ffmpeg(config.recording.ffmpeg_path.as_deref()) {
        Ok(path) => println!("ffmpeg:           {}", path.display()),
        Err(e) => println!("ffmpeg:           {e}"),
    }
    println!();
    println!("Playback:         {}", describe(&playback_support(&caps)));
    println!(
        "Recording:        {} ({})",
        describe(&recording_support(&caps)),
        config.recording.mime_type
    );
    Ok(())
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

fn describe(support: &Support) -> String {
    match support.reason() {
        None => "supported".to_string(),
        Some(reason) => format!("unavailable: {reason}"),
    }
}
