//! wavereel: audio-reactive episode visualizer with live WebM export.

mod analysis;
mod app;
mod capture;
mod clock;
mod commands;
mod config;
mod error;
mod logging;
mod media;
mod render;
mod transport;
mod ui;
mod visualizer;

/// Single-threaded event loop; encoder pipe I/O runs on helper threads.
#[tokio::main(flavor = "current_thread")]
async fn main() {
    if let Err(e) = app::run().await {
        tracing::error!("{e:#}");
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
