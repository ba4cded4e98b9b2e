//! Application orchestration and command routing.
//!
//! Handles command-line argument parsing and delegates to the command handlers.

use crate::commands;
use crate::logging;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::io;
use std::path::PathBuf;
use std::process;

/// An audio-reactive visualizer that exports the whole episode as a WebM video
#[derive(Parser)]
#[command(name = "wavereel")]
#[command(version)]
#[command(
    long_about = "An audio-reactive visualizer that animates a podcast episode in the terminal\nand exports the animation, with its audio, as a WebM video.\n\nDEFAULT COMMAND:\n    If no command is specified, 'play' is used by default.\n\nEXAMPLES:\n    # Play the configured episode with live controls\n    $ wavereel\n\n    # Play a local file instead\n    $ wavereel --source episode.mp3\n\n    # Export the whole episode without the controls\n    $ wavereel record -o episode.webm\n\n    # Finish an export early from another terminal\n    $ pkill -USR1 wavereel\n\n    # Check what this host supports\n    $ wavereel probe"
)]
#[command(
    after_help = "CONFIGURATION:\n    Config file:        ~/.config/wavereel/wavereel.toml\n    Logs:               ~/.local/state/wavereel/wavereel.log.*"
)]
struct Cli {
    /// Track to play instead of the configured stream URL (URL or path)
    #[arg(short, long, value_name = "URL|FILE", global = true)]
    source: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Play the episode with the live visualizer (default)
    ///
    /// Space plays/pauses, 'r' records, 'f' finishes the recording,
    /// 's' saves the finished video and 'q'/Escape quits.
    #[command(visible_alias = "p")]
    Play,

    /// Record the whole episode to a WebM file without the controls
    ///
    /// Playback restarts from the beginning and the export finishes when the
    /// track ends. Ctrl+C or SIGUSR1 finishes early.
    #[command(visible_alias = "r")]
    Record {
        /// File or directory to write the video to
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,

        /// Do not play audio through the output device
        #[arg(long)]
        headless: bool,
    },

    /// Report which capabilities this host offers
    Probe,

    /// Open configuration file in your preferred editor
    ///
    /// Uses $EDITOR or falls back to nano/vi.
    #[command(visible_alias = "c")]
    Config,

    /// Show recent log entries from the application
    ///
    /// Display the last 50 lines of the most recent log file.
    Logs,

    /// Generate shell completion script
    ///
    /// Examples:
    ///   wavereel completions bash > wavereel.bash
    ///   wavereel completions zsh > _wavereel
    Completions {
        /// The shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Runs the application based on command-line arguments.
///
/// # Exit Codes
/// - 0: Success
/// - 1: General error
/// - 2: Usage error (invalid arguments)
///
/// # Errors
/// - If logging initialization fails
/// - If command execution fails
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Some(Commands::Completions { shell }) => {
            generate(*shell, &mut Cli::command(), "wavereel", &mut io::stdout());
            return Ok(());
        }
        Some(Commands::Logs) => {
            return match commands::handle_logs() {
                Ok(()) => Ok(()),
                Err(e) => {
                    eprintln!("Error: {e}");
                    process::exit(1);
                }
            };
        }
        _ => {}
    }

    logging::init_logging()?;

    match cli.command {
        None | Some(Commands::Play) => commands::handle_play(cli.source).await?,
        Some(Commands::Record { output, headless }) => {
            commands::handle_record(cli.source, output, headless).await?
        }
        Some(Commands::Probe) => commands::handle_probe(cli.source)?,
        Some(Commands::Config) => commands::handle_config()?,
        Some(Commands::Completions { .. }) | Some(Commands::Logs) => {
            unreachable!("These commands are handled earlier")
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_source_applies_to_record() {
        let cli = Cli::parse_from(["wavereel", "record", "--source", "ep.wav", "-o", "out.webm"]);
        assert_eq!(cli.source.as_deref(), Some("ep.wav"));
        match cli.command {
            Some(Commands::Record { output, headless }) => {
                assert_eq!(output, Some(PathBuf::from("out.webm")));
                assert!(!headless);
            }
            _ => panic!("expected record"),
        }
    }

    #[test]
    fn test_default_command_is_play() {
        let cli = Cli::parse_from(["wavereel"]);
        assert!(cli.command.is_none());
    }
}
