//! Terminal front end for the visualizer.
//!
//! Shows the live spectrum, the position readout, the status line and, when
//! recording is unavailable, the reason. Keys map onto the visualizer hooks.

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    prelude::*,
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Paragraph, Sparkline, Wrap},
};
use std::io::{stdout, Stdout};
use std::time::Duration;

use crate::capture::RecorderStatus;
use crate::visualizer::Visualizer;

/// User input from the controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerCommand {
    /// No key pressed
    Continue,
    /// Play/pause (Space)
    TogglePlay,
    /// Start recording ('r')
    StartRecording,
    /// Finish recording ('f')
    StopRecording,
    /// Save the finished video ('s')
    SaveDownload,
    /// Quit (Escape, 'q' or Ctrl+C)
    Quit,
}

impl PlayerCommand {
    fn from_key(code: KeyCode, modifiers: KeyModifiers) -> Self {
        match code {
            KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => Self::Quit,
            KeyCode::Char(' ') => Self::TogglePlay,
            KeyCode::Char('r') => Self::StartRecording,
            KeyCode::Char('f') => Self::StopRecording,
            KeyCode::Char('s') => Self::SaveDownload,
            KeyCode::Char('q') | KeyCode::Esc => Self::Quit,
            _ => Self::Continue,
        }
    }
}

pub struct PlayerTui {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    columns: Vec<u64>,
    restored: bool,
}

impl PlayerTui {
    /// Enters raw mode and the alternate screen.
    ///
    /// # Errors
    /// - If the terminal cannot be initialized
    pub fn new() -> anyhow::Result<Self> {
        enable_raw_mode()?;
        let mut stdout = stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let terminal = Terminal::new(CrosstermBackend::new(stdout))?;
        Ok(Self {
            terminal,
            columns: Vec::new(),
            restored: false,
        })
    }

    /// Waits up to `timeout` for a key.
    ///
    /// # Errors
    /// - If event polling fails
    pub fn handle_input(&mut self, timeout: Duration) -> anyhow::Result<PlayerCommand> {
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    return Ok(PlayerCommand::Continue);
                }
                let command = PlayerCommand::from_key(key.code, key.modifiers);
                if command != PlayerCommand::Continue {
                    tracing::debug!("Key {:?} -> {:?}", key.code, command);
                }
                return Ok(command);
            }
        }
        Ok(PlayerCommand::Continue)
    }

    /// Draws one frame of the controls.
    ///
    /// # Errors
    /// - If terminal rendering fails
    pub fn render(&mut self, visualizer: &Visualizer) -> anyhow::Result<()> {
        let width = self.terminal.size()?.width as usize;
        spectrum_columns(visualizer.spectrum(), width, &mut self.columns);

        let indicator = match visualizer.recorder_status() {
            RecorderStatus::Recording => Span::styled("● REC ", Style::default().fg(Color::Red)),
            RecorderStatus::Rendering | RecorderStatus::Arming => {
                Span::styled("◌ ", Style::default().fg(Color::Yellow))
            }
            RecorderStatus::Error => Span::styled("✕ ", Style::default().fg(Color::Red)),
            RecorderStatus::Idle if visualizer.is_playing() => {
                Span::styled("▶ ", Style::default().fg(Color::Green))
            }
            RecorderStatus::Idle => Span::styled("⏸ ", Style::default().fg(Color::Yellow)),
        };
        let readout = Line::from(vec![indicator, Span::raw(visualizer.readout())]);
        let status = Line::from(Span::raw(visualizer.status().to_string()));
        let reason = visualizer.disabled_reason().map(|reason| {
            Line::from(Span::styled(
                format!("Recording disabled: {reason}"),
                Style::default().fg(Color::Rgb(255, 120, 120)),
            ))
        });
        let download = visualizer
            .download()
            .filter(|artifact| !artifact.is_empty())
            .map(|artifact| {
                format!(
                    "{} ({}, {} KiB, {}) ",
                    artifact.file_name(),
                    artifact.mime_type(),
                    artifact.len() / 1024,
                    artifact.created_at().format("%H:%M:%S")
                )
            });
        let help = help_line(visualizer.can_start_recording(), download);
        let columns = &self.columns;

        self.terminal.draw(|frame| {
            let area = frame.area();
            let footer_height = 4u16.min(area.height);
            let spectrum_area = Rect {
                height: area.height.saturating_sub(footer_height),
                ..area
            };
            let footer_area = Rect {
                y: area.y + spectrum_area.height,
                height: footer_height,
                ..area
            };

            let sparkline = Sparkline::default().data(columns).max(255).style(
                Style::default()
                    .bg(Color::Rgb(5, 8, 20))
                    .fg(Color::Rgb(88, 196, 255)),
            );
            frame.render_widget(sparkline, spectrum_area);

            let mut lines = vec![readout, status];
            if let Some(reason) = reason {
                lines.push(reason);
            }
            lines.push(help);
            let footer = Paragraph::new(lines).wrap(Wrap { trim: true }).style(
                Style::default()
                    .fg(Color::Rgb(185, 207, 212))
                    .bg(Color::Rgb(0, 0, 0)),
            );
            frame.render_widget(footer, footer_area);
        })?;
        Ok(())
    }

    /// Shows `message` full screen until a key is pressed.
    ///
    /// # Errors
    /// - If terminal rendering or event polling fails
    pub fn show_error(&mut self, message: &str) -> anyhow::Result<()> {
        loop {
            self.terminal.draw(|frame| {
                let area = frame.area();
                let text = Paragraph::new(message)
                    .alignment(Alignment::Center)
                    .wrap(Wrap { trim: true })
                    .style(
                        Style::default()
                            .fg(Color::Rgb(255, 255, 255))
                            .bg(Color::Rgb(160, 0, 0)),
                    );
                frame.render_widget(Paragraph::new("").style(Style::default().bg(Color::Rgb(160, 0, 0))), area);
                let padding = area.width / 10;
                let centered = Rect {
                    x: area.x + padding,
                    y: area.y + area.height / 2,
                    width: area.width.saturating_sub(padding * 2),
                    height: area.height / 2,
                };
                frame.render_widget(text, centered);
            })?;
            if event::poll(Duration::from_millis(100))? {
                if let Event::Key(_) = event::read()? {
                    return Ok(());
                }
            }
        }
    }

    /// Restores the terminal.
    ///
    /// # Errors
    /// - If raw mode cannot be disabled or the cursor cannot be shown
    pub fn cleanup(&mut self) -> anyhow::Result<()> {
        if self.restored {
            return Ok(());
        }
        self.restored = true;
        disable_raw_mode()?;
        execute!(self.terminal.backend_mut(), LeaveAlternateScreen)?;
        self.terminal.show_cursor()?;
        Ok(())
    }
}

impl Drop for PlayerTui {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}

fn help_line(can_record: bool, download: Option<String>) -> Line<'static> {
    let dim = Style::default().fg(Color::DarkGray);
    let mut spans = vec![Span::raw("space "), Span::styled("play/pause  ", dim)];
    if can_record {
        spans.push(Span::raw("r "));
        spans.push(Span::styled("record  ", dim));
    }
    spans.push(Span::raw("f "));
    spans.push(Span::styled("finish  ", dim));
    if let Some(download) = download {
        spans.push(Span::raw("s "));
        spans.push(Span::styled(format!("save {download} "), dim));
    }
    spans.push(Span::raw("q "));
    spans.push(Span::styled("quit", dim));
    Line::from(spans)
}

/// Folds frequency bins into `width` columns, each the peak of its bins.
/// Only the lower half of the spectrum is shown since little energy lives above it.
pub fn spectrum_columns(bins: &[u8], width: usize, out: &mut Vec<u64>) {
    out.clear();
    out.resize(width, 0);
    let shown = &bins[..bins.len() / 2];
    if shown.is_empty() || width == 0 {
        return;
    }
    for (column, value) in out.iter_mut().enumerate() {
        let start = column * shown.len() / width;
        let end = ((column + 1) * shown.len() / width).max(start + 1).min(shown.len());
        *value = shown[start..end]
            .iter()
            .copied()
            .max()
            .unwrap_or(0) as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_bindings() {
        let none = KeyModifiers::NONE;
        assert_eq!(PlayerCommand::from_key(KeyCode::Char(' '), none), PlayerCommand::TogglePlay);
        assert_eq!(PlayerCommand::from_key(KeyCode::Char('r'), none), PlayerCommand::StartRecording);
        assert_eq!(PlayerCommand::from_key(KeyCode::Char('f'), none), PlayerCommand::StopRecording);
        assert_eq!(PlayerCommand::from_key(KeyCode::Char('s'), none), PlayerCommand::SaveDownload);
        assert_eq!(PlayerCommand::from_key(KeyCode::Esc, none), PlayerCommand::Quit);
        assert_eq!(
            PlayerCommand::from_key(KeyCode::Char('c'), KeyModifiers::CONTROL),
            PlayerCommand::Quit
        );
        assert_eq!(PlayerCommand::from_key(KeyCode::Char('x'), none), PlayerCommand::Continue);
    }

    #[test]
    fn test_spectrum_columns_take_peaks() {
        let mut bins = vec![0u8; 16];
        bins[1] = 200;
        bins[6] = 40;
        let mut out = Vec::new();
        spectrum_columns(&bins, 4, &mut out);
        assert_eq!(out, vec![200, 0, 0, 40]);
    }

    #[test]
    fn test_spectrum_columns_wider_than_bins() {
        let bins = [10u8, 20, 30, 40];
        let mut out = Vec::new();
        spectrum_columns(&bins, 5, &mut out);
        assert_eq!(out.len(), 5);
        assert!(out.iter().all(|&v| v == 10 || v == 20));
        spectrum_columns(&[], 3, &mut out);
        assert_eq!(out, vec![0, 0, 0]);
    }
}
