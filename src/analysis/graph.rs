//! Audio processing context and its node graph.
//!
//! The graph has three nodes: the wrapped element (`Source`), the `Analyser`
//! and the `Destination`. The destination is either the default output device,
//! which follows the element's playhead and is audible only while exactly one
//! source-to-destination path exists, or a null sink for headless runs.

use anyhow::anyhow;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[cfg(target_os = "linux")]
use std::fs::OpenOptions;
#[cfg(target_os = "linux")]
use std::os::unix::io::AsRawFd;

use crate::config::OutputMode;
use crate::error::{Result, VisualizerError};
use crate::media::Playhead;

/// Allowed drift between the output read head and the element cursor, in seconds.
const RESYNC_THRESHOLD_SECS: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Suspended,
    Running,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeId {
    Source,
    Analyser,
    Destination,
}

enum Destination {
    Device(DeviceOutput),
    Null,
}

struct DeviceOutput {
    stream: cpal::Stream,
}

/// Lazily created processing context; closed exactly once.
pub struct AudioContext {
    state: ContextState,
    edges: Vec<(NodeId, NodeId)>,
    destination: Destination,
    /// Set while exactly one source-to-destination path exists
    routed: Arc<AtomicBool>,
    /// Signal the destination plays, once a source node exists
    source: Arc<Mutex<Option<Playhead>>>,
}

impl AudioContext {
    /// Creates a suspended context.
    ///
    /// # Errors
    /// - `UnsupportedEnvironment` if audio processing is unavailable or the
    ///   output device cannot be opened
    pub fn new(output: OutputMode, available: bool) -> Result<Self> {
        if !available {
            return Err(VisualizerError::UnsupportedEnvironment(
                "Audio processing is not supported on this host.".to_string(),
            ));
        }

        let routed = Arc::new(AtomicBool::new(false));
        let source: Arc<Mutex<Option<Playhead>>> = Arc::new(Mutex::new(None));

        let destination = match output {
            OutputMode::Headless => Destination::Null,
            OutputMode::Device => {
                let stream = open_output_stream(Arc::clone(&routed), Arc::clone(&source))
                    .map_err(|e| VisualizerError::UnsupportedEnvironment(e.to_string()))?;
                Destination::Device(DeviceOutput { stream })
            }
        };
        tracing::debug!("Audio context created ({} destination)", output);

        Ok(Self {
            state: ContextState::Suspended,
            edges: Vec::new(),
            destination,
            routed,
            source,
        })
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    /// Starts the destination.
    ///
    /// # Errors
    /// - `UnsupportedEnvironment` if the context is closed or the device refuses to start
    pub fn resume(&mut self) -> Result<()> {
        match self.state {
            ContextState::Running => Ok(()),
            ContextState::Closed => Err(VisualizerError::UnsupportedEnvironment(
                "Audio context is closed.".to_string(),
            )),
            ContextState::Suspended => {
                if let Destination::Device(output) = &self.destination {
                    output.stream.play().map_err(|e| {
                        VisualizerError::UnsupportedEnvironment(format!(
                            "Audio output could not start: {e}"
                        ))
                    })?;
                }
                self.state = ContextState::Running;
                tracing::debug!("Audio context running");
                Ok(())
            }
        }
    }

    /// Releases the destination. Returns `false` if already closed.
    pub fn close(&mut self) -> bool {
        if self.state == ContextState::Closed {
            return false;
        }
        self.edges.clear();
        self.update_routing();
        self.destination = Destination::Null;
        self.state = ContextState::Closed;
        tracing::debug!("Audio context closed");
        true
    }

    /// Registers the signal behind the `Source` node.
    pub fn set_source(&mut self, playhead: Playhead) {
        if let Ok(mut slot) = self.source.lock() {
            *slot = Some(playhead);
        }
    }

    /// Adds an edge; connecting the same pair twice has no effect.
    pub fn connect(&mut self, from: NodeId, to: NodeId) {
        if self.state == ContextState::Closed || from == to {
            return;
        }
        if !self.edges.contains(&(from, to)) {
            self.edges.push((from, to));
        }
        self.update_routing();
    }

    /// Removes every outgoing edge of `node`.
    pub fn disconnect(&mut self, node: NodeId) {
        self.edges.retain(|(from, _)| *from != node);
        self.update_routing();
    }

    /// Number of distinct source-to-destination paths.
    pub fn live_paths(&self) -> usize {
        self.count_paths(NodeId::Source, &mut Vec::new())
    }

    fn count_paths(&self, node: NodeId, visiting: &mut Vec<NodeId>) -> usize {
        if node == NodeId::Destination {
            return 1;
        }
        if visiting.contains(&node) {
            return 0;
        }
        visiting.push(node);
        let total = self
            .edges
            .iter()
            .filter(|(from, _)| *from == node)
            .map(|(_, to)| self.count_paths(*to, visiting))
            .sum();
        visiting.pop();
        total
    }

    fn update_routing(&self) {
        self.routed.store(self.live_paths() == 1, Ordering::Release);
    }
}

impl Drop for AudioContext {
    fn drop(&mut self) {
        self.close();
    }
}

/// Opens the default output device with a stream that follows the source playhead.
fn open_output_stream(
    routed: Arc<AtomicBool>,
    source: Arc<Mutex<Option<Playhead>>>,
) -> anyhow::Result<cpal::Stream> {
    let device = suppress_alsa_warnings(|| {
        cpal::default_host()
            .default_output_device()
            .ok_or_else(|| anyhow!("No audio output device available"))
    })?;
    let device_name = device
        .name()
        .unwrap_or_else(|_| "Unknown device".to_string());
    tracing::info!("Output device: {}", device_name);

    let supported = device.default_output_config()?;
    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();
    tracing::debug!(
        "Output configuration: {}Hz, {} channels, {:?}",
        config.sample_rate.0,
        config.channels,
        sample_format
    );

    let stream = match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, routed, source)?,
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, routed, source)?,
        cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, routed, source)?,
        other => return Err(anyhow!("Unsupported output sample format {other:?}")),
    };
    // Some hosts start streams immediately; the context starts suspended.
    if let Err(e) = stream.pause() {
        tracing::debug!("Output stream could not be paused: {}", e);
    }
    Ok(stream)
}

/// Runs `f` with stderr redirected to /dev/null.
///
/// ALSA prints configuration noise to stderr while enumerating devices, which
/// would corrupt the terminal UI.
#[cfg(target_os = "linux")]
pub(crate) fn suppress_alsa_warnings<F, T>(f: F) -> anyhow::Result<T>
where
    F: FnOnce() -> anyhow::Result<T>,
{
    let dev_null = OpenOptions::new()
        .write(true)
        .open("/dev/null")
        .map_err(|e| anyhow!("Failed to open /dev/null: {e}"))?;

    let saved = unsafe { libc::dup(libc::STDERR_FILENO) };
    if saved == -1 {
        return Err(anyhow!("Failed to duplicate stderr"));
    }
    if unsafe { libc::dup2(dev_null.as_raw_fd(), libc::STDERR_FILENO) } == -1 {
        unsafe { libc::close(saved) };
        return Err(anyhow!("Failed to redirect stderr"));
    }

    let result = f();

    unsafe {
        libc::dup2(saved, libc::STDERR_FILENO);
        libc::close(saved);
    }
    result
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn suppress_alsa_warnings<F, T>(f: F) -> anyhow::Result<T>
where
    F: FnOnce() -> anyhow::Result<T>,
{
    f()
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    routed: Arc<AtomicBool>,
    source: Arc<Mutex<Option<Playhead>>>,
) -> anyhow::Result<cpal::Stream>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels = config.channels as usize;
    let device_rate = config.sample_rate.0 as f64;
    let mut read_head: f64 = 0.0;

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            let guard = source.try_lock();
            let playhead = match &guard {
                Ok(slot) if routed.load(Ordering::Acquire) => slot.as_ref(),
                _ => None,
            };
            match playhead {
                Some(playhead) if playhead.is_playing() => {
                    let track = playhead.track();
                    let track_rate = track.sample_rate() as f64;
                    let cursor = playhead.frame() as f64;
                    if (read_head - cursor).abs() > track_rate * RESYNC_THRESHOLD_SECS {
                        read_head = cursor;
                    }
                    let step = track_rate / device_rate;
                    for frame in data.chunks_mut(channels) {
                        let (left, right) = track.frame(read_head as u64);
                        for (ch, sample) in frame.iter_mut().enumerate() {
                            let value = match (channels, ch) {
                                (1, _) => (left + right) * 0.5,
                                (_, 0) => left,
                                (_, 1) => right,
                                _ => 0.0,
                            };
                            *sample = T::from_sample(value);
                        }
                        read_head += step;
                    }
                }
                _ => data.fill(T::EQUILIBRIUM),
            }
        },
        |err| {
            tracing::error!("Audio output stream error: {}", err);
        },
        None,
    )?;
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headless() -> AudioContext {
        AudioContext::new(OutputMode::Headless, true).unwrap()
    }

    #[test]
    fn test_unavailable_host_is_unsupported() {
        assert!(matches!(
            AudioContext::new(OutputMode::Headless, false),
            Err(VisualizerError::UnsupportedEnvironment(_))
        ));
    }

    #[test]
    fn test_starts_suspended_and_resumes() {
        let mut ctx = headless();
        assert_eq!(ctx.state(), ContextState::Suspended);
        ctx.resume().unwrap();
        assert_eq!(ctx.state(), ContextState::Running);
        ctx.resume().unwrap();
        assert_eq!(ctx.state(), ContextState::Running);
    }

    #[test]
    fn test_duplicate_connections_do_not_fan_out() {
        let mut ctx = headless();
        ctx.connect(NodeId::Source, NodeId::Analyser);
        ctx.connect(NodeId::Analyser, NodeId::Destination);
        ctx.connect(NodeId::Source, NodeId::Analyser);
        ctx.connect(NodeId::Analyser, NodeId::Destination);
        assert_eq!(ctx.live_paths(), 1);
        assert!(ctx.routed.load(Ordering::Acquire));
    }

    #[test]
    fn test_direct_edge_would_double_playback() {
        let mut ctx = headless();
        ctx.connect(NodeId::Source, NodeId::Analyser);
        ctx.connect(NodeId::Analyser, NodeId::Destination);
        ctx.connect(NodeId::Source, NodeId::Destination);
        assert_eq!(ctx.live_paths(), 2);
        assert!(!ctx.routed.load(Ordering::Acquire));

        ctx.disconnect(NodeId::Source);
        assert_eq!(ctx.live_paths(), 0);
    }

    #[test]
    fn test_close_is_final_and_idempotent() {
        let mut ctx = headless();
        ctx.connect(NodeId::Source, NodeId::Destination);
        assert!(ctx.close());
        assert!(!ctx.close());
        assert_eq!(ctx.live_paths(), 0);
        assert!(ctx.resume().is_err());
        ctx.connect(NodeId::Source, NodeId::Destination);
        assert_eq!(ctx.live_paths(), 0);
    }
}
