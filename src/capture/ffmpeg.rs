//! FFmpeg locator and the ffmpeg-backed stream encoder.
//!
//! The encoder runs one ffmpeg child per recording. Raw RGBA frames go to its
//! stdin, interleaved `f32le` stereo PCM goes through a named pipe, and the
//! WebM it writes to stdout is batched into chunks every timeslice. Pipe I/O
//! happens on helper threads; the event loop only touches channels.

use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TryRecvError, TrySendError};
use regex::Regex;
use std::collections::{HashSet, VecDeque};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use super::encoder::{EncoderEvent, EncoderFactory, EncoderState, MimeType, StreamEncoder};
use super::stream::{AudioTrack, MediaStream, VideoTrack};
use crate::config::RecordingConfig;
use crate::error::VisualizerError;

/// Frames the event loop may queue ahead of the video writer.
const VIDEO_QUEUE_DEPTH: usize = 4;
/// Audio blocks (one per pump) queued ahead of the FIFO writer.
const AUDIO_QUEUE_DEPTH: usize = 32;
/// Stdout read size.
const READ_CHUNK: usize = 64 * 1024;
/// Polling interval while waiting for ffmpeg to finish.
const FINISH_POLL: Duration = Duration::from_millis(10);

static PIPE_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Locates the ffmpeg binary, preferring a configured path.
///
/// Checks in this order:
/// 1. The configured path, if any
/// 2. Standard installation locations for the platform
/// 3. PATH search via `which` or `where`
///
/// # Errors
/// - If the configured path does not exist
/// - If ffmpeg cannot be found anywhere
pub fn find_ffmpeg(configured: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = configured {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        return Err(anyhow!("Configured ffmpeg not found at {}", path.display()));
    }

    let candidates = if cfg!(target_os = "macos") {
        vec![
            PathBuf::from("/opt/homebrew/bin/ffmpeg"),
            PathBuf::from("/usr/local/bin/ffmpeg"),
            PathBuf::from("/usr/bin/ffmpeg"),
        ]
    } else if cfg!(target_os = "linux") {
        vec![
            PathBuf::from("/usr/bin/ffmpeg"),
            PathBuf::from("/usr/local/bin/ffmpeg"),
            PathBuf::from("/snap/bin/ffmpeg"),
        ]
    } else if cfg!(target_os = "windows") {
        vec![
            PathBuf::from("C:\\ffmpeg\\bin\\ffmpeg.exe"),
            PathBuf::from("C:\\Program Files\\ffmpeg\\bin\\ffmpeg.exe"),
        ]
    } else {
        vec![]
    };

    for path in candidates {
        if path.exists() {
            tracing::debug!("Found ffmpeg at: {}", path.display());
            return Ok(path);
        }
    }

    let ffmpeg_path = find_in_path("ffmpeg").map_err(|_| {
        anyhow!(
            "ffmpeg not found. Please install ffmpeg:\n\
             macOS: brew install ffmpeg\n\
             Linux: apt install ffmpeg (Debian/Ubuntu) or dnf install ffmpeg (Fedora)\n\
             Windows: Download from https://ffmpeg.org/download.html"
        )
    })?;
    tracing::debug!("Found ffmpeg in PATH at: {}", ffmpeg_path.display());
    Ok(ffmpeg_path)
}

/// Searches for a binary in the system PATH.
pub(crate) fn find_in_path(binary_name: &str) -> Result<PathBuf> {
    let search_cmd = if cfg!(target_os = "windows") {
        "where"
    } else {
        "which"
    };

    let output = Command::new(search_cmd)
        .arg(binary_name)
        .output()
        .map_err(|e| anyhow!("Failed to search PATH for {binary_name}: {e}"))?;

    if output.status.success() {
        let path_str = String::from_utf8_lossy(&output.stdout);
        let path = PathBuf::from(path_str.lines().next().unwrap_or_default().trim());
        if !path.as_os_str().is_empty() {
            return Ok(path);
        }
    }

    Err(anyhow!("{binary_name} not found in PATH"))
}

/// Lists the encoder names the ffmpeg binary was built with.
///
/// # Errors
/// - If ffmpeg cannot be run
pub fn supported_encoders(ffmpeg: &Path) -> Result<HashSet<String>> {
    let output = Command::new(ffmpeg)
        .args(["-hide_banner", "-encoders"])
        .output()
        .map_err(|e| anyhow!("Failed to run {}: {e}", ffmpeg.display()))?;
    if !output.status.success() {
        return Err(anyhow!(
            "ffmpeg -encoders failed: {}",
            String::from_utf8_lossy(&output.stderr)
        ));
    }
    Ok(parse_encoders(&String::from_utf8_lossy(&output.stdout)))
}

fn parse_encoders(listing: &str) -> HashSet<String> {
    let Ok(line) = Regex::new(r"(?m)^\s*[VAS][A-Z.]{5}\s+([A-Za-z0-9_\-]+)\s") else {
        return HashSet::new();
    };
    line.captures_iter(listing)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// ffmpeg encoder implementing a mime codec name.
fn codec_encoder(codec: &str) -> Option<&'static str> {
    match codec {
        "vp9" | "vp09" => Some("libvpx-vp9"),
        "vp8" => Some("libvpx"),
        "opus" => Some("libopus"),
        "vorbis" => Some("libvorbis"),
        _ => None,
    }
}

/// ffmpeg encoders needed for `mime`, video first.
///
/// A mime type without codecs gets the WebM defaults.
fn required_encoders(mime: &MimeType) -> Option<(&'static str, &'static str)> {
    if mime.container() != "webm" {
        return None;
    }
    let video = codec_encoder(mime.video_codec().unwrap_or("vp9"))?;
    let audio = codec_encoder(mime.audio_codec().unwrap_or("opus"))?;
    Some((video, audio))
}

/// Whether recording with the configured mime type is possible on this host.
pub fn encoder_available(config: &RecordingConfig) -> bool {
    FfmpegEncoderFactory::detect(config).is_available()
}

/// Builds ffmpeg encoders for the configured mime type.
pub struct FfmpegEncoderFactory {
    ffmpeg: Option<PathBuf>,
    encoders: HashSet<String>,
    mime_type: Option<MimeType>,
}

impl FfmpegEncoderFactory {
    /// Locates ffmpeg and lists its encoders. Failures leave the factory unavailable.
    pub fn detect(config: &RecordingConfig) -> Self {
        let mime_type = MimeType::parse(&config.mime_type).ok();
        let ffmpeg = match find_ffmpeg(config.ffmpeg_path.as_deref()) {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::warn!("{}", e);
                None
            }
        };
        let encoders = match &ffmpeg {
            Some(path) => supported_encoders(path).unwrap_or_else(|e| {
                tracing::warn!("Could not list ffmpeg encoders: {}", e);
                HashSet::new()
            }),
            None => HashSet::new(),
        };
        Self {
            ffmpeg,
            encoders,
            mime_type,
        }
    }

    fn supports(&self, mime: &MimeType) -> Option<(&'static str, &'static str)> {
        let (video, audio) = required_encoders(mime)?;
        if self.encoders.contains(video) && self.encoders.contains(audio) {
            Some((video, audio))
        } else {
            None
        }
    }
}

impl EncoderFactory for FfmpegEncoderFactory {
    fn is_available(&self) -> bool {
        match (&self.ffmpeg, &self.mime_type) {
            (Some(_), Some(mime)) => self.supports(mime).is_some(),
            _ => false,
        }
    }

    fn create(
        &self,
        stream: MediaStream,
        mime_type: &MimeType,
    ) -> crate::error::Result<Box<dyn StreamEncoder>> {
        let ffmpeg = self.ffmpeg.clone().ok_or_else(|| {
            VisualizerError::EncoderStartFailure("ffmpeg is not installed".to_string())
        })?;
        let (video_encoder, audio_encoder) = self.supports(mime_type).ok_or_else(|| {
            VisualizerError::EncoderStartFailure(format!("{mime_type} is not supported by ffmpeg"))
        })?;
        let MediaStream { video, audio } = stream;
        let video = video.into_iter().next().ok_or_else(|| {
            VisualizerError::EncoderStartFailure("Stream has no video track".to_string())
        })?;
        let audio = audio.into_iter().next().ok_or_else(|| {
            VisualizerError::EncoderStartFailure("Stream has no audio track".to_string())
        })?;

        Ok(Box::new(FfmpegEncoder {
            ffmpeg,
            mime_type: mime_type.clone(),
            video_encoder,
            audio_encoder,
            video,
            audio,
            state: EncoderState::Inactive,
            pipeline: None,
            output: OutputBatcher::new(),
            started_at: Duration::ZERO,
            last_pump: Duration::ZERO,
            frames_sent: 0,
            audio_pacer: AudioPacer::default(),
        }))
    }
}

/// Messages from the helper threads.
enum PipeOutput {
    Data(Vec<u8>),
    Diagnostics(String),
    Failed(String),
    Eof,
}

/// A running ffmpeg child and its helper threads.
struct Pipeline {
    child: Child,
    video_tx: Option<Sender<Vec<u8>>>,
    recycled_rx: Receiver<Vec<u8>>,
    audio_tx: Option<Sender<Vec<u8>>>,
    output_rx: Receiver<PipeOutput>,
    audio_pipe: PathBuf,
    threads: Vec<JoinHandle<()>>,
}

impl Pipeline {
    fn spawn(
        ffmpeg: &Path,
        video: &VideoTrack,
        audio: &AudioTrack,
        video_encoder: &str,
        audio_encoder: &str,
    ) -> Result<Self> {
        let audio_pipe = std::env::temp_dir().join(format!(
            "wavereel_{}_{}.pcm",
            std::process::id(),
            PIPE_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        make_fifo(&audio_pipe)?;

        let mut cmd = Command::new(ffmpeg);
        cmd.args(["-hide_banner", "-loglevel", "error", "-nostdin"])
            .args(["-thread_queue_size", "512"])
            .args(["-f", "rawvideo", "-pix_fmt", "rgba"])
            .arg("-s")
            .arg(format!("{}x{}", video.width(), video.height()))
            .arg("-r")
            .arg(video.frame_rate().to_string())
            .args(["-i", "pipe:0"])
            .args(["-thread_queue_size", "512"])
            .args(["-f", "f32le"])
            .arg("-ar")
            .arg(audio.sample_rate().to_string())
            .arg("-ac")
            .arg(audio.channels().to_string())
            .arg("-i")
            .arg(&audio_pipe)
            .args(["-map", "0:v", "-map", "1:a"])
            .args(["-c:v", video_encoder, "-pix_fmt", "yuv420p"])
            .args(["-deadline", "realtime", "-cpu-used", "8", "-b:v", "4M"])
            .args(["-c:a", audio_encoder, "-b:a", "128k"])
            .args(["-f", "webm", "-flush_packets", "1", "pipe:1"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                let _ = std::fs::remove_file(&audio_pipe);
                return Err(anyhow!("Failed to launch ffmpeg: {e}"));
            }
        };
        tracing::info!(
            "ffmpeg encoder started (pid {}, {}x{} @ {}fps, {}Hz)",
            child.id(),
            video.width(),
            video.height(),
            video.frame_rate(),
            audio.sample_rate()
        );

        let (Some(mut stdin), Some(mut stdout), Some(mut stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            let _ = child.kill();
            let _ = std::fs::remove_file(&audio_pipe);
            return Err(anyhow!("ffmpeg pipes unavailable"));
        };

        let (output_tx, output_rx) = unbounded::<PipeOutput>();
        let (video_tx, video_rx) = bounded::<Vec<u8>>(VIDEO_QUEUE_DEPTH);
        let (recycled_tx, recycled_rx) = bounded::<Vec<u8>>(VIDEO_QUEUE_DEPTH);
        let (audio_tx, audio_rx) = bounded::<Vec<u8>>(AUDIO_QUEUE_DEPTH);
        let mut threads = Vec::new();

        let failures = output_tx.clone();
        threads.push(std::thread::spawn(move || {
            for frame in video_rx {
                if let Err(e) = stdin.write_all(&frame) {
                    let _ = failures.send(PipeOutput::Failed(format!("Video pipe closed: {e}")));
                    break;
                }
                let _ = recycled_tx.try_send(frame);
            }
        }));

        let failures = output_tx.clone();
        let pipe_path = audio_pipe.clone();
        threads.push(std::thread::spawn(move || {
            let mut pipe = match std::fs::OpenOptions::new().write(true).open(&pipe_path) {
                Ok(pipe) => pipe,
                Err(e) => {
                    let _ = failures.send(PipeOutput::Failed(format!("Audio pipe unavailable: {e}")));
                    return;
                }
            };
            for block in audio_rx {
                if let Err(e) = pipe.write_all(&block) {
                    let _ = failures.send(PipeOutput::Failed(format!("Audio pipe closed: {e}")));
                    break;
                }
            }
        }));

        let data = output_tx.clone();
        threads.push(std::thread::spawn(move || {
            let mut buf = vec![0u8; READ_CHUNK];
            loop {
                match stdout.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if data.send(PipeOutput::Data(buf[..n].to_vec())).is_err() {
                            return;
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        tracing::warn!("ffmpeg stdout read failed: {}", e);
                        break;
                    }
                }
            }
            let _ = data.send(PipeOutput::Eof);
        }));

        threads.push(std::thread::spawn(move || {
            let mut text = String::new();
            if stderr.read_to_string(&mut text).is_ok() && !text.trim().is_empty() {
                let _ = output_tx.send(PipeOutput::Diagnostics(text));
            }
        }));

        Ok(Self {
            child,
            video_tx: Some(video_tx),
            recycled_rx,
            audio_tx: Some(audio_tx),
            output_rx,
            audio_pipe,
            threads,
        })
    }

    /// Closes both inputs so ffmpeg flushes and exits.
    fn close_inputs(&mut self) {
        self.video_tx = None;
        self.audio_tx = None;
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.close_inputs();
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
        release_fifo(&self.audio_pipe);
        let _ = std::fs::remove_file(&self.audio_pipe);
        for handle in self.threads.drain(..) {
            if handle.is_finished() {
                let _ = handle.join();
            }
        }
    }
}

/// What one drain of the helper channel turned up.
#[derive(Debug, Default, PartialEq, Eq)]
struct Drained {
    eof: bool,
    /// First pipe failure seen, if any
    failure: Option<String>,
}

/// Groups encoder output into one chunk per timeslice and queues the events.
struct OutputBatcher {
    timeslice: Duration,
    next_flush: Duration,
    /// Output bytes not yet delivered as a chunk
    pending: Vec<u8>,
    events: VecDeque<EncoderEvent>,
    stopped: bool,
}

impl OutputBatcher {
    fn new() -> Self {
        Self {
            timeslice: Duration::from_millis(250),
            next_flush: Duration::ZERO,
            pending: Vec::new(),
            events: VecDeque::new(),
            stopped: false,
        }
    }

    fn start(&mut self, timeslice: Duration, now: Duration) {
        self.timeslice = timeslice.max(Duration::from_millis(1));
        self.next_flush = now + self.timeslice;
        self.pending.clear();
        self.stopped = false;
    }

    fn drain(&mut self, output: &Receiver<PipeOutput>) -> Drained {
        let mut drained = Drained::default();
        loop {
            match output.try_recv() {
                Ok(PipeOutput::Data(bytes)) => self.pending.extend_from_slice(&bytes),
                Ok(PipeOutput::Diagnostics(text)) => {
                    tracing::warn!("ffmpeg: {}", text.trim());
                }
                Ok(PipeOutput::Failed(message)) => {
                    if drained.failure.is_none() {
                        drained.failure = Some(message);
                    } else {
                        tracing::debug!("Further pipe failure: {}", message);
                    }
                }
                Ok(PipeOutput::Eof) => drained.eof = true,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    drained.eof = true;
                    break;
                }
            }
        }
        drained
    }

    /// Delivers pending bytes once the current timeslice has elapsed.
    fn tick(&mut self, now: Duration) {
        if now < self.next_flush {
            return;
        }
        self.flush();
        while self.next_flush <= now {
            self.next_flush += self.timeslice;
        }
    }

    fn flush(&mut self) {
        if !self.pending.is_empty() {
            self.events
                .push_back(EncoderEvent::DataAvailable(std::mem::take(&mut self.pending)));
        }
    }

    /// Flushes the tail and queues `Stop`, at most once per recording.
    fn finish(&mut self) {
        self.flush();
        if !self.stopped {
            self.stopped = true;
            self.events.push_back(EncoderEvent::Stop);
        }
    }

    fn fail(&mut self, message: String) {
        self.events.push_back(EncoderEvent::Error(message));
    }

    fn pop(&mut self) -> Option<EncoderEvent> {
        self.events.pop_front()
    }

    fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    fn next_flush(&self) -> Duration {
        self.next_flush
    }
}

/// Audio frames handed to the FIFO writer.
///
/// A block refused by a full queue is held and offered again before any new
/// audio is pulled, so nothing is skipped when the writer stalls.
#[derive(Default)]
struct AudioPacer {
    sent: u64,
    held: Option<(Vec<u8>, u64)>,
}

impl AudioPacer {
    fn reset(&mut self) {
        self.sent = 0;
        self.held = None;
    }

    /// Sends the audio owed up to `due` frames; `pull` encodes that many frames.
    fn feed(&mut self, tx: &Sender<Vec<u8>>, due: u64, pull: impl FnOnce(usize) -> Vec<u8>) {
        if let Some((block, frames)) = self.held.take() {
            if !self.offer(tx, block, frames) {
                return;
            }
        }
        let owed = due.saturating_sub(self.sent);
        if owed > 0 {
            let block = pull(owed as usize);
            self.offer(tx, block, owed);
        }
    }

    fn offer(&mut self, tx: &Sender<Vec<u8>>, block: Vec<u8>, frames: u64) -> bool {
        match tx.try_send(block) {
            Ok(()) => {
                self.sent += frames;
                true
            }
            Err(TrySendError::Full(block)) => {
                self.held = Some((block, frames));
                false
            }
            // The writer is gone; the pipe failure is reported on the output channel.
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

pub struct FfmpegEncoder {
    ffmpeg: PathBuf,
    mime_type: MimeType,
    video_encoder: &'static str,
    audio_encoder: &'static str,
    video: VideoTrack,
    audio: AudioTrack,
    state: EncoderState,
    pipeline: Option<Pipeline>,
    output: OutputBatcher,
    started_at: Duration,
    last_pump: Duration,
    frames_sent: u64,
    audio_pacer: AudioPacer,
}

impl FfmpegEncoder {
    fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.video.frame_rate().max(1)))
    }

    fn finish(&mut self) {
        self.pipeline = None;
        self.state = EncoderState::Inactive;
        self.output.finish();
    }

    fn feed(&mut self, now: Duration) {
        let Some(pipeline) = self.pipeline.as_mut() else {
            return;
        };
        let elapsed = now.saturating_sub(self.started_at).as_secs_f64();

        let fps = f64::from(self.video.frame_rate().max(1));
        let due_frames = (elapsed * fps).floor() as u64 + 1;
        let max_debt = u64::from(self.video.frame_rate()) * 2;
        if due_frames.saturating_sub(self.frames_sent) > max_debt {
            tracing::warn!(
                "Encoder fell behind, dropping {} frames",
                due_frames - self.frames_sent - 1
            );
            self.frames_sent = due_frames - 1;
        }
        if let Some(video_tx) = &pipeline.video_tx {
            while self.frames_sent < due_frames {
                let pixels = self.video.read_frame();
                let mut frame = pipeline.recycled_rx.try_recv().unwrap_or_default();
                frame.clear();
                frame.extend_from_slice(pixels);
                match video_tx.try_send(frame) {
                    Ok(()) => self.frames_sent += 1,
                    // The writer is busy; owed frames go out on later pumps.
                    Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => break,
                }
            }
        }

        let due_audio = (elapsed * f64::from(self.audio.sample_rate())) as u64;
        if let Some(audio_tx) = &pipeline.audio_tx {
            let audio = &mut self.audio;
            self.audio_pacer.feed(audio_tx, due_audio, |frames| {
                let mut pcm = Vec::with_capacity(frames * audio.channels());
                audio.pull(frames, &mut pcm);
                pcm.iter().flat_map(|s| s.to_le_bytes()).collect()
            });
        }
    }

    fn drain_output(&mut self) -> bool {
        let Some(pipeline) = self.pipeline.as_mut() else {
            return false;
        };
        let drained = self.output.drain(&pipeline.output_rx);
        if let Some(message) = drained.failure {
            if self.state == EncoderState::Recording {
                tracing::error!("Encoder failed: {}", message);
                self.state = EncoderState::Inactive;
                pipeline.close_inputs();
                self.output.fail(message);
            } else {
                tracing::debug!("Encoder pipe closed during flush: {}", message);
            }
        }
        drained.eof
    }
}

impl StreamEncoder for FfmpegEncoder {
    fn mime_type(&self) -> &MimeType {
        &self.mime_type
    }

    fn state(&self) -> EncoderState {
        self.state
    }

    fn start(&mut self, timeslice: Duration, now: Duration) -> crate::error::Result<()> {
        if self.state == EncoderState::Recording {
            return Ok(());
        }
        let pipeline = Pipeline::spawn(
            &self.ffmpeg,
            &self.video,
            &self.audio,
            self.video_encoder,
            self.audio_encoder,
        )
        .map_err(|e| VisualizerError::EncoderStartFailure(e.to_string()))?;
        self.pipeline = Some(pipeline);
        self.state = EncoderState::Recording;
        self.output.start(timeslice, now);
        self.started_at = now;
        self.last_pump = now;
        self.frames_sent = 0;
        self.audio_pacer.reset();
        Ok(())
    }

    fn pump(&mut self, now: Duration) {
        self.last_pump = now;
        if self.state == EncoderState::Recording {
            self.feed(now);
        }
        let eof = self.drain_output();
        self.output.tick(now);

        if eof && self.pipeline.is_some() {
            if let Some(pipeline) = self.pipeline.as_mut() {
                match pipeline.child.wait() {
                    Ok(status) if status.success() => tracing::info!("ffmpeg encoder finished"),
                    Ok(status) => tracing::warn!("ffmpeg exited with {}", status),
                    Err(e) => tracing::warn!("Failed to wait for ffmpeg: {}", e),
                }
            }
            // Pick up diagnostics sent just before exit.
            self.drain_output();
            self.finish();
        }
    }

    fn stop(&mut self) {
        if self.state != EncoderState::Recording {
            return;
        }
        self.state = EncoderState::Inactive;
        match self.pipeline.as_mut() {
            Some(pipeline) => {
                tracing::debug!(
                    "Stopping encoder after {} frames, {} audio frames",
                    self.frames_sent,
                    self.audio_pacer.sent
                );
                pipeline.close_inputs();
            }
            None => self.finish(),
        }
    }

    fn poll_event(&mut self) -> Option<EncoderEvent> {
        self.output.pop()
    }

    fn next_deadline(&self) -> Option<Duration> {
        if self.output.has_events() {
            return Some(self.last_pump);
        }
        match (self.state, &self.pipeline) {
            (EncoderState::Recording, _) => {
                let next_frame = self.started_at + self.frame_interval().mul_f64(self.frames_sent as f64);
                Some(next_frame.min(self.output.next_flush()))
            }
            (EncoderState::Inactive, Some(_)) => Some(self.last_pump + FINISH_POLL),
            (EncoderState::Inactive, None) => None,
        }
    }
}

#[cfg(unix)]
fn make_fifo(path: &Path) -> Result<()> {
    use std::os::unix::ffi::OsStrExt;
    let c_path = std::ffi::CString::new(path.as_os_str().as_bytes())?;
    let rc = unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) };
    if rc != 0 {
        return Err(anyhow!(
            "Failed to create pipe {}: {}",
            path.display(),
            std::io::Error::last_os_error()
        ));
    }
    Ok(())
}

#[cfg(not(unix))]
fn make_fifo(_path: &Path) -> Result<()> {
    Err(anyhow!("Named pipes are not supported on this platform"))
}

/// Opens and closes a read end so a writer blocked in `open` can return.
#[cfg(unix)]
fn release_fifo(path: &Path) {
    use std::os::unix::fs::OpenOptionsExt;
    let _ = std::fs::OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path);
}

#[cfg(not(unix))]
fn release_fifo(_path: &Path) {}
