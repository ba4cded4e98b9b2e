//! In-memory encoder for state machine tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use super::encoder::{EncoderEvent, EncoderFactory, EncoderState, MimeType, StreamEncoder};
use super::stream::MediaStream;
use crate::error::{Result, VisualizerError};

/// State shared between a test and the encoders it hands out.
#[derive(Default)]
pub struct FakeShared {
    /// Deliver a chunk at every timeslice boundary while recording
    pub deliver_chunks: bool,
    pub created: usize,
    pub stop_calls: usize,
    /// Pumps that read a frame from every captured track
    pub frames_read: usize,
    pub timeslice: Option<Duration>,
    pub chunks_delivered: usize,
}

pub struct FakeFactory {
    pub available: bool,
    pub fail_create: bool,
    pub shared: Rc<RefCell<FakeShared>>,
}

impl FakeFactory {
    pub fn delivering() -> Self {
        let factory = Self::silent();
        factory.shared.borrow_mut().deliver_chunks = true;
        factory
    }

    pub fn silent() -> Self {
        Self {
            available: true,
            fail_create: false,
            shared: Rc::new(RefCell::new(FakeShared::default())),
        }
    }
}

impl EncoderFactory for FakeFactory {
    fn is_available(&self) -> bool {
        self.available
    }

    fn create(&self, stream: MediaStream, mime_type: &MimeType) -> Result<Box<dyn StreamEncoder>> {
        if self.fail_create {
            return Err(VisualizerError::EncoderStartFailure("codec rejected".to_string()));
        }
        if stream.video.is_empty() || stream.audio.is_empty() {
            return Err(VisualizerError::EncoderStartFailure("incomplete stream".to_string()));
        }
        self.shared.borrow_mut().created += 1;
        Ok(Box::new(FakeEncoder {
            mime_type: mime_type.clone(),
            stream,
            shared: Rc::clone(&self.shared),
            state: EncoderState::Inactive,
            events: VecDeque::new(),
            timeslice: Duration::from_millis(250),
            next_flush: Duration::ZERO,
            stopping: false,
        }))
    }
}

pub struct FakeEncoder {
    mime_type: MimeType,
    stream: MediaStream,
    shared: Rc<RefCell<FakeShared>>,
    state: EncoderState,
    events: VecDeque<EncoderEvent>,
    timeslice: Duration,
    next_flush: Duration,
    stopping: bool,
}

impl StreamEncoder for FakeEncoder {
    fn mime_type(&self) -> &MimeType {
        &self.mime_type
    }

    fn state(&self) -> EncoderState {
        self.state
    }

    fn start(&mut self, timeslice: Duration, now: Duration) -> Result<()> {
        self.state = EncoderState::Recording;
        self.timeslice = timeslice;
        self.next_flush = now + timeslice;
        self.shared.borrow_mut().timeslice = Some(timeslice);
        Ok(())
    }

    fn pump(&mut self, now: Duration) {
        if self.state == EncoderState::Recording {
            for track in &mut self.stream.video {
                track.read_frame();
            }
            let mut pcm = Vec::new();
            for track in &mut self.stream.audio {
                track.pull(1, &mut pcm);
            }
            let mut shared = self.shared.borrow_mut();
            shared.frames_read += 1;
            while now >= self.next_flush {
                self.next_flush += self.timeslice;
                if shared.deliver_chunks {
                    shared.chunks_delivered += 1;
                    self.events.push_back(EncoderEvent::DataAvailable(b"webm".to_vec()));
                }
            }
        } else if self.stopping {
            // Completion arrives one pump after the stop request.
            self.stopping = false;
            if self.shared.borrow().deliver_chunks {
                self.events.push_back(EncoderEvent::DataAvailable(b"tail".to_vec()));
            }
            self.events.push_back(EncoderEvent::Stop);
        }
    }

    fn stop(&mut self) {
        if self.state == EncoderState::Recording {
            self.state = EncoderState::Inactive;
            self.stopping = true;
            self.shared.borrow_mut().stop_calls += 1;
        }
    }

    fn poll_event(&mut self) -> Option<EncoderEvent> {
        self.events.pop_front()
    }

    fn next_deadline(&self) -> Option<Duration> {
        match self.state {
            EncoderState::Recording => Some(self.next_flush),
            EncoderState::Inactive if self.stopping => Some(Duration::ZERO),
            EncoderState::Inactive => None,
        }
    }
}
