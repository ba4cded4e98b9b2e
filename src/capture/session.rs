//! The chunk sequence of one recording.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Chunks are being appended
    Recording,
    /// The encoder has stopped; chunks are read-only
    Finalizing,
}

/// Ordered encoded chunks of the recording in progress.
#[derive(Debug)]
pub struct RecordingSession {
    chunks: Vec<Vec<u8>>,
    status: SessionStatus,
    bytes: usize,
}

impl Default for RecordingSession {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingSession {
    pub fn new() -> Self {
        Self {
            chunks: Vec::new(),
            status: SessionStatus::Recording,
            bytes: 0,
        }
    }

    #[cfg(test)]
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Appends a chunk. Empty chunks and chunks arriving after `seal` are
    /// dropped; returns whether the chunk was kept.
    pub fn append(&mut self, chunk: Vec<u8>) -> bool {
        if self.status != SessionStatus::Recording || chunk.is_empty() {
            return false;
        }
        self.bytes += chunk.len();
        self.chunks.push(chunk);
        true
    }

    /// Freezes the chunk sequence.
    pub fn seal(&mut self) {
        self.status = SessionStatus::Finalizing;
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.bytes
    }

    /// Concatenates the chunks in delivery order, consuming the session.
    pub fn assemble(self) -> Vec<u8> {
        let mut blob = Vec::with_capacity(self.bytes);
        for chunk in self.chunks {
            blob.extend_from_slice(&chunk);
        }
        blob
    }
}
