use std::time::Instant;

/// Kind of an incremental unit delivered by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    Start,
    Token,
    Error,
    Done,
}

/// One transport-delivered event. Consumed exactly once by the assembler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkEvent {
    pub kind: ChunkKind,
    /// Monotonic per stream, starting at 0.
    pub sequence: u64,
    pub content: String,
    pub timestamp: Instant,
}

impl ChunkEvent {
    #[must_use]
    pub fn start(sequence: u64) -> Self {
        Self::new(ChunkKind::Start, sequence, String::new())
    }

    #[must_use]
    pub fn token(sequence: u64, content: impl Into<String>) -> Self {
        Self::new(ChunkKind::Token, sequence, content)
    }

    #[must_use]
    pub fn error(sequence: u64, message: impl Into<String>) -> Self {
        Self::new(ChunkKind::Error, sequence, message)
    }

    #[must_use]
    pub fn done(sequence: u64) -> Self {
        Self::new(ChunkKind::Done, sequence, String::new())
    }

    fn new(kind: ChunkKind, sequence: u64, content: impl Into<String>) -> Self {
        Self {
            kind,
            sequence,
            content: content.into(),
            timestamp: Instant::now(),
        }
    }

    /// Returns true when this event ends the stream.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, ChunkKind::Error | ChunkKind::Done)
    }
}
