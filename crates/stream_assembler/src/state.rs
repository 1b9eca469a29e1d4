/// Lifecycle of one stream session.
///
/// `Idle → Started → Accumulating → {StopDetected | Completed | Errored} → Finalized`.
/// Cancellation moves any non-terminal state straight to `Finalized`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamState {
    Idle,
    Started,
    Accumulating,
    StopDetected,
    Completed,
    Errored,
    Finalized,
}

impl StreamState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Started => "started",
            Self::Accumulating => "accumulating",
            Self::StopDetected => "stop_detected",
            Self::Completed => "completed",
            Self::Errored => "errored",
            Self::Finalized => "finalized",
        }
    }

    /// True while chunk events are still applied.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Started | Self::Accumulating)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::StopDetected | Self::Completed | Self::Errored)
    }
}

impl std::fmt::Display for StreamState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
