use serde::{Deserialize, Serialize};

/// Normalized event decoded from one generation stream line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GenStreamEvent {
    Text { text: String },
    Error { message: String },
    Done,
}

impl GenStreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error { .. } | Self::Done)
    }
}
