use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::{Duration, OffsetDateTime, UtcOffset};

use crate::error::HistoryStoreError;

pub const CACHE_VERSION: u32 = 1;

/// Fixed-width UTC timestamp; lexical order equals chronological order.
pub const TIMESTAMP_FORMAT: &[FormatItem<'static>] = format_description!(
    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z"
);

/// One question/answer exchange. The timestamp is the turn's identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub question: String,
    pub response: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl ConversationTurn {
    pub fn new(
        question: impl Into<String>,
        response: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            question: question.into(),
            response: response.into(),
            timestamp: timestamp.into(),
            session_id: None,
        }
    }

    #[must_use]
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// Turns ordered newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryView {
    turns: Vec<ConversationTurn>,
}

impl HistoryView {
    /// Builds a view from turns in any order: sorted newest first, one turn
    /// per timestamp (the first seen wins), truncated to `capacity`.
    pub fn from_turns(turns: impl IntoIterator<Item = ConversationTurn>, capacity: usize) -> Self {
        crate::merge::merge(turns, std::iter::empty(), capacity)
    }

    pub(crate) fn from_sorted(turns: Vec<ConversationTurn>) -> Self {
        Self { turns }
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn into_turns(self) -> Vec<ConversationTurn> {
        self.turns
    }

    pub fn get(&self, index: usize) -> Option<&ConversationTurn> {
        self.turns.get(index)
    }

    pub fn newest(&self) -> Option<&ConversationTurn> {
        self.turns.first()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ConversationTurn> {
        self.turns.iter()
    }

    pub(crate) fn turns_mut(&mut self) -> &mut Vec<ConversationTurn> {
        &mut self.turns
    }
}

impl<'a> IntoIterator for &'a HistoryView {
    type Item = &'a ConversationTurn;
    type IntoIter = std::slice::Iter<'a, ConversationTurn>;

    fn into_iter(self) -> Self::IntoIter {
        self.turns.iter()
    }
}

/// On-disk shape of the local cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheFile {
    pub version: u32,
    #[serde(default)]
    pub turns: Vec<ConversationTurn>,
}

pub fn format_timestamp(value: OffsetDateTime) -> Result<String, HistoryStoreError> {
    value
        .to_offset(UtcOffset::UTC)
        .format(TIMESTAMP_FORMAT)
        .map_err(HistoryStoreError::ClockFormat)
}

pub fn parse_timestamp(value: &str) -> Result<OffsetDateTime, HistoryStoreError> {
    OffsetDateTime::parse(value.trim(), &Rfc3339).map_err(|error| {
        HistoryStoreError::InvalidTimestamp {
            value: value.to_string(),
            reason: error.to_string(),
        }
    })
}

/// Re-renders any RFC 3339 timestamp in the canonical format.
pub fn canonical_timestamp(value: &str) -> Result<String, HistoryStoreError> {
    format_timestamp(parse_timestamp(value)?)
}

/// The smallest canonical timestamp strictly after `previous`.
pub fn next_timestamp_after(previous: &str) -> Result<String, HistoryStoreError> {
    format_timestamp(parse_timestamp(previous)? + Duration::microseconds(1))
}
