use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Remote grouping of one question/answer exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSession {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Question,
    Answer,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRemoteEntry {
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub content: String,
}

impl NewRemoteEntry {
    #[must_use]
    pub fn question(content: impl Into<String>) -> Self {
        Self {
            kind: EntryKind::Question,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn answer(content: impl Into<String>) -> Self {
        Self {
            kind: EntryKind::Answer,
            content: content.into(),
        }
    }
}

/// One typed key/value pair from the remote settings endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSetting {
    pub key: String,
    #[serde(default)]
    pub value: Value,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,
}

impl RemoteSetting {
    pub fn as_text(&self) -> Option<&str> {
        self.value.as_str().map(str::trim).filter(|value| !value.is_empty())
    }
}

/// Failure talking to the remote history or settings store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("no access token configured")]
    MissingCredential,
    #[error("remote store timed out")]
    Timeout,
    #[error("remote store unreachable: {0}")]
    Unreachable(String),
    #[error("remote store returned HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("malformed remote payload: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait RemoteHistory: Send + Sync {
    async fn list_sessions(&self) -> Result<Vec<RemoteSession>, RemoteError>;

    async fn session_entries(&self, session_id: &str) -> Result<Vec<RemoteEntry>, RemoteError>;

    /// Creates a session and returns its identifier.
    async fn create_session(&self, title: &str) -> Result<String, RemoteError>;

    async fn create_entry(
        &self,
        session_id: &str,
        entry: NewRemoteEntry,
    ) -> Result<(), RemoteError>;
}

#[async_trait]
pub trait SettingsSource: Send + Sync {
    async fn fetch_settings(&self) -> Result<Vec<RemoteSetting>, RemoteError>;
}
