use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use gen_contract::{
    NewRemoteEntry, RemoteEntry, RemoteError, RemoteHistory, RemoteSession, RemoteSetting,
    SettingsSource,
};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::lock_unpoisoned;

#[derive(Debug, Clone)]
struct StoredSession {
    session: RemoteSession,
    entries: Vec<RemoteEntry>,
}

#[derive(Debug, Default)]
struct RemoteState {
    sessions: Vec<StoredSession>,
    failing_sessions: HashSet<String>,
    list_failure: Option<RemoteError>,
    write_failure: Option<RemoteError>,
    list_delay: Option<Duration>,
    next_session: u64,
    created_sessions: usize,
}

/// In-memory remote history with failure injection.
#[derive(Debug, Default)]
pub struct InMemoryRemoteHistory {
    state: Mutex<RemoteState>,
}

impl InMemoryRemoteHistory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_session(
        self,
        id: impl Into<String>,
        created_at: impl Into<String>,
        entries: Vec<RemoteEntry>,
    ) -> Self {
        lock_unpoisoned(&self.state).sessions.push(StoredSession {
            session: RemoteSession {
                id: id.into(),
                title: None,
                created_at: created_at.into(),
            },
            entries,
        });
        self
    }

    /// Entry fetches for `id` fail with a 500.
    #[must_use]
    pub fn with_failing_session(self, id: impl Into<String>) -> Self {
        lock_unpoisoned(&self.state)
            .failing_sessions
            .insert(id.into());
        self
    }

    #[must_use]
    pub fn with_list_failure(self, error: RemoteError) -> Self {
        lock_unpoisoned(&self.state).list_failure = Some(error);
        self
    }

    #[must_use]
    pub fn with_write_failure(self, error: RemoteError) -> Self {
        lock_unpoisoned(&self.state).write_failure = Some(error);
        self
    }

    /// Delays session listing, for timeout scenarios.
    #[must_use]
    pub fn with_list_delay(self, delay: Duration) -> Self {
        lock_unpoisoned(&self.state).list_delay = Some(delay);
        self
    }

    pub fn session_ids(&self) -> Vec<String> {
        lock_unpoisoned(&self.state)
            .sessions
            .iter()
            .map(|stored| stored.session.id.clone())
            .collect()
    }

    pub fn entries_for(&self, session_id: &str) -> Vec<RemoteEntry> {
        lock_unpoisoned(&self.state)
            .sessions
            .iter()
            .find(|stored| stored.session.id == session_id)
            .map(|stored| stored.entries.clone())
            .unwrap_or_default()
    }

    pub fn created_session_count(&self) -> usize {
        lock_unpoisoned(&self.state).created_sessions
    }
}

#[async_trait]
impl RemoteHistory for InMemoryRemoteHistory {
    async fn list_sessions(&self) -> Result<Vec<RemoteSession>, RemoteError> {
        let delay = lock_unpoisoned(&self.state).list_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let state = lock_unpoisoned(&self.state);
        if let Some(error) = &state.list_failure {
            return Err(error.clone());
        }
        Ok(state
            .sessions
            .iter()
            .map(|stored| stored.session.clone())
            .collect())
    }

    async fn session_entries(&self, session_id: &str) -> Result<Vec<RemoteEntry>, RemoteError> {
        let state = lock_unpoisoned(&self.state);
        if state.failing_sessions.contains(session_id) {
            return Err(RemoteError::Status {
                status: 500,
                message: format!("session {session_id} unavailable"),
            });
        }
        state
            .sessions
            .iter()
            .find(|stored| stored.session.id == session_id)
            .map(|stored| stored.entries.clone())
            .ok_or_else(|| RemoteError::Status {
                status: 404,
                message: format!("unknown session {session_id}"),
            })
    }

    async fn create_session(&self, title: &str) -> Result<String, RemoteError> {
        let mut state = lock_unpoisoned(&self.state);
        if let Some(error) = &state.write_failure {
            return Err(error.clone());
        }
        state.next_session += 1;
        state.created_sessions += 1;
        let id = format!("remote-session-{}", state.next_session);
        state.sessions.push(StoredSession {
            session: RemoteSession {
                id: id.clone(),
                title: Some(title.to_string()),
                created_at: now_rfc3339(),
            },
            entries: Vec::new(),
        });
        Ok(id)
    }

    async fn create_entry(
        &self,
        session_id: &str,
        entry: NewRemoteEntry,
    ) -> Result<(), RemoteError> {
        let mut state = lock_unpoisoned(&self.state);
        if let Some(error) = &state.write_failure {
            return Err(error.clone());
        }
        let stored = state
            .sessions
            .iter_mut()
            .find(|stored| stored.session.id == session_id)
            .ok_or_else(|| RemoteError::Status {
                status: 404,
                message: format!("unknown session {session_id}"),
            })?;
        stored.entries.push(RemoteEntry {
            kind: entry.kind,
            content: entry.content,
            created_at: now_rfc3339(),
        });
        Ok(())
    }
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

/// Settings source returning a configurable outcome and counting calls.
#[derive(Debug)]
pub struct ScriptedSettings {
    outcome: Mutex<Result<Vec<RemoteSetting>, RemoteError>>,
    calls: AtomicUsize,
}

impl ScriptedSettings {
    #[must_use]
    pub fn ok(settings: Vec<RemoteSetting>) -> Self {
        Self {
            outcome: Mutex::new(Ok(settings)),
            calls: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn failing(error: RemoteError) -> Self {
        Self {
            outcome: Mutex::new(Err(error)),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_outcome(&self, outcome: Result<Vec<RemoteSetting>, RemoteError>) {
        *lock_unpoisoned(&self.outcome) = outcome;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Acquire)
    }
}

#[async_trait]
impl SettingsSource for ScriptedSettings {
    async fn fetch_settings(&self) -> Result<Vec<RemoteSetting>, RemoteError> {
        self.calls.fetch_add(1, Ordering::AcqRel);
        lock_unpoisoned(&self.outcome).clone()
    }
}
