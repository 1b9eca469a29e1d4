use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::join_all;
use gen_contract::{Clock, NewRemoteEntry, RemoteError, RemoteHistory, SharedClock};
use time::OffsetDateTime;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use crate::error::HistoryStoreError;
use crate::local::LocalHistoryFile;
use crate::lock_unpoisoned;
use crate::merge::merge;
use crate::pairing::pair_entries;
use crate::schema::{format_timestamp, next_timestamp_after, ConversationTurn, HistoryView};
use crate::session::{SessionCache, SESSION_TTL};

pub const DEFAULT_CAPACITY: usize = 50;
pub const DEFAULT_FETCH_BATCH_SIZE: usize = 5;
pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(10);
/// Number of most recent turns checked for repeated questions.
pub const ANTI_SPAM_WINDOW: usize = 3;
/// A question already present this many times in the window is rejected.
pub const ANTI_SPAM_MAX_REPEATS: usize = 2;
const SESSION_TITLE_MAX_CHARS: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryConfig {
    pub capacity: usize,
    pub fetch_batch_size: usize,
    pub load_timeout: Duration,
    pub session_ttl: Duration,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            fetch_batch_size: DEFAULT_FETCH_BATCH_SIZE,
            load_timeout: DEFAULT_LOAD_TIMEOUT,
            session_ttl: SESSION_TTL,
        }
    }
}

impl HistoryConfig {
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    #[must_use]
    pub fn with_fetch_batch_size(mut self, size: usize) -> Self {
        self.fetch_batch_size = size.max(1);
        self
    }

    #[must_use]
    pub fn with_load_timeout(mut self, timeout: Duration) -> Self {
        self.load_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }
}

/// A remote write that failed after the turn was recorded locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteWriteFailure {
    pub question: String,
    pub error: RemoteError,
}

#[derive(Debug)]
pub enum AppendOutcome {
    Recorded {
        turn: ConversationTurn,
        /// Background remote write, when a remote store and runtime exist.
        remote_write: Option<JoinHandle<()>>,
    },
    /// The question repeats too many of the most recent turns.
    RejectedDuplicate,
}

impl AppendOutcome {
    pub fn is_recorded(&self) -> bool {
        matches!(self, Self::Recorded { .. })
    }
}

/// Turns fetched from the remote store, plus the sessions whose entries
/// could not be read.
#[derive(Debug, Default)]
struct RemoteSnapshot {
    turns: Vec<ConversationTurn>,
    unavailable: HashSet<String>,
}

#[derive(Debug)]
struct StoreState {
    view: HistoryView,
    sessions: SessionCache,
}

/// Conversation history with a local JSON mirror and an optional remote
/// store.
///
/// The in-memory view is the source of truth for the running process. Every
/// mutation is applied and persisted under one lock; remote writes run on
/// background tasks and never roll local state back.
pub struct HistoryStore {
    config: HistoryConfig,
    local: LocalHistoryFile,
    remote: Option<Arc<dyn RemoteHistory>>,
    clock: SharedClock,
    state: Arc<Mutex<StoreState>>,
    write_order: Arc<tokio::sync::Mutex<()>>,
    errors: Option<UnboundedSender<RemoteWriteFailure>>,
}

impl HistoryStore {
    /// Opens the store over `local`. An unreadable cache starts empty.
    pub fn open(
        config: HistoryConfig,
        local: LocalHistoryFile,
        remote: Option<Arc<dyn RemoteHistory>>,
        clock: SharedClock,
    ) -> Self {
        let turns = match local.load() {
            Ok(turns) => turns,
            Err(error) => {
                tracing::warn!(%error, "ignoring unreadable history cache");
                Vec::new()
            }
        };
        let view = HistoryView::from_turns(turns, config.capacity);
        Self {
            config,
            local,
            remote,
            clock,
            state: Arc::new(Mutex::new(StoreState {
                view,
                sessions: SessionCache::new(config.session_ttl),
            })),
            write_order: Arc::new(tokio::sync::Mutex::new(())),
            errors: None,
        }
    }

    /// Also delivers remote write failures on `sender`.
    #[must_use]
    pub fn with_error_channel(mut self, sender: UnboundedSender<RemoteWriteFailure>) -> Self {
        self.errors = Some(sender);
        self
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    pub fn local_path(&self) -> &Path {
        self.local.path()
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    pub fn history(&self) -> HistoryView {
        lock_unpoisoned(&self.state).view.clone()
    }

    pub fn newest(&self) -> Option<ConversationTurn> {
        lock_unpoisoned(&self.state).view.newest().cloned()
    }

    /// Replaces the view with the remote history.
    ///
    /// Local turns the remote store never acknowledged are kept, as are
    /// acknowledged turns of sessions whose entries failed to load. Sessions
    /// are fetched in batches. If listing fails or the whole fetch exceeds
    /// the load timeout the local view is returned unchanged.
    pub async fn load(&self) -> HistoryView {
        let Some(remote) = self.remote.clone() else {
            let view = self.history();
            tracing::info!(source = "local", turns = view.len(), "history loaded");
            return view;
        };

        let fetched =
            tokio::time::timeout(self.config.load_timeout, self.fetch_remote(remote.as_ref()))
                .await;
        let snapshot = match fetched {
            Ok(Ok(snapshot)) => snapshot,
            Ok(Err(error)) => {
                tracing::warn!(%error, "remote history unavailable; using local cache");
                return self.history();
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.config.load_timeout.as_millis() as u64,
                    "remote history timed out; using local cache"
                );
                return self.history();
            }
        };

        let mut state = lock_unpoisoned(&self.state);
        let kept_local: Vec<ConversationTurn> = state
            .view
            .clone()
            .into_turns()
            .into_iter()
            .filter(|turn| match &turn.session_id {
                None => true,
                Some(session_id) => snapshot.unavailable.contains(session_id),
            })
            .collect();
        state.view = merge(snapshot.turns, kept_local, self.config.capacity);
        self.persist(&state.view);
        tracing::info!(source = "remote", turns = state.view.len(), "history loaded");
        state.view.clone()
    }

    async fn fetch_remote(
        &self,
        remote: &dyn RemoteHistory,
    ) -> Result<RemoteSnapshot, RemoteError> {
        let sessions = remote.list_sessions().await?;
        let mut snapshot = RemoteSnapshot::default();

        for batch in sessions.chunks(self.config.fetch_batch_size.max(1)) {
            let results =
                join_all(batch.iter().map(|session| remote.session_entries(&session.id))).await;
            for (session, result) in batch.iter().zip(results) {
                match result {
                    Ok(entries) => snapshot.turns.extend(pair_entries(&session.id, &entries)),
                    Err(error) => {
                        tracing::warn!(session_id = %session.id, %error, "skipping remote session");
                        snapshot.unavailable.insert(session.id.clone());
                    }
                }
            }
        }

        Ok(snapshot)
    }

    /// Records a finished turn locally, then writes it remotely in the
    /// background.
    pub fn append(
        &self,
        question: &str,
        response: &str,
    ) -> Result<AppendOutcome, HistoryStoreError> {
        let now_utc = self.clock.now_utc();
        let turn = {
            let mut state = lock_unpoisoned(&self.state);
            if is_repeated_question(state.view.turns(), question) {
                tracing::debug!("rejecting repeated question");
                return Ok(AppendOutcome::RejectedDuplicate);
            }

            let timestamp = unique_timestamp(&state.view, now_utc)?;
            let turn = ConversationTurn::new(question.trim(), response, timestamp);
            let capacity = self.config.capacity;
            let turns = state.view.turns_mut();
            turns.insert(0, turn.clone());
            turns.truncate(capacity);
            self.persist(&state.view);
            turn
        };

        let remote_write = self.spawn_remote_write(&turn);
        Ok(AppendOutcome::Recorded { turn, remote_write })
    }

    /// Removes the turn at `index` (newest first). Out of range is a no-op.
    pub fn delete(&self, index: usize) -> Option<ConversationTurn> {
        let mut state = lock_unpoisoned(&self.state);
        if index >= state.view.len() {
            return None;
        }
        let removed = state.view.turns_mut().remove(index);
        self.persist(&state.view);
        Some(removed)
    }

    pub fn clear(&self) {
        let mut state = lock_unpoisoned(&self.state);
        state.view.turns_mut().clear();
        self.persist(&state.view);
    }

    fn persist(&self, view: &HistoryView) {
        persist(&self.local, view);
    }

    fn spawn_remote_write(&self, turn: &ConversationTurn) -> Option<JoinHandle<()>> {
        let remote = self.remote.clone()?;
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                tracing::warn!("no async runtime; skipping remote history write");
                return None;
            }
        };

        let state = Arc::clone(&self.state);
        let local = self.local.clone();
        let clock = Arc::clone(&self.clock);
        let write_order = Arc::clone(&self.write_order);
        let errors = self.errors.clone();
        let question = turn.question.clone();
        let response = turn.response.clone();
        let timestamp = turn.timestamp.clone();

        Some(runtime.spawn(async move {
            let _ordered = write_order.lock().await;
            match write_turn(remote.as_ref(), &state, clock.as_ref(), &question, &response).await {
                Ok(session_id) => {
                    tracing::debug!(%session_id, "remote history write finished");
                    acknowledge(&state, &local, &timestamp, &session_id);
                }
                Err(error) => {
                    tracing::warn!(%error, "remote history write failed");
                    if let Some(errors) = errors {
                        let _ = errors.send(RemoteWriteFailure { question, error });
                    }
                }
            }
        }))
    }
}

fn persist(local: &LocalHistoryFile, view: &HistoryView) {
    if let Err(error) = local.save(view.turns()) {
        tracing::warn!(%error, "failed to persist history cache");
    }
}

/// Tags the local turn written remotely with its session, so the next load
/// takes the remote copy instead of keeping both.
fn acknowledge(
    state: &Mutex<StoreState>,
    local: &LocalHistoryFile,
    timestamp: &str,
    session_id: &str,
) {
    let mut state = lock_unpoisoned(state);
    let Some(turn) = state
        .view
        .turns_mut()
        .iter_mut()
        .find(|turn| turn.timestamp == timestamp && turn.session_id.is_none())
    else {
        return;
    };
    turn.session_id = Some(session_id.to_string());
    persist(local, &state.view);
}

async fn write_turn(
    remote: &dyn RemoteHistory,
    state: &Mutex<StoreState>,
    clock: &dyn Clock,
    question: &str,
    response: &str,
) -> Result<String, RemoteError> {
    let cached = lock_unpoisoned(state)
        .sessions
        .current(clock.now())
        .map(str::to_string);
    let session_id = match cached {
        Some(session_id) => session_id,
        None => {
            let session_id = remote.create_session(&session_title(question)).await?;
            lock_unpoisoned(state)
                .sessions
                .store(session_id.clone(), clock.now());
            session_id
        }
    };

    remote
        .create_entry(&session_id, NewRemoteEntry::question(question))
        .await?;
    remote
        .create_entry(&session_id, NewRemoteEntry::answer(response))
        .await?;
    Ok(session_id)
}

fn normalize_question(question: &str) -> String {
    question.trim().to_lowercase()
}

/// True when `question` already appears `ANTI_SPAM_MAX_REPEATS` times among
/// the most recent turns.
pub fn is_repeated_question(recent_first: &[ConversationTurn], question: &str) -> bool {
    let candidate = normalize_question(question);
    let repeats = recent_first
        .iter()
        .take(ANTI_SPAM_WINDOW)
        .filter(|turn| normalize_question(&turn.question) == candidate)
        .count();
    repeats >= ANTI_SPAM_MAX_REPEATS
}

fn unique_timestamp(view: &HistoryView, now: OffsetDateTime) -> Result<String, HistoryStoreError> {
    let candidate = format_timestamp(now)?;
    match view.newest() {
        Some(newest) if candidate <= newest.timestamp => next_timestamp_after(&newest.timestamp),
        _ => Ok(candidate),
    }
}

fn session_title(question: &str) -> String {
    let title: String = question.chars().take(SESSION_TITLE_MAX_CHARS).collect();
    title.trim().to_string()
}
