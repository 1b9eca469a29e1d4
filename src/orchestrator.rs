use std::collections::HashMap;
use std::path::Path;
use std::pin::pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::{join_all, select, Either};
use gen_api::{GenApiClient, GenApiError};
use gen_contract::{
    cancel_signal, CancelSignal, GenerationRequest, GenerationTransport, Intent, RemoteHistory,
    SettingsSource, SharedClock, SystemClock,
};
use history_store::{history_file, AppendOutcome, HistoryStore, HistoryView, LocalHistoryFile};
use request_profile::{PromptValidationError, RequestProfileResolver};
use stream_assembler::{
    AssemblerConfig, AssemblyEvent, FailureKind, StreamAssembler, StreamEnding, StreamFailure,
    StreamOutcome,
};
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::config::EnvConfig;
use crate::lock_unpoisoned;

/// Deadline for a "continue the previous answer" request.
pub const CONTINUE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("invalid prompt: {0}")]
    InvalidPrompt(#[from] PromptValidationError),

    #[error("there is no previous answer to continue")]
    NothingToContinue,
}

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("failed to build the generation client: {0}")]
    Client(#[from] GenApiError),
}

/// Result of one submitted prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub outcome: StreamOutcome,
    /// Whether the turn was added to history.
    pub recorded: bool,
}

/// Host-facing facade: builds requests, drives the stream assembler, and
/// records finished turns.
///
/// Each request gets its own assembler and cancel signal, so concurrent
/// submissions never affect each other.
pub struct Orchestrator {
    transport: Arc<dyn GenerationTransport>,
    resolver: RequestProfileResolver,
    history: HistoryStore,
    assembler_config: AssemblerConfig,
    clock: SharedClock,
    next_session_id: AtomicU64,
    active: Mutex<HashMap<u64, CancelSignal>>,
    remote_writes: Mutex<Vec<JoinHandle<()>>>,
    continue_timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        transport: Arc<dyn GenerationTransport>,
        resolver: RequestProfileResolver,
        history: HistoryStore,
        assembler_config: AssemblerConfig,
        clock: SharedClock,
    ) -> Self {
        Self {
            transport,
            resolver,
            history,
            assembler_config,
            clock,
            next_session_id: AtomicU64::new(1),
            active: Mutex::new(HashMap::new()),
            remote_writes: Mutex::new(Vec::new()),
            continue_timeout: CONTINUE_TIMEOUT,
        }
    }

    /// Wires the HTTP client from environment configuration. Remote history
    /// and settings are only used when a credential is configured.
    pub fn from_env(config: &EnvConfig) -> Result<Self, SetupError> {
        let client = Arc::new(GenApiClient::new(config.api_config())?);
        let clock = SystemClock::shared();

        let (remote, settings): (
            Option<Arc<dyn RemoteHistory>>,
            Option<Arc<dyn SettingsSource>>,
        ) = if config.has_credential() {
            (
                Some(Arc::clone(&client) as Arc<dyn RemoteHistory>),
                Some(Arc::clone(&client) as Arc<dyn SettingsSource>),
            )
        } else {
            tracing::info!("no access token; history and settings stay local");
            (None, None)
        };

        let history = HistoryStore::open(
            config.history_config(),
            LocalHistoryFile::new(history_file(&config.history_root())),
            remote,
            Arc::clone(&clock),
        );
        let resolver =
            RequestProfileResolver::new(config.resolver_config(), settings, Arc::clone(&clock));

        Ok(Self::new(
            client,
            resolver,
            history,
            config.assembler_config(),
            clock,
        ))
    }

    #[must_use]
    pub fn with_continue_timeout(mut self, timeout: Duration) -> Self {
        self.continue_timeout = timeout;
        self
    }

    pub fn history_path(&self) -> &Path {
        self.history.local_path()
    }

    /// Generates code for `prompt`, streaming bundles through `emit`.
    ///
    /// Successful endings are recorded in history; cancelled and failed
    /// ones are not.
    pub async fn submit(
        &self,
        prompt: &str,
        intent: Intent,
        emit: &mut (dyn FnMut(AssemblyEvent) + Send),
    ) -> Result<Submission, SubmitError> {
        let request = self.resolver.build_request(prompt, None, intent).await?;
        let question = prompt.trim().to_string();
        Ok(self.run_and_record(&request, &question, None, emit).await)
    }

    /// Asks the backend to continue the newest answer in history. The request
    /// is cancelled and reported as a timeout after [`CONTINUE_TIMEOUT`].
    pub async fn continue_previous(
        &self,
        emit: &mut (dyn FnMut(AssemblyEvent) + Send),
    ) -> Result<Submission, SubmitError> {
        let previous = self.history.newest().ok_or(SubmitError::NothingToContinue)?;
        let prompt = format!(
            "Continue the following answer to \"{}\" from where it stopped. Respond with only the continuation.",
            previous.question
        );
        let request = self
            .resolver
            .build_verbatim_request(&prompt, Some(&previous.response), Intent::Complete)
            .await?;
        let question = format!("{} (continued)", previous.question);
        Ok(self
            .run_and_record(&request, &question, Some(self.continue_timeout), emit)
            .await)
    }

    /// Raises the cancel signal of one stream in flight. The id is the one
    /// announced by [`AssemblyEvent::Started`].
    pub fn cancel(&self, session_id: u64) -> bool {
        match lock_unpoisoned(&self.active).get(&session_id) {
            Some(cancel) => {
                cancel.store(true, Ordering::Release);
                true
            }
            None => false,
        }
    }

    /// Cancels every stream in flight and returns how many were signalled.
    pub fn cancel_all(&self) -> usize {
        let active = lock_unpoisoned(&self.active);
        for cancel in active.values() {
            cancel.store(true, Ordering::Release);
        }
        active.len()
    }

    /// Waits up to `timeout` for background history writes to finish.
    /// Returns `false` when some were still running.
    pub async fn flush_remote_writes(&self, timeout: Duration) -> bool {
        let pending = std::mem::take(&mut *lock_unpoisoned(&self.remote_writes));
        if pending.is_empty() {
            return true;
        }
        let count = pending.len();
        match tokio::time::timeout(timeout, join_all(pending)).await {
            Ok(results) => {
                for error in results.into_iter().filter_map(Result::err) {
                    tracing::warn!(%error, "remote history write task failed");
                }
                true
            }
            Err(_) => {
                tracing::warn!(
                    pending = count,
                    timeout_ms = timeout.as_millis() as u64,
                    "remote history writes still running"
                );
                false
            }
        }
    }

    pub fn history(&self) -> HistoryView {
        self.history.history()
    }

    /// Refreshes history from the remote store, falling back to the local
    /// cache.
    pub async fn load_history(&self) -> HistoryView {
        self.history.load().await
    }

    pub fn delete_history_item(&self, index: usize) -> bool {
        self.history.delete(index).is_some()
    }

    pub fn clear_history(&self) {
        self.history.clear();
    }

    async fn run_and_record(
        &self,
        request: &GenerationRequest,
        question: &str,
        deadline: Option<Duration>,
        emit: &mut (dyn FnMut(AssemblyEvent) + Send),
    ) -> Submission {
        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        let cancel = cancel_signal();
        lock_unpoisoned(&self.active).insert(session_id, Arc::clone(&cancel));
        let outcome = {
            let mut assembler =
                StreamAssembler::new(self.assembler_config, Arc::clone(&self.clock))
                    .with_first_session_id(session_id);
            match deadline {
                Some(deadline) => {
                    run_with_deadline(
                        &mut assembler,
                        self.transport.as_ref(),
                        request,
                        question,
                        cancel.clone(),
                        deadline,
                        emit,
                    )
                    .await
                }
                None => {
                    assembler
                        .run(
                            self.transport.as_ref(),
                            request,
                            question,
                            cancel.clone(),
                            emit,
                        )
                        .await
                }
            }
        };
        lock_unpoisoned(&self.active).remove(&session_id);

        let recorded = outcome.ending.is_success()
            && !outcome.artifact.trim().is_empty()
            && self.record(question, &outcome.artifact);
        Submission { outcome, recorded }
    }

    fn record(&self, question: &str, artifact: &str) -> bool {
        match self.history.append(question, artifact) {
            Ok(AppendOutcome::Recorded { remote_write, .. }) => {
                if let Some(handle) = remote_write {
                    let mut writes = lock_unpoisoned(&self.remote_writes);
                    writes.retain(|pending| !pending.is_finished());
                    writes.push(handle);
                }
                true
            }
            Ok(AppendOutcome::RejectedDuplicate) => false,
            Err(error) => {
                tracing::warn!(%error, "failed to record history turn");
                false
            }
        }
    }
}

async fn run_with_deadline(
    assembler: &mut StreamAssembler,
    transport: &dyn GenerationTransport,
    request: &GenerationRequest,
    raw_prompt: &str,
    cancel: CancelSignal,
    deadline: Duration,
    emit: &mut (dyn FnMut(AssemblyEvent) + Send),
) -> StreamOutcome {
    let timed_out = AtomicBool::new(false);
    let mut relay = |event: AssemblyEvent| match event {
        AssemblyEvent::Finalized(outcome) if timed_out.load(Ordering::Acquire) => {
            emit(AssemblyEvent::Finalized(timeout_outcome(outcome, deadline)));
        }
        other => emit(other),
    };

    let outcome = {
        let run = pin!(assembler.run(transport, request, raw_prompt, cancel.clone(), &mut relay));
        let timer = pin!(tokio::time::sleep(deadline));
        match select(run, timer).await {
            Either::Left((outcome, _)) => outcome,
            Either::Right(((), run)) => {
                tracing::warn!(deadline_secs = deadline.as_secs(), "continuation timed out");
                timed_out.store(true, Ordering::Release);
                cancel.store(true, Ordering::Release);
                run.await
            }
        }
    };

    if timed_out.load(Ordering::Acquire) {
        timeout_outcome(outcome, deadline)
    } else {
        outcome
    }
}

fn timeout_outcome(outcome: StreamOutcome, deadline: Duration) -> StreamOutcome {
    if outcome.ending != StreamEnding::Cancelled {
        return outcome;
    }
    let failure = StreamFailure {
        kind: FailureKind::Timeout,
        detail: format!("no complete answer within {}s", deadline.as_secs()),
    };
    StreamOutcome {
        artifact: failure.artifact(),
        diagnostic: (!outcome.artifact.is_empty()).then(|| outcome.artifact.clone()),
        ending: StreamEnding::Errored(failure),
        ..outcome
    }
}
