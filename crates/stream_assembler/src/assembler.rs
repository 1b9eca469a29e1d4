use std::time::Duration;

use futures_util::StreamExt;
use gen_contract::{
    await_or_cancel, is_cancelled, CancelSignal, ChunkEvent, ChunkKind, GenerationRequest,
    GenerationTransport, SharedClock, TransportError,
};

use crate::bundler::{BUNDLE_MAX_INTERVAL, BUNDLE_MIN_CHARS};
use crate::failure::StreamFailure;
use crate::heuristics::{check_early_termination, classify_prompt, EarlyTerminationPolicy, PromptClass};
use crate::sanitize::{sanitize, SanitizeOptions};
use crate::sentinels::find_stop;
use crate::session::StreamSession;
use crate::state::StreamState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssemblerConfig {
    pub bundle_min_chars: usize,
    pub bundle_interval: Duration,
    pub early_termination: EarlyTerminationPolicy,
    pub sanitize: SanitizeOptions,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            bundle_min_chars: BUNDLE_MIN_CHARS,
            bundle_interval: BUNDLE_MAX_INTERVAL,
            early_termination: EarlyTerminationPolicy::default(),
            sanitize: SanitizeOptions::default(),
        }
    }
}

impl AssemblerConfig {
    #[must_use]
    pub fn with_early_termination(mut self, policy: EarlyTerminationPolicy) -> Self {
        self.early_termination = policy;
        self
    }

    #[must_use]
    pub fn with_safety_notes(mut self, enabled: bool) -> Self {
        self.sanitize.safety_notes = enabled;
        self
    }
}

/// How a stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEnding {
    Completed,
    /// A stop sentinel was found in the token text.
    StopDetected,
    /// A simple-prompt rule ended the stream before the backend finished.
    EarlyTerminated { rule: &'static str },
    Cancelled,
    Errored(StreamFailure),
}

impl StreamEnding {
    /// Endings whose artifact is a valid generation result.
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::StopDetected | Self::EarlyTerminated { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamOutcome {
    pub session_id: u64,
    pub ending: StreamEnding,
    /// Sanitized artifact, or an explanatory stand-in when the stream errored.
    pub artifact: String,
    /// Unsanitized partial output kept when the stream errored.
    pub diagnostic: Option<String>,
    pub chunk_count: usize,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssemblyEvent {
    Started { session_id: u64 },
    Bundle { session_id: u64, text: String },
    Finalized(StreamOutcome),
}

/// Consumes chunk events for one request at a time and produces
/// presentation bundles and a final artifact.
#[derive(Debug)]
pub struct StreamAssembler {
    config: AssemblerConfig,
    clock: SharedClock,
    session: Option<StreamSession>,
    next_session_id: u64,
    last_state: StreamState,
}

impl StreamAssembler {
    pub fn new(config: AssemblerConfig, clock: SharedClock) -> Self {
        Self {
            config,
            clock,
            session: None,
            next_session_id: 1,
            last_state: StreamState::Idle,
        }
    }

    /// Numbers sessions from `id` onwards, for hosts that run one assembler
    /// per request.
    #[must_use]
    pub fn with_first_session_id(mut self, id: u64) -> Self {
        self.next_session_id = id;
        self
    }

    pub fn config(&self) -> &AssemblerConfig {
        &self.config
    }

    pub fn state(&self) -> StreamState {
        self.session
            .as_ref()
            .map(|session| session.state)
            .unwrap_or(self.last_state)
    }

    pub fn session(&self) -> Option<&StreamSession> {
        self.session.as_ref()
    }

    /// Opens a new session for `raw_prompt`. A session still open is
    /// cancelled first.
    pub fn begin(&mut self, raw_prompt: &str, emit: &mut dyn FnMut(AssemblyEvent)) -> u64 {
        if self.session.is_some() {
            self.cancel(emit);
        }
        let id = self.next_session_id;
        self.next_session_id += 1;
        let prompt_class = classify_prompt(raw_prompt);
        self.session = Some(StreamSession::new(
            id,
            self.clock.now(),
            prompt_class,
            self.config.bundle_min_chars,
            self.config.bundle_interval,
        ));
        tracing::info!(session_id = id, ?prompt_class, "stream started");
        emit(AssemblyEvent::Started { session_id: id });
        id
    }

    /// Applies one chunk event. Returns the outcome once the event ended the
    /// stream.
    pub fn apply(
        &mut self,
        event: ChunkEvent,
        emit: &mut dyn FnMut(AssemblyEvent),
    ) -> Option<StreamOutcome> {
        let now = self.clock.now();
        let policy = self.config.early_termination;
        let session = match self.session.as_mut() {
            Some(session) if session.state.is_open() => session,
            _ => {
                tracing::debug!(sequence = event.sequence, "ignoring chunk without an open stream");
                return None;
            }
        };
        if !session.accept_sequence(event.sequence) {
            tracing::warn!(
                session_id = session.id,
                sequence = event.sequence,
                last = ?session.last_sequence(),
                "dropping out-of-order chunk"
            );
            return None;
        }

        match event.kind {
            ChunkKind::Start => None,
            ChunkKind::Token => {
                session.chunk_count += 1;
                session.state = StreamState::Accumulating;

                if let Some(stop) = find_stop(&session.raw_buffer, &event.content) {
                    let dropped = session.raw_buffer.len() - stop.raw_keep;
                    session.raw_buffer.truncate(stop.raw_keep);
                    session.presentation.truncate_tail(dropped);
                    let kept = &event.content[..stop.text_keep];
                    session.raw_buffer.push_str(kept);
                    if let Some(text) = session.presentation.push(kept, now) {
                        emit(AssemblyEvent::Bundle {
                            session_id: session.id,
                            text,
                        });
                    }
                    session.state = StreamState::StopDetected;
                    tracing::debug!(session_id = session.id, sentinel = stop.sentinel, "stop sentinel detected");
                    return Some(self.finalize(StreamEnding::StopDetected, emit));
                }

                session.raw_buffer.push_str(&event.content);
                if let Some(text) = session.presentation.push(&event.content, now) {
                    tracing::debug!(session_id = session.id, chars = text.len(), "bundle ready");
                    emit(AssemblyEvent::Bundle {
                        session_id: session.id,
                        text,
                    });
                }

                if session.prompt_class == PromptClass::Simple {
                    if let Some(termination) = check_early_termination(&session.raw_buffer, &policy)
                    {
                        session.raw_buffer = termination.keep;
                        session.state = StreamState::Completed;
                        tracing::debug!(session_id = session.id, rule = termination.rule, "early termination");
                        return Some(self.finalize(
                            StreamEnding::EarlyTerminated {
                                rule: termination.rule,
                            },
                            emit,
                        ));
                    }
                }
                None
            }
            ChunkKind::Done => {
                session.state = StreamState::Completed;
                Some(self.finalize(StreamEnding::Completed, emit))
            }
            ChunkKind::Error => {
                session.state = StreamState::Errored;
                let failure = StreamFailure::from_error_event(&event.content);
                Some(self.finalize(StreamEnding::Errored(failure), emit))
            }
        }
    }

    /// Transport ended without a done event.
    pub fn finish(&mut self, emit: &mut dyn FnMut(AssemblyEvent)) -> Option<StreamOutcome> {
        let session = self.session.as_mut().filter(|session| session.state.is_open())?;
        session.state = StreamState::Completed;
        Some(self.finalize(StreamEnding::Completed, emit))
    }

    /// Transport failed mid-stream or while opening.
    pub fn fail(
        &mut self,
        error: &TransportError,
        emit: &mut dyn FnMut(AssemblyEvent),
    ) -> Option<StreamOutcome> {
        let session = self.session.as_mut().filter(|session| session.state.is_open())?;
        session.state = StreamState::Errored;
        let failure = StreamFailure::from_transport(error);
        tracing::warn!(session_id = session.id, error = %error, "stream failed");
        Some(self.finalize(StreamEnding::Errored(failure), emit))
    }

    /// Ends an open stream with whatever content has arrived.
    pub fn cancel(&mut self, emit: &mut dyn FnMut(AssemblyEvent)) -> Option<StreamOutcome> {
        self.session.as_ref().filter(|session| session.state.is_open())?;
        Some(self.finalize(StreamEnding::Cancelled, emit))
    }

    fn finalize(
        &mut self,
        ending: StreamEnding,
        emit: &mut dyn FnMut(AssemblyEvent),
    ) -> StreamOutcome {
        let now = self.clock.now();
        let Some(mut session) = self.session.take() else {
            // Unreachable through the public API; every caller holds a session.
            return StreamOutcome {
                session_id: 0,
                ending,
                artifact: String::new(),
                diagnostic: None,
                chunk_count: 0,
                elapsed: Duration::ZERO,
            };
        };

        let (artifact, diagnostic) = match &ending {
            StreamEnding::Errored(failure) => {
                session.presentation.clear();
                let partial = (!session.raw_buffer.is_empty()).then(|| session.raw_buffer.clone());
                (failure.artifact(), partial)
            }
            _ => {
                if let Some(text) = session.presentation.flush(now) {
                    emit(AssemblyEvent::Bundle {
                        session_id: session.id,
                        text,
                    });
                }
                (sanitize(&session.raw_buffer, self.config.sanitize), None)
            }
        };

        session.state = StreamState::Finalized;
        self.last_state = StreamState::Finalized;
        let outcome = StreamOutcome {
            session_id: session.id,
            ending,
            artifact,
            diagnostic,
            chunk_count: session.chunk_count,
            elapsed: session.elapsed(now),
        };
        tracing::info!(
            session_id = outcome.session_id,
            ending = ?outcome.ending,
            chunks = outcome.chunk_count,
            "stream finalized"
        );
        emit(AssemblyEvent::Finalized(outcome.clone()));
        outcome
    }

    /// Drives one request end to end: opens the transport, applies events in
    /// order, and finalizes on completion, failure or cancellation.
    ///
    /// When the assembler ends the stream early the cancel signal is raised
    /// so the transport stops producing.
    pub async fn run<T>(
        &mut self,
        transport: &T,
        request: &GenerationRequest,
        raw_prompt: &str,
        cancel: CancelSignal,
        emit: &mut (dyn FnMut(AssemblyEvent) + Send),
    ) -> StreamOutcome
    where
        T: GenerationTransport + ?Sized,
    {
        self.begin(raw_prompt, emit);

        let mut stream = match transport.open(request, cancel.clone()).await {
            Ok(stream) => stream,
            Err(TransportError::Cancelled) => return self.stop_cancelled(emit),
            Err(error) => {
                return self
                    .fail(&error, emit)
                    .unwrap_or_else(|| self.stop_cancelled(emit));
            }
        };

        loop {
            if is_cancelled(Some(&cancel)) {
                return self.stop_cancelled(emit);
            }
            let next = match await_or_cancel(stream.next(), Some(&cancel)).await {
                Ok(next) => next,
                Err(_) => return self.stop_cancelled(emit),
            };

            let outcome = match next {
                Some(Ok(event)) => self.apply(event, emit),
                Some(Err(TransportError::Cancelled)) => Some(self.stop_cancelled(emit)),
                Some(Err(error)) => self.fail(&error, emit),
                None => self.finish(emit),
            };

            if let Some(outcome) = outcome {
                if !matches!(outcome.ending, StreamEnding::Cancelled) {
                    cancel.store(true, std::sync::atomic::Ordering::Release);
                }
                return outcome;
            }
        }
    }

    fn stop_cancelled(&mut self, emit: &mut dyn FnMut(AssemblyEvent)) -> StreamOutcome {
        self.cancel(emit)
            .unwrap_or_else(|| self.finalize(StreamEnding::Cancelled, emit))
    }
}
