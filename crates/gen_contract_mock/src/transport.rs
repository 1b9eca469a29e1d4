use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream;
use gen_contract::{
    is_cancelled, CancelSignal, ChunkEvent, ChunkStream, GenerationRequest, GenerationTransport,
    TransportError,
};

use crate::lock_unpoisoned;

/// One scripted step of a mock generation stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptStep {
    Token(String),
    /// An error-type chunk event.
    Error(String),
    Done,
    /// A transport failure surfaced as a stream item.
    Fail(TransportError),
    Delay(Duration),
}

/// Deterministic transport replaying a fixed script for every request.
#[derive(Debug)]
pub struct ScriptedTransport {
    steps: Vec<ScriptStep>,
    open_error: Option<TransportError>,
    token_delay: Duration,
    opened: Mutex<Vec<GenerationRequest>>,
    delivered: Arc<AtomicUsize>,
}

impl ScriptedTransport {
    #[must_use]
    pub fn with_steps(steps: Vec<ScriptStep>) -> Self {
        Self {
            steps,
            open_error: None,
            token_delay: Duration::ZERO,
            opened: Mutex::new(Vec::new()),
            delivered: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Tokens followed by a done event.
    #[must_use]
    pub fn tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut steps: Vec<ScriptStep> = tokens
            .into_iter()
            .map(|token| ScriptStep::Token(token.into()))
            .collect();
        steps.push(ScriptStep::Done);
        Self::with_steps(steps)
    }

    /// Transport whose `open` fails before any event is produced.
    #[must_use]
    pub fn failing(error: TransportError) -> Self {
        let mut transport = Self::with_steps(Vec::new());
        transport.open_error = Some(error);
        transport
    }

    #[must_use]
    pub fn with_token_delay(mut self, delay: Duration) -> Self {
        self.token_delay = delay;
        self
    }

    /// Requests observed by `open`, in call order.
    pub fn opened_requests(&self) -> Vec<GenerationRequest> {
        lock_unpoisoned(&self.opened).clone()
    }

    /// Number of stream items handed to consumers so far, across all streams.
    pub fn delivered_count(&self) -> usize {
        self.delivered.load(Ordering::Acquire)
    }
}

struct StreamState {
    steps: VecDeque<ScriptStep>,
    sequence: u64,
    started: bool,
    finished: bool,
    token_delay: Duration,
    cancel: CancelSignal,
    delivered: Arc<AtomicUsize>,
}

impl StreamState {
    fn next_sequence(&mut self) -> u64 {
        let sequence = self.sequence;
        self.sequence += 1;
        sequence
    }

    fn deliver(
        &mut self,
        item: Result<ChunkEvent, TransportError>,
    ) -> Option<Result<ChunkEvent, TransportError>> {
        self.delivered.fetch_add(1, Ordering::AcqRel);
        Some(item)
    }
}

#[async_trait]
impl GenerationTransport for ScriptedTransport {
    async fn open(
        &self,
        request: &GenerationRequest,
        cancel: CancelSignal,
    ) -> Result<ChunkStream, TransportError> {
        lock_unpoisoned(&self.opened).push(request.clone());
        if let Some(error) = &self.open_error {
            return Err(error.clone());
        }

        let state = StreamState {
            steps: self.steps.iter().cloned().collect(),
            sequence: 0,
            started: false,
            finished: false,
            token_delay: self.token_delay,
            cancel,
            delivered: Arc::clone(&self.delivered),
        };

        let events = stream::unfold(state, |mut state| async move {
            if state.finished || is_cancelled(Some(&state.cancel)) {
                return None;
            }
            if !state.started {
                state.started = true;
                let sequence = state.next_sequence();
                let item = state.deliver(Ok(ChunkEvent::start(sequence)));
                return item.map(|item| (item, state));
            }

            loop {
                let step = state.steps.pop_front()?;
                let item = match step {
                    ScriptStep::Delay(delay) => {
                        tokio::time::sleep(delay).await;
                        if is_cancelled(Some(&state.cancel)) {
                            return None;
                        }
                        continue;
                    }
                    ScriptStep::Token(text) => {
                        if !state.token_delay.is_zero() {
                            tokio::time::sleep(state.token_delay).await;
                        }
                        if is_cancelled(Some(&state.cancel)) {
                            return None;
                        }
                        let sequence = state.next_sequence();
                        Ok(ChunkEvent::token(sequence, text))
                    }
                    ScriptStep::Error(message) => {
                        state.finished = true;
                        let sequence = state.next_sequence();
                        Ok(ChunkEvent::error(sequence, message))
                    }
                    ScriptStep::Done => {
                        state.finished = true;
                        let sequence = state.next_sequence();
                        Ok(ChunkEvent::done(sequence))
                    }
                    ScriptStep::Fail(error) => {
                        state.finished = true;
                        Err(error)
                    }
                };
                let item = state.deliver(item);
                return item.map(|item| (item, state));
            }
        });

        Ok(Box::pin(events))
    }
}
