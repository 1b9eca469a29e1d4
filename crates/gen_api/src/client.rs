use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{stream, Stream, StreamExt};
use gen_contract::{
    await_or_cancel, is_cancelled, CancelSignal, ChunkEvent, ChunkStream, GenerationRequest,
    GenerationTransport, TransportError,
};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, RequestBuilder, Response, StatusCode};

use crate::config::GenApiConfig;
use crate::error::{parse_error_message, GenApiError};
use crate::events::GenStreamEvent;
use crate::headers::{build_headers, ACCEPT_EVENT_STREAM};
use crate::payload::GenerateRequestBody;
use crate::retry::{is_retryable_http_error, retry_delay};
use crate::sse::EventLineParser;
use crate::url::{endpoint_url, Endpoint};

#[derive(Debug, Clone)]
pub struct GenApiClient {
    pub(crate) http: Client,
    pub(crate) config: GenApiConfig,
}

impl GenApiClient {
    pub fn new(config: GenApiConfig) -> Result<Self, GenApiError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        let http = builder.build().map_err(GenApiError::from)?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &GenApiConfig {
        &self.config
    }

    pub fn endpoint(&self, endpoint: Endpoint<'_>) -> String {
        endpoint_url(&self.config.base_url, endpoint)
    }

    pub(crate) fn header_map(
        headers: impl IntoIterator<Item = (String, String)>,
    ) -> Result<HeaderMap, GenApiError> {
        let mut out = HeaderMap::new();
        for (key, value) in headers {
            out.insert(
                HeaderName::from_bytes(key.as_bytes())
                    .map_err(|_| GenApiError::InvalidHeader(format!("invalid header key: {key}")))?,
                HeaderValue::from_str(&value).map_err(|_| {
                    GenApiError::InvalidHeader(format!("invalid header value for {key}"))
                })?,
            );
        }
        Ok(out)
    }

    pub fn build_generation_request(
        &self,
        request: &GenerationRequest,
    ) -> Result<RequestBuilder, GenApiError> {
        let headers = Self::header_map(build_headers(&self.config, ACCEPT_EVENT_STREAM))?;
        let body = GenerateRequestBody::from(request);
        Ok(self
            .http
            .post(self.endpoint(Endpoint::GenerateStream))
            .headers(headers)
            .json(&body))
    }

    /// Sends a request, retrying transient failures with exponential backoff.
    ///
    /// Retries only happen before a successful response is returned, so a
    /// stream is never replayed once its body has started.
    pub async fn send_with_retry<F>(
        &self,
        build: F,
        cancellation: Option<&CancelSignal>,
    ) -> Result<Response, GenApiError>
    where
        F: Fn() -> Result<RequestBuilder, GenApiError>,
    {
        let max_retries = self.config.max_retries;
        let mut last_status: Option<StatusCode> = None;
        let mut last_error = None;

        for attempt in 0..=max_retries {
            if is_cancelled(cancellation) {
                return Err(GenApiError::Cancelled);
            }

            let response = build()?.send();
            let response = await_or_cancel(response, cancellation)
                .await
                .map_err(|_| GenApiError::Cancelled)?
                .map_err(GenApiError::from);

            match response {
                Ok(response) => {
                    if response.status().is_success() {
                        return Ok(response);
                    }

                    let status = response.status();
                    last_status = Some(status);
                    let body = await_or_cancel(response.text(), cancellation)
                        .await
                        .map_err(|_| GenApiError::Cancelled)?
                        .unwrap_or_else(|_| {
                            status
                                .canonical_reason()
                                .unwrap_or("request failed")
                                .to_string()
                        });
                    let message = parse_error_message(status, &body);
                    last_error = Some(message.clone());

                    if attempt < max_retries && is_retryable_http_error(status.as_u16(), &body) {
                        tracing::debug!(%status, attempt, "retrying request after retryable status");
                        self.backoff(attempt, cancellation).await?;
                        continue;
                    }

                    return Err(GenApiError::Status(status, message));
                }
                Err(GenApiError::Request(error)) if error.is_timeout() => {
                    return Err(GenApiError::Request(error));
                }
                Err(error) => {
                    let message = error.to_string();
                    last_error = Some(message);
                    if attempt < max_retries {
                        tracing::debug!(attempt, error = ?last_error, "retrying request after transport error");
                        self.backoff(attempt, cancellation).await?;
                        continue;
                    }
                    return Err(GenApiError::RetryExhausted {
                        status: last_status,
                        last_error,
                    });
                }
            }
        }

        Err(GenApiError::RetryExhausted {
            status: last_status,
            last_error,
        })
    }

    async fn backoff(
        &self,
        attempt: u32,
        cancellation: Option<&CancelSignal>,
    ) -> Result<(), GenApiError> {
        let delay = retry_delay(self.config.retry_base_delay, attempt);
        await_or_cancel(tokio::time::sleep(delay), cancellation)
            .await
            .map_err(|_| GenApiError::Cancelled)
    }

    /// Opens the generation stream and maps wire lines into chunk events.
    pub async fn stream_generation(
        &self,
        request: &GenerationRequest,
        cancel: CancelSignal,
    ) -> Result<ChunkStream, GenApiError> {
        let response = self
            .send_with_retry(|| self.build_generation_request(request), Some(&cancel))
            .await?;
        tracing::debug!(status = %response.status(), "generation stream opened");
        Ok(chunk_stream(
            response.bytes_stream(),
            cancel,
            self.config.stream_idle_timeout,
        ))
    }
}

#[async_trait]
impl GenerationTransport for GenApiClient {
    async fn open(
        &self,
        request: &GenerationRequest,
        cancel: CancelSignal,
    ) -> Result<ChunkStream, TransportError> {
        self.stream_generation(request, cancel)
            .await
            .map_err(GenApiError::into_transport_error)
    }
}

struct BodyState<S> {
    body: Pin<Box<S>>,
    parser: EventLineParser,
    pending: VecDeque<Result<ChunkEvent, TransportError>>,
    sequence: u64,
    finished: bool,
    cancel: CancelSignal,
    idle_timeout: Option<Duration>,
}

impl<S> BodyState<S> {
    fn next_sequence(&mut self) -> u64 {
        let sequence = self.sequence;
        self.sequence += 1;
        sequence
    }

    fn push_events(&mut self, events: Vec<GenStreamEvent>) {
        for event in events {
            if self.finished {
                return;
            }
            let sequence = self.next_sequence();
            let chunk = match event {
                GenStreamEvent::Text { text } => ChunkEvent::token(sequence, text),
                GenStreamEvent::Error { message } => {
                    self.finished = true;
                    ChunkEvent::error(sequence, message)
                }
                GenStreamEvent::Done => {
                    self.finished = true;
                    ChunkEvent::done(sequence)
                }
            };
            self.pending.push_back(Ok(chunk));
        }
    }

    fn fail(&mut self, error: TransportError) {
        self.finished = true;
        self.pending.push_back(Err(error));
    }
}

/// Adapts a response body into ordered chunk events.
///
/// A start event is emitted first; a body that ends without the completion
/// sentinel is treated as a natural end and closed with a done event.
pub fn chunk_stream<S, B>(
    body: S,
    cancel: CancelSignal,
    idle_timeout: Option<Duration>,
) -> ChunkStream
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + 'static,
    B: AsRef<[u8]> + Send,
{
    let mut state = BodyState {
        body: Box::pin(body),
        parser: EventLineParser::default(),
        pending: VecDeque::new(),
        sequence: 0,
        finished: false,
        cancel,
        idle_timeout,
    };
    let start = state.next_sequence();
    state.pending.push_back(Ok(ChunkEvent::start(start)));

    let events = stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }

            let next = state.body.next();
            let next = match state.idle_timeout {
                Some(limit) => match await_or_cancel(
                    tokio::time::timeout(limit, next),
                    Some(&state.cancel),
                )
                .await
                {
                    Ok(Ok(next)) => next,
                    Ok(Err(_elapsed)) => {
                        state.fail(TransportError::Timeout);
                        continue;
                    }
                    Err(_cancelled) => return None,
                },
                None => match await_or_cancel(next, Some(&state.cancel)).await {
                    Ok(next) => next,
                    Err(_cancelled) => return None,
                },
            };

            match next {
                Some(Ok(bytes)) => {
                    let events = state.parser.feed(bytes.as_ref());
                    state.push_events(events);
                }
                Some(Err(error)) => {
                    state.fail(GenApiError::from(error).into_transport_error());
                }
                None => {
                    let events = state.parser.finish();
                    state.push_events(events);
                    if !state.finished {
                        let sequence = state.next_sequence();
                        state.finished = true;
                        state.pending.push_back(Ok(ChunkEvent::done(sequence)));
                    }
                }
            }
        }
    });

    Box::pin(events)
}
