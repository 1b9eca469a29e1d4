use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use thiserror::Error;

use crate::cancel::CancelSignal;
use crate::chunk::ChunkEvent;
use crate::request::GenerationRequest;

/// Ordered chunk events for one open generation stream.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ChunkEvent, TransportError>> + Send>>;

/// Transport-level failure, already classified by cause.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("generation service unreachable: {0}")]
    Unreachable(String),
    #[error("generation request timed out")]
    Timeout,
    #[error("malformed stream event: {0}")]
    MalformedEvent(String),
    #[error("generation service rejected the credential (HTTP {status})")]
    Unauthorized { status: u16 },
    #[error("generation service returned HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("generation stream failed: {0}")]
    StreamFailed(String),
    #[error("generation was cancelled")]
    Cancelled,
}

/// Opens chunked generation responses.
///
/// Implementations must deliver events in wire order and stop producing events
/// once `cancel` is set or the returned stream is dropped.
#[async_trait]
pub trait GenerationTransport: Send + Sync {
    async fn open(
        &self,
        request: &GenerationRequest,
        cancel: CancelSignal,
    ) -> Result<ChunkStream, TransportError>;
}
