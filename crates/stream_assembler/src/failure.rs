use gen_contract::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    NetworkUnreachable,
    Timeout,
    MalformedEvent,
    Unauthorized,
    Server,
    Generation,
}

/// Classified stream failure with the detail reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFailure {
    pub kind: FailureKind,
    pub detail: String,
}

impl StreamFailure {
    pub fn from_transport(error: &TransportError) -> Self {
        let kind = match error {
            TransportError::Unreachable(_) => FailureKind::NetworkUnreachable,
            TransportError::Timeout => FailureKind::Timeout,
            TransportError::MalformedEvent(_) => FailureKind::MalformedEvent,
            TransportError::Unauthorized { .. } => FailureKind::Unauthorized,
            TransportError::Status { .. } => FailureKind::Server,
            TransportError::StreamFailed(_) | TransportError::Cancelled => {
                FailureKind::NetworkUnreachable
            }
        };
        Self {
            kind,
            detail: error.to_string(),
        }
    }

    /// An error event emitted by the backend inside an otherwise healthy stream.
    pub fn from_error_event(message: &str) -> Self {
        let detail = message.trim();
        Self {
            kind: FailureKind::Generation,
            detail: if detail.is_empty() {
                "unknown generation error".to_string()
            } else {
                detail.to_string()
            },
        }
    }

    pub fn user_message(&self) -> String {
        match self.kind {
            FailureKind::NetworkUnreachable => {
                "Could not reach the code generation service. Check your connection and try again."
                    .to_string()
            }
            FailureKind::Timeout => {
                "The code generation service took too long to respond. Please try again."
                    .to_string()
            }
            FailureKind::MalformedEvent => {
                "The code generation service sent a response that could not be read.".to_string()
            }
            FailureKind::Unauthorized => {
                "The code generation service rejected the credentials. Sign in again and retry."
                    .to_string()
            }
            FailureKind::Server => format!(
                "The code generation service reported an error ({}).",
                self.detail
            ),
            FailureKind::Generation => format!("Generation failed: {}", self.detail),
        }
    }

    /// Stand-in artifact shown in place of code when a stream errored.
    pub fn artifact(&self) -> String {
        format!("# {}", self.user_message())
    }
}

impl std::fmt::Display for StreamFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.user_message())
    }
}
