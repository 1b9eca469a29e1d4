use std::fmt;

use gen_contract::{RemoteError, TransportError};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Error as JsonError;

#[derive(Debug)]
pub enum GenApiError {
    MissingAccessToken,
    InvalidHeader(String),
    Request(reqwest::Error),
    Status(StatusCode, String),
    MalformedPayload(String),
    Serde(JsonError),
    RetryExhausted {
        status: Option<StatusCode>,
        last_error: Option<String>,
    },
    IdleTimeout,
    Cancelled,
    Unknown(String),
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorPayload {
    #[serde(rename = "error")]
    pub value: Option<ErrorPayloadValue>,
    pub detail: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum ErrorPayloadValue {
    Text(String),
    Fields {
        message: Option<String>,
        code: Option<String>,
    },
}

impl ErrorPayload {
    fn message(&self) -> Option<String> {
        let from_value = match &self.value {
            Some(ErrorPayloadValue::Text(text)) => non_empty_string(text),
            Some(ErrorPayloadValue::Fields { message, code }) => message
                .as_deref()
                .and_then(non_empty_string)
                .or_else(|| code.as_deref().and_then(non_empty_string)),
            None => None,
        };
        from_value
            .or_else(|| self.detail.as_deref().and_then(non_empty_string))
            .map(ToString::to_string)
    }
}

impl fmt::Display for GenApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingAccessToken => write!(f, "access token is required"),
            Self::InvalidHeader(message) => write!(f, "invalid header: {message}"),
            Self::Request(error) => write!(f, "request error: {error}"),
            Self::Status(status, message) => write!(f, "HTTP {status} {message}"),
            Self::MalformedPayload(message) => write!(f, "malformed payload: {message}"),
            Self::Serde(error) => write!(f, "serialization error: {error}"),
            Self::RetryExhausted { status, last_error } => {
                let status = status
                    .map(|status| status.as_u16().to_string())
                    .unwrap_or_else(|| "n/a".to_owned());
                write!(f, "retry exhausted after max attempts (status: {status}, last_error: {last_error:?})")
            }
            Self::IdleTimeout => write!(f, "stream idle timeout elapsed"),
            Self::Cancelled => write!(f, "request was cancelled"),
            Self::Unknown(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for GenApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Request(error) => Some(error),
            Self::Serde(error) => Some(error),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for GenApiError {
    fn from(error: reqwest::Error) -> Self {
        Self::Request(error)
    }
}

impl From<JsonError> for GenApiError {
    fn from(error: JsonError) -> Self {
        Self::Serde(error)
    }
}

impl GenApiError {
    /// Classify into the contract's transport error.
    pub fn into_transport_error(self) -> TransportError {
        match self {
            Self::Request(error) => classify_request_error(&error),
            Self::Status(status, message) => classify_status(status, message),
            Self::RetryExhausted { status, last_error } => {
                let message = last_error.unwrap_or_else(|| "request failed".to_owned());
                match status {
                    Some(status) => classify_status(status, message),
                    None => TransportError::Unreachable(message),
                }
            }
            Self::IdleTimeout => TransportError::Timeout,
            Self::Cancelled => TransportError::Cancelled,
            Self::MalformedPayload(message) => TransportError::MalformedEvent(message),
            Self::Serde(error) => TransportError::MalformedEvent(error.to_string()),
            Self::MissingAccessToken => TransportError::Unauthorized { status: 401 },
            Self::InvalidHeader(message) | Self::Unknown(message) => {
                TransportError::StreamFailed(message)
            }
        }
    }

    /// Classify into the contract's remote-store error.
    pub fn into_remote_error(self) -> RemoteError {
        match self {
            Self::MissingAccessToken => RemoteError::MissingCredential,
            Self::Request(error) if error.is_timeout() => RemoteError::Timeout,
            Self::IdleTimeout => RemoteError::Timeout,
            Self::Request(error) if error.is_decode() => RemoteError::Malformed(error.to_string()),
            Self::Request(error) => RemoteError::Unreachable(error.to_string()),
            Self::Status(status, message) => RemoteError::Status {
                status: status.as_u16(),
                message,
            },
            Self::RetryExhausted { status, last_error } => {
                let message = last_error.unwrap_or_else(|| "request failed".to_owned());
                match status {
                    Some(status) => RemoteError::Status {
                        status: status.as_u16(),
                        message,
                    },
                    None => RemoteError::Unreachable(message),
                }
            }
            Self::MalformedPayload(message) => RemoteError::Malformed(message),
            Self::Serde(error) => RemoteError::Malformed(error.to_string()),
            Self::Cancelled => RemoteError::Unreachable("request was cancelled".to_owned()),
            Self::InvalidHeader(message) | Self::Unknown(message) => {
                RemoteError::Unreachable(message)
            }
        }
    }
}

fn classify_request_error(error: &reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout
    } else if error.is_decode() || error.is_body() {
        TransportError::MalformedEvent(error.to_string())
    } else if let Some(status) = error.status() {
        classify_status(status, error.to_string())
    } else {
        TransportError::Unreachable(error.to_string())
    }
}

fn classify_status(status: StatusCode, message: String) -> TransportError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => TransportError::Unauthorized {
            status: status.as_u16(),
        },
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => TransportError::Timeout,
        _ => TransportError::Status {
            status: status.as_u16(),
            message,
        },
    }
}

pub fn parse_error_message(status: StatusCode, body: &str) -> String {
    let fallback = || {
        if body.trim().is_empty() {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        } else {
            body.trim().to_string()
        }
    };

    match serde_json::from_str::<ErrorPayload>(body) {
        Ok(payload) => payload.message().unwrap_or_else(fallback),
        Err(_) => fallback(),
    }
}

fn non_empty_string(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}
