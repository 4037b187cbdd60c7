//! Unified error taxonomy for provider calls

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Class of a provider failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Unknown provider or model; the call never left the process
    Configuration,
    /// Credential rejected (401/403)
    Invalid,
    /// 429
    RateLimitExceeded,
    /// 5xx
    ServerError,
    /// Any other failure with a known cause
    OtherError,
    /// The backend answered with something we could not interpret
    UnknownError,
}

impl ErrorKind {
    /// Classify an HTTP status code
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => ErrorKind::Invalid,
            429 => ErrorKind::RateLimitExceeded,
            s if s >= 500 => ErrorKind::ServerError,
            _ => ErrorKind::OtherError,
        }
    }

    /// Classify an error reported inside a stream by its type name
    ///
    /// Covers Anthropic `error.type`, OpenAI `error.type`/`error.code` and
    /// Gemini `error.status` values.
    pub fn from_error_type(kind: &str) -> Self {
        match kind {
            "authentication_error" | "permission_error" | "invalid_api_key" | "UNAUTHENTICATED"
            | "PERMISSION_DENIED" => ErrorKind::Invalid,
            "rate_limit_error" | "rate_limit_exceeded" | "insufficient_quota"
            | "RESOURCE_EXHAUSTED" => ErrorKind::RateLimitExceeded,
            "api_error" | "overloaded_error" | "server_error" | "INTERNAL" | "UNAVAILABLE"
            | "DEADLINE_EXCEEDED" => ErrorKind::ServerError,
            _ => ErrorKind::OtherError,
        }
    }

    /// Transient failures a caller may retry by hand
    pub fn is_transient(&self) -> bool {
        matches!(self, ErrorKind::RateLimitExceeded | ErrorKind::ServerError)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Configuration => write!(f, "configuration"),
            ErrorKind::Invalid => write!(f, "invalid"),
            ErrorKind::RateLimitExceeded => write!(f, "rate_limit_exceeded"),
            ErrorKind::ServerError => write!(f, "server_error"),
            ErrorKind::OtherError => write!(f, "other_error"),
            ErrorKind::UnknownError => write!(f, "unknown_error"),
        }
    }
}

/// A failed provider call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct LlmError {
    /// Failure class
    pub kind: ErrorKind,
    /// Human-readable message, forwarded to users as is
    pub message: String,
    /// HTTP status when the backend returned one
    pub status: Option<u16>,
}

impl LlmError {
    /// Create an error of the given kind
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
        }
    }

    /// Unknown provider or model
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    /// Error derived from an HTTP status
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::from_status(status),
            message: message.into(),
            status: Some(status),
        }
    }

    /// Error event received after the stream started
    ///
    /// A numeric code wins over the type name.
    pub fn in_stream(code: Option<u16>, kind: Option<&str>, message: impl Into<String>) -> Self {
        match code {
            Some(code) => Self::from_status(code, message),
            None => Self::new(ErrorKind::from_error_type(kind.unwrap_or_default()), message),
        }
    }

    /// Stream payload that could not be decoded
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnknownError, message)
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => LlmError::from_status(status.as_u16(), err.to_string()),
            None => LlmError::new(ErrorKind::OtherError, err.to_string()),
        }
    }
}

/// Pull `error.message` out of a JSON error body, falling back to the raw
/// text and then to the status line
pub fn error_message_from_body(status: reqwest::StatusCode, body: &str) -> String {
    let parsed = serde_json::from_str::<serde_json::Value>(body).ok();
    let from_json = parsed.as_ref().and_then(|value| {
        value
            .pointer("/error/message")
            .or_else(|| value.pointer("/0/error/message"))
            .and_then(|m| m.as_str())
            .map(str::to_string)
    });

    match from_json {
        Some(message) => message,
        None if !body.trim().is_empty() => body.trim().to_string(),
        None => status.to_string(),
    }
}
