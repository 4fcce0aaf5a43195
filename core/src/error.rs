//! Error taxonomy for the timer API client.
//!
//! # Design
//! Every failure the client or engine can observe is classified into exactly
//! one of three variants before it is stored or surfaced. `Validation` is
//! raised locally before any request is issued, `Network` means no usable
//! response was received, and `HttpStatus` means the server answered with a
//! non-2xx status. Callers that only need a message use [`ApiError::message`];
//! callers that want richer handling match on the variant or [`ErrorKind`].

use serde_json::Value;
use thiserror::Error;

/// Errors produced by `HttpClient`, `TimerRepository` and the sync engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiError {
    /// Malformed or missing input, detected before any network call.
    #[error("validation failed: {message}")]
    Validation { message: String },

    /// The transport failed and no response was received, or the response
    /// body could not be decoded into the expected shape.
    #[error("network error for {url}: {message}")]
    Network { message: String, url: String },

    /// The server responded with a non-2xx status.
    #[error("HTTP {status}: {message}")]
    HttpStatus {
        status: u16,
        code: Option<i64>,
        message: String,
        details: Option<Value>,
    },
}

/// Discriminant of [`ApiError`], for callers that branch on the failure kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Network,
    HttpStatus,
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation {
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>, url: impl Into<String>) -> Self {
        ApiError::Network {
            message: message.into(),
            url: url.into(),
        }
    }

    /// Human-readable message, without the variant prefix used by `Display`.
    pub fn message(&self) -> &str {
        match self {
            ApiError::Validation { message }
            | ApiError::Network { message, .. }
            | ApiError::HttpStatus { message, .. } => message,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Validation { .. } => ErrorKind::Validation,
            ApiError::Network { .. } => ErrorKind::Network,
            ApiError::HttpStatus { .. } => ErrorKind::HttpStatus,
        }
    }

    /// HTTP status for `HttpStatus` errors, `None` otherwise.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}
