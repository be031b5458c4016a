//! Error types for portal operations.
//!
//! This module defines [`PortalError`] which covers every failure the cache and
//! HTTP layers can report, and [`handle_api_error`] which turns any of them
//! into the message shown in UI error banners.

use thiserror::Error;

/// Message used when nothing more specific can be extracted from an error.
pub const FALLBACK_MESSAGE: &str = "An unexpected error occurred";

/// Errors that can occur during portal data operations.
///
/// The type is `Clone` so that a single in-flight fetch can hand the same
/// outcome to every caller waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PortalError {
    /// No response reached the client (offline, DNS failure, timeout).
    #[error("Network error: {0}")]
    Network(String),

    /// The backend answered with a failure.
    #[error("HTTP {status}: {}", http_summary(.message, .body_message))]
    Http {
        /// HTTP status code (or the envelope's status for `success: false`).
        status: u16,
        /// Structured backend message from the response envelope.
        message: Option<String>,
        /// Generic message found elsewhere in the error body.
        body_message: Option<String>,
        /// Field-level error details from the envelope.
        errors: Vec<String>,
    },

    /// Anything else, wrapping the original message.
    #[error("Unexpected error: {0}")]
    Unexpected(String),

    /// Snapshot storage could not be read or written.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The operation was cancelled before it completed.
    #[error("Operation cancelled")]
    Cancelled,
}

impl PortalError {
    /// Builds an [`PortalError::Http`] carrying only a status code.
    #[must_use]
    pub const fn http(status: u16) -> Self {
        Self::Http {
            status,
            message: None,
            body_message: None,
            errors: Vec::new(),
        }
    }

    /// Returns true when no response was received.
    #[must_use]
    pub const fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    /// Returns the HTTP status when the backend answered.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The low-level message of the error, without backend-supplied text.
    ///
    /// For HTTP failures this is a generic per-status message.
    #[must_use]
    pub fn exception_message(&self) -> String {
        match self {
            Self::Network(msg) | Self::Unexpected(msg) | Self::Persistence(msg) => msg.clone(),
            Self::InvalidParameter(msg) => format!("Invalid parameter: {msg}"),
            Self::Cancelled => "Operation cancelled".to_string(),
            Self::Http { status, .. } => match status {
                401 => "Authentication required".to_string(),
                403 => "Access denied".to_string(),
                404 => "Resource not found".to_string(),
                s if *s >= 500 => format!("Server error (status {s})"),
                s => format!("Request failed with status code {s}"),
            },
        }
    }
}

fn http_summary<'a>(message: &'a Option<String>, body_message: &'a Option<String>) -> &'a str {
    message
        .as_deref()
        .or(body_message.as_deref())
        .unwrap_or("request failed")
}

/// Extracts a human-readable message from an error.
///
/// Precedence: structured backend message, then generic HTTP body message,
/// then the exception message, then [`FALLBACK_MESSAGE`].
#[must_use]
pub fn handle_api_error(error: &PortalError) -> String {
    let non_empty = |s: &Option<String>| {
        s.as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
    };

    if let PortalError::Http {
        message,
        body_message,
        ..
    } = error
    {
        if let Some(msg) = non_empty(message).or_else(|| non_empty(body_message)) {
            return msg;
        }
    }

    let exception = error.exception_message();
    if exception.trim().is_empty() {
        FALLBACK_MESSAGE.to_string()
    } else {
        exception
    }
}

/// Result type alias using [`PortalError`].
pub type Result<T> = std::result::Result<T, PortalError>;
