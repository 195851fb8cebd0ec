// src/error.rs

//! Unified error handling for the event crawler.
//!
//! Every error carries an [`ErrorKind`] used for logging, reporting and alert
//! routing, and a retry classification consumed by the retry executor.

use std::error::Error as StdError;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pipeline::retry::Retryable;

/// Result type alias for crawler operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Coarse error taxonomy shared by logs, reports and alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// Fetch, timeout and connection failures
    Network,
    /// Markup or feed shape mismatches, including structural drift
    Parsing,
    /// Event store reads and writes
    Database,
    /// Malformed configuration or candidate data
    Validation,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::Parsing => "parsing",
            ErrorKind::Database => "database",
            ErrorKind::Validation => "validation",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed before a response was read
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("HTTP error! status: {status} ({url})")]
    HttpStatus { url: String, status: u16 },

    /// Fetch cancelled after the configured timeout
    #[error("Request timeout after {after_ms}ms: {url}")]
    Timeout { url: String, after_ms: u64 },

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Document could not be parsed as the expected format
    #[error("Parse error in {context}: {message}")]
    Parse { context: String, message: String },

    /// Source responded but its yield no longer matches its history
    #[error("Structure change detected: {reason}")]
    StructureChanged { reason: String },

    /// Event store rejected or failed an operation
    #[error("Store error: {0}")]
    Store(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Anything that could not be classified more precisely
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a document parse error with context.
    pub fn parse(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Parse {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create a store error.
    pub fn store(message: impl fmt::Display) -> Self {
        Self::Store(message.to_string())
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Classify the error into the reporting taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Http(_)
            | AppError::HttpStatus { .. }
            | AppError::Timeout { .. }
            | AppError::Other(_) => ErrorKind::Network,
            AppError::Selector { .. }
            | AppError::Parse { .. }
            | AppError::StructureChanged { .. } => ErrorKind::Parsing,
            AppError::Io(_) | AppError::Json(_) | AppError::Store(_) => ErrorKind::Database,
            AppError::Toml(_)
            | AppError::Url(_)
            | AppError::Config(_)
            | AppError::Validation(_) => ErrorKind::Validation,
        }
    }

    /// Whether repeating the failed operation may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Timeout { .. } => true,
            AppError::HttpStatus { status, .. } => is_retryable_status(*status),
            AppError::Http(e) => match e.status() {
                Some(status) => is_retryable_status(status.as_u16()),
                None => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            },
            other => matches!(other.kind(), ErrorKind::Network | ErrorKind::Database),
        }
    }

    /// Render the error and its source chain, outermost first.
    pub fn trace(&self) -> String {
        let mut lines = vec![self.to_string()];
        let mut source = self.source();
        while let Some(err) = source {
            lines.push(format!("caused by: {err}"));
            source = err.source();
        }
        lines.join("\n")
    }
}

impl Retryable for AppError {
    fn is_retryable(&self) -> bool {
        AppError::is_retryable(self)
    }
}

fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}
