use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Setup problems. The CLI maps these to exit code 2.
#[derive(Debug, Error)]
#[error("config error: {0}")]
pub struct ConfigError(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderErrorKind {
    RateLimited,
    Timeout,
    Auth,
    Unavailable,
    Other,
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProviderErrorKind::RateLimited => "RATE_LIMITED",
            ProviderErrorKind::Timeout => "TIMEOUT",
            ProviderErrorKind::Auth => "AUTH",
            ProviderErrorKind::Unavailable => "UNAVAILABLE",
            ProviderErrorKind::Other => "OTHER",
        })
    }
}

#[derive(Debug, Clone, Error)]
#[error("provider error [{kind}]: {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn from_status(status: u16, body: &str) -> Self {
        let kind = match status {
            429 => ProviderErrorKind::RateLimited,
            401 | 403 => ProviderErrorKind::Auth,
            408 | 504 => ProviderErrorKind::Timeout,
            500..=599 => ProviderErrorKind::Unavailable,
            _ => ProviderErrorKind::Other,
        };
        Self::new(kind, format!("HTTP {}: {}", status, body))
    }

    pub fn is_rate_limited(&self) -> bool {
        self.kind == ProviderErrorKind::RateLimited
    }
}

/// Returns the provider error kind carried by an `anyhow` chain, if any.
pub fn provider_error_kind(e: &anyhow::Error) -> Option<ProviderErrorKind> {
    e.chain()
        .find_map(|c| c.downcast_ref::<ProviderError>())
        .map(|p| p.kind)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionErrorKind {
    Syntax,
    Schema,
    Permission,
    Timeout,
    Unknown,
}

impl fmt::Display for ExecutionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExecutionErrorKind::Syntax => "SYNTAX",
            ExecutionErrorKind::Schema => "SCHEMA",
            ExecutionErrorKind::Permission => "PERMISSION",
            ExecutionErrorKind::Timeout => "TIMEOUT",
            ExecutionErrorKind::Unknown => "UNKNOWN",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}: {message}")]
pub struct ExecutionError {
    pub kind: ExecutionErrorKind,
    pub message: String,
}

impl ExecutionError {
    pub fn new(kind: ExecutionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Buckets a raw store message into a kind.
    pub fn classify(message: &str) -> Self {
        let m = message.to_ascii_lowercase();
        let kind = if m.contains("syntax error")
            || m.contains("incomplete input")
            || m.contains("unrecognized token")
        {
            ExecutionErrorKind::Syntax
        } else if m.contains("no such table")
            || m.contains("no such column")
            || m.contains("ambiguous column")
            || m.contains("no such function")
            || m.contains("misuse of aggregate")
            || m.contains("wrong number of arguments")
        {
            ExecutionErrorKind::Schema
        } else if m.contains("readonly")
            || m.contains("read-only")
            || m.contains("not authorized")
            || m.contains("permission")
        {
            ExecutionErrorKind::Permission
        } else if m.contains("interrupt") || m.contains("timeout") || m.contains("timed out") {
            ExecutionErrorKind::Timeout
        } else {
            ExecutionErrorKind::Unknown
        };
        Self::new(kind, message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("policy violation: {reason}")]
pub struct PolicyViolation {
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum SelectionError {
    /// The embedder could not be reached or returned an error.
    #[error("embedding provider unavailable: {0}")]
    ExternalDependency(String),
    #[error("similarity error: {0}")]
    Similarity(String),
}
