//! Error types for configuration and fetch cycles.

use thiserror::Error;

use crate::refresh::types::SourceKind;

/// Raw payloads attached to parse errors are cut to this many bytes.
pub const RAW_PAYLOAD_LIMIT: usize = 2048;

/// Errors raised while reaching or decoding an external service.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Host unreachable, timed out, or answered with a transient status
    #[error("network error: {0}")]
    Network(String),

    /// Credential missing, invalid, or expired
    #[error("auth error: HTTP {status}")]
    Auth { status: u16 },

    /// Service refused the request for a non-transient reason (unknown user, missing folder)
    #[error("request rejected: HTTP {status}")]
    Rejected { status: u16 },

    /// Response body did not have the expected shape
    #[error("parse error: {message}")]
    Parse { message: String, raw: String },
}

impl FetchError {
    /// Only network failures are worth retrying before the next cadence tick.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Network(_))
    }

    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Network(_) => "network",
            FetchError::Auth { .. } => "auth",
            FetchError::Rejected { .. } => "rejected",
            FetchError::Parse { .. } => "parse",
        }
    }

    pub fn parse(message: impl Into<String>, raw: &str) -> Self {
        FetchError::Parse {
            message: message.into(),
            raw: truncate_raw(raw),
        }
    }
}

fn truncate_raw(raw: &str) -> String {
    if raw.len() <= RAW_PAYLOAD_LIMIT {
        return raw.to_string();
    }
    let mut end = RAW_PAYLOAD_LIMIT;
    while !raw.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &raw[..end])
}

/// Errors that halt startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cadence for {0} must be positive")]
    NonPositiveCadence(SourceKind),

    #[error("identifier for {0} is empty")]
    EmptyIdentifier(SourceKind),

    #[error("client for {client} registered under {config}")]
    SourceMismatch {
        config: SourceKind,
        client: SourceKind,
    },

    #[error("{0} is already registered")]
    DuplicateSource(SourceKind),

    #[error("scheduler already started")]
    AlreadyStarted,

    #[error("unknown source: {0}")]
    UnknownSource(String),

    #[error("credential for {0} contains characters not allowed in an HTTP header")]
    InvalidCredential(SourceKind),

    #[error("missing env var {0}")]
    MissingEnv(&'static str),

    #[error("invalid config: {0}")]
    Invalid(String),
}
