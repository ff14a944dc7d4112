//! Error types for the roam engine
//!
//! A single sum type classifies every failure the way §7 of the design
//! requires: transient errors (`Network`, `Gateway`, `Timeout`) are retried
//! locally by the caller with class-specific backoff, `Verification` is
//! terminal, and `Configuration`/`Initialization` surface immediately.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("network error: {0}")]
    Network(String),

    #[error("gateway error: {0}")]
    Gateway(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("verification failed: {0}")]
    Verification(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("initialization error: {0}")]
    Initialization(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{source} (attempted gateways: {})", attempted_gateways.join(", "))]
    RetryExhausted {
        source: Box<Error>,
        attempted_gateways: Vec<String>,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// The error classes §7 assigns retry/backoff policy to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Network,
    Gateway,
    Timeout,
    Verification,
    Configuration,
    Initialization,
    Other,
}

impl Error {
    /// Classify this error by the message-keyword rules in §7.
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::Network(_) => ErrorClass::Network,
            Error::Gateway(_) | Error::RateLimited(_) | Error::NotFound(_) => ErrorClass::Gateway,
            Error::Timeout(_) => ErrorClass::Timeout,
            Error::Verification(_) => ErrorClass::Verification,
            Error::Configuration(_) => ErrorClass::Configuration,
            Error::Initialization(_) => ErrorClass::Initialization,
            Error::Http(e) => classify_reqwest(e),
            Error::Json(_) | Error::Url(_) | Error::Io(_) => ErrorClass::Other,
            Error::RetryExhausted { source, .. } => source.class(),
        }
    }

    /// Whether this error class is terminal (never retried), as §7 mandates
    /// for `VerificationError`.
    pub fn is_terminal(&self) -> bool {
        matches!(self.class(), ErrorClass::Verification)
    }
}

fn classify_reqwest(e: &reqwest::Error) -> ErrorClass {
    if e.is_timeout() {
        ErrorClass::Timeout
    } else if e.is_connect() {
        ErrorClass::Network
    } else if let Some(status) = e.status() {
        if status.as_u16() == 429 || status.is_server_error() {
            ErrorClass::Gateway
        } else {
            ErrorClass::Other
        }
    } else {
        ErrorClass::Network
    }
}
