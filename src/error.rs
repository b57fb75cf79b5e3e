//! Crate-wide error type.
//!
//! Every fallible operation in this crate returns [`Result<T>`], a thin alias
//! over [`KbError`]. The variant set mirrors the closed error-kind taxonomy:
//! callers (and eventually an HTTP front-end, out of scope here) match on
//! `kind()` rather than downcasting strings.

use std::fmt;

/// Closed set of error kinds. Each maps to exactly one HTTP status class
/// for an (out-of-scope) HTTP front-end; see [`KbErrorKind::http_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KbErrorKind {
    NotFound,
    InvalidArgument,
    Corrupt,
    UnsupportedCodec,
    Transport,
    Canceled,
    Timeout,
    Unauthorized,
    RateLimited,
    Internal,
}

impl KbErrorKind {
    /// Stable HTTP status code for this kind, per the error-handling design.
    pub fn http_status(self) -> u16 {
        match self {
            KbErrorKind::NotFound => 404,
            KbErrorKind::InvalidArgument => 400,
            KbErrorKind::Unauthorized => 401,
            KbErrorKind::RateLimited => 429,
            KbErrorKind::Timeout
            | KbErrorKind::Transport
            | KbErrorKind::Corrupt
            | KbErrorKind::UnsupportedCodec
            | KbErrorKind::Canceled
            | KbErrorKind::Internal => 500,
        }
    }

    /// Whether a caller retrying the same operation might succeed.
    pub fn retryable(self) -> bool {
        matches!(self, KbErrorKind::Transport | KbErrorKind::Timeout)
    }
}

impl fmt::Display for KbErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            KbErrorKind::NotFound => "not_found",
            KbErrorKind::InvalidArgument => "invalid_argument",
            KbErrorKind::Corrupt => "corrupt",
            KbErrorKind::UnsupportedCodec => "unsupported_codec",
            KbErrorKind::Transport => "transport",
            KbErrorKind::Canceled => "canceled",
            KbErrorKind::Timeout => "timeout",
            KbErrorKind::Unauthorized => "unauthorized",
            KbErrorKind::RateLimited => "rate_limited",
            KbErrorKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct KbError {
    pub kind: KbErrorKind,
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl KbError {
    pub fn new(kind: KbErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        kind: KbErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn kind(&self) -> KbErrorKind {
        self.kind
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(KbErrorKind::NotFound, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(KbErrorKind::InvalidArgument, message)
    }

    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::new(KbErrorKind::Corrupt, message)
    }

    pub fn unsupported_codec(message: impl Into<String>) -> Self {
        Self::new(KbErrorKind::UnsupportedCodec, message)
    }

    pub fn canceled() -> Self {
        Self::new(KbErrorKind::Canceled, "operation canceled")
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(KbErrorKind::Timeout, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(KbErrorKind::Internal, message)
    }
}

impl From<object_store::Error> for KbError {
    fn from(e: object_store::Error) -> Self {
        match &e {
            object_store::Error::NotFound { .. } => {
                KbError::with_source(KbErrorKind::NotFound, "object not found", e)
            }
            _ => KbError::with_source(KbErrorKind::Transport, "object store error", e),
        }
    }
}

pub type Result<T> = std::result::Result<T, KbError>;
