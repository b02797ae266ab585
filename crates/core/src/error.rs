//! Error types for the chatter protocol.
//!
//! Uses `thiserror` for ergonomic error definitions. The taxonomy is small on
//! purpose: callers branch on the kind (bad request, service I/O, quota, rate
//! limit) and never on the message text.

use thiserror::Error;

/// Opaque failure reported by an external collaborator (encoder factory,
/// encoder hook, service, decoder, key/value store).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type alias using [`ChatterError`].
pub type Result<T> = std::result::Result<T, ChatterError>;

/// The error returned by every [`Chatter`](crate::Chatter) implementation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChatterError {
    // --- Caller supplied malformed input, never retried ---
    #[error("bad request: empty prompt")]
    EmptyPrompt,

    #[error("bad request: {0}")]
    BadRequest(String),

    // --- Backend failure at invoke or decode time ---
    #[error("service I/O error: {0}")]
    ServiceIo(String),

    // --- Raised before any network call is attempted ---
    #[error("execution aborted, {0}")]
    QuotaExceeded(QuotaLimit),

    #[error("rate limit wait aborted: {0}")]
    RateLimitWaitCancelled(#[from] ContextError),

    // --- Reply does not carry what the caller asked for ---
    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),
}

impl ChatterError {
    /// Wrap an encoder/factory failure as a bad request.
    pub fn bad_request(err: impl std::fmt::Display) -> Self {
        Self::BadRequest(err.to_string())
    }

    /// Wrap a service/decoder failure as a service I/O error.
    pub fn service_io(err: impl std::fmt::Display) -> Self {
        Self::ServiceIo(err.to_string())
    }

    /// Whether the error is one of the bad-request kinds.
    pub fn is_bad_request(&self) -> bool {
        matches!(self, Self::EmptyPrompt | Self::BadRequest(_))
    }
}

/// Which quota ceiling aborted a call, with the count observed at the time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QuotaLimit {
    #[error("{0} epoch is exceeded the quota")]
    Epoch(u64),

    #[error("{0} input tokens is exceeded the quota")]
    InputTokens(u64),

    #[error("{0} reply tokens is exceeded the quota")]
    ReplyTokens(u64),
}

/// Why an execution context stopped waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("context cancelled")]
    Cancelled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,
}
