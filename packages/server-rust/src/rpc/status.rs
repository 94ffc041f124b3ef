//! Categorical status codes carried by remote-call errors.

use std::fmt;

/// Category of a remote-call failure, as reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    /// The peer could not be reached or refused the call for now.
    Unavailable,
    /// The call did not finish before its deadline.
    DeadlineExceeded,
    /// The peer is out of capacity (e.g., rate limited).
    ResourceExhausted,
    /// The request itself was rejected.
    InvalidArgument,
    /// The requested entity does not exist on the peer.
    NotFound,
    /// Anything the transport cannot categorise further.
    Other,
}

impl StatusCode {
    /// The codes that describe a condition expected to clear on its own.
    pub const TRANSIENT: [StatusCode; 3] = [
        StatusCode::Unavailable,
        StatusCode::DeadlineExceeded,
        StatusCode::ResourceExhausted,
    ];

    /// Returns `true` for unavailable, deadline-exceeded and resource-exhausted.
    #[must_use]
    pub fn is_transient(self) -> bool {
        Self::TRANSIENT.contains(&self)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            StatusCode::Unavailable => "unavailable",
            StatusCode::DeadlineExceeded => "deadline_exceeded",
            StatusCode::ResourceExhausted => "resource_exhausted",
            StatusCode::InvalidArgument => "invalid_argument",
            StatusCode::NotFound => "not_found",
            StatusCode::Other => "other",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by a remote call: a status code plus a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct RemoteError {
    pub code: StatusCode,
    pub message: String,
}

impl RemoteError {
    #[must_use]
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Unavailable, message)
    }

    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NotFound, message)
    }

    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(StatusCode::InvalidArgument, message)
    }

    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.code.is_transient()
    }
}
