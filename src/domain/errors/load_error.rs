//! Image load error types.

use thiserror::Error;

/// Transport-level failure while retrieving image bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[allow(missing_docs)]
pub enum FetchError {
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("unsupported URL scheme: {scheme}")]
    UnsupportedScheme { scheme: String },

    #[error("request failed: {message}")]
    Request { message: String },

    #[error("HTTP {status}")]
    Status { status: u16 },

    #[error("failed to read body: {message}")]
    Body { message: String },

    #[error("io error: {message}")]
    Io { message: String },

    #[error("fetch interrupted: {message}")]
    Interrupted { message: String },
}

impl FetchError {
    /// Creates request error.
    #[must_use]
    pub fn request(message: impl Into<String>) -> Self {
        Self::Request {
            message: message.into(),
        }
    }

    /// Creates body read error.
    #[must_use]
    pub fn body(message: impl Into<String>) -> Self {
        Self::Body {
            message: message.into(),
        }
    }

    /// Creates io error.
    #[must_use]
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Creates interrupted error.
    #[must_use]
    pub fn interrupted(message: impl Into<String>) -> Self {
        Self::Interrupted {
            message: message.into(),
        }
    }
}

/// Failure delivered to the waiters of a load.
///
/// `Clone` so one failed fetch can be handed to every waiter on its URL.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[allow(missing_docs)]
pub enum LoadError {
    #[error("failed to fetch image: {0}")]
    Fetch(#[from] FetchError),

    #[error("failed to decode image: {message}")]
    Decode { message: String },
}

impl LoadError {
    /// Creates decode error.
    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Returns whether the bytes arrived but were not an image.
    #[must_use]
    pub const fn is_decode_error(&self) -> bool {
        matches!(self, Self::Decode { .. })
    }

    /// Returns whether the bytes could not be retrieved.
    #[must_use]
    pub const fn is_fetch_error(&self) -> bool {
        matches!(self, Self::Fetch(_))
    }
}
