//! Error types for the resource cache.
//!
//! Two layers are kept apart:
//!
//! - [`FetchError`] is what a fetcher produces. It is stored on the entry,
//!   broadcast to every subscriber and never thrown out of `subscribe`.
//! - [`CacheError`] is what cache operations return: programmer errors
//!   (empty key, wrong payload type) and re-thrown fetch failures from an
//!   explicit `refresh`.

use thiserror::Error;

/// A failed fetch.
///
/// `FetchError` is `Clone` because a single failure is delivered to every
/// caller that joined the same in-flight request.
///
/// # Examples
///
/// ```
/// use resourcache_core::FetchError;
///
/// let err = FetchError::status(404, "Portfolio not found");
/// assert_eq!(err.to_string(), "Portfolio not found");
/// assert_eq!(err.status_code(), Some(404));
/// assert!(!err.is_cancelled());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Network failure or non-2xx response, with a human readable message.
    #[error("{message}")]
    Request {
        status: Option<u16>,
        message: String,
    },
    /// The fetch observed its cancellation token and gave up.
    #[error("request was cancelled")]
    Cancelled,
}

impl FetchError {
    /// A failure without an HTTP status (connection reset, DNS, decode error).
    pub fn request(message: impl Into<String>) -> Self {
        FetchError::Request {
            status: None,
            message: message.into(),
        }
    }

    /// A non-2xx response.
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        FetchError::Request {
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            FetchError::Request { status, .. } => *status,
            FetchError::Cancelled => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled)
    }
}

/// Errors returned by cache operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("cache key must not be empty")]
    EmptyKey,

    /// Key-level refresh of a key the cache has never seen (or has removed).
    #[error("no resource cached under `{0}`")]
    UnknownKey(String),

    /// The entry was created for a different payload type.
    #[error("entry `{key}` does not hold a `{expected}`")]
    TypeMismatch { key: String, expected: &'static str },

    /// Refresh requested through a subscription created with `enabled = false`.
    #[error("resource `{0}` is disabled")]
    Disabled(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl CacheError {
    /// Returns the underlying fetch failure, if this error wraps one.
    pub fn as_fetch_error(&self) -> Option<&FetchError> {
        match self {
            CacheError::Fetch(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_error_display() {
        let err = FetchError::request("connection reset");
        assert_eq!(err.to_string(), "connection reset");
        assert_eq!(err.status_code(), None);
    }

    #[test]
    fn test_cancelled() {
        assert!(FetchError::Cancelled.is_cancelled());
        assert_eq!(FetchError::Cancelled.status_code(), None);
    }

    #[test]
    fn test_cache_error_wraps_fetch_error() {
        let err: CacheError = FetchError::status(500, "Internal error").into();
        assert_eq!(err.to_string(), "Internal error");
        assert_eq!(
            err.as_fetch_error(),
            Some(&FetchError::status(500, "Internal error"))
        );
        assert_eq!(CacheError::EmptyKey.as_fetch_error(), None);
    }

    #[test]
    fn test_type_mismatch_message() {
        let err = CacheError::TypeMismatch {
            key: "freelancer:portfolio:42".to_string(),
            expected: "alloc::string::String",
        };
        assert_eq!(
            err.to_string(),
            "entry `freelancer:portfolio:42` does not hold a `alloc::string::String`"
        );
    }
}
