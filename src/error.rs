//! Error types for the cache client
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache client.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Establishing the Redis connection failed
    #[error("Failed to connect to cache backend: {0}")]
    Connect(#[source] redis::RedisError),

    /// A command against the remote store failed
    #[error("Cache backend error: {0}")]
    Store(#[from] redis::RedisError),

    /// The backend is unreachable (backend-agnostic transient failure)
    #[error("Cache backend unavailable: {0}")]
    Unavailable(String),

    /// The store has been closed; no further operations are possible
    #[error("Cache store has been disposed")]
    Disposed,

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl CacheError {
    // == Transient Classification ==
    /// Returns true if the error is a transient network-level failure,
    /// making it eligible for reconnect-breaker bookkeeping.
    ///
    /// Disposed and invalid-request errors are never transient; they must
    /// not feed the breaker.
    pub fn is_transient(&self) -> bool {
        match self {
            CacheError::Unavailable(_) => true,
            CacheError::Connect(err) | CacheError::Store(err) => {
                err.is_connection_dropped()
                    || err.is_connection_refusal()
                    || err.is_io_error()
                    || err.is_timeout()
            }
            CacheError::Disposed | CacheError::InvalidRequest(_) => false,
        }
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache client.
pub type Result<T> = std::result::Result<T, CacheError>;
