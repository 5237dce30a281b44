//! Cache error types.

use std::fmt;

/// Cache operation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The store refused the write because it is full.
    CapacityExceeded(usize),
    /// The backing store failed.
    Internal(String),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CapacityExceeded(max) => write!(f, "cache capacity of {max} entries exceeded"),
            Self::Internal(msg) => write!(f, "internal cache error: {msg}"),
        }
    }
}

impl std::error::Error for CacheError {}

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
