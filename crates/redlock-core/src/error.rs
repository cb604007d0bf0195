//! Error types for the lock coordinator and store instances
//!
//! This module defines:
//! - `StoreError`: failures reported by a single store instance
//! - `LockError`: fatal construction and configuration errors
//!
//! Ordinary contention is never an error: `Redlock::lock` returns `None`
//! and `Redlock::unlock` returns `false`.

/// Error reported by one store instance.
///
/// The coordinator treats every variant as a non-vote for that instance.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("instance unavailable")]
    Unavailable,

    #[error("request timeout")]
    Timeout,

    #[error("backend error: {0}")]
    Backend(String),

    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),
}

/// Fatal error raised while building a coordinator.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("instance pool is empty")]
    EmptyPool,

    #[error("instance '{instance}' is not ready: {source}")]
    InstanceNotReady {
        instance: String,
        #[source]
        source: StoreError,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

pub type Result<T> = std::result::Result<T, LockError>;
