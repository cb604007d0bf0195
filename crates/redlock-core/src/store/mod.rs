//! Store instance capability
//!
//! This module provides:
//! - `StoreInstance`: the two atomic operations the coordinator needs from
//!   one independent key-value node, plus a readiness probe
//! - `MemoryStore`: an in-process instance with TTL expiry and fault injection

mod memory;

pub use memory::*;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;

/// One independent, non-replicated key-value node.
///
/// Both mutating operations must be atomic at the node. Errors are
/// reported, not swallowed: the coordinator converts them into non-votes.
#[async_trait]
pub trait StoreInstance: Send + Sync {
    /// Name used in logs and errors (usually `host:port`)
    fn name(&self) -> &str;

    /// Check that the instance is connected and answering
    async fn ping(&self) -> Result<(), StoreError>;

    /// Set `key = value` with expiry `ttl` only if `key` does not exist.
    ///
    /// Returns `Ok(true)` if the value was set.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration)
        -> Result<bool, StoreError>;

    /// Delete `key` only if it currently holds `expected`, as one indivisible step.
    ///
    /// Returns `Ok(true)` if the key was deleted, `Ok(false)` if it was absent
    /// or held another value.
    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, StoreError>;
}
