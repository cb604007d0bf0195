//! Redlock Core - quorum-based distributed locking
//!
//! This crate provides:
//! - Store instance capability (set-if-absent with expiry, compare-and-delete)
//! - Quorum and lease-validity arithmetic with clock drift allowance
//! - Randomized retry policy
//! - The `Redlock` coordinator returning `LockHandle`s
//! - An in-memory store instance for embedding and tests
//! - Counter descriptions for the `metrics` facade

pub mod config;
pub mod coordinator;
pub mod error;
pub mod metrics;
pub mod quorum;
pub mod retry;
pub mod store;
pub mod token;

// Re-export commonly used types
pub use config::{InstanceDescriptor, RedlockConfig};
pub use coordinator::{LockHandle, Redlock};
pub use error::{LockError, Result, StoreError};
pub use self::metrics::describe_metrics;
pub use quorum::QuorumCalculator;
pub use retry::RetryPolicy;
pub use store::{MemoryStore, MemoryStoreStats, StoreInstance};
pub use token::LockToken;

// Re-export async_trait so store implementations need not depend on it directly
pub use async_trait::async_trait;
