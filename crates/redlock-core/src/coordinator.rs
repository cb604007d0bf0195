//! Lock coordinator
//!
//! `Redlock` acquires a lease on a named resource by asking every store
//! instance to `set_if_absent(resource, token, ttl)`. The lease is granted
//! when a majority agreed and enough of the TTL remains after subtracting
//! the fan-out time and the clock drift allowance. A failed round is rolled
//! back with `compare_and_delete` before the next randomized retry.
//!
//! The coordinator keeps no record of outstanding locks: exclusion between
//! callers, in this process or another, comes from the stores' atomicity.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::{StreamExt, future, stream};
use tracing::{debug, info, warn};

use crate::config::RedlockConfig;
use crate::error::{LockError, Result, StoreError};
use crate::metrics::{
    INSTANCE_ERRORS_TOTAL, LOCK_ATTEMPTS_TOTAL, LOCK_FAILED_TOTAL, LOCK_GRANTED_TOTAL,
    UNLOCK_TOTAL,
};
use crate::quorum::QuorumCalculator;
use crate::retry::RetryPolicy;
use crate::store::StoreInstance;
use crate::token::LockToken;

/// A granted lease
#[derive(Clone, Debug)]
pub struct LockHandle {
    resource: String,
    token: LockToken,
    validity: Duration,
    acquired_at: Instant,
}

impl LockHandle {
    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn token(&self) -> &LockToken {
        &self.token
    }

    /// Safe-use window measured from the moment the lease was granted.
    ///
    /// Always positive and strictly less than the requested TTL.
    pub fn validity(&self) -> Duration {
        self.validity
    }

    /// Instant after which the lease must no longer be relied upon.
    ///
    /// `None` when the window ends beyond what `Instant` can represent.
    pub fn valid_until(&self) -> Option<Instant> {
        self.acquired_at.checked_add(self.validity)
    }

    /// Time left in the safe-use window
    pub fn remaining(&self) -> Duration {
        self.validity.saturating_sub(self.acquired_at.elapsed())
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Acquire,
    Rollback,
    Release,
}

impl Operation {
    fn as_str(&self) -> &'static str {
        match self {
            Operation::Acquire => "acquire",
            Operation::Rollback => "rollback",
            Operation::Release => "release",
        }
    }
}

/// Outcome of one compare-and-delete round
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct ReleaseTally {
    deleted: usize,
    failed: usize,
}

/// Quorum lock coordinator over a fixed pool of store instances.
///
/// Construct once and share by reference or `Arc`; the pool is read-only
/// and every method takes `&self`.
pub struct Redlock {
    pool: Vec<Arc<dyn StoreInstance>>,
    config: RedlockConfig,
    calculator: QuorumCalculator,
    retry: RetryPolicy,
}

impl Redlock {
    /// Build a coordinator over `pool`.
    ///
    /// Every instance is probed with `ping`. An empty pool, an instance that
    /// does not answer, or an invalid config is fatal: a silently missing
    /// instance would shrink the effective pool behind the quorum's back.
    pub async fn new(pool: Vec<Arc<dyn StoreInstance>>, config: RedlockConfig) -> Result<Self> {
        config.validate()?;
        if pool.is_empty() {
            return Err(LockError::EmptyPool);
        }

        let probe_timeout = config.probe_timeout;
        let probes = pool.iter().map(move |instance| async move {
            let outcome = match tokio::time::timeout(probe_timeout, instance.ping()).await {
                Ok(result) => result,
                Err(_) => Err(StoreError::Timeout),
            };
            outcome.map_err(|source| LockError::InstanceNotReady {
                instance: instance.name().to_string(),
                source,
            })
        });
        for probe in future::join_all(probes).await {
            probe?;
        }

        let calculator = QuorumCalculator::new(pool.len(), config.clock_drift_factor);
        let retry = config.retry_policy();

        info!(
            instances = pool.len(),
            quorum = calculator.quorum(),
            "Redlock coordinator initialized"
        );

        Ok(Self {
            pool,
            config,
            calculator,
            retry,
        })
    }

    pub fn pool_size(&self) -> usize {
        self.pool.len()
    }

    pub fn quorum(&self) -> usize {
        self.calculator.quorum()
    }

    pub fn config(&self) -> &RedlockConfig {
        &self.config
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Names of the pooled instances, in pool order
    pub fn instance_names(&self) -> Vec<&str> {
        self.pool.iter().map(|instance| instance.name()).collect()
    }

    /// Try to acquire `resource` for `ttl` with the configured retry policy.
    ///
    /// Returns `None` when the resource stays busy after every attempt.
    pub async fn lock(&self, resource: &str, ttl: Duration) -> Option<LockHandle> {
        self.lock_with(resource, ttl, &self.retry).await
    }

    /// Same as `lock`, with a per-call retry policy
    pub async fn lock_with(
        &self,
        resource: &str,
        ttl: Duration,
        retry: &RetryPolicy,
    ) -> Option<LockHandle> {
        let token = LockToken::generate();
        let attempts = retry.attempts();

        for attempt in 1..=attempts {
            metrics::counter!(LOCK_ATTEMPTS_TOTAL).increment(1);

            let start = Instant::now();
            let votes = self.acquire_round(resource, &token, ttl).await;
            let acquired_at = Instant::now();
            let elapsed = acquired_at.duration_since(start);

            if let Some(validity) = self.calculator.evaluate(votes, ttl, elapsed) {
                metrics::counter!(LOCK_GRANTED_TOTAL).increment(1);
                info!(
                    resource = %resource,
                    attempt,
                    votes,
                    validity_ms = validity.as_millis() as u64,
                    "Lock granted"
                );
                return Some(LockHandle {
                    resource: resource.to_string(),
                    token,
                    validity,
                    acquired_at,
                });
            }

            debug!(
                resource = %resource,
                attempt,
                votes,
                quorum = self.quorum(),
                elapsed_ms = elapsed.as_millis() as u64,
                "Lock attempt rejected, rolling back"
            );
            self.release_round(resource, &token, Operation::Rollback).await;

            if attempt < attempts {
                tokio::time::sleep(retry.next_delay()).await;
            }
        }

        metrics::counter!(LOCK_FAILED_TOTAL).increment(1);
        debug!(resource = %resource, attempts, "Lock not acquired");
        None
    }

    /// Release a lease on every instance.
    ///
    /// Returns `true` when every instance answered, having either deleted this
    /// token or no longer holding it. Returns `false` only if some instance
    /// could not be reached; its copy then expires on its own after the TTL.
    /// Safe to call repeatedly and after the lease expired.
    pub async fn unlock(&self, handle: &LockHandle) -> bool {
        let tally = self
            .release_round(&handle.resource, &handle.token, Operation::Release)
            .await;

        let complete = tally.failed == 0;
        let outcome = if complete { "complete" } else { "partial" };
        metrics::counter!(UNLOCK_TOTAL, "outcome" => outcome).increment(1);
        debug!(
            resource = %handle.resource,
            deleted = tally.deleted,
            failed = tally.failed,
            "Lock released"
        );
        complete
    }

    async fn acquire_round(&self, resource: &str, token: &LockToken, ttl: Duration) -> usize {
        // Built up front so the stream owns plain futures rather than a
        // closure over pool references
        let calls: Vec<_> = self
            .pool
            .iter()
            .map(|instance| {
                self.call(
                    instance.as_ref(),
                    Operation::Acquire,
                    instance.set_if_absent(resource, token.as_str(), ttl),
                )
            })
            .collect();

        stream::iter(calls)
            .buffer_unordered(self.config.fanout_limit)
            .fold(0, |votes, result| {
                future::ready(if matches!(result, Ok(true)) { votes + 1 } else { votes })
            })
            .await
    }

    async fn release_round(
        &self,
        resource: &str,
        token: &LockToken,
        operation: Operation,
    ) -> ReleaseTally {
        let calls: Vec<_> = self
            .pool
            .iter()
            .map(|instance| {
                self.call(
                    instance.as_ref(),
                    operation,
                    instance.compare_and_delete(resource, token.as_str()),
                )
            })
            .collect();

        stream::iter(calls)
            .buffer_unordered(self.config.fanout_limit)
            .fold(ReleaseTally::default(), |mut tally, result| {
                match result {
                    Ok(true) => tally.deleted += 1,
                    Ok(false) => {}
                    Err(_) => tally.failed += 1,
                }
                future::ready(tally)
            })
            .await
    }

    /// Run one instance call under the per-instance timeout
    async fn call<F>(
        &self,
        instance: &dyn StoreInstance,
        operation: Operation,
        request: F,
    ) -> std::result::Result<bool, StoreError>
    where
        F: Future<Output = std::result::Result<bool, StoreError>>,
    {
        let result = match tokio::time::timeout(self.config.instance_timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout),
        };

        if let Err(e) = &result {
            metrics::counter!(
                INSTANCE_ERRORS_TOTAL,
                "operation" => operation.as_str()
            )
            .increment(1);
            match operation {
                Operation::Acquire => {
                    debug!(instance = %instance.name(), error = %e, "Instance did not vote")
                }
                Operation::Rollback | Operation::Release => {
                    warn!(
                        instance = %instance.name(),
                        operation = operation.as_str(),
                        error = %e,
                        "Failed to release lock on instance"
                    )
                }
            }
        }
        result
    }
}

impl fmt::Debug for Redlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Redlock")
            .field("instances", &self.instance_names())
            .field("quorum", &self.quorum())
            .field("retry", &self.retry)
            .finish()
    }
}
