//! Quorum and lease-validity arithmetic
//!
//! Pure functions deciding whether one fan-out round produced a safe lease
//! and how long that lease can be relied upon.

use std::time::Duration;

/// Fixed drift floor: store expiry granularity (1ms) plus 1ms minimum drift for small TTLs
pub const DRIFT_FLOOR: Duration = Duration::from_millis(2);

/// Majority of a pool of `pool_size` instances, clamped to the pool size
pub fn quorum(pool_size: usize) -> usize {
    pool_size.min(pool_size / 2 + 1)
}

/// Clock drift allowance for a lease of `ttl`
pub fn drift(ttl: Duration, drift_factor: f64) -> Duration {
    ttl.mul_f64(drift_factor).saturating_add(DRIFT_FLOOR)
}

/// Remaining safe window: `ttl - elapsed - drift`, or `None` when not positive
pub fn validity(ttl: Duration, elapsed: Duration, drift_factor: f64) -> Option<Duration> {
    ttl.checked_sub(elapsed)?
        .checked_sub(drift(ttl, drift_factor))
        .filter(|remaining| !remaining.is_zero())
}

/// Quorum calculator bound to one pool size and drift factor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuorumCalculator {
    pool_size: usize,
    quorum: usize,
    drift_factor: f64,
}

impl QuorumCalculator {
    pub fn new(pool_size: usize, drift_factor: f64) -> Self {
        Self {
            pool_size,
            quorum: quorum(pool_size),
            drift_factor,
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn quorum(&self) -> usize {
        self.quorum
    }

    pub fn drift_factor(&self) -> f64 {
        self.drift_factor
    }

    /// Validity of a round that collected `votes` successes in `elapsed`.
    ///
    /// Returns `Some(validity)` only when both the quorum is met and the
    /// remaining window is positive.
    pub fn evaluate(&self, votes: usize, ttl: Duration, elapsed: Duration) -> Option<Duration> {
        if votes < self.quorum {
            return None;
        }
        validity(ttl, elapsed, self.drift_factor)
    }
}
