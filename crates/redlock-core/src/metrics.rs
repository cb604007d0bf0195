// Lock coordinator metrics
// Counter names and their descriptions for whichever recorder the host installs

use metrics::describe_counter;

pub const LOCK_ATTEMPTS_TOTAL: &str = "redlock_lock_attempts_total";
pub const LOCK_GRANTED_TOTAL: &str = "redlock_lock_granted_total";
pub const LOCK_FAILED_TOTAL: &str = "redlock_lock_failed_total";
pub const UNLOCK_TOTAL: &str = "redlock_unlock_total";
pub const INSTANCE_ERRORS_TOTAL: &str = "redlock_instance_errors_total";

/// Register descriptions for every lock counter.
/// Call once after installing a metrics recorder.
pub fn describe_metrics() {
    describe_counter!(
        LOCK_ATTEMPTS_TOTAL,
        "Total number of lock fan-out rounds started"
    );
    describe_counter!(LOCK_GRANTED_TOTAL, "Total number of locks granted");
    describe_counter!(
        LOCK_FAILED_TOTAL,
        "Total number of lock requests that exhausted their attempts"
    );
    describe_counter!(
        UNLOCK_TOTAL,
        "Total number of unlock calls, labelled by complete or partial outcome"
    );
    describe_counter!(
        INSTANCE_ERRORS_TOTAL,
        "Total number of store instance calls that failed or timed out, by operation"
    );
}
