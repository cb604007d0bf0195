//! Lock token generation

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Opaque credential stored at the resource key on every instance.
///
/// Combines a random UUID v4 with a process-wide sequence number, so two
/// attempts never share a token even if the random source repeats.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct LockToken(String);

impl LockToken {
    /// Generate a fresh token
    pub fn generate() -> Self {
        let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
        Self(format!("{}-{:x}", Uuid::new_v4().simple(), seq))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Tokens are credentials; keep them out of debug logs
impl fmt::Debug for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.0.chars().take(8).collect();
        write!(f, "LockToken({}..)", prefix)
    }
}

impl AsRef<str> for LockToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
