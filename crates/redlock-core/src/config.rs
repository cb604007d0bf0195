//! Coordinator configuration
//!
//! `RedlockConfig` carries the retry, drift and fan-out settings used by
//! `Redlock`, plus the instance descriptors consumed by store adapters that
//! connect their own instances. Values can be set through builder methods
//! or loaded from a layered `config::Config` under the `redlock` prefix.

use std::time::Duration;

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::error::{LockError, Result};
use crate::retry::RetryPolicy;

pub const DEFAULT_RETRY_DELAY_MS: u64 = 200;
pub const DEFAULT_RETRY_COUNT: u32 = 3;
pub const DEFAULT_CLOCK_DRIFT_FACTOR: f64 = 0.01;
pub const DEFAULT_INSTANCE_TIMEOUT_MS: u64 = 50;
pub const DEFAULT_FANOUT_LIMIT: usize = 16;
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 1000;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 100;

const CONFIG_PREFIX: &str = "redlock";

/// Address of one store instance, as `(host, port, timeout)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceDescriptor {
    /// Host name or IP address
    pub host: String,
    /// TCP port
    pub port: u16,
    /// Connect and response timeout in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub timeout_ms: u64,
    /// Logical database index
    #[serde(default)]
    pub db: Option<i64>,
    /// Password for AUTH
    #[serde(default)]
    pub password: Option<String>,
}

fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}

impl InstanceDescriptor {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            db: None,
            password: None,
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_db(mut self, db: i64) -> Self {
        self.db = Some(db);
        self
    }

    pub fn with_password(mut self, password: &str) -> Self {
        self.password = Some(password.to_string());
        self
    }

    /// `host:port`, used as the instance name in logs
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Configuration for the lock coordinator
#[derive(Clone, Debug, PartialEq)]
pub struct RedlockConfig {
    /// Instances to connect, for adapters that build their own pool
    pub instances: Vec<InstanceDescriptor>,
    /// Upper bound of the randomized delay between attempts
    pub retry_delay: Duration,
    /// Maximum number of acquisition attempts per `lock` call
    pub retry_count: u32,
    /// Fraction of the TTL reserved for clock drift
    pub clock_drift_factor: f64,
    /// Ceiling for a single call to one instance
    pub instance_timeout: Duration,
    /// Maximum number of instance calls in flight during one fan-out
    pub fanout_limit: usize,
    /// Ceiling for the readiness probe run against each instance at construction
    pub probe_timeout: Duration,
}

impl Default for RedlockConfig {
    fn default() -> Self {
        Self {
            instances: Vec::new(),
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            retry_count: DEFAULT_RETRY_COUNT,
            clock_drift_factor: DEFAULT_CLOCK_DRIFT_FACTOR,
            instance_timeout: Duration::from_millis(DEFAULT_INSTANCE_TIMEOUT_MS),
            fanout_limit: DEFAULT_FANOUT_LIMIT,
            probe_timeout: Duration::from_millis(DEFAULT_PROBE_TIMEOUT_MS),
        }
    }
}

impl RedlockConfig {
    /// Create a config for the given instance descriptors
    pub fn with_instances(instances: Vec<InstanceDescriptor>) -> Self {
        Self {
            instances,
            ..Default::default()
        }
    }

    /// Set retry count and delay
    pub fn with_retry(mut self, retry_count: u32, retry_delay: Duration) -> Self {
        self.retry_count = retry_count;
        self.retry_delay = retry_delay;
        self
    }

    pub fn with_clock_drift_factor(mut self, factor: f64) -> Self {
        self.clock_drift_factor = factor;
        self
    }

    pub fn with_instance_timeout(mut self, timeout: Duration) -> Self {
        self.instance_timeout = timeout;
        self
    }

    pub fn with_fanout_limit(mut self, limit: usize) -> Self {
        self.fanout_limit = limit;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Retry policy derived from this config
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_count, self.retry_delay)
    }

    /// Load from a `config::Config`, falling back to defaults for missing keys.
    ///
    /// Recognized keys: `redlock.retry_delay_ms`, `redlock.retry_count`,
    /// `redlock.clock_drift_factor`, `redlock.instance_timeout_ms`,
    /// `redlock.fanout_limit`, `redlock.probe_timeout_ms` and `redlock.instances`.
    pub fn from_config(config: &config::Config) -> Result<Self> {
        let defaults = Self::default();

        let instances = optional::<Vec<InstanceDescriptor>>(config, "instances")?.unwrap_or_default();
        let retry_delay = optional::<u64>(config, "retry_delay_ms")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.retry_delay);
        let retry_count = optional::<u32>(config, "retry_count")?.unwrap_or(defaults.retry_count);
        let clock_drift_factor =
            optional::<f64>(config, "clock_drift_factor")?.unwrap_or(defaults.clock_drift_factor);
        let instance_timeout = optional::<u64>(config, "instance_timeout_ms")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.instance_timeout);
        let fanout_limit =
            optional::<usize>(config, "fanout_limit")?.unwrap_or(defaults.fanout_limit);
        let probe_timeout = optional::<u64>(config, "probe_timeout_ms")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.probe_timeout);

        let loaded = Self {
            instances,
            retry_delay,
            retry_count,
            clock_drift_factor,
            instance_timeout,
            fanout_limit,
            probe_timeout,
        };
        loaded.validate()?;
        Ok(loaded)
    }

    /// Reject settings that would make every attempt fail or never finish
    pub fn validate(&self) -> Result<()> {
        if !self.clock_drift_factor.is_finite()
            || !(0.0..1.0).contains(&self.clock_drift_factor)
        {
            return Err(LockError::InvalidConfig(format!(
                "clock_drift_factor must be in [0, 1), got {}",
                self.clock_drift_factor
            )));
        }
        if self.instance_timeout.is_zero() {
            return Err(LockError::InvalidConfig(
                "instance_timeout must be greater than zero".to_string(),
            ));
        }
        if self.probe_timeout.is_zero() {
            return Err(LockError::InvalidConfig(
                "probe_timeout must be greater than zero".to_string(),
            ));
        }
        if self.fanout_limit == 0 {
            return Err(LockError::InvalidConfig(
                "fanout_limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn optional<T: DeserializeOwned>(config: &config::Config, key: &str) -> Result<Option<T>> {
    match config.get::<T>(&format!("{}.{}", CONFIG_PREFIX, key)) {
        Ok(value) => Ok(Some(value)),
        Err(config::ConfigError::NotFound(_)) => Ok(None),
        Err(e) => Err(e.into()),
    }
}
