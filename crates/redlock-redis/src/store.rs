//! Redis store instance
//!
//! Maps the store capability onto Redis primitives:
//! - `SET key value NX PX ttl` for set-if-absent
//! - a server-side Lua script for compare-and-delete
//! - `PING` for readiness

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{ConnectionAddr, ConnectionInfo, RedisConnectionInfo, RedisError, Script};
use redlock_core::{InstanceDescriptor, StoreError, StoreInstance};
use tracing::debug;

/// Deletes KEYS[1] only if it holds ARGV[1]; runs atomically on the server
const UNLOCK_SCRIPT_SOURCE: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

static UNLOCK_SCRIPT: LazyLock<Script> = LazyLock::new(|| Script::new(UNLOCK_SCRIPT_SOURCE));

/// One Redis server used as a lock store instance
#[derive(Clone)]
pub struct RedisStore {
    name: String,
    connection: MultiplexedConnection,
}

impl RedisStore {
    /// Connect to the instance described by `descriptor`.
    ///
    /// The descriptor's timeout bounds both connecting and each response.
    pub async fn connect(descriptor: &InstanceDescriptor) -> Result<Self, StoreError> {
        let client = redis::Client::open(connection_info(descriptor)).map_err(map_redis_error)?;
        let timeout = descriptor.timeout();
        let connection = client
            .get_multiplexed_async_connection_with_timeouts(timeout, timeout)
            .await
            .map_err(map_redis_error)?;

        debug!(instance = %descriptor.address(), "Connected to redis instance");
        Ok(Self::from_connection(descriptor.address(), connection))
    }

    /// Wrap an existing connection
    pub fn from_connection(name: impl Into<String>, connection: MultiplexedConnection) -> Self {
        Self {
            name: name.into(),
            connection,
        }
    }
}

#[async_trait]
impl StoreInstance for RedisStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut connection = self.connection.clone();
        let reply: String = redis::cmd("PING")
            .query_async(&mut connection)
            .await
            .map_err(map_redis_error)?;
        if reply != "PONG" {
            return Err(StoreError::UnexpectedReply(reply));
        }
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut connection = self.connection.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut connection)
            .await
            .map_err(map_redis_error)?;
        Ok(reply.is_some())
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        let mut connection = self.connection.clone();
        let deleted: i64 = UNLOCK_SCRIPT
            .key(key)
            .arg(expected)
            .invoke_async(&mut connection)
            .await
            .map_err(map_redis_error)?;
        Ok(deleted == 1)
    }
}

/// Connection parameters for a descriptor
pub fn connection_info(descriptor: &InstanceDescriptor) -> ConnectionInfo {
    ConnectionInfo {
        addr: ConnectionAddr::Tcp(descriptor.host.clone(), descriptor.port),
        redis: RedisConnectionInfo {
            db: descriptor.db.unwrap_or(0),
            password: descriptor.password.clone(),
            ..Default::default()
        },
    }
}

// Rounded up so the stored lease never ends before the computed one; PX rejects zero
fn ttl_millis(ttl: Duration) -> u64 {
    (ttl.as_nanos().div_ceil(1_000_000).min(u64::MAX as u128) as u64).max(1)
}

fn map_redis_error(e: RedisError) -> StoreError {
    if e.is_timeout() {
        StoreError::Timeout
    } else if e.is_connection_refusal() || e.is_connection_dropped() || e.is_io_error() {
        StoreError::Unavailable
    } else {
        StoreError::Backend(e.to_string())
    }
}
