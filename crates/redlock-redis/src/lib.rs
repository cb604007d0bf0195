//! Redlock Redis - Redis-backed store instances
//!
//! This crate provides:
//! - `RedisStore`: a `StoreInstance` over one Redis server
//! - Pool construction from `(host, port, timeout)` descriptors
//! - `connect`: a ready `Redlock` from a `RedlockConfig` or layered config source

mod store;

pub use store::{RedisStore, connection_info};

use std::sync::Arc;

use futures::future;
use redlock_core::{InstanceDescriptor, LockError, Redlock, RedlockConfig, StoreInstance};
use tracing::{error, info};

/// Connect every descriptor, in order.
///
/// Any instance that cannot be reached fails the whole pool: dropping it
/// would shrink the quorum denominator without the caller noticing.
pub async fn connect_pool(
    descriptors: &[InstanceDescriptor],
) -> Result<Vec<Arc<dyn StoreInstance>>, LockError> {
    if descriptors.is_empty() {
        return Err(LockError::EmptyPool);
    }

    let connections = future::join_all(descriptors.iter().map(RedisStore::connect)).await;

    let mut pool: Vec<Arc<dyn StoreInstance>> = Vec::with_capacity(descriptors.len());
    for (descriptor, connection) in descriptors.iter().zip(connections) {
        match connection {
            Ok(store) => pool.push(Arc::new(store)),
            Err(source) => {
                error!(instance = %descriptor.address(), error = %source, "Failed to connect redis instance");
                return Err(LockError::InstanceNotReady {
                    instance: descriptor.address(),
                    source,
                });
            }
        }
    }
    Ok(pool)
}

/// Build a `Redlock` over the Redis instances listed in `config`
pub async fn connect(config: RedlockConfig) -> Result<Redlock, LockError> {
    config.validate()?;
    let pool = connect_pool(&config.instances).await?;
    info!(instances = pool.len(), "Redis lock pool connected");
    Redlock::new(pool, config).await
}

/// Build a `Redlock` from the `redlock.*` keys of a layered config source
pub async fn connect_from_config(source: &config::Config) -> Result<Redlock, LockError> {
    connect(RedlockConfig::from_config(source)?).await
}
