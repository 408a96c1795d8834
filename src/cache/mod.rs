//! Shared key-value store, cache-aside memoization and rate limiting
//!
//! The store contract mirrors a small Redis subset (get/set with TTL,
//! increment, expire). Two backends implement it: an in-memory map with
//! real wall-clock expiry and a Postgres table for shared deployments.

pub mod memoizer;
pub mod memory;
pub mod postgres;
pub mod rate_limit;

pub use memoizer::Memoizer;
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use rate_limit::{RateLimitPolicy, RateLimiter};

use crate::clock::Clock;
use crate::config::AppConfig;
use crate::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Trait for the shared key-value store
#[async_trait::async_trait]
pub trait KvStore: Send + Sync {
    /// Value for `key` if present and unexpired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `value` under `key`, visible for `ttl`.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;

    /// Atomically increment the integer under `key` (absent counts as 0).
    /// An existing expiry is preserved; a new key has none.
    async fn increment(&self, key: &str) -> Result<i64>;

    /// Set the expiry of an existing key to `ttl` from now.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<()>;
}

/// Pick the store backend from configuration.
///
/// Falls back to the in-memory store when no database URL is configured or
/// the pool cannot be created.
pub fn build_store(config: &AppConfig, clock: Arc<dyn Clock>) -> Arc<dyn KvStore> {
    if let Some(url) = config.database_url.as_deref() {
        match PostgresStore::connect_lazy(url, clock.clone()) {
            Ok(store) => {
                info!("Cache backend: postgres");
                return Arc::new(store);
            }
            Err(error) => {
                warn!(
                    "Failed to initialize postgres cache backend, falling back to in-memory: {}",
                    error
                );
            }
        }
    }

    info!("Cache backend: in-memory");
    Arc::new(InMemoryStore::new(clock))
}
