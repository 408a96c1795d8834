//! Cache-aside memoization
//!
//! `get_or_compute` reads the store first and only runs the computation on
//! a miss. There is no per-key locking: two concurrent misses both compute
//! and the last write wins.

use super::KvStore;
use crate::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Hit/miss counters
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemoStats {
    pub hits: u64,
    pub misses: u64,
}

impl MemoStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

pub struct Memoizer {
    store: Arc<dyn KvStore>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Memoizer {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    pub fn stats(&self) -> MemoStats {
        MemoStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Return the cached value for `key`, or run `compute`, store its result
    /// for `ttl` and return it.
    ///
    /// A failing `compute` propagates its error and stores nothing. A value
    /// with no JSON encoding is stored as its debug text, which a later read
    /// decodes through the plain-string fallback.
    pub async fn get_or_compute<T, F, Fut>(&self, key: &str, ttl: Duration, compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned + fmt::Debug,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(raw) = self.store.get(key).await? {
            match decode::<T>(&raw) {
                Some(value) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    debug!(key, "cache hit");
                    return Ok(value);
                }
                None => warn!(key, "cached value could not be decoded, recomputing"),
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(key, "cache miss");

        let value = compute().await?;

        let encoded = serde_json::to_vec(&value).unwrap_or_else(|error| {
            warn!(key, %error, "value is not JSON-encodable, storing its text form");
            format!("{:?}", value).into_bytes()
        });
        self.store.set(key, encoded, ttl).await?;

        Ok(value)
    }
}

/// Canonical JSON first; text that is not JSON decodes as a plain string.
fn decode<T: DeserializeOwned>(raw: &[u8]) -> Option<T> {
    if let Ok(value) = serde_json::from_slice::<T>(raw) {
        return Some(value);
    }
    let text = std::str::from_utf8(raw).ok()?;
    T::deserialize(Value::String(text.to_string())).ok()
}
