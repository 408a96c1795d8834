//! In-memory key-value store for offline and test operation

use super::KvStore;
use crate::clock::{Clock, SystemClock};
use crate::Result;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct Slot {
    value: Vec<u8>,
    expires_at: Option<DateTime<Utc>>,
}

impl Slot {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// In-memory store with wall-clock expiry.
///
/// Expired slots are invisible to every operation and are dropped lazily on
/// the next write to the same key.
pub struct InMemoryStore {
    slots: Arc<RwLock<HashMap<String, Slot>>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            slots: Arc::new(RwLock::new(HashMap::new())),
            clock,
        }
    }

    pub fn with_system_clock() -> Self {
        Self::new(Arc::new(SystemClock))
    }

    fn deadline(&self, ttl: Duration) -> DateTime<Utc> {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        self.clock
            .now()
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::with_system_clock()
    }
}

#[async_trait::async_trait]
impl KvStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let now = self.clock.now();
        let slots = self.slots.read().await;
        Ok(slots
            .get(key)
            .filter(|slot| slot.is_live(now))
            .map(|slot| slot.value.clone()))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let expires_at = Some(self.deadline(ttl));
        let mut slots = self.slots.write().await;
        slots.insert(key.to_string(), Slot { value, expires_at });
        Ok(())
    }

    async fn increment(&self, key: &str) -> Result<i64> {
        let now = self.clock.now();
        let mut slots = self.slots.write().await;

        let (current, expires_at) = match slots.get(key).filter(|slot| slot.is_live(now)) {
            Some(slot) => (
                std::str::from_utf8(&slot.value)
                    .ok()
                    .and_then(|s| s.trim().parse::<i64>().ok())
                    .unwrap_or(0),
                slot.expires_at,
            ),
            None => (0, None),
        };

        let next = current + 1;
        slots.insert(
            key.to_string(),
            Slot {
                value: next.to_string().into_bytes(),
                expires_at,
            },
        );
        Ok(next)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        let now = self.clock.now();
        let deadline = self.deadline(ttl);
        let mut slots = self.slots.write().await;
        if let Some(slot) = slots.get_mut(key).filter(|slot| slot.is_live(now)) {
            slot.expires_at = Some(deadline);
        }
        Ok(())
    }
}
