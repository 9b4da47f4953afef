//! In-process session backend
//!
//! Single-node only. Expiry follows the tokio clock, so paused-time tests can
//! step past a TTL without sleeping.

use super::{SessionBackend, SessionError};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Expired entries are swept once every this many writes
const SWEEP_EVERY: u64 = 128;

#[derive(Default)]
pub struct MemorySessionBackend {
    entries: DashMap<String, (Vec<u8>, Instant)>,
    writes: AtomicU64,
}

impl MemorySessionBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a live entry exists under `key`
    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .map(|entry| entry.1 > Instant::now())
            .unwrap_or(false)
    }

    /// Drop every expired entry
    pub fn purge_expired(&self) {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, (_, deadline)| *deadline > now);

        let purged = before.saturating_sub(self.entries.len());
        if purged > 0 {
            tracing::debug!(purged, "Purged expired sessions");
        }
    }
}

#[async_trait]
impl SessionBackend for MemorySessionBackend {
    async fn put(&self, key: &str, payload: Vec<u8>, ttl: Duration) -> Result<(), SessionError> {
        if self.writes.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            self.purge_expired();
        }

        self.entries
            .insert(key.to_string(), (payload, Instant::now() + ttl));
        Ok(())
    }

    async fn fetch(&self, key: &str) -> Result<Option<Vec<u8>>, SessionError> {
        let now = Instant::now();
        // drop the expired entry under the shard lock
        if self.entries.remove_if(key, |_, (_, deadline)| *deadline <= now).is_some() {
            return Ok(None);
        }
        Ok(self.entries.get(key).map(|entry| entry.0.clone()))
    }

    async fn remove(&self, key: &str) -> Result<(), SessionError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn ping(&self) -> Result<(), SessionError> {
        Ok(())
    }
}
