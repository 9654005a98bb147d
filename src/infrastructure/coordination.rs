use crate::domain::ports::CoordinationStore;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Successful `set_if_absent` calls between two sweeps of expired entries.
const PURGE_EVERY: u32 = 64;

struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

#[derive(Default)]
struct Entries {
    map: HashMap<String, Entry>,
    inserts_since_purge: u32,
}

/// In-process stand-in for the shared key-value coordination store.
///
/// Conditional operations run under a single mutex, which gives them the same
/// atomicity a server-side script provides. Expired entries are treated as
/// absent, dropped when their key is touched, and swept from the whole map
/// every `PURGE_EVERY` inserts so abandoned keys do not accumulate. Expiry
/// follows `tokio::time`, so paused test clocks drive lease expiry.
#[derive(Default, Clone)]
pub struct InMemoryCoordinationStore {
    entries: Arc<Mutex<Entries>>,
}

impl InMemoryCoordinationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CoordinationStore for InMemoryCoordinationStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        if entries.map.get(key).is_some_and(|e| e.is_live(now)) {
            return Ok(false);
        }
        entries.map.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: now + ttl,
            },
        );
        entries.inserts_since_purge += 1;
        if entries.inserts_since_purge >= PURGE_EVERY {
            entries.map.retain(|_, e| e.is_live(now));
            entries.inserts_since_purge = 0;
        }
        Ok(true)
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let Some((live, owned)) = entries
            .map
            .get(key)
            .map(|e| (e.is_live(now), e.value == expected))
        else {
            return Ok(false);
        };
        // Expired entries are dropped whoever asks.
        if !live || owned {
            entries.map.remove(key);
        }
        Ok(live && owned)
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        Ok(entries
            .map
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone()))
    }
}
