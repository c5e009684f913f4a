use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

use shared::CONFIG_CACHE_TTL_MS;

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Process-local key/value cache with a fixed time-to-live per entry.
///
/// Expired entries are evicted lazily on read; there is no background sweep
/// and no size bound. Each process has its own instance, so staleness across
/// instances is bounded only by the TTL.
pub struct ConfigCache<V> {
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
    default_ttl: Duration,
}

impl<V: Clone> ConfigCache<V> {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_ttl,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Returns the value if present and not expired. An expired entry is removed.
    pub async fn get(&self, key: &str) -> Option<V> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return None,
                Some(entry) if !entry.is_expired(Instant::now()) => {
                    return Some(entry.value.clone());
                }
                Some(_) => {}
            }
        }

        // Expired: upgrade to a write lock and evict, unless a fresh value
        // was stored in between.
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Store a value with the default TTL, replacing any existing entry
    pub async fn set(&self, key: impl Into<String>, value: V) {
        self.set_with_ttl(key, value, self.default_ttl).await;
    }

    pub async fn set_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.entries.write().await.insert(key.into(), entry);
    }

    pub async fn has(&self, key: &str) -> bool {
        self.get(key).await.is_some()
    }

    /// Number of stored entries, expired ones included until they are read
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl<V: Clone> Default for ConfigCache<V> {
    fn default() -> Self {
        Self::new(Duration::from_millis(CONFIG_CACHE_TTL_MS))
    }
}
