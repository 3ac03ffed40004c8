//! Cached YouTube channel statistics
//!
//! Stats are read-mostly dashboard data: they are served from a bounded,
//! time-expiring in-process cache and upstream calls are spaced by a minimum
//! interval so a busy dashboard cannot exhaust the Data API quota.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::StatsCacheConfig;
use crate::db::Database;
use crate::error::{PlatformError, PostdeckError, Result};
use crate::platforms::youtube::{ChannelStats, YouTubeApi};
use crate::token::TokenManager;
use crate::types::SocialPlatform;

struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

/// Capacity-bounded map whose entries expire after a fixed TTL
///
/// When full, expired entries are dropped first, then the oldest entry.
pub struct TtlCache<K, V> {
    ttl: Duration,
    capacity: usize,
    entries: Mutex<HashMap<K, CacheEntry<V>>>,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: K, value: V) {
        let mut entries = self.entries.lock().unwrap();

        if !entries.contains_key(&key) && entries.len() >= self.capacity {
            let ttl = self.ttl;
            entries.retain(|_, entry| entry.inserted_at.elapsed() < ttl);

            if entries.len() >= self.capacity {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.inserted_at)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    entries.remove(&oldest);
                }
            }
        }

        entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn invalidate(&self, key: &K) {
        self.entries.lock().unwrap().remove(key);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Spaces calls so consecutive ones are at least `interval` apart
pub struct MinIntervalGate {
    interval: Duration,
    last: tokio::sync::Mutex<Option<Instant>>,
}

impl MinIntervalGate {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: tokio::sync::Mutex::new(None),
        }
    }

    /// Wait for the next slot
    pub async fn wait(&self) {
        let mut last = self.last.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.interval {
                tokio::time::sleep(self.interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

pub struct YouTubeStatsService {
    db: Arc<Database>,
    tokens: Arc<TokenManager>,
    api: Arc<dyn YouTubeApi>,
    cache: TtlCache<String, ChannelStats>,
    gate: MinIntervalGate,
}

impl YouTubeStatsService {
    pub fn new(
        db: Arc<Database>,
        tokens: Arc<TokenManager>,
        api: Arc<dyn YouTubeApi>,
        config: &StatsCacheConfig,
    ) -> Self {
        Self {
            db,
            tokens,
            api,
            cache: TtlCache::new(config.capacity, Duration::from_secs(config.ttl_secs)),
            gate: MinIntervalGate::new(Duration::from_millis(config.min_interval_ms)),
        }
    }

    /// Statistics for one of the user's connected YouTube accounts
    pub async fn channel_stats(&self, user_id: &str, social_account_id: &str) -> Result<ChannelStats> {
        let account = self
            .db
            .get_account(social_account_id)
            .await?
            .filter(|account| account.user_id == user_id)
            .ok_or_else(|| {
                PostdeckError::NotFound(format!("Social account {}", social_account_id))
            })?;

        if account.platform().ok() != Some(SocialPlatform::YouTube) {
            return Err(PostdeckError::InvalidInput(format!(
                "Account {} is not a YouTube channel",
                account.account_name
            )));
        }

        if let Some(stats) = self.cache.get(&account.id) {
            debug!("YouTube stats cache hit for account {}", account.id);
            return Ok(stats);
        }

        let validation = self
            .tokens
            .validate_account(&account, SocialPlatform::YouTube)
            .await?;
        let token = match validation.access_token {
            Some(token) if validation.is_valid => token,
            _ => {
                return Err(PlatformError::Authentication(
                    validation
                        .error
                        .unwrap_or_else(|| "YouTube needs reconnection".to_string()),
                )
                .into())
            }
        };

        self.gate.wait().await;
        let stats = self.api.channel_statistics(&token).await?;
        self.cache.insert(account.id.clone(), stats.clone());

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_hit_and_miss() {
        let cache = TtlCache::new(4, Duration::from_secs(60));
        cache.insert("a", 1);

        assert_eq!(cache.get(&"a"), Some(1));
        assert_eq!(cache.get(&"b"), None);
    }

    #[test]
    fn test_cache_entries_expire() {
        let cache = TtlCache::new(4, Duration::from_millis(10));
        cache.insert("a", 1);

        std::thread::sleep(Duration::from_millis(25));

        assert_eq!(cache.get(&"a"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_evicts_oldest_when_full() {
        let cache = TtlCache::new(2, Duration::from_secs(60));
        cache.insert("a", 1);
        std::thread::sleep(Duration::from_millis(2));
        cache.insert("b", 2);
        std::thread::sleep(Duration::from_millis(2));
        cache.insert("c", 3);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&"a"), None);
        assert_eq!(cache.get(&"b"), Some(2));
        assert_eq!(cache.get(&"c"), Some(3));
    }

    #[test]
    fn test_cache_overwrite_does_not_evict() {
        let cache = TtlCache::new(2, Duration::from_secs(60));
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.insert("a", 10);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&"a"), Some(10));
        assert_eq!(cache.get(&"b"), Some(2));
    }

    #[test]
    fn test_invalidate() {
        let cache = TtlCache::new(2, Duration::from_secs(60));
        cache.insert("a", 1);
        cache.invalidate(&"a");
        assert_eq!(cache.get(&"a"), None);
    }

    #[tokio::test]
    async fn test_gate_spaces_calls() {
        let gate = MinIntervalGate::new(Duration::from_millis(40));

        let start = Instant::now();
        gate.wait().await;
        gate.wait().await;

        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_gate_first_call_is_immediate() {
        let gate = MinIntervalGate::new(Duration::from_secs(10));

        let start = Instant::now();
        gate.wait().await;

        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
