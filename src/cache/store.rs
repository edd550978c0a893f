//! Two-tier cache store.
//!
//! Fast tier: bounded in-process LRU with a short TTL.
//! Durable tier: a [`DurableBackend`] with a long TTL, purged on read.

use std::sync::{Arc, Mutex};

use lru::LruCache;
use metrics::counter;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, warn};

use super::backend::DurableBackend;
use super::clock::Clock;
use super::config::CacheConfig;
use super::entry::{CacheEntry, Cached, Expiry};
use super::keys::sanitize_key;
use super::lock::mutex_lock;

const SOURCE: &str = "cache::store";

const METRIC_HIT: &str = "folio_cache_hit_total";
const METRIC_MISS: &str = "folio_cache_miss_total";
const METRIC_EVICT: &str = "folio_cache_evict_total";

/// Snapshot of store counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_update: Option<OffsetDateTime>,
}

#[derive(Clone, Copy)]
enum Tier {
    Memory,
    Durable,
}

impl Tier {
    fn label(self) -> &'static str {
        match self {
            Tier::Memory => "memory",
            Tier::Durable => "durable",
        }
    }
}

/// Write-through key/value store in front of the durable backend.
pub struct CacheStore {
    config: CacheConfig,
    memory: Mutex<LruCache<String, CacheEntry>>,
    durable: Arc<dyn DurableBackend>,
    clock: Arc<dyn Clock>,
    stats: Mutex<CacheStats>,
}

impl CacheStore {
    pub fn new(
        config: CacheConfig,
        durable: Arc<dyn DurableBackend>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let capacity = config.memory_capacity_non_zero();
        Self {
            config,
            memory: Mutex::new(LruCache::new(capacity)),
            durable,
            clock,
            stats: Mutex::new(CacheStats::default()),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Look up a fresh entry, fast tier first.
    ///
    /// Durable hits are promoted into the fast tier. Entries that fail to
    /// decode as `T` count as misses.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<Cached<T>> {
        let id = sanitize_key(key);
        let now = self.clock.now();

        if let Some(entry) = self.memory_lookup(&id, now) {
            return self.finish_lookup(&id, entry, Tier::Memory);
        }

        let Some(entry) = self.read_durable(&id).await else {
            self.record_miss();
            return None;
        };

        if entry.is_expired(now, self.config.disk_ttl_span()) {
            debug!(target = SOURCE, key = %id, "purging expired durable entry");
            if let Err(err) = self.durable.delete(&id).await {
                warn!(target = SOURCE, key = %id, error = %err, "failed to purge expired durable entry");
            }
            self.record_miss();
            return None;
        }

        let promoted = CacheEntry::new(
            entry.data.clone(),
            now,
            entry.revalidation_token.clone(),
            entry.expiry,
        );
        self.memory_put(id.clone(), promoted);

        self.finish_lookup(&id, entry, Tier::Durable)
    }

    /// Return whatever is stored under `key` regardless of age.
    ///
    /// Never purges and leaves the hit/miss counters untouched.
    pub async fn get_stale<T: DeserializeOwned>(&self, key: &str) -> Option<Cached<T>> {
        let id = sanitize_key(key);

        let memory = mutex_lock(&self.memory, SOURCE, "get_stale")
            .peek(&id)
            .cloned();
        let entry = match memory {
            Some(entry) => entry,
            None => self.read_durable(&id).await?,
        };

        decode(&id, entry)
    }

    /// Return the entry under `key` regardless of age, counting it in the
    /// statistics.
    ///
    /// An entry within its tier's TTL is a hit, anything else a miss. Stale
    /// entries are returned and kept so their revalidation token can back a
    /// conditional request.
    pub async fn get_revalidatable<T: DeserializeOwned>(&self, key: &str) -> Option<Cached<T>> {
        let id = sanitize_key(key);
        let now = self.clock.now();

        let memory = mutex_lock(&self.memory, SOURCE, "get_revalidatable")
            .get(&id)
            .cloned();
        if let Some(entry) = memory
            .as_ref()
            .filter(|entry| !entry.is_expired(now, self.config.memory_ttl_span()))
        {
            return self.finish_lookup(&id, entry.clone(), Tier::Memory);
        }

        match self.read_durable(&id).await {
            Some(entry) if !entry.is_expired(now, self.config.disk_ttl_span()) => {
                let promoted = CacheEntry::new(
                    entry.data.clone(),
                    now,
                    entry.revalidation_token.clone(),
                    entry.expiry,
                );
                self.memory_put(id.clone(), promoted);
                self.finish_lookup(&id, entry, Tier::Durable)
            }
            durable => {
                self.record_miss();
                durable.or(memory).and_then(|entry| decode(&id, entry))
            }
        }
    }

    /// Write through both tiers with the tiered TTLs.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        data: &T,
        revalidation_token: Option<String>,
    ) {
        self.write(key, data, revalidation_token, Expiry::Tiered)
            .await;
    }

    /// Write through both tiers with no age-based expiry.
    pub async fn set_permanent<T: Serialize + ?Sized>(&self, key: &str, data: &T) {
        self.write(key, data, None, Expiry::Never).await;
    }

    /// Drop `key` from both tiers.
    pub async fn invalidate(&self, key: &str) {
        let id = sanitize_key(key);
        mutex_lock(&self.memory, SOURCE, "invalidate").pop(&id);
        if let Err(err) = self.durable.delete(&id).await {
            warn!(target = SOURCE, key = %id, error = %err, "failed to invalidate durable entry");
        }
    }

    /// Drop every entry from both tiers.
    pub async fn clear(&self) {
        mutex_lock(&self.memory, SOURCE, "clear").clear();
        if let Err(err) = self.durable.clear().await {
            warn!(target = SOURCE, error = %err, "failed to clear durable cache");
        }
    }

    pub fn stats(&self) -> CacheStats {
        *mutex_lock(&self.stats, SOURCE, "stats")
    }

    /// Number of entries currently held by the fast tier.
    pub fn memory_len(&self) -> usize {
        mutex_lock(&self.memory, SOURCE, "memory_len").len()
    }

    async fn write<T: Serialize + ?Sized>(
        &self,
        key: &str,
        data: &T,
        revalidation_token: Option<String>,
        expiry: Expiry,
    ) {
        let id = sanitize_key(key);
        let value = match serde_json::to_value(data) {
            Ok(value) => value,
            Err(err) => {
                warn!(target = SOURCE, key = %id, error = %err, "value could not be serialized for caching");
                return;
            }
        };

        let now = self.clock.now();
        let entry = CacheEntry::new(value, now, revalidation_token, expiry);

        let durable_record = serde_json::to_value(&entry);
        self.memory_put(id.clone(), entry);

        match durable_record {
            Ok(record) => {
                if let Err(err) = self.durable.write(&id, &record).await {
                    warn!(target = SOURCE, key = %id, error = %err, "durable cache write failed");
                }
            }
            Err(err) => {
                warn!(target = SOURCE, key = %id, error = %err, "cache entry could not be encoded");
            }
        }

        mutex_lock(&self.stats, SOURCE, "set.stats").last_update = Some(now);
    }

    async fn read_durable(&self, id: &str) -> Option<CacheEntry> {
        match self.durable.read(id).await {
            Ok(Some(raw)) => match serde_json::from_value::<CacheEntry>(raw) {
                Ok(entry) => Some(entry),
                Err(err) => {
                    warn!(target = SOURCE, key = %id, error = %err, "discarding unreadable durable entry");
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                warn!(target = SOURCE, key = %id, error = %err, "durable cache read failed");
                None
            }
        }
    }

    fn memory_lookup(&self, id: &str, now: OffsetDateTime) -> Option<CacheEntry> {
        let mut memory = mutex_lock(&self.memory, SOURCE, "get.memory");
        let expired = memory
            .peek(id)
            .map(|entry| entry.is_expired(now, self.config.memory_ttl_span()))?;

        if expired {
            memory.pop(id);
            return None;
        }

        memory.get(id).cloned()
    }

    fn memory_put(&self, id: String, entry: CacheEntry) {
        let evicted = mutex_lock(&self.memory, SOURCE, "set.memory").push(id.clone(), entry);
        if let Some((evicted_key, _)) = evicted
            && evicted_key != id
        {
            debug!(target = SOURCE, key = %evicted_key, "evicted from memory tier");
            counter!(METRIC_EVICT).increment(1);
        }
    }

    fn finish_lookup<T: DeserializeOwned>(
        &self,
        id: &str,
        entry: CacheEntry,
        tier: Tier,
    ) -> Option<Cached<T>> {
        match decode(id, entry) {
            Some(cached) => {
                mutex_lock(&self.stats, SOURCE, "get.stats").hits += 1;
                counter!(METRIC_HIT, "tier" => tier.label()).increment(1);
                Some(cached)
            }
            None => {
                self.record_miss();
                None
            }
        }
    }

    fn record_miss(&self) {
        mutex_lock(&self.stats, SOURCE, "get.stats").misses += 1;
        counter!(METRIC_MISS).increment(1);
    }
}

fn decode<T: DeserializeOwned>(id: &str, entry: CacheEntry) -> Option<Cached<T>> {
    match serde_json::from_value(entry.data) {
        Ok(data) => Some(Cached {
            data,
            revalidation_token: entry.revalidation_token,
        }),
        Err(err) => {
            warn!(target = SOURCE, key = %id, error = %err, "cached value has unexpected shape");
            None
        }
    }
}
