//! Introspection result cache.
//!
//! Results are memoized per token [`Fingerprint`]. The cache is split into
//! shards, each behind its own lock, so concurrent lookups for different
//! tokens rarely contend.
//!
//! ## Eviction
//!
//! - **TTL**: an entry is never served at or after `stored_at + ttl`. Expired
//!   entries are dropped lazily on read and proactively by the sweeper.
//! - **Capacity**: each shard holds at most `capacity / shards` entries (at
//!   least one); the least recently used entry goes first.
//! - **Key generation**: entries remember the key set generation they were
//!   decided under and are treated as misses once keys rotate. An entry is
//!   never replaced by one decided under an older generation.
//! - **Purge epoch**: every [`IntrospectionCache::purge_where`] advances the
//!   epoch. Results computed before a purge are not stored after it.
//!
//! ## Coalescing
//!
//! [`IntrospectionCache::coalesce`] runs at most one evaluation per
//! fingerprint, key generation and purge epoch; see [`flight`]. A caller that
//! arrives after keys rotate or a purge never joins an evaluation started
//! before it.

pub mod flight;

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::result::IntrospectionResult;
use crate::token::Fingerprint;

pub use flight::{FlightError, SingleFlight};

/// Cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Total number of entries across all shards.
    pub capacity: usize,

    /// Number of independently locked shards.
    pub shards: usize,

    /// How often the sweeper drops expired entries.
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            shards: 16,
            sweep_interval: Duration::from_secs(30),
        }
    }
}

/// A memoized introspection result.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Token fingerprint.
    pub fingerprint: Fingerprint,
    /// The cached decision.
    pub result: IntrospectionResult,
    /// When the entry was stored.
    pub stored_at: Instant,
    /// How long the entry may be served.
    pub ttl: Duration,
    /// Key set generation the decision was made under.
    pub key_generation: u64,
}

impl CacheEntry {
    /// Returns `true` if the entry must no longer be served at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) >= self.ttl
    }
}

/// Cache statistics for monitoring.
#[derive(Debug, Default)]
pub struct CacheStatistics {
    /// Lookups that returned an entry.
    pub hits: AtomicU64,
    /// Lookups that found nothing usable.
    pub misses: AtomicU64,
    /// Entries stored.
    pub insertions: AtomicU64,
    /// Entries dropped to make room.
    pub evictions: AtomicU64,
    /// Entries dropped because their TTL ran out.
    pub expirations: AtomicU64,
    /// Entries dropped because keys rotated or a caller purged them.
    pub invalidations: AtomicU64,
}

impl CacheStatistics {
    /// Calculate hit ratio.
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed) as f64;
        let misses = self.misses.load(Ordering::Relaxed) as f64;
        let total = hits + misses;

        if total == 0.0 { 0.0 } else { hits / total }
    }
}

/// A point-in-time snapshot of cache statistics.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub insertions: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub invalidations: u64,
    pub coalesced: u64,
    pub in_flight: usize,
    pub size: usize,
    pub hit_ratio: f64,
}

struct Slot {
    entry: CacheEntry,
    tick: u64,
}

/// One lock's worth of entries with LRU bookkeeping.
#[derive(Default)]
struct Shard {
    entries: HashMap<Fingerprint, Slot>,
    /// Access tick -> fingerprint; the first key is the least recently used.
    order: BTreeMap<u64, Fingerprint>,
    next_tick: u64,
}

impl Shard {
    fn tick(&mut self) -> u64 {
        self.next_tick += 1;
        self.next_tick
    }

    fn touch(&mut self, fingerprint: Fingerprint) {
        let tick = self.tick();
        if let Some(slot) = self.entries.get_mut(&fingerprint) {
            self.order.remove(&slot.tick);
            slot.tick = tick;
            self.order.insert(tick, fingerprint);
        }
    }

    fn remove(&mut self, fingerprint: &Fingerprint) -> Option<CacheEntry> {
        let slot = self.entries.remove(fingerprint)?;
        self.order.remove(&slot.tick);
        Some(slot.entry)
    }

    fn evict_lru(&mut self) -> bool {
        match self.order.pop_first() {
            Some((_, fingerprint)) => {
                self.entries.remove(&fingerprint);
                true
            }
            None => false,
        }
    }

    fn retain(&mut self, mut keep: impl FnMut(&CacheEntry) -> bool) -> usize {
        let doomed: Vec<Fingerprint> = self
            .entries
            .iter()
            .filter(|(_, slot)| !keep(&slot.entry))
            .map(|(fp, _)| *fp)
            .collect();
        for fp in &doomed {
            self.remove(fp);
        }
        doomed.len()
    }
}

/// What a flight is keyed by: the token, the key generation and the purge epoch.
type FlightKey = (Fingerprint, u64, u64);

/// Sharded TTL + LRU cache of introspection results.
pub struct IntrospectionCache {
    shards: Box<[Mutex<Shard>]>,
    shard_capacity: usize,
    epoch: AtomicU64,
    flights: SingleFlight<FlightKey, IntrospectionResult>,
    stats: CacheStatistics,
}

impl std::fmt::Debug for IntrospectionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntrospectionCache")
            .field("shards", &self.shards.len())
            .field("shard_capacity", &self.shard_capacity)
            .field("epoch", &self.epoch())
            .field("stats", &self.stats())
            .finish()
    }
}

impl Default for IntrospectionCache {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

impl IntrospectionCache {
    /// Creates a cache holding roughly `capacity` entries over `shards` shards.
    #[must_use]
    pub fn new(capacity: usize, shards: usize) -> Self {
        let shards = shards.max(1);
        let shard_capacity = capacity.div_ceil(shards).max(1);
        Self {
            shards: (0..shards).map(|_| Mutex::new(Shard::default())).collect(),
            shard_capacity,
            epoch: AtomicU64::new(0),
            flights: SingleFlight::new(),
            stats: CacheStatistics::default(),
        }
    }

    /// Creates a cache from configuration.
    #[must_use]
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.capacity, config.shards)
    }

    fn shard(&self, fingerprint: &Fingerprint) -> &Mutex<Shard> {
        &self.shards[fingerprint.shard(self.shards.len())]
    }

    /// Looks up an entry, dropping it if its TTL has run out.
    #[must_use]
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<CacheEntry> {
        self.fetch(fingerprint, None)
    }

    /// Looks up a result decided under key set `generation`.
    ///
    /// Entries from another generation are dropped and reported as a miss.
    #[must_use]
    pub fn lookup(&self, fingerprint: &Fingerprint, generation: u64) -> Option<IntrospectionResult> {
        self.fetch(fingerprint, Some(generation)).map(|entry| entry.result)
    }

    fn fetch(&self, fingerprint: &Fingerprint, generation: Option<u64>) -> Option<CacheEntry> {
        let now = Instant::now();
        let mut shard = self.shard(fingerprint).lock();

        let (expired, stale) = match shard.entries.get(fingerprint) {
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            Some(slot) => (
                slot.entry.is_expired_at(now),
                generation.is_some_and(|g| g != slot.entry.key_generation),
            ),
        };

        if expired || stale {
            shard.remove(fingerprint);
            drop(shard);
            let counter = if expired {
                &self.stats.expirations
            } else {
                &self.stats.invalidations
            };
            counter.fetch_add(1, Ordering::Relaxed);
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        shard.touch(*fingerprint);
        let entry = shard.entries.get(fingerprint).map(|slot| slot.entry.clone());
        drop(shard);
        self.stats.hits.fetch_add(1, Ordering::Relaxed);
        entry
    }

    /// Current purge epoch.
    ///
    /// Read it before starting an evaluation and hand it to
    /// [`put_if_current`](Self::put_if_current) when storing the result.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Stores a result for `ttl`. A zero TTL stores nothing.
    pub fn put(
        &self,
        fingerprint: Fingerprint,
        result: IntrospectionResult,
        ttl: Duration,
        generation: u64,
    ) {
        self.insert(fingerprint, result, ttl, generation, None);
    }

    /// Stores a result computed while the purge epoch was `epoch`.
    ///
    /// Nothing is stored if a purge has run since, or if the fingerprint
    /// already holds an entry from a newer key generation. Returns `true` if
    /// the entry was stored.
    pub fn put_if_current(
        &self,
        fingerprint: Fingerprint,
        result: IntrospectionResult,
        ttl: Duration,
        generation: u64,
        epoch: u64,
    ) -> bool {
        self.insert(fingerprint, result, ttl, generation, Some(epoch))
    }

    fn insert(
        &self,
        fingerprint: Fingerprint,
        result: IntrospectionResult,
        ttl: Duration,
        generation: u64,
        epoch: Option<u64>,
    ) -> bool {
        if ttl.is_zero() {
            return false;
        }

        let entry = CacheEntry {
            fingerprint,
            result,
            stored_at: Instant::now(),
            ttl,
            key_generation: generation,
        };

        let mut shard = self.shard(&fingerprint).lock();
        // Checked under the shard lock: a purge advances the epoch before it
        // takes any shard lock, so an entry stored here is either rejected or
        // seen by that purge.
        if let Some(epoch) = epoch {
            let superseded = shard
                .entries
                .get(&fingerprint)
                .is_some_and(|slot| slot.entry.key_generation > generation);
            if superseded || self.epoch() != epoch {
                return false;
            }
        }
        let replaced = shard.remove(&fingerprint).is_some();
        let mut evicted = false;
        if !replaced && shard.entries.len() >= self.shard_capacity {
            evicted = shard.evict_lru();
        }
        let tick = shard.tick();
        shard.order.insert(tick, fingerprint);
        shard.entries.insert(fingerprint, Slot { entry, tick });
        drop(shard);

        self.stats.insertions.fetch_add(1, Ordering::Relaxed);
        if evicted {
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
        }
        true
    }

    /// Removes an entry. Returns `true` if one was present.
    pub fn remove(&self, fingerprint: &Fingerprint) -> bool {
        let removed = self.shard(fingerprint).lock().remove(fingerprint).is_some();
        if removed {
            self.stats.invalidations.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    /// Removes every entry matching `predicate` and advances the purge epoch.
    /// Returns how many were removed.
    pub fn purge_where(&self, predicate: impl Fn(&CacheEntry) -> bool) -> usize {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        let removed: usize = self
            .shards
            .iter()
            .map(|shard| shard.lock().retain(|entry| !predicate(entry)))
            .sum();
        self.stats
            .invalidations
            .fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    /// Drops every expired entry. Returns how many were dropped.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let removed: usize = self
            .shards
            .iter()
            .map(|shard| shard.lock().retain(|entry| !entry.is_expired_at(now)))
            .sum();
        self.stats
            .expirations
            .fetch_add(removed as u64, Ordering::Relaxed);
        if removed > 0 {
            debug!(removed, "Swept expired cache entries");
        }
        removed
    }

    /// Removes all entries.
    pub fn clear(&self) {
        for shard in self.shards.iter() {
            let mut shard = shard.lock();
            shard.entries.clear();
            shard.order.clear();
        }
    }

    /// Number of stored entries, including ones not yet swept.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.lock().entries.len()).sum()
    }

    /// Returns `true` if no entries are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs `work` for `fingerprint` unless an evaluation under the same key
    /// `generation` and purge `epoch` is already in flight, waiting at most
    /// `wait` for the shared result.
    ///
    /// # Errors
    ///
    /// See [`SingleFlight::run`].
    pub async fn coalesce<F, Fut>(
        &self,
        fingerprint: Fingerprint,
        generation: u64,
        epoch: u64,
        wait: Duration,
        work: F,
    ) -> Result<IntrospectionResult, FlightError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = IntrospectionResult> + Send + 'static,
    {
        self.flights
            .run((fingerprint, generation, epoch), wait, work)
            .await
    }

    /// Get a snapshot of current statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            insertions: self.stats.insertions.load(Ordering::Relaxed),
            evictions: self.stats.evictions.load(Ordering::Relaxed),
            expirations: self.stats.expirations.load(Ordering::Relaxed),
            invalidations: self.stats.invalidations.load(Ordering::Relaxed),
            coalesced: self.flights.joins(),
            in_flight: self.flights.in_flight(),
            size: self.len(),
            hit_ratio: self.stats.hit_ratio(),
        }
    }

    /// Starts the background sweeper.
    ///
    /// The task holds only a weak reference and stops on its own once the
    /// cache is dropped, or when the returned handle is shut down or dropped.
    pub fn start_sweeper(self: &Arc<Self>, every: Duration) -> SweeperHandle {
        spawn_sweeper(Arc::downgrade(self), every, |cache: Arc<Self>| async move {
            cache.sweep_expired();
        })
    }
}

/// Spawns a task that calls `tick` with the upgraded `target` every `every`.
///
/// The task exits once `target` has been dropped, or when the returned
/// handle is shut down or dropped.
pub(crate) fn spawn_sweeper<T, F, Fut>(target: Weak<T>, every: Duration, mut tick: F) -> SweeperHandle
where
    T: Send + Sync + 'static,
    F: FnMut(Arc<T>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        info!(interval_ms = every.as_millis() as u64, "Sweeper started");

        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let Some(target) = target.upgrade() else {
                        debug!("Sweeper target dropped, exiting");
                        break;
                    };
                    tick(target).await;
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Sweeper shutting down");
                        break;
                    }
                }
            }
        }
    });

    SweeperHandle {
        shutdown: shutdown_tx,
        task,
    }
}

/// Handle to a running sweeper task.
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stops the sweeper and waits for it to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }

    /// Returns `true` once the task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::IntrospectionReason;

    fn fp(n: u32) -> Fingerprint {
        Fingerprint::of(&format!("token-{n}"))
    }

    fn result() -> IntrospectionResult {
        IntrospectionResult::inactive(IntrospectionReason::Malformed)
    }

    const TTL: Duration = Duration::from_secs(60);

    #[test]
    fn test_put_and_get() {
        let cache = IntrospectionCache::new(10, 2);
        cache.put(fp(1), result(), TTL, 1);

        let entry = cache.get(&fp(1)).unwrap();
        assert_eq!(entry.result, result());
        assert_eq!(entry.key_generation, 1);
        assert!(cache.get(&fp(2)).is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.insertions, 1);
    }

    #[test]
    fn test_zero_ttl_not_stored() {
        let cache = IntrospectionCache::new(10, 1);
        cache.put(fp(1), result(), Duration::ZERO, 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_expired_entry_not_served() {
        let cache = IntrospectionCache::new(10, 1);
        cache.put(fp(1), result(), Duration::from_millis(20), 1);
        assert!(cache.get(&fp(1)).is_some());

        std::thread::sleep(Duration::from_millis(40));
        assert!(cache.get(&fp(1)).is_none());
        assert!(cache.is_empty());
        assert_eq!(cache.stats().expirations, 1);
    }

    #[test]
    fn test_generation_mismatch_is_miss() {
        let cache = IntrospectionCache::new(10, 1);
        cache.put(fp(1), result(), TTL, 1);

        assert!(cache.lookup(&fp(1), 1).is_some());
        assert!(cache.lookup(&fp(1), 2).is_none());
        // Dropped, so the old generation no longer finds it either.
        assert!(cache.lookup(&fp(1), 1).is_none());
        assert_eq!(cache.stats().invalidations, 1);
    }

    #[test]
    fn test_lru_eviction() {
        let cache = IntrospectionCache::new(3, 1);
        cache.put(fp(1), result(), TTL, 1);
        cache.put(fp(2), result(), TTL, 1);
        cache.put(fp(3), result(), TTL, 1);

        // Touch 1 so 2 becomes the least recently used.
        assert!(cache.get(&fp(1)).is_some());
        cache.put(fp(4), result(), TTL, 1);

        assert_eq!(cache.len(), 3);
        assert!(cache.get(&fp(2)).is_none());
        assert!(cache.get(&fp(1)).is_some());
        assert!(cache.get(&fp(3)).is_some());
        assert!(cache.get(&fp(4)).is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_replace_does_not_evict() {
        let cache = IntrospectionCache::new(2, 1);
        cache.put(fp(1), result(), TTL, 1);
        cache.put(fp(2), result(), TTL, 1);
        cache.put(fp(1), result(), TTL, 2);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&fp(1)).unwrap().key_generation, 2);
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn test_capacity_is_bounded_across_shards() {
        let cache = IntrospectionCache::new(64, 4);
        for n in 0..1_000 {
            cache.put(fp(n), result(), TTL, 1);
        }
        assert!(cache.len() <= 64);
    }

    #[test]
    fn test_remove_and_purge() {
        let cache = IntrospectionCache::new(10, 1);
        for n in 0..6 {
            cache.put(fp(n), result(), TTL, u64::from(n % 2));
        }

        assert!(cache.remove(&fp(0)));
        assert!(!cache.remove(&fp(0)));

        let purged = cache.purge_where(|entry| entry.key_generation == 1);
        assert_eq!(purged, 3);
        assert_eq!(cache.len(), 2);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_put_after_purge_is_dropped() {
        let cache = IntrospectionCache::new(10, 1);
        let epoch = cache.epoch();

        cache.purge_where(|_| false);
        assert!(!cache.put_if_current(fp(1), result(), TTL, 1, epoch));
        assert!(cache.is_empty());

        assert!(cache.put_if_current(fp(1), result(), TTL, 1, cache.epoch()));
        assert!(cache.get(&fp(1)).is_some());
    }

    #[test]
    fn test_older_generation_does_not_replace_newer() {
        let cache = IntrospectionCache::new(10, 1);
        let epoch = cache.epoch();
        cache.put(fp(1), result(), TTL, 3);

        assert!(!cache.put_if_current(fp(1), result(), TTL, 1, epoch));
        assert_eq!(cache.get(&fp(1)).unwrap().key_generation, 3);

        assert!(cache.put_if_current(fp(1), result(), TTL, 4, epoch));
        assert_eq!(cache.get(&fp(1)).unwrap().key_generation, 4);
    }

    #[tokio::test]
    async fn test_coalesce_separates_generations_and_epochs() {
        let cache = Arc::new(IntrospectionCache::new(10, 1));
        let slow = |reason: IntrospectionReason| {
            move || async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                IntrospectionResult::inactive(reason)
            }
        };

        let (a, b, c) = tokio::join!(
            cache.coalesce(fp(1), 1, 0, Duration::from_secs(1), slow(IntrospectionReason::Valid)),
            cache.coalesce(fp(1), 2, 0, Duration::from_secs(1), slow(IntrospectionReason::BadSignature)),
            cache.coalesce(fp(1), 1, 1, Duration::from_secs(1), slow(IntrospectionReason::Revoked)),
        );
        assert_eq!(a.unwrap().reason, IntrospectionReason::Valid);
        assert_eq!(b.unwrap().reason, IntrospectionReason::BadSignature);
        assert_eq!(c.unwrap().reason, IntrospectionReason::Revoked);
        assert_eq!(cache.stats().coalesced, 0);
    }

    #[test]
    fn test_sweep_expired() {
        let cache = IntrospectionCache::new(10, 2);
        cache.put(fp(1), result(), Duration::from_millis(10), 1);
        cache.put(fp(2), result(), TTL, 1);

        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.sweep_expired(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_sweeper_runs_and_stops() {
        let cache = Arc::new(IntrospectionCache::new(10, 1));
        cache.put(fp(1), result(), Duration::from_millis(10), 1);

        let sweeper = cache.start_sweeper(Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(cache.is_empty());

        sweeper.shutdown().await;
    }

    #[tokio::test]
    async fn test_sweeper_exits_when_cache_dropped() {
        let cache = Arc::new(IntrospectionCache::new(10, 1));
        let sweeper = cache.start_sweeper(Duration::from_millis(10));
        drop(cache);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(sweeper.is_finished());
    }

    #[tokio::test]
    async fn test_coalesce_counts_joins() {
        let cache = Arc::new(IntrospectionCache::new(10, 1));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                cache
                    .coalesce(fp(1), 1, 0, Duration::from_secs(1), || async {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        IntrospectionResult::inactive(IntrospectionReason::BadSignature)
                    })
                    .await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
        assert_eq!(cache.stats().coalesced, 3);
    }
}
