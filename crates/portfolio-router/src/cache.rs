use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use routing_core::{CacheStats, Portfolio, RoutingResult};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Time source for TTL checks
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Internal cache entry with timestamp
struct CacheEntry {
    portfolio: Arc<Portfolio>,
    cached_at: DateTime<Utc>,
}

/// Outcome of a cache lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheLookup {
    Hit,
    Miss,
}

/// TTL cache of portfolio snapshots keyed by user id.
///
/// Entries are replaced wholesale on reload and only leave the cache
/// through TTL lapse or an explicit invalidate/clear.
pub struct PortfolioCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl PortfolioCache {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn is_fresh(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        now - entry.cached_at < self.ttl
    }

    /// Cached snapshot if present and younger than the TTL
    pub fn get_fresh(&self, user_id: &str) -> Option<Arc<Portfolio>> {
        let now = self.clock.now();
        self.entries
            .get(user_id)
            .filter(|entry| self.is_fresh(entry, now))
            .map(|entry| Arc::clone(&entry.portfolio))
    }

    /// Replace the entry for `user_id` with a freshly stamped snapshot
    pub fn insert(&self, user_id: &str, portfolio: Portfolio) -> Arc<Portfolio> {
        let portfolio = Arc::new(portfolio);
        self.entries.insert(
            user_id.to_string(),
            CacheEntry {
                portfolio: Arc::clone(&portfolio),
                cached_at: self.clock.now(),
            },
        );
        portfolio
    }

    /// Return the cached snapshot or load it through `load`.
    ///
    /// Load errors and not-found results leave any stale entry untouched
    /// and are reported as misses.
    pub async fn get_or_load<F, Fut>(
        &self,
        user_id: &str,
        load: F,
    ) -> RoutingResult<(Option<Arc<Portfolio>>, CacheLookup)>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = RoutingResult<Option<Portfolio>>>,
    {
        if let Some(portfolio) = self.get_fresh(user_id) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(user_id, "portfolio cache hit");
            return Ok((Some(portfolio), CacheLookup::Hit));
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(user_id, "portfolio cache miss");

        let loaded = load().await?;
        Ok((
            loaded.map(|portfolio| self.insert(user_id, portfolio)),
            CacheLookup::Miss,
        ))
    }

    pub fn invalidate(&self, user_id: &str) -> bool {
        self.entries.remove(user_id).is_some()
    }

    /// Drop every entry, returning how many were removed
    pub fn clear(&self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let now = self.clock.now();
        let fresh_entries = self
            .entries
            .iter()
            .filter(|entry| self.is_fresh(entry.value(), now))
            .count();
        let cached_portfolios = self.entries.len();
        let total_hits = self.hits.load(Ordering::Relaxed);
        let total_misses = self.misses.load(Ordering::Relaxed);
        let lookups = total_hits + total_misses;

        CacheStats {
            cached_portfolios,
            fresh_entries,
            expired_entries: cached_portfolios.saturating_sub(fresh_entries),
            ttl_minutes: self.ttl.num_minutes(),
            total_hits,
            total_misses,
            hit_rate: if lookups > 0 {
                total_hits as f64 / lookups as f64
            } else {
                0.0
            },
        }
    }
}
