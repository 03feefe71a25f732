use chrono::{DateTime, Duration, Utc};
use futures_util::future::join_all;
use relevance_engine::RelevanceEngine;
use routing_core::{
    AlertForwarder, CacheStats, Event, Portfolio, PortfolioLoader, RelevanceLevel,
    RelevanceScore, RoutedEventSummary, RoutingAnalytics, RoutingDecision, RoutingError,
    RoutingResult, RoutingStats, RoutingStore,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::cache::{CacheLookup, Clock, PortfolioCache, SystemClock};

/// Longest look-back window accepted by the query operations (10 years)
pub const MAX_HOURS_BACK: i64 = 24 * 365 * 10;

#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub cache_ttl_minutes: i64,
    /// Row cap for a user's relevant-events feed
    pub user_events_limit: i64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            cache_ttl_minutes: 30,
            user_events_limit: 100,
        }
    }
}

/// Portfolios gathered for one routing round
struct ActivePortfolios {
    portfolios: Vec<(String, Arc<Portfolio>)>,
    errors: Vec<String>,
}

/// Routes market events to the users whose portfolios they are relevant to
pub struct PortfolioRouter {
    engine: RelevanceEngine,
    loader: Arc<dyn PortfolioLoader>,
    store: Arc<dyn RoutingStore>,
    alerts: Arc<dyn AlertForwarder>,
    cache: PortfolioCache,
    clock: Arc<dyn Clock>,
    config: RouterConfig,
    routing_thresholds: BTreeMap<RelevanceLevel, f64>,
    stats: Mutex<RoutingStats>,
}

impl PortfolioRouter {
    pub fn new(
        loader: Arc<dyn PortfolioLoader>,
        store: Arc<dyn RoutingStore>,
        alerts: Arc<dyn AlertForwarder>,
        config: RouterConfig,
    ) -> Self {
        Self::with_clock(loader, store, alerts, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        loader: Arc<dyn PortfolioLoader>,
        store: Arc<dyn RoutingStore>,
        alerts: Arc<dyn AlertForwarder>,
        config: RouterConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let ttl = Duration::try_minutes(config.cache_ttl_minutes).unwrap_or(Duration::MAX);
        let cache = PortfolioCache::new(ttl, Arc::clone(&clock));
        let routing_thresholds = RelevanceLevel::ALL
            .into_iter()
            .map(|level| (level, level.threshold()))
            .collect();

        Self {
            engine: RelevanceEngine::new(),
            loader,
            store,
            alerts,
            cache,
            clock,
            config,
            routing_thresholds,
            stats: Mutex::new(RoutingStats::default()),
        }
    }

    /// Replace the scoring engine (custom weights)
    pub fn with_engine(mut self, engine: RelevanceEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn engine(&self) -> &RelevanceEngine {
        &self.engine
    }

    /// Route a single event to every active user it is relevant to.
    ///
    /// Fails only when the active-user list itself cannot be fetched.
    pub async fn route_event(
        &self,
        event: &Event,
        min_relevance_level: RelevanceLevel,
    ) -> RoutingResult<RoutingDecision> {
        let started = Instant::now();
        let active = self.get_active_user_portfolios().await?;

        if active.portfolios.is_empty() {
            tracing::info!(event_id = %event.event_id, "No active portfolios to route to");
            let mut decision =
                RoutingDecision::empty(&event.event_id, elapsed_ms(started));
            decision.errors = active.errors;
            return Ok(decision);
        }

        Ok(self
            .route_to_portfolios(
                event,
                &active.portfolios,
                active.errors,
                min_relevance_level,
                started,
            )
            .await)
    }

    /// Route many events against one shared portfolio load.
    ///
    /// Each event runs in its own task; a task that dies is logged and
    /// dropped, so the result may be shorter than `events`.
    pub async fn route_batch_events(
        self: &Arc<Self>,
        events: Vec<Event>,
        min_relevance_level: RelevanceLevel,
    ) -> RoutingResult<Vec<RoutingDecision>> {
        let active = self.get_active_user_portfolios().await?;
        let portfolios = Arc::new(active.portfolios);
        let load_errors = active.errors;

        tracing::info!(
            "Routing batch of {} events across {} portfolios",
            events.len(),
            portfolios.len()
        );

        let handles: Vec<_> = events
            .into_iter()
            .map(|event| {
                let router = Arc::clone(self);
                let portfolios = Arc::clone(&portfolios);
                let errors = load_errors.clone();
                tokio::spawn(async move {
                    let started = Instant::now();
                    if portfolios.is_empty() {
                        let mut decision =
                            RoutingDecision::empty(&event.event_id, elapsed_ms(started));
                        decision.errors = errors;
                        return decision;
                    }
                    router
                        .route_to_portfolios(
                            &event,
                            &portfolios,
                            errors,
                            min_relevance_level,
                            started,
                        )
                        .await
                })
            })
            .collect();

        let decisions = join_all(handles)
            .await
            .into_iter()
            .filter_map(|result| match result {
                Ok(decision) => Some(decision),
                Err(e) => {
                    tracing::error!("Batch routing task failed: {}", e);
                    None
                }
            })
            .collect();

        Ok(decisions)
    }

    /// Persisted routing rows for a user within the last `hours_back` hours
    pub async fn get_user_relevant_events(
        &self,
        user_id: &str,
        hours_back: i64,
        min_relevance_level: RelevanceLevel,
    ) -> RoutingResult<Vec<RoutedEventSummary>> {
        let since = self.window_start(hours_back)?;
        self.store
            .user_relevant_events(
                user_id,
                since,
                &min_relevance_level.at_or_above(),
                self.config.user_events_limit,
            )
            .await
    }

    pub async fn get_routing_analytics(&self, hours_back: i64) -> RoutingResult<RoutingAnalytics> {
        let since = self.window_start(hours_back)?;
        let history = self.store.routing_history_stats(since).await?;

        Ok(RoutingAnalytics {
            hours_back,
            history,
            routing_stats: self.routing_stats(),
            cache_stats: self.cache.stats(),
            generated_at: self.clock.now(),
        })
    }

    /// Drop one user's cached portfolio, or the whole cache when `user_id` is `None`.
    /// Returns the number of entries removed.
    pub fn clear_cache(&self, user_id: Option<&str>) -> usize {
        let removed = match user_id {
            Some(user_id) => usize::from(self.cache.invalidate(user_id)),
            None => self.cache.clear(),
        };
        tracing::info!("Cleared {} cached portfolio(s)", removed);
        removed
    }

    /// Called when a user's holdings change so the next round reloads them
    pub fn invalidate_portfolio(&self, user_id: &str) -> bool {
        self.cache.invalidate(user_id)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn routing_stats(&self) -> RoutingStats {
        self.lock_stats().clone()
    }

    pub fn routing_thresholds(&self) -> &BTreeMap<RelevanceLevel, f64> {
        &self.routing_thresholds
    }

    /// Load every active user's portfolio through the cache.
    ///
    /// Per-user failures are logged and skip that user; only a failure to
    /// list users aborts the round.
    async fn get_active_user_portfolios(&self) -> RoutingResult<ActivePortfolios> {
        let user_ids = self.loader.list_active_portfolio_users().await?;

        let mut portfolios = Vec::with_capacity(user_ids.len());
        let mut errors = Vec::new();
        let mut hits = 0u64;
        let mut misses = 0u64;

        for user_id in user_ids {
            let loader = Arc::clone(&self.loader);
            let key = user_id.clone();
            let lookup = self
                .cache
                .get_or_load(&user_id, move || async move { loader.load_portfolio(&key).await })
                .await;

            match lookup {
                Ok((portfolio, outcome)) => {
                    match outcome {
                        CacheLookup::Hit => hits += 1,
                        CacheLookup::Miss => misses += 1,
                    }
                    match portfolio {
                        Some(portfolio) => portfolios.push((user_id, portfolio)),
                        None => tracing::debug!(user_id = %user_id, "No portfolio found, skipping"),
                    }
                }
                Err(e) => {
                    misses += 1;
                    tracing::warn!("Failed to load portfolio for {}: {}", user_id, e);
                    errors.push(format!("portfolio load failed for {user_id}: {e}"));
                }
            }
        }

        if hits + misses > 0 {
            self.lock_stats().cache_hit_rate = hits as f64 / (hits + misses) as f64;
        }

        tracing::debug!(
            "Loaded {} portfolios ({} cache hits, {} misses)",
            portfolios.len(),
            hits,
            misses
        );

        Ok(ActivePortfolios { portfolios, errors })
    }

    async fn route_to_portfolios(
        &self,
        event: &Event,
        portfolios: &[(String, Arc<Portfolio>)],
        mut errors: Vec<String>,
        min_relevance_level: RelevanceLevel,
        started: Instant,
    ) -> RoutingDecision {
        let mut users_by_level: BTreeMap<RelevanceLevel, Vec<String>> = BTreeMap::new();
        let mut matched: HashMap<String, RelevanceScore> = HashMap::new();

        for (user_id, portfolio) in portfolios {
            let score = self.engine.score_event(event, portfolio);
            if score.level < min_relevance_level {
                continue;
            }

            // Audit write failures do not un-route the user
            if let Err(e) = self
                .store
                .persist_routing_decision(&event.event_id, user_id, &score)
                .await
            {
                tracing::warn!(
                    "Failed to persist routing decision for event {} user {}: {}",
                    event.event_id,
                    user_id,
                    e
                );
                errors.push(format!("persist failed for {user_id}: {e}"));
            }

            users_by_level
                .entry(score.level)
                .or_default()
                .push(user_id.clone());
            matched.insert(user_id.clone(), score);
        }

        if !matched.is_empty() {
            if let Err(e) = self.alerts.notify(&event.event_id, &matched).await {
                tracing::warn!(
                    "Alert forwarding via {} failed for event {}: {}",
                    self.alerts.name(),
                    event.event_id,
                    e
                );
                errors.push(format!("alert forwarding failed: {e}"));
            }
        }

        let processing_time_ms = elapsed_ms(started);
        let mut decision = RoutingDecision {
            event_id: event.event_id.clone(),
            total_users_matched: matched.len(),
            users_by_level,
            processing_time_ms,
            timestamp: self.clock.now(),
            errors,
        };

        if let Err(e) = self.store.record_routing_summary(&decision).await {
            tracing::warn!("Failed to record routing summary for {}: {}", event.event_id, e);
            decision.errors.push(format!("summary write failed: {e}"));
        }

        self.update_stats(processing_time_ms, matched.len());

        tracing::info!(
            "Routed event {} to {} of {} users in {:.1}ms",
            event.event_id,
            matched.len(),
            portfolios.len(),
            processing_time_ms
        );

        decision
    }

    /// Start of a look-back window of `hours_back` hours ending now
    fn window_start(&self, hours_back: i64) -> RoutingResult<DateTime<Utc>> {
        if !(1..=MAX_HOURS_BACK).contains(&hours_back) {
            return Err(RoutingError::InvalidInput(format!(
                "hours_back must be between 1 and {MAX_HOURS_BACK}, got {hours_back}"
            )));
        }

        Duration::try_hours(hours_back)
            .and_then(|window| self.clock.now().checked_sub_signed(window))
            .ok_or_else(|| {
                RoutingError::InvalidInput(format!("hours_back {hours_back} is out of range"))
            })
    }

    fn update_stats(&self, processing_time_ms: f64, users_notified: usize) {
        let mut stats = self.lock_stats();
        stats.total_events_processed += 1;
        stats.total_users_notified += users_notified as u64;
        let n = stats.total_events_processed as f64;
        stats.avg_processing_time_ms += (processing_time_ms - stats.avg_processing_time_ms) / n;
    }

    fn lock_stats(&self) -> std::sync::MutexGuard<'_, RoutingStats> {
        self.stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}
