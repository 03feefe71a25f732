use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::{
    Portfolio, RelevanceLevel, RelevanceScore, RoutedEventSummary, RoutingDecision,
    RoutingHistoryStats, RoutingResult,
};

/// Source of portfolio snapshots
#[async_trait]
pub trait PortfolioLoader: Send + Sync {
    /// Users that are active and have portfolio routing enabled, in storage order
    async fn list_active_portfolio_users(&self) -> RoutingResult<Vec<String>>;

    /// `Ok(None)` when the user has no portfolio row
    async fn load_portfolio(&self, user_id: &str) -> RoutingResult<Option<Portfolio>>;
}

/// Durable record of routing decisions
#[async_trait]
pub trait RoutingStore: Send + Sync {
    async fn persist_routing_decision(
        &self,
        event_id: &str,
        user_id: &str,
        score: &RelevanceScore,
    ) -> RoutingResult<()>;

    async fn record_routing_summary(&self, decision: &RoutingDecision) -> RoutingResult<()>;

    /// Rows for `user_id` routed since `since` whose level is in `levels`,
    /// ordered by score then recency, both descending.
    async fn user_relevant_events(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
        levels: &[RelevanceLevel],
        limit: i64,
    ) -> RoutingResult<Vec<RoutedEventSummary>>;

    async fn routing_history_stats(
        &self,
        since: DateTime<Utc>,
    ) -> RoutingResult<RoutingHistoryStats>;
}

/// Downstream delivery (the Alert Engine)
#[async_trait]
pub trait AlertForwarder: Send + Sync {
    async fn notify(
        &self,
        event_id: &str,
        user_scores: &HashMap<String, RelevanceScore>,
    ) -> RoutingResult<()>;

    fn name(&self) -> &str;
}
