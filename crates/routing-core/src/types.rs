use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Sentiment reading: score in [-1, 1], confidence in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SentimentReading {
    pub score: f64,
    pub confidence: f64,
}

/// Sentiment attached to one extracted entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySentiment {
    pub entity: String,
    pub sentiment: SentimentReading,
}

/// Structured sentiment produced upstream for an event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSentiment {
    pub overall: SentimentReading,
    #[serde(default)]
    pub entities: Vec<EntitySentiment>,
}

/// Free-form event metadata. `sectors` is the only key the scorer reads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    #[serde(default)]
    pub sectors: Vec<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A news/market text item to be matched against portfolios
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_id: String,
    pub text: String,
    #[serde(default)]
    pub entities: Vec<String>,
    #[serde(default)]
    pub sentiment: Option<EventSentiment>,
    #[serde(default)]
    pub metadata: EventMetadata,
}

impl Event {
    pub fn new(event_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            event_id: event_id.into(),
            text: text.into(),
            entities: Vec::new(),
            sentiment: None,
            metadata: EventMetadata::default(),
        }
    }

    pub fn with_entities<I, S>(mut self, entities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entities = entities.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_sentiment(mut self, sentiment: EventSentiment) -> Self {
        self.sentiment = Some(sentiment);
        self
    }

    pub fn with_sector_hints<I, S>(mut self, sectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metadata.sectors = sectors.into_iter().map(Into::into).collect();
        self
    }
}

/// Fixed sector vocabulary used for holdings and sector detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sector {
    Technology,
    Healthcare,
    Financials,
    Energy,
    ConsumerDiscretionary,
    ConsumerStaples,
    Industrials,
    Materials,
    Utilities,
    RealEstate,
}

impl Sector {
    pub const ALL: [Sector; 10] = [
        Sector::Technology,
        Sector::Healthcare,
        Sector::Financials,
        Sector::Energy,
        Sector::ConsumerDiscretionary,
        Sector::ConsumerStaples,
        Sector::Industrials,
        Sector::Materials,
        Sector::Utilities,
        Sector::RealEstate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Sector::Technology => "technology",
            Sector::Healthcare => "healthcare",
            Sector::Financials => "financials",
            Sector::Energy => "energy",
            Sector::ConsumerDiscretionary => "consumer_discretionary",
            Sector::ConsumerStaples => "consumer_staples",
            Sector::Industrials => "industrials",
            Sector::Materials => "materials",
            Sector::Utilities => "utilities",
            Sector::RealEstate => "real_estate",
        }
    }

    /// Lenient parse: case-insensitive, accepts spaces or dashes for underscores.
    /// Unknown names yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        let normalized = s.trim().to_lowercase().replace([' ', '-'], "_");
        Sector::ALL
            .into_iter()
            .find(|sector| sector.as_str() == normalized)
    }
}

impl fmt::Display for Sector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "low" => RiskLevel::Low,
            "high" => RiskLevel::High,
            _ => RiskLevel::Medium,
        }
    }
}

/// One position within a portfolio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub symbol: String,
    pub name: String,
    pub shares: Decimal,
    pub avg_cost: Decimal,
    pub market_value: Decimal,
    #[serde(default)]
    pub sector: Option<Sector>,
    pub position_pct: Decimal,
    pub unrealized_pnl: Decimal,
}

impl Holding {
    /// Market value as f64 for scoring math
    pub fn market_value_f64(&self) -> f64 {
        self.market_value.to_f64().unwrap_or(0.0)
    }
}

/// Snapshot of a user's portfolio. Never mutated once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub user_id: String,
    pub total_value: Decimal,
    pub cash_balance: Decimal,
    #[serde(default)]
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub holdings: Vec<Holding>,
    pub last_updated: DateTime<Utc>,
}

impl Portfolio {
    /// Total value floored at 1 so weighting never divides by zero
    pub fn weighting_base(&self) -> f64 {
        self.total_value.to_f64().unwrap_or(0.0).max(1.0)
    }

    /// Share of portfolio value held in `holding`
    pub fn weight_of(&self, holding: &Holding) -> f64 {
        holding.market_value_f64() / self.weighting_base()
    }

    /// Case-insensitive lookup by ticker
    pub fn holding(&self, symbol: &str) -> Option<&Holding> {
        self.holdings
            .iter()
            .find(|h| h.symbol.eq_ignore_ascii_case(symbol))
    }
}

/// Relevance level, ordered from least to most relevant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelevanceLevel {
    Irrelevant,
    Low,
    Medium,
    High,
    Critical,
}

impl RelevanceLevel {
    pub const ALL: [RelevanceLevel; 5] = [
        RelevanceLevel::Irrelevant,
        RelevanceLevel::Low,
        RelevanceLevel::Medium,
        RelevanceLevel::High,
        RelevanceLevel::Critical,
    ];

    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            RelevanceLevel::Critical
        } else if score >= 0.6 {
            RelevanceLevel::High
        } else if score >= 0.4 {
            RelevanceLevel::Medium
        } else if score >= 0.2 {
            RelevanceLevel::Low
        } else {
            RelevanceLevel::Irrelevant
        }
    }

    /// Lower score boundary of this level
    pub fn threshold(&self) -> f64 {
        match self {
            RelevanceLevel::Critical => 0.8,
            RelevanceLevel::High => 0.6,
            RelevanceLevel::Medium => 0.4,
            RelevanceLevel::Low => 0.2,
            RelevanceLevel::Irrelevant => 0.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RelevanceLevel::Irrelevant => "irrelevant",
            RelevanceLevel::Low => "low",
            RelevanceLevel::Medium => "medium",
            RelevanceLevel::High => "high",
            RelevanceLevel::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_lowercase();
        RelevanceLevel::ALL.into_iter().find(|l| l.as_str() == s)
    }

    /// Levels ordinally at or above `self`
    pub fn at_or_above(&self) -> Vec<RelevanceLevel> {
        RelevanceLevel::ALL
            .into_iter()
            .filter(|l| l >= self)
            .collect()
    }
}

impl fmt::Display for RelevanceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of scoring one event against one portfolio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelevanceScore {
    #[serde(rename = "relevance_score")]
    pub overall_score: f64,
    #[serde(rename = "relevance_level")]
    pub level: RelevanceLevel,
    pub entity_match_score: f64,
    pub sector_correlation_score: f64,
    pub sentiment_impact_score: f64,
    pub position_weight_score: f64,
    pub matched_entities: Vec<String>,
    pub affected_positions: Vec<String>,
    pub reasoning: String,
    /// How much evidence backed the score, independent of `overall_score`
    pub confidence: f64,
}

/// Per-event routing aggregate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub event_id: String,
    pub total_users_matched: usize,
    pub users_by_level: BTreeMap<RelevanceLevel, Vec<String>>,
    pub processing_time_ms: f64,
    pub timestamp: DateTime<Utc>,
    /// Per-user problems hit while routing (skipped loads, failed writes)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl RoutingDecision {
    pub fn empty(event_id: impl Into<String>, processing_time_ms: f64) -> Self {
        Self {
            event_id: event_id.into(),
            total_users_matched: 0,
            users_by_level: BTreeMap::new(),
            processing_time_ms,
            timestamp: Utc::now(),
            errors: Vec::new(),
        }
    }

    pub fn users_at(&self, level: RelevanceLevel) -> &[String] {
        self.users_by_level
            .get(&level)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// A persisted routing row, as returned to a user's event feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutedEventSummary {
    pub event_id: String,
    pub user_id: String,
    pub relevance_score: f64,
    pub relevance_level: RelevanceLevel,
    pub entity_match_score: f64,
    pub sector_correlation_score: f64,
    pub sentiment_impact_score: f64,
    pub position_weight_score: f64,
    pub matched_entities: Vec<String>,
    pub affected_positions: Vec<String>,
    pub reasoning: String,
    pub confidence: f64,
    pub routed_at: DateTime<Utc>,
}

/// Aggregates over persisted routing history within a time window
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingHistoryStats {
    pub events_routed: u64,
    pub total_user_matches: u64,
    pub level_distribution: BTreeMap<RelevanceLevel, u64>,
    pub avg_processing_time_ms: f64,
    pub min_processing_time_ms: f64,
    pub max_processing_time_ms: f64,
}

/// Running counters kept by the router
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingStats {
    pub total_events_processed: u64,
    pub total_users_notified: u64,
    pub avg_processing_time_ms: f64,
    pub cache_hit_rate: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub cached_portfolios: usize,
    pub fresh_entries: usize,
    pub expired_entries: usize,
    pub ttl_minutes: i64,
    pub total_hits: u64,
    pub total_misses: u64,
    pub hit_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingAnalytics {
    pub hours_back: i64,
    pub history: RoutingHistoryStats,
    pub routing_stats: RoutingStats,
    pub cache_stats: CacheStats,
    pub generated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_level_boundaries() {
        assert_eq!(RelevanceLevel::from_score(0.8), RelevanceLevel::Critical);
        assert_eq!(RelevanceLevel::from_score(0.79999), RelevanceLevel::High);
        assert_eq!(RelevanceLevel::from_score(0.6), RelevanceLevel::High);
        assert_eq!(RelevanceLevel::from_score(0.59999), RelevanceLevel::Medium);
        assert_eq!(RelevanceLevel::from_score(0.4), RelevanceLevel::Medium);
        assert_eq!(RelevanceLevel::from_score(0.39999), RelevanceLevel::Low);
        assert_eq!(RelevanceLevel::from_score(0.2), RelevanceLevel::Low);
        assert_eq!(RelevanceLevel::from_score(0.19999), RelevanceLevel::Irrelevant);
        assert_eq!(RelevanceLevel::from_score(0.0), RelevanceLevel::Irrelevant);
    }

    #[test]
    fn test_level_ordering() {
        assert!(RelevanceLevel::Irrelevant < RelevanceLevel::Low);
        assert!(RelevanceLevel::Low < RelevanceLevel::Medium);
        assert!(RelevanceLevel::Medium < RelevanceLevel::High);
        assert!(RelevanceLevel::High < RelevanceLevel::Critical);
        assert_eq!(
            RelevanceLevel::High.at_or_above(),
            vec![RelevanceLevel::High, RelevanceLevel::Critical]
        );
    }

    #[test]
    fn test_level_serde_names() {
        let json = serde_json::to_string(&RelevanceLevel::Critical).unwrap();
        assert_eq!(json, "\"critical\"");
        assert_eq!(RelevanceLevel::parse(" Medium "), Some(RelevanceLevel::Medium));
        assert_eq!(RelevanceLevel::parse("urgent"), None);
    }

    #[test]
    fn test_sector_parse() {
        assert_eq!(Sector::parse("Technology"), Some(Sector::Technology));
        assert_eq!(Sector::parse("real estate"), Some(Sector::RealEstate));
        assert_eq!(Sector::parse("consumer-staples"), Some(Sector::ConsumerStaples));
        assert_eq!(Sector::parse("crypto"), None);
    }

    #[test]
    fn test_weighting_base_floor() {
        let portfolio = Portfolio {
            user_id: "u1".to_string(),
            total_value: dec!(0),
            cash_balance: dec!(0),
            risk_level: RiskLevel::Low,
            holdings: vec![],
            last_updated: Utc::now(),
        };
        assert_eq!(portfolio.weighting_base(), 1.0);
    }

    #[test]
    fn test_score_json_field_names() {
        let score = RelevanceScore {
            overall_score: 0.5,
            level: RelevanceLevel::Medium,
            entity_match_score: 0.5,
            sector_correlation_score: 0.0,
            sentiment_impact_score: 0.0,
            position_weight_score: 0.0,
            matched_entities: vec!["AAPL".to_string()],
            affected_positions: vec!["AAPL".to_string()],
            reasoning: String::new(),
            confidence: 0.7,
        };
        let value = serde_json::to_value(&score).unwrap();
        assert_eq!(value["relevance_score"], 0.5);
        assert_eq!(value["relevance_level"], "medium");
    }

    #[test]
    fn test_decision_users_by_level_keys() {
        let mut decision = RoutingDecision::empty("evt-1", 1.0);
        decision
            .users_by_level
            .insert(RelevanceLevel::High, vec!["u1".to_string()]);
        let value = serde_json::to_value(&decision).unwrap();
        assert_eq!(value["users_by_level"]["high"][0], "u1");
        assert!(value.get("errors").is_none());
        assert!(decision.users_at(RelevanceLevel::Low).is_empty());
    }
}
