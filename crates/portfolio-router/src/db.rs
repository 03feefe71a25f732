use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use routing_core::{
    Holding, Portfolio, PortfolioLoader, RelevanceLevel, RelevanceScore, RiskLevel,
    RoutedEventSummary, RoutingDecision, RoutingError, RoutingHistoryStats, RoutingResult,
    RoutingStore, Sector,
};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite};
use std::collections::BTreeMap;
use std::str::FromStr;

fn storage_err(e: impl std::fmt::Display) -> RoutingError {
    RoutingError::Storage(e.to_string())
}

/// Fixed-width UTC timestamps so lexical order is chronological
fn to_db_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn from_db_timestamp(s: &str) -> RoutingResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| storage_err(format!("bad timestamp '{}': {}", s, e)))
}

fn to_decimal(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or_default()
}

fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

#[derive(sqlx::FromRow)]
struct PortfolioRow {
    user_id: String,
    total_value: f64,
    cash_balance: f64,
    risk_level: String,
    last_updated: String,
}

#[derive(sqlx::FromRow)]
struct HoldingRow {
    symbol: String,
    name: String,
    shares: f64,
    avg_cost: f64,
    market_value: f64,
    sector: Option<String>,
    position_pct: f64,
    unrealized_pnl: f64,
}

impl From<HoldingRow> for Holding {
    fn from(row: HoldingRow) -> Self {
        Holding {
            symbol: row.symbol.to_uppercase(),
            name: row.name,
            shares: to_decimal(row.shares),
            avg_cost: to_decimal(row.avg_cost),
            market_value: to_decimal(row.market_value),
            sector: row.sector.as_deref().and_then(Sector::parse),
            position_pct: to_decimal(row.position_pct),
            unrealized_pnl: to_decimal(row.unrealized_pnl),
        }
    }
}

#[derive(sqlx::FromRow)]
struct EventRoutingRow {
    event_id: String,
    user_id: String,
    relevance_score: f64,
    relevance_level: String,
    entity_match_score: f64,
    sector_correlation_score: f64,
    sentiment_impact_score: f64,
    position_weight_score: f64,
    matched_entities: String,
    affected_positions: String,
    reasoning: String,
    confidence: f64,
    routed_at: String,
}

impl EventRoutingRow {
    fn into_summary(self) -> RoutingResult<RoutedEventSummary> {
        Ok(RoutedEventSummary {
            relevance_level: RelevanceLevel::parse(&self.relevance_level)
                .unwrap_or(RelevanceLevel::Irrelevant),
            matched_entities: serde_json::from_str(&self.matched_entities).unwrap_or_default(),
            affected_positions: serde_json::from_str(&self.affected_positions)
                .unwrap_or_default(),
            routed_at: from_db_timestamp(&self.routed_at)?,
            event_id: self.event_id,
            user_id: self.user_id,
            relevance_score: self.relevance_score,
            entity_match_score: self.entity_match_score,
            sector_correlation_score: self.sector_correlation_score,
            sentiment_impact_score: self.sentiment_impact_score,
            position_weight_score: self.position_weight_score,
            reasoning: self.reasoning,
            confidence: self.confidence,
        })
    }
}

/// SQLite-backed portfolio source and routing audit log
#[derive(Clone)]
pub struct SqliteRoutingDb {
    pool: SqlitePool,
}

impl SqliteRoutingDb {
    /// Create a new database connection and apply the schema
    pub async fn new(database_url: &str) -> RoutingResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(storage_err)?
            .create_if_missing(true);

        // Every connection to an in-memory database is a separate database
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(storage_err)?;

        let db = Self { pool };
        db.init_schema().await?;

        Ok(db)
    }

    async fn init_schema(&self) -> RoutingResult<()> {
        let schema = include_str!("../schema.sql");

        // sqlx runs one statement per query
        for statement in schema.split(';') {
            let stmt = statement.trim();
            if !stmt.is_empty() {
                sqlx::query(stmt)
                    .execute(&self.pool)
                    .await
                    .map_err(storage_err)?;
            }
        }

        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn upsert_user(
        &self,
        user_id: &str,
        is_active: bool,
        portfolio_enabled: bool,
    ) -> RoutingResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (user_id, is_active, portfolio_enabled)
            VALUES (?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                is_active = excluded.is_active,
                portfolio_enabled = excluded.portfolio_enabled
            "#,
        )
        .bind(user_id)
        .bind(is_active)
        .bind(portfolio_enabled)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(())
    }

    /// Replace a user's portfolio summary and holdings in one transaction
    pub async fn save_portfolio(&self, portfolio: &Portfolio) -> RoutingResult<()> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        sqlx::query(
            r#"
            INSERT INTO portfolios (user_id, total_value, cash_balance, risk_level, last_updated)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                total_value = excluded.total_value,
                cash_balance = excluded.cash_balance,
                risk_level = excluded.risk_level,
                last_updated = excluded.last_updated
            "#,
        )
        .bind(&portfolio.user_id)
        .bind(to_f64(portfolio.total_value))
        .bind(to_f64(portfolio.cash_balance))
        .bind(portfolio.risk_level.as_str())
        .bind(to_db_timestamp(portfolio.last_updated))
        .execute(&mut *tx)
        .await
        .map_err(storage_err)?;

        sqlx::query("DELETE FROM holdings WHERE user_id = ?")
            .bind(&portfolio.user_id)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;

        for holding in &portfolio.holdings {
            sqlx::query(
                r#"
                INSERT INTO holdings
                (user_id, symbol, name, shares, avg_cost, market_value, sector, position_pct, unrealized_pnl)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&portfolio.user_id)
            .bind(holding.symbol.to_uppercase())
            .bind(&holding.name)
            .bind(to_f64(holding.shares))
            .bind(to_f64(holding.avg_cost))
            .bind(to_f64(holding.market_value))
            .bind(holding.sector.map(|s| s.as_str()))
            .bind(to_f64(holding.position_pct))
            .bind(to_f64(holding.unrealized_pnl))
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;
        }

        tx.commit().await.map_err(storage_err)?;
        Ok(())
    }
}

#[async_trait]
impl PortfolioLoader for SqliteRoutingDb {
    async fn list_active_portfolio_users(&self) -> RoutingResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT user_id FROM users WHERE is_active = 1 AND portfolio_enabled = 1 ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(rows.into_iter().map(|(user_id,)| user_id).collect())
    }

    async fn load_portfolio(&self, user_id: &str) -> RoutingResult<Option<Portfolio>> {
        let row = sqlx::query_as::<_, PortfolioRow>(
            r#"
            SELECT user_id, total_value, cash_balance, risk_level, last_updated
            FROM portfolios
            WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let holdings = sqlx::query_as::<_, HoldingRow>(
            r#"
            SELECT symbol, name, shares, avg_cost, market_value, sector, position_pct, unrealized_pnl
            FROM holdings
            WHERE user_id = ? AND shares > 0
            ORDER BY market_value DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(Some(Portfolio {
            user_id: row.user_id,
            total_value: to_decimal(row.total_value),
            cash_balance: to_decimal(row.cash_balance),
            risk_level: RiskLevel::from_str(&row.risk_level),
            holdings: holdings.into_iter().map(Holding::from).collect(),
            last_updated: from_db_timestamp(&row.last_updated)?,
        }))
    }
}

#[async_trait]
impl RoutingStore for SqliteRoutingDb {
    async fn persist_routing_decision(
        &self,
        event_id: &str,
        user_id: &str,
        score: &RelevanceScore,
    ) -> RoutingResult<()> {
        let matched = serde_json::to_string(&score.matched_entities).map_err(storage_err)?;
        let affected = serde_json::to_string(&score.affected_positions).map_err(storage_err)?;

        sqlx::query(
            r#"
            INSERT INTO event_routing
            (event_id, user_id, relevance_score, relevance_level, entity_match_score,
             sector_correlation_score, sentiment_impact_score, position_weight_score,
             matched_entities, affected_positions, reasoning, confidence, routed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(event_id, user_id) DO UPDATE SET
                relevance_score = excluded.relevance_score,
                relevance_level = excluded.relevance_level,
                entity_match_score = excluded.entity_match_score,
                sector_correlation_score = excluded.sector_correlation_score,
                sentiment_impact_score = excluded.sentiment_impact_score,
                position_weight_score = excluded.position_weight_score,
                matched_entities = excluded.matched_entities,
                affected_positions = excluded.affected_positions,
                reasoning = excluded.reasoning,
                confidence = excluded.confidence,
                routed_at = excluded.routed_at
            "#,
        )
        .bind(event_id)
        .bind(user_id)
        .bind(score.overall_score)
        .bind(score.level.as_str())
        .bind(score.entity_match_score)
        .bind(score.sector_correlation_score)
        .bind(score.sentiment_impact_score)
        .bind(score.position_weight_score)
        .bind(matched)
        .bind(affected)
        .bind(&score.reasoning)
        .bind(score.confidence)
        .bind(to_db_timestamp(Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(())
    }

    async fn record_routing_summary(&self, decision: &RoutingDecision) -> RoutingResult<()> {
        let users_by_level = serde_json::to_string(&decision.users_by_level).map_err(storage_err)?;

        sqlx::query(
            r#"
            INSERT INTO routing_log
            (event_id, total_users_matched, users_by_level, processing_time_ms, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&decision.event_id)
        .bind(decision.total_users_matched as i64)
        .bind(users_by_level)
        .bind(decision.processing_time_ms)
        .bind(to_db_timestamp(decision.timestamp))
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(())
    }

    async fn user_relevant_events(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
        levels: &[RelevanceLevel],
        limit: i64,
    ) -> RoutingResult<Vec<RoutedEventSummary>> {
        if levels.is_empty() {
            return Ok(Vec::new());
        }

        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
            r#"
            SELECT event_id, user_id, relevance_score, relevance_level, entity_match_score,
                   sector_correlation_score, sentiment_impact_score, position_weight_score,
                   matched_entities, affected_positions, reasoning, confidence, routed_at
            FROM event_routing
            WHERE user_id = "#,
        );
        query.push_bind(user_id);
        query.push(" AND routed_at >= ");
        query.push_bind(to_db_timestamp(since));
        query.push(" AND relevance_level IN (");
        let mut separated = query.separated(", ");
        for level in levels {
            separated.push_bind(level.as_str());
        }
        separated.push_unseparated(")");
        query.push(" ORDER BY relevance_score DESC, routed_at DESC LIMIT ");
        query.push_bind(limit);

        let rows: Vec<EventRoutingRow> = query
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;

        rows.into_iter().map(EventRoutingRow::into_summary).collect()
    }

    async fn routing_history_stats(
        &self,
        since: DateTime<Utc>,
    ) -> RoutingResult<RoutingHistoryStats> {
        let since = to_db_timestamp(since);

        let level_rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT relevance_level, COUNT(*)
            FROM event_routing
            WHERE routed_at >= ?
            GROUP BY relevance_level
            "#,
        )
        .bind(&since)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        let mut level_distribution = BTreeMap::new();
        for (level, count) in level_rows {
            if let Some(level) = RelevanceLevel::parse(&level) {
                level_distribution.insert(level, count.max(0) as u64);
            }
        }

        let (events_routed, total_user_matches, avg, min, max): (
            i64,
            i64,
            Option<f64>,
            Option<f64>,
            Option<f64>,
        ) = sqlx::query_as(
            r#"
            SELECT COUNT(*),
                   COALESCE(SUM(total_users_matched), 0),
                   AVG(processing_time_ms),
                   MIN(processing_time_ms),
                   MAX(processing_time_ms)
            FROM routing_log
            WHERE created_at >= ?
            "#,
        )
        .bind(&since)
        .fetch_one(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(RoutingHistoryStats {
            events_routed: events_routed.max(0) as u64,
            total_user_matches: total_user_matches.max(0) as u64,
            level_distribution,
            avg_processing_time_ms: avg.unwrap_or(0.0),
            min_processing_time_ms: min.unwrap_or(0.0),
            max_processing_time_ms: max.unwrap_or(0.0),
        })
    }
}
