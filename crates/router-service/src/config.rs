use anyhow::{bail, Context, Result};
use routing_core::RelevanceLevel;
use std::env;
use std::net::SocketAddr;

/// Upper bound for the portfolio cache TTL (30 days)
const MAX_CACHE_TTL_MINUTES: i64 = 60 * 24 * 30;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    /// Absent means alerts are only logged
    pub alert_engine_url: Option<String>,
    pub alert_engine_timeout_secs: u64,
    pub portfolio_cache_ttl_minutes: i64,
    pub user_events_limit: i64,
    pub default_min_relevance: RelevanceLevel,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let default_min_relevance = var("DEFAULT_MIN_RELEVANCE", "low");

        let config = Self {
            database_url: var("DATABASE_URL", "sqlite:routing.db"),
            bind_addr: var("BIND_ADDR", "0.0.0.0:3010")
                .parse()
                .context("BIND_ADDR must be a host:port socket address")?,
            alert_engine_url: lookup("ALERT_ENGINE_URL")
                .map(|url| url.trim().to_string())
                .filter(|url| !url.is_empty()),
            alert_engine_timeout_secs: var("ALERT_ENGINE_TIMEOUT_SECS", "5")
                .parse()
                .context("ALERT_ENGINE_TIMEOUT_SECS must be a whole number of seconds")?,
            portfolio_cache_ttl_minutes: var("PORTFOLIO_CACHE_TTL_MINUTES", "30")
                .parse()
                .context("PORTFOLIO_CACHE_TTL_MINUTES must be an integer")?,
            user_events_limit: var("USER_EVENTS_LIMIT", "100")
                .parse()
                .context("USER_EVENTS_LIMIT must be an integer")?,
            default_min_relevance: RelevanceLevel::parse(&default_min_relevance)
                .with_context(|| {
                    format!("Unknown DEFAULT_MIN_RELEVANCE '{}'", default_min_relevance)
                })?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !(1..=MAX_CACHE_TTL_MINUTES).contains(&self.portfolio_cache_ttl_minutes) {
            bail!(
                "PORTFOLIO_CACHE_TTL_MINUTES must be between 1 and {}",
                MAX_CACHE_TTL_MINUTES
            );
        }
        if self.user_events_limit <= 0 {
            bail!("USER_EVENTS_LIMIT must be positive");
        }
        if self.alert_engine_timeout_secs == 0 {
            bail!("ALERT_ENGINE_TIMEOUT_SECS must be positive");
        }
        Ok(())
    }
}
