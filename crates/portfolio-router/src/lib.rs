//! Portfolio Router
//!
//! Fans a single market event out to every active user's portfolio,
//! keeps a TTL cache of portfolio snapshots, persists routing decisions
//! and forwards qualifying users to the Alert Engine.

pub mod alerts;
pub mod cache;
pub mod db;
pub mod router;

pub use alerts::{HttpAlertForwarder, LoggingAlertForwarder};
pub use cache::{CacheLookup, Clock, PortfolioCache, SystemClock};
pub use db::SqliteRoutingDb;
pub use router::{PortfolioRouter, RouterConfig, MAX_HOURS_BACK};
