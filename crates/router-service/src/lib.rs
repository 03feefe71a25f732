//! HTTP host for the portfolio router.

pub mod config;
pub mod routes;
#[cfg(test)]
mod tests;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use portfolio_router::{
    HttpAlertForwarder, LoggingAlertForwarder, PortfolioRouter, RouterConfig, SqliteRoutingDb,
};
use routing_core::{AlertForwarder, RelevanceLevel, RoutingError};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use config::ServiceConfig;

#[derive(Clone)]
pub struct AppState {
    pub router: Arc<PortfolioRouter>,
    pub default_min_relevance: RelevanceLevel,
}

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl From<RoutingError> for AppError {
    fn from(err: RoutingError) -> Self {
        let status = match &err {
            RoutingError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!("Request failed: {}", self.message);
        }
        (self.status, Json(ApiResponse::<()>::error(self.message))).into_response()
    }
}

/// Wire the store, alert forwarder and router from configuration
pub async fn build_state(config: &ServiceConfig) -> anyhow::Result<AppState> {
    let db = Arc::new(SqliteRoutingDb::new(&config.database_url).await?);

    let alerts: Arc<dyn AlertForwarder> = match &config.alert_engine_url {
        Some(url) => Arc::new(HttpAlertForwarder::new(
            url.clone(),
            Duration::from_secs(config.alert_engine_timeout_secs),
        )?),
        None => {
            tracing::warn!("ALERT_ENGINE_URL not set, routed alerts will only be logged");
            Arc::new(LoggingAlertForwarder)
        }
    };
    tracing::info!("Alert forwarder: {}", alerts.name());

    let router = PortfolioRouter::new(
        db.clone(),
        db,
        alerts,
        RouterConfig {
            cache_ttl_minutes: config.portfolio_cache_ttl_minutes,
            user_events_limit: config.user_events_limit,
        },
    );

    Ok(AppState {
        router: Arc::new(router),
        default_min_relevance: config.default_min_relevance,
    })
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .merge(routes::routing_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_check() -> Json<ApiResponse<serde_json::Value>> {
    Json(ApiResponse::success(serde_json::json!({
        "status": "healthy",
        "service": "router-service",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })))
}

pub async fn run_server(config: ServiceConfig) -> anyhow::Result<()> {
    let state = build_state(&config).await?;
    let app = app_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!("Router service listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Router service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
