use axum::{
    extract::{Path, Query, State},
    routing::{delete, get, post},
    Json, Router,
};
use routing_core::{
    CacheStats, Event, RelevanceLevel, RoutedEventSummary, RoutingAnalytics, RoutingDecision,
};
use serde::Deserialize;

use crate::{ApiResponse, AppError, AppState};

#[derive(Deserialize)]
pub struct RouteEventRequest {
    #[serde(flatten)]
    pub event: Event,
    pub min_relevance_level: Option<RelevanceLevel>,
}

#[derive(Deserialize)]
pub struct RouteBatchRequest {
    pub events: Vec<Event>,
    pub min_relevance_level: Option<RelevanceLevel>,
}

#[derive(Deserialize)]
pub struct UserEventsQuery {
    pub hours_back: Option<i64>,
    pub min_level: Option<String>,
}

#[derive(Deserialize)]
pub struct AnalyticsQuery {
    pub hours_back: Option<i64>,
}

pub fn routing_routes() -> Router<AppState> {
    Router::new()
        // Routing
        .route("/api/routing/events", post(route_event))
        .route("/api/routing/events/batch", post(route_batch))
        .route("/api/routing/users/:user_id/events", get(get_user_events))
        .route("/api/routing/analytics", get(get_analytics))
        // Cache administration
        .route("/api/routing/cache/stats", get(get_cache_stats))
        .route("/api/routing/cache", delete(clear_cache))
        .route("/api/routing/cache/:user_id", delete(clear_user_cache))
        .route("/api/portfolios/:user_id/updated", post(portfolio_updated))
}

fn parse_level(raw: Option<&str>, default: RelevanceLevel) -> Result<RelevanceLevel, AppError> {
    match raw {
        None => Ok(default),
        Some(raw) => RelevanceLevel::parse(raw)
            .ok_or_else(|| AppError::bad_request(format!("Unknown relevance level: {}", raw))),
    }
}

async fn route_event(
    State(state): State<AppState>,
    Json(req): Json<RouteEventRequest>,
) -> Result<Json<ApiResponse<RoutingDecision>>, AppError> {
    if req.event.event_id.trim().is_empty() {
        return Err(AppError::bad_request("event_id is required"));
    }

    let min_level = req
        .min_relevance_level
        .unwrap_or(state.default_min_relevance);
    let decision = state.router.route_event(&req.event, min_level).await?;

    Ok(Json(ApiResponse::success(decision)))
}

async fn route_batch(
    State(state): State<AppState>,
    Json(req): Json<RouteBatchRequest>,
) -> Result<Json<ApiResponse<Vec<RoutingDecision>>>, AppError> {
    if req.events.iter().any(|e| e.event_id.trim().is_empty()) {
        return Err(AppError::bad_request("every event needs an event_id"));
    }

    let min_level = req
        .min_relevance_level
        .unwrap_or(state.default_min_relevance);
    let decisions = state
        .router
        .route_batch_events(req.events, min_level)
        .await?;

    Ok(Json(ApiResponse::success(decisions)))
}

async fn get_user_events(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<UserEventsQuery>,
) -> Result<Json<ApiResponse<Vec<RoutedEventSummary>>>, AppError> {
    let min_level = parse_level(query.min_level.as_deref(), RelevanceLevel::Low)?;
    let events = state
        .router
        .get_user_relevant_events(&user_id, query.hours_back.unwrap_or(24), min_level)
        .await?;

    Ok(Json(ApiResponse::success(events)))
}

async fn get_analytics(
    State(state): State<AppState>,
    Query(query): Query<AnalyticsQuery>,
) -> Result<Json<ApiResponse<RoutingAnalytics>>, AppError> {
    let analytics = state
        .router
        .get_routing_analytics(query.hours_back.unwrap_or(24))
        .await?;

    Ok(Json(ApiResponse::success(analytics)))
}

async fn get_cache_stats(State(state): State<AppState>) -> Json<ApiResponse<CacheStats>> {
    Json(ApiResponse::success(state.router.cache_stats()))
}

async fn clear_cache(State(state): State<AppState>) -> Json<ApiResponse<serde_json::Value>> {
    let cleared = state.router.clear_cache(None);
    Json(ApiResponse::success(serde_json::json!({ "cleared": cleared })))
}

async fn clear_user_cache(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let cleared = state.router.clear_cache(Some(&user_id));
    if cleared == 0 {
        return Err(AppError::not_found(format!(
            "No cached portfolio for user {}",
            user_id
        )));
    }

    Ok(Json(ApiResponse::success(
        serde_json::json!({ "user_id": user_id, "cleared": cleared }),
    )))
}

async fn portfolio_updated(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Json<ApiResponse<serde_json::Value>> {
    let invalidated = state.router.invalidate_portfolio(&user_id);
    tracing::info!(user_id = %user_id, invalidated, "Portfolio update received");

    Json(ApiResponse::success(
        serde_json::json!({ "user_id": user_id, "invalidated": invalidated }),
    ))
}
