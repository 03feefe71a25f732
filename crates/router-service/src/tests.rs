use crate::{app_router, AppState};
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use portfolio_router::{LoggingAlertForwarder, PortfolioRouter, RouterConfig, SqliteRoutingDb};
use routing_core::{Holding, Portfolio, RelevanceLevel, RiskLevel};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn holding(symbol: &str, market_value: Decimal) -> Holding {
    Holding {
        symbol: symbol.to_string(),
        name: format!("{} Holdings", symbol),
        shares: dec!(10),
        avg_cost: dec!(100),
        market_value,
        sector: None,
        position_pct: dec!(0),
        unrealized_pnl: dec!(0),
    }
}

async fn setup_app() -> Router {
    let db = Arc::new(SqliteRoutingDb::new("sqlite::memory:").await.unwrap());
    let seeds = [
        ("u_high", "TSLA", dec!(20000)),
        ("u_other", "AAPL", dec!(30000)),
    ];
    for (user_id, symbol, value) in seeds {
        db.upsert_user(user_id, true, true).await.unwrap();
        db.save_portfolio(&Portfolio {
            user_id: user_id.to_string(),
            total_value: dec!(100000),
            cash_balance: dec!(0),
            risk_level: RiskLevel::Medium,
            holdings: vec![holding(symbol, value)],
            last_updated: Utc::now(),
        })
        .await
        .unwrap();
    }

    let router = PortfolioRouter::new(
        db.clone(),
        db,
        Arc::new(LoggingAlertForwarder),
        RouterConfig::default(),
    );

    app_router(AppState {
        router: Arc::new(router),
        default_min_relevance: RelevanceLevel::Low,
    })
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn tesla_event(event_id: &str) -> Value {
    json!({
        "event_id": event_id,
        "text": "Tesla beats earnings expectations",
        "entities": ["TSLA"],
        "sentiment": { "overall": { "score": 0.8, "confidence": 0.9 } }
    })
}

#[tokio::test]
async fn test_health() {
    let app = setup_app().await;
    let (status, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "healthy");
}

#[tokio::test]
async fn test_route_event_endpoint() {
    let app = setup_app().await;
    let mut event = tesla_event("e1");
    event["min_relevance_level"] = json!("high");

    let (status, body) = send(&app, Method::POST, "/api/routing/events", Some(event)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["event_id"], "e1");
    assert_eq!(body["data"]["total_users_matched"], 1);
    assert_eq!(body["data"]["users_by_level"]["high"], json!(["u_high"]));
}

#[tokio::test]
async fn test_route_event_requires_event_id() {
    let app = setup_app().await;
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/routing/events",
        Some(json!({ "event_id": " ", "text": "anything" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("event_id"));
}

#[tokio::test]
async fn test_batch_endpoint_preserves_order() {
    let app = setup_app().await;
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/routing/events/batch",
        Some(json!({
            "events": [tesla_event("b1"), { "event_id": "b2", "text": "Quiet day" }],
            "min_relevance_level": "medium"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let decisions = body["data"].as_array().unwrap();
    assert_eq!(decisions.len(), 2);
    assert_eq!(decisions[0]["event_id"], "b1");
    assert_eq!(decisions[0]["total_users_matched"], 1);
    assert_eq!(decisions[1]["event_id"], "b2");
    assert_eq!(decisions[1]["total_users_matched"], 0);
}

#[tokio::test]
async fn test_user_events_feed() {
    let app = setup_app().await;
    send(&app, Method::POST, "/api/routing/events", Some(tesla_event("e1"))).await;

    let (status, body) = send(
        &app,
        Method::GET,
        "/api/routing/users/u_high/events?hours_back=1&min_level=medium",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let events = body["data"].as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["event_id"], "e1");
    assert_eq!(events[0]["relevance_level"], "high");

    let (_, body) = send(&app, Method::GET, "/api/routing/users/u_other/events", None).await;
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_user_events_bad_params() {
    let app = setup_app().await;
    let (status, _) = send(
        &app,
        Method::GET,
        "/api/routing/users/u_high/events?min_level=urgent",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        Method::GET,
        "/api/routing/users/u_high/events?hours_back=0",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_oversized_window_is_bad_request() {
    let app = setup_app().await;
    let (status, body) = send(
        &app,
        Method::GET,
        "/api/routing/users/u_high/events?hours_back=3000000000",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, _) = send(
        &app,
        Method::GET,
        "/api/routing/analytics?hours_back=9223372036854775807",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_analytics_endpoint() {
    let app = setup_app().await;
    send(&app, Method::POST, "/api/routing/events", Some(tesla_event("e1"))).await;

    let (status, body) = send(&app, Method::GET, "/api/routing/analytics?hours_back=2", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["hours_back"], 2);
    assert_eq!(body["data"]["history"]["events_routed"], 1);
    assert_eq!(body["data"]["routing_stats"]["total_events_processed"], 1);
}

#[tokio::test]
async fn test_cache_admin_endpoints() {
    let app = setup_app().await;
    send(&app, Method::POST, "/api/routing/events", Some(tesla_event("e1"))).await;

    let (_, body) = send(&app, Method::GET, "/api/routing/cache/stats", None).await;
    assert_eq!(body["data"]["cached_portfolios"], 2);

    let (status, body) = send(&app, Method::DELETE, "/api/routing/cache/u_high", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["cleared"], 1);

    let (status, _) = send(&app, Method::DELETE, "/api/routing/cache/u_high", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = send(&app, Method::POST, "/api/portfolios/u_other/updated", None).await;
    assert_eq!(body["data"]["invalidated"], true);

    let (status, body) = send(&app, Method::DELETE, "/api/routing/cache", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["cleared"], 0);
}
