use async_trait::async_trait;
use chrono::{DateTime, Utc};
use routing_core::{AlertForwarder, RelevanceScore, RoutingError, RoutingResult};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Serialize)]
struct RouteAlertRequest<'a> {
    event_id: &'a str,
    user_scores: &'a HashMap<String, RelevanceScore>,
    sent_at: DateTime<Utc>,
}

/// Forwards routed events to the Alert Engine over HTTP
#[derive(Clone)]
pub struct HttpAlertForwarder {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAlertForwarder {
    pub fn new(base_url: String, timeout: Duration) -> RoutingResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RoutingError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl AlertForwarder for HttpAlertForwarder {
    async fn notify(
        &self,
        event_id: &str,
        user_scores: &HashMap<String, RelevanceScore>,
    ) -> RoutingResult<()> {
        let request = RouteAlertRequest {
            event_id,
            user_scores,
            sent_at: Utc::now(),
        };

        let response = self
            .client
            .post(format!("{}/api/alerts/route", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| RoutingError::AlertDelivery(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RoutingError::AlertDelivery(format!(
                "Status: {}",
                response.status()
            )));
        }

        tracing::debug!(
            "Forwarded event {} to alert engine for {} users",
            event_id,
            user_scores.len()
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "alert-engine-http"
    }
}

/// Used when no Alert Engine is configured: logs what would have been sent
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingAlertForwarder;

#[async_trait]
impl AlertForwarder for LoggingAlertForwarder {
    async fn notify(
        &self,
        event_id: &str,
        user_scores: &HashMap<String, RelevanceScore>,
    ) -> RoutingResult<()> {
        for (user_id, score) in user_scores {
            tracing::info!(
                "[alert] event {} -> user {} ({}, {:.2})",
                event_id,
                user_id,
                score.level,
                score.overall_score
            );
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "log-only"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let forwarder =
            HttpAlertForwarder::new("http://alerts.local:8080/".to_string(), Duration::from_secs(5))
                .unwrap();
        assert_eq!(forwarder.base_url(), "http://alerts.local:8080");
        assert_eq!(forwarder.name(), "alert-engine-http");
    }

    #[tokio::test]
    async fn test_unreachable_alert_engine_is_delivery_error() {
        let forwarder =
            HttpAlertForwarder::new("http://127.0.0.1:1".to_string(), Duration::from_millis(200))
                .unwrap();
        let err = forwarder
            .notify("evt-1", &HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RoutingError::AlertDelivery(_)));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_logging_forwarder_accepts_everything() {
        assert!(LoggingAlertForwarder
            .notify("evt-1", &HashMap::new())
            .await
            .is_ok());
    }
}
