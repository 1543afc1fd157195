use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::config::Config;
use crate::error::{FeedOperation, Result, TransportError, TransportErrorKind};

/// Raw upstream access. One call per method, no retries; the poller owns retry policy.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Scoreboard listing every tracked game.
    async fn discover(&self) -> std::result::Result<Value, TransportError>;

    /// Box score, drives and win probability for one game.
    async fn detail(&self, game_id: &str) -> std::result::Result<Value, TransportError>;
}

/// ESPN public-API fetcher. Every request is bounded by the client timeout.
pub struct EspnFetcher {
    client: reqwest::Client,
    scoreboard_url: String,
    summary_url: String,
}

impl EspnFetcher {
    pub fn new(cfg: &Config) -> Result<Self> {
        Self::with_urls(&cfg.scoreboard_url, &cfg.summary_url, cfg.request_timeout)
    }

    pub fn with_urls(scoreboard_url: &str, summary_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            scoreboard_url: scoreboard_url.to_string(),
            summary_url: summary_url.to_string(),
        })
    }

    async fn get_json(
        &self,
        request: reqwest::RequestBuilder,
        operation: FeedOperation,
        game_id: Option<&str>,
    ) -> std::result::Result<Value, TransportError> {
        let resp = request
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| TransportError::from_reqwest(operation, game_id, e))?;

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| TransportError::from_reqwest(operation, game_id, e))?;

        serde_json::from_slice(&bytes).map_err(|e| {
            TransportError::new(operation, game_id, TransportErrorKind::Body(e.to_string()))
        })
    }
}

#[async_trait]
impl FeedSource for EspnFetcher {
    async fn discover(&self) -> std::result::Result<Value, TransportError> {
        debug!(url = %self.scoreboard_url, "Fetching scoreboard");
        let request = self.client.get(&self.scoreboard_url);
        self.get_json(request, FeedOperation::Discover, None).await
    }

    async fn detail(&self, game_id: &str) -> std::result::Result<Value, TransportError> {
        debug!(game_id, "Fetching game summary");
        let request = self
            .client
            .get(&self.summary_url)
            .query(&[("event", game_id)]);
        self.get_json(request, FeedOperation::Detail, Some(game_id)).await
    }
}

/// A scoreboard entry whose status is in the live set.
#[derive(Debug, Clone)]
pub struct LiveGame {
    pub game_id: String,
    /// The full scoreboard `events[]` entry, handed to the transformer.
    pub entry: Value,
}

/// Pick the scoreboard entries whose `competitions[0].status.type.name` is live.
/// Entries without an id or a competition are skipped. Upstream order is kept.
pub fn extract_live_games(scoreboard: &Value, live_statuses: &[String]) -> Vec<LiveGame> {
    let Some(events) = scoreboard.get("events").and_then(Value::as_array) else {
        return Vec::new();
    };

    events
        .iter()
        .filter_map(|event| {
            let status_name = event
                .get("competitions")?
                .as_array()?
                .first()?
                .pointer("/status/type/name")?
                .as_str()?;
            if !live_statuses.iter().any(|s| s == status_name) {
                return None;
            }
            let game_id = match event.get("id")? {
                Value::String(s) if !s.is_empty() => s.clone(),
                Value::Number(n) => n.to_string(),
                _ => return None,
            };
            Some(LiveGame {
                game_id,
                entry: event.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LIVE_STATUSES;
    use crate::transformer::fixtures;
    use axum::{extract::Query, http::StatusCode, routing::get, Json, Router};
    use serde_json::json;
    use std::collections::HashMap;

    fn live_statuses() -> Vec<String> {
        LIVE_STATUSES.iter().map(|s| s.to_string()).collect()
    }

    /// Serve a fake ESPN on an ephemeral port; returns the base URL.
    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn fetcher(base: &str, timeout: Duration) -> EspnFetcher {
        EspnFetcher::with_urls(
            &format!("{base}/scoreboard"),
            &format!("{base}/summary"),
            timeout,
        )
        .unwrap()
    }

    #[test]
    fn extracts_only_live_games() {
        let live = extract_live_games(&fixtures::scoreboard(), &live_statuses());
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].game_id, "401547417");
        assert_eq!(live[0].entry["id"], "401547417");
    }

    #[test]
    fn extract_tolerates_odd_entries() {
        let scoreboard = json!({"events": [
            {"id": "1"},
            {"id": "2", "competitions": []},
            {"competitions": [{"status": {"type": {"name": "STATUS_HALFTIME"}}}]},
            {"id": 3, "competitions": [{"status": {"type": {"name": "STATUS_HALFTIME"}}}]}
        ]});
        let live = extract_live_games(&scoreboard, &live_statuses());
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].game_id, "3");

        assert!(extract_live_games(&json!({}), &live_statuses()).is_empty());
        assert!(extract_live_games(&json!({"events": []}), &live_statuses()).is_empty());
    }

    #[tokio::test]
    async fn discover_and_detail_return_documents() {
        let app = Router::new()
            .route("/scoreboard", get(|| async { Json(fixtures::scoreboard()) }))
            .route(
                "/summary",
                get(|Query(q): Query<HashMap<String, String>>| async move {
                    let mut summary = fixtures::summary();
                    summary["requested"] = json!(q.get("event").cloned());
                    Json(summary)
                }),
            );
        let base = serve(app).await;
        let f = fetcher(&base, Duration::from_secs(5));

        let scoreboard = f.discover().await.unwrap();
        assert_eq!(scoreboard["events"].as_array().unwrap().len(), 2);

        let summary = f.detail("401547417").await.unwrap();
        assert_eq!(summary["requested"], "401547417");
        assert!(summary["boxscore"]["teams"].is_array());
    }

    #[tokio::test]
    async fn non_2xx_is_a_status_error() {
        let app = Router::new().route(
            "/summary",
            get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "down") }),
        );
        let base = serve(app).await;
        let err = fetcher(&base, Duration::from_secs(5))
            .detail("42")
            .await
            .unwrap_err();
        assert_eq!(err.operation, FeedOperation::Detail);
        assert_eq!(err.game_id.as_deref(), Some("42"));
        assert!(matches!(err.kind, TransportErrorKind::Status(503)));
    }

    #[tokio::test]
    async fn malformed_body_is_a_body_error() {
        let app = Router::new().route("/scoreboard", get(|| async { "not json" }));
        let base = serve(app).await;
        let err = fetcher(&base, Duration::from_secs(5))
            .discover()
            .await
            .unwrap_err();
        assert_eq!(err.operation, FeedOperation::Discover);
        assert!(err.game_id.is_none());
        assert!(matches!(err.kind, TransportErrorKind::Body(_)));
    }

    #[tokio::test]
    async fn slow_upstream_times_out() {
        let app = Router::new().route(
            "/scoreboard",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                Json(json!({"events": []}))
            }),
        );
        let base = serve(app).await;
        let err = fetcher(&base, Duration::from_millis(100))
            .discover()
            .await
            .unwrap_err();
        assert!(matches!(err.kind, TransportErrorKind::Timeout));
    }
}
