//! Dashboard polling endpoints.
//!
//! Each endpoint runs the cache's refresh policy for its dataset kind and
//! serves the current snapshot. Refresh failures are handled inside the
//! cache (stale data, retry chains); these handlers always answer 200 with
//! whatever is cached, so the dashboard never sees an upstream error.

use axum::{extract::State, routing::get, Json, Router};

use dashboard_core::{MetricRecord, QuoteRecord, RecommendationRecord};

use crate::AppState;

pub fn market_routes() -> Router<AppState> {
    Router::new()
        .route("/api/quote", get(get_quotes))
        .route("/api/metrics", get(get_metrics))
        .route("/api/recommendations", get(get_recommendations))
}

async fn get_quotes(State(state): State<AppState>) -> Json<Vec<QuoteRecord>> {
    state.cache.refresh_quotes_if_needed().await;
    Json(state.cache.quotes())
}

async fn get_metrics(State(state): State<AppState>) -> Json<Vec<MetricRecord>> {
    state.cache.refresh_metrics_if_needed().await;
    Json(state.cache.metrics())
}

async fn get_recommendations(State(state): State<AppState>) -> Json<Vec<RecommendationRecord>> {
    state.cache.refresh_recommendations_if_needed().await;
    Json(state.cache.recommendations())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
        Router,
    };
    use chrono::NaiveTime;
    use tower::ServiceExt;

    use dashboard_core::{
        DashboardError, ExchangeCalendar, MarketDataProvider, MetricRecord, QuoteRecord,
        RecommendationRecord,
    };
    use quote_cache::{MarketConfig, QuoteCache};

    use crate::auth::{SessionStore, UserStore};
    use crate::config::ServerConfig;
    use crate::{build_router, AppState};

    /// Provider that always fails; the facade must still answer 200.
    struct DownProvider;

    #[async_trait]
    impl MarketDataProvider for DownProvider {
        async fn fetch_quote(&self, _symbol: &str) -> Result<QuoteRecord, DashboardError> {
            Err(DashboardError::Upstream("down".to_string()))
        }

        async fn fetch_metrics(&self, _symbol: &str) -> Result<MetricRecord, DashboardError> {
            Err(DashboardError::Upstream("down".to_string()))
        }

        async fn fetch_recommendation(
            &self,
            _symbol: &str,
        ) -> Result<RecommendationRecord, DashboardError> {
            Err(DashboardError::Upstream("down".to_string()))
        }
    }

    fn test_app() -> (Router, AppState) {
        let midnight = NaiveTime::from_hms_opt(0, 0, 0).unwrap();
        let calendar = ExchangeCalendar::new(chrono_tz::UTC, midnight, midnight);

        let config = ServerConfig {
            finnhub_token: "test".to_string(),
            port: 0,
            symbols: vec!["AAPL".to_string(), "MSFT".to_string()],
            calendar: calendar.clone(),
            quote_fetch_delay: Duration::ZERO,
            retry_delay: Duration::from_secs(600),
            users_file: std::env::temp_dir().join("dashboard-router-test-users.json"),
            public_dir: PathBuf::from("public"),
        };

        let cache = Arc::new(QuoteCache::new(
            MarketConfig {
                market: "TEST".to_string(),
                symbols: config.symbols.clone(),
                calendar,
                quote_fetch_delay: config.quote_fetch_delay,
                retry_delay: config.retry_delay,
            },
            Arc::new(DownProvider),
        ));

        let state = AppState {
            cache,
            sessions: Arc::new(SessionStore::default()),
            users: Arc::new(UserStore::new(config.users_file.clone())),
            http: reqwest::Client::new(),
        };

        (build_router(state.clone(), &config), state)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_quote_endpoint_serves_placeholders_when_upstream_is_down() {
        let (app, _state) = test_app();
        let (status, body) = get_json(app, "/api/quote").await;

        assert_eq!(status, StatusCode::OK);
        let rows = body.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["symbol"], "AAPL");
        assert_eq!(rows[0]["lastPrice"], 0.0);
    }

    #[tokio::test]
    async fn test_daily_endpoints_serve_empty_arrays_when_upstream_is_down() {
        let (app, _state) = test_app();

        let (status, body) = get_json(app.clone(), "/api/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!([]));

        let (status, body) = get_json(app, "/api/recommendations").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_dashboard_page_redirects_without_session() {
        let (app, _state) = test_app();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/index.html")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers()[header::LOCATION].to_str().unwrap(),
            "/login"
        );
    }

    #[tokio::test]
    async fn test_home_redirects_to_login() {
        let (app, _state) = test_app();

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers()[header::LOCATION].to_str().unwrap(),
            "/login"
        );
    }
}

