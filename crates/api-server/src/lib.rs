//! HTTP facade for the finance dashboard.
//!
//! Serves the dashboard's polling endpoints from the quote cache, the NSE
//! index passthrough, the session login gate, and the static dashboard page.

pub mod auth;
pub mod config;
pub mod market_routes;
pub mod nifty_routes;

use std::sync::Arc;

use axum::{middleware, response::Redirect, routing::get, Router};
use tower_http::{
    cors::CorsLayer,
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};

use finnhub_client::FinnhubClient;
use quote_cache::{MarketConfig, QuoteCache};

use auth::{SessionStore, UserStore};
use config::ServerConfig;

/// Wrapper so handlers can use `?` on anything anyhow can absorb.
/// Only user-store failures surface this way; cache refresh errors are
/// swallowed before reaching a handler.
pub struct AppError(pub anyhow::Error);

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        tracing::error!("Request failed: {}", self.0);
        (
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            format!("Internal error: {}", self.0),
        )
            .into_response()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<QuoteCache>,
    pub sessions: Arc<SessionStore>,
    pub users: Arc<UserStore>,
    pub http: reqwest::Client,
}

pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    // Only the dashboard page sits behind the session gate; the polling
    // endpoints stay open, matching the original deployment.
    let protected = Router::new()
        .route_service(
            "/index.html",
            ServeFile::new(config.public_dir.join("index.html")),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_session,
        ));

    Router::new()
        .route("/", get(|| async { Redirect::to("/login") }))
        .merge(protected)
        .merge(auth::auth_routes(&config.public_dir))
        .merge(market_routes::market_routes())
        .merge(nifty_routes::nifty_routes())
        .fallback_service(ServeDir::new(&config.public_dir))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = ServerConfig::from_env()?;

    let provider = Arc::new(FinnhubClient::new(config.finnhub_token.clone()));
    let cache = Arc::new(QuoteCache::new(
        MarketConfig {
            market: "US".to_string(),
            symbols: config.symbols.clone(),
            calendar: config.calendar.clone(),
            quote_fetch_delay: config.quote_fetch_delay,
            retry_delay: config.retry_delay,
        },
        provider,
    ));

    let state = AppState {
        cache: Arc::clone(&cache),
        sessions: Arc::new(SessionStore::default()),
        users: Arc::new(UserStore::new(config.users_file.clone())),
        http: reqwest::Client::new(),
    };

    let app = build_router(state, &config);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(
        "Dashboard server listening on {} ({} symbols)",
        addr,
        config.symbols.len()
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Outstanding retry chains must not outlive the server.
    cache.shutdown();
    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}

fn init_tracing() {
    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };

    if json_logging {
        tracing_subscriber::fmt().json().with_env_filter(filter()).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter()).init();
    }
}
