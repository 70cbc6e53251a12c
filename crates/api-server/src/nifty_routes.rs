//! NSE index passthrough.
//!
//! The NSE endpoint rejects requests without browser-like headers, so the
//! server proxies it for the dashboard instead of letting the page call it
//! cross-origin. This is the one route whose error contract is a JSON error
//! body rather than a degraded payload.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;

use crate::AppState;

const NSE_INDEX_URL: &str = "https://www.nseindia.com/api/equity-stockIndices";

pub fn nifty_routes() -> Router<AppState> {
    Router::new().route("/api/nifty", get(get_nifty))
}

async fn get_nifty(State(state): State<AppState>) -> Response {
    let result = state
        .http
        .get(NSE_INDEX_URL)
        .query(&[("index", "NIFTY 50")])
        .header("User-Agent", "Mozilla/5.0")
        .header("Referer", "https://www.nseindia.com")
        .send()
        .await;

    let body = match result {
        Ok(response) => response.json::<serde_json::Value>().await,
        Err(e) => Err(e),
    };

    match body {
        Ok(data) => Json(data).into_response(),
        Err(e) => {
            tracing::error!("NSE fetch error: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Unable to fetch data from NSE" })),
            )
                .into_response()
        }
    }
}
