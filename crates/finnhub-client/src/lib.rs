//! Finnhub REST adapter.
//!
//! Maps three Finnhub endpoints to the dashboard's internal records:
//! - /quote                 -> QuoteRecord
//! - /stock/metric          -> MetricRecord
//! - /stock/recommendation  -> RecommendationRecord
//!
//! Finnhub omits fields it has no data for and returns zeros for unknown
//! symbols; normalization substitutes 0 for anything missing instead of
//! raising, so a sparse payload degrades the record rather than the batch.
//! The free tier allows 60 calls per minute.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use dashboard_core::{
    DashboardError, MarketDataProvider, MetricRecord, QuoteRecord, RecommendationRecord,
};

const BASE_URL: &str = "https://finnhub.io/api/v1";

#[derive(Clone)]
pub struct FinnhubClient {
    client: Client,
    token: String,
    base_url: String,
}

impl FinnhubClient {
    pub fn new(token: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            token,
            base_url: BASE_URL.to_string(),
        }
    }

    /// Point the client at a different base URL (mock servers in tests).
    pub fn with_base_url(token: String, base_url: String) -> Self {
        Self {
            base_url,
            ..Self::new(token)
        }
    }

    /// GET an endpoint with the API token header, mapping failures and
    /// non-2xx statuses to `DashboardError::Upstream`.
    async fn fetch(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<String, DashboardError> {
        let url = format!("{}{}", self.base_url, endpoint);

        let response = self
            .client
            .get(&url)
            .header("X-Finnhub-Token", &self.token)
            .query(params)
            .send()
            .await
            .map_err(|e| DashboardError::Upstream(format!("{} request failed: {}", endpoint, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();

            // Finnhub error bodies look like {"error": "..."}
            if let Ok(err) = serde_json::from_str::<ErrorResponse>(&body) {
                if let Some(message) = err.error {
                    return Err(DashboardError::Upstream(format!(
                        "HTTP {}: {}",
                        status, message
                    )));
                }
            }

            return Err(DashboardError::Upstream(format!("HTTP {}: {}", status, body)));
        }

        response
            .text()
            .await
            .map_err(|e| DashboardError::Upstream(format!("Failed to read response: {}", e)))
    }
}

#[async_trait]
impl MarketDataProvider for FinnhubClient {
    async fn fetch_quote(&self, symbol: &str) -> Result<QuoteRecord, DashboardError> {
        let text = self.fetch("/quote", &[("symbol", symbol)]).await?;

        let response: QuoteResponse = serde_json::from_str(&text)
            .map_err(|e| DashboardError::Upstream(format!("Bad quote payload: {}", e)))?;

        tracing::debug!("Finnhub quote for {}: {}", symbol, response.c);

        Ok(QuoteRecord {
            symbol: symbol.to_string(),
            last_price: response.c,
            change: response.d,
            percent_change: response.dp,
            previous_close: response.pc,
        })
    }

    async fn fetch_metrics(&self, symbol: &str) -> Result<MetricRecord, DashboardError> {
        let text = self
            .fetch("/stock/metric", &[("symbol", symbol), ("metric", "all")])
            .await?;

        let body: MetricResponse = serde_json::from_str(&text)
            .map_err(|e| DashboardError::Upstream(format!("Bad metric payload: {}", e)))?;

        Ok(MetricRecord {
            symbol: symbol.to_string(),
            week_high: body.metric.week_high,
            week_low: body.metric.week_low,
            pe_ratio: body.metric.pe_ratio,
        })
    }

    async fn fetch_recommendation(
        &self,
        symbol: &str,
    ) -> Result<RecommendationRecord, DashboardError> {
        let text = self
            .fetch("/stock/recommendation", &[("symbol", symbol)])
            .await?;

        let rows: Vec<RecommendationRow> = serde_json::from_str(&text)
            .map_err(|e| DashboardError::Upstream(format!("Bad recommendation payload: {}", e)))?;

        // Rows are newest-first monthly consensus entries. No rows means no
        // analyst coverage, which the dashboard shows as zeros.
        let latest = rows.into_iter().next().unwrap_or_default();

        Ok(RecommendationRecord {
            symbol: symbol.to_string(),
            strong_buy: latest.strong_buy,
            buy: latest.buy,
            hold: latest.hold,
            sell: latest.sell,
        })
    }
}

// Response structures

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    /// Current price
    #[serde(default)]
    c: f64,
    /// Change
    #[serde(default)]
    d: f64,
    /// Percent change
    #[serde(default)]
    dp: f64,
    /// Previous close
    #[serde(default)]
    pc: f64,
}

#[derive(Debug, Default, Deserialize)]
struct MetricResponse {
    #[serde(default)]
    metric: MetricFields,
}

#[derive(Debug, Default, Deserialize)]
struct MetricFields {
    #[serde(rename = "52WeekHigh", default)]
    week_high: f64,
    #[serde(rename = "52WeekLow", default)]
    week_low: f64,
    #[serde(rename = "peBasicExclExtraTTM", default)]
    pe_ratio: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecommendationRow {
    #[serde(default)]
    strong_buy: i64,
    #[serde(default)]
    buy: i64,
    #[serde(default)]
    hold: i64,
    #[serde(default)]
    sell: i64,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: Option<String>,
}
