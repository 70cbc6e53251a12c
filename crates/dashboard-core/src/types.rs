use serde::{Deserialize, Serialize};

/// Real-time quote for one symbol. Overwritten on every successful fetch
/// during market hours; outside market hours the last fetched value is kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRecord {
    pub symbol: String,
    pub last_price: f64,
    pub change: f64,
    pub percent_change: f64,
    pub previous_close: f64,
}

impl QuoteRecord {
    /// All-zero record served when a symbol has never been fetched.
    /// The dashboard renders zeros as "-".
    pub fn placeholder(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            last_price: 0.0,
            change: 0.0,
            percent_change: 0.0,
            previous_close: 0.0,
        }
    }
}

/// Valuation metrics, refreshed at most once per calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricRecord {
    pub symbol: String,
    pub week_high: f64,
    pub week_low: f64,
    pub pe_ratio: f64,
}

impl MetricRecord {
    pub fn placeholder(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            week_high: 0.0,
            week_low: 0.0,
            pe_ratio: 0.0,
        }
    }
}

/// Analyst recommendation counts, refreshed at most once per calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationRecord {
    pub symbol: String,
    pub strong_buy: i64,
    pub buy: i64,
    pub hold: i64,
    pub sell: i64,
}

impl RecommendationRecord {
    pub fn placeholder(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            strong_buy: 0,
            buy: 0,
            hold: 0,
            sell: 0,
        }
    }
}
