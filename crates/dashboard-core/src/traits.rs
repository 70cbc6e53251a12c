use async_trait::async_trait;

use crate::{DashboardError, MetricRecord, QuoteRecord, RecommendationRecord};

/// Trait for upstream market data providers. The quote cache only talks to
/// this seam, so tests can swap in a scripted in-memory provider.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn fetch_quote(&self, symbol: &str) -> Result<QuoteRecord, DashboardError>;

    async fn fetch_metrics(&self, symbol: &str) -> Result<MetricRecord, DashboardError>;

    async fn fetch_recommendation(
        &self,
        symbol: &str,
    ) -> Result<RecommendationRecord, DashboardError>;
}
