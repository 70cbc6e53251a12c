use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveTime;

use dashboard_core::{
    DashboardError, ExchangeCalendar, MarketDataProvider, MetricRecord, QuoteRecord,
    RecommendationRecord,
};

use crate::{MarketConfig, QuoteCache};

/// Scripted in-memory provider. Counts calls per dataset kind and fails for
/// symbols in `fail_symbols`, plus the first `fail_first_metric_calls` metric
/// calls regardless of symbol.
#[derive(Default)]
struct MockProvider {
    quote_calls: AtomicUsize,
    metric_calls: AtomicUsize,
    recommendation_calls: AtomicUsize,
    fail_symbols: Mutex<HashSet<String>>,
    fail_first_metric_calls: usize,
}

impl MockProvider {
    fn failing_for(symbols: &[&str]) -> Self {
        Self {
            fail_symbols: Mutex::new(symbols.iter().map(|s| s.to_string()).collect()),
            ..Self::default()
        }
    }

    fn failing_first_metric_calls(n: usize) -> Self {
        Self {
            fail_first_metric_calls: n,
            ..Self::default()
        }
    }

    fn set_failing(&self, symbols: &[&str]) {
        *self.fail_symbols.lock().unwrap() = symbols.iter().map(|s| s.to_string()).collect();
    }

    fn should_fail(&self, symbol: &str) -> bool {
        self.fail_symbols.lock().unwrap().contains(symbol)
    }
}

#[async_trait]
impl MarketDataProvider for MockProvider {
    async fn fetch_quote(&self, symbol: &str) -> Result<QuoteRecord, DashboardError> {
        let idx = self.quote_calls.fetch_add(1, Ordering::SeqCst);
        if self.should_fail(symbol) {
            return Err(DashboardError::Upstream(format!("quote down for {}", symbol)));
        }
        Ok(QuoteRecord {
            symbol: symbol.to_string(),
            last_price: 100.0 + idx as f64,
            change: 1.0,
            percent_change: 1.0,
            previous_close: 99.0 + idx as f64,
        })
    }

    async fn fetch_metrics(&self, symbol: &str) -> Result<MetricRecord, DashboardError> {
        let idx = self.metric_calls.fetch_add(1, Ordering::SeqCst);
        if idx < self.fail_first_metric_calls || self.should_fail(symbol) {
            return Err(DashboardError::Upstream(format!("metrics down for {}", symbol)));
        }
        Ok(MetricRecord {
            symbol: symbol.to_string(),
            week_high: 200.0,
            week_low: 150.0,
            pe_ratio: 10.0 + idx as f64,
        })
    }

    async fn fetch_recommendation(
        &self,
        symbol: &str,
    ) -> Result<RecommendationRecord, DashboardError> {
        self.recommendation_calls.fetch_add(1, Ordering::SeqCst);
        if self.should_fail(symbol) {
            return Err(DashboardError::Upstream(format!(
                "recommendations down for {}",
                symbol
            )));
        }
        Ok(RecommendationRecord {
            symbol: symbol.to_string(),
            strong_buy: 5,
            buy: 10,
            hold: 4,
            sell: 1,
        })
    }
}

/// A window where open == close is never satisfied, so the market reads as
/// closed at any instant.
fn closed_calendar() -> ExchangeCalendar {
    let midnight = NaiveTime::from_hms_opt(0, 0, 0).unwrap();
    ExchangeCalendar::new(chrono_tz::UTC, midnight, midnight)
}

fn test_config(symbols: &[&str]) -> MarketConfig {
    MarketConfig {
        market: "TEST".to_string(),
        symbols: symbols.iter().map(|s| s.to_string()).collect(),
        calendar: closed_calendar(),
        quote_fetch_delay: Duration::ZERO,
        retry_delay: Duration::from_secs(600),
    }
}

fn cache_with(provider: Arc<MockProvider>, symbols: &[&str]) -> Arc<QuoteCache> {
    Arc::new(QuoteCache::new(test_config(symbols), provider))
}

#[tokio::test(start_paused = true)]
async fn test_unfetched_symbols_serve_placeholders() {
    let provider = Arc::new(MockProvider::failing_for(&["AAPL", "MSFT"]));
    let cache = cache_with(provider, &["AAPL", "MSFT"]);

    cache.refresh_quotes_if_needed().await;

    assert_eq!(cache.get_quote("AAPL"), None);
    let quotes = cache.quotes();
    assert_eq!(quotes.len(), 2);
    assert_eq!(quotes[0], QuoteRecord::placeholder("AAPL"));
    assert_eq!(quotes[1], QuoteRecord::placeholder("MSFT"));

    // Daily datasets render as empty arrays, never errors.
    assert!(cache.metrics().is_empty());
    assert!(cache.recommendations().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_daily_metric_refresh_is_idempotent() {
    let provider = Arc::new(MockProvider::default());
    let cache = cache_with(Arc::clone(&provider), &["AAPL", "MSFT"]);

    cache.refresh_metrics_if_needed().await;
    assert_eq!(provider.metric_calls.load(Ordering::SeqCst), 2);

    // Second call on the same calendar date is a no-op.
    cache.refresh_metrics_if_needed().await;
    assert_eq!(provider.metric_calls.load(Ordering::SeqCst), 2);
    assert_eq!(cache.metrics().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_daily_recommendation_refresh_is_idempotent() {
    let provider = Arc::new(MockProvider::default());
    let cache = cache_with(Arc::clone(&provider), &["AAPL"]);

    cache.refresh_recommendations_if_needed().await;
    cache.refresh_recommendations_if_needed().await;

    assert_eq!(provider.recommendation_calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.recommendations().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_per_symbol_failure_does_not_abort_batch() {
    let provider = Arc::new(MockProvider::failing_for(&["X"]));
    let cache = cache_with(Arc::clone(&provider), &["X", "Y", "Z"]);

    cache.refresh_metrics_if_needed().await;

    assert_eq!(cache.get_metrics("X"), None);
    assert!(cache.get_metrics("Y").is_some());
    assert!(cache.get_metrics("Z").is_some());

    // Partial success still counts as today's refresh.
    cache.refresh_metrics_if_needed().await;
    assert_eq!(provider.metric_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_quote_failure_keeps_previous_record() {
    let provider = Arc::new(MockProvider::default());
    let cache = cache_with(Arc::clone(&provider), &["AAPL", "MSFT"]);

    cache.refresh_quotes_if_needed().await;
    let first = cache.get_quote("AAPL").unwrap();

    // Evict MSFT so the next poll runs a batch, and make AAPL's fetch fail:
    // the failure degrades only AAPL, which falls back to its previous value.
    cache.evict_quote("MSFT");
    provider.set_failing(&["AAPL"]);
    cache.refresh_quotes_if_needed().await;

    assert_eq!(cache.get_quote("AAPL"), Some(first));
    assert!(cache.get_quote("MSFT").is_some());
}

#[tokio::test(start_paused = true)]
async fn test_metric_failure_leaves_stale_record_in_place() {
    let provider = Arc::new(MockProvider::default());
    let cache = cache_with(Arc::clone(&provider), &["AAPL", "MSFT"]);

    cache.refresh_metrics_if_needed().await;
    let stale_aapl = cache.get_metrics("AAPL").unwrap();
    let msft_before = cache.get_metrics("MSFT").unwrap();

    // Roll the day over and fail one symbol: the next batch refreshes MSFT
    // but leaves AAPL's previous record untouched.
    cache.reset_daily_markers().await;
    provider.set_failing(&["AAPL"]);
    cache.refresh_metrics_if_needed().await;

    assert_eq!(cache.get_metrics("AAPL"), Some(stale_aapl));
    assert_ne!(cache.get_metrics("MSFT"), Some(msft_before));
}

#[tokio::test(start_paused = true)]
async fn test_retry_chain_runs_until_success_then_stops() {
    // Fails twice (initial attempt + first retry), succeeds on the third
    // invocation, two delay intervals after the initial failure.
    let provider = Arc::new(MockProvider::failing_first_metric_calls(2));
    let cache = cache_with(Arc::clone(&provider), &["AAPL"]);

    cache.refresh_metrics_if_needed().await;
    assert_eq!(provider.metric_calls.load(Ordering::SeqCst), 1);
    assert!(cache.metrics().is_empty());

    // Two retry delays later the chain has succeeded.
    tokio::time::sleep(Duration::from_secs(1250)).await;
    assert_eq!(provider.metric_calls.load(Ordering::SeqCst), 3);
    assert_eq!(cache.metrics().len(), 1);

    // And it stops rescheduling afterwards.
    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert_eq!(provider.metric_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_pending_retry() {
    let provider = Arc::new(MockProvider::failing_first_metric_calls(usize::MAX));
    let cache = cache_with(Arc::clone(&provider), &["AAPL"]);

    cache.refresh_metrics_if_needed().await;
    assert_eq!(provider.metric_calls.load(Ordering::SeqCst), 1);

    cache.shutdown();

    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert_eq!(provider.metric_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_closed_market_serves_cache_without_upstream_calls() {
    let provider = Arc::new(MockProvider::default());
    let cache = cache_with(Arc::clone(&provider), &["AAPL", "MSFT"]);

    // First poll with an empty cache fetches both symbols even though the
    // market is closed.
    cache.refresh_quotes_if_needed().await;
    assert_eq!(provider.quote_calls.load(Ordering::SeqCst), 2);
    let first = cache.quotes();

    // A poll five seconds later inside the same closed-market window serves
    // the identical payload without touching upstream.
    tokio::time::sleep(Duration::from_secs(5)).await;
    cache.refresh_quotes_if_needed().await;

    assert_eq!(provider.quote_calls.load(Ordering::SeqCst), 2);
    assert_eq!(cache.quotes(), first);
}

#[tokio::test(start_paused = true)]
async fn test_quote_batch_is_paced() {
    let provider = Arc::new(MockProvider::default());
    let mut config = test_config(&["A", "B", "C"]);
    config.quote_fetch_delay = Duration::from_millis(500);
    let cache = Arc::new(QuoteCache::new(config, provider));

    let started = tokio::time::Instant::now();
    cache.refresh_quotes_if_needed().await;

    // Two inter-symbol gaps of 500ms each.
    assert!(started.elapsed() >= Duration::from_millis(1000));
    assert_eq!(cache.quotes().len(), 3);
}
