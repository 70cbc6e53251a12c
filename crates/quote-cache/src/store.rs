//! Per-market cache store and refresh policy.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;

use dashboard_core::{
    DashboardError, ExchangeCalendar, MarketDataProvider, MetricRecord, QuoteRecord,
    RecommendationRecord,
};

use crate::retry::{schedule_retry, RetryHandle};

/// Configuration for one market's cache: which symbols to track, when the
/// exchange is open, and the pacing knobs.
#[derive(Clone)]
pub struct MarketConfig {
    /// Market label used in log lines ("US", "NSE", ...).
    pub market: String,
    pub symbols: Vec<String>,
    pub calendar: ExchangeCalendar,
    /// Pause between consecutive per-symbol quote calls within a batch, to
    /// avoid burst-triggered throttling. Quote batches only; the daily
    /// metric/recommendation batches are not paced.
    pub quote_fetch_delay: Duration,
    /// Delay between attempts of a failed daily refresh.
    pub retry_delay: Duration,
}

#[derive(Default)]
struct RefreshState {
    last_metric_refresh: Option<NaiveDate>,
    last_recommendation_refresh: Option<NaiveDate>,
}

/// Cache of the latest known records per symbol for one market.
///
/// Quotes are refreshed whenever the market is open (or a symbol has never
/// been fetched); metrics and recommendations at most once per exchange-local
/// calendar day. Entries are never evicted: absence means "not yet fetched".
///
/// The refresh-state mutex is held across a daily batch, so concurrent
/// pollers collapse onto one upstream batch instead of duplicating it; a
/// second mutex does the same for quote batches.
pub struct QuoteCache {
    config: MarketConfig,
    provider: Arc<dyn MarketDataProvider>,
    quotes: DashMap<String, QuoteRecord>,
    metric_records: DashMap<String, MetricRecord>,
    recommendation_records: DashMap<String, RecommendationRecord>,
    daily: Mutex<RefreshState>,
    quote_refresh: Mutex<()>,
    metric_retry: StdMutex<Option<RetryHandle>>,
    recommendation_retry: StdMutex<Option<RetryHandle>>,
}

impl QuoteCache {
    pub fn new(config: MarketConfig, provider: Arc<dyn MarketDataProvider>) -> Self {
        Self {
            config,
            provider,
            quotes: DashMap::new(),
            metric_records: DashMap::new(),
            recommendation_records: DashMap::new(),
            daily: Mutex::new(RefreshState::default()),
            quote_refresh: Mutex::new(()),
            metric_retry: StdMutex::new(None),
            recommendation_retry: StdMutex::new(None),
        }
    }

    pub fn config(&self) -> &MarketConfig {
        &self.config
    }

    // Snapshot accessors

    /// One record per configured symbol, in configuration order. Symbols that
    /// have never been fetched get an all-zero placeholder so the dashboard
    /// renders "-" instead of erroring.
    pub fn quotes(&self) -> Vec<QuoteRecord> {
        self.config
            .symbols
            .iter()
            .map(|s| {
                self.quotes
                    .get(s)
                    .map(|r| r.clone())
                    .unwrap_or_else(|| QuoteRecord::placeholder(s))
            })
            .collect()
    }

    /// Only populated entries; a missing symbol means "not yet fetched".
    pub fn metrics(&self) -> Vec<MetricRecord> {
        self.config
            .symbols
            .iter()
            .filter_map(|s| self.metric_records.get(s).map(|r| r.clone()))
            .collect()
    }

    pub fn recommendations(&self) -> Vec<RecommendationRecord> {
        self.config
            .symbols
            .iter()
            .filter_map(|s| self.recommendation_records.get(s).map(|r| r.clone()))
            .collect()
    }

    pub fn get_quote(&self, symbol: &str) -> Option<QuoteRecord> {
        self.quotes.get(symbol).map(|r| r.clone())
    }

    pub fn get_metrics(&self, symbol: &str) -> Option<MetricRecord> {
        self.metric_records.get(symbol).map(|r| r.clone())
    }

    pub fn get_recommendation(&self, symbol: &str) -> Option<RecommendationRecord> {
        self.recommendation_records.get(symbol).map(|r| r.clone())
    }

    // Refresh operations

    /// Refresh quotes iff the market is open or some configured symbol has
    /// never been fetched. Outside market hours a fully-populated cache is
    /// served unchanged, so closed-market pollers cost no upstream calls.
    pub async fn refresh_quotes_if_needed(&self) {
        let _guard = self.quote_refresh.lock().await;

        let open = self.config.calendar.is_open_at(Utc::now());
        let missing = self
            .config
            .symbols
            .iter()
            .any(|s| !self.quotes.contains_key(s));

        if !open && !missing {
            return;
        }

        tracing::debug!(
            "{}: refreshing quotes for {} symbols (open={}, missing={})",
            self.config.market,
            self.config.symbols.len(),
            open,
            missing
        );

        for (i, symbol) in self.config.symbols.iter().enumerate() {
            if i > 0 && !self.config.quote_fetch_delay.is_zero() {
                tokio::time::sleep(self.config.quote_fetch_delay).await;
            }

            match self.provider.fetch_quote(symbol).await {
                Ok(record) => {
                    self.quotes.insert(symbol.clone(), record);
                }
                Err(e) => {
                    // Previous record (if any) stays in place; the batch
                    // continues with the remaining symbols.
                    tracing::warn!(
                        "{}: quote fetch failed for {}: {}",
                        self.config.market,
                        symbol,
                        e
                    );
                }
            }
        }
    }

    /// Daily-gated metric refresh. Failures never reach the HTTP caller: a
    /// failed batch leaves yesterday's records in place and hands the job to
    /// a background retry chain.
    pub async fn refresh_metrics_if_needed(self: &Arc<Self>) {
        if let Err(e) = self.refresh_metrics_now().await {
            tracing::warn!("{}: {}", self.config.market, e);
            self.schedule_metric_retry();
        }
    }

    pub async fn refresh_recommendations_if_needed(self: &Arc<Self>) {
        if let Err(e) = self.refresh_recommendations_now().await {
            tracing::warn!("{}: {}", self.config.market, e);
            self.schedule_recommendation_retry();
        }
    }

    /// Run the metric batch unless it already ran on the current
    /// exchange-local date. Err means the whole batch failed (no symbol
    /// succeeded); the date marker is only advanced on at least partial
    /// success, so a later call or retry attempts again.
    async fn refresh_metrics_now(&self) -> Result<(), DashboardError> {
        let mut state = self.daily.lock().await;
        let today = self.config.calendar.local_date(Utc::now());

        if state.last_metric_refresh == Some(today) {
            return Ok(());
        }

        tracing::info!(
            "{}: daily metric refresh for {} symbols",
            self.config.market,
            self.config.symbols.len()
        );

        let mut fetched = 0usize;
        for symbol in &self.config.symbols {
            match self.provider.fetch_metrics(symbol).await {
                Ok(record) => {
                    self.metric_records.insert(symbol.clone(), record);
                    fetched += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        "{}: metric fetch failed for {}: {}",
                        self.config.market,
                        symbol,
                        e
                    );
                }
            }
        }

        if fetched == 0 && !self.config.symbols.is_empty() {
            return Err(DashboardError::Upstream(
                "metric refresh failed for every symbol".to_string(),
            ));
        }

        state.last_metric_refresh = Some(today);
        Ok(())
    }

    async fn refresh_recommendations_now(&self) -> Result<(), DashboardError> {
        let mut state = self.daily.lock().await;
        let today = self.config.calendar.local_date(Utc::now());

        if state.last_recommendation_refresh == Some(today) {
            return Ok(());
        }

        tracing::info!(
            "{}: daily recommendation refresh for {} symbols",
            self.config.market,
            self.config.symbols.len()
        );

        let mut fetched = 0usize;
        for symbol in &self.config.symbols {
            match self.provider.fetch_recommendation(symbol).await {
                Ok(record) => {
                    self.recommendation_records.insert(symbol.clone(), record);
                    fetched += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        "{}: recommendation fetch failed for {}: {}",
                        self.config.market,
                        symbol,
                        e
                    );
                }
            }
        }

        if fetched == 0 && !self.config.symbols.is_empty() {
            return Err(DashboardError::Upstream(
                "recommendation refresh failed for every symbol".to_string(),
            ));
        }

        state.last_recommendation_refresh = Some(today);
        Ok(())
    }

    fn schedule_metric_retry(self: &Arc<Self>) {
        let mut slot = self.metric_retry.lock().unwrap();
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }

        let cache = Arc::clone(self);
        let label = format!("{} metric refresh", self.config.market);
        *slot = Some(schedule_retry(&label, self.config.retry_delay, move || {
            let cache = Arc::clone(&cache);
            async move { cache.refresh_metrics_now().await }
        }));
    }

    fn schedule_recommendation_retry(self: &Arc<Self>) {
        let mut slot = self.recommendation_retry.lock().unwrap();
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }

        let cache = Arc::clone(self);
        let label = format!("{} recommendation refresh", self.config.market);
        *slot = Some(schedule_retry(&label, self.config.retry_delay, move || {
            let cache = Arc::clone(&cache);
            async move { cache.refresh_recommendations_now().await }
        }));
    }

    /// Simulate a never-fetched symbol (live code never evicts entries).
    #[cfg(test)]
    pub(crate) fn evict_quote(&self, symbol: &str) {
        self.quotes.remove(symbol);
    }

    /// Simulate a calendar-day rollover.
    #[cfg(test)]
    pub(crate) async fn reset_daily_markers(&self) {
        let mut state = self.daily.lock().await;
        state.last_metric_refresh = None;
        state.last_recommendation_refresh = None;
    }

    /// Cancel any outstanding retry chains. Called on server shutdown.
    pub fn shutdown(&self) {
        if let Some(handle) = self.metric_retry.lock().unwrap().take() {
            handle.cancel();
        }
        if let Some(handle) = self.recommendation_retry.lock().unwrap().take() {
            handle.cancel();
        }
    }
}
