//! Environment-driven server configuration.

use std::path::PathBuf;
use std::time::Duration;

use dashboard_core::{DashboardError, ExchangeCalendar};

const DEFAULT_SYMBOLS: &str = "AAPL,MSFT,GOOGL,AMZN,TSLA,META,NVDA,NFLX";
const DEFAULT_MARKET_TZ: &str = "America/New_York";
const DEFAULT_MARKET_HOURS: &str = "09:30-16:00";

/// Resolve the exchange calendar from the MARKET_TZ/MARKET_HOURS overrides.
/// Either half may be set alone; the other falls back to the NYSE default, so
/// a window-only override is never silently dropped.
fn resolve_calendar(
    tz: Option<&str>,
    window: Option<&str>,
) -> Result<ExchangeCalendar, DashboardError> {
    match (tz, window) {
        (None, None) => Ok(ExchangeCalendar::nyse()),
        (tz, window) => ExchangeCalendar::parse(
            tz.unwrap_or(DEFAULT_MARKET_TZ),
            window.unwrap_or(DEFAULT_MARKET_HOURS),
        ),
    }
}

#[derive(Clone)]
pub struct ServerConfig {
    pub finnhub_token: String,
    pub port: u16,
    pub symbols: Vec<String>,
    pub calendar: ExchangeCalendar,
    pub quote_fetch_delay: Duration,
    pub retry_delay: Duration,
    pub users_file: PathBuf,
    pub public_dir: PathBuf,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, DashboardError> {
        let finnhub_token = std::env::var("FINNHUB_TOKEN")
            .map_err(|_| DashboardError::Config("FINNHUB_TOKEN is not set".to_string()))?;

        let port = std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3000);

        let symbols: Vec<String> = std::env::var("SYMBOLS")
            .unwrap_or_else(|_| DEFAULT_SYMBOLS.to_string())
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();

        if symbols.is_empty() {
            return Err(DashboardError::Config("SYMBOLS is empty".to_string()));
        }

        // The exchange calendar is configuration, not behavior: deployments
        // tracking NSE symbols set MARKET_TZ/MARKET_HOURS accordingly.
        let calendar = resolve_calendar(
            std::env::var("MARKET_TZ").ok().as_deref(),
            std::env::var("MARKET_HOURS").ok().as_deref(),
        )?;

        let quote_fetch_delay = Duration::from_millis(
            std::env::var("QUOTE_FETCH_DELAY_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(500),
        );

        let retry_delay = Duration::from_secs(
            std::env::var("RETRY_DELAY_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(600),
        );

        let users_file =
            PathBuf::from(std::env::var("USERS_FILE").unwrap_or_else(|_| "users.json".to_string()));

        let public_dir =
            PathBuf::from(std::env::var("PUBLIC_DIR").unwrap_or_else(|_| "public".to_string()));

        Ok(Self {
            finnhub_token,
            port,
            symbols,
            calendar,
            quote_fetch_delay,
            retry_delay,
            users_file,
            public_dir,
        })
    }
}
