//! Quote caching layer between the dashboard's polling endpoints and the
//! rate-limited upstream quote provider.
//!
//! Holds the latest known quote/metric/recommendation per symbol and decides,
//! per market, when to call upstream, when to serve stale data, and how to
//! recover from upstream failures without surfacing them to the HTTP caller.

pub mod retry;
pub mod store;

pub use retry::{schedule_retry, RetryHandle};
pub use store::{MarketConfig, QuoteCache};

#[cfg(test)]
mod tests;
