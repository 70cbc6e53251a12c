//! Fixed-delay retry chains for failed refresh operations.

use std::future::Future;
use std::time::Duration;

use dashboard_core::DashboardError;
use tokio::task::JoinHandle;

/// Handle to a running retry chain. The chain keeps re-invoking its operation
/// until it succeeds; the owner cancels it on shutdown.
pub struct RetryHandle {
    label: String,
    handle: JoinHandle<()>,
}

impl RetryHandle {
    pub fn cancel(&self) {
        tracing::debug!("{}: cancelling retry chain", self.label);
        self.handle.abort();
    }

    /// True once the chained operation has succeeded (or the chain was
    /// cancelled).
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Re-invoke `op` every `delay` until it returns Ok. There is no maximum
/// attempt count; the day-rollover inside the refresh operation itself is
/// what makes a stale chain converge.
pub fn schedule_retry<F, Fut>(label: &str, delay: Duration, op: F) -> RetryHandle
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), DashboardError>> + Send + 'static,
{
    let label_owned = label.to_string();
    tracing::warn!("{}: scheduling retry in {:?}", label_owned, delay);

    let task_label = label_owned.clone();
    let handle = tokio::spawn(async move {
        let mut attempt = 0u32;
        loop {
            tokio::time::sleep(delay).await;
            attempt += 1;

            match op().await {
                Ok(()) => {
                    tracing::info!("{}: retry attempt {} succeeded", task_label, attempt);
                    break;
                }
                Err(e) => {
                    tracing::warn!(
                        "{}: retry attempt {} failed, next in {:?}: {}",
                        task_label,
                        attempt,
                        delay,
                        e
                    );
                }
            }
        }
    });

    RetryHandle {
        label: label_owned,
        handle,
    }
}
