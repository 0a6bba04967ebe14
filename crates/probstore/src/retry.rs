//! Single retry for transient storage errors.

use std::future::Future;
use std::time::Duration;

use probstore_core::storage::Result;

/// Pause before the one retry.
pub const RETRY_DELAY: Duration = Duration::from_millis(50);

/// Runs `attempt`, retrying exactly once if it fails with a transient error.
///
/// Every other error, and a second transient failure, is returned unchanged.
pub async fn retry_transient<T, F, Fut>(operation: &'static str, mut attempt: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match attempt().await {
        Err(err) if err.is_transient() => {
            tracing::warn!(operation, error = %err, "Transient storage error, retrying once");
            tokio::time::sleep(RETRY_DELAY).await;
            attempt().await
        }
        other => other,
    }
}
