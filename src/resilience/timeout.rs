use crate::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

/// Extension trait that puts a deadline on probe futures.
///
/// Probes are expected to fail with [`Error::Timeout`] when they exceed
/// their own deadline; this is how a plain future gets that behavior.
#[allow(async_fn_in_trait)]
pub trait TimeoutExt<T> {
    /// Fail with [`Error::Timeout`] if the future does not finish in time
    async fn with_deadline(self, duration: Duration) -> Result<T>;
}

impl<F, T> TimeoutExt<T> for F
where
    F: Future<Output = Result<T>>,
{
    async fn with_deadline(self, duration: Duration) -> Result<T> {
        if let Ok(result) = timeout(duration, self).await {
            result
        } else {
            debug!("Operation exceeded deadline of {:?}", duration);
            Err(Error::Timeout { timeout: duration })
        }
    }
}
