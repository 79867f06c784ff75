use std::future::Future;
use std::time::Duration;

use civicgraph_common::SyncError;

/// Bound a store call. Expiry is a retryable `SyncError::Timeout`, not a data error.
pub async fn within<T, F>(operation: &'static str, after: Duration, fut: F) -> Result<T, SyncError>
where
    F: Future<Output = Result<T, SyncError>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => Err(SyncError::Timeout { operation, after }),
    }
}
