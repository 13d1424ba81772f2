use std::future::Future;
use std::time::Duration;

use tessera_core::error::CoreError;

/// Run `fut` with an upper bound on its duration.
///
/// On timeout the future is dropped, which rolls back any transaction it had
/// open, and the call fails with [`CoreError::Transient`].
pub async fn with_deadline<T, F>(timeout: Duration, fut: F) -> Result<T, CoreError>
where
    F: Future<Output = Result<T, CoreError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(timeout_ms = timeout.as_millis() as u64, "Operation deadline exceeded");
            Err(CoreError::Transient("deadline exceeded".into()))
        }
    }
}
