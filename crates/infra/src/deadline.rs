use std::future::Future;
use std::time::Duration;

use crate::error::EngineError;

/// Run `fut` under a deadline, mapping expiry to [`EngineError::Timeout`].
///
/// On expiry the future is dropped at its current await point, so a write
/// that has not yet been issued is never issued.
pub async fn with_deadline<T, F>(
    operation: &'static str,
    after: Duration,
    fut: F,
) -> Result<T, EngineError>
where
    F: Future<Output = Result<T, EngineError>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => Err(EngineError::Timeout { operation, after }),
    }
}
