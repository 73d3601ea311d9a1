//! Deadline helpers.

use std::future::Future;
use std::time::Duration;

use crate::error::{McpezError, Result};

/// Run `future`, failing with [`McpezError::Timeout`] once `duration` elapses.
pub async fn with_timeout<T>(duration: Duration, future: impl Future<Output = Result<T>>) -> Result<T> {
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(McpezError::Timeout(duration.as_millis() as u64)),
    }
}

/// Like [`with_timeout`], without a deadline when `duration` is `None`.
pub async fn with_optional_timeout<T>(
    duration: Option<Duration>,
    future: impl Future<Output = Result<T>>,
) -> Result<T> {
    match duration {
        Some(duration) => with_timeout(duration, future).await,
        None => future.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn elapsed_deadline_is_a_timeout() {
        let err = with_timeout(Duration::from_millis(50), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, McpezError::Timeout(50)));
    }

    #[tokio::test]
    async fn no_deadline_waits_for_the_future() {
        let value = with_optional_timeout(None, async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }
}
