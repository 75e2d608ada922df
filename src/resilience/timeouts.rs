//! Deadlines for external calls.
//!
//! Both calls the gate makes on the request path (settings fetch and
//! session refresh) go through [`with_deadline`] so one slow dependency
//! cannot stall every request.

use std::future::Future;
use std::time::Duration;

/// The deadline passed before the operation completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("operation timed out after {0:?}")]
pub struct Elapsed(pub Duration);

/// Run `fut` with a deadline.
pub async fn with_deadline<F>(limit: Duration, fut: F) -> Result<F::Output, Elapsed>
where
    F: Future,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| Elapsed(limit))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_completes_within_deadline() {
        let out = with_deadline(Duration::from_millis(200), async { 7 }).await;
        assert_eq!(out, Ok(7));
    }

    #[tokio::test]
    async fn test_reports_elapsed() {
        let out = with_deadline(
            Duration::from_millis(10),
            tokio::time::sleep(Duration::from_secs(5)),
        )
        .await;
        assert_eq!(out, Err(Elapsed(Duration::from_millis(10))));
    }
}
