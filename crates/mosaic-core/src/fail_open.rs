//! Fail-open helpers for work that must never stall a plan
//!
//! Pattern learning, progress events and task-store writes are side channels:
//! losing one is acceptable, blocking the next level on one is not.
//!
//! DO NOT use fail-open for:
//! - Inference or validation of an atom (drives the retry loop)
//! - Planning passes (abort the plan instead)
//! - State-machine transitions (a failure there is a scheduling defect)

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::Result;

/// Run an operation, logging and swallowing its error
///
/// ```no_run
/// use mosaic_core::fail_open::fail_open;
/// use mosaic_core::Result;
///
/// async fn persist_pattern() -> Result<()> {
///     Ok(())
/// }
///
/// async fn example() {
///     let stored = fail_open("pattern_store", || persist_pattern()).await;
///     assert!(stored.is_some());
/// }
/// ```
pub async fn fail_open<F, Fut, T>(operation_name: &str, f: F) -> Option<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match f().await {
        Ok(val) => Some(val),
        Err(e) => {
            warn!(operation = operation_name, error = %e, "fail-open operation failed");
            None
        }
    }
}

/// Like [`fail_open`] but retries with a linear backoff of `100ms * attempt`
pub async fn fail_open_with_retries<F, Fut, T>(
    operation_name: &str,
    mut f: F,
    max_retries: usize,
) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    for attempt in 1..=max_retries {
        match f().await {
            Ok(val) => return Some(val),
            Err(e) if attempt == max_retries => {
                warn!(
                    operation = operation_name,
                    retries = max_retries,
                    error = %e,
                    "fail-open operation gave up"
                );
            }
            Err(e) => {
                warn!(
                    operation = operation_name,
                    attempt,
                    max_retries,
                    error = %e,
                    "fail-open operation failed, retrying"
                );
                tokio::time::sleep(Duration::from_millis(100 * attempt as u64)).await;
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MosaicError;

    #[tokio::test]
    async fn test_fail_open_success() {
        let result = fail_open("test_op", || async { Ok::<_, MosaicError>(42) }).await;
        assert_eq!(result, Some(42));
    }

    #[tokio::test]
    async fn test_fail_open_failure() {
        let result = fail_open("test_op", || async {
            Err::<i32, _>(MosaicError::Pattern("index unavailable".to_string()))
        })
        .await;
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_fail_open_with_retries_success_after_retry() {
        let mut attempts = 0;
        let result = fail_open_with_retries(
            "test_op",
            || {
                attempts += 1;
                let current = attempts;
                async move {
                    if current < 2 {
                        Err(MosaicError::Other("transient error".to_string()))
                    } else {
                        Ok(7)
                    }
                }
            },
            3,
        )
        .await;
        assert_eq!(result, Some(7));
        assert_eq!(attempts, 2);
    }

    #[tokio::test]
    async fn test_fail_open_with_retries_all_failures() {
        let mut attempts = 0;
        let result = fail_open_with_retries(
            "test_op",
            || {
                attempts += 1;
                async move { Err::<i32, _>(MosaicError::Other("persistent error".to_string())) }
            },
            3,
        )
        .await;
        assert_eq!(result, None);
        assert_eq!(attempts, 3);
    }
}
