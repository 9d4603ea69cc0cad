// Bounded retry with transient/fatal classification
//
// Wraps one fallible async operation. Transient provider conditions (rate
// limits, overload, network drops, timeouts) are retried after a fixed
// pause; anything else propagates on the first attempt. The policy keeps
// no state between invocations, so concurrent runs never share counters.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

use crate::errors::{ErrorClass, ServiceError};

/// A successful result plus how many retries it took to get there.
#[derive(Debug)]
pub struct Attempted<T> {
    pub value: T,
    pub retries: u32,
}

/// The final error after the policy gave up, with attempt metadata for
/// diagnostics. The original error is preserved as the source.
#[derive(Error, Debug)]
#[error("giving up after {attempts} attempt(s): {source}")]
pub struct RetryError {
    pub attempts: u32,
    #[source]
    pub source: ServiceError,
}

/// Execute `op` with up to `max_attempts` tries and a fixed `delay` between
/// them.
///
/// `classify` decides per error whether another try is worthwhile;
/// `on_retry` observes each scheduled retry (attempt number so far, error)
/// for user-facing progress. The delay is deliberately constant rather than
/// exponential.
pub async fn with_retry<F, Fut, T, C, O>(
    mut op: F,
    classify: C,
    max_attempts: u32,
    delay: Duration,
    mut on_retry: O,
) -> Result<Attempted<T>, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
    C: Fn(&ServiceError) -> ErrorClass,
    O: FnMut(u32, &ServiceError),
{
    let max_attempts = max_attempts.max(1);
    let mut retries = 0u32;

    loop {
        match op().await {
            Ok(value) => return Ok(Attempted { value, retries }),
            Err(err) => {
                let attempt = retries + 1;
                if classify(&err) == ErrorClass::Fatal || attempt >= max_attempts {
                    return Err(RetryError {
                        attempts: attempt,
                        source: err,
                    });
                }
                tracing::warn!(
                    "attempt {}/{} failed ({}), retrying in {:?}",
                    attempt,
                    max_attempts,
                    err,
                    delay
                );
                on_retry(attempt, &err);
                retries += 1;
                sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn classify(err: &ServiceError) -> ErrorClass {
        err.class()
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_first_attempt_reports_zero_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_op = calls.clone();
        let result = with_retry(
            move || {
                let calls = calls_op.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ServiceError>(42u32)
                }
            },
            classify,
            3,
            Duration::from_secs(2),
            |_, _| {},
        )
        .await
        .unwrap();

        assert_eq!(result.value, 42);
        assert_eq!(result.retries, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_transient_failures_then_success() {
        // max_attempts = 3, fails twice with a retryable error, then
        // succeeds: returns the value and reports retries = 2.
        let calls = Arc::new(AtomicU32::new(0));
        let calls_op = calls.clone();
        let result = with_retry(
            move || {
                let calls = calls_op.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err(ServiceError::Overloaded("529".into()))
                    } else {
                        Ok("done")
                    }
                }
            },
            classify,
            3,
            Duration::from_secs(2),
            |_, _| {},
        )
        .await
        .unwrap();

        assert_eq!(result.value, "done");
        assert_eq!(result.retries, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_exceeds_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_op = calls.clone();
        let err = with_retry(
            move || {
                let calls = calls_op.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(ServiceError::RateLimited("429".into()))
                }
            },
            classify,
            3,
            Duration::from_millis(100),
            |_, _| {},
        )
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(err.attempts, 3);
        assert!(matches!(err.source, ServiceError::RateLimited(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_triggers_exactly_one_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_op = calls.clone();
        let err = with_retry(
            move || {
                let calls = calls_op.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(ServiceError::Auth("invalid key".into()))
                }
            },
            classify,
            5,
            Duration::from_secs(1),
            |_, _| {},
        )
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(err.attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_retry_observes_each_scheduled_retry() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen_cb = seen.clone();
        let calls = Arc::new(AtomicU32::new(0));
        let calls_op = calls.clone();
        let _ = with_retry(
            move || {
                let calls = calls_op.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(ServiceError::Network("reset".into()))
                }
            },
            classify,
            3,
            Duration::from_secs(1),
            move |attempt, _err| seen_cb.lock().unwrap().push(attempt),
        )
        .await;

        // Two retries were scheduled (after attempts 1 and 2).
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_max_attempts_still_runs_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_op = calls.clone();
        let result = with_retry(
            move || {
                let calls = calls_op.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ServiceError>(())
                }
            },
            classify,
            0,
            Duration::ZERO,
            |_, _| {},
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
