//! Long-running operation poller
//!
//! Backends that process uploads asynchronously hand back an operation name.
//! [`OperationPoller::wait`] spawns one background task that GETs the
//! operation at a fixed interval until it reports `done`, and blocks the
//! caller on a single wait point: the task's terminal signal or the overall
//! deadline, whichever comes first.
//!
//! GETs are strictly sequential. A failed GET counts towards the
//! consecutive-failure limit; any successful response resets the count.
//! The background task is aborted on deadline and whenever the waiting
//! future is dropped, so no further requests are issued after the caller
//! has given up.

use std::future::Future;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Result, StoreError};

/// Default pause between two GETs
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default overall deadline
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(5 * 60);

/// Default number of consecutive failed GETs before giving up
pub const DEFAULT_MAX_FAILURES: u32 = 5;

/// A polled response that knows whether the operation has finished
pub trait OperationStatus {
    fn is_done(&self) -> bool;
}

/// Poller tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerOptions {
    pub interval: Duration,
    pub deadline: Duration,
    pub max_failures: u32,
}

impl Default for PollerOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            deadline: DEFAULT_DEADLINE,
            max_failures: DEFAULT_MAX_FAILURES,
        }
    }
}

impl PollerOptions {
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }
}

/// Terminal signal sent by the background task
enum Terminal<T> {
    Done(T),
    RetryExceeded { failures: u32, last_error: String },
}

/// Aborts the poll task when the waiter goes away
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Waits for a server-side operation to complete
#[derive(Debug, Clone, Default)]
pub struct OperationPoller {
    options: PollerOptions,
}

impl OperationPoller {
    pub fn new(options: PollerOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &PollerOptions {
        &self.options
    }

    /// Poll `get` until it yields a done response
    ///
    /// Returns the final response, or `OperationRetryExceeded` /
    /// `OperationTimedOut`.
    pub async fn wait<T, F, Fut>(&self, operation: &str, get: F) -> Result<T>
    where
        T: OperationStatus + Send + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        info!(
            operation,
            deadline_secs = self.options.deadline.as_secs(),
            "waiting for operation to complete"
        );

        let (tx, rx) = oneshot::channel();
        let _task = AbortOnDrop(tokio::spawn(poll_loop(
            operation.to_string(),
            self.options,
            get,
            tx,
        )));

        match tokio::time::timeout(self.options.deadline, rx).await {
            Ok(Ok(Terminal::Done(response))) => {
                info!(operation, "operation finished");
                Ok(response)
            }
            Ok(Ok(Terminal::RetryExceeded {
                failures,
                last_error,
            })) => Err(StoreError::OperationRetryExceeded {
                operation: operation.to_string(),
                failures,
                last_error,
            }),
            Ok(Err(_)) => Err(StoreError::UnexpectedResponse(format!(
                "poller for {} stopped without a result",
                operation
            ))),
            Err(_) => {
                warn!(operation, "operation polling timed out");
                Err(StoreError::OperationTimedOut {
                    operation: operation.to_string(),
                    deadline: self.options.deadline,
                })
            }
        }
    }
}

async fn poll_loop<T, F, Fut>(
    operation: String,
    options: PollerOptions,
    mut get: F,
    tx: oneshot::Sender<Terminal<T>>,
) where
    T: OperationStatus,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut failures = 0u32;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match get().await {
            Ok(response) if response.is_done() => {
                debug!(operation = %operation, attempt, "operation reported done");
                let _ = tx.send(Terminal::Done(response));
                return;
            }
            Ok(_) => {
                failures = 0;
                debug!(operation = %operation, attempt, "operation still running");
            }
            Err(e) => {
                failures += 1;
                warn!(
                    operation = %operation,
                    attempt,
                    failures,
                    error = %e,
                    "failed to poll operation"
                );
                if failures >= options.max_failures {
                    let _ = tx.send(Terminal::RetryExceeded {
                        failures,
                        last_error: e.to_string(),
                    });
                    return;
                }
            }
        }

        tokio::time::sleep(options.interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    #[derive(Debug)]
    struct Status {
        done: bool,
        payload: &'static str,
    }

    impl OperationStatus for Status {
        fn is_done(&self) -> bool {
            self.done
        }
    }

    fn counter() -> Arc<AtomicU32> {
        Arc::new(AtomicU32::new(0))
    }

    #[tokio::test(start_paused = true)]
    async fn test_done_after_two_pending_responses() {
        let calls = counter();
        let c = calls.clone();
        let poller = OperationPoller::default();
        let start = Instant::now();

        let status = poller
            .wait("operations/1", move || {
                let n = c.fetch_add(1, Ordering::SeqCst);
                async move {
                    Ok(Status {
                        done: n >= 2,
                        payload: "release",
                    })
                }
            })
            .await
            .unwrap();

        let elapsed = start.elapsed();
        assert_eq!(status.payload, "release");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(elapsed >= Duration::from_secs(10));
        assert!(elapsed <= Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exceeded_after_five_failures() {
        let calls = counter();
        let c = calls.clone();
        let poller = OperationPoller::default();

        let err = poller
            .wait("operations/2", move || {
                c.fetch_add(1, Ordering::SeqCst);
                async { Err::<Status, _>(StoreError::UnexpectedResponse("boom".into())) }
            })
            .await
            .unwrap_err();

        match err {
            StoreError::OperationRetryExceeded {
                operation,
                failures,
                last_error,
            } => {
                assert_eq!(operation, "operations/2");
                assert_eq!(failures, 5);
                assert!(last_error.contains("boom"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_must_be_consecutive() {
        let calls = counter();
        let c = calls.clone();
        let poller = OperationPoller::default();

        // Four failures, one pending success, four failures, then done.
        let status = poller
            .wait("operations/3", move || {
                let n = c.fetch_add(1, Ordering::SeqCst);
                async move {
                    match n {
                        4 => Ok(Status { done: false, payload: "" }),
                        9 => Ok(Status { done: true, payload: "ok" }),
                        _ => Err(StoreError::UnexpectedResponse("flaky".into())),
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(status.payload, "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_at_deadline_and_stops_polling() {
        let calls = counter();
        let c = calls.clone();
        let poller = OperationPoller::new(PollerOptions::default());
        let start = Instant::now();

        let err = poller
            .wait("operations/4", move || {
                c.fetch_add(1, Ordering::SeqCst);
                async { Ok(Status { done: false, payload: "" }) }
            })
            .await
            .unwrap_err();

        let elapsed = start.elapsed();
        assert!(matches!(err, StoreError::OperationTimedOut { .. }));
        assert!(err.is_poller_failure());
        assert!(elapsed >= DEFAULT_DEADLINE);
        assert!(elapsed < DEFAULT_DEADLINE + DEFAULT_POLL_INTERVAL);

        let seen = calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(calls.load(Ordering::SeqCst), seen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_wait_stops_polling() {
        let calls = counter();
        let c = calls.clone();
        let poller = OperationPoller::default();

        let cancelled = tokio::time::timeout(
            Duration::from_secs(12),
            poller.wait("operations/6", move || {
                c.fetch_add(1, Ordering::SeqCst);
                async { Ok(Status { done: false, payload: "" }) }
            }),
        )
        .await;
        assert!(cancelled.is_err());

        let seen = calls.load(Ordering::SeqCst);
        assert_eq!(seen, 3);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(calls.load(Ordering::SeqCst), seen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_deadline() {
        let poller =
            OperationPoller::new(PollerOptions::default().with_deadline(Duration::from_secs(12)));
        let start = Instant::now();

        let err = poller
            .wait("operations/5", || async {
                Ok(Status { done: false, payload: "" })
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            StoreError::OperationTimedOut { deadline, .. } if deadline == Duration::from_secs(12)
        ));
        assert!(start.elapsed() < Duration::from_secs(15));
    }
}
