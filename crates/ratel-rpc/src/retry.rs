// SPDX-FileCopyrightText: 2026 Ratel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Opt-in bounded retry around RPC calls.
//!
//! Budget accounting per failure class:
//! - `Returned` never consumes an attempt: the call waits for a worker to
//!   appear on the queue.
//! - Exceptions whose remote class is in the ignore-set never consume an
//!   attempt either.
//! - Logical task errors and programming errors are surfaced immediately;
//!   the remote already ran the task and said no.
//! - Everything else, including `Canceled`, timeouts, and `NoHandler`,
//!   consumes an attempt; on exhaustion the last error is returned.

use std::collections::HashSet;
use std::time::Duration;

use futures::Future;
use tracing::{debug, warn};

use crate::error::RpcError;

/// Retry knobs for [`call_retrying`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts before the last error is surfaced.
    pub attempts: u32,
    /// Wait between attempts.
    pub wait: Duration,
    /// Remote exception classes that never consume an attempt.
    pub ignore_classes: HashSet<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            wait: Duration::from_secs(5),
            ignore_classes: HashSet::new(),
        }
    }
}

impl RetryPolicy {
    /// Policy with the given ignored exception classes.
    pub fn with_ignored<I, S>(classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ignore_classes: classes.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }
}

/// Run `op` under the retry policy until success, a non-retryable failure,
/// or budget exhaustion.
pub async fn call_retrying<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, RpcError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RpcError>>,
{
    let mut budget = policy.attempts.max(1);

    loop {
        let error = match op().await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        match &error {
            RpcError::Returned => {
                debug!("call returned unrouted, waiting for a consumer");
            }
            RpcError::Exception { class, .. } if policy.ignore_classes.contains(class) => {
                debug!(class = class.as_str(), "ignored exception class, retrying");
            }
            RpcError::Task { .. } => {
                warn!(error = %error, "logical task failure, not retried");
                return Err(error);
            }
            RpcError::Programming(_) => {
                // Caller misuse: retrying would only repeat it.
                return Err(error);
            }
            _ => {
                budget -= 1;
                if budget == 0 {
                    warn!(error = %error, "retry budget exhausted");
                    return Err(error);
                }
                debug!(error = %error, remaining = budget, "call failed, retrying");
            }
        }

        tokio::time::sleep(policy.wait).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            attempts: 5,
            wait: Duration::from_millis(1),
            ignore_classes: ["Captcha".to_string()].into_iter().collect(),
        }
    }

    fn network_trouble() -> RpcError {
        RpcError::Exception {
            class: "NetworkTrouble".into(),
            message: "flaky".into(),
            kind: "unknown".into(),
            data: None,
        }
    }

    #[tokio::test]
    async fn retries_until_budget_exhausted() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), _> = call_retrying(&fast_policy(), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(network_trouble())
            }
        })
        .await;

        assert!(matches!(
            result,
            Err(RpcError::Exception { class, .. }) if class == "NetworkTrouble"
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 5, "five attempts, 5 s apart");
    }

    #[tokio::test]
    async fn success_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = call_retrying(&fast_policy(), move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(network_trouble())
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn ignored_class_does_not_consume_budget() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = call_retrying(&fast_policy(), move || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n < 8 {
                    // Far more failures than the budget allows, all ignored.
                    Err(RpcError::Exception {
                        class: "Captcha".into(),
                        message: "captcha needed".into(),
                        kind: "unknown".into(),
                        data: None,
                    })
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 9);
    }

    #[tokio::test]
    async fn returned_does_not_consume_budget() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = call_retrying(&fast_policy(), move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 7 {
                    Err(RpcError::Returned)
                } else {
                    Ok(())
                }
            }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 8);
    }

    #[tokio::test]
    async fn timeout_canceled_and_no_handler_consume_budget() {
        for error in [
            RpcError::Timeout(Duration::from_secs(30)),
            RpcError::Canceled,
            RpcError::NoHandler("no handler for 'x'".into()),
        ] {
            let calls = Arc::new(AtomicU32::new(0));
            let counter = calls.clone();
            let template = error.clone();

            let result: Result<(), _> = call_retrying(&fast_policy(), move || {
                let counter = counter.clone();
                let e = template.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(e)
                }
            })
            .await;

            assert!(result.is_err());
            assert_eq!(
                calls.load(Ordering::SeqCst),
                5,
                "full budget spent on {error}"
            );
        }
    }

    #[tokio::test]
    async fn timeout_can_recover_within_budget() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = call_retrying(&fast_policy(), move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(RpcError::Timeout(Duration::from_secs(1)))
                } else {
                    Ok("late")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "late");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn task_error_surfaces_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), _> = call_retrying(&fast_policy(), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(RpcError::Task {
                    message: "bad input".into(),
                })
            }
        })
        .await;

        assert!(matches!(result, Err(RpcError::Task { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
