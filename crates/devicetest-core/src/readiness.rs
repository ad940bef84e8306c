//! Polling a readiness probe with bounded exponential backoff.
//!
//! Both the server launcher and the session factory need to wait for a remote
//! collaborator to come up. Instead of sleeping for a fixed time they call
//! [`wait_until_ready`] with a probe that reports the actual state, and a
//! [`RetryPolicy`] that bounds how long and how often to ask.
//!
//! # Example
//!
//! ```no_run
//! use devicetest_core::readiness::{wait_until_ready, ProbeOutcome, RetryPolicy};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let policy = RetryPolicy::default();
//! let attempts = wait_until_ready(&policy, "example", || async {
//!     ProbeOutcome::Ready
//! })
//! .await?;
//! assert_eq!(attempts, 1);
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

/// How often and for how long to poll a readiness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay after the first failed probe.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Factor applied to the delay after each failed probe.
    pub backoff_factor: u32,
    /// Total time budget, measured from the first probe.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(2),
            backoff_factor: 2,
            timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// A policy with the given total budget and default pacing.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    /// The delay to wait after the `attempt`-th failed probe (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self
            .backoff_factor
            .max(1)
            .saturating_pow(attempt.saturating_sub(1));
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

/// What a single probe found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The collaborator is ready.
    Ready,
    /// Not ready yet; keep polling. The reason is logged.
    NotReady(String),
    /// Polling cannot succeed any more (e.g. the process exited).
    Abort(String),
}

/// Errors returned by [`wait_until_ready`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReadinessError {
    /// The probe did not report ready within the policy's timeout.
    #[error("{what} not ready after {attempts} attempts ({elapsed:?}): {last_reason}")]
    Timeout {
        what: String,
        attempts: u32,
        elapsed: Duration,
        last_reason: String,
    },

    /// The probe gave up.
    #[error("{what} will not become ready: {reason}")]
    Aborted { what: String, reason: String },
}

/// Polls `probe` until it reports [`ProbeOutcome::Ready`].
///
/// The probe always runs at least once. Each probe is cut off when the
/// remaining budget runs out, and counts as `NotReady` if it was. After each
/// `NotReady` the loop sleeps for [`RetryPolicy::delay_for`], clipped to the
/// remaining budget. A timeout too large to represent means no deadline.
///
/// Returns the number of probes made.
///
/// # Errors
///
/// - [`ReadinessError::Timeout`] if the budget runs out
/// - [`ReadinessError::Aborted`] if the probe returns [`ProbeOutcome::Abort`]
pub async fn wait_until_ready<F, Fut>(
    policy: &RetryPolicy,
    what: &str,
    mut probe: F,
) -> Result<u32, ReadinessError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ProbeOutcome>,
{
    let start = Instant::now();
    let deadline = start.checked_add(policy.timeout);
    let mut attempts = 0u32;

    loop {
        attempts = attempts.saturating_add(1);
        let outcome = match deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                match tokio::time::timeout(remaining, probe()).await {
                    Ok(outcome) => outcome,
                    Err(_) => ProbeOutcome::NotReady(format!(
                        "probe did not answer within {remaining:?}"
                    )),
                }
            }
            None => probe().await,
        };

        let reason = match outcome {
            ProbeOutcome::Ready => {
                debug!(what, attempts, elapsed = ?start.elapsed(), "ready");
                return Ok(attempts);
            }
            ProbeOutcome::Abort(reason) => {
                warn!(what, attempts, %reason, "readiness probe aborted");
                return Err(ReadinessError::Aborted {
                    what: what.to_string(),
                    reason,
                });
            }
            ProbeOutcome::NotReady(reason) => reason,
        };

        let now = Instant::now();
        let mut delay = policy.delay_for(attempts);
        if let Some(deadline) = deadline {
            if now >= deadline {
                return Err(ReadinessError::Timeout {
                    what: what.to_string(),
                    attempts,
                    elapsed: now - start,
                    last_reason: reason,
                });
            }
            delay = delay.min(deadline - now);
        }

        debug!(what, attempts, %reason, ?delay, "not ready, retrying");
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn default_policy_values() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.initial_delay, Duration::from_millis(250));
        assert_eq!(policy.max_delay, Duration::from_secs(2));
        assert_eq!(policy.backoff_factor, 2);
        assert_eq!(policy.timeout, Duration::from_secs(30));
    }

    #[test]
    fn delay_grows_then_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(250));
        assert_eq!(policy.delay_for(2), Duration::from_millis(500));
        assert_eq!(policy.delay_for(3), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(4), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(10), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(100), Duration::from_millis(2000));
    }

    #[test]
    fn zero_factor_behaves_like_constant_delay() {
        let policy = RetryPolicy {
            backoff_factor: 0,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_for(1), policy.delay_for(5));
    }

    #[tokio::test(start_paused = true)]
    async fn ready_on_first_probe() {
        let attempts = wait_until_ready(&RetryPolicy::default(), "server", || async {
            ProbeOutcome::Ready
        })
        .await
        .unwrap();
        assert_eq!(attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn ready_after_a_few_probes() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let attempts = wait_until_ready(&RetryPolicy::default(), "server", move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 3 {
                    ProbeOutcome::NotReady("connection refused".into())
                } else {
                    ProbeOutcome::Ready
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(attempts, 4);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_with_last_reason() {
        let policy = RetryPolicy::with_timeout(Duration::from_secs(3));
        let start = Instant::now();

        let err = wait_until_ready(&policy, "server", || async {
            ProbeOutcome::NotReady("connection refused".into())
        })
        .await
        .unwrap_err();

        match err {
            ReadinessError::Timeout {
                what,
                attempts,
                last_reason,
                ..
            } => {
                assert_eq!(what, "server");
                // 0 + .25 + .5 + 1 + 1.25 (clipped) = 3s
                assert_eq!(attempts, 5);
                assert_eq!(last_reason, "connection refused");
            }
            other => panic!("expected Timeout, got: {other:?}"),
        }
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn abort_stops_immediately() {
        let err = wait_until_ready(&RetryPolicy::default(), "server", || async {
            ProbeOutcome::Abort("process exited".into())
        })
        .await
        .unwrap_err();

        assert_eq!(
            err,
            ReadinessError::Aborted {
                what: "server".into(),
                reason: "process exited".into(),
            }
        );
        assert_eq!(err.to_string(), "server will not become ready: process exited");
    }

    #[tokio::test(start_paused = true)]
    async fn hung_check_is_cut_off_at_the_deadline() {
        let policy = RetryPolicy::with_timeout(Duration::from_secs(1));
        let start = Instant::now();

        let err = wait_until_ready(&policy, "server", || {
            std::future::pending::<ProbeOutcome>()
        })
        .await
        .unwrap_err();

        match err {
            ReadinessError::Timeout {
                attempts,
                last_reason,
                ..
            } => {
                assert_eq!(attempts, 1);
                assert!(last_reason.contains("did not answer"), "{last_reason}");
            }
            other => panic!("expected Timeout, got: {other:?}"),
        }
        assert_eq!(start.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn unrepresentable_timeout_waits_without_deadline() {
        let policy = RetryPolicy::with_timeout(Duration::from_secs(u64::MAX));
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let attempts = wait_until_ready(&policy, "server", move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    ProbeOutcome::NotReady("booting".into())
                } else {
                    ProbeOutcome::Ready
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_timeout_still_probes_once() {
        let policy = RetryPolicy::with_timeout(Duration::ZERO);
        let err = wait_until_ready(&policy, "session", || async {
            ProbeOutcome::NotReady("busy".into())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ReadinessError::Timeout { attempts: 1, .. }));
    }
}
