//! Bounded retry for propagation-sensitive operations.
//!
//! ARM is eventually consistent: a role assignment for a principal created a
//! few seconds earlier can fail with `PrincipalNotFound` until the directory
//! catches up. [`RetryInvoker`] repeats such an operation on a fixed cadence
//! until it succeeds or the attempt budget runs out, then waits a settle delay
//! so dependent operations see the write.
//!
//! Every failure is treated as retryable. The invoker does not try to tell a
//! propagation error from a permanent one.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Timing and budget for a retried operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay between consecutive attempts.
    pub interval: Duration,
    /// Maximum number of attempts. `0` is treated as `1`.
    pub max_attempts: u32,
    /// Delay after a success before it is reported.
    pub settle_delay: Duration,
}

impl RetryPolicy {
    /// Policy for role assignments: every 5s, 36 attempts (about 3 minutes), 5s settle.
    pub const ROLE_ASSIGNMENT: Self = Self::new(Duration::from_secs(5), 36, Duration::from_secs(5));

    /// Creates a new retry policy.
    #[must_use]
    pub const fn new(interval: Duration, max_attempts: u32, settle_delay: Duration) -> Self {
        Self {
            interval,
            max_attempts,
            settle_delay,
        }
    }

    /// Returns the attempt budget, never less than one.
    #[must_use]
    pub const fn attempt_budget(&self) -> u32 {
        if self.max_attempts == 0 { 1 } else { self.max_attempts }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::ROLE_ASSIGNMENT
    }
}

/// Per-invocation attempt bookkeeping.
#[derive(Debug)]
struct RetryState {
    attempt: u32,
    max_attempts: u32,
    interval: Duration,
}

impl RetryState {
    const fn new(policy: &RetryPolicy) -> Self {
        Self {
            attempt: 0,
            max_attempts: policy.attempt_budget(),
            interval: policy.interval,
        }
    }

    const fn begin_attempt(&mut self) -> u32 {
        self.attempt += 1;
        self.attempt
    }

    const fn exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}

/// Executes an operation until it succeeds or the retry budget is spent.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryInvoker {
    policy: RetryPolicy,
}

impl RetryInvoker {
    /// Creates an invoker for the given policy.
    #[must_use]
    pub const fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Returns the policy this invoker applies.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Runs `operation` until it succeeds or `max_attempts` is reached.
    ///
    /// On success, sleeps `settle_delay` before returning the value.
    ///
    /// # Errors
    ///
    /// Returns the error of the last attempt once the budget is exhausted.
    pub async fn invoke<T, E, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut state = RetryState::new(&self.policy);

        loop {
            let attempt = state.begin_attempt();

            match operation().await {
                Ok(value) => {
                    info!("{label} succeeded on attempt {attempt}/{}", state.max_attempts);
                    if !self.policy.settle_delay.is_zero() {
                        debug!(
                            "Waiting {:?} for {label} to propagate",
                            self.policy.settle_delay
                        );
                        tokio::time::sleep(self.policy.settle_delay).await;
                    }
                    return Ok(value);
                }
                Err(err) if state.exhausted() => {
                    warn!("{label} failed after {attempt} attempts: {err}");
                    return Err(err);
                }
                Err(err) => {
                    debug!(
                        "{label} attempt {attempt}/{} failed, retrying in {:?}: {err}",
                        state.max_attempts, state.interval
                    );
                    tokio::time::sleep(state.interval).await;
                }
            }
        }
    }

    /// Number of attempts `invoke` makes before giving up.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.policy.attempt_budget()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        let calls = AtomicU32::new(0);
        let invoker = RetryInvoker::new(RetryPolicy::new(Duration::ZERO, 3, Duration::ZERO));

        let result: Result<(), String> = invoker
            .invoke("always failing", || async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Err(format!("failure {n}"))
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(result.unwrap_err(), "failure 3");
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_waits_for_settle_delay() {
        let calls = AtomicU32::new(0);
        let invoker = RetryInvoker::new(RetryPolicy::new(
            Duration::from_secs(1),
            5,
            Duration::from_secs(5),
        ));
        let start = Instant::now();

        let result: Result<u32, String> = invoker
            .invoke("flaky", || async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 { Err(format!("failure {n}")) } else { Ok(n) }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Two 1s intervals before the third attempt, then the 5s settle.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(7), "returned after {elapsed:?}");
        assert!(elapsed < Duration::from_secs(8), "returned after {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_success_skips_interval() {
        let invoker = RetryInvoker::new(RetryPolicy::new(
            Duration::from_secs(30),
            3,
            Duration::ZERO,
        ));
        let start = Instant::now();

        let result: Result<&str, String> = invoker.invoke("instant", || async { Ok("done") }).await;

        assert_eq!(result.unwrap(), "done");
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_zero_budget_still_attempts_once() {
        let calls = AtomicU32::new(0);
        let invoker = RetryInvoker::new(RetryPolicy::new(Duration::ZERO, 0, Duration::ZERO));

        let result: Result<(), &str> = invoker
            .invoke("single", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("nope")
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(invoker.max_attempts(), 1);
    }

    #[test]
    fn test_role_assignment_budget() {
        let policy = RetryPolicy::ROLE_ASSIGNMENT;
        assert_eq!(policy.interval * policy.max_attempts, Duration::from_secs(180));
    }
}
