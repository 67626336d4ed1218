//! Convergence polling.
//!
//! The gateway writes audit events asynchronously and the origin server
//! indexes new resources with some lag, so most post-conditions have to be
//! observed repeatedly until they hold. [`poll_until`] samples backend state
//! on a fixed interval and gives up once the next sample would land at or
//! past the deadline.
//!
//! # Timing
//!
//! With `deadline = 10s` and `interval = 5s` the poller samples at `t=0` and
//! `t=5`; a third sample would fall on the deadline itself, so the poll fails
//! after the second one without sleeping again.
//!
//! # Errors
//!
//! Errors returned by the observe callback abort the poll immediately. The
//! poller never retries a failed observation; only an observation that
//! succeeds but does not satisfy the condition leads to another attempt.

use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{VerifyError, VerifyResult};

/// Deadline and sampling interval for one convergence condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    deadline: Duration,
    interval: Duration,
}

impl PollPolicy {
    /// Resource-count convergence: 300s deadline, 10s interval.
    pub const RESOURCE_COUNT: PollPolicy = PollPolicy {
        deadline: Duration::from_secs(300),
        interval: Duration::from_secs(10),
    };

    /// AuditEvent-count convergence: 300s deadline, 5s interval.
    pub const AUDIT_EVENT_COUNT: PollPolicy = PollPolicy {
        deadline: Duration::from_secs(300),
        interval: Duration::from_secs(5),
    };

    /// Creates a policy, rejecting zero durations and intervals that are not
    /// strictly shorter than the deadline.
    pub fn new(deadline: Duration, interval: Duration) -> VerifyResult<Self> {
        if deadline.is_zero() {
            return Err(VerifyError::InvalidPollPolicy {
                reason: "deadline must be greater than zero".to_string(),
            });
        }
        if interval.is_zero() {
            return Err(VerifyError::InvalidPollPolicy {
                reason: "interval must be greater than zero".to_string(),
            });
        }
        if interval >= deadline {
            return Err(VerifyError::InvalidPollPolicy {
                reason: format!(
                    "interval ({}s) must be shorter than deadline ({}s)",
                    interval.as_secs_f64(),
                    deadline.as_secs_f64()
                ),
            });
        }
        Ok(Self { deadline, interval })
    }

    /// Convenience constructor from whole seconds.
    pub fn from_secs(deadline_secs: u64, interval_secs: u64) -> VerifyResult<Self> {
        Self::new(
            Duration::from_secs(deadline_secs),
            Duration::from_secs(interval_secs),
        )
    }

    /// Total wall-clock budget.
    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Pause between samples.
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

/// Repeatedly observes backend state until `is_satisfied` holds.
///
/// Returns the first observed state that satisfies the condition. If the
/// deadline is exhausted, fails with [`VerifyError::ConvergenceTimeout`]
/// carrying the last observed state and `expectation`. Errors from `observe`
/// are propagated as-is on the attempt that produced them.
///
/// Any side effects inside `observe` (such as refreshing an auth token before
/// the backend read) run once per attempt.
pub async fn poll_until<T, F, Fut, P>(
    policy: &PollPolicy,
    expectation: &str,
    mut observe: F,
    mut is_satisfied: P,
) -> VerifyResult<T>
where
    T: Debug,
    F: FnMut() -> Fut,
    Fut: Future<Output = VerifyResult<T>>,
    P: FnMut(&T) -> bool,
{
    let started = Instant::now();
    let mut attempts: u32 = 0;

    loop {
        let observed = observe().await?;
        attempts += 1;

        if is_satisfied(&observed) {
            debug!(
                expectation,
                attempts,
                elapsed_secs = started.elapsed().as_secs(),
                "Condition satisfied"
            );
            return Ok(observed);
        }

        let elapsed = started.elapsed();
        if elapsed + policy.interval >= policy.deadline {
            warn!(
                expectation,
                attempts,
                last_observed = ?observed,
                deadline_secs = policy.deadline.as_secs(),
                "Condition not reached before deadline"
            );
            return Err(VerifyError::ConvergenceTimeout {
                expectation: expectation.to_string(),
                last_observed: format!("{:?}", observed),
                attempts,
                waited_secs: elapsed.as_secs(),
            });
        }

        info!(
            expectation,
            attempts,
            last_observed = ?observed,
            elapsed_secs = elapsed.as_secs(),
            "Waiting for condition"
        );
        tokio::time::sleep(policy.interval).await;
    }
}
