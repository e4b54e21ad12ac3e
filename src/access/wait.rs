//! Bounded, cancellable polling.

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;

/// Poll interval and overall deadline for a readiness wait.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WaitPolicy {
    interval: Duration,
    timeout: Duration,
}

impl WaitPolicy {
    /// Builds a policy from an interval and a total timeout.
    #[must_use]
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Builds a policy that polls `count` times, `interval` apart.
    #[must_use]
    pub fn polls(interval: Duration, count: u32) -> Self {
        Self::new(interval, interval.saturating_mul(count))
    }

    /// Delay between probes.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Total time allowed.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Result of [`wait_until`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum WaitOutcome<T> {
    /// The probe produced a value.
    Ready(T),
    /// The deadline passed first.
    TimedOut,
    /// The token was cancelled first.
    Cancelled,
}

/// Calls `probe` until it yields `Some`, the deadline passes, or `cancel`
/// fires.
///
/// The probe runs at least once, and never again once the next poll would
/// land on or past the deadline. A timeout too large to represent means no
/// deadline. Probe errors end the wait immediately.
///
/// # Errors
///
/// Propagates the first error returned by `probe`.
pub async fn wait_until<T, E, F, Fut>(
    policy: WaitPolicy,
    cancel: &CancellationToken,
    mut probe: F,
) -> Result<WaitOutcome<T>, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    let deadline = Instant::now().checked_add(policy.timeout);

    loop {
        if cancel.is_cancelled() {
            return Ok(WaitOutcome::Cancelled);
        }
        if let Some(value) = probe().await? {
            return Ok(WaitOutcome::Ready(value));
        }
        if let Some(deadline) = deadline
            && Instant::now()
                .checked_add(policy.interval)
                .is_none_or(|next| next >= deadline)
        {
            return Ok(WaitOutcome::TimedOut);
        }

        tokio::select! {
            () = cancel.cancelled() => return Ok(WaitOutcome::Cancelled),
            () = sleep(policy.interval) => {}
        }
    }
}
