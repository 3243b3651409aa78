//! Bounded retry and polling.
//!
//! Device open backs off on transient errors, and several teardown steps
//! poll an external indicator until it settles. Both are expressed as a
//! fixed budget of attempts with a fixed sleep between them.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::error::{Error, Result};

/// A fixed number of retries with a fixed interval between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub retries: u32,
    pub interval: Duration,
}

impl RetryPolicy {
    pub const fn new(retries: u32, interval: Duration) -> Self {
        RetryPolicy { retries, interval }
    }

    /// Total number of attempts the policy allows.
    pub fn attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }
}

/// Run `op` until it succeeds, fails permanently, or the budget runs out.
///
/// Only errors for which [`Error::is_transient`] holds are retried. When
/// the budget is exhausted the last transient error is returned.
pub async fn retry_transient<T, F, Fut>(policy: RetryPolicy, what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_transient() && attempt < policy.retries => {
                attempt += 1;
                debug!(what, attempt, "transient failure, retrying");
                tokio::time::sleep(policy.interval).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Poll `probe` until it reports `true`.
///
/// Returns `Ok(true)` once the probe succeeds, `Ok(false)` if it never did
/// within the budget. Probe errors end the poll immediately.
pub async fn poll_until<F, Fut>(policy: RetryPolicy, what: &str, mut probe: F) -> Result<bool>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    for attempt in 0..policy.attempts() {
        if attempt > 0 {
            tokio::time::sleep(policy.interval).await;
        }
        if probe().await? {
            return Ok(true);
        }
        debug!(what, attempt, "not settled yet");
    }
    Ok(false)
}

/// Like [`poll_until`], but a timeout becomes [`Error::Timeout`].
pub async fn poll_until_or_timeout<F, Fut>(
    policy: RetryPolicy,
    what: &'static str,
    probe: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    if poll_until(policy, what, probe).await? {
        Ok(())
    } else {
        Err(Error::Timeout(what))
    }
}
