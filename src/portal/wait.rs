//! Bounded polled waits and the unbounded, cancellable human wait.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::error::{HarvestError, HarvestResult};
use crate::config::TimingConfig;

/// Interval/timeout pair for a polled condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl WaitPolicy {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    pub fn from_timing(timing: &TimingConfig) -> Self {
        Self::new(timing.poll_interval, timing.poll_timeout)
    }
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self::from_timing(&TimingConfig::default())
    }
}

/// Check until it yields `Some`, at `policy.interval`, for at most `policy.timeout`.
///
/// The check runs once immediately. Dropping the returned future stops the polling.
pub async fn poll_until<T, F, Fut>(policy: WaitPolicy, what: &str, mut check: F) -> HarvestResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = HarvestResult<Option<T>>>,
{
    let started = Instant::now();
    loop {
        if let Some(value) = check().await? {
            return Ok(value);
        }
        let waited = started.elapsed();
        if waited >= policy.timeout {
            return Err(HarvestError::Timeout {
                what: what.to_string(),
                waited,
            });
        }
        tokio::time::sleep(policy.interval.min(policy.timeout - waited)).await;
    }
}

/// Wait paced by a human (CAPTCHA, manual login). No timeout of its own;
/// the caller checks between pauses until the human is done, and the run's
/// cancellation token is the only way out besides success.
#[derive(Debug, Clone)]
pub struct ManualWait {
    interval: Duration,
    cancel: CancellationToken,
}

impl ManualWait {
    pub fn new(interval: Duration, cancel: CancellationToken) -> Self {
        Self { interval, cancel }
    }

    /// Run one check, abandoning it if the run is cancelled meanwhile.
    pub async fn guard<T, Fut>(&self, check: Fut) -> HarvestResult<T>
    where
        Fut: Future<Output = HarvestResult<T>>,
    {
        if self.cancel.is_cancelled() {
            return Err(HarvestError::Cancelled);
        }
        tokio::select! {
            _ = self.cancel.cancelled() => Err(HarvestError::Cancelled),
            result = check => result,
        }
    }

    /// Sleep one interval between two checks.
    pub async fn pause(&self) -> HarvestResult<()> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(HarvestError::Cancelled),
            _ = tokio::time::sleep(self.interval) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast() -> WaitPolicy {
        WaitPolicy::new(Duration::from_millis(5), Duration::from_millis(60))
    }

    #[tokio::test]
    async fn poll_returns_once_check_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let value = poll_until(fast(), "third check", move || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                Ok((n >= 3).then_some(n))
            }
        })
        .await
        .unwrap();
        assert_eq!(value, 3);
    }

    #[tokio::test]
    async fn poll_times_out() {
        let err = poll_until(fast(), "nothing", || async { Ok(None::<()>) })
            .await
            .unwrap_err();
        assert!(matches!(err, HarvestError::Timeout { ref what, .. } if what == "nothing"));
    }

    #[tokio::test]
    async fn manual_wait_stops_on_cancel() {
        let cancel = CancellationToken::new();
        let wait = ManualWait::new(Duration::from_millis(5), cancel.clone());
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            trigger.cancel();
        });

        let outcome: HarvestResult<()> = async {
            loop {
                wait.guard(async { Ok(()) }).await?;
                wait.pause().await?;
            }
        }
        .await;
        assert!(matches!(outcome, Err(HarvestError::Cancelled)));
    }

    #[tokio::test]
    async fn guard_abandons_a_hung_check() {
        let cancel = CancellationToken::new();
        let wait = ManualWait::new(Duration::from_millis(5), cancel.clone());
        cancel.cancel();
        let err = wait
            .guard(std::future::pending::<HarvestResult<()>>())
            .await
            .unwrap_err();
        assert!(matches!(err, HarvestError::Cancelled));
    }
}
