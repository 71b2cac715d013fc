//! Bounded retries for replication connections.
//!
//! One [`Backoff`] budget covers both failed opens and connections that drop
//! before the stream makes progress, so a server that keeps accepting and then
//! killing the connection still exhausts `max_attempts`.

use std::time::Duration;

use tracing::{error, info, warn};

use crate::error::StreamError;
use crate::frame::SourceError;
use crate::position::StreamPosition;
use crate::source::{BinlogConnector, FrameSource};

/// Exponential backoff between connection attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after `delay`, capped at `max_delay`.
    ///
    /// A multiplier below one (or NaN) keeps the delay constant.
    pub fn next_delay(&self, delay: Duration) -> Duration {
        let grown = delay.as_secs_f64() * self.multiplier.max(1.0);
        Duration::try_from_secs_f64(grown)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }
}

/// Failed attempts since the stream last made progress.
#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    policy: RetryPolicy,
    failures: u32,
    delay: Duration,
}

impl Backoff {
    pub(crate) fn new(policy: RetryPolicy) -> Self {
        let delay = policy.initial_delay;
        Self {
            policy,
            failures: 0,
            delay,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.failures = 0;
        self.delay = self.policy.initial_delay;
    }

    pub(crate) fn failures(&self) -> u32 {
        self.failures
    }

    pub(crate) fn max_attempts(&self) -> u32 {
        self.policy.max_attempts.max(1)
    }

    /// Count a failed attempt. Returns how long to wait before the next one,
    /// or `None` once `max_attempts` attempts have failed.
    pub(crate) fn on_failure(&mut self) -> Option<Duration> {
        self.failures = self.failures.saturating_add(1);
        if self.failures >= self.max_attempts() {
            return None;
        }
        let delay = self.delay;
        self.delay = self.policy.next_delay(delay);
        Some(delay)
    }
}

/// Open a frame source at `from`, retrying transport failures against `backoff`.
///
/// Rejections fail immediately with [`StreamError::Connection`]. A successful
/// open does not reset `backoff`; the caller does that once the stream moves.
pub(crate) async fn open_with_retry<C>(
    connector: &C,
    from: &StreamPosition,
    backoff: &mut Backoff,
) -> Result<Box<dyn FrameSource>, StreamError>
where
    C: BinlogConnector + ?Sized,
{
    loop {
        match connector.open(from).await {
            Ok(source) => {
                if backoff.failures() > 0 {
                    info!(
                        "Replication connection at {} opened after {} failed attempts",
                        from,
                        backoff.failures()
                    );
                }
                return Ok(source);
            }
            Err(SourceError::Transport(e)) => {
                let retry_in = backoff.on_failure();
                let attempt = backoff.failures();
                match retry_in {
                    Some(delay) => {
                        warn!(
                            "Replication connection attempt {}/{} at {} failed: {}. Retrying in {:?}",
                            attempt,
                            backoff.max_attempts(),
                            from,
                            e,
                            delay
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        error!(
                            "Giving up on replication connection at {} after {} attempts: {}",
                            from, attempt, e
                        );
                        return Err(StreamError::Connection(format!(
                            "failed to open replication connection at {from} after {attempt} attempts: {e}"
                        )));
                    }
                }
            }
            Err(SourceError::Rejected(e)) => {
                error!("Replication connection at {} rejected: {}", from, e);
                return Err(StreamError::Connection(e));
            }
            Err(SourceError::Decode(e)) => return Err(StreamError::ProtocolDecode(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 10);
        assert_eq!(policy.initial_delay, Duration::from_millis(500));
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy::default()
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5));
        let mut delay = policy.initial_delay;
        let mut seen = Vec::new();
        for _ in 0..5 {
            delay = policy.next_delay(delay);
            seen.push(delay.as_secs());
        }
        assert_eq!(seen, vec![2, 4, 5, 5, 5]);
    }

    #[test]
    fn test_huge_multiplier_is_capped_instead_of_overflowing() {
        let mut policy = RetryPolicy::default().with_max_delay(Duration::from_secs(30));
        policy.multiplier = 1e300;
        assert_eq!(policy.next_delay(Duration::from_secs(1)), Duration::from_secs(30));

        policy.multiplier = f64::INFINITY;
        assert_eq!(policy.next_delay(Duration::from_secs(1)), Duration::from_secs(30));

        policy.multiplier = f64::NAN;
        assert_eq!(policy.next_delay(Duration::from_secs(1)), Duration::from_secs(1));
    }

    #[test]
    fn test_backoff_budget_counts_every_failure_until_reset() {
        let policy = RetryPolicy::default()
            .with_max_attempts(3)
            .with_initial_delay(Duration::from_millis(10));
        let mut backoff = Backoff::new(policy);

        assert_eq!(backoff.on_failure(), Some(Duration::from_millis(10)));
        assert_eq!(backoff.on_failure(), Some(Duration::from_millis(20)));
        assert_eq!(backoff.on_failure(), None);
        assert_eq!(backoff.failures(), 3);

        backoff.reset();
        assert_eq!(backoff.failures(), 0);
        assert_eq!(backoff.on_failure(), Some(Duration::from_millis(10)));
    }

    #[test]
    fn test_zero_max_attempts_allows_a_single_attempt() {
        let mut backoff = Backoff::new(RetryPolicy::default().with_max_attempts(0));
        assert_eq!(backoff.on_failure(), None);
    }
}
