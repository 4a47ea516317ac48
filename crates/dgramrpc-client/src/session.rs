//! Call Session
//!
//! Bookkeeping for one logical call: a fixed correlation id, the request
//! encoded once, and the attempt counter that drives resends. The session
//! never touches the socket; [`crate::Client`] does the sending and waiting
//! and reports each attempt's outcome back here.

use std::time::Duration;

use dgramrpc_common::{CorrelationId, RpcError};

/// Configuration for resending a request that got no answer.
///
/// Attempt `n` (0-based) waits up to `per_attempt_timeout` for a reply. If
/// attempts remain, the session then sleeps `backoff(n)` before attempt
/// `n + 1`.
///
/// # Example
///
/// ```
/// use dgramrpc_client::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::default();
/// assert_eq!(policy.max_attempts, 4);
/// assert_eq!(policy.backoff(0), Duration::from_millis(500));
/// assert_eq!(policy.backoff(2), Duration::from_millis(1500));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    ///
    /// Default: 4 (one send plus three retries)
    pub max_attempts: u32,
    /// How long each attempt waits for a reply
    ///
    /// Default: 2s
    pub per_attempt_timeout: Duration,
    /// Unit of the linear backoff between attempts
    ///
    /// Default: 500ms
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            per_attempt_timeout: Duration::from_secs(2),
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Sets the total number of attempts. Values below 1 are raised to 1.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Sets the number of retries after the first attempt.
    pub fn with_retries(self, retries: u32) -> Self {
        self.with_max_attempts(retries.saturating_add(1))
    }

    pub fn with_per_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.per_attempt_timeout = timeout;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Delay after a failed attempt `attempt` (0-based): `(attempt + 1) × base_delay`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt.saturating_add(1))
    }

    /// Attempts actually made; never zero.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Longest a call can take before giving up: every attempt times out and
    /// every backoff between attempts is slept in full.
    pub fn worst_case(&self) -> Duration {
        let attempts = self.attempts();
        let waiting = self.per_attempt_timeout.saturating_mul(attempts);
        (0..attempts - 1).fold(waiting, |total, n| total.saturating_add(self.backoff(n)))
    }
}

/// One attempt handed out by [`CallSession::next_attempt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallAttempt {
    /// 0-based attempt index
    pub index: u32,
    /// How long this attempt waits for a reply
    pub timeout: Duration,
}

/// State of one logical call across its attempts.
///
/// Every attempt resends [`CallSession::payload`] unchanged, so the server
/// sees the same correlation id each time and can suppress re-execution.
#[derive(Debug)]
pub struct CallSession {
    correlation_id: CorrelationId,
    payload: Vec<u8>,
    policy: RetryPolicy,
    attempts_made: u32,
    last_error: Option<RpcError>,
}

impl CallSession {
    pub fn new(correlation_id: CorrelationId, payload: Vec<u8>, policy: RetryPolicy) -> Self {
        Self {
            correlation_id,
            payload,
            policy,
            attempts_made: 0,
            last_error: None,
        }
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    /// The encoded request sent by every attempt.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn attempts_made(&self) -> u32 {
        self.attempts_made
    }

    /// Starts the next attempt, or returns `None` once the policy's attempts
    /// are used up.
    pub fn next_attempt(&mut self) -> Option<CallAttempt> {
        if self.attempts_made >= self.policy.attempts() {
            return None;
        }

        let attempt = CallAttempt {
            index: self.attempts_made,
            timeout: self.policy.per_attempt_timeout,
        };
        self.attempts_made += 1;
        Some(attempt)
    }

    /// Records why the current attempt failed.
    ///
    /// Returns the delay to sleep before the next attempt, or `None` when
    /// this was the last one.
    pub fn record_failure(&mut self, error: RpcError) -> Option<Duration> {
        self.last_error = Some(error);

        if self.attempts_made < self.policy.attempts() {
            Some(self.policy.backoff(self.attempts_made.saturating_sub(1)))
        } else {
            None
        }
    }

    /// Consumes the session into the error reported when every attempt
    /// failed.
    pub fn into_exhausted(self) -> RpcError {
        let last_error = self.last_error.unwrap_or_else(|| {
            RpcError::Timeout(self.policy.per_attempt_timeout.as_millis() as u64)
        });

        RpcError::RetriesExhausted {
            attempts: self.attempts_made,
            last_error: Box::new(last_error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(policy: RetryPolicy) -> CallSession {
        CallSession::new(CorrelationId::new("s-1"), b"payload".to_vec(), policy)
    }

    #[test]
    fn test_retry_policy_default() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.per_attempt_timeout, Duration::from_secs(2));
        assert_eq!(policy.base_delay, Duration::from_millis(500));
    }

    #[test]
    fn test_backoff_is_linear_and_increasing() {
        let policy = RetryPolicy::default();
        let delays: Vec<Duration> = (0..4).map(|n| policy.backoff(n)).collect();

        assert_eq!(
            delays,
            vec![
                Duration::from_millis(500),
                Duration::from_millis(1000),
                Duration::from_millis(1500),
                Duration::from_millis(2000),
            ]
        );
        assert!(delays.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_zero_attempts_is_raised_to_one() {
        let policy = RetryPolicy::default().with_max_attempts(0);
        assert_eq!(policy.max_attempts, 1);

        let mut s = session(RetryPolicy { max_attempts: 0, ..RetryPolicy::default() });
        assert!(s.next_attempt().is_some());
        assert!(s.next_attempt().is_none());
    }

    #[test]
    fn test_with_retries_counts_first_attempt() {
        assert_eq!(RetryPolicy::default().with_retries(3).max_attempts, 4);
        assert_eq!(RetryPolicy::default().with_retries(0).max_attempts, 1);
    }

    #[test]
    fn test_worst_case() {
        let policy = RetryPolicy::default()
            .with_max_attempts(3)
            .with_per_attempt_timeout(Duration::from_millis(100))
            .with_base_delay(Duration::from_millis(10));

        // 3 × 100ms waiting + 10ms + 20ms backoff
        assert_eq!(policy.worst_case(), Duration::from_millis(330));
    }

    #[test]
    fn test_session_runs_out_of_attempts() {
        let policy = RetryPolicy::default()
            .with_max_attempts(3)
            .with_per_attempt_timeout(Duration::from_millis(100));
        let mut s = session(policy.clone());

        let mut delays = Vec::new();
        while let Some(attempt) = s.next_attempt() {
            assert_eq!(attempt.timeout, Duration::from_millis(100));
            delays.push(s.record_failure(RpcError::Timeout(100)));
        }

        assert_eq!(
            delays,
            vec![Some(policy.backoff(0)), Some(policy.backoff(1)), None]
        );

        match s.into_exhausted() {
            RpcError::RetriesExhausted { attempts, last_error } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last_error, RpcError::Timeout(100)));
            }
            other => panic!("expected RetriesExhausted, got {:?}", other),
        }
    }

    #[test]
    fn test_failure_before_any_attempt_does_not_underflow() {
        let policy = RetryPolicy::default();
        let mut s = session(policy.clone());

        assert_eq!(s.record_failure(RpcError::Timeout(1)), Some(policy.backoff(0)));
        assert_eq!(s.attempts_made(), 0);
    }

    #[test]
    fn test_last_error_is_most_recent() {
        let mut s = session(RetryPolicy::default().with_max_attempts(2));

        s.next_attempt();
        s.record_failure(RpcError::Transport("send failed".into()));
        s.next_attempt();
        s.record_failure(RpcError::Timeout(2000));

        let err = s.into_exhausted();
        assert_eq!(
            err.to_string(),
            "max retries exceeded after 2 attempts: timeout after 2000ms"
        );
    }

    #[test]
    fn test_payload_is_stable() {
        let mut s = session(RetryPolicy::default());
        let first = s.payload().to_vec();
        s.next_attempt();
        s.record_failure(RpcError::Timeout(1));
        s.next_attempt();
        assert_eq!(s.payload(), first.as_slice());
        assert_eq!(s.correlation_id().as_str(), "s-1");
    }
}
