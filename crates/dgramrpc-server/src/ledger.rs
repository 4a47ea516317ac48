//! Dedup Ledger
//!
//! Server-side record of correlation ids that have already been admitted for
//! execution. It turns the client's "resend until answered" policy into
//! at-most-once execution, bounded by a retention window.
//!
//! # Guarantees
//!
//! - [`DedupLedger::check_and_record`] is one critical section: of any number
//!   of concurrent callers presenting the same id, exactly one is told
//!   [`Admission::FirstSeen`].
//! - The guarantee only holds inside the retention window. An id seen again
//!   after its entry expired is admitted and executed a second time.
//!
//! # Cleanup
//!
//! Expired entries are dropped in two ways: lazily, when the same id shows
//! up again, and by a single periodic sweep task per ledger
//! ([`DedupLedger::spawn_sweeper`]).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use dgramrpc_common::CorrelationId;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Configuration for the dedup ledger.
///
/// # Example
///
/// ```
/// use dgramrpc_server::LedgerConfig;
/// use std::time::Duration;
///
/// let config = LedgerConfig::default().with_retention(Duration::from_secs(60));
/// assert_eq!(config.retention, Duration::from_secs(60));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// How long an admitted id keeps suppressing duplicates
    pub retention: Duration,
    /// How often the background sweeper drops expired entries
    pub sweep_interval: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            retention: Duration::from_secs(300), // 5 minutes
            sweep_interval: Duration::from_secs(30),
        }
    }
}

impl LedgerConfig {
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_sweep_interval(mut self, sweep_interval: Duration) -> Self {
        self.sweep_interval = sweep_interval;
        self
    }
}

/// Result of presenting a correlation id to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// First sighting within the window; the caller must execute the request.
    FirstSeen,
    /// Already admitted within the window; the caller must not execute it.
    AlreadySeen,
}

impl Admission {
    pub fn is_first_seen(&self) -> bool {
        matches!(self, Self::FirstSeen)
    }
}

/// Time-bounded set of admitted correlation ids.
///
/// Owned by one server instance and shared with its dispatch tasks through
/// an `Arc`. Two servers in the same process never see each other's ids.
#[derive(Debug)]
pub struct DedupLedger {
    config: LedgerConfig,
    entries: Mutex<HashMap<CorrelationId, Instant>>,
}

impl DedupLedger {
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Atomically checks whether `id` was admitted within the retention
    /// window and records it if not.
    ///
    /// The entry is written before the request executes, so a second copy
    /// arriving while the first is still running is already a duplicate.
    pub fn check_and_record(&self, id: &CorrelationId, now: Instant) -> Admission {
        let mut entries = self.lock();

        match entries.get_mut(id) {
            Some(recorded_at) if !self.is_expired(*recorded_at, now) => Admission::AlreadySeen,
            Some(recorded_at) => {
                debug!("Correlation id {} expired from ledger, admitting again", id);
                *recorded_at = now;
                Admission::FirstSeen
            }
            None => {
                entries.insert(id.clone(), now);
                Admission::FirstSeen
            }
        }
    }

    /// Drops entries older than the retention window.
    ///
    /// # Returns
    ///
    /// The number of entries removed
    pub fn sweep(&self, now: Instant) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, recorded_at| !self.is_expired(*recorded_at, now));
        before - entries.len()
    }

    /// Returns the number of ids currently tracked, expired or not.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Starts the periodic sweep task for this ledger.
    ///
    /// The task exits when `shutdown` is cancelled.
    pub fn spawn_sweeper(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.sweep_interval);
            // The first tick completes immediately.
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        let removed = self.sweep(Instant::now());
                        if removed > 0 {
                            debug!("Ledger sweep removed {} entries, {} remain", removed, self.len());
                        }
                    }
                }
            }
        })
    }

    fn is_expired(&self, recorded_at: Instant, now: Instant) -> bool {
        now.saturating_duration_since(recorded_at) >= self.config.retention
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CorrelationId, Instant>> {
        // A panic while holding the lock cannot leave a half-written entry.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for DedupLedger {
    fn default() -> Self {
        Self::new(LedgerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn id(s: &str) -> CorrelationId {
        CorrelationId::new(s)
    }

    #[test]
    fn test_ledger_config_default() {
        let config = LedgerConfig::default();
        assert_eq!(config.retention, Duration::from_secs(300));
        assert_eq!(config.sweep_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_first_then_already_seen() {
        let ledger = DedupLedger::default();
        let now = Instant::now();

        assert_eq!(ledger.check_and_record(&id("a"), now), Admission::FirstSeen);
        assert_eq!(ledger.check_and_record(&id("a"), now), Admission::AlreadySeen);
        assert_eq!(ledger.check_and_record(&id("b"), now), Admission::FirstSeen);
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn test_still_seen_just_inside_window() {
        let ledger = DedupLedger::new(LedgerConfig::default().with_retention(Duration::from_secs(10)));
        let t0 = Instant::now();

        ledger.check_and_record(&id("a"), t0);
        let just_inside = t0 + Duration::from_secs(10) - Duration::from_millis(1);
        assert_eq!(ledger.check_and_record(&id("a"), just_inside), Admission::AlreadySeen);
    }

    /// At-most-once holds only within the retention window: an id resent
    /// after its entry expired is admitted, and therefore executed, again.
    #[test]
    fn test_id_reused_after_retention_is_executed_again() {
        let retention = Duration::from_secs(300);
        let ledger = DedupLedger::new(LedgerConfig::default().with_retention(retention));
        let t0 = Instant::now();

        assert_eq!(ledger.check_and_record(&id("a"), t0), Admission::FirstSeen);

        let after_window = t0 + retention + Duration::from_millis(1);
        assert_eq!(ledger.check_and_record(&id("a"), after_window), Admission::FirstSeen);

        // The refreshed entry suppresses duplicates for a new window.
        assert_eq!(ledger.check_and_record(&id("a"), after_window), Admission::AlreadySeen);
    }

    #[test]
    fn test_sweep_removes_only_expired_entries() {
        let ledger = DedupLedger::new(LedgerConfig::default().with_retention(Duration::from_secs(60)));
        let t0 = Instant::now();

        ledger.check_and_record(&id("old"), t0);
        ledger.check_and_record(&id("new"), t0 + Duration::from_secs(30));

        assert_eq!(ledger.sweep(t0 + Duration::from_secs(61)), 1);
        assert_eq!(ledger.len(), 1);
        assert_eq!(
            ledger.check_and_record(&id("new"), t0 + Duration::from_secs(61)),
            Admission::AlreadySeen
        );
        assert_eq!(
            ledger.check_and_record(&id("old"), t0 + Duration::from_secs(61)),
            Admission::FirstSeen
        );
    }

    #[test]
    fn test_sweep_on_empty_ledger() {
        let ledger = DedupLedger::default();
        assert_eq!(ledger.sweep(Instant::now()), 0);
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_concurrent_callers_only_one_first_seen() {
        let ledger = Arc::new(DedupLedger::default());
        let now = Instant::now();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let ledger = ledger.clone();
                thread::spawn(move || ledger.check_and_record(&id("race"), now))
            })
            .collect();

        let first_seen = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(Admission::is_first_seen)
            .count();

        assert_eq!(first_seen, 1);
    }

    #[test]
    fn test_separate_ledgers_do_not_interfere() {
        let a = DedupLedger::default();
        let b = DedupLedger::default();
        let now = Instant::now();

        assert_eq!(a.check_and_record(&id("x"), now), Admission::FirstSeen);
        assert_eq!(b.check_and_record(&id("x"), now), Admission::FirstSeen);
    }

    #[tokio::test]
    async fn test_sweeper_task_evicts_and_stops() {
        let ledger = Arc::new(DedupLedger::new(
            LedgerConfig::default()
                .with_retention(Duration::from_millis(20))
                .with_sweep_interval(Duration::from_millis(10)),
        ));
        ledger.check_and_record(&id("a"), Instant::now());

        let shutdown = CancellationToken::new();
        let handle = ledger.clone().spawn_sweeper(shutdown.clone());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(ledger.is_empty());

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper should stop on shutdown")
            .unwrap();
    }
}
