//! Fault injection for the dispatcher.
//!
//! Lets a server pretend to be slow so clients can be exercised against
//! timeouts, retries and duplicate suppression. Disabled by default.

use std::time::Duration;

use rand::Rng;

/// Random pre-dispatch delay.
///
/// With probability `probability`, a request sleeps for `delay` after passing
/// the dedup check and before its handler runs.
///
/// # Example
///
/// ```
/// use dgramrpc_server::FaultInjection;
/// use std::time::Duration;
///
/// // One request in five stalls for three seconds.
/// let fault = FaultInjection::new(0.2, Duration::from_secs(3));
/// assert!(fault.is_enabled());
/// assert!(fault.validate().is_ok());
///
/// assert!(!FaultInjection::disabled().is_enabled());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct FaultInjection {
    /// Chance in `[0, 1]` that a request is delayed
    pub probability: f64,
    /// How long a delayed request sleeps
    pub delay: Duration,
}

impl Default for FaultInjection {
    fn default() -> Self {
        Self::disabled()
    }
}

impl FaultInjection {
    pub fn new(probability: f64, delay: Duration) -> Self {
        Self { probability, delay }
    }

    pub fn disabled() -> Self {
        Self {
            probability: 0.0,
            delay: Duration::ZERO,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.probability > 0.0 && !self.delay.is_zero()
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the probability is outside `[0, 1]` or not a number.
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.probability) {
            return Err(format!(
                "fault probability must be between 0 and 1 (got {})",
                self.probability
            ));
        }
        Ok(())
    }

    /// Draws whether this request should be delayed, and for how long.
    pub fn roll(&self) -> Option<Duration> {
        if !self.is_enabled() {
            return None;
        }
        if rand::thread_rng().gen_bool(self.probability.clamp(0.0, 1.0)) {
            Some(self.delay)
        } else {
            None
        }
    }
}
