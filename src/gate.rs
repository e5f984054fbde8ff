//! Minimum-interval gate for rate-limited providers.
//!
//! [`RateGate`] answers one question: has enough wall-clock time passed
//! since the last recorded invocation to call the expensive provider
//! again. It holds no lock of its own; owners serialize access (the
//! manager wraps its global gate in a mutex so that two concurrent `auto`
//! starts cannot both see an elapsed threshold and double-invoke).

use std::time::{Duration, Instant};

/// Threshold timer over the last recorded invocation.
#[derive(Debug, Clone)]
pub struct RateGate {
    last_call: Option<Instant>,
    threshold: Duration,
}

impl RateGate {
    /// Create a gate with the given minimum interval between calls.
    pub fn new(threshold: Duration) -> Self {
        Self {
            last_call: None,
            threshold,
        }
    }

    /// True when the threshold has elapsed since the last recorded call.
    ///
    /// A gate that has never been stamped always reports true.
    pub fn threshold_out(&self, now: Instant) -> bool {
        match self.last_call {
            None => true,
            Some(last) => now.duration_since(last) >= self.threshold,
        }
    }

    /// Record an invocation moment.
    ///
    /// Called only on paths that actually perform a rate-limited call,
    /// never on mere readiness checks.
    pub fn record_call(&mut self, now: Instant) {
        self.last_call = Some(now);
    }

    /// The configured minimum interval.
    pub fn threshold(&self) -> Duration {
        self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_gate_is_open() {
        let gate = RateGate::new(Duration::from_secs(600));
        assert!(gate.threshold_out(Instant::now()));
    }

    #[test]
    fn closes_immediately_after_record() {
        let mut gate = RateGate::new(Duration::from_secs(600));
        let now = Instant::now();
        gate.record_call(now);
        assert!(!gate.threshold_out(now));
    }

    #[test]
    fn reopens_once_threshold_elapses() {
        let mut gate = RateGate::new(Duration::from_secs(600));
        let start = Instant::now();
        gate.record_call(start);
        assert!(!gate.threshold_out(start + Duration::from_secs(599)));
        assert!(gate.threshold_out(start + Duration::from_secs(600)));
        assert!(gate.threshold_out(start + Duration::from_secs(601)));
    }

    #[test]
    fn zero_threshold_is_always_open() {
        let mut gate = RateGate::new(Duration::ZERO);
        let now = Instant::now();
        gate.record_call(now);
        assert!(gate.threshold_out(now));
    }
}
