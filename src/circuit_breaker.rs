//! Per-hostname circuit breaker (§4.5).
//!
//! Records `hostname -> last failure timestamp`. A gateway is considered
//! "failed" for `FAILURE_WINDOW` after its last recorded failure. Also
//! tracks the set of gateways attempted for the *current* request so a
//! retry loop can report the hosts it tried when it finally gives up.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use url::Url;

pub const FAILURE_WINDOW: Duration = Duration::from_secs(2 * 60);

#[derive(Default)]
struct State {
    failures: HashMap<String, Instant>,
    attempted: HashSet<String>,
}

pub struct CircuitBreaker {
    state: Mutex<State>,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    fn hostname(gateway: &str) -> String {
        Url::parse(gateway)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
            .unwrap_or_else(|| gateway.to_string())
    }

    /// Record a failure against `gateway`, starting its 2-minute suppression.
    pub fn record_failure(&self, gateway: &str) {
        let host = Self::hostname(gateway);
        let mut state = self.state.lock().unwrap();
        state.failures.insert(host, Instant::now());
    }

    /// True if `gateway` failed within the last `FAILURE_WINDOW`.
    pub fn is_failed(&self, gateway: &str) -> bool {
        let host = Self::hostname(gateway);
        let state = self.state.lock().unwrap();
        match state.failures.get(&host) {
            Some(at) => at.elapsed() < FAILURE_WINDOW,
            None => false,
        }
    }

    /// Filter a gateway list down to the ones currently eligible.
    pub fn filter_eligible(&self, gateways: &[String]) -> Vec<String> {
        gateways
            .iter()
            .filter(|g| !self.is_failed(g))
            .cloned()
            .collect()
    }

    /// Mark `gateway` as attempted for the current request.
    pub fn record_attempt(&self, gateway: &str) {
        let mut state = self.state.lock().unwrap();
        state.attempted.insert(gateway.to_string());
    }

    /// Clear the attempted-gateway set; called at the start of each new
    /// request's first retry attempt (§4.6).
    pub fn clear_attempts(&self) {
        let mut state = self.state.lock().unwrap();
        state.attempted.clear();
    }

    /// The gateways attempted so far for the current request, for
    /// attaching to a final classified error.
    pub fn attempted_gateways(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.attempted.iter().cloned().collect()
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_gateway_is_excluded_for_two_minutes() {
        let breaker = CircuitBreaker::new();
        breaker.record_failure("https://g1.example.com");
        assert!(breaker.is_failed("https://g1.example.com"));

        let gateways = vec![
            "https://g1.example.com".to_string(),
            "https://g2.example.com".to_string(),
        ];
        let eligible = breaker.filter_eligible(&gateways);
        assert_eq!(eligible, vec!["https://g2.example.com".to_string()]);
    }

    #[test]
    fn unrecorded_gateway_is_eligible() {
        let breaker = CircuitBreaker::new();
        assert!(!breaker.is_failed("https://fresh.example.com"));
    }

    #[test]
    fn attempted_set_tracks_and_clears() {
        let breaker = CircuitBreaker::new();
        breaker.record_attempt("https://g1.example.com");
        breaker.record_attempt("https://g2.example.com");
        assert_eq!(breaker.attempted_gateways().len(), 2);
        breaker.clear_attempts();
        assert!(breaker.attempted_gateways().is_empty());
    }
}
