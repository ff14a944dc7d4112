//! Higher-level navigation operations (§4.11): `next`, `back`, `roam`,
//! `reset`, `share`, `download`, with debounced error-triggered auto-advance.

use crate::deep_link::share_url;
use crate::history::History;
use crate::model::{Channel, TxMeta};
use std::time::{Duration, Instant};

pub const MIN_AUTO_ADVANCE_INTERVAL: Duration = Duration::from_secs(2);
pub const MAX_CONSECUTIVE_ERRORS: u32 = 5;
pub const QUIET_RESET_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationOutcome {
    Advanced,
    Bounced,
    Refused,
}

/// Tracks the error-triggered auto-advance debounce state described in
/// §4.11: a minimum interval between auto-advances, a hard cap on
/// consecutive errors, and a quiet-period reset of the error count.
pub struct NavigationController {
    history: History,
    last_auto_advance: Option<Instant>,
    last_error: Option<Instant>,
    consecutive_errors: u32,
}

impl NavigationController {
    pub fn new(history: History) -> Self {
        Self {
            history,
            last_auto_advance: None,
            last_error: None,
            consecutive_errors: 0,
        }
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut History {
        &mut self.history
    }

    fn maybe_reset_error_count(&mut self, now: Instant) {
        if let Some(last) = self.last_error {
            if now.duration_since(last) >= QUIET_RESET_INTERVAL {
                self.consecutive_errors = 0;
            }
        }
    }

    /// Record a fetch error and decide whether an auto-advance may proceed.
    pub fn record_error_and_try_advance(&mut self, now: Instant) -> NavigationOutcome {
        self.maybe_reset_error_count(now);
        self.last_error = Some(now);
        self.consecutive_errors += 1;

        if self.consecutive_errors > MAX_CONSECUTIVE_ERRORS {
            return NavigationOutcome::Refused;
        }

        if let Some(last) = self.last_auto_advance {
            if now.duration_since(last) < MIN_AUTO_ADVANCE_INTERVAL {
                return NavigationOutcome::Bounced;
            }
        }

        self.last_auto_advance = Some(now);
        NavigationOutcome::Advanced
    }

    /// Consumer-driven `next`: clears the error debounce state, advances
    /// history.
    pub fn next(&mut self, tx: TxMeta) {
        self.consecutive_errors = 0;
        self.history.add(tx);
    }

    pub fn back(&mut self) -> NavigationOutcome {
        if self.history.back().is_some() {
            NavigationOutcome::Advanced
        } else {
            NavigationOutcome::Bounced
        }
    }

    pub fn reset(&mut self) {
        self.history.reset();
        self.consecutive_errors = 0;
        self.last_auto_advance = None;
        self.last_error = None;
    }

    pub fn share(&self, base: &str, channel: &Channel, min_block: u64, max_block: u64) -> Option<String> {
        let tx = self.history.current()?;
        Some(share_url(base, &tx.id, channel, min_block, max_block))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Media, Recency};

    #[test]
    fn error_advance_is_debounced_within_minimum_interval() {
        let mut nav = NavigationController::new(History::new());
        let t0 = Instant::now();
        assert_eq!(nav.record_error_and_try_advance(t0), NavigationOutcome::Advanced);
        assert_eq!(nav.record_error_and_try_advance(t0), NavigationOutcome::Bounced);
    }

    #[test]
    fn error_advance_refuses_past_max_consecutive_errors() {
        let mut nav = NavigationController::new(History::new());
        let mut t = Instant::now();
        for _ in 0..=MAX_CONSECUTIVE_ERRORS {
            t += MIN_AUTO_ADVANCE_INTERVAL;
            nav.record_error_and_try_advance(t);
        }
        t += MIN_AUTO_ADVANCE_INTERVAL;
        assert_eq!(nav.record_error_and_try_advance(t), NavigationOutcome::Refused);
    }

    #[test]
    fn share_uses_current_history_entry() {
        let mut history = History::new();
        history.add(TxMeta::arns_placeholder("tx1".to_string()));
        let nav = NavigationController::new(history);
        let channel = Channel::new(Media::Images, Recency::New);
        let url = nav.share("https://roam.example.com/", &channel, 1, 2).unwrap();
        assert!(url.contains("txid=arns%3Atx1") || url.contains("txid=arns:tx1"));
    }
}
