//! Stopping rule.
//!
//! After every scored response:
//! - stop once `max_items` have been answered;
//! - otherwise, once at least `min_items` have been answered, stop as soon as
//!   the confidence interval lies entirely above or entirely below θ₀;
//! - otherwise continue.

use crate::config::CatConfig;
use crate::model::{ConfidenceInterval, TerminationReason};
use crate::session::CatSession;

/// Outcome of evaluating the stopping rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopDecision {
    Continue,
    Stop(TerminationReason),
}

impl StopDecision {
    pub fn should_stop(&self) -> bool {
        matches!(self, StopDecision::Stop(_))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StoppingRule {
    pub min_items: u32,
    pub max_items: u32,
    pub threshold: f64,
}

impl StoppingRule {
    pub fn new(config: &CatConfig) -> Self {
        Self {
            min_items: config.min_items,
            max_items: config.max_items,
            threshold: config.passing_threshold,
        }
    }

    /// Apply the rule to a test that has `answered` scored responses and the
    /// given confidence interval.
    pub fn evaluate(&self, answered: u32, interval: &ConfidenceInterval) -> StopDecision {
        if answered >= self.max_items {
            StopDecision::Stop(TerminationReason::MaxItemsReached)
        } else if answered >= self.min_items && interval.excludes(self.threshold) {
            StopDecision::Stop(TerminationReason::ConfidenceResolved)
        } else {
            StopDecision::Continue
        }
    }

    /// Whether the rule says `session` should stop, judged only on its
    /// answered count and interval.
    ///
    /// The session's status plays no part. A session completed early by the
    /// user, by bank exhaustion or by an estimation failure reports `false`
    /// here while below `min_items`; its status is what says it is over.
    pub fn should_stop(&self, session: &CatSession) -> bool {
        self.evaluate(session.questions_answered(), &session.passing().interval)
            .should_stop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule() -> StoppingRule {
        StoppingRule::new(&CatConfig::default())
    }

    fn interval(lower: f64, upper: f64) -> ConfidenceInterval {
        ConfidenceInterval {
            theta_lower: lower,
            theta_upper: upper,
            probability_lower: 0.0,
            probability_upper: 1.0,
        }
    }

    #[test]
    fn never_stops_before_min_items() {
        let r = rule();
        let decisive = interval(3.5, 3.9);
        for answered in 0..75 {
            assert_eq!(r.evaluate(answered, &decisive), StopDecision::Continue);
        }
    }

    #[test]
    fn stops_when_interval_clears_threshold() {
        let r = rule();
        assert_eq!(
            r.evaluate(75, &interval(0.1, 0.9)),
            StopDecision::Stop(TerminationReason::ConfidenceResolved)
        );
        assert_eq!(
            r.evaluate(80, &interval(-0.9, -0.05)),
            StopDecision::Stop(TerminationReason::ConfidenceResolved)
        );
    }

    #[test]
    fn continues_while_interval_straddles_threshold() {
        let r = rule();
        assert_eq!(r.evaluate(100, &interval(-0.2, 0.3)), StopDecision::Continue);
        assert_eq!(r.evaluate(149, &interval(-0.2, 0.3)), StopDecision::Continue);
    }

    #[test]
    fn hard_cap_stops_regardless_of_interval() {
        let r = rule();
        assert_eq!(
            r.evaluate(150, &interval(-0.2, 0.3)),
            StopDecision::Stop(TerminationReason::MaxItemsReached)
        );
        assert_eq!(
            r.evaluate(150, &interval(1.0, 2.0)),
            StopDecision::Stop(TerminationReason::MaxItemsReached)
        );
    }

    #[test]
    fn boundary_touching_threshold_does_not_stop() {
        let r = rule();
        assert_eq!(r.evaluate(90, &interval(0.0, 0.8)), StopDecision::Continue);
    }
}
