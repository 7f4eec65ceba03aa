//! Aggregate statistics over simulated candidates.
//!
//! Measures how well the adaptive test recovers the true ability (bias and
//! RMSE of θ̂ − θ), how long tests run, how often the verdict matches the side
//! of the passing standard the candidate is truly on, and how unevenly the
//! bank is used.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{ItemId, TerminationReason, Verdict};
use crate::simulation::SimulatedCandidate;

/// Statistics across all simulated candidates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulationStats {
    pub candidates: usize,
    /// Mean of θ̂ − θ.
    pub bias: f64,
    /// Root mean squared error of θ̂.
    pub rmse: f64,
    pub mean_test_length: f64,
    pub min_test_length: u32,
    pub max_test_length: u32,
    /// Share of candidates whose verdict matches their true side of θ₀.
    /// An undetermined verdict counts as a misclassification.
    pub classification_accuracy: f64,
    pub verdicts: BTreeMap<Verdict, usize>,
    pub termination_reasons: BTreeMap<TerminationReason, usize>,
    /// Highest share of candidates that saw any single item.
    pub max_exposure_rate: f64,
    /// Bank items no candidate saw.
    pub unused_items: usize,
    /// Per true-ability breakdown, ordered by θ.
    pub per_ability: Vec<AbilityStats>,
}

/// Statistics for the candidates sharing one true ability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbilityStats {
    pub true_theta: f64,
    pub candidates: usize,
    pub mean_estimate: f64,
    pub bias: f64,
    pub rmse: f64,
    pub mean_test_length: f64,
    pub pass_rate: f64,
}

/// Compute aggregate statistics for candidates run against a bank of
/// `bank_size` items with passing standard `threshold`.
pub fn compute_simulation_stats(
    candidates: &[SimulatedCandidate],
    threshold: f64,
    bank_size: usize,
) -> SimulationStats {
    if candidates.is_empty() {
        return SimulationStats {
            unused_items: bank_size,
            ..SimulationStats::default()
        };
    }
    let n = candidates.len() as f64;

    let (bias, rmse) = error_moments(candidates.iter());
    let lengths = candidates.iter().map(|c| c.questions_answered);
    let mean_test_length = lengths.clone().map(f64::from).sum::<f64>() / n;

    let classified = candidates
        .iter()
        .filter(|c| c.result == expected_verdict(c.true_theta, threshold))
        .count();

    let mut verdicts = BTreeMap::new();
    let mut termination_reasons = BTreeMap::new();
    let mut exposure: BTreeMap<ItemId, usize> = BTreeMap::new();
    for c in candidates {
        *verdicts.entry(c.result).or_insert(0) += 1;
        *termination_reasons.entry(c.termination_reason).or_insert(0) += 1;
        for &item in &c.items {
            *exposure.entry(item).or_insert(0) += 1;
        }
    }
    let max_exposure_rate = exposure.values().copied().max().unwrap_or(0) as f64 / n;

    SimulationStats {
        candidates: candidates.len(),
        bias,
        rmse,
        mean_test_length,
        min_test_length: lengths.clone().min().unwrap_or(0),
        max_test_length: lengths.max().unwrap_or(0),
        classification_accuracy: classified as f64 / n,
        verdicts,
        termination_reasons,
        max_exposure_rate,
        unused_items: bank_size.saturating_sub(exposure.len()),
        per_ability: per_ability(candidates),
    }
}

/// The verdict a perfect test would reach for a candidate of ability `theta`.
pub fn expected_verdict(theta: f64, threshold: f64) -> Verdict {
    if theta > threshold {
        Verdict::Pass
    } else if theta < threshold {
        Verdict::Fail
    } else {
        Verdict::Undetermined
    }
}

fn error_moments<'a>(candidates: impl Iterator<Item = &'a SimulatedCandidate>) -> (f64, f64) {
    let (n, sum, sum_sq) = candidates.fold((0usize, 0.0, 0.0), |(n, s, sq), c| {
        let err = c.estimated_theta - c.true_theta;
        (n + 1, s + err, sq + err * err)
    });
    if n == 0 {
        return (0.0, 0.0);
    }
    let n = n as f64;
    (sum / n, (sum_sq / n).sqrt())
}

fn per_ability(candidates: &[SimulatedCandidate]) -> Vec<AbilityStats> {
    let mut groups: Vec<(f64, Vec<&SimulatedCandidate>)> = Vec::new();
    for c in candidates {
        match groups.iter_mut().find(|(theta, _)| *theta == c.true_theta) {
            Some((_, group)) => group.push(c),
            None => groups.push((c.true_theta, vec![c])),
        }
    }
    groups.sort_by(|a, b| a.0.total_cmp(&b.0));

    groups
        .into_iter()
        .map(|(true_theta, group)| {
            let n = group.len() as f64;
            let (bias, rmse) = error_moments(group.iter().copied());
            AbilityStats {
                true_theta,
                candidates: group.len(),
                mean_estimate: group.iter().map(|c| c.estimated_theta).sum::<f64>() / n,
                bias,
                rmse,
                mean_test_length: group
                    .iter()
                    .map(|c| f64::from(c.questions_answered))
                    .sum::<f64>()
                    / n,
                pass_rate: group.iter().filter(|c| c.result == Verdict::Pass).count() as f64 / n,
            }
        })
        .collect()
}
