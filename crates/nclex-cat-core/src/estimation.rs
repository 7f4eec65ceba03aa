//! Ability estimation under the 3PL model.
//!
//! The primary estimate is the maximum-likelihood θ found by Fisher scoring.
//! When the likelihood has no interior maximum inside the θ bound (all
//! responses correct, all incorrect, or a maximum beyond the bound) the
//! estimator falls back to the expected a posteriori (EAP) mean under a
//! standard normal prior, integrated on a fixed grid.
//!
//! Either way the standard error is 1/√(Σ Iᵢ(θ)) at the final θ.

use serde::{Deserialize, Serialize};

use crate::config::CatConfig;
use crate::error::{CatError, Result};
use crate::irt;
use crate::model::IrtParameters;

/// Largest Fisher-scoring step, in logits.
const MAX_STEP: f64 = 1.0;

/// How an estimate was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimationMethod {
    /// No responses yet: the prior mean.
    Prior,
    MaximumLikelihood,
    PosteriorMean,
}

/// Point estimate of ability with its standard error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AbilityEstimate {
    pub theta: f64,
    pub standard_error: f64,
    pub method: EstimationMethod,
}

/// Maximum-likelihood / EAP hybrid estimator.
#[derive(Debug, Clone)]
pub struct AbilityEstimator {
    theta_bound: f64,
    se_floor: f64,
    se_ceiling: f64,
    max_iterations: u32,
    tolerance: f64,
    nodes: Vec<f64>,
    log_prior: Vec<f64>,
}

impl AbilityEstimator {
    pub fn new(config: &CatConfig) -> Self {
        let (nodes, log_prior) = quadrature_grid(config.theta_bound, config.quadrature_points);
        Self {
            theta_bound: config.theta_bound,
            se_floor: config.se_floor,
            se_ceiling: config.se_ceiling,
            max_iterations: config.max_newton_iterations,
            tolerance: config.newton_tolerance,
            nodes,
            log_prior,
        }
    }

    /// Estimate θ and its standard error from scored responses, in order.
    pub fn estimate(&self, responses: &[(IrtParameters, bool)]) -> Result<AbilityEstimate> {
        if responses.is_empty() {
            return Ok(AbilityEstimate {
                theta: 0.0,
                standard_error: self.se_ceiling,
                method: EstimationMethod::Prior,
            });
        }

        let n_correct = responses.iter().filter(|(_, correct)| *correct).count();
        let eap = self.posterior_mean(responses)?;

        let (theta, method) = if n_correct == 0 || n_correct == responses.len() {
            tracing::debug!(
                n = responses.len(),
                n_correct,
                "extreme response pattern, using posterior mean"
            );
            (eap, EstimationMethod::PosteriorMean)
        } else {
            match self.maximum_likelihood(responses, eap) {
                Some(mle) => (mle, EstimationMethod::MaximumLikelihood),
                None => {
                    tracing::warn!(
                        n = responses.len(),
                        "no interior likelihood maximum, falling back to posterior mean"
                    );
                    (eap, EstimationMethod::PosteriorMean)
                }
            }
        };

        if !theta.is_finite() {
            return Err(CatError::Estimation(format!(
                "non-finite ability estimate after {} responses",
                responses.len()
            )));
        }
        let standard_error = self.standard_error(responses, theta)?;

        Ok(AbilityEstimate {
            theta,
            standard_error,
            method,
        })
    }

    /// Standard error from the test information at `theta`, clamped to the
    /// configured floor and ceiling.
    ///
    /// Negligible information gives the ceiling. Information that is not
    /// finite means a malformed calibration and is an error.
    pub fn standard_error(&self, responses: &[(IrtParameters, bool)], theta: f64) -> Result<f64> {
        let info = irt::test_information(responses.iter().map(|(p, _)| p), theta);
        if !info.is_finite() {
            return Err(CatError::Estimation(format!(
                "test information is {info} at theta={theta:.3}"
            )));
        }
        if info <= irt::EPSILON {
            return Ok(self.se_ceiling);
        }
        Ok((1.0 / info.sqrt()).clamp(self.se_floor, self.se_ceiling))
    }

    /// Fisher scoring from `start`. Returns `None` when the iteration does not
    /// settle on an interior point of the θ range.
    fn maximum_likelihood(&self, responses: &[(IrtParameters, bool)], start: f64) -> Option<f64> {
        let bound = self.theta_bound;
        let mut theta = start;

        for iteration in 0..self.max_iterations {
            let (score, info) = responses.iter().fold((0.0, 0.0), |(s, i), (p, correct)| {
                (
                    s + irt::score(p, theta, *correct),
                    i + irt::information(p, theta),
                )
            });
            if info.is_nan() || info <= irt::EPSILON || !score.is_finite() {
                return None;
            }

            let step = (score / info).clamp(-MAX_STEP, MAX_STEP);
            theta = (theta + step).clamp(-bound, bound);

            if step.abs() < self.tolerance {
                tracing::debug!(iteration, theta, "fisher scoring converged");
                let interior = theta.abs() < bound - self.tolerance;
                return interior.then_some(theta);
            }
        }

        None
    }

    /// EAP estimate on the quadrature grid.
    fn posterior_mean(&self, responses: &[(IrtParameters, bool)]) -> Result<f64> {
        let log_posterior: Vec<f64> = self
            .nodes
            .iter()
            .zip(&self.log_prior)
            .map(|(&theta, &lp)| {
                lp + responses
                    .iter()
                    .map(|(p, correct)| irt::log_likelihood(p, theta, *correct))
                    .sum::<f64>()
            })
            .collect();

        let posterior = normalize_log_posterior(&log_posterior);
        let mean: f64 = posterior
            .iter()
            .zip(&self.nodes)
            .map(|(w, theta)| w * theta)
            .sum();

        if !mean.is_finite() {
            return Err(CatError::Estimation(format!(
                "posterior mean is not finite after {} responses",
                responses.len()
            )));
        }
        Ok(mean.clamp(-self.theta_bound, self.theta_bound))
    }
}

/// Evenly spaced nodes on `[-bound, bound]` with the standard normal log-density
/// (up to a constant) at each node.
fn quadrature_grid(bound: f64, n: usize) -> (Vec<f64>, Vec<f64>) {
    let n = n.max(3);
    let step = 2.0 * bound / (n - 1) as f64;
    let nodes: Vec<f64> = (0..n).map(|i| -bound + i as f64 * step).collect();
    let log_prior = nodes.iter().map(|x| -0.5 * x * x).collect();
    (nodes, log_prior)
}

/// Exponentiate and normalize log weights, subtracting the maximum first.
fn normalize_log_posterior(log_posterior: &[f64]) -> Vec<f64> {
    let max = log_posterior
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    let weights: Vec<f64> = log_posterior.iter().map(|lp| (lp - max).exp()).collect();
    let sum: f64 = weights.iter().sum();
    weights.into_iter().map(|w| w / sum).collect()
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    fn estimator() -> AbilityEstimator {
        AbilityEstimator::new(&CatConfig::default())
    }

    fn item(a: f64, b: f64, c: f64) -> IrtParameters {
        IrtParameters { a, b, c }
    }

    #[test]
    fn empty_responses_return_prior() {
        let est = estimator().estimate(&[]).unwrap();
        assert_eq!(est.theta, 0.0);
        assert_eq!(est.method, EstimationMethod::Prior);
        assert!(est.standard_error > 0.0);
    }

    #[test]
    fn all_correct_is_finite_and_positive() {
        let responses: Vec<_> = (0..40)
            .map(|i| (item(1.2, -1.0 + i as f64 * 0.1, 0.2), true))
            .collect();
        let est = estimator().estimate(&responses).unwrap();
        assert_eq!(est.method, EstimationMethod::PosteriorMean);
        assert!(est.theta.is_finite());
        assert!(est.theta > 1.0, "theta = {}", est.theta);
        assert!(est.theta <= 4.0);
        assert!(est.standard_error > 0.0);
    }

    #[test]
    fn all_incorrect_is_finite_and_negative() {
        let responses: Vec<_> = (0..40)
            .map(|i| (item(1.2, 1.0 - i as f64 * 0.1, 0.2), false))
            .collect();
        let est = estimator().estimate(&responses).unwrap();
        assert_eq!(est.method, EstimationMethod::PosteriorMean);
        assert!(est.theta < -1.0, "theta = {}", est.theta);
        assert!(est.theta >= -4.0);
    }

    #[test]
    fn mixed_pattern_uses_maximum_likelihood() {
        let responses = vec![
            (item(1.0, -1.0, 0.0), true),
            (item(1.0, -0.5, 0.0), true),
            (item(1.0, 0.0, 0.0), true),
            (item(1.0, 0.5, 0.0), false),
            (item(1.0, 1.0, 0.0), false),
        ];
        let est = estimator().estimate(&responses).unwrap();
        assert_eq!(est.method, EstimationMethod::MaximumLikelihood);
        // Solves sum(P) = 3 for these five items, which lands near 0.45.
        assert!(est.theta > 0.2 && est.theta < 0.8, "theta = {}", est.theta);
    }

    #[test]
    fn maximum_likelihood_matches_grid_search() {
        let responses = vec![
            (item(1.5, -0.8, 0.2), true),
            (item(0.9, 0.3, 0.15), false),
            (item(1.8, 0.1, 0.25), true),
            (item(1.1, 1.2, 0.2), false),
            (item(1.3, -0.2, 0.2), true),
            (item(0.8, 0.6, 0.1), false),
        ];
        let est = estimator().estimate(&responses).unwrap();
        assert_eq!(est.method, EstimationMethod::MaximumLikelihood);

        let ll = |theta: f64| -> f64 {
            responses
                .iter()
                .map(|(p, u)| irt::log_likelihood(p, theta, *u))
                .sum()
        };
        let best = (-4000..=4000)
            .map(|i| i as f64 / 1000.0)
            .max_by(|a, b| ll(*a).partial_cmp(&ll(*b)).unwrap())
            .unwrap();
        assert!((est.theta - best).abs() < 0.01, "{} vs {best}", est.theta);
    }

    #[test]
    fn mle_beyond_bound_falls_back_to_posterior() {
        // Correct on every hard item, wrong only on an extremely easy one:
        // the likelihood keeps rising past the bound.
        let mut responses: Vec<_> = (0..30).map(|_| (item(2.0, 3.5, 0.0), true)).collect();
        responses.push((item(0.3, -3.9, 0.0), false));
        let est = estimator().estimate(&responses).unwrap();
        assert_eq!(est.method, EstimationMethod::PosteriorMean);
        assert!(est.theta.abs() <= 4.0);
    }

    #[test]
    fn standard_error_shrinks_with_more_items() {
        let est = estimator();
        let short: Vec<_> = (0..10)
            .map(|i| (item(1.2, 0.0, 0.2), i % 2 == 0))
            .collect();
        let long: Vec<_> = (0..60)
            .map(|i| (item(1.2, 0.0, 0.2), i % 2 == 0))
            .collect();
        let se_short = est.estimate(&short).unwrap().standard_error;
        let se_long = est.estimate(&long).unwrap().standard_error;
        assert!(se_long < se_short);
    }

    #[test]
    fn recovers_true_ability() {
        let mut rng = StdRng::seed_from_u64(7);
        let true_theta = 1.0;
        let responses: Vec<_> = (0..150)
            .map(|i| {
                let p = item(1.5, -1.0 + (i % 40) as f64 * 0.1, 0.15);
                let correct = rng.gen::<f64>() < irt::probability(&p, true_theta);
                (p, correct)
            })
            .collect();
        let est = estimator().estimate(&responses).unwrap();
        assert!((est.theta - true_theta).abs() < 0.6, "theta = {}", est.theta);
    }

    #[test]
    fn bounded_for_random_patterns() {
        let mut rng = StdRng::seed_from_u64(11);
        let est = estimator();
        for _ in 0..200 {
            let n = rng.gen_range(1..60);
            let responses: Vec<_> = (0..n)
                .map(|_| {
                    let p = item(
                        rng.gen_range(0.3..2.5),
                        rng.gen_range(-3.5..3.5),
                        rng.gen_range(0.0..0.3),
                    );
                    (p, rng.gen_bool(0.5))
                })
                .collect();
            let e = est.estimate(&responses).unwrap();
            assert!(e.theta.is_finite());
            assert!((-4.0..=4.0).contains(&e.theta));
            assert!(e.standard_error > 0.0);
        }
    }

    #[test]
    fn certain_guessing_item_is_an_estimation_error() {
        let responses = vec![
            (item(1.0, 0.0, 1.0), true),
            (item(1.2, -0.5, 0.2), true),
            (item(1.2, 0.5, 0.2), false),
        ];
        let err = estimator().estimate(&responses).unwrap_err();
        assert!(matches!(err, CatError::Estimation(_)), "got {err:?}");
        assert!(estimator().standard_error(&responses, 0.0).is_err());
    }

    #[test]
    fn negligible_information_gives_ceiling() {
        let est = estimator();
        let se = est
            .standard_error(&[(item(1e-8, 0.0, 0.0), true)], 0.0)
            .unwrap();
        assert_eq!(se, CatConfig::default().se_ceiling);
    }

    #[test]
    fn normalized_posterior_sums_to_one() {
        let w = normalize_log_posterior(&[-1000.0, -1001.0, -999.5]);
        assert!((w.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }
}
