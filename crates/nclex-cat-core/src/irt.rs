//! Three-parameter logistic (3PL) item response functions.
//!
//! P(θ) = c + (1 − c) / (1 + exp(−a(θ − b)))

use crate::model::IrtParameters;

/// Probabilities are kept this far away from 0 and 1 before taking logs.
pub const EPSILON: f64 = 1e-10;

#[inline]
pub fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let exp_x = x.exp();
        exp_x / (1.0 + exp_x)
    }
}

/// Probability of a correct response at ability `theta`.
#[inline]
pub fn probability(params: &IrtParameters, theta: f64) -> f64 {
    let p_star = sigmoid(params.a * (theta - params.b));
    params.c + (1.0 - params.c) * p_star
}

/// Fisher information of one item at `theta` (Birnbaum's 3PL form).
///
/// I(θ) = a² · (Q/P) · ((P − c)/(1 − c))²
#[inline]
pub fn information(params: &IrtParameters, theta: f64) -> f64 {
    let p = probability(params, theta).clamp(EPSILON, 1.0 - EPSILON);
    let q = 1.0 - p;
    let ratio = (p - params.c) / (1.0 - params.c);
    params.a * params.a * (q / p) * ratio * ratio
}

/// Sum of item information over a set of administered items.
pub fn test_information<'a, I>(params: I, theta: f64) -> f64
where
    I: IntoIterator<Item = &'a IrtParameters>,
{
    params.into_iter().map(|p| information(p, theta)).sum()
}

/// Log-likelihood contribution of one scored response.
#[inline]
pub fn log_likelihood(params: &IrtParameters, theta: f64, correct: bool) -> f64 {
    let p = probability(params, theta).clamp(EPSILON, 1.0 - EPSILON);
    if correct {
        p.ln()
    } else {
        (1.0 - p).ln()
    }
}

/// First derivative of the log-likelihood of one response with respect to θ.
///
/// d/dθ ln L = a (u − P)(P − c) / (P (1 − c))
#[inline]
pub fn score(params: &IrtParameters, theta: f64, correct: bool) -> f64 {
    let p = probability(params, theta).clamp(EPSILON, 1.0 - EPSILON);
    let u = if correct { 1.0 } else { 0.0 };
    params.a * (u - p) * (p - params.c) / (p * (1.0 - params.c))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(a: f64, b: f64, c: f64) -> IrtParameters {
        IrtParameters { a, b, c }
    }

    #[test]
    fn probability_at_difficulty_is_midpoint_above_guessing() {
        let p = probability(&params(1.5, 0.7, 0.2), 0.7);
        assert!((p - 0.6).abs() < 1e-12);
    }

    #[test]
    fn probability_bounded_by_guessing_and_one() {
        let item = params(2.0, 0.0, 0.25);
        assert!(probability(&item, -50.0) >= 0.25);
        assert!(probability(&item, 50.0) <= 1.0);
        assert!(probability(&item, 1.0) > probability(&item, 0.0));
    }

    #[test]
    fn information_reduces_to_2pl_without_guessing() {
        let item = params(1.3, 0.5, 0.0);
        let theta = 1.1;
        let p = probability(&item, theta);
        let expected = 1.3 * 1.3 * p * (1.0 - p);
        assert!((information(&item, theta) - expected).abs() < 1e-12);
    }

    #[test]
    fn information_peaks_near_difficulty() {
        let item = params(1.2, 0.0, 0.0);
        assert!(information(&item, 0.0) > information(&item, 1.0));
        assert!(information(&item, 0.0) > information(&item, -1.0));
    }

    #[test]
    fn guessing_shifts_peak_above_difficulty() {
        let item = params(1.2, 0.0, 0.25);
        assert!(information(&item, 0.3) > information(&item, -0.3));
    }

    #[test]
    fn score_matches_numeric_derivative() {
        let item = params(1.4, -0.3, 0.2);
        let theta = 0.4;
        let h = 1e-6;
        for correct in [true, false] {
            let numeric = (log_likelihood(&item, theta + h, correct)
                - log_likelihood(&item, theta - h, correct))
                / (2.0 * h);
            assert!((score(&item, theta, correct) - numeric).abs() < 1e-5);
        }
    }

    #[test]
    fn sigmoid_is_stable_for_large_inputs() {
        assert!(sigmoid(800.0).is_finite());
        assert!(sigmoid(-800.0).is_finite());
        assert!((sigmoid(0.0) - 0.5).abs() < f64::EPSILON);
    }
}
