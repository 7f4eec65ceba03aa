//! Passing probability relative to the passing standard θ₀.

use serde::{Deserialize, Serialize};

use crate::error::{CatError, Result};
use crate::irt::sigmoid;
use crate::model::ConfidenceInterval;

/// Probability of passing with its confidence interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PassProbability {
    pub probability: f64,
    pub interval: ConfidenceInterval,
}

/// Maps (θ, SE) to P(pass) = 1 / (1 + exp(−(θ − θ₀))) and the interval
/// θ ± z·SE, with probability bounds taken through the same transform.
#[derive(Debug, Clone, Copy)]
pub struct PassingCalculator {
    pub threshold: f64,
    pub z: f64,
}

impl PassingCalculator {
    pub fn new(threshold: f64, z: f64) -> Self {
        Self { threshold, z }
    }

    pub fn pass_probability(&self, theta: f64, standard_error: f64) -> Result<PassProbability> {
        if !theta.is_finite() || !standard_error.is_finite() {
            return Err(CatError::Estimation(format!(
                "cannot compute passing probability from theta={theta}, se={standard_error}"
            )));
        }
        if standard_error < 0.0 {
            return Err(CatError::Estimation(format!(
                "negative standard error: {standard_error}"
            )));
        }

        let half_width = self.z * standard_error;
        let theta_lower = theta - half_width;
        let theta_upper = theta + half_width;

        let probability = sigmoid(theta - self.threshold);
        let interval = ConfidenceInterval {
            theta_lower,
            theta_upper,
            probability_lower: sigmoid(theta_lower - self.threshold),
            probability_upper: sigmoid(theta_upper - self.threshold),
        };

        if !probability.is_finite() {
            return Err(CatError::Estimation(format!(
                "passing probability is not finite for theta={theta}"
            )));
        }

        Ok(PassProbability {
            probability,
            interval,
        })
    }
}
