//! Confidence Calibration
//!
//! Maps raw fused scores to historical success probabilities with isotonic
//! regression (pool-adjacent-violators), and derives uncertainty statistics
//! over a result set.

use serde::{Deserialize, Serialize};

// ============================================================================
// ISOTONIC REGRESSION
// ============================================================================

/// A monotone score → probability mapping learned from outcome history
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct IsotonicCalibrator {
    /// Breakpoint scores, ascending
    scores: Vec<f64>,
    /// Fitted probabilities at each breakpoint, non-decreasing
    probabilities: Vec<f64>,
}

impl IsotonicCalibrator {
    /// Fit from `(raw_score, outcome)` observations.
    ///
    /// Pool-adjacent-violators: sort by score, average neighbouring pools
    /// until the fitted sequence is non-decreasing.
    pub fn fit(observations: &[(f64, bool)]) -> Self {
        if observations.is_empty() {
            return Self::default();
        }

        let mut sorted: Vec<(f64, f64)> = observations
            .iter()
            .map(|(score, outcome)| (*score, if *outcome { 1.0 } else { 0.0 }))
            .collect();
        sorted.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        // Each pool: (score_sum, value_sum, count)
        let mut pools: Vec<(f64, f64, f64)> = Vec::with_capacity(sorted.len());
        for (score, value) in sorted {
            pools.push((score, value, 1.0));
            while pools.len() >= 2 {
                let last = pools[pools.len() - 1];
                let prev = pools[pools.len() - 2];
                if last.1 / last.2 < prev.1 / prev.2 {
                    pools.pop();
                    pools.pop();
                    pools.push((prev.0 + last.0, prev.1 + last.1, prev.2 + last.2));
                } else {
                    break;
                }
            }
        }

        let scores = pools.iter().map(|(s, _, n)| s / n).collect();
        let probabilities = pools.iter().map(|(_, v, n)| v / n).collect();
        Self { scores, probabilities }
    }

    /// Calibrated probability for a raw score; identity-ish fallback when
    /// unfitted
    pub fn calibrate(&self, score: f64) -> f64 {
        if self.scores.is_empty() {
            return score.clamp(0.0, 1.0);
        }
        if score <= self.scores[0] {
            return self.probabilities[0];
        }
        if score >= *self.scores.last().expect("non-empty") {
            return *self.probabilities.last().expect("non-empty");
        }
        // Linear interpolation between surrounding breakpoints
        for window in 0..self.scores.len() - 1 {
            let (x0, x1) = (self.scores[window], self.scores[window + 1]);
            if score >= x0 && score <= x1 {
                let (y0, y1) = (self.probabilities[window], self.probabilities[window + 1]);
                let t = if (x1 - x0).abs() < 1e-12 { 0.0 } else { (score - x0) / (x1 - x0) };
                return y0 + t * (y1 - y0);
            }
        }
        score.clamp(0.0, 1.0)
    }

    /// Whether any observations were fitted
    pub fn is_fitted(&self) -> bool {
        !self.scores.is_empty()
    }
}

// ============================================================================
// UNCERTAINTY
// ============================================================================

/// Uncertainty over a ranked result set
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Uncertainty {
    /// Highest calibrated probability in the set
    pub confidence: f64,
    /// Shannon entropy of the normalized score distribution
    pub entropy: f64,
    /// Variance of the scores
    pub variance: f64,
}

/// Compute uncertainty from the calibrated scores of the returned packs
pub fn uncertainty(scores: &[f64]) -> Uncertainty {
    if scores.is_empty() {
        return Uncertainty {
            confidence: 0.0,
            entropy: 0.0,
            variance: 0.0,
        };
    }

    let confidence = scores.iter().copied().fold(0.0_f64, f64::max);

    let total: f64 = scores.iter().sum();
    let entropy = if total > 0.0 {
        -scores
            .iter()
            .filter(|s| **s > 0.0)
            .map(|s| {
                let p = s / total;
                p * p.ln()
            })
            .sum::<f64>()
    } else {
        0.0
    };

    let mean = total / scores.len() as f64;
    let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / scores.len() as f64;

    Uncertainty {
        confidence,
        entropy,
        variance,
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_produces_monotone_mapping() {
        // Noisy but broadly increasing outcomes
        let observations = vec![
            (0.1, false),
            (0.2, false),
            (0.3, true),
            (0.4, false),
            (0.5, true),
            (0.6, true),
            (0.7, false),
            (0.8, true),
            (0.9, true),
        ];
        let calibrator = IsotonicCalibrator::fit(&observations);
        assert!(calibrator.is_fitted());

        let mut last = 0.0;
        for step in 0..=10 {
            let p = calibrator.calibrate(step as f64 / 10.0);
            assert!(p >= last - 1e-9, "calibration must be non-decreasing");
            assert!((0.0..=1.0).contains(&p));
            last = p;
        }
    }

    #[test]
    fn test_unfitted_is_identity_clamped() {
        let calibrator = IsotonicCalibrator::default();
        assert_eq!(calibrator.calibrate(0.4), 0.4);
        assert_eq!(calibrator.calibrate(1.4), 1.0);
        assert_eq!(calibrator.calibrate(-0.1), 0.0);
    }

    #[test]
    fn test_all_failures_maps_low() {
        let observations: Vec<(f64, bool)> = (1..=10).map(|i| (i as f64 / 10.0, false)).collect();
        let calibrator = IsotonicCalibrator::fit(&observations);
        assert!(calibrator.calibrate(0.9) < 1e-9);
    }

    #[test]
    fn test_uncertainty_single_result() {
        let u = uncertainty(&[0.8]);
        assert_eq!(u.confidence, 0.8);
        assert!(u.entropy.abs() < 1e-9);
        assert!(u.variance.abs() < 1e-9);
    }

    #[test]
    fn test_uncertainty_uniform_has_max_entropy() {
        let uniform = uncertainty(&[0.5, 0.5, 0.5, 0.5]);
        let peaked = uncertainty(&[0.9, 0.05, 0.03, 0.02]);
        assert!(uniform.entropy > peaked.entropy);
        assert!((uniform.entropy - (4.0_f64).ln()).abs() < 1e-9);
    }

    #[test]
    fn test_uncertainty_empty() {
        let u = uncertainty(&[]);
        assert_eq!(u.confidence, 0.0);
        assert_eq!(u.entropy, 0.0);
    }
}
