//! Recovery Learner
//!
//! Thompson Sampling over Beta posteriors, one arm per
//! (strategy, degradation-kind) pair. Arms flagged as anti-patterns
//! (failure rate > 0.8 over ≥ 10 trials) have their samples multiplied by
//! 0.05 so they are still explorable but rarely chosen.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Beta, Distribution};
use serde::{Deserialize, Serialize};

use super::monitor::DegradationKind;
use super::recovery::RecoveryStrategy;

// ============================================================================
// STATE
// ============================================================================

/// Beta posterior and bookkeeping for one (strategy, kind) arm
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ArmStats {
    /// Beta α; starts at the uniform prior 1.0
    pub alpha: f64,
    /// Beta β; starts at the uniform prior 1.0
    pub beta: f64,
    /// Exponential moving average of observed fitness deltas
    pub mean_fitness_delta: f64,
    /// Observations recorded
    pub total_trials: u64,
}

impl Default for ArmStats {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            beta: 1.0,
            mean_fitness_delta: 0.0,
            total_trials: 0,
        }
    }
}

impl ArmStats {
    /// Posterior mean `α / (α + β)`
    pub fn success_probability(&self) -> f64 {
        self.alpha / (self.alpha + self.beta)
    }

    /// Observed failure rate (failures over trials)
    pub fn failure_rate(&self) -> f64 {
        if self.total_trials == 0 {
            0.0
        } else {
            (self.beta - 1.0) / self.total_trials as f64
        }
    }
}

/// Persisted learner state; serde round-trips losslessly
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LearnerState {
    /// Format version
    pub version: u32,
    /// `"strategy::kind"` → arm stats
    pub stats: HashMap<String, ArmStats>,
    /// First created
    pub created_at: DateTime<Utc>,
    /// Last updated
    pub updated_at: DateTime<Utc>,
}

impl Default for LearnerState {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            version: 1,
            stats: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

fn arm_key(strategy: RecoveryStrategy, kind: DegradationKind) -> String {
    format!("{}::{}", strategy.as_str(), kind.as_str())
}

// ============================================================================
// LEARNER
// ============================================================================

/// Thompson Sampling strategy selector with persistent Beta posteriors
pub struct ThompsonLearner {
    state: LearnerState,
    rng: StdRng,
}

impl Default for ThompsonLearner {
    fn default() -> Self {
        Self::new()
    }
}

impl ThompsonLearner {
    /// Fresh learner with uniform priors
    pub fn new() -> Self {
        Self {
            state: LearnerState::default(),
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic learner for tests
    pub fn with_seed(seed: u64) -> Self {
        Self {
            state: LearnerState::default(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Restore from persisted state
    pub fn from_state(state: LearnerState) -> Self {
        Self {
            state,
            rng: StdRng::from_entropy(),
        }
    }

    /// Current state, for persistence
    pub fn state(&self) -> &LearnerState {
        &self.state
    }

    /// Stats for one arm, if it has ever been touched
    pub fn arm(&self, strategy: RecoveryStrategy, kind: DegradationKind) -> Option<&ArmStats> {
        self.state.stats.get(&arm_key(strategy, kind))
    }

    /// Select one strategy for a degradation kind via Thompson Sampling.
    ///
    /// Each candidate's Beta posterior is sampled; anti-pattern arms have
    /// their sample multiplied by 0.05 before the argmax.
    pub fn select(
        &mut self,
        kind: DegradationKind,
        candidates: &[RecoveryStrategy],
    ) -> Option<RecoveryStrategy> {
        let mut best: Option<(RecoveryStrategy, f64)> = None;
        for &strategy in candidates {
            let stats = self
                .state
                .stats
                .get(&arm_key(strategy, kind))
                .cloned()
                .unwrap_or_default();

            let mut sample = match Beta::new(stats.alpha, stats.beta) {
                Ok(distribution) => distribution.sample(&mut self.rng),
                Err(_) => self.rng.gen::<f64>(),
            };
            if is_anti_pattern(&stats) {
                sample *= 0.05;
            }

            match best {
                Some((_, best_sample)) if sample <= best_sample => {}
                _ => best = Some((strategy, sample)),
            }
        }
        best.map(|(strategy, _)| strategy)
    }

    /// Record an outcome: success bumps α, failure bumps β; the fitness
    /// delta folds into an EMA with factor 0.2.
    pub fn record_outcome(
        &mut self,
        strategy: RecoveryStrategy,
        kind: DegradationKind,
        success: bool,
        fitness_delta: f64,
    ) {
        let stats = self
            .state
            .stats
            .entry(arm_key(strategy, kind))
            .or_default();
        if success {
            stats.alpha += 1.0;
        } else {
            stats.beta += 1.0;
        }
        stats.total_trials += 1;
        stats.mean_fitness_delta = if stats.total_trials == 1 {
            fitness_delta
        } else {
            0.8 * stats.mean_fitness_delta + 0.2 * fitness_delta
        };
        self.state.updated_at = Utc::now();
    }

    /// Whether an arm is currently flagged as an anti-pattern
    pub fn is_anti_pattern(&self, strategy: RecoveryStrategy, kind: DegradationKind) -> bool {
        self.state
            .stats
            .get(&arm_key(strategy, kind))
            .map(is_anti_pattern)
            .unwrap_or(false)
    }

    /// All currently flagged anti-pattern arm keys
    pub fn anti_patterns(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .state
            .stats
            .iter()
            .filter(|(_, stats)| is_anti_pattern(stats))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// 95% credible interval: the 2.5%/97.5% quantiles of Beta(α, β)
    pub fn credible_interval(
        &self,
        strategy: RecoveryStrategy,
        kind: DegradationKind,
    ) -> (f64, f64) {
        let stats = self
            .state
            .stats
            .get(&arm_key(strategy, kind))
            .cloned()
            .unwrap_or_default();
        (
            beta_quantile(0.025, stats.alpha, stats.beta),
            beta_quantile(0.975, stats.alpha, stats.beta),
        )
    }
}

fn is_anti_pattern(stats: &ArmStats) -> bool {
    stats.total_trials >= 10 && stats.failure_rate() > 0.8
}

// ============================================================================
// BETA DISTRIBUTION MATH
// ============================================================================

/// Regularized incomplete beta function I_x(a, b) by continued fraction
/// (Lentz's method)
fn incomplete_beta(x: f64, a: f64, b: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }

    let ln_prefix = a * x.ln() + b * (1.0 - x).ln() + ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b);
    // The continued fraction converges fast for x < (a+1)/(a+b+2); mirror
    // otherwise
    if x < (a + 1.0) / (a + b + 2.0) {
        (ln_prefix.exp() / a) * beta_cf(x, a, b)
    } else {
        1.0 - incomplete_beta(1.0 - x, b, a)
    }
}

fn beta_cf(x: f64, a: f64, b: f64) -> f64 {
    const MAX_ITER: usize = 200;
    const EPS: f64 = 1e-12;
    const TINY: f64 = 1e-30;

    let mut c = 1.0;
    let mut d = 1.0 - (a + b) * x / (a + 1.0);
    if d.abs() < TINY {
        d = TINY;
    }
    d = 1.0 / d;
    let mut h = d;

    for m in 1..=MAX_ITER {
        let m_f = m as f64;
        // Even step
        let numerator = m_f * (b - m_f) * x / ((a + 2.0 * m_f - 1.0) * (a + 2.0 * m_f));
        d = 1.0 + numerator * d;
        if d.abs() < TINY {
            d = TINY;
        }
        d = 1.0 / d;
        c = 1.0 + numerator / c;
        if c.abs() < TINY {
            c = TINY;
        }
        h *= d * c;
        // Odd step
        let numerator =
            -(a + m_f) * (a + b + m_f) * x / ((a + 2.0 * m_f) * (a + 2.0 * m_f + 1.0));
        d = 1.0 + numerator * d;
        if d.abs() < TINY {
            d = TINY;
        }
        d = 1.0 / d;
        c = 1.0 + numerator / c;
        if c.abs() < TINY {
            c = TINY;
        }
        let delta = d * c;
        h *= delta;
        if (delta - 1.0).abs() < EPS {
            break;
        }
    }
    h
}

/// ln Γ via the Lanczos approximation
fn ln_gamma(x: f64) -> f64 {
    const COEFFICIENTS: [f64; 6] = [
        76.180_091_729_471_46,
        -86.505_320_329_416_77,
        24.014_098_240_830_91,
        -1.231_739_572_450_155,
        0.120_865_097_386_617_7e-2,
        -0.539_523_938_495_3e-5,
    ];
    let mut y = x;
    let tmp = x + 5.5;
    let tmp = tmp - (x + 0.5) * tmp.ln();
    let mut series = 1.000_000_000_190_015;
    for coefficient in COEFFICIENTS {
        y += 1.0;
        series += coefficient / y;
    }
    -tmp + (2.506_628_274_631_000_5 * series / x).ln()
}

/// Quantile of Beta(a, b) by bisection on the CDF
fn beta_quantile(p: f64, a: f64, b: f64) -> f64 {
    let mut lo = 0.0_f64;
    let mut hi = 1.0_f64;
    for _ in 0..100 {
        let mid = (lo + hi) / 2.0;
        if incomplete_beta(mid, a, b) < p {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    (lo + hi) / 2.0
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const KIND: DegradationKind = DegradationKind::LowConfidence;

    #[test]
    fn test_priors_and_posterior_mean() {
        let mut learner = ThompsonLearner::with_seed(7);
        for i in 0..100 {
            learner.record_outcome(RecoveryStrategy::RebuildPacks, KIND, i < 70, 0.01);
        }
        let stats = learner.arm(RecoveryStrategy::RebuildPacks, KIND).unwrap();
        assert!(stats.alpha >= 1.0 && stats.beta >= 1.0);
        assert_eq!(stats.alpha, 71.0);
        assert_eq!(stats.beta, 31.0);
        let p = stats.success_probability();
        assert!(p > 0.65 && p < 0.75, "E[p] = {p}");
    }

    #[test]
    fn test_selection_converges_to_better_arm() {
        let mut learner = ThompsonLearner::with_seed(42);
        // A: 40/10, B: 15/35
        for i in 0..50 {
            learner.record_outcome(RecoveryStrategy::ReindexSubset, KIND, i < 40, 0.01);
        }
        for i in 0..50 {
            learner.record_outcome(RecoveryStrategy::LowerCacheTtl, KIND, i < 15, -0.01);
        }

        let candidates = [RecoveryStrategy::ReindexSubset, RecoveryStrategy::LowerCacheTtl];
        let mut picked_a = 0;
        for _ in 0..100 {
            if learner.select(KIND, &candidates) == Some(RecoveryStrategy::ReindexSubset) {
                picked_a += 1;
            }
        }
        assert!(picked_a >= 60, "A picked only {picked_a} times");
    }

    #[test]
    fn test_anti_pattern_flagging() {
        let mut learner = ThompsonLearner::with_seed(3);
        // 9 failures of 9 trials: not yet an anti-pattern (needs 10)
        for _ in 0..9 {
            learner.record_outcome(RecoveryStrategy::PauseWatch, KIND, false, -0.05);
        }
        assert!(!learner.is_anti_pattern(RecoveryStrategy::PauseWatch, KIND));

        learner.record_outcome(RecoveryStrategy::PauseWatch, KIND, false, -0.05);
        assert!(learner.is_anti_pattern(RecoveryStrategy::PauseWatch, KIND));
        assert_eq!(learner.anti_patterns().len(), 1);

        // 8 failures / 10 trials = 0.8 is NOT strictly greater than 0.8
        let mut borderline = ThompsonLearner::with_seed(4);
        for i in 0..10 {
            borderline.record_outcome(RecoveryStrategy::PauseWatch, KIND, i < 2, 0.0);
        }
        assert!(!borderline.is_anti_pattern(RecoveryStrategy::PauseWatch, KIND));
    }

    #[test]
    fn test_anti_pattern_rarely_selected() {
        let mut learner = ThompsonLearner::with_seed(11);
        for _ in 0..20 {
            learner.record_outcome(RecoveryStrategy::PauseWatch, KIND, false, -0.1);
        }
        // A merely mediocre alternative should still dominate the flagged arm
        for i in 0..10 {
            learner.record_outcome(RecoveryStrategy::RebuildPacks, KIND, i < 5, 0.0);
        }
        let candidates = [RecoveryStrategy::PauseWatch, RecoveryStrategy::RebuildPacks];
        let mut paused = 0;
        for _ in 0..100 {
            if learner.select(KIND, &candidates) == Some(RecoveryStrategy::PauseWatch) {
                paused += 1;
            }
        }
        assert!(paused < 10, "anti-pattern picked {paused} times");
    }

    #[test]
    fn test_state_serde_roundtrip() {
        let mut learner = ThompsonLearner::with_seed(5);
        learner.record_outcome(RecoveryStrategy::RefreshEmbeddings, KIND, true, 0.02);
        learner.record_outcome(
            RecoveryStrategy::ReindexSubset,
            DegradationKind::StaleIndex,
            false,
            -0.01,
        );

        let json = serde_json::to_string(learner.state()).unwrap();
        let restored: LearnerState = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, *learner.state());
        assert_eq!(restored.version, 1);
    }

    #[test]
    fn test_credible_interval_narrows() {
        let mut sparse = ThompsonLearner::with_seed(1);
        for i in 0..4 {
            sparse.record_outcome(RecoveryStrategy::RebuildPacks, KIND, i < 2, 0.0);
        }
        let (lo_sparse, hi_sparse) = sparse.credible_interval(RecoveryStrategy::RebuildPacks, KIND);

        let mut dense = ThompsonLearner::with_seed(2);
        for i in 0..200 {
            dense.record_outcome(RecoveryStrategy::RebuildPacks, KIND, i % 2 == 0, 0.0);
        }
        let (lo_dense, hi_dense) = dense.credible_interval(RecoveryStrategy::RebuildPacks, KIND);

        assert!(hi_dense - lo_dense < hi_sparse - lo_sparse);
        assert!(lo_dense > 0.4 && hi_dense < 0.6);
    }

    #[test]
    fn test_beta_quantile_sanity() {
        // Beta(1,1) is uniform: quantiles are identity
        assert!((beta_quantile(0.5, 1.0, 1.0) - 0.5).abs() < 1e-6);
        assert!((beta_quantile(0.025, 1.0, 1.0) - 0.025).abs() < 1e-6);
    }
}
