//! Homeostasis learner: convergence, persistence, and anti-patterns across
//! daemon restarts

use std::sync::Arc;

use librarian_e2e_tests::harness::TestWorkspace;
use librarian_core::{
    DegradationKind, EventBus, HealthTrigger, HomeostasisDaemon, LearnerState, RecoveryStrategy,
    ThompsonLearner,
};
use pretty_assertions::assert_eq;

#[test]
fn thompson_sampling_prefers_the_better_strategy() {
    let mut learner = ThompsonLearner::with_seed(2024);
    let kind = DegradationKind::LowConfidence;

    // Strategy A: 40 successes / 10 failures; B: 15 / 35
    for i in 0..50 {
        learner.record_outcome(RecoveryStrategy::RebuildPacks, kind, i < 40, 0.02);
    }
    for i in 0..50 {
        learner.record_outcome(RecoveryStrategy::LowerCacheTtl, kind, i < 15, -0.02);
    }

    let candidates = [RecoveryStrategy::RebuildPacks, RecoveryStrategy::LowerCacheTtl];
    let mut picked_a = 0;
    let mut picked_b = 0;
    for _ in 0..100 {
        match learner.select(kind, &candidates) {
            Some(RecoveryStrategy::RebuildPacks) => picked_a += 1,
            Some(RecoveryStrategy::LowerCacheTtl) => picked_b += 1,
            _ => {}
        }
    }
    assert!(picked_a >= 60, "A picked {picked_a} times");
    assert!(picked_b <= 40, "B picked {picked_b} times");
}

#[test]
fn learner_state_roundtrips_through_serde() {
    let mut learner = ThompsonLearner::with_seed(9);
    learner.record_outcome(
        RecoveryStrategy::ReindexSubset,
        DegradationKind::StaleIndex,
        true,
        0.05,
    );
    learner.record_outcome(
        RecoveryStrategy::RefreshEmbeddings,
        DegradationKind::LowConfidence,
        false,
        -0.01,
    );

    let serialized = serde_json::to_string(learner.state()).unwrap();
    let restored: LearnerState = serde_json::from_str(&serialized).unwrap();
    assert_eq!(&restored, learner.state());

    // Keys use the strategy::kind convention
    assert!(restored.stats.contains_key("reindex_subset::stale_index"));
    assert!(restored
        .stats
        .contains_key("refresh_embeddings::low_confidence"));
}

#[tokio::test]
async fn daemon_learns_across_restarts() {
    let mut workspace = TestWorkspace::new();
    let store = workspace.store();

    let trials_after_first_run = {
        let mut daemon = HomeostasisDaemon::new(
            Arc::clone(&store),
            Default::default(),
            EventBus::default(),
            None,
        )
        .unwrap();
        let cycle = daemon.run_cycle(HealthTrigger::Scheduled).unwrap();
        assert!(!cycle.executed.is_empty());
        daemon.stop().unwrap();

        let raw = store.get_state("learner.state").unwrap().expect("saved state");
        let state: LearnerState = serde_json::from_str(&raw).unwrap();
        state.stats.values().map(|s| s.total_trials).sum::<u64>()
    };
    assert!(trials_after_first_run > 0);

    // A new daemon restores the posteriors and keeps accumulating
    let mut daemon = HomeostasisDaemon::new(
        Arc::clone(&store),
        Default::default(),
        EventBus::default(),
        None,
    )
    .unwrap();
    daemon.run_cycle(HealthTrigger::Scheduled).unwrap();
    daemon.stop().unwrap();

    let raw = store.get_state("learner.state").unwrap().unwrap();
    let state: LearnerState = serde_json::from_str(&raw).unwrap();
    let trials_after_second_run: u64 = state.stats.values().map(|s| s.total_trials).sum();
    assert!(trials_after_second_run > trials_after_first_run);
}

#[test]
fn anti_patterns_require_ten_trials_and_high_failure() {
    let mut learner = ThompsonLearner::with_seed(77);
    let kind = DegradationKind::SlowQueries;

    for _ in 0..10 {
        learner.record_outcome(RecoveryStrategy::PauseWatch, kind, false, -0.1);
    }
    assert!(learner.is_anti_pattern(RecoveryStrategy::PauseWatch, kind));

    // The flagged arm is heavily deprioritised in selection
    for i in 0..10 {
        learner.record_outcome(RecoveryStrategy::LowerCacheTtl, kind, i < 4, 0.0);
    }
    let mut paused = 0;
    for _ in 0..100 {
        if learner.select(
            kind,
            &[RecoveryStrategy::PauseWatch, RecoveryStrategy::LowerCacheTtl],
        ) == Some(RecoveryStrategy::PauseWatch)
        {
            paused += 1;
        }
    }
    assert!(paused < 15, "anti-pattern selected {paused} times");
}

#[test]
fn credible_intervals_narrow_with_evidence() {
    let kind = DegradationKind::LowCoverage;

    let mut sparse = ThompsonLearner::with_seed(1);
    for i in 0..6 {
        sparse.record_outcome(RecoveryStrategy::RebuildPacks, kind, i % 2 == 0, 0.0);
    }
    let (sparse_lo, sparse_hi) = sparse.credible_interval(RecoveryStrategy::RebuildPacks, kind);

    let mut dense = ThompsonLearner::with_seed(1);
    for i in 0..300 {
        dense.record_outcome(RecoveryStrategy::RebuildPacks, kind, i % 2 == 0, 0.0);
    }
    let (dense_lo, dense_hi) = dense.credible_interval(RecoveryStrategy::RebuildPacks, kind);

    assert!(dense_hi - dense_lo < sparse_hi - sparse_lo);
    assert!(dense_lo > 0.4 && dense_hi < 0.6);
}
