//! Homeostasis Loop
//!
//! MAPE-K over the knowledge index: Monitor health, Analyse degradations,
//! Plan strategies with Thompson Sampling, Execute recovery actions, and
//! fold outcomes back into the Knowledge (learner) state, which persists
//! through the store's key-value table.

mod learner;
mod monitor;
mod recovery;

pub use learner::{ArmStats, LearnerState, ThompsonLearner};
pub use monitor::{
    diagnose_degradation, DegradationKind, Diagnosis, GraphSummary, HealthChecks, HealthMonitor,
    HealthReport, HealthStatus, HealthThresholds, HealthTrigger,
};
pub use recovery::{index_fitness, ActionResult, RecoveryExecutor, RecoveryStrategy};

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::HomeostasisConfig;
use crate::error::Result;
use crate::events::{Event, EventBus};
use crate::storage::KnowledgeStore;

// ============================================================================
// CYCLE REPORT
// ============================================================================

const LEARNER_STATE_KEY: &str = "learner.state";

/// What one MAPE-K cycle did
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    /// What triggered the cycle
    pub trigger: String,
    /// Health at the start of the cycle
    pub status: HealthStatus,
    /// Diagnoses the analyser produced
    pub diagnoses: Vec<Diagnosis>,
    /// (strategy, kind, result) per executed action
    pub executed: Vec<ExecutedAction>,
    /// Fitness before any action
    pub fitness_before: f64,
    /// Fitness after all actions
    pub fitness_after: f64,
}

/// One executed action within a cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutedAction {
    /// Strategy that ran
    pub strategy: RecoveryStrategy,
    /// Degradation it targeted
    pub kind: DegradationKind,
    /// Whether it succeeded
    pub success: bool,
    /// Actions taken, human-readable
    pub actions: Vec<String>,
}

// ============================================================================
// DAEMON
// ============================================================================

/// The homeostasis daemon: owns the monitor, learner, and executor
pub struct HomeostasisDaemon {
    store: Arc<KnowledgeStore>,
    monitor: HealthMonitor,
    learner: ThompsonLearner,
    executor: RecoveryExecutor,
    config: HomeostasisConfig,
    bus: EventBus,
    audit_dir: Option<std::path::PathBuf>,
}

impl HomeostasisDaemon {
    /// Create a daemon, restoring learner state from the store when present
    pub fn new(
        store: Arc<KnowledgeStore>,
        config: HomeostasisConfig,
        bus: EventBus,
        audit_dir: Option<std::path::PathBuf>,
    ) -> Result<Self> {
        let learner = match store.get_state(LEARNER_STATE_KEY)? {
            Some(raw) => match serde_json::from_str::<LearnerState>(&raw) {
                Ok(state) => ThompsonLearner::from_state(state),
                Err(e) => {
                    tracing::warn!(error = %e, "learner state unreadable; starting fresh");
                    ThompsonLearner::new()
                }
            },
            None => ThompsonLearner::new(),
        };

        Ok(Self {
            executor: RecoveryExecutor::new(Arc::clone(&store)),
            monitor: HealthMonitor::new(HealthThresholds::default()),
            store,
            learner,
            config,
            bus,
            audit_dir,
        })
    }

    /// The learner, for inspection
    pub fn learner(&self) -> &ThompsonLearner {
        &self.learner
    }

    /// Feed an observed query latency into the monitor
    pub fn observe_latency(&mut self, latency_ms: u64) {
        self.monitor.observe_latency(latency_ms);
    }

    /// Persist learner state through the store
    pub fn save_learner(&self) -> Result<()> {
        self.store.set_state(
            LEARNER_STATE_KEY,
            &serde_json::to_string(self.learner.state())?,
        )
    }

    /// Run one MAPE-K cycle
    pub fn run_cycle(&mut self, trigger: HealthTrigger) -> Result<CycleReport> {
        self.bus.publish(Event::HealthCheckTriggered {
            source: trigger.as_str().to_string(),
        });

        // Monitor
        let report = self.monitor.check(&self.store)?;
        let fitness_before = index_fitness(&self.store)?;

        // Analyse
        let diagnoses = diagnose_degradation(&report);
        let mut executed = Vec::new();

        // Plan + Execute, bounded by max_concurrent_actions
        for diagnosis in diagnoses.iter().take(self.config.max_concurrent_actions) {
            let candidates = RecoveryStrategy::candidates_for(diagnosis.kind);
            let Some(strategy) = self.learner.select(diagnosis.kind, candidates) else {
                continue;
            };
            let result = self.executor.execute(strategy, diagnosis)?;

            // Knowledge: posterior update per outcome
            self.learner.record_outcome(
                strategy,
                diagnosis.kind,
                result.success,
                result.fitness_after - result.fitness_before,
            );
            executed.push(ExecutedAction {
                strategy,
                kind: diagnosis.kind,
                success: result.success,
                actions: result.actions_executed,
            });
        }

        let fitness_after = index_fitness(&self.store)?;
        if !executed.is_empty() {
            self.bus.publish(Event::RecoveryComplete {
                fitness_before,
                fitness_after,
                actions: executed
                    .iter()
                    .flat_map(|e| e.actions.iter().cloned())
                    .collect(),
            });
        }

        if self.config.auto_save {
            self.save_learner()?;
        }

        let cycle = CycleReport {
            trigger: trigger.as_str().to_string(),
            status: report.status,
            diagnoses,
            executed,
            fitness_before,
            fitness_after,
        };
        self.write_audit(&cycle);
        Ok(cycle)
    }

    /// Stop the daemon, persisting learner state
    pub fn stop(self) -> Result<()> {
        self.save_learner()
    }

    fn write_audit(&self, cycle: &CycleReport) {
        let Some(dir) = &self.audit_dir else { return };
        if cycle.executed.is_empty() {
            return;
        }
        if let Err(e) = std::fs::create_dir_all(dir) {
            tracing::warn!(error = %e, "could not create heal audit directory");
            return;
        }
        let file = dir.join(format!(
            "heal-{}.json",
            chrono::Utc::now().format("%Y%m%dT%H%M%S%f")
        ));
        if let Ok(json) = serde_json::to_string_pretty(cycle) {
            let _ = std::fs::write(file, json);
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
