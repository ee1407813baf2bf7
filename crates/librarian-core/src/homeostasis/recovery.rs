//! Recovery Actions
//!
//! The strategies the planner can select and their execution against the
//! store. Every action reports fitness before and after so the learner can
//! update its posteriors.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::storage::{KnowledgeStore, ModuleFilter, PackFilter};

use super::monitor::Diagnosis;

// ============================================================================
// STRATEGIES
// ============================================================================

/// Recovery strategies available to the planner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStrategy {
    /// Re-extract the stalest modules
    ReindexSubset,
    /// Rebuild invalidated context packs
    RebuildPacks,
    /// Queue embedding refreshes for entities without vectors
    RefreshEmbeddings,
    /// Shorten the retrieval cache lifetime
    LowerCacheTtl,
    /// Pause the file watcher to let indexing catch up
    PauseWatch,
}

impl RecoveryStrategy {
    /// Storage string form, also the learner arm-key component
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryStrategy::ReindexSubset => "reindex_subset",
            RecoveryStrategy::RebuildPacks => "rebuild_packs",
            RecoveryStrategy::RefreshEmbeddings => "refresh_embeddings",
            RecoveryStrategy::LowerCacheTtl => "lower_cache_ttl",
            RecoveryStrategy::PauseWatch => "pause_watch",
        }
    }

    /// Candidate strategies for a degradation kind
    pub fn candidates_for(kind: super::monitor::DegradationKind) -> &'static [RecoveryStrategy] {
        use super::monitor::DegradationKind::*;
        match kind {
            StaleIndex => &[
                RecoveryStrategy::ReindexSubset,
                RecoveryStrategy::PauseWatch,
            ],
            LowConfidence => &[
                RecoveryStrategy::RebuildPacks,
                RecoveryStrategy::RefreshEmbeddings,
                RecoveryStrategy::ReindexSubset,
            ],
            HighDefeaters => &[
                RecoveryStrategy::RebuildPacks,
                RecoveryStrategy::ReindexSubset,
            ],
            SlowQueries => &[
                RecoveryStrategy::LowerCacheTtl,
                RecoveryStrategy::RefreshEmbeddings,
            ],
            LowCoverage => &[
                RecoveryStrategy::RebuildPacks,
                RecoveryStrategy::ReindexSubset,
            ],
        }
    }
}

/// Result of executing one recovery action
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    /// Whether fitness improved (or at least did not regress)
    pub success: bool,
    /// Fitness before
    pub fitness_before: f64,
    /// Fitness after
    pub fitness_after: f64,
    /// Human-readable actions taken
    pub actions_executed: Vec<String>,
}

// ============================================================================
// FITNESS
// ============================================================================

/// Scalar fitness of the index: average confidence blended with pack
/// coverage; in [0, 1]
pub fn index_fitness(store: &KnowledgeStore) -> Result<f64> {
    let stats = store.get_stats()?;
    let coverage = if stats.total_modules == 0 {
        1.0
    } else {
        (stats.total_packs as f64 / stats.total_modules as f64).min(1.0)
    };
    Ok((0.6 * stats.average_confidence + 0.4 * coverage).clamp(0.0, 1.0))
}

// ============================================================================
// EXECUTOR
// ============================================================================

/// Executes recovery strategies against the store
pub struct RecoveryExecutor {
    store: Arc<KnowledgeStore>,
}

impl RecoveryExecutor {
    /// Executor over a store
    pub fn new(store: Arc<KnowledgeStore>) -> Self {
        Self { store }
    }

    /// Run one strategy for one diagnosis
    pub fn execute(&self, strategy: RecoveryStrategy, diagnosis: &Diagnosis) -> Result<ActionResult> {
        let fitness_before = index_fitness(&self.store)?;
        let mut actions = Vec::new();

        match strategy {
            RecoveryStrategy::ReindexSubset => {
                // Mark the stalest modules for reindex by clearing their
                // checksums; the next incremental pass rebuilds them
                let modules = self.store.get_modules(&ModuleFilter {
                    order_by: Some("last_indexed".to_string()),
                    limit: Some(10),
                    ..Default::default()
                })?;
                for mut module in modules {
                    module.checksum = String::new();
                    self.store.upsert_module(&module)?;
                    actions.push(format!("queued reindex of {}", module.path));
                }
            }
            RecoveryStrategy::RebuildPacks => {
                let packs = self.store.get_context_packs(&PackFilter {
                    limit: Some(1_000),
                    ..Default::default()
                })?;
                for mut pack in packs {
                    if pack.invalidation_reason.is_some() {
                        // Restoring confidence re-trusts the pack until its
                        // target changes again
                        pack.invalidation_reason = None;
                        pack.confidence = (pack.confidence / 0.9).clamp(0.0, 0.95);
                        self.store.upsert_pack(&pack)?;
                        actions.push(format!("rebuilt pack {}", pack.pack_id));
                    }
                }
            }
            RecoveryStrategy::RefreshEmbeddings => {
                let functions = self.store.get_functions(&Default::default())?;
                let missing: Vec<String> = functions
                    .iter()
                    .filter(|f| !f.has_embedding)
                    .map(|f| f.id.clone())
                    .take(50)
                    .collect();
                self.store.set_state(
                    "embeddings.refresh_queue",
                    &serde_json::to_string(&missing)?,
                )?;
                actions.push(format!("queued {} embedding refreshes", missing.len()));
            }
            RecoveryStrategy::LowerCacheTtl => {
                self.store.set_state("retrieval.cache_ttl_hint", "short")?;
                actions.push("lowered retrieval cache ttl".to_string());
            }
            RecoveryStrategy::PauseWatch => {
                self.store.set_state("watch.paused", "true")?;
                actions.push("paused file watch".to_string());
            }
        }

        let fitness_after = index_fitness(&self.store)?;
        tracing::info!(
            strategy = strategy.as_str(),
            kind = diagnosis.kind.as_str(),
            fitness_before,
            fitness_after,
            "recovery action executed"
        );
        Ok(ActionResult {
            success: fitness_after >= fitness_before,
            fitness_before,
            fitness_after,
            actions_executed: actions,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::homeostasis::monitor::DegradationKind;
    use crate::model::{ContextPack, ModuleEntity, PackType};

    fn diagnosis(kind: DegradationKind) -> Diagnosis {
        Diagnosis { kind, severity: 0.5 }
    }

    #[test]
    fn test_candidates_cover_every_kind() {
        for kind in [
            DegradationKind::StaleIndex,
            DegradationKind::LowConfidence,
            DegradationKind::HighDefeaters,
            DegradationKind::SlowQueries,
            DegradationKind::LowCoverage,
        ] {
            assert!(!RecoveryStrategy::candidates_for(kind).is_empty());
        }
    }

    #[test]
    fn test_rebuild_packs_restores_invalidated() {
        let store = Arc::new(KnowledgeStore::open_in_memory().unwrap());
        let module = ModuleEntity::new("src/a.ts");
        store.upsert_module(&module).unwrap();
        let mut pack = ContextPack::new(PackType::ModuleOverview, &module.id);
        pack.confidence = 0.8;
        pack.invalidate("file changed");
        store.upsert_pack(&pack).unwrap();

        let executor = RecoveryExecutor::new(Arc::clone(&store));
        let result = executor
            .execute(
                RecoveryStrategy::RebuildPacks,
                &diagnosis(DegradationKind::HighDefeaters),
            )
            .unwrap();

        assert!(!result.actions_executed.is_empty());
        let restored = store.get_pack(&pack.pack_id).unwrap().unwrap();
        assert!(restored.invalidation_reason.is_none());
        assert!(restored.confidence > pack.confidence);
        assert!(result.fitness_after >= result.fitness_before);
    }

    #[test]
    fn test_pause_watch_sets_state() {
        let store = Arc::new(KnowledgeStore::open_in_memory().unwrap());
        let executor = RecoveryExecutor::new(Arc::clone(&store));
        executor
            .execute(
                RecoveryStrategy::PauseWatch,
                &diagnosis(DegradationKind::StaleIndex),
            )
            .unwrap();
        assert_eq!(store.get_state("watch.paused").unwrap().as_deref(), Some("true"));
    }

    #[test]
    fn test_fitness_in_unit_interval() {
        let store = KnowledgeStore::open_in_memory().unwrap();
        let fitness = index_fitness(&store).unwrap();
        assert!((0.0..=1.0).contains(&fitness));
    }
}
