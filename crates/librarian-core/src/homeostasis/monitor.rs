//! Health Monitor
//!
//! Produces `HealthReport`s from store state and recent query telemetry,
//! and diagnoses degradations for the planner.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::storage::KnowledgeStore;

// ============================================================================
// REPORT TYPES
// ============================================================================

/// Overall system status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// All checks pass
    Healthy,
    /// One or two checks failing
    Degraded,
    /// Recovery actions are in flight
    Recovering,
    /// Three or more checks failing
    Unhealthy,
}

/// What triggered a health check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthTrigger {
    /// Interval schedule
    Scheduled,
    /// Debounced file-change burst
    FileChange,
    /// Query failures crossed the threshold
    QueryFailure,
}

impl HealthTrigger {
    /// Event-payload string form
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthTrigger::Scheduled => "scheduled",
            HealthTrigger::FileChange => "file_change",
            HealthTrigger::QueryFailure => "query_failure",
        }
    }
}

/// The five boolean checks a report carries
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HealthChecks {
    /// Index updated recently enough
    pub index_fresh: bool,
    /// Average pack confidence above floor
    pub confidence_acceptable: bool,
    /// Few invalidated packs
    pub defeaters_low: bool,
    /// Query latency within budget
    pub latency_acceptable: bool,
    /// Enough of the workspace has packs
    pub coverage_acceptable: bool,
}

impl HealthChecks {
    fn failing(&self) -> usize {
        [
            self.index_fresh,
            self.confidence_acceptable,
            self.defeaters_low,
            self.latency_acceptable,
            self.coverage_acceptable,
        ]
        .iter()
        .filter(|ok| !**ok)
        .count()
    }
}

/// Snapshot of system health
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    /// Overall status
    pub status: HealthStatus,
    /// Human-readable reasons for each failing check
    pub degradation_reasons: Vec<String>,
    /// The individual checks
    pub checks: HealthChecks,
    /// Node and edge counts of the code graph
    pub code_graph: GraphSummary,
    /// Seconds since the last index update
    pub index_freshness_secs: i64,
    /// Average pack confidence
    pub confidence_state: f64,
    /// Average recent query latency in ms
    pub query_performance_ms: f64,
}

/// Code graph size summary
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GraphSummary {
    /// Entities in the store
    pub nodes: u64,
    /// Edges in the store
    pub edges: u64,
}

// ============================================================================
// DIAGNOSIS
// ============================================================================

/// Named degradation kinds the planner selects strategies for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradationKind {
    /// Index older than the freshness budget
    StaleIndex,
    /// Pack confidence below floor
    LowConfidence,
    /// Too many invalidated packs
    HighDefeaters,
    /// Queries slower than budget
    SlowQueries,
    /// Too little of the workspace is covered
    LowCoverage,
}

impl DegradationKind {
    /// Storage string form, also the learner arm-key component
    pub fn as_str(&self) -> &'static str {
        match self {
            DegradationKind::StaleIndex => "stale_index",
            DegradationKind::LowConfidence => "low_confidence",
            DegradationKind::HighDefeaters => "high_defeaters",
            DegradationKind::SlowQueries => "slow_queries",
            DegradationKind::LowCoverage => "low_coverage",
        }
    }
}

/// One diagnosed degradation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnosis {
    /// What is degraded
    pub kind: DegradationKind,
    /// Severity in [0, 1]
    pub severity: f64,
}

/// Map failing checks to diagnoses
pub fn diagnose_degradation(report: &HealthReport) -> Vec<Diagnosis> {
    let mut diagnoses = Vec::new();
    if !report.checks.index_fresh {
        diagnoses.push(Diagnosis {
            kind: DegradationKind::StaleIndex,
            severity: (report.index_freshness_secs as f64 / 86_400.0).clamp(0.1, 1.0),
        });
    }
    if !report.checks.confidence_acceptable {
        diagnoses.push(Diagnosis {
            kind: DegradationKind::LowConfidence,
            severity: (0.5 - report.confidence_state).clamp(0.1, 1.0),
        });
    }
    if !report.checks.defeaters_low {
        diagnoses.push(Diagnosis {
            kind: DegradationKind::HighDefeaters,
            severity: 0.5,
        });
    }
    if !report.checks.latency_acceptable {
        diagnoses.push(Diagnosis {
            kind: DegradationKind::SlowQueries,
            severity: (report.query_performance_ms / 5_000.0).clamp(0.1, 1.0),
        });
    }
    if !report.checks.coverage_acceptable {
        diagnoses.push(Diagnosis {
            kind: DegradationKind::LowCoverage,
            severity: 0.5,
        });
    }
    diagnoses
}

// ============================================================================
// MONITOR
// ============================================================================

/// Thresholds for the health checks
#[derive(Debug, Clone)]
pub struct HealthThresholds {
    /// Max index age before `index_fresh` fails
    pub max_index_age_secs: i64,
    /// Min average pack confidence
    pub min_confidence: f64,
    /// Max share of invalidated packs
    pub max_invalidated_ratio: f64,
    /// Max average query latency
    pub max_latency_ms: f64,
    /// Min share of modules with at least one pack
    pub min_coverage: f64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            max_index_age_secs: 7 * 86_400,
            min_confidence: 0.35,
            max_invalidated_ratio: 0.3,
            max_latency_ms: 2_000.0,
            min_coverage: 0.5,
        }
    }
}

/// Computes health reports from the store
pub struct HealthMonitor {
    thresholds: HealthThresholds,
    /// Rolling average query latency reported by the retriever's caller
    recent_latency_ms: f64,
}

impl HealthMonitor {
    /// Monitor with default thresholds
    pub fn new(thresholds: HealthThresholds) -> Self {
        Self {
            thresholds,
            recent_latency_ms: 0.0,
        }
    }

    /// Feed an observed query latency into the rolling average
    pub fn observe_latency(&mut self, latency_ms: u64) {
        self.recent_latency_ms = if self.recent_latency_ms == 0.0 {
            latency_ms as f64
        } else {
            0.8 * self.recent_latency_ms + 0.2 * latency_ms as f64
        };
    }

    /// Produce a health report from current store state
    pub fn check(&self, store: &KnowledgeStore) -> Result<HealthReport> {
        let stats = store.get_stats()?;
        let metadata = store.get_metadata()?;

        let index_age = metadata
            .last_indexing
            .or(metadata.last_bootstrap)
            .map(|t| (Utc::now() - t).num_seconds())
            .unwrap_or(i64::MAX);

        let invalidated: u64 = {
            let packs = store.get_context_packs(&crate::storage::PackFilter {
                limit: Some(1_000),
                ..Default::default()
            })?;
            packs
                .iter()
                .filter(|p| p.invalidation_reason.is_some())
                .count() as u64
        };
        let invalidated_ratio = if stats.total_packs == 0 {
            0.0
        } else {
            invalidated as f64 / stats.total_packs as f64
        };
        let coverage = if stats.total_modules == 0 {
            1.0
        } else {
            (stats.total_packs as f64 / stats.total_modules as f64).min(1.0)
        };

        let checks = HealthChecks {
            index_fresh: index_age <= self.thresholds.max_index_age_secs,
            confidence_acceptable: stats.total_packs == 0
                || stats.average_confidence >= self.thresholds.min_confidence,
            defeaters_low: invalidated_ratio <= self.thresholds.max_invalidated_ratio,
            latency_acceptable: self.recent_latency_ms <= self.thresholds.max_latency_ms,
            coverage_acceptable: coverage >= self.thresholds.min_coverage,
        };

        let mut reasons = Vec::new();
        if !checks.index_fresh {
            reasons.push(format!("index is {index_age}s old"));
        }
        if !checks.confidence_acceptable {
            reasons.push(format!(
                "average confidence {:.2} below {:.2}",
                stats.average_confidence, self.thresholds.min_confidence
            ));
        }
        if !checks.defeaters_low {
            reasons.push(format!(
                "{:.0}% of packs invalidated",
                invalidated_ratio * 100.0
            ));
        }
        if !checks.latency_acceptable {
            reasons.push(format!("queries averaging {:.0}ms", self.recent_latency_ms));
        }
        if !checks.coverage_acceptable {
            reasons.push(format!("pack coverage {:.0}%", coverage * 100.0));
        }

        let status = match checks.failing() {
            0 => HealthStatus::Healthy,
            1 | 2 => HealthStatus::Degraded,
            _ => HealthStatus::Unhealthy,
        };

        Ok(HealthReport {
            status,
            degradation_reasons: reasons,
            checks,
            code_graph: GraphSummary {
                nodes: stats.total_modules + stats.total_functions,
                edges: stats.total_edges,
            },
            index_freshness_secs: index_age.min(i64::MAX / 2),
            confidence_state: stats.average_confidence,
            query_performance_ms: self.recent_latency_ms,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn report_with_checks(checks: HealthChecks) -> HealthReport {
        HealthReport {
            status: HealthStatus::Healthy,
            degradation_reasons: vec![],
            checks,
            code_graph: GraphSummary::default(),
            index_freshness_secs: 100,
            confidence_state: 0.6,
            query_performance_ms: 100.0,
        }
    }

    #[test]
    fn test_diagnose_maps_checks_to_kinds() {
        let report = report_with_checks(HealthChecks {
            index_fresh: false,
            confidence_acceptable: false,
            defeaters_low: true,
            latency_acceptable: true,
            coverage_acceptable: true,
        });
        let diagnoses = diagnose_degradation(&report);
        assert_eq!(diagnoses.len(), 2);
        assert!(diagnoses.iter().any(|d| d.kind == DegradationKind::StaleIndex));
        assert!(diagnoses.iter().any(|d| d.kind == DegradationKind::LowConfidence));
        for diagnosis in diagnoses {
            assert!((0.0..=1.0).contains(&diagnosis.severity));
        }
    }

    #[test]
    fn test_healthy_report_diagnoses_nothing() {
        let report = report_with_checks(HealthChecks {
            index_fresh: true,
            confidence_acceptable: true,
            defeaters_low: true,
            latency_acceptable: true,
            coverage_acceptable: true,
        });
        assert!(diagnose_degradation(&report).is_empty());
    }

    #[test]
    fn test_monitor_on_empty_store() {
        let store = KnowledgeStore::open_in_memory().unwrap();
        let monitor = HealthMonitor::new(HealthThresholds::default());
        let report = monitor.check(&store).unwrap();
        // Never bootstrapped: the index is maximally stale
        assert!(!report.checks.index_fresh);
        assert!(report.checks.confidence_acceptable);
    }

    #[test]
    fn test_latency_rolling_average() {
        let mut monitor = HealthMonitor::new(HealthThresholds::default());
        monitor.observe_latency(100);
        monitor.observe_latency(300);
        assert!(monitor.recent_latency_ms > 100.0);
        assert!(monitor.recent_latency_ms < 300.0);
    }
}
