//! Context packs
//!
//! The retrieval engine's output unit: a compact, evidence-bearing summary
//! of a code region. Packs are derived artifacts, rebuilt when their target
//! changes.

use serde::{Deserialize, Serialize};

use super::stable_id;

// ============================================================================
// PACK TYPES
// ============================================================================

/// What a pack summarises
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackType {
    /// A single function and its call context
    FunctionContext,
    /// A module's exports, dependencies, and purpose
    ModuleOverview,
    /// Recent change history of a region
    ChangeHistory,
    /// Who owns and understands a region
    Ownership,
    /// An architectural decision record
    Decision,
    /// Risk signals for a region
    Risk,
}

impl PackType {
    /// Storage string form
    pub fn as_str(&self) -> &'static str {
        match self {
            PackType::FunctionContext => "function_context",
            PackType::ModuleOverview => "module_overview",
            PackType::ChangeHistory => "change_history",
            PackType::Ownership => "ownership",
            PackType::Decision => "decision",
            PackType::Risk => "risk",
        }
    }

    /// Parse the storage string form
    pub fn parse_name(s: &str) -> Option<Self> {
        Some(match s {
            "function_context" => PackType::FunctionContext,
            "module_overview" => PackType::ModuleOverview,
            "change_history" => PackType::ChangeHistory,
            "ownership" => PackType::Ownership,
            "decision" => PackType::Decision,
            "risk" => PackType::Risk,
            _ => return None,
        })
    }
}

/// Most recent observation of whether a pack helped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PackOutcome {
    /// The pack was confirmed useful
    Success,
    /// The pack was reported unhelpful
    Failure,
    /// No feedback yet
    #[default]
    Unknown,
}

impl PackOutcome {
    /// Storage string form
    pub fn as_str(&self) -> &'static str {
        match self {
            PackOutcome::Success => "success",
            PackOutcome::Failure => "failure",
            PackOutcome::Unknown => "unknown",
        }
    }

    /// Parse the storage string form
    pub fn parse_name(s: &str) -> Self {
        match s {
            "success" => PackOutcome::Success,
            "failure" => PackOutcome::Failure,
            _ => PackOutcome::Unknown,
        }
    }
}

// ============================================================================
// CONTEXT PACK
// ============================================================================

/// A compact, evidence-bearing summary of a code region
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextPack {
    /// Stable hash of `<pack_type>:<target_id>`
    pub pack_id: String,
    /// Pack kind
    pub pack_type: PackType,
    /// Entity this pack summarises
    pub target_id: String,
    /// One-paragraph summary
    pub summary: String,
    /// Ordered evidence statements
    pub key_facts: Vec<String>,
    /// Ordered related file paths
    pub related_files: Vec<String>,
    /// Raw evidence confidence in [0, 1]
    pub confidence: f64,
    /// Calibrated success probability, when calibration has run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calibrated_confidence: Option<f64>,
    /// Times this pack was returned; never decreases
    pub access_count: u64,
    /// Most recent outcome observation
    #[serde(default)]
    pub last_outcome: PackOutcome,
    /// Why the pack was invalidated, when it was
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalidation_reason: Option<String>,
}

impl ContextPack {
    /// Build an empty pack for a target
    pub fn new(pack_type: PackType, target_id: impl Into<String>) -> Self {
        let target_id = target_id.into();
        Self {
            pack_id: Self::id_for(pack_type, &target_id),
            pack_type,
            target_id,
            summary: String::new(),
            key_facts: Vec::new(),
            related_files: Vec::new(),
            confidence: 0.5,
            calibrated_confidence: None,
            access_count: 0,
            last_outcome: PackOutcome::Unknown,
            invalidation_reason: None,
        }
    }

    /// Deterministic pack id for a (type, target) pair
    pub fn id_for(pack_type: PackType, target_id: &str) -> String {
        stable_id(&format!("{}:{target_id}", pack_type.as_str()))
    }

    /// Mark the pack stale: confidence decays, reason recorded
    pub fn invalidate(&mut self, reason: impl Into<String>) {
        self.confidence *= 0.9;
        self.calibrated_confidence = None;
        self.invalidation_reason = Some(reason.into());
    }
}

// ============================================================================
// TESTS
// ============================================================================
