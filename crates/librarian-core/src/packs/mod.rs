//! Context Pack Builder
//!
//! Assembles the derived pack artifacts: per-function, per-module, per-ADR,
//! change-history, and ownership packs. Confidence comes from evidence
//! coverage, not vibes: each present evidence channel raises it.

use serde_json::Value;

use crate::model::{
    CommitRecord, ContextPack, FunctionEntity, IngestionItem, ModuleEntity, PackType,
};

// ============================================================================
// EVIDENCE CONFIDENCE
// ============================================================================

/// Confidence from evidence coverage: the fraction of evidence channels
/// present, scaled into [0.3, 0.95]
pub fn evidence_confidence(channels_present: usize, channels_total: usize) -> f64 {
    if channels_total == 0 {
        return 0.3;
    }
    let coverage = channels_present as f64 / channels_total as f64;
    (0.3 + coverage * 0.65).clamp(0.0, 0.95)
}

// ============================================================================
// PACK BUILDER
// ============================================================================

/// Builds context packs from extracted entities and ingestion payloads
#[derive(Debug, Default)]
pub struct PackBuilder;

impl PackBuilder {
    /// Create a builder
    pub fn new() -> Self {
        Self
    }

    /// Pack for one function: summary, location, outcome stats
    pub fn function_pack(&self, function: &FunctionEntity, module: Option<&ModuleEntity>) -> ContextPack {
        let mut pack = ContextPack::new(PackType::FunctionContext, &function.id);

        pack.summary = if function.purpose.is_empty() {
            format!("{} ({})", function.signature, function.file_path)
        } else {
            function.purpose.clone()
        };

        let mut key_facts = vec![
            function.signature.clone(),
            format!(
                "{}:{}-{}",
                function.file_path, function.start_line, function.end_line
            ),
        ];
        if function.outcome_history.total() > 0 {
            key_facts.push(format!(
                "retrieval success rate {:.0}% over {} uses",
                function.outcome_history.success_rate() * 100.0,
                function.outcome_history.total()
            ));
        }
        pack.key_facts = key_facts;

        let mut related = vec![function.file_path.clone()];
        if let Some(module) = module {
            if module.path != function.file_path {
                related.push(module.path.clone());
            }
        }
        pack.related_files = related;

        let channels = [
            !function.signature.is_empty(),
            !function.purpose.is_empty(),
            function.has_embedding,
            module.is_some(),
        ];
        pack.confidence =
            evidence_confidence(channels.iter().filter(|c| **c).count(), channels.len());
        pack
    }

    /// Pack for one module: purpose, exports, dependencies
    pub fn module_pack(&self, module: &ModuleEntity, function_count: usize) -> ContextPack {
        let mut pack = ContextPack::new(PackType::ModuleOverview, &module.id);

        pack.summary = if module.purpose.is_empty() {
            format!(
                "module {} with {} function(s)",
                module.path, function_count
            )
        } else {
            module.purpose.clone()
        };

        let mut key_facts: Vec<String> = module
            .exports
            .iter()
            .take(10)
            .map(|e| format!("exports {e}"))
            .collect();
        if !module.dependencies.is_empty() {
            key_facts.push(format!("{} internal dependencies", module.dependencies.len()));
        }
        pack.key_facts = key_facts;
        pack.related_files = vec![module.path.clone()];

        let channels = [
            !module.purpose.is_empty(),
            !module.exports.is_empty(),
            !module.dependencies.is_empty(),
            function_count > 0,
        ];
        pack.confidence =
            evidence_confidence(channels.iter().filter(|c| **c).count(), channels.len());
        pack
    }

    /// Pack for an architectural decision record item
    pub fn decision_pack(&self, adr_item: &IngestionItem) -> Option<ContextPack> {
        let payload = &adr_item.payload;
        let title = payload.get("title").and_then(Value::as_str)?;
        let mut pack = ContextPack::new(PackType::Decision, &adr_item.id);

        pack.summary = payload
            .get("decision")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| title.to_string());

        let mut key_facts = vec![format!("decision: {title}")];
        if let Some(status) = payload.get("status").and_then(Value::as_str) {
            key_facts.push(format!("status: {status}"));
        }
        if let Some(context) = payload.get("context").and_then(Value::as_str) {
            key_facts.push(format!("context: {context}"));
        }
        pack.key_facts = key_facts;
        pack.related_files = adr_item.metadata.path.iter().cloned().collect();

        let channels = [
            payload.get("status").is_some(),
            payload.get("context").is_some(),
            payload.get("decision").is_some(),
            payload.get("consequences").is_some(),
        ];
        pack.confidence =
            evidence_confidence(channels.iter().filter(|c| **c).count(), channels.len());
        Some(pack)
    }

    /// Pack summarising recent change history of a module
    pub fn change_history_pack(
        &self,
        module: &ModuleEntity,
        commits: &[&CommitRecord],
    ) -> Option<ContextPack> {
        if commits.is_empty() {
            return None;
        }
        let mut pack = ContextPack::new(PackType::ChangeHistory, &module.id);

        let risky = commits.iter().filter(|c| c.risk_score >= 0.5).count();
        pack.summary = format!(
            "{} recent change(s) to {}, {} high-risk",
            commits.len(),
            module.path,
            risky
        );
        pack.key_facts = commits
            .iter()
            .take(6)
            .map(|c| {
                format!(
                    "{} [{}] risk {:.2}: {}",
                    &c.hash[..8.min(c.hash.len())],
                    c.category.as_str(),
                    c.risk_score,
                    c.summary
                )
            })
            .collect();
        pack.related_files = vec![module.path.clone()];
        pack.confidence = evidence_confidence(commits.len().min(4), 4);
        Some(pack)
    }

    /// Pack naming a module's strongest owners
    pub fn ownership_pack(
        &self,
        module: &ModuleEntity,
        owners: &[(String, f64)],
    ) -> Option<ContextPack> {
        if owners.is_empty() {
            return None;
        }
        let mut pack = ContextPack::new(PackType::Ownership, &module.id);
        pack.summary = format!(
            "{} is owned primarily by {}",
            module.path,
            owners
                .first()
                .map(|(author, _)| author.as_str())
                .unwrap_or("unknown")
        );
        pack.key_facts = owners
            .iter()
            .take(5)
            .map(|(author, expertise)| format!("{author}: {:.0}% expertise", expertise * 100.0))
            .collect();
        pack.related_files = vec![module.path.clone()];
        pack.confidence = evidence_confidence(owners.len().min(3), 3);
        Some(pack)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ItemMetadata;
    use serde_json::json;

    fn module() -> ModuleEntity {
        let mut module = ModuleEntity::new("src/rate.ts");
        module.purpose = "request rate limiting".to_string();
        module.exports = vec!["checkRateLimit".to_string()];
        module
    }

    #[test]
    fn test_evidence_confidence_scales() {
        assert_eq!(evidence_confidence(0, 4), 0.3);
        assert!(evidence_confidence(2, 4) > evidence_confidence(1, 4));
        assert!(evidence_confidence(4, 4) <= 0.95);
    }

    #[test]
    fn test_function_pack_shape() {
        let module = module();
        let mut function = FunctionEntity::new(&module.path, &module.id, "checkRateLimit", "checkRateLimit");
        function.signature = "function checkRateLimit(ip: string): boolean".to_string();
        function.start_line = 4;
        function.end_line = 12;

        let builder = PackBuilder::new();
        let pack = builder.function_pack(&function, Some(&module));

        assert_eq!(pack.pack_type, PackType::FunctionContext);
        assert_eq!(pack.target_id, function.id);
        assert!(pack.related_files.contains(&"src/rate.ts".to_string()));
        assert!(pack.key_facts.iter().any(|f| f.contains("src/rate.ts:4-12")));
        assert!(pack.confidence > 0.3);
    }

    #[test]
    fn test_module_pack_lists_exports() {
        let builder = PackBuilder::new();
        let pack = builder.module_pack(&module(), 3);
        assert_eq!(pack.pack_type, PackType::ModuleOverview);
        assert!(pack.key_facts.iter().any(|f| f == "exports checkRateLimit"));
    }

    #[test]
    fn test_decision_pack_from_adr_item() {
        let item = IngestionItem::new(
            "adrs",
            "1.0.0",
            json!({
                "path": "docs/adr/0001-sqlite.md",
                "title": "Use SQLite",
                "status": "accepted",
                "decision": "SQLite with WAL journaling.",
            }),
            ItemMetadata {
                hash: "h".to_string(),
                path: Some("docs/adr/0001-sqlite.md".to_string()),
                ..Default::default()
            },
        );
        let builder = PackBuilder::new();
        let pack = builder.decision_pack(&item).unwrap();
        assert_eq!(pack.pack_type, PackType::Decision);
        assert_eq!(pack.summary, "SQLite with WAL journaling.");
        assert!(pack.key_facts.iter().any(|f| f == "status: accepted"));
    }

    #[test]
    fn test_ownership_pack_orders_owners() {
        let builder = PackBuilder::new();
        let pack = builder
            .ownership_pack(&module(), &[("Alice".to_string(), 0.7), ("Bob".to_string(), 0.3)])
            .unwrap();
        assert!(pack.summary.contains("Alice"));
        assert_eq!(pack.key_facts.len(), 2);
        assert!(builder.ownership_pack(&module(), &[]).is_none());
    }
}
