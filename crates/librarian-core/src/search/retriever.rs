//! Hybrid Retriever
//!
//! Answers intent queries by fusing lexical, vector, and graph-proximity
//! candidates into ranked, deduplicated, calibrated context packs. Never
//! fails a request over a single pack: partial failures land in
//! `coverage_gaps`.

use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use lru::LruCache;
use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::config::{LlmRequirement, QueryDepth, RetrievalGenotype};
use crate::embeddings::EmbeddingService;
use crate::error::{LibrarianError, Result};
use crate::graph::expand_from_seeds;
use crate::model::{content_hash, ContextPack, EdgeType, PackOutcome, PackType, TaxonomyTag};
use crate::storage::{EdgeQuery, KnowledgeStore, PackFilter};

use super::cache::{query_fingerprint, QueryCache};
use super::calibrate::{uncertainty, IsotonicCalibrator, Uncertainty};
use super::fusion::{apply_threshold, collect_signals, fuse, FusedCandidate};

// ============================================================================
// REQUEST / RESPONSE TYPES
// ============================================================================

/// Use-case constraints a caller can attach to a query
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct UcRequirements {
    /// Taxonomy tags the supporting evidence must carry
    pub required_tags: Vec<TaxonomyTag>,
    /// Minimum evidence confidence per pack
    pub min_evidence_coverage: f64,
    /// Maximum staleness of the backing module, in days
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_age_days: Option<u32>,
}

impl UcRequirements {
    /// Stable hash for cache fingerprinting
    pub fn fingerprint(&self) -> String {
        content_hash(&serde_json::to_string(self).unwrap_or_default())
    }
}

/// Options for one query
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Traversal depth
    pub depth: QueryDepth,
    /// Workspace-relative files the caller is working on
    pub affected_files: Vec<String>,
    /// Use-case constraints
    pub uc_requirements: Option<UcRequirements>,
    /// Whether LLM summaries may be used
    pub llm_requirement: LlmRequirement,
    /// Cooperative cancellation
    pub cancel: Option<CancelToken>,
}

/// A ranked query answer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    /// Ranked context packs
    pub packs: Vec<ContextPack>,
    /// Aggregate confidence over the returned packs
    pub total_confidence: f64,
    /// Wall-clock latency
    pub latency_ms: u64,
    /// Whether the answer came from the query cache
    pub cache_hit: bool,
    /// Human-readable account of how the answer was produced
    pub explanation: String,
    /// Files and regions the answer does not cover, plus per-pack failures
    pub coverage_gaps: Vec<String>,
    /// Suggested follow-up queries
    pub drill_down_hints: Vec<String>,
    /// Signals that contributed candidates
    pub method_hints: Vec<String>,
    /// Uncertainty over the result set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uncertainty: Option<Uncertainty>,
}

// ============================================================================
// RETRIEVER
// ============================================================================

/// Hybrid retrieval engine over the knowledge store
pub struct Retriever {
    store: Arc<KnowledgeStore>,
    embedder: Option<Arc<dyn EmbeddingService>>,
    genotype: RetrievalGenotype,
    cache: QueryCache<QueryResponse>,
    /// Avoids re-embedding repeated intents
    intent_embeddings: Mutex<LruCache<String, Vec<f32>>>,
}

impl Retriever {
    /// Create a retriever; `embedder` may be absent (semantic weight
    /// degrades to zero)
    pub fn new(
        store: Arc<KnowledgeStore>,
        embedder: Option<Arc<dyn EmbeddingService>>,
        genotype: RetrievalGenotype,
    ) -> Self {
        Self {
            store,
            embedder,
            genotype,
            cache: QueryCache::new(),
            intent_embeddings: Mutex::new(LruCache::new(
                NonZeroUsize::new(100).expect("100 is non-zero"),
            )),
        }
    }

    /// Current genotype
    pub fn genotype(&self) -> &RetrievalGenotype {
        &self.genotype
    }

    /// Replace the genotype (evolution updates scoring parameters live)
    pub fn set_genotype(&mut self, genotype: RetrievalGenotype) {
        self.genotype = genotype;
    }

    /// Query cache hit rate since construction
    pub fn cache_hit_rate(&self) -> f64 {
        self.cache.hit_rate()
    }

    /// Drop all cached answers (index rebuilt or packs invalidated)
    pub async fn invalidate_cache(&self) {
        self.cache.clear().await;
    }

    /// Answer an intent query
    pub async fn query(&self, intent: &str, options: QueryOptions) -> Result<QueryResponse> {
        let started = Instant::now();

        if intent.trim().is_empty() {
            return Err(LibrarianError::InvalidArgument(
                "intent must not be empty".to_string(),
            ));
        }
        let metadata = self.store.get_metadata()?;
        if metadata.last_bootstrap.is_none() {
            return Err(LibrarianError::NotBootstrapped(
                "no completed bootstrap for this workspace".to_string(),
            ));
        }

        let uc_hash = options
            .uc_requirements
            .as_ref()
            .map(|uc| uc.fingerprint())
            .unwrap_or_default();
        let fingerprint = query_fingerprint(
            intent,
            &format!("{:?}", options.depth),
            &options.affected_files,
            &uc_hash,
        );

        // At-most-one concurrent retrieval per fingerprint
        let _flight = self.cache.lock_fingerprint(&fingerprint).await;
        let checksum = self.store.index_checksum()?;
        if let Some(mut cached) = self.cache.get(&fingerprint, &checksum).await {
            cached.cache_hit = true;
            cached.latency_ms = started.elapsed().as_millis() as u64;
            return Ok(cached);
        }

        let response = self
            .run_pipeline(intent, &options, started)
            .await?;
        self.cache
            .put(fingerprint, response.clone(), checksum)
            .await;
        Ok(response)
    }

    async fn run_pipeline(
        &self,
        intent: &str,
        options: &QueryOptions,
        started: Instant,
    ) -> Result<QueryResponse> {
        let mut coverage_gaps: Vec<String> = Vec::new();
        let mut method_hints: Vec<String> = Vec::new();
        let mut degraded_semantic = false;

        let cancelled =
            |options: &QueryOptions| options.cancel.as_ref().is_some_and(|c| c.is_cancelled());

        // 1. Lexical candidates
        let lexical = match self.store.search_lexical(intent, 50) {
            Ok(hits) => {
                if !hits.is_empty() {
                    method_hints.push("lexical".to_string());
                }
                hits
            }
            Err(e) => {
                coverage_gaps.push(format!("lexical search failed: {e}"));
                Vec::new()
            }
        };

        // 2. Semantic candidates via the intent embedding
        let semantic: Vec<(String, f64)> = if let Some(embedder) = &self.embedder {
            match self.embed_intent(embedder.as_ref(), intent).await {
                Ok(vector) => {
                    let k = options.depth.semantic_k();
                    match self.store.search_vectors(&vector, k) {
                        Ok(hits) => {
                            if !hits.is_empty() {
                                method_hints.push("semantic".to_string());
                            }
                            hits.into_iter().map(|(id, s)| (id, s as f64)).collect()
                        }
                        Err(e) => {
                            coverage_gaps.push(format!("vector search failed: {e}"));
                            Vec::new()
                        }
                    }
                }
                Err(e) => {
                    degraded_semantic = true;
                    coverage_gaps.push(format!("embedding unavailable: {e}"));
                    Vec::new()
                }
            }
        } else {
            degraded_semantic = true;
            Vec::new()
        };

        // 3. Graph-proximity candidates from affected files
        let seed_modules = self.seed_module_ids(&options.affected_files, &mut coverage_gaps)?;
        let graph_proximity = if options.depth.graph_hops() > 0 && !seed_modules.is_empty() {
            match expand_from_seeds(
                &self.store,
                &seed_modules,
                EdgeType::expansion_set(),
                options.depth.graph_hops().min(self.genotype.graph_expansion_depth.max(1)),
                256,
            ) {
                Ok(proximity) => {
                    if proximity.len() > seed_modules.len() {
                        method_hints.push("graph".to_string());
                    }
                    proximity
                }
                Err(e) => {
                    coverage_gaps.push(format!("graph expansion failed: {e}"));
                    HashMap::new()
                }
            }
        } else {
            seed_modules.iter().map(|id| (id.clone(), 1.0)).collect()
        };

        if cancelled(options) {
            return Ok(self.partial_response(started, coverage_gaps, method_hints));
        }

        // 4. Co-change weights for everything seen so far
        let mut candidate_ids: HashSet<String> = HashSet::new();
        candidate_ids.extend(lexical.iter().map(|(id, _)| id.clone()));
        candidate_ids.extend(semantic.iter().map(|(id, _)| id.clone()));
        candidate_ids.extend(graph_proximity.keys().cloned());
        let co_change = self.co_change_weights(&candidate_ids)?;

        // 5. Fusion, with semantic weight zeroed under degradation
        let mut genotype = self.genotype.clone();
        if degraded_semantic {
            genotype.semantic_weight = 0.0;
        }
        let signals = collect_signals(&lexical, &semantic, &graph_proximity, &co_change);
        let fused = apply_threshold(fuse(signals, &genotype), genotype.reranker_threshold);

        if cancelled(options) {
            return Ok(self.partial_response(started, coverage_gaps, method_hints));
        }

        // 6. Pack assembly + dedup + uc filters
        let mut packs = self.assemble_packs(&fused, options, &mut coverage_gaps)?;
        packs = dedup_packs(packs);

        // 7. Calibration from historical outcomes
        let calibrator = self.fit_calibrator()?;
        let score_by_target: HashMap<&str, f64> = fused
            .iter()
            .map(|c| (c.entity_id.as_str(), c.score))
            .collect();
        for (pack, _) in packs.iter_mut() {
            let raw = score_by_target
                .get(pack.target_id.as_str())
                .copied()
                .unwrap_or(pack.confidence);
            pack.calibrated_confidence = Some(calibrator.calibrate(raw).clamp(0.0, 1.0));
        }

        // 8. Coverage gaps for affected files not represented
        let covered: HashSet<&str> = packs
            .iter()
            .flat_map(|(p, _)| p.related_files.iter().map(String::as_str))
            .collect();
        for file in &options.affected_files {
            if !covered.contains(file.as_str()) {
                coverage_gaps.push(format!("no pack covers {file}"));
            }
        }

        // 9. Drill-down hints from the most fact-dense packs
        let drill_down_hints = drill_down_hints(&packs);

        // 10. Bookkeeping: access counters
        let pack_ids: Vec<String> = packs.iter().map(|(p, _)| p.pack_id.clone()).collect();
        let target_ids: Vec<String> = packs.iter().map(|(p, _)| p.target_id.clone()).collect();
        if let Err(e) = self.store.record_pack_access(&pack_ids) {
            tracing::warn!(error = %e, "failed to record pack access");
        }
        if let Err(e) = self.store.record_function_access(&target_ids) {
            tracing::warn!(error = %e, "failed to record function access");
        }

        let calibrated_scores: Vec<f64> = packs
            .iter()
            .filter_map(|(p, _)| p.calibrated_confidence)
            .collect();
        let uncertainty = uncertainty(&calibrated_scores);
        let total_confidence = if calibrated_scores.is_empty() {
            0.0
        } else {
            calibrated_scores.iter().sum::<f64>() / calibrated_scores.len() as f64
        };

        let mut explanation = format!(
            "{} candidates fused from {} signal(s); {} pack(s) after dedup",
            fused.len(),
            method_hints.len().max(1),
            packs.len()
        );
        if degraded_semantic {
            explanation.push_str("; semantic scoring degraded (no embedding service)");
        }

        Ok(QueryResponse {
            packs: packs.into_iter().map(|(p, _)| p).collect(),
            total_confidence,
            latency_ms: started.elapsed().as_millis() as u64,
            cache_hit: false,
            explanation,
            coverage_gaps,
            drill_down_hints,
            method_hints,
            uncertainty: Some(uncertainty),
        })
    }

    /// Resolve affected file paths to module ids, recording misses
    fn seed_module_ids(
        &self,
        affected_files: &[String],
        coverage_gaps: &mut Vec<String>,
    ) -> Result<Vec<String>> {
        let mut seeds = Vec::new();
        for file in affected_files {
            match self.store.get_module_by_path(file)? {
                Some(module) => seeds.push(module.id),
                None => coverage_gaps.push(format!("{file} is not indexed")),
            }
        }
        Ok(seeds)
    }

    /// Strongest co-change edge weight touching each candidate
    fn co_change_weights(&self, candidate_ids: &HashSet<String>) -> Result<HashMap<String, f64>> {
        if candidate_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let ids: Vec<String> = candidate_ids.iter().cloned().collect();
        let mut weights: HashMap<String, f64> = HashMap::new();
        for direction in [
            EdgeQuery {
                from_ids: Some(ids.clone()),
                edge_types: Some(vec![EdgeType::CoChanges]),
                limit: Some(512),
                ..Default::default()
            },
            EdgeQuery {
                to_ids: Some(ids.clone()),
                edge_types: Some(vec![EdgeType::CoChanges]),
                limit: Some(512),
                ..Default::default()
            },
        ] {
            for edge in self.store.get_graph_edges(&direction)? {
                for id in [&edge.from_id, &edge.to_id] {
                    if candidate_ids.contains(id) {
                        let entry = weights.entry(id.clone()).or_default();
                        if edge.weight > *entry {
                            *entry = edge.weight;
                        }
                    }
                }
            }
        }
        Ok(weights)
    }

    /// Fetch stored packs per candidate; synthesise deterministic packs for
    /// candidates without one; apply depth policy and uc filters.
    ///
    /// Returns `(pack, score)` pairs, best-first.
    fn assemble_packs(
        &self,
        fused: &[FusedCandidate],
        options: &QueryOptions,
        coverage_gaps: &mut Vec<String>,
    ) -> Result<Vec<(ContextPack, f64)>> {
        let allowed = allowed_pack_types(options.depth);
        let target_ids: Vec<String> = fused.iter().map(|c| c.entity_id.clone()).collect();
        if target_ids.is_empty() {
            return Ok(Vec::new());
        }

        let stored = self.store.get_context_packs(&PackFilter {
            target_ids: Some(target_ids),
            ..Default::default()
        })?;
        let mut by_target: HashMap<String, Vec<ContextPack>> = HashMap::new();
        for pack in stored {
            by_target.entry(pack.target_id.clone()).or_default().push(pack);
        }

        let uc = options.uc_requirements.clone().unwrap_or_default();
        let mut out: Vec<(ContextPack, f64)> = Vec::new();
        for candidate in fused {
            let packs = match by_target.remove(&candidate.entity_id) {
                Some(packs) => packs,
                None => match self.synthesize_pack(&candidate.entity_id) {
                    Ok(Some(pack)) => vec![pack],
                    Ok(None) => continue,
                    Err(e) => {
                        coverage_gaps
                            .push(format!("pack assembly failed for {}: {e}", candidate.entity_id));
                        continue;
                    }
                },
            };
            for pack in packs {
                if !allowed.contains(&pack.pack_type) {
                    continue;
                }
                if pack.confidence < uc.min_evidence_coverage {
                    continue;
                }
                if !uc.required_tags.is_empty()
                    && !uc.required_tags.contains(&pack_taxonomy(pack.pack_type))
                {
                    continue;
                }
                if let Some(max_age_days) = uc.max_age_days {
                    if self.pack_is_stale(&pack, max_age_days)? {
                        continue;
                    }
                }
                out.push((pack, candidate.score));
            }
        }

        out.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.pack_id.cmp(&b.0.pack_id))
        });
        Ok(out)
    }

    /// Deterministic pack from an entity's stored summary when no derived
    /// pack exists
    fn synthesize_pack(&self, entity_id: &str) -> Result<Option<ContextPack>> {
        if let Some(function) = self.store.get_function(entity_id)? {
            let mut pack = ContextPack::new(PackType::FunctionContext, entity_id);
            pack.summary = if function.purpose.is_empty() {
                format!("{} in {}", function.signature, function.file_path)
            } else {
                function.purpose.clone()
            };
            pack.key_facts = vec![
                function.signature.clone(),
                format!(
                    "{}:{}-{}",
                    function.file_path, function.start_line, function.end_line
                ),
            ];
            pack.related_files = vec![function.file_path.clone()];
            pack.confidence = (function.confidence * 0.8).clamp(0.0, 1.0);
            return Ok(Some(pack));
        }
        if let Some(module) = self.store.get_module(entity_id)? {
            let mut pack = ContextPack::new(PackType::ModuleOverview, entity_id);
            pack.summary = if module.purpose.is_empty() {
                format!("module {}", module.path)
            } else {
                module.purpose.clone()
            };
            pack.key_facts = module
                .exports
                .iter()
                .take(8)
                .map(|e| format!("exports {e}"))
                .collect();
            pack.related_files = vec![module.path.clone()];
            pack.confidence = (module.confidence * 0.8).clamp(0.0, 1.0);
            return Ok(Some(pack));
        }
        Ok(None)
    }

    /// Whether the pack's first backing module is older than the freshness
    /// budget
    fn pack_is_stale(&self, pack: &ContextPack, max_age_days: u32) -> Result<bool> {
        let Some(path) = pack.related_files.first() else {
            return Ok(false);
        };
        let Some(module) = self.store.get_module_by_path(path)? else {
            return Ok(false);
        };
        let age_days = (chrono::Utc::now() - module.last_indexed).num_days();
        Ok(age_days > max_age_days as i64)
    }

    /// Fit the isotonic calibrator from pack outcome history
    fn fit_calibrator(&self) -> Result<IsotonicCalibrator> {
        let packs = self.store.get_context_packs(&PackFilter {
            limit: Some(500),
            ..Default::default()
        })?;
        let observations: Vec<(f64, bool)> = packs
            .iter()
            .filter_map(|p| match p.last_outcome {
                PackOutcome::Success => Some((p.confidence, true)),
                PackOutcome::Failure => Some((p.confidence, false)),
                PackOutcome::Unknown => None,
            })
            .collect();
        Ok(IsotonicCalibrator::fit(&observations))
    }

    fn partial_response(
        &self,
        started: Instant,
        mut coverage_gaps: Vec<String>,
        method_hints: Vec<String>,
    ) -> QueryResponse {
        coverage_gaps.push("query cancelled before completion".to_string());
        QueryResponse {
            packs: Vec::new(),
            total_confidence: 0.0,
            latency_ms: started.elapsed().as_millis() as u64,
            cache_hit: false,
            explanation: "cancelled".to_string(),
            coverage_gaps,
            drill_down_hints: Vec::new(),
            method_hints,
            uncertainty: None,
        }
    }

    async fn embed_intent(
        &self,
        embedder: &dyn EmbeddingService,
        intent: &str,
    ) -> std::result::Result<Vec<f32>, crate::embeddings::EmbeddingError> {
        if let Ok(mut cache) = self.intent_embeddings.lock() {
            if let Some(vector) = cache.get(intent) {
                return Ok(vector.clone());
            }
        }
        let embedding = embedder.embed(intent).await?;
        if let Ok(mut cache) = self.intent_embeddings.lock() {
            cache.put(intent.to_string(), embedding.vector.clone());
        }
        Ok(embedding.vector)
    }
}

// ============================================================================
// HELPERS
// ============================================================================

/// Taxonomy a pack's evidence implies, for uc-requirement tag filtering
fn pack_taxonomy(pack_type: PackType) -> TaxonomyTag {
    match pack_type {
        PackType::FunctionContext | PackType::ModuleOverview => TaxonomyTag::CodeStructure,
        PackType::ChangeHistory | PackType::Risk => TaxonomyTag::CommitHistory,
        PackType::Ownership => TaxonomyTag::CodeOwnership,
        PackType::Decision => TaxonomyTag::Decisions,
    }
}

/// Pack types visible at each depth
fn allowed_pack_types(depth: QueryDepth) -> Vec<PackType> {
    let mut types = vec![PackType::FunctionContext, PackType::ModuleOverview];
    if depth >= QueryDepth::L2 {
        types.push(PackType::ChangeHistory);
        types.push(PackType::Risk);
    }
    if depth >= QueryDepth::L3 {
        types.push(PackType::Ownership);
        types.push(PackType::Decision);
    }
    types
}

/// Collapse duplicate targets (best score wins) and drop packs whose
/// related files are a subset of a higher-ranked pack's
fn dedup_packs(ranked: Vec<(ContextPack, f64)>) -> Vec<(ContextPack, f64)> {
    let mut seen_targets: HashSet<(String, PackType)> = HashSet::new();
    let mut kept: Vec<(ContextPack, f64)> = Vec::new();

    for (pack, score) in ranked {
        if !seen_targets.insert((pack.target_id.clone(), pack.pack_type)) {
            continue;
        }
        let files: HashSet<&str> = pack.related_files.iter().map(String::as_str).collect();
        let subsumed = !files.is_empty()
            && kept.iter().any(|(higher, _)| {
                higher.target_id != pack.target_id
                    && files.iter().all(|f| higher.related_files.iter().any(|h| h == f))
                    && higher.related_files.len() > files.len()
            });
        if subsumed {
            continue;
        }
        kept.push((pack, score));
    }
    kept
}

/// Follow-up suggestions from the most fact-dense packs
fn drill_down_hints(packs: &[(ContextPack, f64)]) -> Vec<String> {
    let mut dense: Vec<&ContextPack> = packs.iter().map(|(p, _)| p).collect();
    dense.sort_by_key(|p| std::cmp::Reverse(p.key_facts.len()));
    dense
        .iter()
        .take(3)
        .filter_map(|p| p.key_facts.first())
        .map(|fact| format!("Drill into: {fact}"))
        .collect()
}
