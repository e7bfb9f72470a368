//! Hybrid recall: lexical candidates, graph expansion over the entity and
//! Hebbian adjacencies, activation scoring, and a confidence gate.

use std::collections::HashSet;

use serde::Serialize;

use crate::activation;
use crate::capability::{cosine_similarity, EmbeddingProvider, Tokenizer};
use crate::confidence;
use crate::config::MemoryConfig;
use crate::db::{
    now_secs, HebbianParams, Layer, MemoryRecord, MemoryStore, MemoryType, RecallEffects,
    SECS_PER_DAY,
};
use crate::error::MnemonError;
use crate::forget::effective_strength;

/// Cap on lexical candidates fed into scoring.
const LEXICAL_TOP_N: usize = 100;

/// Flat score bonus for candidates that matched the lexical stage.
/// Expansion-only and semantic-only candidates do not receive it.
const LEXICAL_BONUS: f64 = 0.5;

/// Minimum cosine similarity for the semantic candidate stage.
const SEMANTIC_MIN_SIM: f64 = 0.35;

#[derive(Debug, Clone)]
pub struct RecallOptions {
    pub limit: usize,
    /// Context keywords for the activation context term.
    pub context: Option<Vec<String>>,
    pub types: Option<Vec<MemoryType>>,
    pub layers: Option<Vec<Layer>>,
    pub min_confidence: f64,
    /// Inclusive `created_at` range, epoch seconds.
    pub time_range: Option<(f64, f64)>,
    pub graph_expand: bool,
}

impl Default for RecallOptions {
    fn default() -> Self {
        Self {
            limit: 5,
            context: None,
            types: None,
            layers: None,
            min_confidence: 0.0,
            time_range: None,
            graph_expand: true,
        }
    }
}

/// The closed result record surfaced to callers.
#[derive(Debug, Clone, Serialize)]
pub struct RecallResult {
    pub id: String,
    pub content: String,
    pub memory_type: MemoryType,
    pub layer: Layer,
    pub importance: f64,
    pub activation: f64,
    pub strength: f64,
    pub confidence: f64,
    pub confidence_label: &'static str,
    pub age_days: f64,
}

struct Candidate {
    record: MemoryRecord,
    lexical: bool,
}

pub fn run(
    store: &MemoryStore,
    cfg: &MemoryConfig,
    tokenizer: &dyn Tokenizer,
    embedder: Option<&dyn EmbeddingProvider>,
    query: &str,
    opts: &RecallOptions,
) -> Result<Vec<RecallResult>, MnemonError> {
    let now = now_secs();

    // 1. candidates: lexical first, all rows when the query is empty or dry
    let terms = tokenizer.tokenize(query);
    let lexical_ids: Vec<String> = if terms.is_empty() {
        vec![]
    } else {
        store
            .search_fts(&terms, LEXICAL_TOP_N)
            .into_iter()
            .map(|(id, _)| id)
            .collect()
    };

    let mut seen: HashSet<String> = HashSet::new();
    let mut candidates: Vec<Candidate> = Vec::new();
    if lexical_ids.is_empty() {
        for record in store.list_all_meta()? {
            seen.insert(record.id.clone());
            candidates.push(Candidate { record, lexical: false });
        }
    } else {
        for record in store.get_many_meta(&lexical_ids)? {
            seen.insert(record.id.clone());
            candidates.push(Candidate { record, lexical: true });
        }
    }

    // optional semantic stage: extra candidates, no lexical bonus
    if let Some(embedder) = embedder {
        if !query.trim().is_empty() {
            match embedder.embed(query) {
                Ok(query_emb) => {
                    let mut scored: Vec<(String, f64)> = store
                        .embedding_rows()?
                        .into_iter()
                        .filter(|(id, _)| !seen.contains(id))
                        .map(|(id, emb)| {
                            let sim = cosine_similarity(&query_emb, &emb);
                            (id, sim)
                        })
                        .filter(|(_, sim)| *sim >= SEMANTIC_MIN_SIM)
                        .collect();
                    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
                    scored.truncate(opts.limit * 3);
                    let ids: Vec<String> = scored.into_iter().map(|(id, _)| id).collect();
                    for record in store.get_many_meta(&ids)? {
                        if seen.insert(record.id.clone()) {
                            candidates.push(Candidate { record, lexical: false });
                        }
                    }
                }
                Err(e) => tracing::warn!(error = %e, "embedding provider failed, lexical-only recall"),
            }
        }
    }

    // 2. filters
    candidates.retain(|c| passes_filters(&c.record, opts));

    // 3. graph expansion, filters reapplied on the expanded set
    if opts.graph_expand && !candidates.is_empty() {
        let candidate_ids: Vec<String> = candidates.iter().map(|c| c.record.id.clone()).collect();

        let entities = store.entities_of_memories(&candidate_ids)?;
        let mut expansion_ids: Vec<String> = Vec::new();
        if !entities.is_empty() {
            let expanded = store.expand_entities(&entities)?;
            expansion_ids.extend(store.memories_with_entities(&expanded)?);
        }
        for id in &candidate_ids {
            expansion_ids.extend(store.hebbian_neighbors(id)?);
        }
        expansion_ids.retain(|id| !seen.contains(id));
        let mut unique = HashSet::new();
        expansion_ids.retain(|id| unique.insert(id.clone()));

        for record in store.get_many_meta(&expansion_ids)? {
            if seen.insert(record.id.clone()) && passes_filters(&record, opts) {
                candidates.push(Candidate { record, lexical: false });
            }
        }
    }

    // 4–6. activation scoring, lexical bonus, confidence gate
    let keywords: &[String] = opts.context.as_deref().unwrap_or(&[]);
    let mut results: Vec<RecallResult> = Vec::with_capacity(candidates.len());
    for c in &candidates {
        let times = store.access_times(&c.record.id)?;
        let mut score = activation::activation(&c.record, &times, keywords, now, &cfg.activation);
        if score < cfg.activation.min_activation {
            continue;
        }
        if c.lexical {
            score += LEXICAL_BONUS;
        }
        let conf = confidence::confidence(&c.record, now, &cfg.confidence);
        if conf < opts.min_confidence {
            continue;
        }
        results.push(RecallResult {
            id: c.record.id.clone(),
            content: c.record.content.clone(),
            memory_type: c.record.memory_type,
            layer: c.record.layer,
            importance: c.record.importance,
            activation: score,
            strength: effective_strength(&c.record, now),
            confidence: conf,
            confidence_label: confidence::label(conf),
            age_days: (now - c.record.created_at).max(0.0) / SECS_PER_DAY,
        });
    }

    // 7. rank and truncate
    results.sort_by(|a, b| b.activation.partial_cmp(&a.activation).unwrap_or(std::cmp::Ordering::Equal));
    results.truncate(opts.limit);

    // 8. retrieval side effects in one transaction, co-activation included
    if !results.is_empty() {
        let returned: Vec<String> = results.iter().map(|r| r.id.clone()).collect();
        let effects = RecallEffects {
            stability_growth: cfg.forgetting.stability_growth,
            stability_cap: cfg.anomaly.max_stability,
            hebbian: cfg.hebbian.enabled.then_some(HebbianParams {
                threshold: cfg.hebbian.threshold,
                reinforce: cfg.hebbian.reinforce,
                max_strength: cfg.hebbian.max_strength,
            }),
        };
        let formed = store.commit_recall_effects(&returned, now, &effects)?;
        if !formed.is_empty() {
            tracing::debug!(links = formed.len(), "co-retrieval formed new links");
        }
    }

    Ok(results)
}

fn passes_filters(record: &MemoryRecord, opts: &RecallOptions) -> bool {
    if let Some(ref types) = opts.types {
        if !types.contains(&record.memory_type) {
            return false;
        }
    }
    if let Some(ref layers) = opts.layers {
        if !layers.contains(&record.layer) {
            return false;
        }
    }
    if let Some((start, end)) = opts.time_range {
        if record.created_at < start || record.created_at > end {
            return false;
        }
    }
    true
}
