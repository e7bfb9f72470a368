//! ACT-R style activation: the additive score that ranks retrieval.
//!
//! `A = B + C + I − contradiction_penalty + pin_boost`, where the base-level
//! term `B = ln(Σ (now − t_k + ε)^(−d))` carries recency and frequency, `C`
//! rewards context-keyword matches, and `I` folds in intrinsic importance.

use crate::config::ActivationConfig;
use crate::db::MemoryRecord;

/// Base-level term from the access history. An empty history falls back to
/// the creation time so fresh memories are still reachable.
pub fn base_level(access_times: &[f64], created_at: f64, now: f64, cfg: &ActivationConfig) -> f64 {
    let eps = cfg.epsilon.max(1e-3);
    let sum: f64 = if access_times.is_empty() {
        ((now - created_at).max(0.0) + eps).powf(-cfg.decay)
    } else {
        access_times
            .iter()
            .map(|&t| ((now - t).max(0.0) + eps).powf(-cfg.decay))
            .sum()
    };
    sum.ln()
}

/// Context term: how many keywords appear (case-insensitively) in the
/// content or tags, scaled by the context weight.
pub fn context_score(record: &MemoryRecord, keywords: &[String], cfg: &ActivationConfig) -> f64 {
    if keywords.is_empty() {
        return 0.0;
    }
    let content = record.content.to_lowercase();
    let tags: Vec<String> = record.tags.iter().map(|t| t.to_lowercase()).collect();
    let matched = keywords
        .iter()
        .map(|k| k.to_lowercase())
        .filter(|k| !k.is_empty() && (content.contains(k.as_str()) || tags.iter().any(|t| t.contains(k.as_str()))))
        .count();
    cfg.context_weight * matched as f64
}

/// Total activation for one memory at time `now`.
pub fn activation(
    record: &MemoryRecord,
    access_times: &[f64],
    keywords: &[String],
    now: f64,
    cfg: &ActivationConfig,
) -> f64 {
    let mut a = base_level(access_times, record.created_at, now, cfg);
    a += context_score(record, keywords, cfg);
    a += cfg.importance_weight * record.importance;
    if record.contradicted_by.is_some() {
        a -= cfg.contradiction_penalty;
    }
    if record.pinned {
        a += cfg.pin_boost;
    }
    a
}
