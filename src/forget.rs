//! Ebbinghaus forgetting: retrievability decays exponentially against a
//! per-memory stability constant, and weak unpinned traces get pruned.

use crate::db::{MemoryRecord, MemoryStore, SECS_PER_DAY};
use crate::error::MnemonError;

/// `R = exp(−Δt / stability)` with Δt in days. Clamped to [0, 1].
pub fn retrievability(last_accessed: f64, now: f64, stability: f64) -> f64 {
    let elapsed_days = (now - last_accessed).max(0.0) / SECS_PER_DAY;
    (-elapsed_days / stability.max(f64::MIN_POSITIVE)).exp()
}

/// The time-discounted strength surfaced to callers and used for layer
/// classification: `max(working, core) × R`.
pub fn effective_strength(record: &MemoryRecord, now: f64) -> f64 {
    let raw = record.working_strength.max(record.core_strength);
    raw * retrievability(record.last_accessed, now, record.stability)
}

/// Delete every unpinned memory whose effective strength fell below the
/// threshold. Pinned rows are exempt. Returns the number pruned.
pub fn prune(store: &MemoryStore, threshold: f64, now: f64) -> Result<usize, MnemonError> {
    let doomed: Vec<String> = store
        .list_all_meta()?
        .into_iter()
        .filter(|m| !m.pinned && effective_strength(m, now) < threshold)
        .map(|m| m.id)
        .collect();
    if doomed.is_empty() {
        return Ok(0);
    }
    let n = store.delete_many(&doomed)?;
    tracing::info!(pruned = n, threshold, "forgot weak memories");
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Layer, MemoryType};

    fn record(working: f64, core: f64, stability: f64, last_accessed: f64) -> MemoryRecord {
        MemoryRecord {
            id: "t".into(),
            content: "x".into(),
            memory_type: MemoryType::Factual,
            importance: 0.5,
            working_strength: working,
            core_strength: core,
            stability,
            created_at: last_accessed,
            last_accessed,
            access_count: 0,
            layer: Layer::Working,
            pinned: false,
            source: None,
            tags: vec![],
            contradicts: None,
            contradicted_by: None,
            embedding: None,
        }
    }

    #[test]
    fn fresh_memory_keeps_full_strength() {
        let rec = record(2.0, 0.5, 3.0, 1000.0);
        assert!((effective_strength(&rec, 1000.0) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn one_time_constant_is_one_efold() {
        // after exactly `stability` days, R = 1/e
        let rec = record(1.0, 0.0, 2.0, 0.0);
        let now = 2.0 * SECS_PER_DAY;
        let eff = effective_strength(&rec, now);
        assert!((eff - (-1.0f64).exp()).abs() < 1e-9);
    }

    #[test]
    fn stronger_trace_dominates() {
        let rec = record(0.5, 3.0, 4.0, 0.0);
        assert!(effective_strength(&rec, 0.0) > 2.9);
    }

    #[test]
    fn retrievability_clamps_future_access() {
        // last_accessed in the future (clock skew) must not exceed 1
        assert!(retrievability(100.0, 50.0, 1.0) <= 1.0);
    }
}
