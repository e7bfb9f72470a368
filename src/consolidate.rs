//! Dual-trace consolidation: the "sleep" operator. Decays the working
//! trace, transfers mass into the core trace, replays a sample, re-layers,
//! decays the associative graph, and applies homeostatic downscaling, all
//! in a single transaction so observers see pre- or post-state only.

use rusqlite::params;
use serde::Serialize;

use crate::config::MemoryConfig;
use crate::db::{
    decay_links_tx, finish_tx, record_access_tx, MemoryStore, SECS_PER_DAY,
};
use crate::error::MnemonError;

#[derive(Debug, Default, Clone, Serialize)]
pub struct ConsolidateSummary {
    pub days: f64,
    /// Memories that received a replay boost and a synthetic access.
    pub replayed: usize,
    /// Rows newly moved into the core layer.
    pub promoted: usize,
    /// Rows newly moved to archive.
    pub archived: usize,
    /// Rows moved from core back to working.
    pub demoted: usize,
    /// Directional Hebbian rows pruned by decay.
    pub links_pruned: usize,
    /// Rows whose traces were downscaled.
    pub downscaled: usize,
    /// Rows clamped by the anomaly guard.
    pub clamped: usize,
}

/// Run one consolidation cycle. `days` scales every per-cycle factor, so a
/// zero-day cycle leaves all strengths untouched.
pub fn run(
    store: &MemoryStore,
    cfg: &MemoryConfig,
    days: f64,
) -> Result<ConsolidateSummary, MnemonError> {
    if days < 0.0 || days.is_nan() {
        return Err(MnemonError::InvalidDays(days));
    }
    store.check_writable()?;
    let r = run_inner(store, cfg, days);
    store.noting(r)
}

fn run_inner(
    store: &MemoryStore,
    cfg: &MemoryConfig,
    days: f64,
) -> Result<ConsolidateSummary, MnemonError> {
    let c = &cfg.consolidation;
    let now = crate::db::now_secs();

    let working_factor = (-c.working_decay * days).exp();
    let core_factor = (-c.core_decay * days).exp();
    let transfer = c.transfer_rate * days;
    let hebbian_factor = cfg.hebbian.decay.powf(days);
    let downscale_factor = cfg.downscale.factor.powf(days);

    let conn = store.conn()?;
    conn.execute_batch("BEGIN IMMEDIATE")?;
    let result = (|| -> Result<ConsolidateSummary, MnemonError> {
        let mut summary = ConsolidateSummary {
            days,
            ..Default::default()
        };

        // 1. working decay
        conn.execute(
            "UPDATE memories SET working_strength = working_strength * ?1 WHERE pinned = 0",
            params![working_factor],
        )?;

        // 2. working → core transfer; the transferred fraction is capped at
        // the full working mass. SET expressions see pre-update values, so
        // both sides use the same Δ.
        conn.execute(
            "UPDATE memories SET \
             core_strength = core_strength + working_strength * MIN(1.0, ?1 * MAX(importance, ?2)), \
             working_strength = working_strength * (1.0 - MIN(1.0, ?1 * MAX(importance, ?2))) \
             WHERE pinned = 0",
            params![transfer, c.importance_floor],
        )?;

        // 3. core decay
        conn.execute(
            "UPDATE memories SET core_strength = core_strength * ?1 WHERE pinned = 0",
            params![core_factor],
        )?;

        // 4. replay: interleaved sample of recent and important-old rows
        if days > 0.0 && c.replay_sample > 0 {
            let replayed = replay_tx(&conn, c.replay_sample, c.interleave_ratio, c.replay_boost, now)?;
            summary.replayed = replayed;
        }

        // 5. layer update
        summary.promoted = conn.execute(
            "UPDATE memories SET layer = 2 \
             WHERE (pinned = 1 OR core_strength >= ?1) AND layer <> 2",
            params![c.promote_threshold],
        )?;
        summary.archived = conn.execute(
            "UPDATE memories SET layer = 3 \
             WHERE pinned = 0 AND core_strength < ?1 \
             AND core_strength <= ?2 AND working_strength <= ?3 AND layer <> 3",
            params![c.promote_threshold, c.demote_threshold, c.archive_threshold],
        )?;
        summary.demoted = conn.execute(
            "UPDATE memories SET layer = 1 \
             WHERE pinned = 0 AND core_strength < ?1 \
             AND NOT (core_strength <= ?2 AND working_strength <= ?3) AND layer <> 1",
            params![c.promote_threshold, c.demote_threshold, c.archive_threshold],
        )?;

        // 6. associative decay
        summary.links_pruned = decay_links_tx(&conn, hebbian_factor, cfg.hebbian.prune_below)?;

        // 7. synaptic homeostasis
        summary.downscaled = conn.execute(
            "UPDATE memories SET working_strength = working_strength * ?1, \
             core_strength = core_strength * ?1 WHERE pinned = 0",
            params![downscale_factor],
        )?;

        // anomaly guard: keep runaway reinforcement bounded
        summary.clamped = conn.execute(
            "UPDATE memories SET \
             working_strength = MIN(working_strength, ?1), \
             core_strength = MIN(core_strength, ?1), \
             stability = MIN(stability, ?2) \
             WHERE working_strength > ?1 OR core_strength > ?1 OR stability > ?2",
            params![cfg.anomaly.max_strength, cfg.anomaly.max_stability],
        )?;
        if summary.clamped > 0 {
            tracing::warn!(clamped = summary.clamped, "anomaly guard clamped runaway strengths");
        }

        Ok(summary)
    })();

    let summary = finish_tx(&conn, result)?;
    tracing::info!(
        days = summary.days,
        replayed = summary.replayed,
        promoted = summary.promoted,
        archived = summary.archived,
        demoted = summary.demoted,
        links_pruned = summary.links_pruned,
        "consolidation cycle complete"
    );
    Ok(summary)
}

/// Pick the replay sample: `interleave_ratio` of the slots go to the most
/// recent rows of the last 24 h, the rest to older rows by importance.
/// Selection is deterministic. Each replayed row gets a core boost and a
/// synthetic access row (with the matching counter bump).
fn replay_tx(
    conn: &rusqlite::Connection,
    sample: usize,
    interleave_ratio: f64,
    boost: f64,
    now: f64,
) -> Result<usize, MnemonError> {
    let recent_slots = (sample as f64 * interleave_ratio).ceil() as usize;
    let cutoff = now - SECS_PER_DAY;

    let mut ids: Vec<String> = Vec::with_capacity(sample);
    {
        let mut stmt = conn.prepare(
            "SELECT id FROM memories WHERE created_at >= ?1 \
             ORDER BY created_at DESC LIMIT ?2",
        )?;
        let recent = stmt.query_map(params![cutoff, recent_slots as i64], |r| r.get(0))?;
        for id in recent.flatten() {
            ids.push(id);
        }
    }
    {
        let older_slots = sample - ids.len().min(sample);
        let mut stmt = conn.prepare(
            "SELECT id FROM memories WHERE created_at < ?1 \
             ORDER BY importance DESC, created_at ASC LIMIT ?2",
        )?;
        let older = stmt.query_map(params![cutoff, older_slots as i64], |r| r.get(0))?;
        for id in older.flatten() {
            ids.push(id);
        }
    }

    for id in &ids {
        conn.execute(
            "UPDATE memories SET core_strength = core_strength + ?1, \
             access_count = access_count + 1 WHERE id = ?2",
            params![boost, id],
        )?;
        record_access_tx(conn, id, now)?;
    }
    Ok(ids.len())
}
