//! Hebbian co-activation ledger. Pairs retrieved together accumulate a
//! count; at the threshold the pair becomes a formed bidirectional link
//! whose strength then rides reinforcement and decay.

use rusqlite::params;

use super::memory::finish_tx;
use super::*;

/// Tunables threaded into a co-activation batch.
#[derive(Debug, Clone, Copy)]
pub struct HebbianParams {
    pub threshold: i64,
    /// Strength added when an already-formed pair co-activates again.
    pub reinforce: f64,
    pub max_strength: f64,
}

impl MemoryStore {
    /// Record a co-activation batch in its own transaction. Duplicate ids
    /// are collapsed; self-pairs never form. Returns newly formed links in
    /// canonical order.
    pub fn record_coactivation(
        &self,
        ids: &[String],
        params: &HebbianParams,
    ) -> Result<Vec<(String, String)>, MnemonError> {
        self.check_writable()?;
        let r = (|| {
            let conn = self.conn()?;
            conn.execute_batch("BEGIN IMMEDIATE")?;
            let result = record_coactivation_tx(&conn, ids, now_secs(), params);
            finish_tx(&conn, result)
        })();
        self.noting(r)
    }

    /// Ids connected to `id` by a formed link (strength > 0).
    pub fn hebbian_neighbors(&self, id: &str) -> Result<Vec<String>, MnemonError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT target_id FROM hebbian_links WHERE source_id = ?1 AND strength > 0",
        )?;
        let ids = stmt
            .query_map(params![id], |r| r.get(0))?
            .filter_map(|r| r.map_err(|e| tracing::warn!("row parse: {e}")).ok())
            .collect();
        Ok(ids)
    }

    /// Every directional link row touching `id`, formed or tracking.
    pub fn hebbian_links_of(&self, id: &str) -> Result<Vec<HebbianLink>, MnemonError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT source_id, target_id, strength, coactivation_count \
             FROM hebbian_links WHERE source_id = ?1",
        )?;
        let links = stmt
            .query_map(params![id], |r| {
                Ok(HebbianLink {
                    source_id: r.get(0)?,
                    target_id: r.get(1)?,
                    strength: r.get(2)?,
                    coactivation_count: r.get(3)?,
                })
            })?
            .filter_map(|r| r.map_err(|e| tracing::warn!("row parse: {e}")).ok())
            .collect();
        Ok(links)
    }

    /// All formed links (both directions).
    pub fn hebbian_links(&self) -> Result<Vec<HebbianLink>, MnemonError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT source_id, target_id, strength, coactivation_count \
             FROM hebbian_links WHERE strength > 0",
        )?;
        let links = stmt
            .query_map([], |r| {
                Ok(HebbianLink {
                    source_id: r.get(0)?,
                    target_id: r.get(1)?,
                    strength: r.get(2)?,
                    coactivation_count: r.get(3)?,
                })
            })?
            .filter_map(|r| r.map_err(|e| tracing::warn!("row parse: {e}")).ok())
            .collect();
        Ok(links)
    }

    /// Boost an existing formed link in both directions, clamped at the cap.
    /// Returns whether a formed link was there to strengthen.
    pub fn strengthen_link(
        &self,
        id1: &str,
        id2: &str,
        boost: f64,
        max_strength: f64,
    ) -> Result<bool, MnemonError> {
        self.check_writable()?;
        let r = (|| {
            let conn = self.conn()?;
            let mut changed = 0;
            for (src, tgt) in [(id1, id2), (id2, id1)] {
                changed += conn.execute(
                    "UPDATE hebbian_links SET strength = MIN(?1, strength + ?2) \
                     WHERE source_id = ?3 AND target_id = ?4 AND strength > 0",
                    params![max_strength, boost, src, tgt],
                )?;
            }
            Ok(changed > 0)
        })();
        self.noting(r)
    }

    /// Multiply all formed link strengths by `factor`; prune links landing
    /// below `prune_below`. Tracking rows (strength 0) are untouched.
    /// Returns the number of directional rows pruned.
    pub fn decay_links(&self, factor: f64, prune_below: f64) -> Result<usize, MnemonError> {
        self.check_writable()?;
        let r = (|| {
            let conn = self.conn()?;
            conn.execute_batch("BEGIN IMMEDIATE")?;
            let result = decay_links_tx(&conn, factor, prune_below);
            finish_tx(&conn, result)
        })();
        self.noting(r)
    }
}

pub(super) fn record_coactivation_tx(
    conn: &rusqlite::Connection,
    ids: &[String],
    now: f64,
    p: &HebbianParams,
) -> Result<Vec<(String, String)>, MnemonError> {
    let mut unique: Vec<&String> = Vec::new();
    for id in ids {
        if !unique.contains(&id) {
            unique.push(id);
        }
    }
    let mut formed = Vec::new();
    for i in 0..unique.len() {
        for j in (i + 1)..unique.len() {
            let (a, b) = canonical(unique[i], unique[j]);
            if coactivate_pair_tx(conn, a, b, now, p)? {
                formed.push((a.to_string(), b.to_string()));
            }
        }
    }
    if !formed.is_empty() {
        tracing::debug!(count = formed.len(), "hebbian links formed");
    }
    Ok(formed)
}

fn canonical<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Increment one canonical pair; returns true when the link formed on this
/// call. Already-formed pairs are reinforced instead.
fn coactivate_pair_tx(
    conn: &rusqlite::Connection,
    id1: &str,
    id2: &str,
    now: f64,
    p: &HebbianParams,
) -> Result<bool, MnemonError> {
    let existing: Option<(f64, i64)> = conn
        .query_row(
            "SELECT strength, coactivation_count FROM hebbian_links \
             WHERE source_id = ?1 AND target_id = ?2",
            params![id1, id2],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .ok();

    match existing {
        Some((strength, _)) if strength > 0.0 => {
            // use it or lose it: re-coactivation counteracts decay
            let new_strength = (strength + p.reinforce).min(p.max_strength);
            for (src, tgt) in [(id1, id2), (id2, id1)] {
                conn.execute(
                    "UPDATE hebbian_links SET coactivation_count = coactivation_count + 1, \
                     strength = ?1 WHERE source_id = ?2 AND target_id = ?3",
                    params![new_strength, src, tgt],
                )?;
            }
            Ok(false)
        }
        Some((_, count)) => {
            let new_count = count + 1;
            if new_count >= p.threshold {
                conn.execute(
                    "UPDATE hebbian_links SET strength = 1.0, coactivation_count = ?1 \
                     WHERE source_id = ?2 AND target_id = ?3",
                    params![new_count, id1, id2],
                )?;
                conn.execute(
                    "INSERT OR REPLACE INTO hebbian_links \
                     (source_id, target_id, strength, coactivation_count, created_at) \
                     VALUES (?1, ?2, 1.0, ?3, ?4)",
                    params![id2, id1, new_count, now],
                )?;
                Ok(true)
            } else {
                conn.execute(
                    "UPDATE hebbian_links SET coactivation_count = ?1 \
                     WHERE source_id = ?2 AND target_id = ?3",
                    params![new_count, id1, id2],
                )?;
                Ok(false)
            }
        }
        None => {
            conn.execute(
                "INSERT INTO hebbian_links \
                 (source_id, target_id, strength, coactivation_count, created_at) \
                 VALUES (?1, ?2, 0.0, 1, ?3)",
                params![id1, id2, now],
            )?;
            Ok(false)
        }
    }
}

pub(crate) fn decay_links_tx(
    conn: &rusqlite::Connection,
    factor: f64,
    prune_below: f64,
) -> Result<usize, MnemonError> {
    conn.execute(
        "UPDATE hebbian_links SET strength = strength * ?1 WHERE strength > 0",
        params![factor],
    )?;
    let pruned = conn.execute(
        "DELETE FROM hebbian_links WHERE strength > 0 AND strength < ?1",
        params![prune_below],
    )?;
    Ok(pruned)
}
