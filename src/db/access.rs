//! Access-history bookkeeping. One row per retrieval event; the base-level
//! activation term reads the whole history.

use rusqlite::params;

use super::hebbian::record_coactivation_tx;
use super::memory::finish_tx;
use super::*;

/// Per-recall write batch: access rows, counters, stability growth, and the
/// Hebbian co-activation updates, committed as one transaction.
#[derive(Debug, Clone)]
pub(crate) struct RecallEffects {
    pub stability_growth: f64,
    pub stability_cap: f64,
    pub hebbian: Option<HebbianParams>,
}

impl MemoryStore {
    /// Access timestamps for one memory, oldest first.
    pub fn access_times(&self, id: &str) -> Result<Vec<f64>, MnemonError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT accessed_at FROM access_log WHERE memory_id = ?1 ORDER BY accessed_at ASC",
        )?;
        let times = stmt
            .query_map(params![id], |r| r.get(0))?
            .filter_map(|r| r.map_err(|e| tracing::warn!("row parse: {e}")).ok())
            .collect();
        Ok(times)
    }

    pub fn access_count_rows(&self, id: &str) -> Result<i64, MnemonError> {
        let n: i64 = self.conn()?.query_row(
            "SELECT COUNT(*) FROM access_log WHERE memory_id = ?1",
            params![id],
            |r| r.get(0),
        )?;
        Ok(n)
    }

    /// Apply the retrieval side effects for the memories a recall returned.
    /// Returns the pairs whose Hebbian link formed during this batch.
    pub(crate) fn commit_recall_effects(
        &self,
        ids: &[String],
        now: f64,
        effects: &RecallEffects,
    ) -> Result<Vec<(String, String)>, MnemonError> {
        self.check_writable()?;
        let r = self.commit_recall_effects_inner(ids, now, effects);
        self.noting(r)
    }

    fn commit_recall_effects_inner(
        &self,
        ids: &[String],
        now: f64,
        effects: &RecallEffects,
    ) -> Result<Vec<(String, String)>, MnemonError> {
        let conn = self.conn()?;
        conn.execute_batch("BEGIN IMMEDIATE")?;
        let result = (|| -> Result<Vec<(String, String)>, MnemonError> {
            for id in ids {
                record_access_tx(&conn, id, now)?;
                conn.execute(
                    "UPDATE memories SET access_count = access_count + 1, last_accessed = ?1, \
                     stability = MIN(?2, stability * (1.0 + ?3)) WHERE id = ?4",
                    params![now, effects.stability_cap, effects.stability_growth, id],
                )?;
            }
            match effects.hebbian {
                Some(ref params) => record_coactivation_tx(&conn, ids, now, params),
                None => Ok(Vec::new()),
            }
        })();
        finish_tx(&conn, result)
    }
}

/// Append one access row. Runs inside the caller's transaction; the replay
/// step of consolidation uses it for synthetic accesses.
pub(crate) fn record_access_tx(
    conn: &rusqlite::Connection,
    id: &str,
    at: f64,
) -> Result<(), MnemonError> {
    conn.execute(
        "INSERT INTO access_log (memory_id, accessed_at) VALUES (?1, ?2)",
        params![id, at],
    )?;
    Ok(())
}
