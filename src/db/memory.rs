//! Memory row CRUD and bulk operations.

use rusqlite::params;

use super::*;
use crate::capability::embedding_to_bytes;

impl MemoryStore {
    /// Insert a fully-constructed record, its FTS mirror, and its entity
    /// rows in one transaction. When `rec.contradicts` is set, the old row
    /// is marked `contradicted_by` in the same transaction.
    pub fn insert_record(
        &self,
        rec: &MemoryRecord,
        fts_text: &str,
        entities: &[String],
    ) -> Result<(), MnemonError> {
        self.check_writable()?;
        let r = self.insert_record_inner(rec, fts_text, entities);
        self.noting(r)
    }

    fn insert_record_inner(
        &self,
        rec: &MemoryRecord,
        fts_text: &str,
        entities: &[String],
    ) -> Result<(), MnemonError> {
        let conn = self.conn()?;
        conn.execute_batch("BEGIN IMMEDIATE")?;
        let result = (|| -> Result<(), MnemonError> {
            insert_row_tx(&conn, rec)?;
            conn.execute(
                "INSERT INTO memories_fts (id, content, tags) VALUES (?1, ?2, ?3)",
                params![rec.id, fts_text, tags_to_json(&rec.tags)],
            )?;
            super::entity::attach_entities_tx(&conn, &rec.id, entities)?;
            if let Some(ref old_id) = rec.contradicts {
                mark_contradicted_tx(&conn, old_id, &rec.id)?;
            }
            Ok(())
        })();
        finish_tx(&conn, result)
    }

    pub fn get(&self, id: &str) -> Result<Option<MemoryRecord>, MnemonError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT * FROM memories WHERE id = ?1")?;
        let mut rows = stmt.query(params![id])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_record_with_embedding(row)?)),
            None => Ok(None),
        }
    }

    /// `get` that treats a missing row as an error.
    pub fn require(&self, id: &str) -> Result<MemoryRecord, MnemonError> {
        self.get(id)?.ok_or(MnemonError::NotFound)
    }

    /// Hard delete. Access, Hebbian, entity, and FTS rows referring to the
    /// memory go in the same transaction.
    pub fn delete(&self, id: &str) -> Result<bool, MnemonError> {
        self.check_writable()?;
        let r = self.delete_inner(id);
        self.noting(r)
    }

    fn delete_inner(&self, id: &str) -> Result<bool, MnemonError> {
        let conn = self.conn()?;
        conn.execute_batch("BEGIN IMMEDIATE")?;
        let result = (|| -> Result<bool, MnemonError> {
            delete_row_tx(&conn, id)
        })();
        finish_tx(&conn, result)
    }

    /// Delete a batch of ids in one transaction; returns how many rows went.
    pub fn delete_many(&self, ids: &[String]) -> Result<usize, MnemonError> {
        self.check_writable()?;
        let r = self.delete_many_inner(ids);
        self.noting(r)
    }

    fn delete_many_inner(&self, ids: &[String]) -> Result<usize, MnemonError> {
        let conn = self.conn()?;
        conn.execute_batch("BEGIN IMMEDIATE")?;
        let result = (|| -> Result<usize, MnemonError> {
            let mut n = 0;
            for id in ids {
                if delete_row_tx(&conn, id)? {
                    n += 1;
                }
            }
            Ok(n)
        })();
        finish_tx(&conn, result)
    }

    /// Flip the pin flag. Returns whether the flag actually changed.
    pub fn set_pinned(&self, id: &str, pinned: bool) -> Result<bool, MnemonError> {
        self.check_writable()?;
        let r = (|| -> Result<bool, MnemonError> {
            let conn = self.conn()?;
            let current: Option<i64> = conn
                .query_row("SELECT pinned FROM memories WHERE id = ?1", params![id], |r| r.get(0))
                .ok();
            let Some(current) = current else {
                return Err(MnemonError::NotFound);
            };
            if (current != 0) == pinned {
                return Ok(false);
            }
            conn.execute(
                "UPDATE memories SET pinned = ?1 WHERE id = ?2",
                params![pinned as i64, id],
            )?;
            Ok(true)
        })();
        self.noting(r)
    }

    /// All rows without embeddings: the working set for forgetting and
    /// consolidation passes.
    pub fn list_all_meta(&self) -> Result<Vec<MemoryRecord>, MnemonError> {
        let conn = self.conn()?;
        let sql = format!("SELECT {META_COLS} FROM memories ORDER BY created_at ASC");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], row_to_record)?
            .filter_map(|r| r.map_err(|e| tracing::warn!("row parse: {e}")).ok())
            .collect();
        Ok(rows)
    }

    /// Fetch a set of rows by id, scalar columns only. Ids that no longer
    /// exist are silently skipped.
    pub fn get_many_meta(&self, ids: &[String]) -> Result<Vec<MemoryRecord>, MnemonError> {
        let conn = self.conn()?;
        let sql = format!("SELECT {META_COLS} FROM memories WHERE id = ?1");
        let mut stmt = conn.prepare(&sql)?;
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            let mut rows = stmt.query(params![id])?;
            if let Some(row) = rows.next()? {
                out.push(row_to_record(row)?);
            }
        }
        Ok(out)
    }

    /// Multiply both traces of every unpinned memory by `factor`.
    /// Returns the number of rows touched.
    pub fn downscale_unpinned(&self, factor: f64) -> Result<usize, MnemonError> {
        self.check_writable()?;
        let r = (|| {
            let n = self.conn()?.execute(
                "UPDATE memories SET working_strength = working_strength * ?1, \
                 core_strength = core_strength * ?1 WHERE pinned = 0",
                params![factor],
            )?;
            Ok(n)
        })();
        self.noting(r)
    }

    /// `(id, embedding)` pairs for every row that has one. Powers the
    /// optional semantic candidate stage.
    pub fn embedding_rows(&self) -> Result<Vec<(String, Vec<f32>)>, MnemonError> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT id, embedding FROM memories WHERE embedding IS NOT NULL")?;
        let rows = stmt
            .query_map([], |r| {
                let id: String = r.get(0)?;
                let blob: Vec<u8> = r.get(1)?;
                Ok((id, crate::capability::bytes_to_embedding(&blob)))
            })?
            .filter_map(|r| r.map_err(|e| tracing::warn!("row parse: {e}")).ok())
            .collect();
        Ok(rows)
    }

    pub fn count(&self) -> Result<usize, MnemonError> {
        let n: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM memories", [], |r| r.get(0))?;
        Ok(n as usize)
    }

    pub fn stats_report(&self) -> Result<StatsReport, MnemonError> {
        let conn = self.conn()?;
        let mut s = StatsReport::default();

        {
            let mut stmt = conn.prepare("SELECT layer, COUNT(*) FROM memories GROUP BY layer")?;
            let rows = stmt.query_map([], |r| Ok((r.get::<_, u8>(0)?, r.get::<_, i64>(1)? as usize)))?;
            for pair in rows.flatten() {
                s.total += pair.1;
                match pair.0 {
                    1 => s.working = pair.1,
                    2 => s.core = pair.1,
                    3 => s.archive = pair.1,
                    _ => {}
                }
            }
        }

        {
            let mut stmt =
                conn.prepare("SELECT memory_type, COUNT(*) FROM memories GROUP BY memory_type")?;
            let rows = stmt.query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)? as usize)))?;
            for (ty, n) in rows.flatten() {
                match ty.as_str() {
                    "factual" => s.by_type.factual = n,
                    "episodic" => s.by_type.episodic = n,
                    "relational" => s.by_type.relational = n,
                    "emotional" => s.by_type.emotional = n,
                    "procedural" => s.by_type.procedural = n,
                    "opinion" => s.by_type.opinion = n,
                    _ => {}
                }
            }
        }

        let averages: (f64, f64, f64) = conn
            .query_row(
                "SELECT COALESCE(AVG(importance), 0), COALESCE(AVG(working_strength), 0), \
                 COALESCE(AVG(core_strength), 0) FROM memories",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .unwrap_or((0.0, 0.0, 0.0));
        s.avg_importance = averages.0;
        s.avg_working_strength = averages.1;
        s.avg_core_strength = averages.2;

        s.pinned = conn
            .query_row("SELECT COUNT(*) FROM memories WHERE pinned = 1", [], |r| {
                r.get::<_, i64>(0)
            })
            .unwrap_or(0) as usize;
        // formed links are stored in both directions
        s.hebbian_links = conn
            .query_row(
                "SELECT COUNT(*) FROM hebbian_links WHERE strength > 0 AND source_id <= target_id",
                [],
                |r| r.get::<_, i64>(0),
            )
            .unwrap_or(0) as usize;
        s.entities = conn
            .query_row("SELECT COUNT(DISTINCT entity) FROM memory_entities", [], |r| {
                r.get::<_, i64>(0)
            })
            .unwrap_or(0) as usize;

        Ok(s)
    }

    /// Import records verbatim (strengths, timestamps, flags included).
    /// Existing ids are skipped, so re-import is idempotent. Returns the
    /// number of new rows.
    pub fn import(&self, records: &[MemoryRecord]) -> Result<usize, MnemonError> {
        self.check_writable()?;
        let r = self.import_inner(records);
        self.noting(r)
    }

    fn import_inner(&self, records: &[MemoryRecord]) -> Result<usize, MnemonError> {
        let conn = self.conn()?;
        conn.execute_batch("BEGIN IMMEDIATE")?;
        let result = (|| -> Result<usize, MnemonError> {
            let mut imported = 0;
            for rec in records {
                let exists: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM memories WHERE id = ?1",
                    params![rec.id],
                    |r| r.get(0),
                )?;
                if exists > 0 {
                    continue;
                }
                insert_row_tx(&conn, rec)?;
                conn.execute(
                    "INSERT INTO memories_fts (id, content, tags) VALUES (?1, ?2, ?3)",
                    params![rec.id, rec.content, tags_to_json(&rec.tags)],
                )?;
                imported += 1;
            }
            Ok(imported)
        })();
        finish_tx(&conn, result)
    }

    /// Copy the whole database to `path` via the SQLite backup API.
    /// Returns the size of the written file in bytes.
    pub fn export_backup(&self, path: &str) -> Result<u64, MnemonError> {
        let src = self.conn()?;
        let mut dst = rusqlite::Connection::open(path)?;
        {
            let backup = rusqlite::backup::Backup::new(&src, &mut dst)?;
            backup.run_to_completion(64, std::time::Duration::from_millis(5), None)?;
        }
        drop(dst);
        let bytes = std::fs::metadata(path)
            .map(|m| m.len())
            .map_err(|e| MnemonError::Internal(format!("export stat: {e}")))?;
        tracing::info!(path, bytes, "database exported");
        Ok(bytes)
    }
}

/// One memory's share of a reward batch.
#[derive(Debug, Clone)]
pub struct StrengthOp {
    pub id: String,
    pub working_mul: f64,
    pub working_add: f64,
    pub stability_mul: f64,
}

impl MemoryStore {
    /// Most recently accessed rows, newest first.
    pub fn recently_accessed_meta(&self, n: usize) -> Result<Vec<MemoryRecord>, MnemonError> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {META_COLS} FROM memories ORDER BY last_accessed DESC LIMIT ?1"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![n as i64], row_to_record)?
            .filter_map(|r| r.map_err(|e| tracing::warn!("row parse: {e}")).ok())
            .collect();
        Ok(rows)
    }

    /// Apply a batch of strength modulations atomically, clamped at the
    /// anomaly caps. Returns the number of rows updated.
    pub fn apply_strength_ops(
        &self,
        ops: &[StrengthOp],
        strength_cap: f64,
        stability_cap: f64,
    ) -> Result<usize, MnemonError> {
        self.check_writable()?;
        let r = (|| {
            let conn = self.conn()?;
            conn.execute_batch("BEGIN IMMEDIATE")?;
            let result = (|| -> Result<usize, MnemonError> {
                let mut n = 0;
                for op in ops {
                    n += conn.execute(
                        "UPDATE memories SET \
                         working_strength = MIN(?1, MAX(0.0, working_strength * ?2 + ?3)), \
                         stability = MIN(?4, stability * ?5) \
                         WHERE id = ?6",
                        params![
                            strength_cap,
                            op.working_mul,
                            op.working_add,
                            stability_cap,
                            op.stability_mul,
                            op.id
                        ],
                    )?;
                }
                Ok(n)
            })();
            finish_tx(&conn, result)
        })();
        self.noting(r)
    }
}

/// Insert the base row. Shared by insert and import paths; runs inside the
/// caller's transaction.
fn insert_row_tx(conn: &rusqlite::Connection, rec: &MemoryRecord) -> Result<(), MnemonError> {
    conn.execute(
        "INSERT INTO memories (id, content, memory_type, importance, working_strength, \
         core_strength, stability, created_at, last_accessed, access_count, layer, pinned, \
         source, tags, contradicts, contradicted_by, embedding) \
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17)",
        params![
            rec.id,
            rec.content,
            rec.memory_type.as_str(),
            rec.importance,
            rec.working_strength,
            rec.core_strength,
            rec.stability,
            rec.created_at,
            rec.last_accessed,
            rec.access_count,
            rec.layer as u8,
            rec.pinned as i64,
            rec.source,
            tags_to_json(&rec.tags),
            rec.contradicts,
            rec.contradicted_by,
            rec.embedding.as_deref().map(embedding_to_bytes),
        ],
    )?;
    Ok(())
}

fn delete_row_tx(conn: &rusqlite::Connection, id: &str) -> Result<bool, MnemonError> {
    conn.execute("DELETE FROM access_log WHERE memory_id = ?1", params![id])?;
    conn.execute(
        "DELETE FROM hebbian_links WHERE source_id = ?1 OR target_id = ?1",
        params![id],
    )?;
    conn.execute("DELETE FROM memory_entities WHERE memory_id = ?1", params![id])?;
    conn.execute("DELETE FROM memories_fts WHERE id = ?1", params![id])?;
    let n = conn.execute("DELETE FROM memories WHERE id = ?1", params![id])?;
    Ok(n > 0)
}

fn mark_contradicted_tx(
    conn: &rusqlite::Connection,
    old_id: &str,
    new_id: &str,
) -> Result<(), MnemonError> {
    let existing: Option<Option<String>> = conn
        .query_row(
            "SELECT contradicted_by FROM memories WHERE id = ?1",
            params![old_id],
            |r| r.get(0),
        )
        .ok();
    match existing {
        None => Err(MnemonError::NotFound),
        Some(Some(by)) => Err(MnemonError::Conflict(format!(
            "memory {old_id} is already contradicted by {by}"
        ))),
        Some(None) => {
            conn.execute(
                "UPDATE memories SET contradicted_by = ?1 WHERE id = ?2",
                params![new_id, old_id],
            )?;
            Ok(())
        }
    }
}

pub(crate) fn finish_tx<T>(
    conn: &rusqlite::Connection,
    result: Result<T, MnemonError>,
) -> Result<T, MnemonError> {
    match result {
        Ok(v) => {
            conn.execute_batch("COMMIT")?;
            Ok(v)
        }
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK");
            Err(e)
        }
    }
}
