//! Entity inverted index and co-occurrence adjacency. The adjacency is an
//! index, not a materialized relation; recall looks neighbors up on demand.

use std::collections::HashSet;

use rusqlite::params;

use super::*;

impl MemoryStore {
    /// Entities attached to a memory, insertion order not preserved.
    pub fn entities_of(&self, id: &str) -> Result<Vec<String>, MnemonError> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT entity FROM memory_entities WHERE memory_id = ?1")?;
        let out = stmt
            .query_map(params![id], |r| r.get(0))?
            .filter_map(|r| r.map_err(|e| tracing::warn!("row parse: {e}")).ok())
            .collect();
        Ok(out)
    }

    /// Union of entities referenced by a set of memories.
    pub fn entities_of_memories(&self, ids: &[String]) -> Result<HashSet<String>, MnemonError> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT entity FROM memory_entities WHERE memory_id = ?1")?;
        let mut out = HashSet::new();
        for id in ids {
            let rows = stmt.query_map(params![id], |r| r.get::<_, String>(0))?;
            for e in rows.flatten() {
                out.insert(e);
            }
        }
        Ok(out)
    }

    /// Expand an entity set by one hop in the co-occurrence adjacency.
    pub fn expand_entities(&self, entities: &HashSet<String>) -> Result<HashSet<String>, MnemonError> {
        let conn = self.conn()?;
        let mut expanded = entities.clone();
        let mut stmt = conn.prepare(
            "SELECT entity_a, entity_b FROM entity_links WHERE entity_a = ?1 OR entity_b = ?1",
        )?;
        for entity in entities {
            let rows = stmt.query_map(params![entity], |r| {
                Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
            })?;
            for (a, b) in rows.flatten() {
                expanded.insert(a);
                expanded.insert(b);
            }
        }
        Ok(expanded)
    }

    /// Ids of memories referencing any of the given entities.
    pub fn memories_with_entities(
        &self,
        entities: &HashSet<String>,
    ) -> Result<Vec<String>, MnemonError> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT memory_id FROM memory_entities WHERE entity = ?1")?;
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for entity in entities {
            let rows = stmt.query_map(params![entity], |r| r.get::<_, String>(0))?;
            for id in rows.flatten() {
                if seen.insert(id.clone()) {
                    out.push(id);
                }
            }
        }
        Ok(out)
    }

    pub fn entity_cooccurrence(&self, a: &str, b: &str) -> Result<i64, MnemonError> {
        let (x, y) = if a <= b { (a, b) } else { (b, a) };
        let n: i64 = self
            .conn()?
            .query_row(
                "SELECT COALESCE(SUM(cooccurrence), 0) FROM entity_links \
                 WHERE entity_a = ?1 AND entity_b = ?2",
                params![x, y],
                |r| r.get(0),
            )?;
        Ok(n)
    }
}

/// Store a memory's entities and bump the pairwise co-occurrence counters.
/// Runs inside the caller's transaction.
pub(super) fn attach_entities_tx(
    conn: &rusqlite::Connection,
    memory_id: &str,
    entities: &[String],
) -> Result<(), MnemonError> {
    let mut unique: Vec<&String> = Vec::new();
    for e in entities {
        if !e.is_empty() && !unique.contains(&e) {
            unique.push(e);
        }
    }
    for entity in &unique {
        conn.execute(
            "INSERT OR IGNORE INTO memory_entities (memory_id, entity) VALUES (?1, ?2)",
            params![memory_id, entity],
        )?;
    }
    for i in 0..unique.len() {
        for j in (i + 1)..unique.len() {
            let (a, b) = if unique[i] <= unique[j] {
                (unique[i], unique[j])
            } else {
                (unique[j], unique[i])
            };
            conn.execute(
                "INSERT INTO entity_links (entity_a, entity_b, cooccurrence) VALUES (?1, ?2, 1) \
                 ON CONFLICT(entity_a, entity_b) DO UPDATE SET cooccurrence = cooccurrence + 1",
                params![a, b],
            )?;
        }
    }
    Ok(())
}
