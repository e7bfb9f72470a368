//! FTS5 lexical index, maintained manually alongside the base rows so the
//! injected tokenizer controls what gets indexed.

use rusqlite::params;

use super::*;

impl MemoryStore {
    /// Lexical search. `terms` are OR-joined; returns `(id, score)` pairs
    /// with higher scores better (negated bm25 rank).
    pub fn search_fts(&self, terms: &[String], limit: usize) -> Vec<(String, f64)> {
        let sanitized: Vec<String> = terms
            .iter()
            .map(|t| {
                t.chars()
                    .map(|c| if c.is_alphanumeric() { c } else { ' ' })
                    .collect::<String>()
                    .trim()
                    .to_string()
            })
            .filter(|t| !t.is_empty())
            .collect();
        if sanitized.is_empty() {
            return vec![];
        }
        let fts_query = sanitized.join(" OR ");

        let Ok(conn) = self.conn() else { return vec![] };
        let Ok(mut stmt) = conn.prepare(
            "SELECT id, rank FROM memories_fts WHERE memories_fts MATCH ?1 \
             ORDER BY rank LIMIT ?2",
        ) else {
            return vec![];
        };

        stmt.query_map(params![fts_query, limit as i64], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
        })
        .map(|iter| iter.filter_map(|r| r.ok()).map(|(id, rank)| (id, -rank)).collect())
        .unwrap_or_default()
    }

    /// Rebuild the FTS mirror from the base table when the two disagree
    /// (e.g. after a crash between mirrored writes). Runs at open.
    pub(super) fn reindex_fts_if_stale(&self) -> Result<(), MnemonError> {
        let conn = self.conn()?;
        let mem_count: i64 = conn.query_row("SELECT COUNT(*) FROM memories", [], |r| r.get(0))?;
        let fts_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM memories_fts", [], |r| r.get(0))?;
        if mem_count == fts_count {
            return Ok(());
        }

        conn.execute("DELETE FROM memories_fts", [])?;
        let mut stmt = conn.prepare("SELECT id, content, tags FROM memories")?;
        let rows: Vec<(String, String, String)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .filter_map(|r| r.ok())
            .collect();
        for (id, content, tags) in &rows {
            conn.execute(
                "INSERT INTO memories_fts (id, content, tags) VALUES (?1, ?2, ?3)",
                params![id, content, tags],
            )?;
        }
        tracing::info!(count = rows.len(), "rebuilt stale FTS index");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_store() -> MemoryStore {
        let store = MemoryStore::open(":memory:").expect("in-memory store");
        let rec = MemoryRecord {
            id: "m1".into(),
            content: "the quick brown fox jumps".into(),
            memory_type: MemoryType::Factual,
            importance: 0.5,
            working_strength: 2.0,
            core_strength: 0.0,
            stability: 3.0,
            created_at: now_secs(),
            last_accessed: now_secs(),
            access_count: 0,
            layer: Layer::Working,
            pinned: false,
            source: None,
            tags: vec![],
            contradicts: None,
            contradicted_by: None,
            embedding: None,
        };
        store
            .insert_record(&rec, &rec.content, &[])
            .expect("insert");
        store
    }

    #[test]
    fn fts_finds_content() {
        let store = seeded_store();
        let hits = store.search_fts(&["quick".into(), "fox".into()], 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, "m1");
    }

    #[test]
    fn fts_sanitizes_operators() {
        let store = seeded_store();
        // FTS5 syntax characters must not leak into the MATCH expression
        let hits = store.search_fts(&["fox\"(".into()], 10);
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn fts_empty_terms() {
        let store = seeded_store();
        assert!(store.search_fts(&[], 10).is_empty());
        assert!(store.search_fts(&["???".into()], 10).is_empty());
    }
}
