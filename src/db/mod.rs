//! SQLite-backed storage: memory rows, access log, Hebbian links, entity
//! graph, and an FTS5 lexical index.

mod access;
mod entity;
mod fts;
mod hebbian;
mod memory;

pub(crate) use access::{record_access_tx, RecallEffects};
pub(crate) use hebbian::decay_links_tx;
pub(crate) use memory::finish_tx;
pub use hebbian::HebbianParams;
pub use memory::StrengthOp;

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

use fs2::FileExt;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use serde::{Deserialize, Serialize};

use crate::error::MnemonError;

/// Set busy_timeout on every connection handed out by the pool.
/// Prevents SQLITE_BUSY when a consolidation cycle overlaps reads.
#[derive(Debug)]
struct BusyTimeoutCustomizer;
impl r2d2::CustomizeConnection<rusqlite::Connection, rusqlite::Error> for BusyTimeoutCustomizer {
    fn on_acquire(&self, conn: &mut rusqlite::Connection) -> Result<(), rusqlite::Error> {
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(())
    }
}

type PooledConn = r2d2::PooledConnection<SqliteConnectionManager>;

pub(crate) const MAX_CONTENT_LEN: usize = 16_384;

/// Epoch seconds as a float. All persisted timestamps use this base.
pub fn now_secs() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock before Unix epoch")
        .as_secs_f64()
}

pub(crate) const SECS_PER_DAY: f64 = 86_400.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    Factual,
    Episodic,
    Relational,
    Emotional,
    Procedural,
    Opinion,
}

impl MemoryType {
    pub const ALL: [MemoryType; 6] = [
        MemoryType::Factual,
        MemoryType::Episodic,
        MemoryType::Relational,
        MemoryType::Emotional,
        MemoryType::Procedural,
        MemoryType::Opinion,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MemoryType::Factual => "factual",
            MemoryType::Episodic => "episodic",
            MemoryType::Relational => "relational",
            MemoryType::Emotional => "emotional",
            MemoryType::Procedural => "procedural",
            MemoryType::Opinion => "opinion",
        }
    }

    /// Initial working-trace mass for a fresh memory of this type.
    pub fn initial_working_strength(self) -> f64 {
        match self {
            MemoryType::Episodic => 1.0,
            MemoryType::Factual => 2.0,
            MemoryType::Relational => 2.0,
            MemoryType::Emotional => 3.0,
            MemoryType::Opinion => 1.5,
            MemoryType::Procedural => 2.5,
        }
    }

    /// Initial Ebbinghaus time constant, in days. Episodic traces are the
    /// most volatile, procedural the most durable.
    pub fn initial_stability(self) -> f64 {
        match self {
            MemoryType::Episodic => 1.0,
            MemoryType::Factual => 3.0,
            MemoryType::Relational => 4.0,
            MemoryType::Emotional => 6.0,
            MemoryType::Opinion => 2.0,
            MemoryType::Procedural => 10.0,
        }
    }

    /// Default importance assigned when the caller leaves it unset.
    pub fn default_importance(self) -> f64 {
        match self {
            MemoryType::Episodic => 0.4,
            MemoryType::Factual => 0.5,
            MemoryType::Relational => 0.55,
            MemoryType::Emotional => 0.6,
            MemoryType::Opinion => 0.45,
            MemoryType::Procedural => 0.6,
        }
    }
}

impl FromStr for MemoryType {
    type Err = MnemonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "factual" => Ok(MemoryType::Factual),
            "episodic" => Ok(MemoryType::Episodic),
            "relational" => Ok(MemoryType::Relational),
            "emotional" => Ok(MemoryType::Emotional),
            "procedural" => Ok(MemoryType::Procedural),
            "opinion" => Ok(MemoryType::Opinion),
            other => Err(MnemonError::UnknownType(other.to_string())),
        }
    }
}

/// Working → Core → Archive. Derived from the dual-trace strengths but
/// materialized for cheap filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Layer {
    Working = 1,
    Core = 2,
    Archive = 3,
}

impl Layer {
    pub fn as_str(self) -> &'static str {
        match self {
            Layer::Working => "working",
            Layer::Core => "core",
            Layer::Archive => "archive",
        }
    }
}

impl TryFrom<u8> for Layer {
    type Error = MnemonError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            1 => Ok(Layer::Working),
            2 => Ok(Layer::Core),
            3 => Ok(Layer::Archive),
            _ => Err(MnemonError::Validation(format!("invalid layer: {v}"))),
        }
    }
}

impl From<Layer> for u8 {
    fn from(l: Layer) -> u8 {
        l as u8
    }
}

/// A full memory row. Strength fields are raw stored traces; the
/// time-discounted view lives in [`crate::forget::effective_strength`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: String,
    pub content: String,
    pub memory_type: MemoryType,
    pub importance: f64,
    pub working_strength: f64,
    pub core_strength: f64,
    pub stability: f64,
    pub created_at: f64,
    pub last_accessed: f64,
    pub access_count: i64,
    pub layer: Layer,
    pub pinned: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contradicts: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contradicted_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

/// Input to `Memory::add`, builder style.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct MemoryInput {
    #[serde(default)]
    pub content: String,
    pub memory_type: Option<MemoryType>,
    pub importance: Option<f64>,
    pub source: Option<String>,
    pub tags: Option<Vec<String>>,
    /// Mark the new memory as superseding (contradicting) this id.
    pub contradicts: Option<String>,
}

impl MemoryInput {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn memory_type(mut self, t: MemoryType) -> Self {
        self.memory_type = Some(t);
        self
    }

    pub fn importance(mut self, i: f64) -> Self {
        self.importance = Some(i);
        self
    }

    pub fn source(mut self, s: impl Into<String>) -> Self {
        self.source = Some(s.into());
        self
    }

    pub fn tags(mut self, t: Vec<String>) -> Self {
        self.tags = Some(t);
        self
    }

    pub fn contradicts(mut self, id: impl Into<String>) -> Self {
        self.contradicts = Some(id.into());
        self
    }
}

/// One direction of an associative edge. Formed links (strength > 0) always
/// exist in both directions with equal strength and count.
#[derive(Debug, Clone, Serialize)]
pub struct HebbianLink {
    pub source_id: String,
    pub target_id: String,
    pub strength: f64,
    pub coactivation_count: i64,
}

#[derive(Debug, Default, Serialize)]
pub struct StatsReport {
    pub total: usize,
    pub working: usize,
    pub core: usize,
    pub archive: usize,
    pub pinned: usize,
    pub by_type: TypeCounts,
    pub avg_importance: f64,
    pub avg_working_strength: f64,
    pub avg_core_strength: f64,
    pub hebbian_links: usize,
    pub entities: usize,
}

#[derive(Debug, Default, Serialize)]
pub struct TypeCounts {
    pub factual: usize,
    pub episodic: usize,
    pub relational: usize,
    pub emotional: usize,
    pub procedural: usize,
    pub opinion: usize,
}

const SCHEMA_VERSION: i64 = 2;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS memories (
    id TEXT PRIMARY KEY,
    content TEXT NOT NULL,
    memory_type TEXT NOT NULL DEFAULT 'factual',
    importance REAL NOT NULL DEFAULT 0.5,
    working_strength REAL NOT NULL DEFAULT 0,
    core_strength REAL NOT NULL DEFAULT 0,
    stability REAL NOT NULL DEFAULT 1.0,
    created_at REAL NOT NULL,
    last_accessed REAL NOT NULL,
    access_count INTEGER NOT NULL DEFAULT 0,
    layer INTEGER NOT NULL DEFAULT 1,
    pinned INTEGER NOT NULL DEFAULT 0,
    source TEXT,
    tags TEXT NOT NULL DEFAULT '[]',
    contradicts TEXT,
    contradicted_by TEXT,
    embedding BLOB
);

CREATE INDEX IF NOT EXISTS idx_memories_layer ON memories(layer);
CREATE INDEX IF NOT EXISTS idx_memories_type ON memories(memory_type);
CREATE INDEX IF NOT EXISTS idx_memories_last_accessed ON memories(last_accessed);

CREATE TABLE IF NOT EXISTS access_log (
    memory_id TEXT NOT NULL,
    accessed_at REAL NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_access_memory ON access_log(memory_id);

CREATE TABLE IF NOT EXISTS hebbian_links (
    source_id TEXT NOT NULL,
    target_id TEXT NOT NULL,
    strength REAL NOT NULL DEFAULT 0,
    coactivation_count INTEGER NOT NULL DEFAULT 0,
    created_at REAL NOT NULL,
    PRIMARY KEY (source_id, target_id)
);
CREATE INDEX IF NOT EXISTS idx_hebbian_target ON hebbian_links(target_id);

CREATE TABLE IF NOT EXISTS memory_entities (
    memory_id TEXT NOT NULL,
    entity TEXT NOT NULL,
    PRIMARY KEY (memory_id, entity)
);
CREATE INDEX IF NOT EXISTS idx_entities_entity ON memory_entities(entity);

CREATE TABLE IF NOT EXISTS entity_links (
    entity_a TEXT NOT NULL,
    entity_b TEXT NOT NULL,
    cooccurrence INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (entity_a, entity_b)
);

CREATE TABLE IF NOT EXISTS mnemon_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

// External-content style FTS; rows are mirrored manually so the injected
// tokenizer can pre-process the indexed text.
const FTS_SCHEMA: &str = "CREATE VIRTUAL TABLE IF NOT EXISTS memories_fts USING fts5(\
     id UNINDEXED, content, tags, tokenize='unicode61')";

/// Single-process SQLite store. One process owns the file; a sidecar
/// advisory lock makes a second opener fail loudly.
pub struct MemoryStore {
    pool: Pool<SqliteConnectionManager>,
    /// Held for the store's lifetime; dropping releases the advisory lock.
    _lock: Option<std::fs::File>,
    /// Set after a hard I/O failure; writes then fail fast while reads
    /// continue to serve.
    degraded: AtomicBool,
}

impl MemoryStore {
    /// Open (or create) a database at the given path. `":memory:"` opens a
    /// private in-memory database (shared-cache so the pool sees one store).
    pub fn open(path: &str) -> Result<Self, MnemonError> {
        let (manager, lock, pool_size) = if path == ":memory:" {
            let name = uuid::Uuid::new_v4().to_string();
            (
                SqliteConnectionManager::file(format!("file:{name}?mode=memory&cache=shared")),
                None,
                2,
            )
        } else {
            (
                SqliteConnectionManager::file(path),
                Some(Self::acquire_lock(path)?),
                8,
            )
        };

        let pool = Pool::builder()
            .max_size(pool_size)
            .connection_customizer(Box::new(BusyTimeoutCustomizer))
            .build(manager)
            .map_err(|e| MnemonError::StorageUnavailable(format!("pool: {e}")))?;

        let conn = pool
            .get()
            .map_err(|e| MnemonError::StorageUnavailable(e.to_string()))?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA)?;
        conn.execute(FTS_SCHEMA, [])?;
        Self::check_schema_version(&conn)?;
        drop(conn);

        let store = Self {
            pool,
            _lock: lock,
            degraded: AtomicBool::new(false),
        };
        store.reindex_fts_if_stale()?;
        Ok(store)
    }

    fn acquire_lock(path: &str) -> Result<std::fs::File, MnemonError> {
        let lock_path = format!("{path}.lock");
        let file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .open(&lock_path)
            .map_err(|e| MnemonError::StorageUnavailable(format!("lock file {lock_path}: {e}")))?;
        file.try_lock_exclusive().map_err(|_| {
            MnemonError::StorageUnavailable(format!(
                "database {path} is locked by another process"
            ))
        })?;
        Ok(file)
    }

    /// Schema evolution is additive. A version newer than the code knows is
    /// refused; older versions are migrated in place.
    fn check_schema_version(conn: &rusqlite::Connection) -> Result<(), MnemonError> {
        let stored: Option<String> = conn
            .query_row(
                "SELECT value FROM mnemon_meta WHERE key = 'schema_version'",
                [],
                |r| r.get(0),
            )
            .ok();

        match stored.map(|v| v.parse::<i64>()) {
            Some(Ok(v)) if v > SCHEMA_VERSION => {
                return Err(MnemonError::Corruption {
                    found: v,
                    supported: SCHEMA_VERSION,
                })
            }
            Some(Ok(v)) if v < SCHEMA_VERSION => {
                Self::migrate(conn, v)?;
            }
            Some(Err(_)) => {
                return Err(MnemonError::Corruption {
                    found: -1,
                    supported: SCHEMA_VERSION,
                })
            }
            _ => {}
        }

        conn.execute(
            "INSERT OR REPLACE INTO mnemon_meta (key, value) VALUES ('schema_version', ?1)",
            [SCHEMA_VERSION.to_string()],
        )?;
        Ok(())
    }

    fn migrate(conn: &rusqlite::Connection, from: i64) -> Result<(), MnemonError> {
        // v1 → v2: contradiction tracking columns
        if from < 2 {
            if conn.prepare("SELECT contradicts FROM memories LIMIT 0").is_err() {
                conn.execute("ALTER TABLE memories ADD COLUMN contradicts TEXT", [])?;
                conn.execute("ALTER TABLE memories ADD COLUMN contradicted_by TEXT", [])?;
            }
            tracing::info!(from, to = SCHEMA_VERSION, "schema migrated");
        }
        Ok(())
    }

    pub(crate) fn conn(&self) -> Result<PooledConn, MnemonError> {
        self.pool
            .get()
            .map_err(|e| MnemonError::StorageUnavailable(format!("pool: {e}")))
    }

    /// Gate for mutating operations: a store that has seen a hard I/O
    /// failure stays read-only for the rest of the process lifetime.
    pub(crate) fn check_writable(&self) -> Result<(), MnemonError> {
        if self.degraded.load(Ordering::Relaxed) {
            return Err(MnemonError::StorageUnavailable(
                "store is in degraded read-only mode".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn note_failure(&self, err: &MnemonError) {
        if err.poisons_store() && !self.degraded.swap(true, Ordering::Relaxed) {
            tracing::warn!(error = %err, "hard storage failure, entering degraded read-only mode");
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    /// Wrap a write result, recording hard failures for the degraded gate.
    pub(crate) fn noting<T>(&self, r: Result<T, MnemonError>) -> Result<T, MnemonError> {
        if let Err(ref e) = r {
            self.note_failure(e);
        }
        r
    }

    pub fn get_meta(&self, key: &str) -> Option<String> {
        self.conn().ok().and_then(|c| {
            c.query_row("SELECT value FROM mnemon_meta WHERE key = ?1", [key], |r| r.get(0))
                .ok()
        })
    }
}

pub(crate) fn tags_to_json(tags: &[String]) -> String {
    serde_json::to_string(tags).unwrap_or_else(|_| "[]".into())
}

/// Column list excluding the embedding blob; scalar queries use this to skip
/// deserializing large vectors.
pub(crate) const META_COLS: &str = "id, content, memory_type, importance, working_strength, \
    core_strength, stability, created_at, last_accessed, access_count, layer, pinned, \
    source, tags, contradicts, contradicted_by";

pub(crate) fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<MemoryRecord> {
    row_to_record_impl(row, false)
}

pub(crate) fn row_to_record_with_embedding(row: &rusqlite::Row) -> rusqlite::Result<MemoryRecord> {
    row_to_record_impl(row, true)
}

fn row_to_record_impl(row: &rusqlite::Row, include_embedding: bool) -> rusqlite::Result<MemoryRecord> {
    let type_str: String = row.get("memory_type")?;
    let layer_val: u8 = row.get("layer")?;
    let tags_str: String = row.get("tags")?;
    let embedding = if include_embedding {
        let blob: Option<Vec<u8>> = row.get("embedding").ok().flatten();
        blob.map(|b| crate::capability::bytes_to_embedding(&b))
    } else {
        None
    };
    Ok(MemoryRecord {
        id: row.get("id")?,
        content: row.get("content")?,
        memory_type: type_str.parse().unwrap_or(MemoryType::Factual),
        importance: row.get("importance")?,
        working_strength: row.get("working_strength")?,
        core_strength: row.get("core_strength")?,
        stability: row.get("stability")?,
        created_at: row.get("created_at")?,
        last_accessed: row.get("last_accessed")?,
        access_count: row.get("access_count")?,
        layer: layer_val.try_into().unwrap_or(Layer::Working),
        pinned: row.get::<_, i64>("pinned")? != 0,
        source: row.get("source")?,
        tags: serde_json::from_str(&tags_str).unwrap_or_default(),
        contradicts: row.get("contradicts").unwrap_or(None),
        contradicted_by: row.get("contradicted_by").unwrap_or(None),
        embedding,
    })
}
