//! The public façade. Owns the store, the configuration value, and the
//! injected capabilities; every engine operation goes through here.

use uuid::Uuid;

use crate::capability::{
    EmbeddingProvider, EntityExtractor, NoEntities, Tokenizer, WhitespaceTokenizer,
};
use crate::config::MemoryConfig;
use crate::consolidate::{self, ConsolidateSummary};
use crate::db::{
    now_secs, Layer, MemoryInput, MemoryRecord, MemoryStore, MemoryType, StatsReport,
    MAX_CONTENT_LEN,
};
use crate::error::MnemonError;
use crate::recall::{self, RecallOptions, RecallResult};
use crate::{forget, reward};

/// A persistent, cognitively-grounded memory engine over one database file.
///
/// The façade is re-entrant but not thread-safe; callers serialize access.
/// Two engines in one process may hold divergent configs.
pub struct Memory {
    store: MemoryStore,
    config: MemoryConfig,
    tokenizer: Box<dyn Tokenizer>,
    extractor: Box<dyn EntityExtractor>,
    embedder: Option<Box<dyn EmbeddingProvider>>,
}

impl Memory {
    /// Open with the default configuration and trivial capabilities.
    pub fn open(path: &str) -> Result<Self, MnemonError> {
        Self::open_with(path, MemoryConfig::default())
    }

    pub fn open_with(path: &str, config: MemoryConfig) -> Result<Self, MnemonError> {
        Ok(Self {
            store: MemoryStore::open(path)?,
            config,
            tokenizer: Box::new(WhitespaceTokenizer),
            extractor: Box::new(NoEntities),
            embedder: None,
        })
    }

    pub fn with_tokenizer(mut self, t: Box<dyn Tokenizer>) -> Self {
        self.tokenizer = t;
        self
    }

    pub fn with_entity_extractor(mut self, e: Box<dyn EntityExtractor>) -> Self {
        self.extractor = e;
        self
    }

    pub fn with_embedder(mut self, e: Box<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(e);
        self
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Direct store access for callers that need raw rows (tests, tooling).
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Store a new memory; returns its id.
    pub fn add(&self, input: MemoryInput) -> Result<String, MnemonError> {
        let content = input.content.trim();
        if content.is_empty() {
            return Err(MnemonError::EmptyContent);
        }
        if content.chars().count() > MAX_CONTENT_LEN {
            return Err(MnemonError::Validation("content too long".into()));
        }
        let memory_type = input.memory_type.unwrap_or(MemoryType::Factual);
        let importance = match input.importance {
            Some(i) if !(0.0..=1.0).contains(&i) || i.is_nan() => {
                return Err(MnemonError::ImportanceOutOfRange(i))
            }
            Some(i) => i,
            None => memory_type.default_importance(),
        };

        let now = now_secs();
        let core_strength = if importance >= self.config.consolidation.core_seed_floor {
            self.config.consolidation.core_seed
        } else {
            0.0
        };
        let embedding = self.embed_quietly(content);

        let record = MemoryRecord {
            id: Uuid::new_v4().to_string(),
            content: content.to_string(),
            memory_type,
            importance,
            working_strength: memory_type.initial_working_strength(),
            core_strength,
            stability: memory_type.initial_stability(),
            created_at: now,
            last_accessed: now,
            access_count: 0,
            layer: Layer::Working,
            pinned: false,
            source: input.source,
            tags: input.tags.unwrap_or_default(),
            contradicts: input.contradicts,
            contradicted_by: None,
            embedding,
        };

        let fts_text = self.tokenizer.tokenize(content).join(" ");
        let entities = self.extractor.extract(content);
        self.store.insert_record(&record, &fts_text, &entities)?;
        tracing::debug!(id = %record.id, memory_type = memory_type.as_str(), "memory added");
        Ok(record.id)
    }

    /// Rank memories against a query. Empty queries (and queries with no
    /// lexical hits) consider the whole store.
    pub fn recall(&self, query: &str, opts: RecallOptions) -> Result<Vec<RecallResult>, MnemonError> {
        recall::run(
            &self.store,
            &self.config,
            self.tokenizer.as_ref(),
            self.embedder.as_deref(),
            query,
            &opts,
        )
    }

    /// One consolidation cycle covering `days` of elapsed time.
    pub fn consolidate(&self, days: f64) -> Result<ConsolidateSummary, MnemonError> {
        consolidate::run(&self.store, &self.config, days)
    }

    /// Prune unpinned memories whose effective strength fell below the
    /// configured threshold. Returns the number deleted.
    pub fn forget(&self) -> Result<usize, MnemonError> {
        self.forget_below(self.config.forgetting.threshold)
    }

    /// Prune against an explicit threshold.
    pub fn forget_below(&self, threshold: f64) -> Result<usize, MnemonError> {
        if threshold < 0.0 || threshold.is_nan() {
            return Err(MnemonError::Validation(format!(
                "forget threshold {threshold} must be non-negative"
            )));
        }
        forget::prune(&self.store, threshold, now_secs())
    }

    /// Hard-delete one memory by id.
    pub fn forget_id(&self, id: &str) -> Result<(), MnemonError> {
        if self.store.delete(id)? {
            Ok(())
        } else {
            Err(MnemonError::NotFound)
        }
    }

    /// Free-text feedback: polarity is classified with a keyword heuristic,
    /// then applied to the most recently accessed memories. Returns the
    /// number of memories modulated.
    pub fn reward(&self, feedback: &str) -> Result<usize, MnemonError> {
        let score = reward::classify(feedback);
        if score == 0.0 {
            return Ok(0);
        }
        reward::apply(&self.store, &self.config, score)
    }

    /// Numeric reward signal in [−1, 1].
    pub fn reward_score(&self, score: f64) -> Result<usize, MnemonError> {
        reward::apply(&self.store, &self.config, score)
    }

    /// Returns whether the flag changed. Pinned memories are exempt from
    /// decay, archival, and pruning.
    pub fn pin(&self, id: &str) -> Result<bool, MnemonError> {
        self.store.set_pinned(id, true)
    }

    pub fn unpin(&self, id: &str) -> Result<bool, MnemonError> {
        self.store.set_pinned(id, false)
    }

    /// Supersede a memory with corrected content. The replacement copies the
    /// old metadata; the old row is soft-penalized via `contradicted_by`.
    /// Returns the new id.
    pub fn update_memory(&self, id: &str, new_content: &str) -> Result<String, MnemonError> {
        let content = new_content.trim();
        if content.is_empty() {
            return Err(MnemonError::EmptyContent);
        }
        let old = self.store.require(id)?;
        if let Some(by) = old.contradicted_by {
            return Err(MnemonError::Conflict(format!(
                "memory {id} is already contradicted by {by}"
            )));
        }

        let now = now_secs();
        let embedding = self.embed_quietly(content);
        let replacement = MemoryRecord {
            id: Uuid::new_v4().to_string(),
            content: content.to_string(),
            memory_type: old.memory_type,
            importance: old.importance,
            working_strength: old.memory_type.initial_working_strength(),
            core_strength: if old.importance >= self.config.consolidation.core_seed_floor {
                self.config.consolidation.core_seed
            } else {
                0.0
            },
            stability: old.memory_type.initial_stability(),
            created_at: now,
            last_accessed: now,
            access_count: 0,
            layer: Layer::Working,
            pinned: old.pinned,
            source: old.source,
            tags: old.tags,
            contradicts: Some(id.to_string()),
            contradicted_by: None,
            embedding,
        };

        let fts_text = self.tokenizer.tokenize(content).join(" ");
        let entities = self.extractor.extract(content);
        self.store.insert_record(&replacement, &fts_text, &entities)?;
        tracing::debug!(old = id, new = %replacement.id, "memory superseded");
        Ok(replacement.id)
    }

    pub fn stats(&self) -> Result<StatsReport, MnemonError> {
        self.store.stats_report()
    }

    /// Homeostatic downscaling outside a consolidation cycle.
    /// `factor` must be in (0, 1]. Returns the number of rows touched.
    pub fn downscale(&self, factor: f64) -> Result<usize, MnemonError> {
        if !(factor > 0.0 && factor <= 1.0) {
            return Err(MnemonError::InvalidFactor(factor));
        }
        self.store.downscale_unpinned(factor)
    }

    /// Copy the database to `path`; returns bytes written.
    pub fn export(&self, path: &str) -> Result<u64, MnemonError> {
        self.store.export_backup(path)
    }

    pub fn get(&self, id: &str) -> Result<Option<MemoryRecord>, MnemonError> {
        self.store.get(id)
    }

    fn embed_quietly(&self, content: &str) -> Option<Vec<f32>> {
        let embedder = self.embedder.as_ref()?;
        match embedder.embed(content) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(error = %e, "embedding provider failed, storing without vector");
                None
            }
        }
    }
}
