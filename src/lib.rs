//! Cognitively-grounded persistent memory for conversational agents.
//!
//! Memories are short text traces with typed metadata, ranked at recall time
//! by an ACT-R style activation score (recency + frequency + context +
//! importance) and reshaped continuously by Ebbinghaus decay, dual-trace
//! consolidation, reward modulation, Hebbian link formation, and homeostatic
//! downscaling. Everything lives in one SQLite file with an FTS5 index.
//!
//! ```no_run
//! use mnemon::{Memory, MemoryInput, MemoryType, RecallOptions};
//!
//! let mem = Memory::open("./agent.db")?;
//! mem.add(MemoryInput::new("the sky is blue").memory_type(MemoryType::Factual))?;
//! let results = mem.recall("sky color", RecallOptions::default())?;
//! mem.consolidate(1.0)?;
//! # Ok::<(), mnemon::MnemonError>(())
//! ```

pub mod activation;
pub mod capability;
pub mod confidence;
pub mod config;
pub mod consolidate;
pub mod db;
pub mod error;
pub mod forget;
pub mod memory;
pub mod recall;
pub mod reward;

pub use capability::{EmbeddingProvider, EntityExtractor, Tokenizer};
pub use config::MemoryConfig;
pub use consolidate::ConsolidateSummary;
pub use db::{HebbianLink, Layer, MemoryInput, MemoryRecord, MemoryStore, MemoryType, StatsReport};
pub use error::MnemonError;
pub use memory::Memory;
pub use recall::{RecallOptions, RecallResult};
