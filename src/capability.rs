//! Injectable capabilities: tokenization, entity extraction, embeddings.
//!
//! Each is a one-method trait with a trivial default so the engine works out
//! of the box. Richer implementations (CJK segmenters, NER models, embedding
//! APIs) are supplied by the embedding application.

use crate::error::MnemonError;

/// Splits text into index/query terms. The output feeds the full-text index,
/// so a plug-in segmenter changes what lexical search can match.
pub trait Tokenizer: Send + Sync {
    fn tokenize(&self, text: &str) -> Vec<String>;
}

/// Unicode-whitespace splitting, lowercased. Adequate for space-delimited
/// scripts; CJK needs an external segmenter.
#[derive(Debug, Default, Clone, Copy)]
pub struct WhitespaceTokenizer;

impl Tokenizer for WhitespaceTokenizer {
    fn tokenize(&self, text: &str) -> Vec<String> {
        text.split_whitespace().map(str::to_lowercase).collect()
    }
}

/// Pulls entity tokens out of memory content for the associative graph.
pub trait EntityExtractor: Send + Sync {
    fn extract(&self, text: &str) -> Vec<String>;
}

/// Extracts nothing. The entity graph stays empty and recall degrades
/// gracefully to lexical + Hebbian expansion.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoEntities;

impl EntityExtractor for NoEntities {
    fn extract(&self, _text: &str) -> Vec<String> {
        Vec::new()
    }
}

/// Maps a string to a fixed-dimension float vector.
pub trait EmbeddingProvider: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, MnemonError>;
}

/// Little-endian f32 blob encoding for the `embedding` column.
pub fn embedding_to_bytes(emb: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(emb.len() * 4);
    for v in emb {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

pub fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut na = 0.0f64;
    let mut nb = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        dot += f64::from(x) * f64::from(y);
        na += f64::from(x) * f64::from(x);
        nb += f64::from(y) * f64::from(y);
    }
    let mag = na.sqrt() * nb.sqrt();
    if mag == 0.0 {
        0.0
    } else {
        dot / mag
    }
}
