//! Metacognitive confidence: a stable per-type reliability prior blended
//! with a salience signal that tracks the memory's effective strength.

use crate::config::ConfidenceConfig;
use crate::db::MemoryRecord;
use crate::forget::effective_strength;

pub const LABEL_CERTAIN: &str = "certain";
pub const LABEL_LIKELY: &str = "likely";
pub const LABEL_UNCERTAIN: &str = "uncertain";
pub const LABEL_VAGUE: &str = "vague";

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Type prior, attenuated when the memory has been contradicted.
pub fn reliability(record: &MemoryRecord, cfg: &ConfidenceConfig) -> f64 {
    let base = cfg.reliability(record.memory_type);
    if record.contradicted_by.is_some() {
        cfg.contradiction_factor * base
    } else {
        base
    }
}

/// `sigmoid(k * (effective_strength - 0.5))`: strong traces feel vivid,
/// faded ones do not.
pub fn salience(record: &MemoryRecord, now: f64, cfg: &ConfidenceConfig) -> f64 {
    sigmoid(cfg.salience_slope * (effective_strength(record, now) - 0.5))
}

pub fn confidence(record: &MemoryRecord, now: f64, cfg: &ConfidenceConfig) -> f64 {
    cfg.reliability_weight * reliability(record, cfg) + cfg.salience_weight * salience(record, now, cfg)
}

pub fn label(value: f64) -> &'static str {
    if value >= 0.75 {
        LABEL_CERTAIN
    } else if value >= 0.5 {
        LABEL_LIKELY
    } else if value >= 0.25 {
        LABEL_UNCERTAIN
    } else {
        LABEL_VAGUE
    }
}
