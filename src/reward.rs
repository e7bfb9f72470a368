//! Reward modulation: a signed signal nudges the working trace of the most
//! recently touched memories, scaled by a geometric position weight.

use crate::config::MemoryConfig;
use crate::db::{MemoryStore, StrengthOp};
use crate::error::MnemonError;

const POSITIVE_MARKERS: [&str; 12] = [
    "good", "great", "thanks", "thank", "perfect", "correct", "yes", "helpful", "right",
    "excellent", "awesome", "nice",
];

const NEGATIVE_MARKERS: [&str; 10] = [
    "wrong", "bad", "incorrect", "no", "not", "stop", "terrible", "useless", "false", "never",
];

/// Keyword-vote polarity for free-text feedback. Returns a score in
/// {−1, 0, +1}; ties and marker-free text are neutral.
pub fn classify(feedback: &str) -> f64 {
    let lowered = feedback.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let pos = words.iter().filter(|w| POSITIVE_MARKERS.contains(w)).count();
    let neg = words.iter().filter(|w| NEGATIVE_MARKERS.contains(w)).count();
    match pos.cmp(&neg) {
        std::cmp::Ordering::Greater => 1.0,
        std::cmp::Ordering::Less => -1.0,
        std::cmp::Ordering::Equal => 0.0,
    }
}

/// Modulate the `window` most recently accessed memories by a signed score
/// in [−1, 1]. Per-position weight is `γ^k` with k = 0 the oldest of the
/// window. All writes land in one transaction; returns the rows touched.
pub fn apply(store: &MemoryStore, cfg: &MemoryConfig, score: f64) -> Result<usize, MnemonError> {
    if !(-1.0..=1.0).contains(&score) || score.is_nan() {
        return Err(MnemonError::Validation(format!(
            "reward score {score} out of range [-1, 1]"
        )));
    }
    if score == 0.0 {
        return Ok(0);
    }

    let mut window = store.recently_accessed_meta(cfg.reward.window)?;
    if window.is_empty() {
        return Ok(0);
    }
    // recently_accessed is newest-first; position weights index from the oldest
    window.reverse();

    let magnitude = score.abs();
    let ops: Vec<StrengthOp> = window
        .iter()
        .enumerate()
        .map(|(k, m)| {
            let w = cfg.reward.gamma.powi(k as i32);
            if score > 0.0 {
                StrengthOp {
                    id: m.id.clone(),
                    working_mul: 1.0,
                    working_add: cfg.reward.magnitude * magnitude * w,
                    stability_mul: 1.0 + cfg.reward.strength_boost * magnitude * w,
                }
            } else {
                StrengthOp {
                    id: m.id.clone(),
                    working_mul: 1.0 - cfg.reward.suppression * magnitude * w,
                    working_add: 0.0,
                    stability_mul: 1.0,
                }
            }
        })
        .collect();

    let n = store.apply_strength_ops(&ops, cfg.anomaly.max_strength, cfg.anomaly.max_stability)?;
    tracing::debug!(modulated = n, score, "reward applied");
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_polarity() {
        assert_eq!(classify("Great job, thanks!"), 1.0);
        assert_eq!(classify("that was wrong and useless"), -1.0);
        assert_eq!(classify("the weather is cloudy"), 0.0);
    }

    #[test]
    fn classify_ties_are_neutral() {
        assert_eq!(classify("good but wrong"), 0.0);
    }

    #[test]
    fn classify_ignores_case_and_punctuation() {
        assert_eq!(classify("PERFECT!!!"), 1.0);
    }
}
