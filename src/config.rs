//! Engine configuration, grouped by concern.
//!
//! A `MemoryConfig` is a plain value held by the façade, so two engines in the
//! same process can carry divergent configs. Four named presets tune the
//! defaults for common deployment shapes.

use serde::{Deserialize, Serialize};

use crate::db::MemoryType;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub activation: ActivationConfig,
    pub forgetting: ForgettingConfig,
    pub consolidation: ConsolidationConfig,
    pub confidence: ConfidenceConfig,
    pub reward: RewardConfig,
    pub downscale: DownscaleConfig,
    pub hebbian: HebbianConfig,
    pub anomaly: AnomalyConfig,
}

/// ACT-R style activation weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivationConfig {
    /// `d` in the base-level term `ln(Σ (now − t_k + ε)^(−d))`.
    pub decay: f64,
    /// Floor on `now − t_k` in seconds, keeps same-tick accesses bounded.
    pub epsilon: f64,
    /// Per-keyword contribution of the context term.
    pub context_weight: f64,
    /// Weight on intrinsic importance.
    pub importance_weight: f64,
    /// Penalty applied when `contradicted_by` is set.
    pub contradiction_penalty: f64,
    /// Additive boost for pinned memories.
    pub pin_boost: f64,
    /// Scores below this are treated as unreachable.
    pub min_activation: f64,
}

impl Default for ActivationConfig {
    fn default() -> Self {
        Self {
            decay: 0.5,
            epsilon: 1e-3,
            context_weight: 1.5,
            importance_weight: 0.5,
            contradiction_penalty: 3.0,
            pin_boost: 1.0,
            min_activation: -10.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForgettingConfig {
    /// `forget()` prunes unpinned rows whose effective strength falls below this.
    pub threshold: f64,
    /// `stability *= (1 + stability_growth)` on every successful retrieval.
    pub stability_growth: f64,
}

impl Default for ForgettingConfig {
    fn default() -> Self {
        Self {
            threshold: 0.01,
            stability_growth: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsolidationConfig {
    /// μ₁: exponential decay rate of the working trace, per day.
    pub working_decay: f64,
    /// α: fraction of working strength transferred to core, per day.
    pub transfer_rate: f64,
    /// μ₂: exponential decay rate of the core trace, per day.
    pub core_decay: f64,
    /// Floor on importance in the transfer term.
    pub importance_floor: f64,
    /// Share of the replay sample drawn from the last 24 hours.
    pub interleave_ratio: f64,
    /// Core strength added to every replayed memory.
    pub replay_boost: f64,
    /// Replay sample size per cycle.
    pub replay_sample: usize,
    /// Core strength at or above which a memory is promoted to the core layer.
    pub promote_threshold: f64,
    /// Core strength at or below which a memory may be archived.
    pub demote_threshold: f64,
    /// Working strength at or below which a demotable memory is archived.
    pub archive_threshold: f64,
    /// New memories with importance at or above this get a core seed.
    pub core_seed_floor: f64,
    /// The seed added when the floor is met.
    pub core_seed: f64,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            working_decay: 0.15,
            transfer_rate: 0.08,
            core_decay: 0.005,
            importance_floor: 0.1,
            interleave_ratio: 0.3,
            replay_boost: 0.01,
            replay_sample: 10,
            promote_threshold: 0.25,
            demote_threshold: 0.05,
            archive_threshold: 0.15,
            core_seed_floor: 0.75,
            core_seed: 0.05,
        }
    }
}

/// Metacognitive confidence: reliability (per-type prior) × salience (strength).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceConfig {
    pub factual_reliability: f64,
    pub episodic_reliability: f64,
    pub relational_reliability: f64,
    pub emotional_reliability: f64,
    pub procedural_reliability: f64,
    pub opinion_reliability: f64,
    /// Multiplier applied to reliability when the memory is contradicted.
    pub contradiction_factor: f64,
    /// `k` in `sigmoid(k · (strength − 0.5))`.
    pub salience_slope: f64,
    pub reliability_weight: f64,
    pub salience_weight: f64,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            factual_reliability: 0.85,
            episodic_reliability: 0.90,
            relational_reliability: 0.75,
            emotional_reliability: 0.95,
            procedural_reliability: 0.90,
            opinion_reliability: 0.60,
            contradiction_factor: 0.3,
            salience_slope: 2.0,
            reliability_weight: 0.7,
            salience_weight: 0.3,
        }
    }
}

impl ConfidenceConfig {
    pub fn reliability(&self, ty: MemoryType) -> f64 {
        match ty {
            MemoryType::Factual => self.factual_reliability,
            MemoryType::Episodic => self.episodic_reliability,
            MemoryType::Relational => self.relational_reliability,
            MemoryType::Emotional => self.emotional_reliability,
            MemoryType::Procedural => self.procedural_reliability,
            MemoryType::Opinion => self.opinion_reliability,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    /// Number of most-recently-accessed memories modulated per signal.
    pub window: usize,
    /// γ in `w_k = γ^k`, with k = 0 the oldest position.
    pub gamma: f64,
    /// Working strength added per unit of positive signal.
    pub magnitude: f64,
    /// Relative stability growth per unit of positive signal.
    pub strength_boost: f64,
    /// Relative working-strength suppression per unit of negative signal.
    pub suppression: f64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            window: 3,
            gamma: 0.5,
            magnitude: 0.5,
            strength_boost: 0.1,
            suppression: 0.3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownscaleConfig {
    /// Homeostatic multiplier applied to both traces of unpinned memories.
    pub factor: f64,
}

impl Default for DownscaleConfig {
    fn default() -> Self {
        Self { factor: 0.95 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HebbianConfig {
    pub enabled: bool,
    /// Co-activations needed before a tracked pair becomes a formed link.
    pub threshold: i64,
    /// Strength added when an already-formed pair co-activates again.
    pub reinforce: f64,
    /// Per-day multiplicative decay of link strength.
    pub decay: f64,
    /// Formed links decaying below this are pruned.
    pub prune_below: f64,
    /// Hard cap on link strength.
    pub max_strength: f64,
}

impl Default for HebbianConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 3,
            reinforce: 0.1,
            decay: 0.95,
            prune_below: 0.1,
            max_strength: 2.0,
        }
    }
}

/// Runaway-dynamics guard: hard caps keeping cumulative reinforcement bounded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    /// Cap on either trace of a single memory.
    pub max_strength: f64,
    /// Cap on the Ebbinghaus time constant, in days.
    pub max_stability: f64,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            max_strength: 1_000.0,
            max_stability: 365.0,
        }
    }
}

impl MemoryConfig {
    /// Long-lived companion: slow working decay, gentle pruning, wider
    /// reward window so multi-turn feedback reaches further back.
    pub fn chatbot() -> Self {
        let mut c = Self::default();
        c.consolidation.working_decay = 0.10;
        c.forgetting.threshold = 0.005;
        c.reward.window = 4;
        c
    }

    /// Short-lived executor: aggressive decay and pruning, higher bar for
    /// promotion into core.
    pub fn task_agent() -> Self {
        let mut c = Self::default();
        c.consolidation.working_decay = 0.25;
        c.forgetting.threshold = 0.05;
        c.consolidation.promote_threshold = 0.35;
        c
    }

    /// People-and-events tracker: relational facts are trusted more and
    /// recent days replay more heavily.
    pub fn personal_assistant() -> Self {
        let mut c = Self::default();
        c.confidence.relational_reliability = 0.85;
        c.consolidation.interleave_ratio = 0.4;
        c.forgetting.threshold = 0.008;
        c
    }

    /// Archive-everything: near-zero pruning, reluctant archival, links form
    /// after two co-retrievals.
    pub fn researcher() -> Self {
        let mut c = Self::default();
        c.forgetting.threshold = 0.001;
        c.consolidation.demote_threshold = 0.01;
        c.downscale.factor = 0.98;
        c.hebbian.threshold = 2;
        c
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_diverge_from_default() {
        let base = MemoryConfig::default();
        assert!(MemoryConfig::task_agent().consolidation.working_decay > base.consolidation.working_decay);
        assert!(MemoryConfig::chatbot().forgetting.threshold < base.forgetting.threshold);
        assert_eq!(MemoryConfig::researcher().hebbian.threshold, 2);
    }

    #[test]
    fn reliability_lookup() {
        let c = ConfidenceConfig::default();
        assert!(c.reliability(MemoryType::Emotional) > c.reliability(MemoryType::Opinion));
    }
}
