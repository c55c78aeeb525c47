//! Outcome of a finished (or stopped) evolution run.

use serde::{Deserialize, Serialize};

use super::{EvolutionStatus, StopReason, Variant};

/// Final results of evolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionResult {
    pub evolution_id: String,
    /// Best variant in the elite pool, if any was ever evaluated.
    pub best: Option<Variant>,
    pub status: EvolutionStatus,
    pub stop_reason: StopReason,
    pub stats: EvolutionStats,
}

/// Evolution run statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionStats {
    /// Last completed generation.
    pub generations: usize,
    /// Evaluations attempted by this process.
    pub total_evaluations: u64,
    /// Evaluations that produced no fitness.
    pub failed_evaluations: u64,
    /// Best fitness in the elite pool.
    pub best_fitness: Option<f64>,
    /// Wall-clock time of this process's run.
    pub elapsed_seconds: f64,
}
