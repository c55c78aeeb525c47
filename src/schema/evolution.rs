//! Evolution configuration types for strategy search runs.
//!
//! This module provides the serde-backed configuration that drives the
//! generational loop: population sizing, exploration control, stopping
//! conditions, evaluation limits and fitness weights.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Metric name that makes the target check compare the fitness scalar itself.
pub const FITNESS_TARGET_METRIC: &str = "fitness";

/// Top-level configuration for an evolution run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionConfig {
    /// Maximum number of generations to run.
    #[serde(default = "default_max_generations")]
    pub max_generations: usize,
    /// Candidates requested from the variation step each generation.
    #[serde(default = "default_variants_per_generation")]
    pub variants_per_generation: usize,
    /// Capacity of the elite pool.
    #[serde(default = "default_elite_pool_size")]
    pub elite_pool_size: usize,
    /// Probability threshold for choosing mutation over crossover (0.0-1.0).
    #[serde(default = "default_mutation_rate")]
    pub mutation_rate: f64,
    /// Upper bound for the stagnation-adjusted mutation rate.
    #[serde(default = "default_max_mutation_rate")]
    pub max_mutation_rate: f64,
    /// Raise the mutation rate while the search stagnates.
    #[serde(default = "default_true")]
    pub adaptive_mutation: bool,
    /// Stop after this many generations without improvement.
    #[serde(default = "default_convergence_patience")]
    pub convergence_patience: usize,
    /// Stop early once the best variant reaches this value of `target_metric`.
    #[serde(default)]
    pub target_fitness: Option<f64>,
    /// Metric compared against `target_fitness` (`"fitness"` for the scalar).
    #[serde(default = "default_target_metric")]
    pub target_metric: String,
    /// Timeout for a single evaluation, in seconds.
    #[serde(default = "default_evaluation_timeout_secs")]
    pub evaluation_timeout_secs: u64,
    /// Timeout for a single oracle call, in seconds.
    #[serde(default = "default_generation_timeout_secs")]
    pub generation_timeout_secs: u64,
    /// Evaluations allowed in flight at once.
    #[serde(default = "default_max_concurrent_evaluations")]
    pub max_concurrent_evaluations: usize,
    /// Persist the state after every generation.
    #[serde(default = "default_true")]
    pub auto_save: bool,
    /// Directory holding one state document per evolution id.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    /// Score the baseline before generation 1 and offer it to the elite pool.
    #[serde(default)]
    pub evaluate_baseline: bool,
    /// Random seed for reproducibility.
    #[serde(default)]
    pub random_seed: Option<u64>,
    /// Fitness weights.
    #[serde(default)]
    pub fitness_weights: FitnessWeights,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            max_generations: default_max_generations(),
            variants_per_generation: default_variants_per_generation(),
            elite_pool_size: default_elite_pool_size(),
            mutation_rate: default_mutation_rate(),
            max_mutation_rate: default_max_mutation_rate(),
            adaptive_mutation: true,
            convergence_patience: default_convergence_patience(),
            target_fitness: None,
            target_metric: default_target_metric(),
            evaluation_timeout_secs: default_evaluation_timeout_secs(),
            generation_timeout_secs: default_generation_timeout_secs(),
            max_concurrent_evaluations: default_max_concurrent_evaluations(),
            auto_save: true,
            state_dir: default_state_dir(),
            evaluate_baseline: false,
            random_seed: None,
            fitness_weights: FitnessWeights::default(),
        }
    }
}

fn default_max_generations() -> usize {
    10
}
fn default_variants_per_generation() -> usize {
    5
}
fn default_elite_pool_size() -> usize {
    5
}
fn default_mutation_rate() -> f64 {
    0.7
}
fn default_max_mutation_rate() -> f64 {
    0.95
}
fn default_convergence_patience() -> usize {
    3
}
fn default_target_metric() -> String {
    "sharpe_ratio".to_string()
}
fn default_evaluation_timeout_secs() -> u64 {
    300
}
fn default_generation_timeout_secs() -> u64 {
    120
}
fn default_max_concurrent_evaluations() -> usize {
    4
}
fn default_state_dir() -> PathBuf {
    PathBuf::from("evolution_state")
}
fn default_true() -> bool {
    true
}

impl EvolutionConfig {
    /// Timeout applied to each evaluator call.
    pub fn evaluation_timeout(&self) -> Duration {
        Duration::from_secs(self.evaluation_timeout_secs)
    }

    /// Timeout applied to each oracle call.
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }

    /// Whether the target check compares the fitness scalar.
    pub fn targets_fitness(&self) -> bool {
        self.target_metric == FITNESS_TARGET_METRIC
    }
}

/// Weights combining backtest metrics into a single fitness scalar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitnessWeights {
    #[serde(default = "default_sharpe_weight")]
    pub sharpe_weight: f64,
    #[serde(default = "default_drawdown_weight")]
    pub drawdown_weight: f64,
    #[serde(default = "default_return_weight")]
    pub return_weight: f64,
    #[serde(default = "default_win_rate_weight")]
    pub win_rate_weight: f64,
}

impl Default for FitnessWeights {
    fn default() -> Self {
        Self {
            sharpe_weight: default_sharpe_weight(),
            drawdown_weight: default_drawdown_weight(),
            return_weight: default_return_weight(),
            win_rate_weight: default_win_rate_weight(),
        }
    }
}

fn default_sharpe_weight() -> f64 {
    0.4
}
fn default_drawdown_weight() -> f64 {
    0.3
}
fn default_return_weight() -> f64 {
    0.2
}
fn default_win_rate_weight() -> f64 {
    0.1
}

impl FitnessWeights {
    fn iter(&self) -> [(&'static str, f64); 4] {
        [
            ("sharpe_weight", self.sharpe_weight),
            ("drawdown_weight", self.drawdown_weight),
            ("return_weight", self.return_weight),
            ("win_rate_weight", self.win_rate_weight),
        ]
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Evolution configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("max_generations must be at least 1")]
    NoGenerations,
    #[error("variants_per_generation must be at least 1")]
    NoVariants,
    #[error("elite_pool_size must be at least 1")]
    EmptyElitePool,
    #[error("max_concurrent_evaluations must be at least 1")]
    NoConcurrency,
    #[error("convergence_patience must be at least 1")]
    NoPatience,
    #[error("Invalid rate: {0}")]
    InvalidRate(String),
    #[error("Invalid weight: {0}")]
    InvalidWeight(String),
    #[error("Timeouts must be positive")]
    InvalidTimeout,
}

impl EvolutionConfig {
    /// Validate evolution configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_generations == 0 {
            return Err(ConfigError::NoGenerations);
        }
        if self.variants_per_generation == 0 {
            return Err(ConfigError::NoVariants);
        }
        if self.elite_pool_size == 0 {
            return Err(ConfigError::EmptyElitePool);
        }
        if self.max_concurrent_evaluations == 0 {
            return Err(ConfigError::NoConcurrency);
        }
        if self.convergence_patience == 0 {
            return Err(ConfigError::NoPatience);
        }

        let check_rate = |rate: f64, name: &str| {
            if (0.0..=1.0).contains(&rate) {
                Ok(())
            } else {
                Err(ConfigError::InvalidRate(format!(
                    "{} ({}) must be within [0, 1]",
                    name, rate
                )))
            }
        };
        check_rate(self.mutation_rate, "mutation_rate")?;
        check_rate(self.max_mutation_rate, "max_mutation_rate")?;
        if self.max_mutation_rate < self.mutation_rate {
            return Err(ConfigError::InvalidRate(format!(
                "max_mutation_rate ({}) < mutation_rate ({})",
                self.max_mutation_rate, self.mutation_rate
            )));
        }

        for (name, weight) in self.fitness_weights.iter() {
            if !weight.is_finite() || weight < 0.0 {
                return Err(ConfigError::InvalidWeight(format!(
                    "{} ({}) must be finite and non-negative",
                    name, weight
                )));
            }
        }

        if self.evaluation_timeout_secs == 0 || self.generation_timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout);
        }

        Ok(())
    }
}
