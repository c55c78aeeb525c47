//! Records produced by an evolution run: variants, generation records,
//! evaluation results and run status.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Id reserved for the baseline variant.
pub const BASELINE_ID: &str = "baseline";

/// One candidate strategy artifact and its evaluation outcome.
///
/// A variant is created once (by the variation step, or as the baseline at
/// bootstrap) and only ever gains `metrics`/`fitness` afterwards. A variant
/// whose `fitness` is `None` has never been successfully evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    /// Unique identifier within the run.
    pub id: String,
    /// Generation that produced the variant (0 for the baseline).
    pub generation: usize,
    /// Strategy source code.
    pub code: String,
    /// Parent ids, empty only for the baseline.
    pub parent_ids: Vec<String>,
    /// Human-readable description of the change.
    pub description: String,
    /// Raw evaluation metrics.
    #[serde(default)]
    pub metrics: Option<BTreeMap<String, f64>>,
    /// Combined fitness score.
    #[serde(default)]
    pub fitness: Option<f64>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Variant {
    /// Create an unevaluated variant.
    pub fn new(
        id: impl Into<String>,
        generation: usize,
        code: impl Into<String>,
        parent_ids: Vec<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            generation,
            code: code.into(),
            parent_ids,
            description: description.into(),
            metrics: None,
            fitness: None,
            created_at: Utc::now(),
        }
    }

    /// Create the baseline variant every run starts from.
    pub fn baseline(code: impl Into<String>) -> Self {
        Self::new(BASELINE_ID, 0, code, Vec::new(), "Baseline strategy")
    }

    /// Attach the outcome of a successful evaluation.
    pub fn attach_evaluation(&mut self, metrics: BTreeMap<String, f64>, fitness: f64) {
        self.metrics = Some(metrics);
        self.fitness = Some(fitness);
    }

    /// Whether the variant has been successfully evaluated.
    pub fn is_evaluated(&self) -> bool {
        self.fitness.is_some()
    }

    pub fn is_baseline(&self) -> bool {
        self.parent_ids.is_empty()
    }

    /// Look up a raw metric by name.
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.as_ref().and_then(|m| m.get(name).copied())
    }
}

/// Metrics returned by the evaluation service for one variant.
///
/// Metrics the service leaves out read as `0.0`, except `max_drawdown`,
/// which stays absent and is scored as a total loss.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EvaluationResult {
    #[serde(default)]
    pub sharpe_ratio: f64,
    #[serde(default)]
    pub total_return: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_drawdown: Option<f64>,
    #[serde(default)]
    pub win_rate: f64,
    #[serde(default)]
    pub total_trades: u64,
    #[serde(default)]
    pub cagr: f64,
}

impl EvaluationResult {
    /// Flatten into the metric map stored on a variant. An unreported
    /// drawdown is left out of the map.
    pub fn to_metrics(&self) -> BTreeMap<String, f64> {
        let mut metrics = BTreeMap::from([
            ("sharpe_ratio".to_string(), self.sharpe_ratio),
            ("total_return".to_string(), self.total_return),
            ("win_rate".to_string(), self.win_rate),
            ("total_trades".to_string(), self.total_trades as f64),
            ("cagr".to_string(), self.cagr),
        ]);
        if let Some(drawdown) = self.max_drawdown {
            metrics.insert("max_drawdown".to_string(), drawdown);
        }
        metrics
    }

    /// Whether every metric is a finite number.
    pub fn is_finite(&self) -> bool {
        [
            self.sharpe_ratio,
            self.total_return,
            self.win_rate,
            self.cagr,
        ]
        .iter()
        .chain(self.max_drawdown.iter())
        .all(|v| v.is_finite())
    }
}

/// Summary of one completed generation. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub generation_num: usize,
    pub variant_ids: Vec<String>,
    pub best_fitness: f64,
    pub best_variant_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Lifecycle status of an evolution run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvolutionStatus {
    #[default]
    Initialized,
    Running,
    Completed,
    Failed,
}

impl EvolutionStatus {
    /// Whether the run has ended and can no longer be resumed.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Legal transitions: `initialized -> running -> {completed | failed}`,
    /// plus `running -> running` when a crashed run is resumed.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Initialized, Self::Running)
                | (Self::Running, Self::Running)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
        )
    }
}

impl fmt::Display for EvolutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Initialized => "initialized",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Reason evolution stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StopReason {
    /// Reached maximum generations.
    MaxGenerations { generations: usize },
    /// Stagnation limit hit.
    NoImprovement { generations: usize },
    /// Best variant reached the configured target.
    TargetReached {
        metric: String,
        value: f64,
        target: f64,
    },
    /// The variation step produced no usable candidates.
    NoVariantsProduced,
    /// Neither an elite pool nor a baseline is available to seed from.
    NoParents,
    /// Cancelled at a generation boundary.
    Cancelled,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MaxGenerations { generations } => {
                write!(f, "max generations reached ({})", generations)
            }
            Self::NoImprovement { generations } => {
                write!(f, "no improvement for {} generations", generations)
            }
            Self::TargetReached {
                metric,
                value,
                target,
            } => write!(
                f,
                "target reached: {} {:.4} >= {:.4}",
                metric, value, target
            ),
            Self::NoVariantsProduced => f.write_str("no variants produced"),
            Self::NoParents => f.write_str("no parents available"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}
