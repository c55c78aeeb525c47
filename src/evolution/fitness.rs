//! Fitness scoring for evaluated strategy variants.
//!
//! Combines backtest metrics into one scalar used to rank and retain
//! variants:
//!
//! ```text
//! fitness = w_sharpe   * sharpe_ratio
//!         + w_drawdown * (1 - max_drawdown)
//!         + w_return   * total_return
//!         + w_win_rate * win_rate
//! ```
//!
//! A missing `max_drawdown` counts as a total loss (`1.0`), every other
//! missing metric counts as `0.0`. Partially failed evaluations therefore
//! earn no drawdown credit.

use std::collections::BTreeMap;

use crate::schema::{EvaluationResult, FitnessWeights};

/// Drawdown assumed when the evaluation reports none.
pub const MISSING_DRAWDOWN: f64 = 1.0;

/// Pure scoring function from raw metrics to fitness.
#[derive(Debug, Clone, Copy, Default)]
pub struct FitnessCalculator {
    weights: FitnessWeights,
}

impl FitnessCalculator {
    /// Create a new fitness calculator.
    pub fn new(weights: FitnessWeights) -> Self {
        Self { weights }
    }

    /// Score a metric map as stored on a variant.
    pub fn calculate(&self, metrics: &BTreeMap<String, f64>) -> f64 {
        let get = |name: &str, default: f64| metrics.get(name).copied().unwrap_or(default);

        let sharpe = get("sharpe_ratio", 0.0);
        let drawdown = get("max_drawdown", MISSING_DRAWDOWN).abs();
        let total_return = get("total_return", 0.0);
        let win_rate = get("win_rate", 0.0);

        self.weights.sharpe_weight * sharpe
            + self.weights.drawdown_weight * (1.0 - drawdown)
            + self.weights.return_weight * total_return
            + self.weights.win_rate_weight * win_rate
    }

    /// Score an evaluation result directly.
    pub fn score(&self, result: &EvaluationResult) -> f64 {
        self.calculate(&result.to_metrics())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn metrics(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_default_weights() {
        let calc = FitnessCalculator::default();
        let m = metrics(&[
            ("sharpe_ratio", 2.0),
            ("max_drawdown", 0.1),
            ("total_return", 0.5),
            ("win_rate", 0.6),
        ]);
        let fitness = calc.calculate(&m);
        assert!((fitness - 1.23).abs() < 1e-9, "fitness = {}", fitness);
    }

    #[test]
    fn test_missing_drawdown_is_pessimistic() {
        let calc = FitnessCalculator::default();
        let without = calc.calculate(&metrics(&[("sharpe_ratio", 1.0)]));
        let zero_dd = calc.calculate(&metrics(&[("sharpe_ratio", 1.0), ("max_drawdown", 0.0)]));

        // No drawdown credit at all when the key is absent.
        assert!((without - 0.4).abs() < 1e-9);
        assert!((zero_dd - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_unreported_drawdown_scores_as_total_loss() {
        let calc = FitnessCalculator::default();
        let result = EvaluationResult {
            sharpe_ratio: 1.0,
            ..Default::default()
        };
        assert!((calc.score(&result) - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_empty_metrics() {
        let calc = FitnessCalculator::default();
        assert_eq!(calc.calculate(&BTreeMap::new()), 0.0);
    }

    #[test]
    fn test_score_matches_calculate() {
        let calc = FitnessCalculator::default();
        let result = EvaluationResult {
            sharpe_ratio: 1.2,
            total_return: 0.3,
            max_drawdown: Some(0.25),
            win_rate: 0.55,
            total_trades: 120,
            cagr: 0.18,
        };
        assert_eq!(calc.score(&result), calc.calculate(&result.to_metrics()));
    }

    proptest! {
        #[test]
        fn prop_fitness_monotonic_in_sharpe(
            sharpe in -5.0f64..5.0,
            delta in 0.0f64..5.0,
            drawdown in 0.0f64..1.0,
            total_return in -1.0f64..3.0,
            win_rate in 0.0f64..1.0,
            w in prop::array::uniform4(0.0f64..1.0),
        ) {
            let calc = FitnessCalculator::new(FitnessWeights {
                sharpe_weight: w[0],
                drawdown_weight: w[1],
                return_weight: w[2],
                win_rate_weight: w[3],
            });
            let base = metrics(&[
                ("sharpe_ratio", sharpe),
                ("max_drawdown", drawdown),
                ("total_return", total_return),
                ("win_rate", win_rate),
            ]);
            let mut higher = base.clone();
            higher.insert("sharpe_ratio".to_string(), sharpe + delta);

            prop_assert!(calc.calculate(&higher) >= calc.calculate(&base));
        }
    }
}
