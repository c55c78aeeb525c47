//! Scripted oracle and evaluator doubles for engine tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use strategy_evolution::evolution::{
    EvalError, Evaluator, MutationOracle, MutationStrategy, OracleContext, OracleError, Proposal,
};
use strategy_evolution::schema::{EvaluationResult, EvolutionConfig, Variant};

/// Oracle that appends the operator to the parent code, so every
/// generation's code is strictly longer than its parents'.
#[derive(Default)]
pub struct AppendOracle {
    pub calls: AtomicUsize,
    pub fail: bool,
}

impl AppendOracle {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }
}

impl MutationOracle for AppendOracle {
    fn mutate(
        &self,
        parent: &Variant,
        strategy: MutationStrategy,
        _ctx: &OracleContext,
    ) -> Result<Proposal, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(OracleError::Request("rate limited".into()));
        }
        Ok(Proposal {
            code: format!("{}|{}", parent.code, strategy),
            description: format!("{} on {}", strategy, parent.id),
        })
    }

    fn crossover(
        &self,
        first: &Variant,
        second: &Variant,
        _ctx: &OracleContext,
    ) -> Result<Proposal, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(OracleError::Request("rate limited".into()));
        }
        Ok(Proposal {
            code: format!("{}|{}", first.code, second.code),
            description: format!("crossover of {} and {}", first.id, second.id),
        })
    }
}

/// Evaluator backed by a closure over `(code, variant_id)`.
pub struct FnEvaluator<F> {
    score: F,
    pub calls: AtomicUsize,
}

impl<F> FnEvaluator<F>
where
    F: Fn(&str, &str) -> Result<EvaluationResult, EvalError> + Send + Sync,
{
    pub fn new(score: F) -> Self {
        Self {
            score,
            calls: AtomicUsize::new(0),
        }
    }
}

impl<F> Evaluator for FnEvaluator<F>
where
    F: Fn(&str, &str) -> Result<EvaluationResult, EvalError> + Send + Sync,
{
    fn evaluate(
        &self,
        code: &str,
        variant_id: &str,
        _timeout: Duration,
    ) -> Result<EvaluationResult, EvalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.score)(code, variant_id)
    }
}

/// Sharpe ratio of 0.1 per operator applied since the baseline.
pub fn lineage_score(code: &str) -> EvaluationResult {
    EvaluationResult {
        sharpe_ratio: code.matches('|').count() as f64 * 0.1,
        total_return: 0.05,
        max_drawdown: Some(0.2),
        win_rate: 0.5,
        total_trades: 40,
        cagr: 0.04,
    }
}

pub fn improving_evaluator() -> Arc<dyn Evaluator> {
    Arc::new(FnEvaluator::new(|code: &str, _id: &str| Ok(lineage_score(code))))
}

pub fn flat_evaluator() -> Arc<dyn Evaluator> {
    Arc::new(FnEvaluator::new(|_code: &str, _id: &str| {
        Ok(EvaluationResult {
            sharpe_ratio: 1.0,
            max_drawdown: Some(0.1),
            ..Default::default()
        })
    }))
}

pub fn failing_evaluator() -> Arc<dyn Evaluator> {
    Arc::new(FnEvaluator::new(|_code: &str, _id: &str| {
        Err(EvalError::Service("backtest service unavailable".into()))
    }))
}

/// Small, seeded, auto-saving configuration rooted at `state_dir`.
pub fn test_config(state_dir: &Path) -> EvolutionConfig {
    EvolutionConfig {
        max_generations: 4,
        variants_per_generation: 3,
        elite_pool_size: 3,
        max_concurrent_evaluations: 2,
        evaluation_timeout_secs: 5,
        generation_timeout_secs: 5,
        random_seed: Some(7),
        state_dir: state_dir.to_path_buf(),
        ..Default::default()
    }
}

pub const BASELINE: &str = "def strategy(data): return data.close > data.sma(20)";
