//! Evaluation boundary: scoring candidate code through an external service.

use std::sync::Arc;
use std::time::Duration;

use rayon::prelude::*;

use super::deadline::{DeadlineError, run_with_deadline};
use crate::schema::{EvaluationResult, Variant};

/// Scores one candidate via the backtest/evaluation service.
///
/// Implementations should honor `timeout` themselves; the engine also
/// enforces it and treats an overrun as a failed evaluation.
pub trait Evaluator: Send + Sync {
    fn evaluate(
        &self,
        code: &str,
        variant_id: &str,
        timeout: Duration,
    ) -> Result<EvaluationResult, EvalError>;
}

/// Per-variant evaluation failure. Never fatal to a run.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error("evaluation timed out after {0:?}")]
    Timeout(Duration),
    #[error("evaluation service error: {0}")]
    Service(String),
    #[error("malformed evaluation result: {0}")]
    Malformed(String),
    #[error("evaluation worker failed: {0}")]
    Worker(String),
}

impl From<DeadlineError> for EvalError {
    fn from(err: DeadlineError) -> Self {
        match err {
            DeadlineError::Elapsed(timeout) => EvalError::Timeout(timeout),
            other => EvalError::Worker(other.to_string()),
        }
    }
}

/// Outcome of evaluating one variant.
pub type EvaluationOutcome = Result<EvaluationResult, EvalError>;

/// Evaluate one variant under a hard deadline.
pub fn evaluate_bounded(
    evaluator: &Arc<dyn Evaluator>,
    variant: &Variant,
    timeout: Duration,
) -> EvaluationOutcome {
    let evaluator = Arc::clone(evaluator);
    let code = variant.code.clone();
    let variant_id = variant.id.clone();
    let worker = format!("eval-{}", variant.id);

    let result = run_with_deadline(&worker, timeout, move || {
        evaluator.evaluate(&code, &variant_id, timeout)
    })??;

    if !result.is_finite() {
        return Err(EvalError::Malformed(format!(
            "non-finite metric in {:?}",
            result
        )));
    }
    Ok(result)
}

/// Evaluate a batch of variants on `pool`, preserving input order.
///
/// The pool's thread count bounds how many evaluations are in flight.
pub fn evaluate_batch(
    pool: &rayon::ThreadPool,
    evaluator: &Arc<dyn Evaluator>,
    variants: &[Variant],
    timeout: Duration,
) -> Vec<EvaluationOutcome> {
    pool.install(|| {
        variants
            .par_iter()
            .map(|variant| evaluate_bounded(evaluator, variant, timeout))
            .collect()
    })
}
