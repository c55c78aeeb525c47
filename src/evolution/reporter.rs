//! Progress hooks for external reporting.

use std::panic::{self, AssertUnwindSafe};

use log::{info, warn};

use super::evaluator::EvaluationOutcome;
use super::state::EvolutionState;
use crate::schema::Variant;

/// Receives progress notifications from the engine.
///
/// Hooks are best-effort: a panicking hook is logged and ignored, it never
/// aborts the run. Both methods default to no-ops.
pub trait ProgressReporter: Send + Sync {
    fn on_generation_complete(&self, _state: &EvolutionState, _generation: usize) {}

    fn on_variant_evaluated(&self, _variant: &Variant, _outcome: &EvaluationOutcome) {}
}

/// Any `Fn(&EvolutionState, usize)` listens for completed generations.
impl<F> ProgressReporter for F
where
    F: Fn(&EvolutionState, usize) + Send + Sync,
{
    fn on_generation_complete(&self, state: &EvolutionState, generation: usize) {
        self(state, generation)
    }
}

/// Reporter that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl ProgressReporter for NullReporter {}

/// Reporter that writes progress through the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl ProgressReporter for LogReporter {
    fn on_generation_complete(&self, state: &EvolutionState, generation: usize) {
        let best = state
            .elite_pool
            .get_best()
            .and_then(|v| v.fitness.map(|f| format!("{} ({:.4})", v.id, f)))
            .unwrap_or_else(|| "none".to_string());
        info!(
            "[{}] generation {} complete: elite {}/{}, best {}, stagnant {}",
            state.evolution_id,
            generation,
            state.elite_pool.len(),
            state.elite_pool.max_size(),
            best,
            state.generations_without_improvement
        );
    }

    fn on_variant_evaluated(&self, variant: &Variant, outcome: &EvaluationOutcome) {
        match outcome {
            Ok(result) => info!(
                "{}: sharpe {:.3}, return {:.3}, drawdown {}, fitness {}",
                variant.id,
                result.sharpe_ratio,
                result.total_return,
                result
                    .max_drawdown
                    .map(|d| format!("{:.3}", d))
                    .unwrap_or_else(|| "-".to_string()),
                variant
                    .fitness
                    .map(|f| format!("{:.4}", f))
                    .unwrap_or_else(|| "-".to_string())
            ),
            Err(e) => info!("{}: evaluation failed: {}", variant.id, e),
        }
    }
}

/// Run a hook, swallowing (and logging) any panic.
pub(crate) fn notify(hook: &str, call: impl FnOnce()) {
    if panic::catch_unwind(AssertUnwindSafe(call)).is_err() {
        warn!("Progress hook {} panicked; continuing", hook);
    }
}
