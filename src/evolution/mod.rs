//! Evolutionary search over trading-strategy source code.
//!
//! Each generation asks a mutation oracle for new candidate strategies derived
//! from the current elite, scores them through a backtesting evaluator and
//! keeps the best in a bounded elite pool.
//!
//! # Overview
//!
//! - **Fitness** (`fitness`): Weighted scalar score from backtest metrics
//! - **Elite Pool** (`elite`): Bounded best-so-far set, parents of the next generation
//! - **Variation** (`variation`): Mutation/crossover planning and the oracle seam
//! - **Evaluation** (`evaluator`): Bounded-parallel, deadline-limited backtests
//! - **State** (`state`): Run history and atomic JSON persistence
//! - **Search** (`search`): The generational loop, stopping rules and resume
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use strategy_evolution::evolution::{EvolutionEngine, LogReporter, MutationOracle, Evaluator};
//! use strategy_evolution::schema::EvolutionConfig;
//!
//! fn evolve(oracle: Arc<dyn MutationOracle>, evaluator: Arc<dyn Evaluator>) {
//!     let config = EvolutionConfig::default();
//!     let mut engine = EvolutionEngine::new(config, "def strategy(): ...", oracle, evaluator)
//!         .expect("valid config")
//!         .with_reporter(Arc::new(LogReporter));
//!
//!     let result = engine.run().expect("evolution failed");
//!     println!("Stopped: {}", result.stop_reason);
//!     if let Some(best) = result.best {
//!         println!("Best variant {} with fitness {:?}", best.id, best.fitness);
//!     }
//! }
//! ```
//!
//! # Stopping
//!
//! Checked before every generation, first match wins:
//!
//! - `MaxGenerations`: generation cap reached
//! - `NoImprovement`: `convergence_patience` generations without a better generation best
//! - `TargetReached`: best elite member reached `target_fitness` on `target_metric`
//!
//! A generation that produces no candidates, or has nothing to seed from,
//! ends the run as well. Cancellation is honored between generations.

mod deadline;
mod elite;
mod evaluator;
mod fitness;
mod reporter;
mod rng;
mod search;
mod state;
mod variation;

pub use deadline::{DeadlineError, run_with_deadline};
pub use elite::{ElitePool, ElitePoolDocument, ElitePoolError};
pub use evaluator::{EvalError, EvaluationOutcome, Evaluator, evaluate_batch, evaluate_bounded};
pub use fitness::{FitnessCalculator, MISSING_DRAWDOWN};
pub use reporter::{LogReporter, NullReporter, ProgressReporter};
pub use rng::SearchRng;
pub use search::{EXPLORATION_STEP, EngineError, EvolutionEngine, GenerationOutcome, check_stop};
pub use state::{EvolutionState, PersistenceError, StateStore, TransitionError};
pub use variation::{
    MutationOracle, MutationStrategy, OracleContext, OracleError, Proposal, VariationGenerator,
    VariationOperator, VariationProposal, plan_operators,
};
