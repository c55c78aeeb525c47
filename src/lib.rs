//! Strategy Evolution - Evolutionary search over trading-strategy code.
//!
//! This crate runs a generational search in which an external oracle (an
//! LLM-backed code mutator, in practice) proposes variants of a baseline
//! strategy, a backtesting service scores them, and the best survive into
//! an elite pool that seeds the next generation.
//!
//! # Architecture
//!
//! The crate is split into two main modules:
//!
//! - `schema`: Configuration and record types (variants, results, status)
//! - `evolution`: Fitness, elite pool, variation, evaluation, state and the engine
//!
//! The oracle and evaluator are traits ([`evolution::MutationOracle`],
//! [`evolution::Evaluator`]) so the engine never talks to a network itself.

pub mod evolution;
pub mod schema;

// Re-export commonly used types
pub use evolution::{
    EngineError, EvolutionEngine, EvolutionState, Evaluator, MutationOracle, StateStore,
};
pub use schema::{EvolutionConfig, EvolutionResult, StopReason, Variant};
