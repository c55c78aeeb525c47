//! Variation step: deciding how each new candidate is produced and asking
//! the mutation oracle to produce it.
//!
//! Operator choice (mutation vs. crossover, which parents, which strategy)
//! happens here and is fully driven by the injected [`SearchRng`]. The
//! content of a mutation is delegated to a [`MutationOracle`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::deadline::{DeadlineError, run_with_deadline};
use super::rng::SearchRng;
use crate::schema::Variant;

/// Fixed set of mutation strategy tags offered to the oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationStrategy {
    ParameterTuning,
    IndicatorSwap,
    EntryLogic,
    ExitLogic,
    RiskManagement,
    FilterAddition,
}

impl MutationStrategy {
    pub const ALL: [MutationStrategy; 6] = [
        MutationStrategy::ParameterTuning,
        MutationStrategy::IndicatorSwap,
        MutationStrategy::EntryLogic,
        MutationStrategy::ExitLogic,
        MutationStrategy::RiskManagement,
        MutationStrategy::FilterAddition,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ParameterTuning => "parameter_tuning",
            Self::IndicatorSwap => "indicator_swap",
            Self::EntryLogic => "entry_logic",
            Self::ExitLogic => "exit_logic",
            Self::RiskManagement => "risk_management",
            Self::FilterAddition => "filter_addition",
        }
    }
}

impl fmt::Display for MutationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How one slot is filled. Indices refer to the parent list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariationOperator {
    Mutation {
        parent: usize,
        strategy: MutationStrategy,
    },
    Crossover {
        first: usize,
        second: usize,
    },
}

/// Call context handed to the oracle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OracleContext {
    pub generation: usize,
    pub slot: usize,
    pub mutation_rate: f64,
}

/// Raw oracle output for one slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    pub code: String,
    pub description: String,
}

/// Oracle failure for a single slot. The slot is dropped, the run goes on.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OracleError {
    #[error("oracle timed out after {0:?}")]
    Timeout(Duration),
    #[error("oracle request failed: {0}")]
    Request(String),
    #[error("oracle returned no code")]
    EmptyResponse,
    #[error("oracle worker failed: {0}")]
    Worker(String),
}

impl From<DeadlineError> for OracleError {
    fn from(err: DeadlineError) -> Self {
        match err {
            DeadlineError::Elapsed(timeout) => OracleError::Timeout(timeout),
            other => OracleError::Worker(other.to_string()),
        }
    }
}

/// Produces new strategy code from existing variants.
pub trait MutationOracle: Send + Sync {
    /// Rewrite one parent according to `strategy`.
    fn mutate(
        &self,
        parent: &Variant,
        strategy: MutationStrategy,
        ctx: &OracleContext,
    ) -> Result<Proposal, OracleError>;

    /// Combine two parents into one child.
    fn crossover(
        &self,
        first: &Variant,
        second: &Variant,
        ctx: &OracleContext,
    ) -> Result<Proposal, OracleError>;
}

/// A usable candidate returned by the variation step.
#[derive(Debug, Clone, PartialEq)]
pub struct VariationProposal {
    pub code: String,
    pub description: String,
    pub parent_ids: Vec<String>,
    pub operator: VariationOperator,
}

/// Decide the operator for each of `count` slots.
///
/// Generation 1 mutates only, cycling a shuffled copy of the strategy set so
/// no tag repeats until all have been tried. Later generations crossover two
/// distinct parents when at least two exist and a uniform draw exceeds
/// `mutation_rate`; otherwise they mutate a random parent with a random
/// strategy.
pub fn plan_operators(
    parent_count: usize,
    count: usize,
    generation: usize,
    mutation_rate: f64,
    rng: &mut SearchRng,
) -> Vec<VariationOperator> {
    if parent_count == 0 {
        return Vec::new();
    }

    if generation <= 1 {
        let mut order = MutationStrategy::ALL;
        rng.shuffle(&mut order);
        return (0..count)
            .map(|slot| VariationOperator::Mutation {
                parent: rng.index(parent_count),
                strategy: order[slot % order.len()],
            })
            .collect();
    }

    (0..count)
        .map(|_| {
            if parent_count >= 2 && rng.uniform() > mutation_rate {
                let (first, second) = rng.pick_two(parent_count);
                VariationOperator::Crossover { first, second }
            } else {
                let parent = rng.index(parent_count);
                let strategy = MutationStrategy::ALL[rng.index(MutationStrategy::ALL.len())];
                VariationOperator::Mutation { parent, strategy }
            }
        })
        .collect()
}

/// Fills generation slots through the oracle, one bounded call per slot.
pub struct VariationGenerator {
    oracle: Arc<dyn MutationOracle>,
    timeout: Duration,
}

impl VariationGenerator {
    pub fn new(oracle: Arc<dyn MutationOracle>, timeout: Duration) -> Self {
        Self { oracle, timeout }
    }

    /// Request up to `count` candidates derived from `parents`.
    ///
    /// Failed slots are logged and omitted, so the result may be shorter
    /// than `count` (or empty). This never fails as a whole.
    pub fn generate(
        &self,
        parents: &[Variant],
        count: usize,
        generation: usize,
        mutation_rate: f64,
        rng: &mut SearchRng,
    ) -> Vec<VariationProposal> {
        let plan = plan_operators(parents.len(), count, generation, mutation_rate, rng);
        let mut proposals = Vec::with_capacity(plan.len());

        for (slot, operator) in plan.into_iter().enumerate() {
            let ctx = OracleContext {
                generation,
                slot,
                mutation_rate,
            };
            match self.fill_slot(parents, operator, ctx) {
                Ok(proposal) => {
                    debug!(
                        "Generation {} slot {}: {:?} from {:?}",
                        generation, slot, operator, proposal.parent_ids
                    );
                    proposals.push(proposal);
                }
                Err(e) => warn!("Generation {} slot {} dropped: {}", generation, slot, e),
            }
        }

        proposals
    }

    fn fill_slot(
        &self,
        parents: &[Variant],
        operator: VariationOperator,
        ctx: OracleContext,
    ) -> Result<VariationProposal, OracleError> {
        let oracle = Arc::clone(&self.oracle);
        let worker = format!("oracle-g{}-s{}", ctx.generation, ctx.slot);

        let (parent_ids, proposal) = match operator {
            VariationOperator::Mutation { parent, strategy } => {
                let parent = parents[parent].clone();
                let ids = vec![parent.id.clone()];
                let proposal = run_with_deadline(&worker, self.timeout, move || {
                    oracle.mutate(&parent, strategy, &ctx)
                })??;
                (ids, proposal)
            }
            VariationOperator::Crossover { first, second } => {
                let first = parents[first].clone();
                let second = parents[second].clone();
                let ids = vec![first.id.clone(), second.id.clone()];
                let proposal = run_with_deadline(&worker, self.timeout, move || {
                    oracle.crossover(&first, &second, &ctx)
                })??;
                (ids, proposal)
            }
        };

        if proposal.code.trim().is_empty() {
            return Err(OracleError::EmptyResponse);
        }

        Ok(VariationProposal {
            code: proposal.code,
            description: proposal.description,
            parent_ids,
            operator,
        })
    }
}
