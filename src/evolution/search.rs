//! Generational search loop over strategy variants.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use log::{debug, error, info, warn};
use uuid::Uuid;

use crate::schema::{
    ConfigError, EvolutionConfig, EvolutionResult, EvolutionStats, EvolutionStatus, StopReason,
    Variant,
};

use super::evaluator::{EvaluationOutcome, Evaluator, evaluate_batch, evaluate_bounded};
use super::fitness::FitnessCalculator;
use super::reporter::{NullReporter, ProgressReporter, notify};
use super::rng::SearchRng;
use super::state::{EvolutionState, PersistenceError, StateStore, TransitionError};
use super::variation::{MutationOracle, VariationGenerator};

/// Mutation-rate increase per stagnant generation.
pub const EXPLORATION_STEP: f64 = 0.1;

/// Fatal engine errors. Per-variant failures never surface here.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Persistence failed: {0}")]
    Persistence(#[from] PersistenceError),
    #[error("Evolution {evolution_id} is {status} and cannot be resumed")]
    TerminalState {
        evolution_id: String,
        status: EvolutionStatus,
    },
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("Failed to build evaluation thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Result of a single generation step.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    /// The generation was evaluated and recorded.
    Completed { generation: usize, accepted: usize },
    /// Nothing could be produced; the run should end.
    Stopped(StopReason),
}

/// Evolution engine that runs the search.
pub struct EvolutionEngine {
    config: EvolutionConfig,
    state: EvolutionState,
    store: StateStore,
    rng: SearchRng,
    fitness: FitnessCalculator,
    variation: VariationGenerator,
    evaluator: Arc<dyn Evaluator>,
    reporter: Arc<dyn ProgressReporter>,
    pool: rayon::ThreadPool,
    cancelled: Arc<AtomicBool>,
    started: bool,
    total_evaluations: u64,
    failed_evaluations: u64,
}

impl EvolutionEngine {
    /// Create an engine for a fresh run seeded from `baseline_code`.
    pub fn new(
        config: EvolutionConfig,
        baseline_code: impl Into<String>,
        oracle: Arc<dyn MutationOracle>,
        evaluator: Arc<dyn Evaluator>,
    ) -> Result<Self, EngineError> {
        let state = EvolutionState::new(
            Uuid::new_v4().to_string(),
            Some(baseline_code.into()),
            None,
            &config,
        );
        Self::build(config, state, oracle, evaluator)
    }

    /// Continue a saved run at `current_generation + 1`.
    ///
    /// Completed and failed runs are rejected. The persisted mutation rate is
    /// restored and the stagnation adjustment for the last completed
    /// generation is re-applied.
    pub fn resume(
        config: EvolutionConfig,
        state: EvolutionState,
        oracle: Arc<dyn MutationOracle>,
        evaluator: Arc<dyn Evaluator>,
    ) -> Result<Self, EngineError> {
        let mut engine = Self::build(config, state, oracle, evaluator)?;
        if let Some(rate) = engine.state.current_mutation_rate {
            engine.config.mutation_rate = rate.clamp(0.0, engine.config.max_mutation_rate);
        }
        if engine.state.current_generation > 0 {
            engine.adapt_mutation_rate();
        }
        Ok(engine)
    }

    fn build(
        config: EvolutionConfig,
        state: EvolutionState,
        oracle: Arc<dyn MutationOracle>,
        evaluator: Arc<dyn Evaluator>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        if state.status.is_terminal() {
            return Err(EngineError::TerminalState {
                evolution_id: state.evolution_id,
                status: state.status,
            });
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.max_concurrent_evaluations)
            .thread_name(|i| format!("evaluator-{}", i))
            .build()?;
        let rng = config
            .random_seed
            .map(SearchRng::new)
            .unwrap_or_else(SearchRng::random);

        Ok(Self {
            store: StateStore::new(&config.state_dir),
            fitness: FitnessCalculator::new(config.fitness_weights),
            variation: VariationGenerator::new(oracle, config.generation_timeout()),
            evaluator,
            reporter: Arc::new(NullReporter),
            pool,
            rng,
            cancelled: Arc::new(AtomicBool::new(false)),
            started: false,
            total_evaluations: 0,
            failed_evaluations: 0,
            config,
            state,
        })
    }

    /// Attach a progress reporter.
    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Record where the baseline came from.
    pub fn with_source_reference(mut self, reference: impl Into<String>) -> Self {
        self.state.source_reference = Some(reference.into());
        self
    }

    /// Get cancellation handle. Cancellation takes effect between generations.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn state(&self) -> &EvolutionState {
        &self.state
    }

    pub fn into_state(self) -> EvolutionState {
        self.state
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Mutation rate the next generation will use.
    pub fn mutation_rate(&self) -> f64 {
        self.config.mutation_rate
    }

    /// Write the current state regardless of `auto_save`.
    pub fn save(&self) -> Result<PathBuf, EngineError> {
        Ok(self.store.save(&self.state)?)
    }

    /// Check if evolution should stop.
    pub fn should_stop(&self) -> Option<StopReason> {
        check_stop(&self.state, &self.config)
    }

    /// Run generations until a stopping condition fires.
    ///
    /// Errors mark the run failed, persist it and are returned.
    pub fn run(&mut self) -> Result<EvolutionResult, EngineError> {
        let start_time = Instant::now();

        // Checked before every generation, so a resumed run that already
        // met a stop condition does not step again.
        let stop_reason = loop {
            if let Some(reason) = self.should_stop() {
                break reason;
            }

            if self.cancelled.load(Ordering::Relaxed) {
                break StopReason::Cancelled;
            }

            match self.step()? {
                GenerationOutcome::Stopped(reason) => break reason,
                GenerationOutcome::Completed { .. } => {}
            }

            self.adapt_mutation_rate();
        };

        if let Err(e) = self.finish(&stop_reason) {
            return Err(self.fail(e));
        }

        let best = self.state.elite_pool.get_best().cloned();
        Ok(EvolutionResult {
            evolution_id: self.state.evolution_id.clone(),
            status: self.state.status,
            stop_reason,
            stats: EvolutionStats {
                generations: self.state.current_generation,
                total_evaluations: self.total_evaluations,
                failed_evaluations: self.failed_evaluations,
                best_fitness: best.as_ref().and_then(|v| v.fitness),
                elapsed_seconds: start_time.elapsed().as_secs_f64(),
            },
            best,
        })
    }

    /// Run a single generation.
    pub fn step(&mut self) -> Result<GenerationOutcome, EngineError> {
        match self.try_step() {
            Ok(outcome) => Ok(outcome),
            Err(e) => Err(self.fail(e)),
        }
    }

    fn try_step(&mut self) -> Result<GenerationOutcome, EngineError> {
        if self.state.status.is_terminal() {
            return Err(EngineError::TerminalState {
                evolution_id: self.state.evolution_id.clone(),
                status: self.state.status,
            });
        }
        self.begin()?;
        self.run_generation()
    }

    fn begin(&mut self) -> Result<(), EngineError> {
        if self.started {
            return Ok(());
        }

        if self.state.status == EvolutionStatus::Running {
            info!(
                "Resuming evolution {} at generation {}",
                self.state.evolution_id,
                self.state.current_generation + 1
            );
        } else {
            info!(
                "Starting evolution {} ({} generations, {} variants each)",
                self.state.evolution_id,
                self.config.max_generations,
                self.config.variants_per_generation
            );
        }
        self.state.transition(EvolutionStatus::Running)?;
        self.state.stop_reason = None;
        self.started = true;

        if self.config.evaluate_baseline && self.state.current_generation == 0 {
            self.evaluate_baseline();
        }

        self.save_if_enabled()
    }

    fn evaluate_baseline(&mut self) {
        let Some(baseline) = self.state.baseline().cloned() else {
            return;
        };
        if baseline.is_evaluated() {
            return;
        }

        let outcome = evaluate_bounded(&self.evaluator, &baseline, self.config.evaluation_timeout());
        let baseline = self.apply_outcome(baseline, &outcome);
        self.state.add_variant(baseline.clone());
        if self.state.elite_pool.update(baseline) {
            debug!("Baseline entered the elite pool");
        }
    }

    fn run_generation(&mut self) -> Result<GenerationOutcome, EngineError> {
        let generation = self.state.current_generation + 1;

        let parents = self.select_parents(generation);
        if parents.is_empty() {
            warn!("Generation {}: no elite pool and no baseline", generation);
            return Ok(GenerationOutcome::Stopped(StopReason::NoParents));
        }

        let mutation_rate = self.config.mutation_rate;
        let proposals = self.variation.generate(
            &parents,
            self.config.variants_per_generation,
            generation,
            mutation_rate,
            &mut self.rng,
        );
        if proposals.is_empty() {
            warn!("Generation {}: no variants produced", generation);
            return Ok(GenerationOutcome::Stopped(StopReason::NoVariantsProduced));
        }

        let candidates: Vec<Variant> = proposals
            .into_iter()
            .enumerate()
            .map(|(slot, p)| {
                Variant::new(
                    variant_id(generation, slot),
                    generation,
                    p.code,
                    p.parent_ids,
                    p.description,
                )
            })
            .collect();

        let outcomes = evaluate_batch(
            &self.pool,
            &self.evaluator,
            &candidates,
            self.config.evaluation_timeout(),
        );
        let evaluated: Vec<Variant> = candidates
            .into_iter()
            .zip(outcomes)
            .map(|(variant, outcome)| self.apply_outcome(variant, &outcome))
            .collect();

        // Commit the whole generation at once.
        let mut accepted = 0;
        for variant in &evaluated {
            self.state.add_variant(variant.clone());
            if self.state.elite_pool.update(variant.clone()) {
                debug!("{} entered the elite pool", variant.id);
                accepted += 1;
            }
        }
        let record = self.state.record_generation(generation, &evaluated).clone();
        info!(
            "Generation {}: {} variants, best {:.4} ({}), {} new elite, {} without improvement",
            generation,
            record.variant_ids.len(),
            record.best_fitness,
            record.best_variant_id.as_deref().unwrap_or("-"),
            accepted,
            self.state.generations_without_improvement
        );
        self.state.current_mutation_rate = Some(mutation_rate);

        self.save_if_enabled()?;

        let reporter = &self.reporter;
        let state = &self.state;
        notify("on_generation_complete", || {
            reporter.on_generation_complete(state, generation)
        });

        Ok(GenerationOutcome::Completed {
            generation,
            accepted,
        })
    }

    /// Parents for `generation`: the baseline for generation 1, the elite
    /// pool afterwards, falling back to the baseline when the pool is empty.
    fn select_parents(&self, generation: usize) -> Vec<Variant> {
        if generation > 1 {
            let parents = self.state.elite_pool.get_parents_for_next_gen();
            if !parents.is_empty() {
                return parents;
            }
            warn!(
                "Generation {}: elite pool empty, seeding from baseline",
                generation
            );
        }
        self.state.baseline().cloned().into_iter().collect()
    }

    /// Attach an evaluation outcome to `variant` and notify the reporter.
    fn apply_outcome(&mut self, mut variant: Variant, outcome: &EvaluationOutcome) -> Variant {
        self.total_evaluations += 1;
        match outcome {
            Ok(result) => {
                let metrics = result.to_metrics();
                let fitness = self.fitness.calculate(&metrics);
                variant.attach_evaluation(metrics, fitness);
                debug!("{} evaluated: fitness {:.4}", variant.id, fitness);
            }
            Err(e) => {
                self.failed_evaluations += 1;
                warn!("{} evaluation failed: {}", variant.id, e);
            }
        }

        let reporter = &self.reporter;
        notify("on_variant_evaluated", || {
            reporter.on_variant_evaluated(&variant, outcome)
        });
        variant
    }

    /// Raise the mutation rate while the search stagnates.
    fn adapt_mutation_rate(&mut self) {
        let stagnant = self.state.generations_without_improvement;
        if !self.config.adaptive_mutation || stagnant == 0 {
            return;
        }

        let raised = (self.config.mutation_rate + EXPLORATION_STEP * stagnant as f64)
            .min(self.config.max_mutation_rate);
        if raised > self.config.mutation_rate {
            info!(
                "Stagnant for {} generations: mutation rate {:.2} -> {:.2}",
                stagnant, self.config.mutation_rate, raised
            );
        }
        self.config.mutation_rate = raised;
    }

    fn save_if_enabled(&self) -> Result<(), EngineError> {
        if self.config.auto_save {
            self.store.save(&self.state)?;
        }
        Ok(())
    }

    fn finish(&mut self, reason: &StopReason) -> Result<(), EngineError> {
        info!("Evolution {} stopped: {}", self.state.evolution_id, reason);
        self.state.stop_reason = Some(reason.clone());
        // A cancelled run stays resumable.
        if *reason != StopReason::Cancelled {
            if self.state.status == EvolutionStatus::Initialized {
                self.state.transition(EvolutionStatus::Running)?;
            }
            self.state.transition(EvolutionStatus::Completed)?;
        }

        if let Err(e) = self.save_if_enabled() {
            // Completion is not durable; leave the run for `fail`.
            if self.state.status == EvolutionStatus::Completed {
                self.state.status = EvolutionStatus::Running;
            }
            return Err(e);
        }
        Ok(())
    }

    /// Mark the run failed and persist it for analysis.
    fn fail(&mut self, err: EngineError) -> EngineError {
        error!("Evolution {} failed: {}", self.state.evolution_id, err);
        if self.state.status != EvolutionStatus::Running {
            return err;
        }

        self.state.status = EvolutionStatus::Failed;
        self.state.touch();
        if self.config.auto_save
            && let Err(save_err) = self.store.save(&self.state)
        {
            error!("Could not persist failed state: {}", save_err);
        }
        err
    }
}

/// Stopping conditions, first match wins: generation cap, stagnation cap,
/// then target reached by the best elite member.
pub fn check_stop(state: &EvolutionState, config: &EvolutionConfig) -> Option<StopReason> {
    if state.current_generation >= config.max_generations {
        return Some(StopReason::MaxGenerations {
            generations: config.max_generations,
        });
    }

    if state.generations_without_improvement >= config.convergence_patience {
        return Some(StopReason::NoImprovement {
            generations: state.generations_without_improvement,
        });
    }

    if let Some(target) = config.target_fitness
        && let Some(best) = state.elite_pool.get_best()
    {
        let value = if config.targets_fitness() {
            best.fitness
        } else {
            best.metric(&config.target_metric)
        };
        if let Some(value) = value
            && value >= target
        {
            return Some(StopReason::TargetReached {
                metric: config.target_metric.clone(),
                value,
                target,
            });
        }
    }

    None
}

fn variant_id(generation: usize, slot: usize) -> String {
    format!("gen{:03}_v{:02}", generation, slot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evolution::variation::{MutationStrategy, OracleContext, OracleError, Proposal};
    use crate::evolution::evaluator::EvalError;
    use crate::schema::EvaluationResult;
    use std::time::Duration;
    use tempfile::tempdir;

    struct AppendOracle;

    impl MutationOracle for AppendOracle {
        fn mutate(
            &self,
            parent: &Variant,
            strategy: MutationStrategy,
            _ctx: &OracleContext,
        ) -> Result<Proposal, OracleError> {
            Ok(Proposal {
                code: format!("{}|{}", parent.code, strategy),
                description: strategy.to_string(),
            })
        }

        fn crossover(
            &self,
            first: &Variant,
            second: &Variant,
            _ctx: &OracleContext,
        ) -> Result<Proposal, OracleError> {
            Ok(Proposal {
                code: format!("{}|{}", first.code, second.code),
                description: "crossover".into(),
            })
        }
    }

    /// Longer code scores better.
    struct LengthEvaluator;

    impl Evaluator for LengthEvaluator {
        fn evaluate(
            &self,
            code: &str,
            _variant_id: &str,
            _timeout: Duration,
        ) -> Result<EvaluationResult, EvalError> {
            Ok(EvaluationResult {
                sharpe_ratio: code.matches('|').count() as f64 * 0.1,
                max_drawdown: Some(0.2),
                ..Default::default()
            })
        }
    }

    struct FailingEvaluator;

    impl Evaluator for FailingEvaluator {
        fn evaluate(
            &self,
            _code: &str,
            _variant_id: &str,
            _timeout: Duration,
        ) -> Result<EvaluationResult, EvalError> {
            Err(EvalError::Service("backtest offline".into()))
        }
    }

    fn test_config() -> EvolutionConfig {
        EvolutionConfig {
            max_generations: 3,
            variants_per_generation: 3,
            elite_pool_size: 2,
            max_concurrent_evaluations: 2,
            auto_save: false,
            random_seed: Some(42),
            ..Default::default()
        }
    }

    fn scored(id: &str, fitness: f64, sharpe: f64) -> Variant {
        let mut v = Variant::new(id, 1, "code", vec!["baseline".into()], "test");
        let result = EvaluationResult {
            sharpe_ratio: sharpe,
            ..Default::default()
        };
        v.attach_evaluation(result.to_metrics(), fitness);
        v
    }

    #[test]
    fn test_stop_at_max_generations() {
        let config = EvolutionConfig {
            max_generations: 5,
            ..Default::default()
        };
        let mut state = EvolutionState::new("run", Some("code".into()), None, &config);
        state.current_generation = 5;

        let reason = check_stop(&state, &config).unwrap();
        assert!(reason.to_string().contains("max generations"));
    }

    #[test]
    fn test_stop_order() {
        let config = EvolutionConfig {
            max_generations: 5,
            convergence_patience: 2,
            target_fitness: Some(1.0),
            ..Default::default()
        };
        let mut state = EvolutionState::new("run", Some("code".into()), None, &config);
        assert_eq!(check_stop(&state, &config), None);

        state.elite_pool.update(scored("a", 0.5, 1.5));
        assert!(matches!(
            check_stop(&state, &config),
            Some(StopReason::TargetReached { .. })
        ));

        state.generations_without_improvement = 2;
        assert_eq!(
            check_stop(&state, &config),
            Some(StopReason::NoImprovement { generations: 2 })
        );

        state.current_generation = 5;
        assert_eq!(
            check_stop(&state, &config),
            Some(StopReason::MaxGenerations { generations: 5 })
        );
    }

    #[test]
    fn test_target_metric_selection() {
        let mut config = EvolutionConfig {
            target_fitness: Some(1.0),
            target_metric: "fitness".into(),
            ..Default::default()
        };
        let mut state = EvolutionState::new("run", Some("code".into()), None, &config);
        state.elite_pool.update(scored("a", 0.5, 1.5));
        assert_eq!(check_stop(&state, &config), None);

        config.target_metric = "sharpe_ratio".into();
        assert!(check_stop(&state, &config).is_some());

        config.target_metric = "not_reported".into();
        assert_eq!(check_stop(&state, &config), None);
    }

    #[test]
    fn test_run_reaches_max_generations() {
        let mut engine = EvolutionEngine::new(
            test_config(),
            "base",
            Arc::new(AppendOracle),
            Arc::new(LengthEvaluator),
        )
        .unwrap();

        let result = engine.run().unwrap();
        assert_eq!(result.stop_reason, StopReason::MaxGenerations { generations: 3 });
        assert_eq!(result.status, EvolutionStatus::Completed);
        assert_eq!(result.stats.generations, 3);
        assert_eq!(result.stats.total_evaluations, 9);

        let state = engine.state();
        // Baseline plus three generations of three.
        assert_eq!(state.all_variants.len(), 10);
        assert_eq!(state.generation_history.len(), 3);
        assert_eq!(state.elite_pool.len(), 2);
        assert!(state.elite_pool.get_best().unwrap().generation >= 2);
    }

    #[test]
    fn test_all_failed_evaluations() {
        let config = EvolutionConfig {
            max_generations: 10,
            convergence_patience: 2,
            ..test_config()
        };
        let mut engine = EvolutionEngine::new(
            config,
            "base",
            Arc::new(AppendOracle),
            Arc::new(FailingEvaluator),
        )
        .unwrap();

        let result = engine.run().unwrap();
        // Every generation's best reads as 0.0, so improvement stalls after the first.
        assert_eq!(result.stop_reason, StopReason::NoImprovement { generations: 2 });
        assert_eq!(result.stats.generations, 3);
        assert_eq!(result.stats.failed_evaluations, 9);
        assert!(result.best.is_none());
        assert!(engine.state().elite_pool.is_empty());
        assert_eq!(engine.state().failed_variants().len(), 9);
        // Generations 2 and 3 fell back to the baseline.
        for id in &engine.state().generation_history[2].variant_ids {
            let variant = engine.state().get_variant(id).unwrap();
            assert_eq!(variant.parent_ids, vec!["baseline".to_string()]);
        }
    }

    #[test]
    fn test_mutation_rate_adapts_on_stagnation() {
        let config = EvolutionConfig {
            max_generations: 10,
            convergence_patience: 3,
            mutation_rate: 0.5,
            max_mutation_rate: 0.75,
            ..test_config()
        };
        let mut engine = EvolutionEngine::new(
            config,
            "base",
            Arc::new(AppendOracle),
            Arc::new(FailingEvaluator),
        )
        .unwrap();

        engine.step().unwrap();
        engine.adapt_mutation_rate();
        assert_eq!(engine.mutation_rate(), 0.5);

        engine.step().unwrap();
        engine.adapt_mutation_rate();
        assert!((engine.mutation_rate() - 0.6).abs() < 1e-9);

        engine.step().unwrap();
        engine.adapt_mutation_rate();
        assert_eq!(engine.mutation_rate(), 0.75);
    }

    #[test]
    fn test_no_baseline_stops_without_parents() {
        let config = test_config();
        let state = EvolutionState::new("orphan", None, None, &config);
        let mut engine = EvolutionEngine::resume(
            config,
            state,
            Arc::new(AppendOracle),
            Arc::new(LengthEvaluator),
        )
        .unwrap();

        let result = engine.run().unwrap();
        assert_eq!(result.stop_reason, StopReason::NoParents);
        assert_eq!(result.status, EvolutionStatus::Completed);
        assert!(engine.state().generation_history.is_empty());
    }

    #[test]
    fn test_terminal_state_not_resumable() {
        let config = test_config();
        let mut state = EvolutionState::new("done", Some("base".into()), None, &config);
        state.transition(EvolutionStatus::Running).unwrap();
        state.transition(EvolutionStatus::Completed).unwrap();

        let err = EvolutionEngine::resume(
            config,
            state,
            Arc::new(AppendOracle),
            Arc::new(LengthEvaluator),
        )
        .err()
        .unwrap();
        assert!(matches!(err, EngineError::TerminalState { .. }));
    }

    #[test]
    fn test_step_after_completion_rejected() {
        let mut engine = EvolutionEngine::new(
            test_config(),
            "base",
            Arc::new(AppendOracle),
            Arc::new(LengthEvaluator),
        )
        .unwrap();
        engine.run().unwrap();

        assert!(matches!(
            engine.step(),
            Err(EngineError::TerminalState { .. })
        ));
        assert_eq!(engine.state().status, EvolutionStatus::Completed);
    }

    #[test]
    fn test_persistence_failure_marks_failed() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "occupied").unwrap();

        let config = EvolutionConfig {
            auto_save: true,
            state_dir: blocker,
            ..test_config()
        };
        let mut engine = EvolutionEngine::new(
            config,
            "base",
            Arc::new(AppendOracle),
            Arc::new(LengthEvaluator),
        )
        .unwrap();

        let err = engine.run().unwrap_err();
        assert!(matches!(err, EngineError::Persistence(_)));
        assert_eq!(engine.state().status, EvolutionStatus::Failed);
    }

    #[test]
    fn test_final_save_failure_marks_failed() {
        let dir = tempdir().unwrap();
        let state_dir = dir.path().join("state");
        let config = EvolutionConfig {
            auto_save: true,
            max_generations: 1,
            state_dir: state_dir.clone(),
            ..test_config()
        };
        // Swap the state directory for a file once the last generation is saved.
        let reporter: Arc<dyn ProgressReporter> =
            Arc::new(move |_state: &EvolutionState, _generation: usize| {
                std::fs::remove_dir_all(&state_dir).unwrap();
                std::fs::write(&state_dir, "occupied").unwrap();
            });
        let mut engine = EvolutionEngine::new(
            config,
            "base",
            Arc::new(AppendOracle),
            Arc::new(LengthEvaluator),
        )
        .unwrap()
        .with_reporter(reporter);

        let err = engine.run().unwrap_err();
        assert!(matches!(err, EngineError::Persistence(_)));
        assert_eq!(engine.state().status, EvolutionStatus::Failed);
    }

    #[test]
    fn test_met_stop_condition_skips_generation() {
        let config = EvolutionConfig {
            max_generations: 2,
            ..test_config()
        };
        let mut state = EvolutionState::new("done-but-running", Some("base".into()), None, &config);
        state.transition(EvolutionStatus::Running).unwrap();
        state.current_generation = 2;
        let mut engine = EvolutionEngine::resume(
            config,
            state,
            Arc::new(AppendOracle),
            Arc::new(LengthEvaluator),
        )
        .unwrap();

        let result = engine.run().unwrap();
        assert_eq!(result.stop_reason, StopReason::MaxGenerations { generations: 2 });
        assert_eq!(result.stats.total_evaluations, 0);
        assert_eq!(engine.state().status, EvolutionStatus::Completed);
    }

    #[test]
    fn test_manual_save_without_auto_save() {
        let dir = tempdir().unwrap();
        let config = EvolutionConfig {
            state_dir: dir.path().to_path_buf(),
            ..test_config()
        };
        let mut engine = EvolutionEngine::new(
            config,
            "base",
            Arc::new(AppendOracle),
            Arc::new(LengthEvaluator),
        )
        .unwrap();

        engine.step().unwrap();
        assert!(engine.store().list().unwrap().is_empty());

        let path = engine.save().unwrap();
        assert!(path.is_file());
        let loaded = engine.store().load(&engine.state().evolution_id).unwrap();
        assert_eq!(&loaded, engine.state());
    }

    #[test]
    fn test_evaluate_baseline() {
        let config = EvolutionConfig {
            evaluate_baseline: true,
            max_generations: 1,
            ..test_config()
        };
        let mut engine = EvolutionEngine::new(
            config,
            "base",
            Arc::new(AppendOracle),
            Arc::new(LengthEvaluator),
        )
        .unwrap();

        engine.run().unwrap();
        let baseline = engine.state().baseline().unwrap();
        assert!(baseline.is_evaluated());
        assert_eq!(engine.state().evaluated_count(), 4);
    }

    #[test]
    fn test_variant_ids() {
        assert_eq!(variant_id(3, 7), "gen003_v07");
    }
}
