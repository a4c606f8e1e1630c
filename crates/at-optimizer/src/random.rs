//! Random search: one fresh arm per iteration, evaluated once.

use at_types::{config_error, AtError, AtResult, VALIDATION_ERROR};
use crossbeam_channel::Sender;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::evaluator::Problem;
use crate::events::OptimizerEvent;
use crate::history::{
    Checkpoint, Evaluation, EvaluationHistory, ObjectiveDirection, OptimizationReport,
    OptimizationStatus, StopReason,
};
use crate::optimizer::{score, Optimizer, RoundRecord, RunTracker};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomSearchConfig {
    /// Resources given to every arm.
    pub n_resources: f64,
    /// Number of arms to evaluate.
    #[serde(default)]
    pub max_iter: Option<usize>,
    #[serde(default)]
    pub max_time: Option<Duration>,
    pub optimization_goal: String,
    #[serde(default)]
    pub direction: ObjectiveDirection,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl RandomSearchConfig {
    pub fn new(n_resources: f64, max_iter: usize) -> Self {
        Self {
            n_resources,
            max_iter: Some(max_iter),
            max_time: None,
            optimization_goal: VALIDATION_ERROR.to_string(),
            direction: ObjectiveDirection::Minimize,
            seed: None,
        }
    }

    pub fn with_max_time(mut self, max_time: Duration) -> Self {
        self.max_time = Some(max_time);
        self
    }

    /// Drop the iteration limit; the time budget alone bounds the run.
    pub fn unbounded_iterations(mut self) -> Self {
        self.max_iter = None;
        self
    }

    pub fn with_objective(mut self, goal: &str, direction: ObjectiveDirection) -> Self {
        self.optimization_goal = goal.to_string();
        self.direction = direction;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> AtResult<()> {
        if !(self.n_resources.is_finite() && self.n_resources > 0.0) {
            return Err(config_error!(
                "n_resources must be positive and finite, got {}",
                self.n_resources
            ));
        }
        if self.max_iter.is_none() && self.max_time.is_none() {
            return Err(config_error!(
                "random search needs max_iter or max_time to terminate"
            ));
        }
        if self.max_iter == Some(0) {
            return Err(config_error!("max_iter must be positive when set"));
        }
        if self.optimization_goal.trim().is_empty() {
            return Err(config_error!("optimization_goal must not be empty"));
        }
        Ok(())
    }
}

pub struct RandomOptimizer {
    config: RandomSearchConfig,
    tracker: RunTracker,
}

impl RandomOptimizer {
    pub fn new(config: RandomSearchConfig) -> AtResult<Self> {
        config.validate()?;
        let tracker = RunTracker::new(config.direction, config.max_time, None);
        Ok(Self { config, tracker })
    }

    pub fn with_events(mut self, events: Sender<OptimizerEvent>) -> Self {
        self.tracker.set_events(events);
        self
    }

    pub fn config(&self) -> &RandomSearchConfig {
        &self.config
    }

    fn run_iterations(
        &mut self,
        problem: &dyn Problem,
        rng: &mut StdRng,
        verbosity: bool,
    ) -> AtResult<Option<StopReason>> {
        let goal = self.config.optimization_goal.clone();
        let n_resources = self.config.n_resources;
        let mut iteration = 0;

        loop {
            let mut evaluator = problem.get_evaluator(None, rng)?;
            let result = evaluator.evaluate(n_resources);
            self.tracker.add_resources(n_resources);

            match score(&goal, result)? {
                Ok((objective, goals)) => {
                    let checkpoint = self.tracker.record_round(RoundRecord {
                        evaluation: Evaluation {
                            arm: evaluator.arm().clone(),
                            goals,
                        },
                        objective,
                        bracket: None,
                        round: iteration,
                        n_resources,
                        evaluated: 1,
                        failed: 0,
                        kept: 0,
                    });
                    if verbosity {
                        info!(
                            "Iteration {}: {} = {} ({:.2}s elapsed)\n{}",
                            iteration,
                            goal,
                            objective,
                            checkpoint.elapsed_secs,
                            evaluator.arm()
                        );
                    } else {
                        debug!("Iteration {}: {} = {}", iteration, goal, objective);
                    }
                }
                Err(e) => {
                    warn!("Evaluation failed in iteration {}: {}\n{}", iteration, e, evaluator.arm());
                    self.tracker.record_failed_iteration();
                }
            }

            iteration += 1;
            if self.config.max_iter.is_some_and(|limit| iteration >= limit) {
                return Ok(None);
            }
            if let Some(reason) = self.tracker.budget_exhausted() {
                return Ok(Some(reason));
            }
        }
    }
}

impl Optimizer for RandomOptimizer {
    fn name(&self) -> &str {
        "Random"
    }

    fn run_optimization(&mut self, problem: &dyn Problem, verbosity: bool) -> AtResult<Evaluation> {
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        self.tracker.start(problem.name());
        info!("{}", self);

        let outcome = self.run_iterations(problem, &mut rng, verbosity);
        let outcome = match outcome {
            Ok(_) if self.tracker.history().is_empty() => Err(AtError::NoSuccessfulEvaluations),
            other => other,
        };
        match outcome {
            Ok(Some(reason)) => {
                info!("Random search stopped: {:?}", reason);
                self.tracker.stop(reason);
            }
            Ok(None) => self.tracker.complete(),
            Err(e) => {
                self.tracker.fail(&e);
                return Err(e);
            }
        }

        let best = self.tracker.best()?;
        info!(
            "Random search finished after {} iterations: best {} = {}",
            self.tracker.checkpoints().len(),
            self.config.optimization_goal,
            best.objective(&self.config.optimization_goal)?
        );
        Ok(best)
    }

    fn eval_history(&self) -> &EvaluationHistory {
        self.tracker.history()
    }

    fn checkpoints(&self) -> &[Checkpoint] {
        self.tracker.checkpoints()
    }

    fn status(&self) -> &OptimizationStatus {
        self.tracker.status()
    }

    fn report(&self) -> AtResult<OptimizationReport> {
        let config = serde_json::to_value(&self.config)?;
        Ok(self.tracker.report(self.name(), config))
    }
}

impl fmt::Display for RandomOptimizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "> Starting random search")?;
        writeln!(f, "    Resources per arm       = {}", self.config.n_resources)?;
        match self.config.max_iter {
            Some(max_iter) => writeln!(f, "    Max iterations          = {}", max_iter)?,
            None => writeln!(f, "    Max iterations          = unbounded")?,
        }
        if let Some(max_time) = self.config.max_time {
            writeln!(f, "    Max time                = {:.1}s", max_time.as_secs_f64())?;
        }
        write!(
            f,
            "  Optimizing ({}) {}",
            self.config.direction.as_str(),
            self.config.optimization_goal
        )
    }
}
