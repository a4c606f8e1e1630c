//! Hyperband: bracket generation plus successive halving.
//!
//! Every bracket `s` (from `s_max` down to `s_min`) spawns `n` random arms
//! with `r` resources each, then repeatedly evaluates the survivors at
//! `r_i = r * eta^i` and keeps the best `floor(n_i / eta)` of them.
//!
//! Brackets with `s < 2` are skipped whenever `s_max >= 2`. This trades a
//! little exploitation depth for a much shorter run.

use at_types::{config_error, AtError, AtResult, EvaluationError, VALIDATION_ERROR};
use crossbeam_channel::Sender;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::evaluator::{Evaluator, Problem};
use crate::events::OptimizerEvent;
use crate::execution::{Execution, RoundExecutor};
use crate::history::{
    Checkpoint, Evaluation, EvaluationHistory, ObjectiveDirection, OptimizationReport,
    OptimizationStatus, StopReason,
};
use crate::optimizer::{rank, score_all, Optimizer, RoundRecord, RunTracker};

/// Configuration of a Hyperband run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HyperbandConfig {
    /// Halving rate: each round keeps `1/eta` of the evaluators.
    pub eta: usize,

    /// Maximum resources a single configuration may receive (`R`). Required.
    pub max_iter: Option<usize>,

    /// Wall-clock budget, checked at round boundaries.
    #[serde(default)]
    pub max_time: Option<Duration>,

    /// Maximum number of rounds, checked at round boundaries.
    #[serde(default)]
    pub max_rounds: Option<usize>,

    /// Metric to optimize (e.g. "validation_error").
    pub optimization_goal: String,

    #[serde(default)]
    pub direction: ObjectiveDirection,

    /// Seed of the run's random generator; `None` seeds from the OS.
    #[serde(default)]
    pub seed: Option<u64>,

    #[serde(default)]
    pub execution: Execution,
}

impl HyperbandConfig {
    pub fn new(eta: usize, max_iter: usize) -> Self {
        Self {
            eta,
            max_iter: Some(max_iter),
            max_time: None,
            max_rounds: None,
            optimization_goal: VALIDATION_ERROR.to_string(),
            direction: ObjectiveDirection::Minimize,
            seed: None,
            execution: Execution::Sequential,
        }
    }

    pub fn with_max_time(mut self, max_time: Duration) -> Self {
        self.max_time = Some(max_time);
        self
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = Some(max_rounds);
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

    pub fn with_execution(mut self, execution: Execution) -> Self {
        self.execution = execution;
        self
    }

    pub fn validate(&self) -> AtResult<()> {
        self.schedule().map(|_| ())
    }

    /// Validate the configuration and build its bracket schedule.
    fn schedule(&self) -> AtResult<HyperbandSchedule> {
        let max_iter = match self.max_iter {
            None => return Err(config_error!("For Hyperband max_iter cannot be None")),
            Some(0) => return Err(config_error!("max_iter must be positive")),
            Some(max_iter) => max_iter,
        };
        if self.eta < 2 {
            return Err(config_error!(
                "eta must be at least 2 for halving to shrink the population, got {}",
                self.eta
            ));
        }
        if self.optimization_goal.trim().is_empty() {
            return Err(config_error!("optimization_goal must not be empty"));
        }
        if self.max_rounds == Some(0) {
            return Err(config_error!("max_rounds must be positive when set"));
        }
        self.execution.validate()?;
        HyperbandSchedule::new(self.eta, max_iter)
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json_str(json: &str) -> AtResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}

/// One successive-halving round of a bracket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundPlan {
    pub round: usize,
    /// Nominal population `n * eta^-i`.
    pub n_i: f64,
    /// Evaluators actually alive at the start of the round.
    pub alive: usize,
    /// Resource level every alive evaluator is trained to.
    pub r_i: f64,
    /// Survivors promoted to the next round, `floor(n_i / eta)`.
    pub keep: usize,
}

/// One bracket: `n` arms starting with `r` resources each.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BracketPlan {
    pub s: usize,
    pub n: usize,
    pub r: f64,
    pub rounds: Vec<RoundPlan>,
}

impl BracketPlan {
    /// Resources the bracket consumes when every evaluation resumes from its
    /// previous level.
    pub fn total_resources(&self) -> f64 {
        let mut previous = 0.0;
        self.rounds
            .iter()
            .map(|round| {
                let spent = round.alive as f64 * (round.r_i - previous);
                previous = round.r_i;
                spent
            })
            .sum()
    }
}

/// The full bracket schedule for a `(max_iter, eta)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HyperbandSchedule {
    pub eta: usize,
    pub max_iter: usize,
    pub s_max: usize,
    pub s_min: usize,
    /// Nominal budget of each bracket, `B = (s_max + 1) * R`.
    pub budget: usize,
    /// Brackets in execution order (`s_max` first).
    pub brackets: Vec<BracketPlan>,
}

impl HyperbandSchedule {
    /// Expects `eta >= 2` and `max_iter >= 1`. All sizes use exact integer
    /// arithmetic, so float rounding never changes a population. Bracket
    /// sizes round up, `n = ceil((s_max + 1) * eta^s / (s + 1))`, as in the
    /// Hyperband paper.
    ///
    /// Fails with a configuration error when a population or the bracket
    /// budget does not fit in a `usize`.
    pub fn new(eta: usize, max_iter: usize) -> AtResult<Self> {
        let s_max = floor_log(max_iter, eta);
        let s_min = if s_max >= 2 { 2 } else { 0 };
        let budget = (s_max + 1)
            .checked_mul(max_iter)
            .ok_or_else(|| too_large(eta, max_iter))?;

        let brackets = (s_min..=s_max)
            .rev()
            .map(|s| -> AtResult<BracketPlan> {
                let eta_s = pow(eta, s).ok_or_else(|| too_large(eta, max_iter))?;
                let n = eta_s
                    .checked_mul(s_max + 1)
                    .ok_or_else(|| too_large(eta, max_iter))?
                    .div_ceil(s + 1);
                let r = max_iter as f64 / eta_s as f64;

                let mut alive = n;
                let rounds = (0..=s)
                    .map(|i| {
                        let eta_i = pow(eta, i).unwrap_or(usize::MAX);
                        let keep = pow(eta, i + 1).map_or(0, |p| n / p);
                        let plan = RoundPlan {
                            round: i,
                            n_i: n as f64 / eta_i as f64,
                            alive,
                            r_i: max_iter as f64 / pow(eta, s - i).unwrap_or(usize::MAX) as f64,
                            keep,
                        };
                        alive = keep.min(alive);
                        plan
                    })
                    .collect();

                Ok(BracketPlan { s, n, r, rounds })
            })
            .collect::<AtResult<Vec<_>>>()?;

        Ok(Self {
            eta,
            max_iter,
            s_max,
            s_min,
            budget,
            brackets,
        })
    }

    pub fn total_rounds(&self) -> usize {
        self.brackets.iter().map(|b| b.rounds.len()).sum()
    }
}

/// Largest `s` with `eta^s <= value`.
fn floor_log(value: usize, eta: usize) -> usize {
    let mut s = 0;
    let mut power = eta;
    while power <= value {
        s += 1;
        match power.checked_mul(eta) {
            Some(next) => power = next,
            None => break,
        }
    }
    s
}

fn too_large(eta: usize, max_iter: usize) -> AtError {
    config_error!("max_iter {} with eta {} overflows the bracket sizes", max_iter, eta)
}

fn pow(base: usize, exp: usize) -> Option<usize> {
    u32::try_from(exp).ok().and_then(|e| base.checked_pow(e))
}

/// Hyperband optimizer.
pub struct HyperbandOptimizer {
    config: HyperbandConfig,
    schedule: HyperbandSchedule,
    tracker: RunTracker,
}

impl HyperbandOptimizer {
    /// Validate `config` and build the optimizer.
    pub fn new(config: HyperbandConfig) -> AtResult<Self> {
        let schedule = config.schedule()?;
        let tracker = RunTracker::new(config.direction, config.max_time, config.max_rounds);
        Ok(Self {
            config,
            schedule,
            tracker,
        })
    }

    /// Send progress events to `events` during runs.
    pub fn with_events(mut self, events: Sender<OptimizerEvent>) -> Self {
        self.tracker.set_events(events);
        self
    }

    pub fn config(&self) -> &HyperbandConfig {
        &self.config
    }

    /// The bracket schedule a run follows, without evaluating anything.
    pub fn plan(&self) -> &HyperbandSchedule {
        &self.schedule
    }

    fn run_brackets(
        &mut self,
        problem: &dyn Problem,
        schedule: &HyperbandSchedule,
        rng: &mut StdRng,
        executor: &RoundExecutor,
        verbosity: bool,
    ) -> AtResult<Option<StopReason>> {
        let total_rounds = schedule.total_rounds();
        let mut rounds_done = 0;

        for bracket in &schedule.brackets {
            let mut evaluators = (0..bracket.n)
                .map(|_| problem.get_evaluator(None, rng))
                .collect::<AtResult<Vec<_>>>()?;

            self.tracker.emit(OptimizerEvent::BracketStarted {
                run_id: self.tracker.status().id,
                bracket: bracket.s,
                n_arms: bracket.n,
                initial_resources: bracket.r,
            });
            if verbosity {
                info!("Bracket s={}: generated {} evaluators, each with a random arm", bracket.s, bracket.n);
            } else {
                debug!("Bracket s={}: generated {} evaluators", bracket.s, bracket.n);
            }

            let mut previous_r = 0.0;
            for round in &bracket.rounds {
                if evaluators.is_empty() {
                    break;
                }
                evaluators = self.run_round(bracket.s, round, evaluators, previous_r, executor, verbosity)?;
                previous_r = round.r_i;
                rounds_done += 1;

                if rounds_done < total_rounds {
                    if let Some(reason) = self.tracker.budget_exhausted() {
                        return Ok(Some(reason));
                    }
                }
            }
        }

        Ok(None)
    }

    /// Evaluate, rank and prune one round. Returns the survivors, best first.
    fn run_round(
        &mut self,
        bracket: usize,
        round: &RoundPlan,
        mut evaluators: Vec<Box<dyn Evaluator>>,
        previous_r: f64,
        executor: &RoundExecutor,
        verbosity: bool,
    ) -> AtResult<Vec<Box<dyn Evaluator>>> {
        let goal = self.config.optimization_goal.as_str();
        let results = executor.evaluate(&mut evaluators, round.r_i);
        self.tracker
            .add_resources(evaluators.len() as f64 * (round.r_i - previous_r));

        let scored = score_all(goal, results)?;
        let mut failed = 0;
        let mut last_error = None;
        for (evaluator, outcome) in evaluators.iter().zip(&scored) {
            if let Err(e) = outcome {
                warn!(
                    "Evaluation failed in bracket {} round {} at {:.2} resources, ranking it last: {}\n{}",
                    bracket,
                    round.round,
                    round.r_i,
                    e,
                    evaluator.arm()
                );
                failed += 1;
                last_error = Some(e.clone());
            }
        }

        let ranking = rank(&scored, self.config.direction);
        let best_idx = ranking[0];
        let (objective, goals) = match &scored[best_idx] {
            Ok((objective, goals)) => (*objective, goals.clone()),
            Err(_) => {
                return Err(AtError::RoundFailed {
                    bracket,
                    round: round.round,
                    source: last_error.unwrap_or(EvaluationError::Failed {
                        message: "no evaluation result".to_string(),
                    }),
                })
            }
        };

        let kept = round.keep.min(evaluators.len());
        let checkpoint = self.tracker.record_round(RoundRecord {
            evaluation: Evaluation {
                arm: evaluators[best_idx].arm().clone(),
                goals,
            },
            objective,
            bracket: Some(bracket),
            round: round.round,
            n_resources: round.r_i,
            evaluated: evaluators.len(),
            failed,
            kept,
        });

        if verbosity {
            info!(
                "Evaluated {} arms with {:.2} resources each; best {} = {} ({:.2}s elapsed)",
                evaluators.len(),
                round.r_i,
                goal,
                objective,
                checkpoint.elapsed_secs
            );
        } else {
            debug!(
                "Bracket {} round {}: {} arms at {:.2} resources, best {} = {}",
                bracket,
                round.round,
                evaluators.len(),
                round.r_i,
                goal,
                objective
            );
        }

        let mut slots: Vec<Option<Box<dyn Evaluator>>> = evaluators.into_iter().map(Some).collect();
        Ok(ranking
            .iter()
            .take(kept)
            .filter_map(|&idx| slots[idx].take())
            .collect())
    }
}

impl Optimizer for HyperbandOptimizer {
    fn name(&self) -> &str {
        "Hyperband"
    }

    fn run_optimization(&mut self, problem: &dyn Problem, verbosity: bool) -> AtResult<Evaluation> {
        let schedule = self.schedule.clone();
        let largest_round = schedule.brackets.iter().map(|b| b.n).max().unwrap_or(0);
        let executor = RoundExecutor::new(self.config.execution, largest_round)?;
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        self.tracker.start(problem.name());
        info!("{}", self);
        debug!(
            "Hyperband schedule: s_max={}, s_min={}, B={}, {} rounds, {} pool threads",
            schedule.s_max,
            schedule.s_min,
            schedule.budget,
            schedule.total_rounds(),
            executor.pool_size()
        );

        match self.run_brackets(problem, &schedule, &mut rng, &executor, verbosity) {
            Ok(Some(reason)) => {
                info!("Hyperband stopped at a round boundary: {:?}", reason);
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
            "Hyperband finished after {} rounds: best {} = {}",
            self.tracker.status().rounds_completed,
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

impl fmt::Display for HyperbandOptimizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "> Starting Hyperband optimisation")?;
        writeln!(f, "    Max iterations (R)      = {}", self.schedule.max_iter)?;
        writeln!(f, "    Halving rate (eta)      = {}", self.config.eta)?;
        write!(
            f,
            "  Optimizing ({}) {}",
            self.config.direction.as_str(),
            self.config.optimization_goal
        )
    }
}
