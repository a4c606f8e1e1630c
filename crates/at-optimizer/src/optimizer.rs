//! The optimizer interface and the bookkeeping shared by every optimizer.

use at_types::{AtError, AtResult, EvaluationError, OptimizationGoals};
use chrono::Utc;
use crossbeam_channel::Sender;
use std::cmp::Ordering;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::evaluator::Problem;
use crate::events::OptimizerEvent;
use crate::history::{
    Checkpoint, Evaluation, EvaluationHistory, HistoryEntry, ObjectiveDirection,
    OptimizationReport, OptimizationStatus, StopReason,
};

/// Common interface of the optimization methods.
pub trait Optimizer {
    /// Human-readable method name.
    fn name(&self) -> &str;

    /// Run the optimization and return the best evaluation found.
    fn run_optimization(&mut self, problem: &dyn Problem, verbosity: bool) -> AtResult<Evaluation>;

    /// Best evaluation per processed round, in round order.
    fn eval_history(&self) -> &EvaluationHistory;

    /// Cumulative checkpoints, one per processed round.
    fn checkpoints(&self) -> &[Checkpoint];

    fn status(&self) -> &OptimizationStatus;

    /// Snapshot of the run for the caller to persist.
    fn report(&self) -> AtResult<OptimizationReport>;
}

/// Outcome of one evaluation once its objective has been extracted.
pub(crate) type Scored = Result<(f64, OptimizationGoals), EvaluationError>;

/// Extract `goal` from a successful evaluation. A NaN objective counts as a
/// failed evaluation; a goal missing from a successful one is an error.
pub(crate) fn score(goal: &str, result: Result<OptimizationGoals, EvaluationError>) -> AtResult<Scored> {
    match result {
        Ok(goals) => {
            let objective = goals.get(goal)?;
            if objective.is_nan() {
                Ok(Err(EvaluationError::NotANumber {
                    goal: goal.to_string(),
                }))
            } else {
                Ok(Ok((objective, goals)))
            }
        }
        Err(e) => Ok(Err(e)),
    }
}

pub(crate) fn score_all(
    goal: &str,
    results: Vec<Result<OptimizationGoals, EvaluationError>>,
) -> AtResult<Vec<Scored>> {
    results.into_iter().map(|result| score(goal, result)).collect()
}

/// Indices of `scored`, best first. Failures rank last and ties keep
/// population order.
pub(crate) fn rank(scored: &[Scored], direction: ObjectiveDirection) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scored.len()).collect();
    order.sort_by(|&a, &b| match (&scored[a], &scored[b]) {
        (Ok((x, _)), Ok((y, _))) => direction.compare(*x, *y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => Ordering::Equal,
    });
    order
}

/// Parts of one round's outcome that go into the history.
pub(crate) struct RoundRecord {
    pub evaluation: Evaluation,
    pub objective: f64,
    pub bracket: Option<usize>,
    pub round: usize,
    pub n_resources: f64,
    pub evaluated: usize,
    pub failed: usize,
    pub kept: usize,
}

/// Per-run state: clock, budgets, history, checkpoints, status and the
/// optional event channel.
pub(crate) struct RunTracker {
    direction: ObjectiveDirection,
    max_time: Option<Duration>,
    max_rounds: Option<usize>,
    started: Option<Instant>,
    resources: f64,
    history: EvaluationHistory,
    checkpoints: Vec<Checkpoint>,
    status: OptimizationStatus,
    problem: String,
    events: Option<Sender<OptimizerEvent>>,
}

impl RunTracker {
    pub(crate) fn new(
        direction: ObjectiveDirection,
        max_time: Option<Duration>,
        max_rounds: Option<usize>,
    ) -> Self {
        Self {
            direction,
            max_time,
            max_rounds,
            started: None,
            resources: 0.0,
            history: EvaluationHistory::new(),
            checkpoints: Vec::new(),
            status: OptimizationStatus::new(),
            problem: String::new(),
            events: None,
        }
    }

    pub(crate) fn set_events(&mut self, events: Sender<OptimizerEvent>) {
        self.events = Some(events);
    }

    /// Reset all per-run state and start the clock.
    pub(crate) fn start(&mut self, problem: &str) {
        self.started = Some(Instant::now());
        self.resources = 0.0;
        self.history.clear();
        self.checkpoints.clear();
        self.status = OptimizationStatus::new();
        self.status.mark_running();
        self.problem = problem.to_string();
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.started.map(|s| s.elapsed()).unwrap_or_default()
    }

    pub(crate) fn add_resources(&mut self, amount: f64) {
        self.resources += amount;
    }

    /// Count outcomes and record a checkpoint without a history entry (a
    /// random-search iteration whose evaluation failed).
    pub(crate) fn record_failed_iteration(&mut self) -> Checkpoint {
        self.status.evaluations_failed += 1;
        self.status.rounds_completed += 1;
        self.push_checkpoint()
    }

    /// Append the best evaluation of a round, with its checkpoint.
    pub(crate) fn record_round(&mut self, record: RoundRecord) -> Checkpoint {
        self.status.rounds_completed += 1;
        self.status.evaluations_completed += record.evaluated - record.failed;
        self.status.evaluations_failed += record.failed;
        let checkpoint = self.push_checkpoint();

        let entry = HistoryEntry {
            evaluation: record.evaluation,
            objective: record.objective,
            bracket: record.bracket,
            round: record.round,
            n_resources: record.n_resources,
            evaluated: record.evaluated,
            failed: record.failed,
            checkpoint,
            recorded_at: Utc::now(),
        };
        self.status.update_best(&entry, self.direction);
        self.emit(OptimizerEvent::RoundCompleted {
            run_id: self.status.id,
            bracket: entry.bracket,
            round: entry.round,
            evaluated: entry.evaluated,
            failed: entry.failed,
            kept: record.kept,
            best_objective: entry.objective,
            checkpoint,
        });
        self.history.push(entry);
        checkpoint
    }

    fn push_checkpoint(&mut self) -> Checkpoint {
        let checkpoint = Checkpoint {
            iteration: self.checkpoints.len() + 1,
            elapsed_secs: self.elapsed().as_secs_f64(),
            resources: self.resources,
        };
        self.checkpoints.push(checkpoint);
        checkpoint
    }

    /// Checked at round boundaries only.
    pub(crate) fn budget_exhausted(&self) -> Option<StopReason> {
        if let Some(limit) = self.max_rounds {
            if self.status.rounds_completed >= limit {
                return Some(StopReason::RoundBudget { limit });
            }
        }
        if let Some(limit) = self.max_time {
            let elapsed = self.elapsed();
            if elapsed >= limit {
                return Some(StopReason::TimeBudget {
                    limit_secs: limit.as_secs_f64(),
                    elapsed_secs: elapsed.as_secs_f64(),
                });
            }
        }
        None
    }

    pub(crate) fn stop(&mut self, reason: StopReason) {
        self.status.mark_stopped(reason);
        self.emit(OptimizerEvent::BudgetExhausted {
            run_id: self.status.id,
            reason,
        });
        self.emit_finished();
    }

    pub(crate) fn complete(&mut self) {
        self.status.mark_completed();
        self.emit_finished();
    }

    pub(crate) fn fail(&mut self, error: &AtError) {
        self.status.mark_failed(error.to_string());
        self.emit_finished();
    }

    /// Best evaluation over the whole history.
    pub(crate) fn best(&self) -> AtResult<Evaluation> {
        self.history
            .best(self.direction)
            .map(|entry| entry.evaluation.clone())
            .ok_or(AtError::NoSuccessfulEvaluations)
    }

    pub(crate) fn emit(&self, event: OptimizerEvent) {
        if let Some(tx) = &self.events {
            if tx.try_send(event).is_err() {
                debug!("Optimizer event dropped: channel full or disconnected");
            }
        }
    }

    fn emit_finished(&self) {
        self.emit(OptimizerEvent::Finished {
            run_id: self.status.id,
            state: self.status.state,
        });
    }

    pub(crate) fn history(&self) -> &EvaluationHistory {
        &self.history
    }

    pub(crate) fn checkpoints(&self) -> &[Checkpoint] {
        &self.checkpoints
    }

    pub(crate) fn status(&self) -> &OptimizationStatus {
        &self.status
    }

    pub(crate) fn report(&self, optimizer: &str, config: serde_json::Value) -> OptimizationReport {
        OptimizationReport {
            optimizer: optimizer.to_string(),
            problem: self.problem.clone(),
            config,
            status: self.status.clone(),
            best: self.status.best.clone(),
            history: self.history.clone(),
            checkpoints: self.checkpoints.clone(),
        }
    }
}
