//! Evaluation history, run status and reporting.

use at_types::{Arm, AtResult, OptimizationGoals};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use uuid::Uuid;

/// Unique optimization run identifier.
pub type RunId = Uuid;

/// Whether we are minimizing or maximizing the optimization goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ObjectiveDirection {
    #[default]
    Minimize,
    Maximize,
}

impl ObjectiveDirection {
    /// Ordering that puts the better value first. NaN always sorts last.
    pub fn compare(&self, a: f64, b: f64) -> Ordering {
        match (a.is_nan(), b.is_nan()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => match self {
                Self::Minimize => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
                Self::Maximize => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
            },
        }
    }

    /// Strict improvement: ties keep the incumbent.
    pub fn is_better(&self, candidate: f64, incumbent: f64) -> bool {
        self.compare(candidate, incumbent) == Ordering::Less
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minimize => "min",
            Self::Maximize => "max",
        }
    }
}

/// An arm together with the goals one of its evaluations produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub arm: Arm,
    pub goals: OptimizationGoals,
}

impl Evaluation {
    pub fn objective(&self, goal: &str) -> AtResult<f64> {
        self.goals.get(goal)
    }
}

/// Cumulative progress marker, recorded once per processed round.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Rounds (or random-search iterations) processed so far, 1-based.
    pub iteration: usize,
    /// Wall-clock seconds since the run started.
    pub elapsed_secs: f64,
    /// Resources consumed so far across every evaluator.
    pub resources: f64,
}

/// Best evaluation of one round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub evaluation: Evaluation,
    /// Value of the optimization goal for `evaluation`.
    pub objective: f64,
    /// Hyperband bracket index `s`; `None` for random search.
    pub bracket: Option<usize>,
    /// Round index inside the bracket (iteration index for random search).
    pub round: usize,
    /// Resource level every evaluator of the round was trained to.
    pub n_resources: f64,
    pub evaluated: usize,
    pub failed: usize,
    pub checkpoint: Checkpoint,
    pub recorded_at: DateTime<Utc>,
}

/// Append-only, round-ordered record of the best evaluation per round.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvaluationHistory {
    entries: Vec<HistoryEntry>,
}

impl EvaluationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, HistoryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&HistoryEntry> {
        self.entries.last()
    }

    /// Best entry for `direction`; the earliest one wins ties.
    pub fn best(&self, direction: ObjectiveDirection) -> Option<&HistoryEntry> {
        self.entries.iter().fold(None, |best, entry| match best {
            Some(current) if !direction.is_better(entry.objective, current.objective) => {
                Some(current)
            }
            _ => Some(entry),
        })
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Why a run ended before its schedule was exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum StopReason {
    TimeBudget { limit_secs: f64, elapsed_secs: f64 },
    RoundBudget { limit: usize },
}

/// Lifecycle state for an optimization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Pending,
    Running,
    Completed,
    Stopped,
    Failed,
}

/// Aggregate status of an optimization run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationStatus {
    pub id: RunId,
    pub state: RunState,
    pub rounds_completed: usize,
    pub evaluations_completed: usize,
    pub evaluations_failed: usize,
    pub best: Option<Evaluation>,
    pub best_objective: Option<f64>,
    pub stop_reason: Option<StopReason>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl OptimizationStatus {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: RunState::Pending,
            rounds_completed: 0,
            evaluations_completed: 0,
            evaluations_failed: 0,
            best: None,
            best_objective: None,
            stop_reason: None,
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    pub fn mark_running(&mut self) {
        self.state = RunState::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_completed(&mut self) {
        self.state = RunState::Completed;
        self.finished_at = Some(Utc::now());
    }

    pub fn mark_stopped(&mut self, reason: StopReason) {
        self.state = RunState::Stopped;
        self.stop_reason = Some(reason);
        self.finished_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error: String) {
        self.state = RunState::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error);
    }

    /// Update the best evaluation if `entry` improves on it.
    pub fn update_best(&mut self, entry: &HistoryEntry, direction: ObjectiveDirection) {
        let improves = match self.best_objective {
            None => true,
            Some(current) => direction.is_better(entry.objective, current),
        };
        if improves {
            self.best = Some(entry.evaluation.clone());
            self.best_objective = Some(entry.objective);
        }
    }
}

impl Default for OptimizationStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Final state of a run, ready for the caller to persist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationReport {
    pub optimizer: String,
    pub problem: String,
    pub config: serde_json::Value,
    pub status: OptimizationStatus,
    pub best: Option<Evaluation>,
    pub history: EvaluationHistory,
    pub checkpoints: Vec<Checkpoint>,
}

impl OptimizationReport {
    pub fn to_json_pretty(&self) -> AtResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
