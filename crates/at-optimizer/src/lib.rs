//! # at-optimizer
//!
//! Resource-allocation schedulers for hyperparameter optimization.
//!
//! Provides the evaluator/problem contracts, the Hyperband scheduler (bracket
//! generation plus successive halving), a random-search baseline, evaluation
//! history bookkeeping, and sequential or thread-pool execution of rounds.

mod evaluator;
mod events;
mod execution;
mod history;
mod hyperband;
mod optimizer;
mod random;

pub use evaluator::{Evaluator, Problem};
pub use events::OptimizerEvent;
pub use execution::Execution;
pub use history::{
    Checkpoint, Evaluation, EvaluationHistory, HistoryEntry, ObjectiveDirection,
    OptimizationReport, OptimizationStatus, RunId, RunState, StopReason,
};
pub use hyperband::{BracketPlan, HyperbandConfig, HyperbandOptimizer, HyperbandSchedule, RoundPlan};
pub use optimizer::Optimizer;
pub use random::{RandomOptimizer, RandomSearchConfig};
