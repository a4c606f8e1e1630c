//! Progress events emitted while a run is in flight.

use serde::{Deserialize, Serialize};

use crate::history::{Checkpoint, RunId, RunState, StopReason};

/// Event sent on the channel registered with an optimizer.
///
/// Delivery is best-effort: a full or disconnected channel never interrupts
/// the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OptimizerEvent {
    BracketStarted {
        run_id: RunId,
        bracket: usize,
        n_arms: usize,
        initial_resources: f64,
    },
    RoundCompleted {
        run_id: RunId,
        bracket: Option<usize>,
        round: usize,
        evaluated: usize,
        failed: usize,
        kept: usize,
        best_objective: f64,
        checkpoint: Checkpoint,
    },
    BudgetExhausted {
        run_id: RunId,
        reason: StopReason,
    },
    Finished {
        run_id: RunId,
        state: RunState,
    },
}
