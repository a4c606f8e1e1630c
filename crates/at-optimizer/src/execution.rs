//! Execution of one round of evaluations, sequentially or on a worker pool.

use at_types::{config_error, internal_error, AtResult, EvaluationError, OptimizationGoals};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::evaluator::Evaluator;

/// How the evaluations of a round are dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Execution {
    /// One evaluator at a time, in population order.
    #[default]
    Sequential,
    /// Evaluators of a round run concurrently on a dedicated pool.
    Parallel { num_threads: usize },
}

impl Execution {
    pub fn validate(&self) -> AtResult<()> {
        match self {
            Self::Parallel { num_threads: 0 } => {
                Err(config_error!("parallel execution needs at least one thread"))
            }
            _ => Ok(()),
        }
    }

    /// Number of workers actually busy for a round of `population` evaluators.
    pub fn workers_for(&self, population: usize) -> usize {
        match self {
            Self::Sequential => population.min(1),
            Self::Parallel { num_threads } => (*num_threads).min(population),
        }
    }
}

/// Runs the evaluations of a round and returns their outcomes in population
/// order, whatever order they completed in. Returning is the barrier: every
/// evaluation of the round has finished.
pub(crate) struct RoundExecutor {
    execution: Execution,
    pool: Option<ThreadPool>,
}

impl RoundExecutor {
    /// `largest_round` bounds the pool size: no round ever keeps more
    /// workers busy than it has evaluators.
    pub(crate) fn new(execution: Execution, largest_round: usize) -> AtResult<Self> {
        execution.validate()?;
        let workers = execution.workers_for(largest_round);
        let pool = match execution {
            Execution::Parallel { .. } if workers > 1 => Some(
                ThreadPoolBuilder::new()
                    .num_threads(workers)
                    .thread_name(|i| format!("autotune-eval-{i}"))
                    .build()
                    .map_err(|e| internal_error!("failed to build evaluation pool: {e}"))?,
            ),
            _ => None,
        };
        Ok(Self { execution, pool })
    }

    /// Threads in the dedicated pool, 0 when evaluating inline.
    pub(crate) fn pool_size(&self) -> usize {
        self.pool.as_ref().map_or(0, ThreadPool::current_num_threads)
    }

    pub(crate) fn evaluate(
        &self,
        evaluators: &mut [Box<dyn Evaluator>],
        n_resources: f64,
    ) -> Vec<Result<OptimizationGoals, EvaluationError>> {
        let workers = self.execution.workers_for(evaluators.len());
        debug!("Evaluating {} arms at {} resources on {} workers", evaluators.len(), n_resources, workers);
        match &self.pool {
            Some(pool) if workers > 1 => pool.install(|| {
                evaluators
                    .par_iter_mut()
                    .map(|evaluator| evaluator.evaluate(n_resources))
                    .collect()
            }),
            _ => evaluators
                .iter_mut()
                .map(|evaluator| evaluator.evaluate(n_resources))
                .collect(),
        }
    }
}
