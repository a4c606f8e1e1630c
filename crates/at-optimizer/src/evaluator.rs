//! Contracts between the schedulers and the problems they tune.

use at_types::{Arm, AtResult, Domain, EvaluationError, OptimizationGoals};
use rand::rngs::StdRng;

/// A model bound to one [`Arm`], trained incrementally.
///
/// `evaluate` receives an *absolute* resource level: the evaluator resumes
/// from whatever it has already consumed and trains up to `n_resources`.
/// Schedulers only ever call it with non-decreasing levels and never
/// concurrently on the same evaluator.
pub trait Evaluator: Send {
    fn arm(&self) -> &Arm;

    fn evaluate(&mut self, n_resources: f64) -> Result<OptimizationGoals, EvaluationError>;
}

/// A hyperparameter optimization problem: a domain plus a factory of
/// evaluators.
pub trait Problem {
    /// Short identifier used in logs and reports.
    fn name(&self) -> &str {
        "problem"
    }

    fn domain(&self) -> &Domain;

    /// Names of the hyperparameters being optimized, in domain order. The rest
    /// are held at their defaults.
    fn hyperparams_to_opt(&self) -> &[String];

    /// Build an evaluator for `arm`, or for a freshly drawn random arm when
    /// `arm` is `None`.
    fn get_evaluator(&self, arm: Option<Arm>, rng: &mut StdRng) -> AtResult<Box<dyn Evaluator>>;

    fn draw_arm(&self, rng: &mut StdRng) -> AtResult<Arm> {
        Ok(Arm::draw(self.domain(), self.hyperparams_to_opt(), rng)?)
    }
}
