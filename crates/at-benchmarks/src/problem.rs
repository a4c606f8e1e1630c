//! Hyperparameter problems built on [`KnownFunction`]s.

use at_optimizer::{Evaluator, Problem};
use at_types::{validation_error, Arm, AtResult, Domain, EvaluationError, OptimizationGoals, FVAL};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::functions::KnownFunction;
use crate::simulation::{SimulationConfig, TrainingSimulator};

pub const NORMALIZED_FVAL: &str = "normalized_fval";

/// How an evaluator turns resources into a function value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum EvaluationMode {
    /// `fval = f(x, y)` whatever the resources.
    Exact,
    /// `fval` follows a simulated training curve indexed by resources.
    Simulated(SimulationConfig),
}

pub struct OptFunctionProblem {
    function: KnownFunction,
    mode: EvaluationMode,
    domain: Domain,
    hyperparams_to_opt: Vec<String>,
}

impl OptFunctionProblem {
    /// Problem optimizing every hyperparameter of `function`'s domain.
    pub fn new(function: KnownFunction, mode: EvaluationMode) -> AtResult<Self> {
        let domain = function.domain()?;
        let hyperparams_to_opt = domain.resolve_hyperparams_to_opt::<&str>(&[])?;
        Ok(Self {
            function,
            mode,
            domain,
            hyperparams_to_opt,
        })
    }

    /// Restrict optimization to `names`; the others are held at their
    /// defaults, which must be set with [`Self::with_default`].
    pub fn with_hyperparams_to_opt<S: AsRef<str>>(mut self, names: &[S]) -> AtResult<Self> {
        self.hyperparams_to_opt = self.domain.resolve_hyperparams_to_opt(names)?;
        Ok(self)
    }

    /// Set the default of a domain parameter.
    pub fn with_default(mut self, name: &str, value: f64) -> AtResult<Self> {
        self.domain.get(name)?;
        let params = self
            .domain
            .iter()
            .map(|p| {
                if p.name == name {
                    p.clone().with_default(value)
                } else {
                    p.clone()
                }
            })
            .collect();
        self.domain = Domain::new(params)?;
        Ok(self)
    }

    pub fn function(&self) -> KnownFunction {
        self.function
    }

    pub fn mode(&self) -> EvaluationMode {
        self.mode
    }

    /// Supplied arms must assign every domain parameter a value inside its
    /// bounds.
    fn check_arm(&self, arm: &Arm) -> AtResult<()> {
        for param in &self.domain {
            let value = arm.get(&param.name)?;
            if !param.contains(value) {
                let (min, max) = param.value_bounds();
                return Err(validation_error!(
                    "{} = {} is outside [{}, {}]",
                    param.name,
                    value,
                    min,
                    max
                ));
            }
        }
        Ok(())
    }
}

impl Problem for OptFunctionProblem {
    fn name(&self) -> &str {
        self.function.name()
    }

    fn domain(&self) -> &Domain {
        &self.domain
    }

    fn hyperparams_to_opt(&self) -> &[String] {
        &self.hyperparams_to_opt
    }

    fn get_evaluator(&self, arm: Option<Arm>, rng: &mut StdRng) -> AtResult<Box<dyn Evaluator>> {
        let arm = match arm {
            Some(arm) => {
                self.check_arm(&arm)?;
                arm
            }
            None => self.draw_arm(rng)?,
        };
        let start = self.function.evaluate(arm.get("x")?, arm.get("y")?);
        let simulator = match self.mode {
            EvaluationMode::Exact => None,
            EvaluationMode::Simulated(config) => Some(TrainingSimulator::new(
                start,
                config,
                StdRng::seed_from_u64(rng.random()),
            )),
        };
        debug!("New {} evaluator starting at {:.4}", self.function, start);
        Ok(Box::new(OptFunctionEvaluator {
            arm,
            function: self.function,
            start,
            simulator,
            resources: 0.0,
        }))
    }
}

/// Evaluator of one arm of a [`KnownFunction`].
pub struct OptFunctionEvaluator {
    arm: Arm,
    function: KnownFunction,
    start: f64,
    simulator: Option<TrainingSimulator>,
    resources: f64,
}

impl OptFunctionEvaluator {
    /// Resources consumed so far.
    pub fn resources(&self) -> f64 {
        self.resources
    }
}

impl Evaluator for OptFunctionEvaluator {
    fn arm(&self) -> &Arm {
        &self.arm
    }

    fn evaluate(&mut self, n_resources: f64) -> Result<OptimizationGoals, EvaluationError> {
        if !n_resources.is_finite() || n_resources < 0.0 {
            return Err(EvaluationError::Failed {
                message: format!("invalid resource level {n_resources}"),
            });
        }
        if n_resources < self.resources {
            return Err(EvaluationError::NonMonotonicResources {
                previous: self.resources,
                requested: n_resources,
            });
        }

        let fval = match &mut self.simulator {
            None => self.start,
            Some(simulator) => {
                let horizon = simulator.config().horizon;
                if n_resources > horizon as f64 {
                    return Err(EvaluationError::ResourceExhausted {
                        requested: n_resources,
                        available: horizon as f64,
                    });
                }
                simulator.advance_to(n_resources.round() as usize)?
            }
        };
        self.resources = n_resources;

        Ok(OptimizationGoals::new()
            .with(FVAL, fval)
            .with(NORMALIZED_FVAL, fval - self.function.optimum()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use at_types::{AtError, ParamError};

    fn rng() -> StdRng {
        StdRng::seed_from_u64(11)
    }

    #[test]
    fn exact_evaluator_ignores_resources() {
        let problem = OptFunctionProblem::new(KnownFunction::Rosenbrock, EvaluationMode::Exact).unwrap();
        let arm = Arm::from_pairs([("x", 1.0), ("y", 1.0)]);
        let mut evaluator = problem.get_evaluator(Some(arm), &mut rng()).unwrap();

        let first = evaluator.evaluate(1.0).unwrap();
        let later = evaluator.evaluate(27.0).unwrap();
        assert_eq!(first.get(FVAL).unwrap(), 0.0);
        assert_eq!(first, later);
        assert_eq!(later.get(NORMALIZED_FVAL).unwrap(), 0.0);
    }

    #[test]
    fn simulated_evaluator_reaches_target_at_horizon() {
        let config = SimulationConfig::default().with_horizon(27);
        let problem =
            OptFunctionProblem::new(KnownFunction::Branin, EvaluationMode::Simulated(config)).unwrap();
        let mut evaluator = problem.get_evaluator(None, &mut rng()).unwrap();
        let start = {
            let arm = evaluator.arm();
            KnownFunction::Branin.evaluate(arm.get("x").unwrap(), arm.get("y").unwrap())
        };

        evaluator.evaluate(1.0).unwrap();
        evaluator.evaluate(9.0).unwrap();
        let end = evaluator.evaluate(27.0).unwrap().get(FVAL).unwrap();
        assert!((end - (start - 200.0)).abs() < 1e-9);

        let err = evaluator.evaluate(28.0).unwrap_err();
        assert!(matches!(err, EvaluationError::ResourceExhausted { .. }));
    }

    #[test]
    fn resources_may_not_go_back() {
        let problem = OptFunctionProblem::new(KnownFunction::Branin, EvaluationMode::Exact).unwrap();
        let mut evaluator = problem.get_evaluator(None, &mut rng()).unwrap();
        evaluator.evaluate(9.0).unwrap();
        assert!(evaluator.evaluate(9.0).is_ok());
        assert!(matches!(
            evaluator.evaluate(3.0),
            Err(EvaluationError::NonMonotonicResources { .. })
        ));
    }

    #[test]
    fn fixed_hyperparameters_need_defaults() {
        let problem = OptFunctionProblem::new(KnownFunction::SixHumpCamel, EvaluationMode::Exact)
            .unwrap()
            .with_hyperparams_to_opt(&["x"])
            .unwrap();
        assert!(matches!(
            problem.get_evaluator(None, &mut rng()),
            Err(AtError::Param(ParamError::MissingDefault { .. }))
        ));

        let problem = problem.with_default("y", 0.5).unwrap();
        let evaluator = problem.get_evaluator(None, &mut rng()).unwrap();
        assert_eq!(evaluator.arm().get("y").unwrap(), 0.5);
    }

    #[test]
    fn supplied_arms_are_checked_against_the_domain() {
        let problem = OptFunctionProblem::new(KnownFunction::Branin, EvaluationMode::Exact).unwrap();
        let outside = Arm::from_pairs([("x", 11.0), ("y", 1.0)]);
        assert!(matches!(
            problem.get_evaluator(Some(outside), &mut rng()),
            Err(AtError::Validation(_))
        ));
        let partial = Arm::from_pairs([("x", 1.0)]);
        assert!(matches!(
            problem.get_evaluator(Some(partial), &mut rng()),
            Err(AtError::Param(ParamError::NotFound { .. }))
        ));
    }

    #[test]
    fn unknown_names_are_rejected() {
        let problem = OptFunctionProblem::new(KnownFunction::Branin, EvaluationMode::Exact).unwrap();
        assert!(problem.with_default("z", 1.0).is_err());
        let problem = OptFunctionProblem::new(KnownFunction::Branin, EvaluationMode::Exact).unwrap();
        assert!(matches!(
            problem.with_hyperparams_to_opt(&["z"]),
            Err(AtError::Param(ParamError::NotFound { .. }))
        ));
    }
}
