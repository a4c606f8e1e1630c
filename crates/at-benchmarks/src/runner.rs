//! Environment-driven experiment runner.

use at_optimizer::{
    Execution, HyperbandConfig, HyperbandOptimizer, ObjectiveDirection, OptimizationReport,
    Optimizer, RandomOptimizer, RandomSearchConfig,
};
use at_types::{config_error, AtResult, FVAL};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use crate::functions::KnownFunction;
use crate::problem::{EvaluationMode, OptFunctionProblem};
use crate::simulation::SimulationConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    Hyperband,
    Random,
}

impl Method {
    pub fn from_name(name: &str) -> AtResult<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "hyperband" | "hb" => Ok(Self::Hyperband),
            "random" => Ok(Self::Random),
            other => Err(config_error!("unknown method '{}', expected hyperband or random", other)),
        }
    }
}

/// Settings of one `autotune-run` invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    pub method: Method,
    pub problem: KnownFunction,
    /// Follow a simulated training curve instead of the exact function.
    pub simulate: bool,
    pub direction: ObjectiveDirection,
    pub eta: usize,
    pub max_iter: usize,
    /// Resources per arm for random search.
    pub n_resources: f64,
    pub seed: u64,
    /// Worker threads; 0 or 1 evaluates sequentially.
    pub threads: usize,
    pub max_time: Option<Duration>,
    pub output: Option<PathBuf>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            method: Method::Hyperband,
            problem: KnownFunction::Branin,
            simulate: true,
            direction: ObjectiveDirection::Minimize,
            eta: 3,
            max_iter: 27,
            n_resources: 81.0,
            seed: 70,
            threads: 0,
            max_time: None,
            output: None,
        }
    }
}

impl RunnerConfig {
    /// Read `AUTOTUNE_*` variables from the process environment.
    pub fn from_env() -> AtResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from `lookup`, falling back to defaults for absent keys.
    pub fn from_lookup<F>(lookup: F) -> AtResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(method) = lookup("AUTOTUNE_METHOD") {
            config.method = Method::from_name(&method)?;
        }
        if let Some(problem) = lookup("AUTOTUNE_PROBLEM") {
            config.problem = KnownFunction::from_name(&problem)?;
        }
        if let Some(simulate) = lookup("AUTOTUNE_SIMULATE") {
            config.simulate = parse_flag("AUTOTUNE_SIMULATE", &simulate)?;
        }
        if let Some(direction) = lookup("AUTOTUNE_DIRECTION") {
            config.direction = match direction.trim().to_ascii_lowercase().as_str() {
                "min" | "minimize" => ObjectiveDirection::Minimize,
                "max" | "maximize" => ObjectiveDirection::Maximize,
                other => return Err(config_error!("AUTOTUNE_DIRECTION must be min or max, got '{}'", other)),
            };
        }
        if let Some(eta) = lookup("AUTOTUNE_ETA") {
            config.eta = parse("AUTOTUNE_ETA", &eta)?;
        }
        if let Some(max_iter) = lookup("AUTOTUNE_MAX_ITER") {
            config.max_iter = parse("AUTOTUNE_MAX_ITER", &max_iter)?;
        }
        if let Some(n_resources) = lookup("AUTOTUNE_RESOURCES") {
            config.n_resources = parse("AUTOTUNE_RESOURCES", &n_resources)?;
        }
        if let Some(seed) = lookup("AUTOTUNE_SEED") {
            config.seed = parse("AUTOTUNE_SEED", &seed)?;
        }
        if let Some(threads) = lookup("AUTOTUNE_THREADS") {
            config.threads = parse("AUTOTUNE_THREADS", &threads)?;
        }
        if let Some(max_time) = lookup("AUTOTUNE_MAX_TIME") {
            let secs: f64 = parse("AUTOTUNE_MAX_TIME", &max_time)?;
            config.max_time = Some(
                Duration::try_from_secs_f64(secs)
                    .map_err(|e| config_error!("AUTOTUNE_MAX_TIME: {}", e))?,
            );
        }
        config.output = lookup("AUTOTUNE_OUTPUT").map(PathBuf::from);
        Ok(config)
    }

    fn execution(&self) -> Execution {
        if self.threads > 1 {
            Execution::Parallel {
                num_threads: self.threads,
            }
        } else {
            Execution::Sequential
        }
    }

    /// The horizon must cover the largest resource level any arm receives.
    fn evaluation_mode(&self) -> EvaluationMode {
        if !self.simulate {
            return EvaluationMode::Exact;
        }
        let horizon = match self.method {
            Method::Hyperband => self.max_iter,
            Method::Random => self.n_resources.ceil() as usize,
        };
        EvaluationMode::Simulated(SimulationConfig::default().with_horizon(horizon))
    }

    pub fn build_optimizer(&self) -> AtResult<Box<dyn Optimizer>> {
        Ok(match self.method {
            Method::Hyperband => {
                let mut config = HyperbandConfig::new(self.eta, self.max_iter)
                    .with_objective(FVAL, self.direction)
                    .with_seed(self.seed)
                    .with_execution(self.execution());
                if let Some(max_time) = self.max_time {
                    config = config.with_max_time(max_time);
                }
                Box::new(HyperbandOptimizer::new(config)?)
            }
            Method::Random => {
                let mut config = RandomSearchConfig::new(self.n_resources, self.max_iter)
                    .with_objective(FVAL, self.direction)
                    .with_seed(self.seed);
                if let Some(max_time) = self.max_time {
                    config = config.with_max_time(max_time);
                }
                Box::new(RandomOptimizer::new(config)?)
            }
        })
    }

    pub fn build_problem(&self) -> AtResult<OptFunctionProblem> {
        OptFunctionProblem::new(self.problem, self.evaluation_mode())
    }
}

fn parse<T>(key: &str, raw: &str) -> AtResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| config_error!("{} has invalid value '{}': {}", key, raw, e))
}

fn parse_flag(key: &str, raw: &str) -> AtResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(config_error!("{} must be a boolean, got '{}'", key, other)),
    }
}

/// Run the configured optimization and write the report if an output path
/// is set.
pub fn run(config: &RunnerConfig) -> AtResult<OptimizationReport> {
    let problem = config.build_problem()?;
    let mut optimizer = config.build_optimizer()?;
    info!(
        "Running {} on {} (simulated: {}, seed {})",
        optimizer.name(),
        config.problem,
        config.simulate,
        config.seed
    );

    let best = optimizer.run_optimization(&problem, true)?;
    info!("Best arm found ({} = {}):\n{}", FVAL, best.objective(FVAL)?, best.arm);
    if let Some(checkpoint) = optimizer.checkpoints().last() {
        info!(
            "Total time {:.2}s, total resources {:.1}",
            checkpoint.elapsed_secs, checkpoint.resources
        );
    }

    let report = optimizer.report()?;
    if let Some(path) = &config.output {
        std::fs::write(path, report.to_json_pretty()?)?;
        info!("Report written to {}", path.display());
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use at_types::AtError;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_variables() {
        let config = RunnerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, RunnerConfig::default());
        assert_eq!(config.execution(), Execution::Sequential);
    }

    #[test]
    fn reads_every_variable() {
        let config = RunnerConfig::from_lookup(lookup(&[
            ("AUTOTUNE_METHOD", "random"),
            ("AUTOTUNE_PROBLEM", "rosenbrock"),
            ("AUTOTUNE_SIMULATE", "false"),
            ("AUTOTUNE_DIRECTION", "max"),
            ("AUTOTUNE_ETA", "4"),
            ("AUTOTUNE_MAX_ITER", "64"),
            ("AUTOTUNE_RESOURCES", "10.5"),
            ("AUTOTUNE_SEED", "3"),
            ("AUTOTUNE_THREADS", "4"),
            ("AUTOTUNE_MAX_TIME", "1.5"),
            ("AUTOTUNE_OUTPUT", "/tmp/report.json"),
        ]))
        .unwrap();

        assert_eq!(config.method, Method::Random);
        assert_eq!(config.problem, KnownFunction::Rosenbrock);
        assert!(!config.simulate);
        assert_eq!(config.direction, ObjectiveDirection::Maximize);
        assert_eq!((config.eta, config.max_iter, config.seed), (4, 64, 3));
        assert_eq!(config.n_resources, 10.5);
        assert_eq!(config.execution(), Execution::Parallel { num_threads: 4 });
        assert_eq!(config.max_time, Some(Duration::from_millis(1500)));
        assert_eq!(config.output, Some(PathBuf::from("/tmp/report.json")));
    }

    #[test]
    fn bad_values_are_config_errors() {
        for pairs in [
            [("AUTOTUNE_ETA", "three")],
            [("AUTOTUNE_METHOD", "tpe")],
            [("AUTOTUNE_SIMULATE", "maybe")],
            [("AUTOTUNE_MAX_TIME", "-1")],
        ] {
            assert!(matches!(
                RunnerConfig::from_lookup(lookup(&pairs)),
                Err(AtError::Config(_))
            ));
        }
    }

    #[test]
    fn simulation_horizon_follows_the_method() {
        let hyperband = RunnerConfig::default();
        assert_eq!(
            hyperband.evaluation_mode(),
            EvaluationMode::Simulated(SimulationConfig::default().with_horizon(27))
        );
        let random = RunnerConfig {
            method: Method::Random,
            n_resources: 9.5,
            ..RunnerConfig::default()
        };
        assert_eq!(
            random.evaluation_mode(),
            EvaluationMode::Simulated(SimulationConfig::default().with_horizon(10))
        );
    }

    #[test]
    fn run_writes_the_report() {
        let path = std::env::temp_dir().join(format!("autotune-report-{}.json", std::process::id()));
        let config = RunnerConfig {
            max_iter: 9,
            output: Some(path.clone()),
            ..RunnerConfig::default()
        };
        let report = run(&config).unwrap();
        assert_eq!(report.history.len(), 3);

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["optimizer"], "Hyperband");
        assert_eq!(written["problem"], "branin");
        std::fs::remove_file(&path).unwrap();
    }
}
