//! # at-benchmarks
//!
//! Benchmark problems for the autotune optimizers: closed-form test functions
//! with known minima, optionally behind a simulated training curve, plus the
//! environment-driven runner used by the `autotune-run` binary.

pub mod functions;
pub mod problem;
pub mod runner;
pub mod simulation;

pub use functions::KnownFunction;
pub use problem::{EvaluationMode, OptFunctionEvaluator, OptFunctionProblem, NORMALIZED_FVAL};
pub use runner::{run, Method, RunnerConfig};
pub use simulation::{SimulationConfig, TrainingSimulator};
