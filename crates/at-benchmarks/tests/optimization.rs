use at_benchmarks::{EvaluationMode, KnownFunction, OptFunctionProblem, SimulationConfig};
use at_optimizer::{
    Execution, HyperbandConfig, HyperbandOptimizer, ObjectiveDirection, Optimizer, OptimizerEvent,
    RandomOptimizer, RandomSearchConfig, RunState,
};
use at_types::FVAL;
use crossbeam_channel::unbounded;

fn hyperband(max_iter: usize, seed: u64) -> HyperbandOptimizer {
    let config = HyperbandConfig::new(3, max_iter)
        .with_objective(FVAL, ObjectiveDirection::Minimize)
        .with_seed(seed);
    HyperbandOptimizer::new(config).unwrap()
}

#[test]
fn hyperband_on_exact_functions_finds_reasonable_arms() {
    for function in KnownFunction::ALL {
        let problem = OptFunctionProblem::new(function, EvaluationMode::Exact).unwrap();
        let mut optimizer = hyperband(81, 12);
        let best = optimizer.run_optimization(&problem, false).unwrap();

        let fval = best.objective(FVAL).unwrap();
        assert!(fval >= function.optimum() - 1e-4, "{function}: {fval}");
        assert_eq!(fval, function.evaluate(best.arm.get("x").unwrap(), best.arm.get("y").unwrap()));
        assert_eq!(optimizer.eval_history().len(), 12);
        assert_eq!(optimizer.status().state, RunState::Completed);
    }
}

#[test]
fn hyperband_finds_a_low_branin_value() {
    let problem = OptFunctionProblem::new(KnownFunction::Branin, EvaluationMode::Exact).unwrap();
    let mut optimizer = hyperband(81, 5);
    let best = optimizer.run_optimization(&problem, false).unwrap();

    // Roughly a fifth of the Branin box lies below 20; 130 arms always hit it.
    assert!(best.objective(FVAL).unwrap() < 20.0);
}

#[test]
fn simulated_training_ends_below_the_exact_value() {
    let config = SimulationConfig::default().with_horizon(27);
    let problem =
        OptFunctionProblem::new(KnownFunction::Branin, EvaluationMode::Simulated(config)).unwrap();
    let mut optimizer = hyperband(27, 9);
    let best = optimizer.run_optimization(&problem, false).unwrap();

    let entry = optimizer
        .eval_history()
        .iter()
        .find(|e| e.n_resources == 27.0)
        .unwrap();
    let exact = KnownFunction::Branin.evaluate(
        entry.evaluation.arm.get("x").unwrap(),
        entry.evaluation.arm.get("y").unwrap(),
    );
    assert!((entry.objective - (exact - 200.0)).abs() < 1e-9);
    assert!(best.objective(FVAL).unwrap() <= entry.objective);
}

#[test]
fn parallel_and_sequential_runs_agree() {
    let run = |execution: Execution| {
        let config = SimulationConfig::default().with_horizon(27);
        let problem =
            OptFunctionProblem::new(KnownFunction::SixHumpCamel, EvaluationMode::Simulated(config))
                .unwrap();
        let hb_config = HyperbandConfig::new(3, 27)
            .with_objective(FVAL, ObjectiveDirection::Minimize)
            .with_seed(31)
            .with_execution(execution);
        let mut optimizer = HyperbandOptimizer::new(hb_config).unwrap();
        let best = optimizer.run_optimization(&problem, false).unwrap();
        let objectives: Vec<f64> = optimizer.eval_history().iter().map(|e| e.objective).collect();
        (best, objectives)
    };

    assert_eq!(
        run(Execution::Sequential),
        run(Execution::Parallel { num_threads: 3 })
    );
}

#[test]
fn random_search_on_rosenbrock() {
    let problem = OptFunctionProblem::new(KnownFunction::Rosenbrock, EvaluationMode::Exact).unwrap();
    let config = RandomSearchConfig::new(1.0, 50)
        .with_objective(FVAL, ObjectiveDirection::Minimize)
        .with_seed(70);
    let mut optimizer = RandomOptimizer::new(config).unwrap();
    let best = optimizer.run_optimization(&problem, false).unwrap();

    assert_eq!(optimizer.eval_history().len(), 50);
    let min = optimizer
        .eval_history()
        .iter()
        .map(|e| e.objective)
        .fold(f64::INFINITY, f64::min);
    assert_eq!(best.objective(FVAL).unwrap(), min);
}

#[test]
fn maximizing_the_normalized_value() {
    let problem = OptFunctionProblem::new(KnownFunction::Rosenbrock, EvaluationMode::Exact).unwrap();
    let config = HyperbandConfig::new(3, 9)
        .with_objective(at_benchmarks::NORMALIZED_FVAL, ObjectiveDirection::Maximize)
        .with_seed(4);
    let mut optimizer = HyperbandOptimizer::new(config).unwrap();
    let best = optimizer.run_optimization(&problem, false).unwrap();

    let max = optimizer
        .eval_history()
        .iter()
        .map(|e| e.objective)
        .fold(f64::NEG_INFINITY, f64::max);
    assert_eq!(best.objective(at_benchmarks::NORMALIZED_FVAL).unwrap(), max);
}

#[test]
fn event_stream_covers_every_bracket() {
    let (tx, rx) = unbounded();
    let problem = OptFunctionProblem::new(KnownFunction::Branin, EvaluationMode::Exact).unwrap();
    let mut optimizer = hyperband(81, 2).with_events(tx);
    optimizer.run_optimization(&problem, false).unwrap();

    let brackets: Vec<(usize, usize)> = rx
        .try_iter()
        .filter_map(|event| match event {
            OptimizerEvent::BracketStarted { bracket, n_arms, .. } => Some((bracket, n_arms)),
            _ => None,
        })
        .collect();
    assert_eq!(brackets, vec![(4, 81), (3, 34), (2, 15)]);
}
