use at_benchmarks::{run, RunnerConfig};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = RunnerConfig::from_env()?;
    let report = run(&config)?;

    if config.output.is_none() {
        println!("{}", report.to_json_pretty()?);
    }
    Ok(())
}
