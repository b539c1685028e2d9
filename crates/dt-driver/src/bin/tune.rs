use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use dt_driver::{expert_seeds, run_parallel, QuadraticBowl, RunConfig};
use dt_optimizer::{Optimizer, OptimizerConfig, ParameterSpace};

fn env_or<T: std::str::FromStr>(key: &str, default: &str) -> anyhow::Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    std::env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .with_context(|| format!("invalid value for {key}"))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let iterations: usize = env_or("DELAY_TUNE_ITERATIONS", "30")?;
    let seed: u64 = env_or("DELAY_TUNE_SEED", "42")?;
    let runs: usize = env_or("DELAY_TUNE_RUNS", "1")?;
    let json = std::env::var("DELAY_TUNE_FORMAT").is_ok_and(|f| f == "json");

    let configs: Vec<RunConfig> = (0..runs)
        .map(|i| {
            RunConfig::default()
                .with_name(format!("run-{i}"))
                .with_iterations(iterations)
                .with_seeds(expert_seeds())
        })
        .collect();

    info!(runs, iterations, seed, "tuning synthetic delay objective");
    let results = run_parallel(
        configs,
        |index, _| {
            Optimizer::with_gaussian_process(
                ParameterSpace::delay_parameters(),
                OptimizerConfig::default().with_seed(seed.wrapping_add(index as u64)),
            )
        },
        |_, _| QuadraticBowl::default(),
    );

    for result in results {
        let summary = result?;
        if json {
            println!("{}", serde_json::to_string(&summary)?);
        } else {
            println!("{}", summary.best_params_line());
        }
    }
    Ok(())
}
