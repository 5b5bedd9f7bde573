#![forbid(unsafe_code)]

use anyhow::Result;
use chronotree_sim::{SimulationConfig, run_converging};

fn main() -> Result<()> {
    let config = SimulationConfig::default();
    let result = run_converging(config)?;

    println!(
        "simulation complete: seed={} replicas={} rounds={} converged={} bitter_end={}",
        config.seed,
        config.replica_count,
        result.rounds.len(),
        result.converged,
        result
            .final_bitter_end
            .map_or_else(|| "-".to_owned(), |hash| hash.to_string()),
    );

    Ok(())
}
