mod common;
mod config;
mod geometry;
mod heuristic;
mod map;
mod orchestrator;
mod solution;
mod solver;
mod stat;
mod task;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use config::{Cli, Config};
use map::{Connectedness, Map};
use task::Task;

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ctcbs=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::from_cli(&cli);

    let map = Map::from_grid_file(&cli.map_path, Connectedness::clamped(config.connectedness))?;
    let task = Task::from_scen_file(&cli.scen_path, &map, cli.num_agents, cli.deterministic_scen, cli.seed)?;
    let goals: Vec<_> = task.agents.iter().map(|a| a.goal).collect();
    Map::validate_no_shared_goals(&goals)?;

    let (solution, stats) = orchestrator::solve(&map, &task, &config);

    tracing::info!(
        found = solution.found,
        cost = solution.cost,
        makespan = solution.makespan,
        runtime_secs = solution.runtime_secs,
        "run complete"
    );

    if let Some(output_path) = &cli.output_path {
        stats.append_csv_row(output_path, &config, solution.found, solution.cost);
    }

    if let Some(solution_path) = &cli.solution_path {
        let json = serde_json::to_string_pretty(&solution)?;
        std::fs::write(solution_path, json)?;
    }

    Ok(())
}
