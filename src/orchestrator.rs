//! Wires the map, task and config into a `Solution` (C8): builds the
//! heuristic, runs the high-level search, and folds stats and wall-clock
//! time into the result the CLI prints and optionally serializes.

use std::time::Instant;

use tracing::info;

use crate::common::types::Time;
use crate::config::Config;
use crate::heuristic::Heuristic;
use crate::map::Map;
use crate::solution::Solution;
use crate::solver::cbs;
use crate::stat::Stats;
use crate::task::Task;

pub fn solve(map: &Map, task: &Task, config: &Config) -> (Solution, Stats) {
    let start = Instant::now();
    let goals: Vec<_> = task.agents.iter().map(|a| a.goal).collect();
    let heuristic = Heuristic::build(map, goals);

    let mut stats = Stats::default();
    let result = cbs::find_solution(map, task, &heuristic, config, &mut stats);
    stats.runtime_secs = start.elapsed().as_secs_f64();

    let cost: Time = result.paths.iter().map(|p| p.cost).sum();
    let flowtime = cost;
    let makespan = result.paths.iter().map(|p| p.cost).fold(0.0, Time::max);

    info!(
        found = result.found,
        timed_out = result.timed_out,
        cost,
        makespan,
        hl_expansions = stats.hl_expansions,
        ll_searches = stats.ll_searches,
        runtime_secs = stats.runtime_secs,
        "search finished"
    );

    let solution = Solution {
        paths: result.paths,
        found: result.found,
        timed_out: result.timed_out,
        cost,
        flowtime,
        makespan,
        runtime_secs: stats.runtime_secs,
        hl_expansions: stats.hl_expansions,
        ll_searches: stats.ll_searches,
        ll_expanded: stats.ll_expanded,
    };
    (solution, stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::Connectedness;
    use crate::task::Agent;

    #[test]
    fn solves_a_trivial_single_agent_task() {
        let map = Map::from_grid(&vec![vec![true; 4]], Connectedness(2));
        let task = Task::new(vec![Agent { id: 0, start: 0, goal: 3 }]);
        let config = Config::default();

        let (solution, _) = solve(&map, &task, &config);
        assert!(solution.found);
        assert!((solution.cost - 3.0).abs() < 1e-6);
        assert!((solution.makespan - 3.0).abs() < 1e-6);
    }
}
