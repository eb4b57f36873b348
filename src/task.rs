//! Agents and tasks, and the `.scen`-format loader (C9). Parsing is an
//! external-collaborator concern; grounded on the teacher's `scenario.rs`
//! bucketed-route format, generalized from grid coordinates to node ids.

use std::fs::File;
use std::io::{BufRead, BufReader};

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::common::NodeId;
use crate::map::Map;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Agent {
    pub id: usize,
    pub start: NodeId,
    pub goal: NodeId,
}

#[derive(Debug, Clone)]
pub struct Task {
    pub agents: Vec<Agent>,
}

impl Task {
    pub fn new(agents: Vec<Agent>) -> Task {
        Task { agents }
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Reads a MovingAI `.scen` file (bucketed `(start, goal)` routes) and
    /// draws the first `num_agents` routes, in file order unless
    /// `deterministic` is false, in which case the bucket order is
    /// shuffled with a seeded RNG first.
    pub fn from_scen_file(
        path: &str,
        map: &Map,
        num_agents: usize,
        deterministic: bool,
        seed: u64,
    ) -> Result<Task> {
        let routes = read_scen_routes(path)?;
        let mut routes = routes;
        if !deterministic {
            let mut rng = StdRng::seed_from_u64(seed);
            routes.shuffle(&mut rng);
        }

        if routes.len() < num_agents {
            anyhow::bail!(
                "scenario file only has {} routes, requested {num_agents} agents",
                routes.len()
            );
        }

        let agents = routes
            .into_iter()
            .take(num_agents)
            .enumerate()
            .map(|(id, (start_row, start_col, goal_row, goal_col))| Agent {
                id,
                start: start_row * map.width + start_col,
                goal: goal_row * map.width + goal_col,
            })
            .collect();

        Ok(Task::new(agents))
    }
}

type Route = (usize, usize, usize, usize);

fn read_scen_routes(path: &str) -> Result<Vec<Route>> {
    let file = File::open(path).with_context(|| format!("opening scenario file {path}"))?;
    let reader = BufReader::new(file);
    let mut lines = reader.lines();

    let _version = lines.next().context("scenario file is empty")??;

    let mut routes = Vec::new();
    for line in lines {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 9 {
            anyhow::bail!("malformed scenario line: {line}");
        }
        // MovingAI .scen columns: bucket map width height start_x start_y goal_x goal_y optimal_length
        let start_col: usize = parts[4].parse()?;
        let start_row: usize = parts[5].parse()?;
        let goal_col: usize = parts[6].parse()?;
        let goal_row: usize = parts[7].parse()?;
        routes.push((start_row, start_col, goal_row, goal_col));
    }
    Ok(routes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::Connectedness;
    use std::io::Write;

    #[test]
    fn parses_scen_routes_in_file_order() {
        let mut file = tempfile_with_content(
            "version 1\n\
             0\tmap.map\t3\t3\t0\t0\t2\t2\t2.83\n\
             0\tmap.map\t3\t3\t2\t2\t0\t0\t2.83\n",
        );
        let path = file.path_string();
        let grid = vec![vec![true; 3]; 3];
        let map = Map::from_grid(&grid, Connectedness(2));

        let task = Task::from_scen_file(&path, &map, 2, true, 0).unwrap();
        assert_eq!(task.agents[0].start, 0);
        assert_eq!(task.agents[0].goal, 8);
        assert_eq!(task.agents[1].start, 8);
        assert_eq!(task.agents[1].goal, 0);
        drop(file);
    }

    struct TempFile {
        path: std::path::PathBuf,
    }

    impl TempFile {
        fn path_string(&self) -> String {
            self.path.to_string_lossy().into_owned()
        }
    }

    impl Drop for TempFile {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.path);
        }
    }

    fn tempfile_with_content(content: &str) -> TempFile {
        let path = std::env::temp_dir().join(format!(
            "ctcbs_test_scen_{}.scen",
            std::process::id()
        ));
        let mut f = File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        TempFile { path }
    }
}
