//! The map: an immutable undirected graph with geometric node positions and
//! a precomputed adjacency set respecting a chosen k-connectedness. Parsing
//! is an external-collaborator concern (C9); the `Map` type itself and its
//! distance queries are what the core touches.

use std::fs::File;
use std::io::{BufRead, BufReader};

use anyhow::{bail, Context, Result};

use crate::common::NodeId;
use crate::geometry::Point;

#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub x: f64,
    pub y: f64,
    pub neighbors: Vec<NodeId>,
}

/// Grid neighborhood size, per the external configuration table: each level
/// is a strict superset of the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connectedness(pub u8);

impl Connectedness {
    pub fn clamped(value: i64) -> Connectedness {
        if (2..=5).contains(&value) {
            Connectedness(value as u8)
        } else {
            Connectedness(2)
        }
    }

    /// Candidate `(row offset, col offset)` neighbor offsets for this
    /// connectedness level, paired with the intermediate cells (relative to
    /// the source cell) that must also be passable for the edge to be
    /// admitted (empty if the move can't cut a corner).
    fn offsets(self) -> Vec<((i64, i64), Vec<(i64, i64)>)> {
        let mut offsets = vec![
            ((-1, 0), vec![]),
            ((1, 0), vec![]),
            ((0, -1), vec![]),
            ((0, 1), vec![]),
        ];
        if self.0 >= 3 {
            for &(dr, dc) in &[(-1, -1), (-1, 1), (1, -1), (1, 1)] {
                offsets.push(((dr, dc), vec![(dr, 0), (0, dc)]));
            }
        }
        if self.0 >= 4 {
            for &(dr, dc) in &[
                (-2, -1),
                (-2, 1),
                (2, -1),
                (2, 1),
                (-1, -2),
                (-1, 2),
                (1, -2),
                (1, 2),
            ] {
                let (hr, hc) = (dr / 2, dc / 2);
                offsets.push(((dr, dc), vec![(hr, hc)]));
            }
        }
        if self.0 >= 5 {
            for &(dr, dc) in &[(-2, -2), (-2, 2), (2, -2), (2, 2)] {
                offsets.push(((dr, dc), vec![(dr / 2, dc / 2), (dr, dc / 2), (dr / 2, dc)]));
            }
        }
        offsets
    }
}

#[derive(Debug, Clone)]
pub struct Map {
    pub width: usize,
    pub height: usize,
    nodes: Vec<Node>,
}

impl Map {
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn point(&self, id: NodeId) -> Point {
        let n = self.node(id);
        Point::new(n.x, n.y)
    }

    pub fn dist(&self, a: NodeId, b: NodeId) -> f64 {
        self.point(a).dist(&self.point(b))
    }

    pub fn neighbors(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).neighbors
    }

    fn node_id(&self, row: usize, col: usize) -> NodeId {
        row * self.width + col
    }

    /// Builds a map from a rectangular grid of passability flags
    /// (`true` = passable), wiring up neighbors per `connectedness`.
    pub fn from_grid(grid: &[Vec<bool>], connectedness: Connectedness) -> Map {
        let height = grid.len();
        let width = if height > 0 { grid[0].len() } else { 0 };

        let mut nodes: Vec<Node> = (0..height * width)
            .map(|idx| {
                let row = idx / width;
                let col = idx % width;
                Node {
                    id: idx,
                    x: col as f64,
                    y: row as f64,
                    neighbors: Vec::new(),
                }
            })
            .collect();

        let offsets = connectedness.offsets();
        let in_bounds = |r: i64, c: i64| r >= 0 && c >= 0 && (r as usize) < height && (c as usize) < width;
        let passable = |r: i64, c: i64| in_bounds(r, c) && grid[r as usize][c as usize];

        for row in 0..height {
            for col in 0..width {
                if !grid[row][col] {
                    continue;
                }
                let mut neighbors = Vec::new();
                for (offset, gating) in &offsets {
                    let nr = row as i64 + offset.0;
                    let nc = col as i64 + offset.1;
                    if !passable(nr, nc) {
                        continue;
                    }
                    let gated = gating
                        .iter()
                        .all(|g| passable(row as i64 + g.0, col as i64 + g.1));
                    if gated {
                        neighbors.push((nr as usize) * width + (nc as usize));
                    }
                }
                nodes[row * width + col].neighbors = neighbors;
            }
        }

        Map {
            width,
            height,
            nodes,
        }
    }

    /// Reads a MovingAI-style `.map` file: a `type ...` header, `height`
    /// and `width` lines, a `map` marker, then `height` rows of characters
    /// where `.`/`G`/`S` are passable and everything else is blocked.
    pub fn from_grid_file(path: &str, connectedness: Connectedness) -> Result<Map> {
        let file = File::open(path).with_context(|| format!("opening map file {path}"))?;
        let reader = BufReader::new(file);
        let mut lines = reader.lines();

        let _type_line = lines
            .next()
            .context("map file missing 'type' header line")??;
        let height = parse_dimension_line(
            &lines.next().context("map file missing 'height' line")??,
        )?;
        let width = parse_dimension_line(&lines.next().context("map file missing 'width' line")??)?;
        let _map_marker = lines.next().context("map file missing 'map' marker line")??;

        let mut grid = Vec::with_capacity(height);
        for line in lines.take(height) {
            let line = line?;
            if line.chars().count() < width {
                bail!("map row shorter than declared width");
            }
            grid.push(line.chars().take(width).map(|c| c == '.' || c == 'G' || c == 'S').collect());
        }
        if grid.len() != height {
            bail!("map file declared {height} rows but had {}", grid.len());
        }

        Ok(Map::from_grid(&grid, connectedness))
    }

    /// Input-validation guard: two agents sharing a goal makes the model
    /// (goal occupancy enforced via an infinite terminal safe interval)
    /// unsolvable by construction.
    pub fn validate_no_shared_goals(goals: &[NodeId]) -> Result<()> {
        for i in 0..goals.len() {
            for j in (i + 1)..goals.len() {
                if goals[i] == goals[j] {
                    bail!(
                        "agents {i} and {j} share goal node {}; the model requires distinct goals",
                        goals[i]
                    );
                }
            }
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn node_id_for_test(&self, row: usize, col: usize) -> NodeId {
        self.node_id(row, col)
    }
}

fn parse_dimension_line(line: &str) -> Result<usize> {
    line.split_whitespace()
        .last()
        .context("malformed dimension line")?
        .parse::<usize>()
        .context("dimension is not a number")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_5x1_open() -> Vec<Vec<bool>> {
        vec![vec![true]; 5]
    }

    #[test]
    fn four_connected_grid_has_cardinal_neighbors_only() {
        let grid = vec![vec![true, true, true], vec![true, true, true], vec![true, true, true]];
        let map = Map::from_grid(&grid, Connectedness(2));
        let center = map.node_id_for_test(1, 1);
        let neighbors = map.neighbors(center);
        assert_eq!(neighbors.len(), 4);
    }

    #[test]
    fn eight_connected_grid_adds_diagonals() {
        let grid = vec![vec![true, true, true], vec![true, true, true], vec![true, true, true]];
        let map = Map::from_grid(&grid, Connectedness(3));
        let center = map.node_id_for_test(1, 1);
        assert_eq!(map.neighbors(center).len(), 8);
    }

    #[test]
    fn diagonal_blocked_by_corner_is_excluded() {
        // Block the cell directly above the center; the NE diagonal corner
        // move must then be gated out since it would cut through a wall.
        let grid = vec![
            vec![true, false, true],
            vec![true, true, true],
            vec![true, true, true],
        ];
        let map = Map::from_grid(&grid, Connectedness(3));
        let center = map.node_id_for_test(1, 1);
        let ne = map.node_id_for_test(0, 2);
        assert!(!map.neighbors(center).contains(&ne));
    }

    #[test]
    fn straight_corridor_nodes_line_up() {
        let grid = grid_5x1_open();
        let map = Map::from_grid(&grid, Connectedness(2));
        assert_eq!(map.len(), 5);
        assert!((map.dist(0, 4) - 4.0).abs() < 1e-9);
    }
}
