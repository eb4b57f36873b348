//! Heuristic oracle (C2): per-goal all-sources shortest-path tables on the
//! map graph, queried in O(1) after construction.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use crate::common::NodeId;
use crate::map::Map;

#[derive(Debug, Clone, Copy, PartialEq)]
struct HeapEntry {
    cost: f64,
    node: NodeId,
}

impl Eq for HeapEntry {}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for a min-heap on cost.
        other
            .cost
            .partial_cmp(&self.cost)
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Heuristic {
    tables: HashMap<NodeId, Vec<f64>>,
}

impl Heuristic {
    /// Precomputes a Dijkstra table from every distinct goal in `goals`.
    pub fn build(map: &Map, goals: impl IntoIterator<Item = NodeId>) -> Heuristic {
        let mut tables = HashMap::new();
        for goal in goals {
            tables.entry(goal).or_insert_with(|| dijkstra(map, goal));
        }
        Heuristic { tables }
    }

    /// `h(node, goal)`: admissible straight-line-graph distance. Returns
    /// `f64::INFINITY` if `goal` is unreachable from `node` or the goal's
    /// table was never built.
    pub fn h(&self, node: NodeId, goal: NodeId) -> f64 {
        self.tables
            .get(&goal)
            .and_then(|table| table.get(node))
            .copied()
            .unwrap_or(f64::INFINITY)
    }
}

fn dijkstra(map: &Map, goal: NodeId) -> Vec<f64> {
    let mut dist = vec![f64::INFINITY; map.len()];
    let mut heap = BinaryHeap::new();

    dist[goal] = 0.0;
    heap.push(HeapEntry {
        cost: 0.0,
        node: goal,
    });

    while let Some(HeapEntry { cost, node }) = heap.pop() {
        if cost > dist[node] {
            continue;
        }
        for &next in map.neighbors(node) {
            let next_cost = cost + map.dist(node, next);
            if next_cost < dist[next] {
                dist[next] = next_cost;
                heap.push(HeapEntry {
                    cost: next_cost,
                    node: next,
                });
            }
        }
    }

    dist
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::Connectedness;

    #[test]
    fn straight_line_heuristic_matches_corridor_length() {
        let grid = vec![vec![true; 5]];
        let map = Map::from_grid(&grid, Connectedness(2));
        let h = Heuristic::build(&map, [4]);
        assert!((h.h(0, 4) - 4.0).abs() < 1e-9);
        assert!((h.h(4, 4) - 0.0).abs() < 1e-9);
    }

    #[test]
    fn unreachable_goal_table_returns_infinity() {
        let grid = vec![vec![true; 3]];
        let map = Map::from_grid(&grid, Connectedness(2));
        let h = Heuristic::build(&map, [0]);
        // Goal 99 was never built a table for.
        assert!(h.h(0, 99).is_infinite());
    }
}
