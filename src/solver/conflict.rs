//! Pairwise conflict detection and cardinality classification (C5).
//! Detection walks every pair of agents' move sequences through the
//! geometric closest-approach test; classification probes the low-level
//! planner the way a CBSH-style implementation determines cardinal conflicts
//! — by checking whether forbidding the conflicting move actually raises
//! that agent's optimal cost.

use crate::common::types::{Constraint, Move, SPath, Time};
use crate::geometry;
use crate::heuristic::Heuristic;
use crate::map::Map;
use crate::solver::sipp::{self, PathResult};
use crate::stat::Stats;
use crate::task::Agent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    Cardinal,
    SemiCardinal,
    NonCardinal,
    /// Not yet classified (classification skipped because `use_cardinal` is
    /// off); treated the same as `NonCardinal` for priority purposes.
    Unknown,
}

#[derive(Debug, Clone, Copy)]
pub struct Conflict {
    pub agent_a: usize,
    pub agent_b: usize,
    pub move_a: Move,
    pub move_b: Move,
    pub time: Time,
    /// Minimum delay that would clear this conflict by holding `move_a`
    /// back; used as the LP edge weight for the weighted vertex cover
    /// high-level heuristic (C7).
    pub overcost: Time,
}

/// A conflict paired with its cardinality classification, as cached on a
/// CBS node.
#[derive(Debug, Clone, Copy)]
pub struct ClassifiedConflict {
    pub conflict: Conflict,
    pub kind: ConflictKind,
}

/// The earliest conflict across every pair of paths, if any.
pub fn find_conflict(paths: &[SPath], map: &Map, agent_size: f64, precision: f64) -> Option<Conflict> {
    let mut best: Option<Conflict> = None;
    for i in 0..paths.len() {
        for j in (i + 1)..paths.len() {
            if let Some(c) = earliest_between(&paths[i], &paths[j], map, agent_size, precision) {
                if best.as_ref().map_or(true, |b| c.time < b.time) {
                    best = Some(c);
                }
            }
        }
    }
    best
}

/// One representative conflict per conflicting pair of agents — enough to
/// build a conflict graph over agents without enumerating every collision
/// instant between the same two paths.
pub fn all_pairwise_conflicts(paths: &[SPath], map: &Map, agent_size: f64, precision: f64) -> Vec<Conflict> {
    let mut out = Vec::new();
    for i in 0..paths.len() {
        for j in (i + 1)..paths.len() {
            if let Some(c) = earliest_between(&paths[i], &paths[j], map, agent_size, precision) {
                out.push(c);
            }
        }
    }
    out
}

/// Every conflict that involves `agent_id`, against every other agent's
/// path — used by the high-level search to recompute only the conflicts
/// touched by a just-replanned agent (§4.6 step 5).
pub fn conflicts_for_agent(
    paths: &[SPath],
    agent_id: usize,
    map: &Map,
    agent_size: f64,
    precision: f64,
) -> Vec<Conflict> {
    let Some(mine) = paths.iter().find(|p| p.agent_id == agent_id) else {
        return Vec::new();
    };
    paths
        .iter()
        .filter(|p| p.agent_id != agent_id)
        .filter_map(|other| earliest_between(mine, other, map, agent_size, precision))
        .collect()
}

fn earliest_between(a: &SPath, b: &SPath, map: &Map, agent_size: f64, precision: f64) -> Option<Conflict> {
    let mut best: Option<Conflict> = None;
    for mi in a.moves() {
        for mj in b.moves() {
            if mi.t2 < mj.t1 || mj.t2 < mi.t1 {
                continue;
            }
            let mi_from = map.point(mi.from);
            let mi_to = map.point(mi.to);
            let mj_from = map.point(mj.from);
            let mj_to = map.point(mj.to);
            if let Some(approach) = geometry::moves_conflict(
                &mi, mi_from, mi_to, &mj, mj_from, mj_to, agent_size, precision,
            ) {
                let better = best.as_ref().map_or(true, |b: &Conflict| approach.time < b.time);
                if better {
                    let overcost =
                        geometry::min_wait_offset(&mi, mi_from, mi_to, &mj, mj_from, mj_to, agent_size, precision);
                    best = Some(Conflict {
                        agent_a: a.agent_id,
                        agent_b: b.agent_id,
                        move_a: mi,
                        move_b: mj,
                        time: approach.time,
                        overcost,
                    });
                }
            }
        }
    }
    best
}

/// Whether forbidding `mv` for `agent` (on top of its existing constraints)
/// strictly raises its optimal cost, i.e. the conflict is cardinal for that
/// agent alone.
#[allow(clippy::too_many_arguments)]
fn raises_cost(
    map: &Map,
    heuristic: &Heuristic,
    agent: &Agent,
    existing: &[Constraint],
    mv: &Move,
    original_cost: Time,
    agent_size: f64,
    precision: f64,
    stats: &mut Stats,
) -> bool {
    let mut probed = existing.to_vec();
    probed.push(Constraint {
        agent_id: agent.id,
        t1: mv.t1,
        t2: mv.t2,
        from: mv.from,
        to: mv.to,
        positive: false,
    });

    match sipp::plan(map, heuristic, agent, &probed, 1.0, agent_size, precision, &[], stats) {
        PathResult::Found(p) => p.cost > original_cost + precision,
        PathResult::Infeasible => true,
    }
}

/// Classifies a conflict by probing each side's low-level planner with the
/// conflicting move forbidden.
#[allow(clippy::too_many_arguments)]
pub fn classify(
    map: &Map,
    heuristic: &Heuristic,
    agent_a: &Agent,
    agent_b: &Agent,
    constraints_a: &[Constraint],
    constraints_b: &[Constraint],
    conflict: &Conflict,
    cost_a: Time,
    cost_b: Time,
    agent_size: f64,
    precision: f64,
    stats: &mut Stats,
) -> ConflictKind {
    let a_cardinal = raises_cost(
        map, heuristic, agent_a, constraints_a, &conflict.move_a, cost_a, agent_size, precision, stats,
    );
    let b_cardinal = raises_cost(
        map, heuristic, agent_b, constraints_b, &conflict.move_b, cost_b, agent_size, precision, stats,
    );

    match (a_cardinal, b_cardinal) {
        (true, true) => ConflictKind::Cardinal,
        (true, false) | (false, true) => ConflictKind::SemiCardinal,
        (false, false) => ConflictKind::NonCardinal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::SPath;
    use crate::config::Config;
    use crate::map::Connectedness;

    fn corridor(len: usize) -> Map {
        Map::from_grid(&vec![vec![true; len]], Connectedness(2))
    }

    #[test]
    fn head_on_paths_conflict_near_the_midpoint() {
        let map = corridor(5);
        let a = SPath {
            agent_id: 0,
            cost: 4.0,
            nodes: vec![(0, 0.0), (4, 4.0)],
        };
        let b = SPath {
            agent_id: 1,
            cost: 4.0,
            nodes: vec![(4, 0.0), (0, 4.0)],
        };
        let conflict = find_conflict(&[a, b], &map, 0.353, 1e-5).unwrap();
        assert!((conflict.time - 2.0).abs() < 1e-6);
    }

    #[test]
    fn disjoint_corridors_never_conflict() {
        let map = corridor(5);
        let a = SPath {
            agent_id: 0,
            cost: 1.0,
            nodes: vec![(0, 0.0), (1, 1.0)],
        };
        let b = SPath {
            agent_id: 1,
            cost: 1.0,
            nodes: vec![(3, 0.0), (4, 1.0)],
        };
        assert!(find_conflict(&[a, b], &map, 0.353, 1e-5).is_none());
    }

    #[test]
    fn swap_conflict_on_a_bottleneck_is_cardinal_for_both() {
        // A 1-wide corridor: two agents swapping positions have no
        // alternative route, so forbidding either one's crossing move must
        // raise its cost.
        let map = corridor(3);
        let heuristic = Heuristic::build(&map, [0, 2]);
        let agent_a = Agent { id: 0, start: 0, goal: 2 };
        let agent_b = Agent { id: 1, start: 2, goal: 0 };
        let mut stats = Stats::default();
        let cfg = Config::default();

        let path_a = match sipp::plan(&map, &heuristic, &agent_a, &[], 1.0, cfg.agent_size, cfg.precision, &[], &mut stats) {
            PathResult::Found(p) => p,
            PathResult::Infeasible => panic!("expected a path"),
        };
        let path_b = match sipp::plan(&map, &heuristic, &agent_b, &[], 1.0, cfg.agent_size, cfg.precision, &[], &mut stats) {
            PathResult::Found(p) => p,
            PathResult::Infeasible => panic!("expected a path"),
        };

        let conflict = find_conflict(&[path_a.clone(), path_b.clone()], &map, cfg.agent_size, cfg.precision)
            .expect("head-on swap should conflict");

        let kind = classify(
            &map,
            &heuristic,
            &agent_a,
            &agent_b,
            &[],
            &[],
            &conflict,
            path_a.cost,
            path_b.cost,
            cfg.agent_size,
            cfg.precision,
            &mut stats,
        );
        assert_eq!(kind, ConflictKind::Cardinal);
    }

    #[test]
    fn conflicts_for_agent_ignores_unrelated_pairs() {
        let map = corridor(5);
        let a = SPath { agent_id: 0, cost: 4.0, nodes: vec![(0, 0.0), (4, 4.0)] };
        let b = SPath { agent_id: 1, cost: 4.0, nodes: vec![(4, 0.0), (0, 4.0)] };
        let c = SPath { agent_id: 2, cost: 1.0, nodes: vec![(0, 0.0), (1, 1.0)] };

        let paths = vec![a, b, c];
        let for_agent_2 = conflicts_for_agent(&paths, 2, &map, 0.353, 1e-5);
        assert!(for_agent_2.is_empty(), "agent 2 never comes near the head-on pair");

        let for_agent_0 = conflicts_for_agent(&paths, 0, &map, 0.353, 1e-5);
        assert_eq!(for_agent_0.len(), 1);
        assert_eq!(for_agent_0[0].agent_b, 1);
    }
}
