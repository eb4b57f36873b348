//! Low-level planner (C4): minimum-time path for one agent under a set of
//! space-time constraints, searched over `(node, safe-interval)` states.
//! The dual open/focal-list structure mirrors the teacher's
//! `solver/algorithm/astarfocal.rs`, generalized from discrete time steps to
//! continuous arrival times and from vertex/edge occupancy to safe
//! intervals.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use tracing::{debug, instrument, trace};

use crate::common::safe_interval::SafeIntervalTable;
use crate::common::types::{Constraint, Move, NodeId, SPath, Time};
use crate::geometry;
use crate::heuristic::Heuristic;
use crate::map::Map;
use crate::stat::Stats;
use crate::task::Agent;

pub enum PathResult {
    Found(SPath),
    Infeasible,
}

/// A total order over `Time` for use as a `BTreeSet` key. Times produced by
/// this module are always finite, so the `partial_cmp` fallback never fires.
#[derive(Debug, Clone, Copy, PartialEq)]
struct OrdTime(Time);

impl Eq for OrdTime {}

impl PartialOrd for OrdTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrdTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.partial_cmp(&other.0).unwrap_or(Ordering::Equal)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct OpenNode {
    f_open: OrdTime,
    g: OrdTime,
    node: NodeId,
    interval_idx: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct FocalNode {
    conflicts: usize,
    f_open: OrdTime,
    g: OrdTime,
    node: NodeId,
    interval_idx: usize,
}

type StateKey = (NodeId, usize);

/// Per-(from,to) edge exclusion windows, in arrival-time coordinates:
/// arriving at `to` during `(lo, hi)` would execute a transition that
/// conflicts with a negative constraint on this agent.
type EdgeExclusions = HashMap<(NodeId, NodeId), Vec<(Time, Time)>>;

/// Finds the minimum-time path for `agent` honoring `constraints`, preferring
/// (when `focal_weight > 1.0`) the member of the suboptimality band with the
/// fewest conflicts against `other_paths`.
#[allow(clippy::too_many_arguments)]
#[instrument(skip_all, name = "low_level_sipp", fields(agent = agent.id), level = "debug")]
pub fn plan(
    map: &Map,
    heuristic: &Heuristic,
    agent: &Agent,
    constraints: &[Constraint],
    focal_weight: f64,
    agent_size: f64,
    precision: f64,
    other_paths: &[SPath],
    stats: &mut Stats,
) -> PathResult {
    let sit = SafeIntervalTable::build(agent.id, constraints);
    let edge_exclusions = build_edge_exclusions(agent.id, constraints);

    let mut positives: Vec<Constraint> = constraints
        .iter()
        .filter(|c| c.agent_id == agent.id && c.positive)
        .copied()
        .collect();
    positives.sort_by(|a, b| a.t1.partial_cmp(&b.t1).unwrap());

    let mut nodes: Vec<(NodeId, Time)> = vec![(agent.start, 0.0)];

    for pc in &positives {
        let (cursor_node, cursor_time) = *nodes.last().unwrap();
        match sipp_segment(
            map,
            heuristic,
            agent.id,
            cursor_node,
            cursor_time,
            pc.from,
            Some(pc.t1),
            &sit,
            &edge_exclusions,
            focal_weight,
            agent_size,
            precision,
            other_paths,
            stats,
        ) {
            Some(mut seg) => nodes.append(&mut seg.split_off(1)),
            None => return PathResult::Infeasible,
        }
        nodes.push((pc.to, pc.t2));
    }

    let (cursor_node, cursor_time) = *nodes.last().unwrap();
    match sipp_segment(
        map,
        heuristic,
        agent.id,
        cursor_node,
        cursor_time,
        agent.goal,
        None,
        &sit,
        &edge_exclusions,
        focal_weight,
        agent_size,
        precision,
        other_paths,
        stats,
    ) {
        Some(mut seg) => nodes.append(&mut seg.split_off(1)),
        None => return PathResult::Infeasible,
    }

    let cost = nodes.last().unwrap().1;
    PathResult::Found(SPath {
        agent_id: agent.id,
        cost,
        nodes,
    })
}

/// Counts how many of `other_paths`' moves conflict with the candidate move
/// `from@t0 -> to@t1`; the focal list's secondary sort key.
fn conflict_count(
    map: &Map,
    from: NodeId,
    to: NodeId,
    t0: Time,
    t1: Time,
    agent_size: f64,
    precision: f64,
    other_paths: &[SPath],
) -> usize {
    let candidate = Move {
        t1: t0,
        t2: t1,
        from,
        to,
    };
    let c_from = map.point(from);
    let c_to = map.point(to);

    let mut count = 0;
    for other in other_paths {
        for mv in other.moves() {
            let o_from = map.point(mv.from);
            let o_to = map.point(mv.to);
            if geometry::moves_conflict(
                &candidate, c_from, c_to, &mv, o_from, o_to, agent_size, precision,
            )
            .is_some()
            {
                count += 1;
            }
        }
    }
    count
}

/// One continuous-time SIPP search from `(from_node, from_time)` to
/// `target`, returning the `(node, time)` sequence (inclusive of both ends)
/// or `None` if no such path exists.
///
/// If `required_arrival` is `Some(t)`, the goal test accepts `target` the
/// instant its safe interval covers `t` (used for the leg preceding a
/// positive constraint). If `None`, the goal test additionally requires the
/// covering safe interval to extend to infinity (the agent can hold `target`
/// forever, as the true destination of the full path requires).
#[allow(clippy::too_many_arguments)]
fn sipp_segment(
    map: &Map,
    heuristic: &Heuristic,
    agent_id: usize,
    from_node: NodeId,
    from_time: Time,
    target: NodeId,
    required_arrival: Option<Time>,
    sit: &SafeIntervalTable,
    edge_exclusions: &EdgeExclusions,
    focal_weight: f64,
    agent_size: f64,
    precision: f64,
    other_paths: &[SPath],
    stats: &mut Stats,
) -> Option<Vec<(NodeId, Time)>> {
    stats.ll_searches += 1;

    // Use the precomputed table when it was actually built for this target
    // (the final leg to the agent's real goal); otherwise fall back to the
    // admissible Euclidean distance, since no Dijkstra table exists for an
    // intermediate positive-constraint waypoint.
    let h = |n: NodeId| -> Time {
        let table_h = heuristic.h(n, target);
        if table_h.is_finite() {
            table_h
        } else {
            map.dist(n, target)
        }
    };

    let start_interval_idx = sit.interval_index_at(from_node, from_time)?;

    let mut best_g: HashMap<StateKey, Time> = HashMap::new();
    // Keyed by a state's own key: (predecessor state, arrival at this state,
    // time this state's agent actually departed the predecessor — later
    // than the predecessor's arrival when the edge required a wait there).
    let mut trace: HashMap<StateKey, (StateKey, Time, Time)> = HashMap::new();

    let mut open: BTreeSet<OpenNode> = BTreeSet::new();
    let mut focal: BTreeSet<FocalNode> = BTreeSet::new();

    let start_f = from_time + h(from_node);
    best_g.insert((from_node, start_interval_idx), from_time);
    open.insert(OpenNode {
        f_open: OrdTime(start_f),
        g: OrdTime(from_time),
        node: from_node,
        interval_idx: start_interval_idx,
    });
    focal.insert(FocalNode {
        conflicts: 0,
        f_open: OrdTime(start_f),
        g: OrdTime(from_time),
        node: from_node,
        interval_idx: start_interval_idx,
    });

    let mut focal_cost: HashMap<StateKey, usize> = HashMap::new();
    focal_cost.insert((from_node, start_interval_idx), 0);

    let mut last_f_min = start_f;

    while let Some(current) = {
        let first = focal.iter().next().copied();
        first.map(|n| {
            focal.remove(&n);
            n
        })
    } {
        stats.ll_expanded += 1;
        let state = (current.node, current.interval_idx);

        if current.g.0 > *best_g.get(&state).unwrap_or(&Time::INFINITY) {
            continue;
        }

        open.remove(&OpenNode {
            f_open: current.f_open,
            g: current.g,
            node: current.node,
            interval_idx: current.interval_idx,
        });

        if current.node == target {
            let interval = sit.get(current.node)[current.interval_idx];
            let accept = match required_arrival {
                Some(rt) => current.g.0 <= rt && interval.end >= rt,
                None => interval.end.is_infinite(),
            };
            if accept {
                let arrival = required_arrival.unwrap_or(current.g.0);
                return Some(reconstruct(&trace, state, arrival, from_time, precision));
            }
        }

        let interval_i = sit.get(current.node)[current.interval_idx];
        let g_u = current.g.0;
        trace!(node = current.node, g = g_u, "expand sipp state");

        for &v in map.neighbors(current.node) {
            let d = map.dist(current.node, v);
            let forbidden = edge_exclusion_windows(edge_exclusions, current.node, v, d);

            for (j, interval_v) in sit.get(v).iter().enumerate() {
                let earliest = g_u + d;
                let t_v0 = earliest.max(interval_v.start);
                if t_v0 > interval_v.end {
                    continue;
                }
                let depart_upper = interval_i.end.min(interval_v.end - d);
                if depart_upper + d < t_v0 {
                    continue;
                }
                let upper = interval_v.end.min(depart_upper + d);
                let Some(t_v) = earliest_feasible_arrival(&forbidden, t_v0, upper) else {
                    continue;
                };

                let v_state = (v, j);
                if t_v < *best_g.get(&v_state).unwrap_or(&Time::INFINITY) {
                    best_g.insert(v_state, t_v);
                    trace.insert(v_state, (state, t_v, t_v - d));

                    let f_open = t_v + h(v);
                    let edge_conflicts =
                        conflict_count(map, current.node, v, g_u, t_v, agent_size, precision, other_paths);
                    let f_focal = current.conflicts + edge_conflicts;
                    focal_cost.insert(v_state, f_focal);

                    open.insert(OpenNode {
                        f_open: OrdTime(f_open),
                        g: OrdTime(t_v),
                        node: v,
                        interval_idx: j,
                    });

                    if f_open <= last_f_min * focal_weight {
                        focal.insert(FocalNode {
                            conflicts: f_focal,
                            f_open: OrdTime(f_open),
                            g: OrdTime(t_v),
                            node: v,
                            interval_idx: j,
                        });
                    }
                }
            }
        }

        if let Some(next) = open.iter().next() {
            let new_f_min = next.f_open.0;
            if last_f_min < new_f_min {
                let band_lo = last_f_min * focal_weight;
                let band_hi = new_f_min * focal_weight;
                let promote: Vec<OpenNode> = open
                    .iter()
                    .filter(|n| n.f_open.0 > band_lo && n.f_open.0 <= band_hi)
                    .copied()
                    .collect();
                for n in promote {
                    let key = (n.node, n.interval_idx);
                    let conflicts = *focal_cost.get(&key).unwrap_or(&0);
                    focal.insert(FocalNode {
                        conflicts,
                        f_open: n.f_open,
                        g: n.g,
                        node: n.node,
                        interval_idx: n.interval_idx,
                    });
                }
                last_f_min = new_f_min;
            }
        }
    }

    debug!(agent = agent_id, target, "sipp segment exhausted open list");
    None
}

/// Walks the trace back from `state` to the search's start, emitting each
/// state's own arrival time (never its successor's — `trace[state]`'s time
/// field belongs to `state`, not to its predecessor) and an explicit wait
/// node wherever a predecessor's departure lagged its arrival.
fn reconstruct(
    trace: &HashMap<StateKey, (StateKey, Time, Time)>,
    mut state: StateKey,
    final_time: Time,
    start_time: Time,
    precision: Time,
) -> Vec<(NodeId, Time)> {
    let mut rev = vec![(state.0, final_time)];
    while let Some(&(pred, _, depart)) = trace.get(&state) {
        let pred_arrival = trace.get(&pred).map(|&(_, t, _)| t).unwrap_or(start_time);
        if depart - pred_arrival > precision {
            rev.push((pred.0, depart));
        }
        rev.push((pred.0, pred_arrival));
        state = pred;
    }
    rev.reverse();
    rev
}

fn build_edge_exclusions(agent_id: usize, constraints: &[Constraint]) -> EdgeExclusions {
    let mut map: EdgeExclusions = HashMap::new();
    for c in constraints {
        if c.agent_id != agent_id || c.positive || c.is_wait() {
            continue;
        }
        map.entry((c.from, c.to)).or_default().push((c.t1, c.t2));
    }
    map
}

fn edge_exclusion_windows(
    edge_exclusions: &EdgeExclusions,
    from: NodeId,
    to: NodeId,
    d: Time,
) -> Vec<(Time, Time)> {
    edge_exclusions
        .get(&(from, to))
        .map(|windows| windows.iter().map(|&(t1, t2)| (t1, t2 + d)).collect())
        .unwrap_or_default()
}

/// The smallest arrival time in `[lower, upper]` that doesn't fall strictly
/// inside any forbidden `(lo, hi)` window.
fn earliest_feasible_arrival(forbidden: &[(Time, Time)], lower: Time, upper: Time) -> Option<Time> {
    let mut sorted = forbidden.to_vec();
    sorted.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());

    let mut candidate = lower;
    loop {
        if candidate > upper {
            return None;
        }
        match sorted.iter().find(|&&(lo, hi)| candidate > lo && candidate < hi) {
            Some(&(_, hi)) => candidate = hi,
            None => return Some(candidate),
        }
    }
}
