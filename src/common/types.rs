//! Core space-time data model: nodes, moves, single-agent paths and
//! constraints. Mirrors the shape of the discrete-time `Constraint` in the
//! teacher's `common/highlevel.rs`, generalized to continuous time.

use serde::Serialize;

pub type NodeId = usize;
pub type Time = f64;

/// A single straight-line (or, if `from == to`, stationary) unit-speed
/// motion over `[t1, t2]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Move {
    pub t1: Time,
    pub t2: Time,
    pub from: NodeId,
    pub to: NodeId,
}

impl Move {
    pub fn is_wait(&self) -> bool {
        self.from == self.to
    }
}

/// A single agent's start-to-goal path: a non-decreasing sequence of
/// `(node, arrival time)` pairs. The first entry is the agent's start at
/// `t = 0`; the last is its goal, held forever beyond `cost`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SPath {
    pub agent_id: usize,
    pub cost: Time,
    pub nodes: Vec<(NodeId, Time)>,
}

impl SPath {
    pub fn start(&self) -> NodeId {
        self.nodes[0].0
    }

    pub fn goal(&self) -> NodeId {
        self.nodes.last().unwrap().0
    }

    /// Expands the step sequence into the explicit list of moves (waits
    /// included) it is composed of.
    pub fn moves(&self) -> Vec<Move> {
        self.nodes
            .windows(2)
            .map(|w| Move {
                t1: w[0].1,
                t2: w[1].1,
                from: w[0].0,
                to: w[1].0,
            })
            .collect()
    }
}

/// A high-level constraint on one agent's future moves.
///
/// `positive = false` (default): `agent_id` may not execute any move that
/// conflicts with the swept region `(from, to, [t1, t2])`.
/// `positive = true` (disjoint splitting): `agent_id` must execute exactly
/// the move `(from, to)` starting at `t1` and ending at `t2`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Constraint {
    pub agent_id: usize,
    pub t1: Time,
    pub t2: Time,
    pub from: NodeId,
    pub to: NodeId,
    pub positive: bool,
}

impl Constraint {
    pub fn is_wait(&self) -> bool {
        self.from == self.to
    }

    /// The negative constraint that every other agent receives when this
    /// constraint is positive: forbidding the same move, on that agent.
    pub fn negate_for(&self, other_agent: usize) -> Constraint {
        Constraint {
            agent_id: other_agent,
            positive: false,
            ..*self
        }
    }
}
