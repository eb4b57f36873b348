//! Per-node safe-interval table (C3): the times a node is free of any
//! wait-type constraint for a given agent.

use std::collections::HashMap;

use super::types::{Constraint, NodeId, Time};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub start: Time,
    pub end: Time,
}

impl Interval {
    pub fn contains(&self, t: Time) -> bool {
        t >= self.start && t <= self.end
    }
}

/// Maps a node to its sorted, disjoint list of safe intervals. Nodes with no
/// entry are implicitly always safe (`[0, inf)`).
#[derive(Debug, Clone, Default)]
pub struct SafeIntervalTable {
    intervals: HashMap<NodeId, Vec<Interval>>,
}

impl SafeIntervalTable {
    /// Builds the table for `agent_id` from its flattened constraint set
    /// (own negative constraints, plus negative constraints translated from
    /// other agents' positive constraints). Only wait-type constraints
    /// (`from == to`) carve up node intervals; transition constraints are
    /// checked directly against candidate edges during SIPP expansion.
    pub fn build(agent_id: usize, constraints: &[Constraint]) -> SafeIntervalTable {
        let mut excluded: HashMap<NodeId, Vec<(Time, Time)>> = HashMap::new();
        for c in constraints {
            if c.agent_id != agent_id || c.positive || !c.is_wait() {
                continue;
            }
            excluded.entry(c.from).or_default().push((c.t1, c.t2));
        }

        let mut intervals = HashMap::new();
        for (node, windows) in excluded {
            intervals.insert(node, subtract_windows(windows));
        }
        SafeIntervalTable { intervals }
    }

    /// Safe intervals covering node `n`, in increasing order.
    pub fn get(&self, n: NodeId) -> Vec<Interval> {
        self.intervals.get(&n).cloned().unwrap_or_else(|| {
            vec![Interval {
                start: 0.0,
                end: Time::INFINITY,
            }]
        })
    }

    /// The index of the safe interval of `n` containing `t`, if any.
    pub fn interval_index_at(&self, n: NodeId, t: Time) -> Option<usize> {
        self.get(n).iter().position(|iv| iv.contains(t))
    }
}

/// Subtracts a list of (possibly overlapping) forbidden open windows from
/// `[0, inf)`, returning the remaining disjoint safe intervals in order.
fn subtract_windows(mut windows: Vec<(Time, Time)>) -> Vec<Interval> {
    windows.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());

    // Merge overlapping/touching forbidden windows first.
    let mut merged: Vec<(Time, Time)> = Vec::new();
    for (s, e) in windows {
        if let Some(last) = merged.last_mut() {
            if s <= last.1 {
                last.1 = last.1.max(e);
                continue;
            }
        }
        merged.push((s, e));
    }

    let mut result = Vec::new();
    let mut cursor = 0.0_f64;
    for (s, e) in merged {
        if s > cursor {
            result.push(Interval {
                start: cursor,
                end: s,
            });
        }
        cursor = cursor.max(e);
    }
    result.push(Interval {
        start: cursor,
        end: Time::INFINITY,
    });
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wait(agent_id: usize, node: NodeId, t1: Time, t2: Time) -> Constraint {
        Constraint {
            agent_id,
            t1,
            t2,
            from: node,
            to: node,
            positive: false,
        }
    }

    #[test]
    fn untouched_node_is_always_safe() {
        let table = SafeIntervalTable::build(0, &[]);
        let ivs = table.get(5);
        assert_eq!(ivs.len(), 1);
        assert_eq!(ivs[0].start, 0.0);
        assert!(ivs[0].end.is_infinite());
    }

    #[test]
    fn single_wait_constraint_splits_one_interval() {
        let table = SafeIntervalTable::build(0, &[wait(0, 3, 2.0, 5.0)]);
        let ivs = table.get(3);
        assert_eq!(ivs.len(), 2);
        assert_eq!(ivs[0], Interval { start: 0.0, end: 2.0 });
        assert_eq!(ivs[1].start, 5.0);
        assert!(ivs[1].end.is_infinite());
    }

    #[test]
    fn overlapping_constraints_merge() {
        let constraints = vec![wait(0, 3, 2.0, 5.0), wait(0, 3, 4.0, 7.0)];
        let table = SafeIntervalTable::build(0, &constraints);
        let ivs = table.get(3);
        assert_eq!(ivs.len(), 2);
        assert_eq!(ivs[0], Interval { start: 0.0, end: 2.0 });
        assert_eq!(ivs[1].start, 7.0);
    }

    #[test]
    fn constraints_for_other_agents_are_ignored() {
        let table = SafeIntervalTable::build(0, &[wait(1, 3, 2.0, 5.0)]);
        let ivs = table.get(3);
        assert_eq!(ivs.len(), 1);
        assert!(ivs[0].end.is_infinite());
    }

    #[test]
    fn accumulation_order_does_not_matter() {
        let a = vec![wait(0, 1, 1.0, 2.0), wait(0, 1, 4.0, 5.0)];
        let b = vec![wait(0, 1, 4.0, 5.0), wait(0, 1, 1.0, 2.0)];
        let ta = SafeIntervalTable::build(0, &a);
        let tb = SafeIntervalTable::build(0, &b);
        assert_eq!(ta.get(1), tb.get(1));
    }
}
