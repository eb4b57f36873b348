//! High-level heuristic (C7): admissible lower bounds on the additional
//! sum-of-costs needed to resolve the outstanding *cardinal* conflicts at a
//! CBS node, selected by `hlh_type`.

use std::collections::HashMap;

use crate::common::types::Time;
use crate::solver::conflict::{ClassifiedConflict, ConflictKind};
use crate::solver::simplex;

/// `hlh_type`: `0` is a constant-zero heuristic (plain CBS), `1` is the
/// cardinal-conflict-graph matching bound, `2` is the weighted vertex cover
/// LP relaxation. Any other value falls back to `0`, matching the domain
/// clamping `Config::from_cli` already applies to this field.
pub fn compute_h(hlh_type: i64, conflicts: &[ClassifiedConflict]) -> Time {
    match hlh_type {
        1 => cardinal_matching_lb(conflicts) as Time,
        2 => weighted_vertex_cover_lb(conflicts),
        _ => 0.0,
    }
}

/// Greedy maximal matching over the cardinal-conflict graph (vertices are
/// agents, edges are cardinal conflicts): every matched edge forces at
/// least one of its two agents' costs up by at least 1, and matched edges
/// never share an agent, so the match's size is an admissible lower bound —
/// a simplification of the exact maximum-cardinality matching the general
/// blossom algorithm would compute, traded for a few lines of greedy code
/// since admissibility only needs *a* matching, not the largest one.
fn cardinal_matching_lb(conflicts: &[ClassifiedConflict]) -> usize {
    let mut matched = std::collections::HashSet::new();
    let mut count = 0;
    for c in conflicts.iter().filter(|c| c.kind == ConflictKind::Cardinal) {
        let (a, b) = (c.conflict.agent_a, c.conflict.agent_b);
        if matched.contains(&a) || matched.contains(&b) {
            continue;
        }
        matched.insert(a);
        matched.insert(b);
        count += 1;
    }
    count
}

/// Weighted vertex cover lower bound via the LP relaxation
/// `min sum(x_v)` s.t. `x_u + x_v >= overcost_uv` for every cardinal
/// conflict edge `(u, v)`, `x_v >= 0`, rounded up to an admissible integer
/// bound.
fn weighted_vertex_cover_lb(conflicts: &[ClassifiedConflict]) -> Time {
    let cardinal: Vec<&ClassifiedConflict> =
        conflicts.iter().filter(|c| c.kind == ConflictKind::Cardinal).collect();
    if cardinal.is_empty() {
        return 0.0;
    }

    // Only agents touched by a cardinal conflict need a variable.
    let mut agent_index: HashMap<usize, usize> = HashMap::new();
    for c in &cardinal {
        let next = agent_index.len();
        agent_index.entry(c.conflict.agent_a).or_insert(next);
        let next = agent_index.len();
        agent_index.entry(c.conflict.agent_b).or_insert(next);
    }
    let num_vars = agent_index.len();

    let rows: Vec<(Vec<f64>, f64)> = cardinal
        .iter()
        .map(|c| {
            let mut coeffs = vec![0.0; num_vars];
            coeffs[agent_index[&c.conflict.agent_a]] = 1.0;
            coeffs[agent_index[&c.conflict.agent_b]] = 1.0;
            (coeffs, c.conflict.overcost.max(0.0))
        })
        .collect();

    simplex::solve_min_sum(num_vars, &rows).ceil()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::Move;
    use crate::solver::conflict::Conflict;

    fn cardinal(agent_a: usize, agent_b: usize, overcost: f64) -> ClassifiedConflict {
        let mv = Move { t1: 0.0, t2: 1.0, from: 0, to: 1 };
        ClassifiedConflict {
            conflict: Conflict { agent_a, agent_b, move_a: mv, move_b: mv, time: 0.0, overcost },
            kind: ConflictKind::Cardinal,
        }
    }

    #[test]
    fn zero_heuristic_ignores_conflicts() {
        assert_eq!(compute_h(0, &[cardinal(0, 1, 3.0)]), 0.0);
    }

    #[test]
    fn matching_counts_disjoint_cardinal_pairs() {
        let conflicts = vec![cardinal(0, 1, 1.0), cardinal(2, 3, 1.0)];
        assert_eq!(compute_h(1, &conflicts), 2.0);
    }

    #[test]
    fn matching_does_not_double_count_a_shared_agent() {
        let conflicts = vec![cardinal(0, 1, 1.0), cardinal(1, 2, 1.0)];
        assert_eq!(compute_h(1, &conflicts), 1.0);
    }

    #[test]
    fn vertex_cover_uses_the_lp_relaxation() {
        let conflicts = vec![cardinal(0, 1, 4.0)];
        assert_eq!(compute_h(2, &conflicts), 4.0);
    }

    #[test]
    fn non_cardinal_conflicts_never_contribute() {
        let mv = Move { t1: 0.0, t2: 1.0, from: 0, to: 1 };
        let non_cardinal = ClassifiedConflict {
            conflict: Conflict { agent_a: 0, agent_b: 1, move_a: mv, move_b: mv, time: 0.0, overcost: 5.0 },
            kind: ConflictKind::NonCardinal,
        };
        assert_eq!(compute_h(1, &[non_cardinal]), 0.0);
        assert_eq!(compute_h(2, &[non_cardinal]), 0.0);
    }
}
