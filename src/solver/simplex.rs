//! A small dense two-phase simplex routine, grounded on the design note's
//! call for "a small dense two-phase simplex" to back the weighted vertex
//! cover LP relaxation (C7, `hlh_type = 2`). Handles degeneracy with
//! Bland's rule, since the instances here (one variable per agent touched
//! by a cardinal conflict) can be small and highly degenerate.

const EPS: f64 = 1e-9;

/// Solves `min sum(x)` subject to `coeffs · x >= rhs` for every row in
/// `constraints` and `x >= 0`. `num_vars` is the number of decision
/// variables. Every `rhs` is assumed non-negative (true for the overcost
/// weights this is built for), which guarantees the problem is feasible by
/// construction — the artificial-variable phase never needs an
/// infeasibility check.
pub fn solve_min_sum(num_vars: usize, constraints: &[(Vec<f64>, f64)]) -> f64 {
    if constraints.is_empty() || num_vars == 0 {
        return 0.0;
    }

    let m = constraints.len();
    // Columns: num_vars (x) + m (surplus s) + m (artificial a) + 1 (rhs).
    let n = num_vars + 2 * m;
    let mut tableau: Vec<Vec<f64>> = vec![vec![0.0; n + 1]; m + 1];

    for (i, (coeffs, rhs)) in constraints.iter().enumerate() {
        let row = &mut tableau[i];
        for (j, &c) in coeffs.iter().enumerate() {
            row[j] += c;
        }
        row[num_vars + i] = -1.0; // surplus
        row[num_vars + m + i] = 1.0; // artificial
        row[n] = rhs.max(0.0);
    }

    let mut basis: Vec<usize> = (0..m).map(|i| num_vars + m + i).collect();
    let obj_row = m;

    // Phase 1: minimize the sum of artificials. Each artificial starts
    // basic with coefficient 1 in its own row, so the canonical reduced
    // cost row is `-sum(rows)`.
    for i in 0..m {
        for j in 0..=n {
            tableau[obj_row][j] -= tableau[i][j];
        }
    }
    run_simplex(&mut tableau, &mut basis, obj_row);

    // Phase 2: swap in the real objective (sum of the x columns), make it
    // canonical against the current basis, and re-optimize. Any artificial
    // left in the basis at this point sits at value 0 (feasibility is
    // guaranteed here) and is harmless to leave in place.
    for j in 0..=n {
        tableau[obj_row][j] = 0.0;
    }
    for j in 0..num_vars {
        tableau[obj_row][j] = 1.0;
    }
    for (i, &bj) in basis.iter().enumerate() {
        let coeff = tableau[obj_row][bj];
        if coeff.abs() > EPS {
            for j in 0..=n {
                tableau[obj_row][j] -= coeff * tableau[i][j];
            }
        }
    }
    run_simplex(&mut tableau, &mut basis, obj_row);

    -tableau[obj_row][n]
}

/// Bland's-rule primal simplex: enter the lowest-index column with a
/// negative reduced cost, leave via the lowest-index row among ratio ties,
/// until no negative reduced cost remains.
fn run_simplex(tableau: &mut [Vec<f64>], basis: &mut [usize], obj_row: usize) {
    let n = tableau[0].len() - 1;
    let m = obj_row;

    loop {
        let Some(enter) = (0..n).find(|&j| tableau[obj_row][j] < -EPS) else {
            break;
        };

        let mut leave = None;
        let mut best_ratio = f64::INFINITY;
        for i in 0..m {
            let a = tableau[i][enter];
            if a > EPS {
                let ratio = tableau[i][n] / a;
                let tie = (ratio - best_ratio).abs() <= EPS;
                if ratio < best_ratio - EPS || (tie && leave.map_or(true, |l: usize| basis[i] < basis[l])) {
                    best_ratio = ratio;
                    leave = Some(i);
                }
            }
        }

        let Some(leave) = leave else {
            // Unbounded below: cannot occur for this LP, since every
            // variable appears in at least one constraint and the
            // objective only sums nonnegative variables.
            break;
        };

        let pivot = tableau[leave][enter];
        for j in 0..=n {
            tableau[leave][j] /= pivot;
        }
        for i in 0..=m {
            if i == leave {
                continue;
            }
            let factor = tableau[i][enter];
            if factor.abs() > EPS {
                for j in 0..=n {
                    tableau[i][j] -= factor * tableau[leave][j];
                }
            }
        }
        basis[leave] = enter;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_edge_matches_its_weight() {
        // x0 + x1 >= 3, minimize x0 + x1: optimum is 3 (e.g. x0 = 3, x1 = 0).
        let constraints = vec![(vec![1.0, 1.0], 3.0)];
        let obj = solve_min_sum(2, &constraints);
        assert!((obj - 3.0).abs() < 1e-6);
    }

    #[test]
    fn triangle_of_conflicts_needs_half_the_perimeter() {
        // Three agents pairwise conflicting with weight 2 each: the LP
        // relaxation can split each variable at 1.0, covering every edge
        // at total cost 3 (half the sum of the weights, 6 / 2 = 3).
        let constraints = vec![
            (vec![1.0, 1.0, 0.0], 2.0),
            (vec![0.0, 1.0, 1.0], 2.0),
            (vec![1.0, 0.0, 1.0], 2.0),
        ];
        let obj = solve_min_sum(3, &constraints);
        assert!((obj - 3.0).abs() < 1e-6);
    }

    #[test]
    fn disjoint_edges_sum_independently() {
        let constraints = vec![(vec![1.0, 0.0, 0.0, 0.0], 1.5), (vec![0.0, 0.0, 1.0, 1.0], 2.5)];
        let obj = solve_min_sum(4, &constraints);
        assert!((obj - 4.0).abs() < 1e-6);
    }

    #[test]
    fn no_constraints_is_zero() {
        assert_eq!(solve_min_sum(0, &[]), 0.0);
        assert_eq!(solve_min_sum(3, &[]), 0.0);
    }
}
