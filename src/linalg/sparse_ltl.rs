//! Branch-sparse `H = LᵀL` factorization of the joint-space inertia matrix.
//!
//! The mass matrix of a kinematic tree has nonzeros only between DoFs on a
//! common path to the base. Factorizing from the leaves towards the base in
//! the `LᵀL` order produces no fill-in outside that pattern, so the
//! factorization and the triangular solves only ever walk per-DoF ancestor
//! chains instead of full rows.

use crate::dynamics::Model;
use crate::math::Real;
use na::{DMatrix, DVector};

/// Factorizes the symmetric positive definite matrix `h` in place into
/// `LᵀL`, with `L` stored in the lower triangle.
pub fn factorize_ltl(model: &Model, h: &mut DMatrix<Real>) {
    let n = model.dof_count();
    assert!(h.nrows() == n && h.ncols() == n, "H matrix of the wrong size.");

    for k in (0..n).rev() {
        assert!(h[(k, k)] > 0.0, "matrix handed to the sparse factorization is not positive definite");
        h[(k, k)] = h[(k, k)].sqrt();
        let mut i = model.dof_parent[k];
        while let Some(ci) = i {
            h[(k, ci)] /= h[(k, k)];
            i = model.dof_parent[ci];
        }
        let mut i = model.dof_parent[k];
        while let Some(ci) = i {
            let mut j = Some(ci);
            while let Some(cj) = j {
                h[(ci, cj)] -= h[(k, ci)] * h[(k, cj)];
                j = model.dof_parent[cj];
            }
            i = model.dof_parent[ci];
        }
    }
}

/// Solves `Lᵀ * x = b` in place, with `l` as produced by
/// [`factorize_ltl`] and `x` holding `b` on entry.
pub fn solve_ltx(model: &Model, l: &DMatrix<Real>, x: &mut DVector<Real>) {
    let n = model.dof_count();
    for i in (0..n).rev() {
        x[i] /= l[(i, i)];
        let mut j = model.dof_parent[i];
        while let Some(cj) = j {
            x[cj] -= x[i] * l[(i, cj)];
            j = model.dof_parent[cj];
        }
    }
}

/// Solves `L * x = b` in place, with `l` as produced by
/// [`factorize_ltl`] and `x` holding `b` on entry.
pub fn solve_lx(model: &Model, l: &DMatrix<Real>, x: &mut DVector<Real>) {
    let n = model.dof_count();
    for i in 0..n {
        let mut j = model.dof_parent[i];
        while let Some(cj) = j {
            let correction = l[(i, cj)] * x[cj];
            x[i] -= correction;
            j = model.dof_parent[cj];
        }
        x[i] /= l[(i, i)];
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::math::Real;
    use crate::test_models;
    use approx::assert_relative_eq;

    #[test]
    fn sparse_solve_matches_dense_solve() {
        let mut model = test_models::branched_arm();
        let mut q = model.neutral_q();
        for i in 0..q.len() {
            q[i] = 0.4 - 0.2 * i as Real;
        }
        let n = model.dof_count();
        let mut h = DMatrix::zeros(n, n);
        model.mass_matrix(&q, &mut h, true);

        let b = DVector::from_fn(n, |i, _| 1.0 - 0.3 * i as Real);
        let dense = h.clone().lu().solve(&b).unwrap();

        let mut l = h.clone();
        factorize_ltl(&model, &mut l);
        let mut x = b.clone();
        solve_ltx(&model, &l, &mut x);
        solve_lx(&model, &l, &mut x);

        assert_relative_eq!(x, dense, epsilon = 1.0e-10);
    }

    #[test]
    fn factorization_produces_no_fill_in_between_branches() {
        let mut model = test_models::branched_arm();
        let q = model.neutral_q();
        let n = model.dof_count();
        let mut h = DMatrix::zeros(n, n);
        model.mass_matrix(&q, &mut h, true);

        // Record the zero pattern of H below the diagonal, factorize, and
        // check that no structurally-zero entry became nonzero.
        let zero_pattern: Vec<(usize, usize)> = (0..n)
            .flat_map(|i| (0..i).map(move |j| (i, j)))
            .filter(|&(i, j)| h[(i, j)] == 0.0)
            .collect();
        assert!(!zero_pattern.is_empty(), "expected a branched sparsity pattern");

        factorize_ltl(&model, &mut h);
        for (i, j) in zero_pattern {
            assert_eq!(h[(i, j)], 0.0, "fill-in at ({i}, {j})");
        }
    }
}
