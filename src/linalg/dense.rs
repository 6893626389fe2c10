//! Dense linear-system resolution with a run-time selectable factorization.

use crate::math::Real;
use na::{DMatrix, DVector};

/// The dense factorization used for the assembled constrained systems.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum LinearSolver {
    /// Partial-pivot LU. Falls back to plain Householder QR on the
    /// single-precision backend, which carries no pivoting LU path.
    PartialPivLu,
    /// Column-pivoted Householder QR (default).
    #[default]
    ColPivHouseholderQr,
    /// Plain Householder QR.
    HouseholderQr,
}

/// Solves the dense system `A * x = b` with the selected factorization.
///
/// Singular systems are a caller-contract violation and panic; the
/// assembled systems handed to this routine are well-posed whenever the
/// model and constraint set satisfy their documented rank requirements.
pub fn solve_linear_system(
    a: &DMatrix<Real>,
    b: &DVector<Real>,
    x: &mut DVector<Real>,
    linear_solver: LinearSolver,
) {
    assert!(
        a.nrows() == b.len() && a.ncols() == x.len(),
        "Mismatching sizes."
    );

    let solution = match effective_solver(linear_solver) {
        LinearSolver::PartialPivLu => a.clone().lu().solve(b),
        LinearSolver::ColPivHouseholderQr => a.clone().col_piv_qr().solve(b),
        LinearSolver::HouseholderQr => a.clone().qr().solve(b),
    };

    match solution {
        Some(solution) => x.copy_from(&solution),
        None => panic!("singular linear system passed to the dense solver"),
    }
}

#[cfg(feature = "f64")]
#[inline]
pub(crate) fn effective_solver(linear_solver: LinearSolver) -> LinearSolver {
    linear_solver
}

// The single-precision backend keeps only the QR paths.
#[cfg(feature = "f32")]
#[inline]
pub(crate) fn effective_solver(linear_solver: LinearSolver) -> LinearSolver {
    match linear_solver {
        LinearSolver::PartialPivLu => LinearSolver::HouseholderQr,
        other => other,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn all_selectors_solve_a_well_posed_system() {
        let a = DMatrix::from_row_slice(3, 3, &[4.0, 1.0, 0.0, 1.0, 3.0, -1.0, 0.0, -1.0, 2.0]);
        let b = DVector::from_row_slice(&[1.0, -2.0, 0.5]);
        for solver in [
            LinearSolver::PartialPivLu,
            LinearSolver::ColPivHouseholderQr,
            LinearSolver::HouseholderQr,
        ] {
            let mut x = DVector::zeros(3);
            solve_linear_system(&a, &b, &mut x, solver);
            assert_relative_eq!(&a * &x, b, epsilon = 1.0e-12);
        }
    }

    #[test]
    #[should_panic(expected = "Mismatching sizes")]
    fn size_mismatch_is_fatal() {
        let a = DMatrix::<crate::math::Real>::identity(3, 3);
        let b = DVector::zeros(2);
        let mut x = DVector::zeros(3);
        solve_linear_system(&a, &b, &mut x, LinearSolver::PartialPivLu);
    }
}
