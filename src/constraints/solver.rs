//! The three interchangeable strategies solving the assembled constrained
//! system, plus the forward-dynamics and impulse entry points.
//!
//! All strategies consume the same inputs and satisfy, to solver
//! precision, the coupled system `H*qddot - Gᵀ*λ = c`, `G*qddot = γ`.

use crate::constraints::ConstraintSet;
use crate::dynamics::Model;
use crate::linalg::{factorize_ltl, solve_linear_system, solve_ltx, solve_lx, LinearSolver};
use crate::math::{Real, SpatialVector};
use na::{DMatrix, DVector};

/// Solves the constrained system as one dense augmented factorization of
/// `[[H, Gᵀ], [G, 0]]`. Simplest and most general; cubic in `n + m`.
///
/// On return `x` holds `[qddot; -λ]`.
pub fn solve_constrained_system_direct(
    h: &DMatrix<Real>,
    g: &DMatrix<Real>,
    c: &DVector<Real>,
    gamma: &DVector<Real>,
    a: &mut DMatrix<Real>,
    b: &mut DVector<Real>,
    x: &mut DVector<Real>,
    linear_solver: LinearSolver,
) {
    let n = c.len();
    let m = gamma.len();
    assert!(h.nrows() == n && h.ncols() == n, "H matrix of the wrong size.");
    assert!(g.nrows() == m && g.ncols() == n, "G matrix of the wrong size.");
    assert!(
        a.nrows() == n + m && a.ncols() == n + m && b.len() == n + m && x.len() == n + m,
        "augmented system buffers of the wrong size."
    );

    a.view_mut((0, 0), (n, n)).copy_from(h);
    a.view_mut((0, n), (n, m)).copy_from(&g.transpose());
    a.view_mut((n, 0), (m, n)).copy_from(g);
    a.view_mut((n, n), (m, m)).fill(0.0);

    b.rows_mut(0, n).copy_from(c);
    b.rows_mut(n, m).copy_from(gamma);

    solve_linear_system(a, b, x, linear_solver);
}

/// Solves the constrained system through the branch-sparse `LᵀL`
/// factorization of `H`, never forming `H⁻¹` densely. `h` is factorized in
/// place. Requires `H` symmetric positive definite.
pub fn solve_constrained_system_range_space_sparse(
    model: &Model,
    h: &mut DMatrix<Real>,
    g: &DMatrix<Real>,
    c: &DVector<Real>,
    gamma: &DVector<Real>,
    qddot: &mut DVector<Real>,
    lambda: &mut DVector<Real>,
    k: &mut DMatrix<Real>,
    a: &mut DVector<Real>,
) {
    factorize_ltl(model, h);

    // Y = L⁻ᵀ Gᵀ, columnwise through the sparse substitution.
    let mut y = g.transpose();
    for i in 0..y.ncols() {
        let mut col = y.column(i).into_owned();
        solve_ltx(model, h, &mut col);
        y.set_column(i, &col);
    }

    let mut z = c.clone();
    solve_ltx(model, h, &mut z);

    // Reduced system K λ = γ - Yᵀ z with K = Yᵀ Y = G H⁻¹ Gᵀ.
    k.gemm_tr(1.0, &y, &y, 0.0);
    a.copy_from(gamma);
    a.gemv_tr(-1.0, &y, &z, 1.0);

    match k.clone().cholesky() {
        Some(chol) => lambda.copy_from(&chol.solve(a)),
        None => panic!("the range-space strategy needs a full-row-rank constraint Jacobian"),
    }

    // qddot = H⁻¹ (c + Gᵀ λ).
    qddot.copy_from(c);
    qddot.gemv_tr(1.0, g, lambda, 1.0);
    solve_ltx(model, h, qddot);
    solve_lx(model, h, qddot);
}

/// Solves the constrained system by splitting the accelerations into the
/// range and null spaces of `Gᵀ`. Preferred when there are far fewer
/// constraint rows than degrees of freedom.
pub fn solve_constrained_system_null_space(
    h: &DMatrix<Real>,
    g: &DMatrix<Real>,
    c: &DVector<Real>,
    gamma: &DVector<Real>,
    qddot: &mut DVector<Real>,
    lambda: &mut DVector<Real>,
    y: &DMatrix<Real>,
    z: &DMatrix<Real>,
    qddot_y: &mut DVector<Real>,
    qddot_z: &mut DVector<Real>,
    linear_solver: LinearSolver,
) {
    let gy = g * y;
    solve_linear_system(&gy, gamma, qddot_y, linear_solver);

    let zhz = z.transpose() * h * z;
    let rhs = z.transpose() * (c - h * y * &*qddot_y);
    match zhz.cholesky() {
        Some(chol) => qddot_z.copy_from(&chol.solve(&rhs)),
        None => panic!("the null-space strategy needs a positive-definite projected inertia"),
    }

    qddot.copy_from(&(y * &*qddot_y + z * &*qddot_z));

    let lambda_rhs = y.transpose() * (h * &*qddot - c);
    solve_linear_system(&gy, &lambda_rhs, lambda, linear_solver);
}

impl ConstraintSet {
    fn check_dynamics_arguments(
        &self,
        model: &Model,
        q: &DVector<Real>,
        qdot: &DVector<Real>,
        tau: &DVector<Real>,
        qddot: &DVector<Real>,
    ) {
        assert!(self.bound, "the constraint set must be bound");
        assert_eq!(q.len(), model.q_size(), "Q vector of the wrong size.");
        assert_eq!(qdot.len(), model.dof_count(), "QDot vector of the wrong size.");
        assert_eq!(tau.len(), model.dof_count(), "Tau vector of the wrong size.");
        assert_eq!(qddot.len(), model.dof_count(), "QDDot vector of the wrong size.");
    }

    /// Constrained forward dynamics through the dense augmented solve.
    ///
    /// Writes the joint accelerations into `qddot` and the constraint
    /// forces (as exerted by the constraints) into [`Self::force`].
    pub fn forward_dynamics_constraints_direct(
        &mut self,
        model: &mut Model,
        q: &DVector<Real>,
        qdot: &DVector<Real>,
        tau: &DVector<Real>,
        qddot: &mut DVector<Real>,
        f_ext: Option<&[SpatialVector]>,
    ) {
        log::debug!("forward dynamics, direct strategy");
        self.check_dynamics_arguments(model, q, qdot, tau, qddot);
        self.assemble_system(model, q, qdot, f_ext);

        self.c_work.copy_from(tau);
        self.c_work -= &self.c_bias;
        solve_constrained_system_direct(
            &self.h,
            &self.g,
            &self.c_work,
            &self.gamma,
            &mut self.a_work,
            &mut self.b_work,
            &mut self.x_work,
            self.linear_solver,
        );

        let n = model.dof_count();
        for i in 0..n {
            qddot[i] = self.x_work[i];
        }
        // The augmented solve produces -λ; store the force exerted by the
        // constraint.
        for i in 0..self.size() {
            self.force[i] = -self.x_work[n + i];
        }
    }

    /// Constrained forward dynamics through the branch-sparse range-space
    /// solve.
    pub fn forward_dynamics_constraints_range_space_sparse(
        &mut self,
        model: &mut Model,
        q: &DVector<Real>,
        qdot: &DVector<Real>,
        tau: &DVector<Real>,
        qddot: &mut DVector<Real>,
        f_ext: Option<&[SpatialVector]>,
    ) {
        log::debug!("forward dynamics, range-space strategy");
        self.check_dynamics_arguments(model, q, qdot, tau, qddot);
        self.assemble_system(model, q, qdot, f_ext);

        self.c_work.copy_from(tau);
        self.c_work -= &self.c_bias;
        let Self {
            h,
            g,
            c_work,
            gamma,
            force,
            k_work,
            a_vec,
            ..
        } = self;
        solve_constrained_system_range_space_sparse(
            model, h, g, c_work, gamma, qddot, force, k_work, a_vec,
        );
    }

    /// Constrained forward dynamics through the null-space solve.
    pub fn forward_dynamics_constraints_null_space(
        &mut self,
        model: &mut Model,
        q: &DVector<Real>,
        qdot: &DVector<Real>,
        tau: &DVector<Real>,
        qddot: &mut DVector<Real>,
        f_ext: Option<&[SpatialVector]>,
    ) {
        log::debug!("forward dynamics, null-space strategy");
        self.check_dynamics_arguments(model, q, qdot, tau, qddot);
        self.assemble_system(model, q, qdot, f_ext);

        self.c_work.copy_from(tau);
        self.c_work -= &self.c_bias;
        self.split_jacobian_range_null(model);

        let linear_solver = self.linear_solver;
        let Self {
            h,
            g,
            c_work,
            gamma,
            force,
            y,
            z,
            qddot_y,
            qddot_z,
            ..
        } = self;
        solve_constrained_system_null_space(
            h,
            g,
            c_work,
            gamma,
            qddot,
            force,
            y,
            z,
            qddot_y,
            qddot_z,
            linear_solver,
        );
    }

    /// Factorizes `Gᵀ` and splits its full orthogonal factor into the
    /// range- and null-space bases `Y` and `Z`.
    fn split_jacobian_range_null(&mut self, model: &Model) {
        let n = model.dof_count();
        let m = self.size();
        assert!(
            m <= n,
            "the null-space strategy requires no more constraint rows than degrees of freedom"
        );

        let qr = self.g.transpose().qr();
        self.gt_qr_q.fill(0.0);
        self.gt_qr_q.fill_diagonal(1.0);
        // Accumulate Qᵀ into the workspace, then transpose in place.
        qr.q_tr_mul(&mut self.gt_qr_q);
        self.gt_qr_q.transpose_mut();

        self.y.copy_from(&self.gt_qr_q.columns(0, m));
        self.z.copy_from(&self.gt_qr_q.columns(m, n - m));
    }

    fn check_impulse_arguments(
        &self,
        model: &Model,
        q: &DVector<Real>,
        qdot_minus: &DVector<Real>,
        qdot_plus: &DVector<Real>,
    ) {
        assert!(self.bound, "the constraint set must be bound");
        assert_eq!(q.len(), model.q_size(), "Q vector of the wrong size.");
        assert_eq!(qdot_minus.len(), model.dof_count(), "QDot vector of the wrong size.");
        assert_eq!(qdot_plus.len(), model.dof_count(), "QDot vector of the wrong size.");
    }

    /// Prepares the velocity-jump system: fresh kinematics, mass matrix,
    /// Jacobian, and the joint-space momentum as right-hand side.
    fn assemble_impulse_system(&mut self, model: &mut Model, q: &DVector<Real>, qdot_minus: &DVector<Real>) {
        model.update_kinematics(Some(q), None, None);
        model.mass_matrix(q, &mut self.h, false);
        self.update_jacobian(model, q, false);
        self.c_work.gemv(1.0, &self.h, qdot_minus, 0.0);
    }

    /// Resolves an instantaneous impact through the dense augmented solve:
    /// post-impact joint velocities land in `qdot_plus`, constraint
    /// impulses in [`Self::impulse`]. Row targets come from
    /// [`Self::v_plus`] (zero for perfectly inelastic contact).
    pub fn compute_constraint_impulses_direct(
        &mut self,
        model: &mut Model,
        q: &DVector<Real>,
        qdot_minus: &DVector<Real>,
        qdot_plus: &mut DVector<Real>,
    ) {
        log::debug!("constraint impulses, direct strategy");
        self.check_impulse_arguments(model, q, qdot_minus, qdot_plus);
        self.assemble_impulse_system(model, q, qdot_minus);

        solve_constrained_system_direct(
            &self.h,
            &self.g,
            &self.c_work,
            &self.v_plus,
            &mut self.a_work,
            &mut self.b_work,
            &mut self.x_work,
            self.linear_solver,
        );

        let n = model.dof_count();
        for i in 0..n {
            qdot_plus[i] = self.x_work[i];
        }
        for i in 0..self.size() {
            self.impulse[i] = self.x_work[n + i];
        }
    }

    /// Resolves an instantaneous impact through the range-space solve.
    pub fn compute_constraint_impulses_range_space_sparse(
        &mut self,
        model: &mut Model,
        q: &DVector<Real>,
        qdot_minus: &DVector<Real>,
        qdot_plus: &mut DVector<Real>,
    ) {
        log::debug!("constraint impulses, range-space strategy");
        self.check_impulse_arguments(model, q, qdot_minus, qdot_plus);
        self.assemble_impulse_system(model, q, qdot_minus);

        let Self {
            h,
            g,
            c_work,
            v_plus,
            impulse,
            k_work,
            a_vec,
            ..
        } = self;
        solve_constrained_system_range_space_sparse(
            model, h, g, c_work, v_plus, qdot_plus, impulse, k_work, a_vec,
        );
    }

    /// Resolves an instantaneous impact through the null-space solve.
    pub fn compute_constraint_impulses_null_space(
        &mut self,
        model: &mut Model,
        q: &DVector<Real>,
        qdot_minus: &DVector<Real>,
        qdot_plus: &mut DVector<Real>,
    ) {
        log::debug!("constraint impulses, null-space strategy");
        self.check_impulse_arguments(model, q, qdot_minus, qdot_plus);
        self.assemble_impulse_system(model, q, qdot_minus);
        self.split_jacobian_range_null(model);

        let linear_solver = self.linear_solver;
        let Self {
            h,
            g,
            c_work,
            v_plus,
            impulse,
            y,
            z,
            qddot_y,
            qddot_z,
            ..
        } = self;
        solve_constrained_system_null_space(
            h,
            g,
            c_work,
            v_plus,
            qdot_plus,
            impulse,
            y,
            z,
            qddot_y,
            qddot_z,
            linear_solver,
        );
    }
}
