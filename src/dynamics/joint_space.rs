//! Joint-space dynamics: the composite-rigid-body mass matrix and the
//! nonlinear bias forces.

use crate::dynamics::{Joint, Model};
use crate::math::{cross_force, join, Real, SpatialVector, Vector};
use na::{DMatrix, DVector, SMatrix};

impl Model {
    /// Computes the generalized bias forces (Coriolis, centrifugal and
    /// gravitational effects, minus any external forces) for the given
    /// state.
    ///
    /// As a side effect this refreshes the joint transforms, body
    /// velocities and bias accelerations. Body-to-base transforms are
    /// *not* refreshed; external forces are transformed with whatever
    /// base transforms are currently cached.
    pub fn nonlinear_effects(
        &mut self,
        q: &DVector<Real>,
        qdot: &DVector<Real>,
        out: &mut DVector<Real>,
        f_ext: Option<&[SpatialVector]>,
    ) {
        assert_eq!(q.len(), self.q_size(), "Q vector of the wrong size.");
        assert_eq!(qdot.len(), self.dof_count(), "QDot vector of the wrong size.");
        assert_eq!(out.len(), self.dof_count(), "C vector of the wrong size.");
        if let Some(f_ext) = f_ext {
            assert_eq!(f_ext.len(), self.body_count(), "f_ext of the wrong size.");
        }

        let nb = self.body_count();
        self.v[0] = SpatialVector::zeros();
        self.a[0] = join(&Vector::zeros(), &-self.gravity);

        for i in 1..nb {
            self.joint_calc(i, q, Some(qdot));
            let parent = self.parent[i];
            let bias = match &self.joints[i] {
                Joint::Custom(_) => self.custom_state[self.custom_index[i]].c_j,
                _ => SpatialVector::zeros(),
            };
            self.v[i] = self.x_lambda[i].apply(&self.v[parent]) + self.v_joint[i];
            self.c[i] = bias + crate::math::cross_motion(&self.v[i], &self.v_joint[i]);
            self.a[i] = self.x_lambda[i].apply(&self.a[parent]) + self.c[i];

            let momentum = self.spatial_inertia[i] * self.v[i];
            self.f_work[i] = self.spatial_inertia[i] * self.a[i] + cross_force(&self.v[i], &momentum);
            if let Some(f_ext) = f_ext {
                self.f_work[i] -= self.x_base[i].apply_adjoint(&f_ext[i]);
            }
        }

        for i in (1..nb).rev() {
            let qi = self.q_index[i];
            match &self.joints[i] {
                Joint::Revolute { .. } | Joint::Prismatic { .. } => {
                    out[qi] = self.s[i].dot(&self.f_work[i]);
                }
                Joint::Spherical | Joint::Translational => {
                    let projected = self.s3[i].transpose() * self.f_work[i];
                    out[qi] = projected[0];
                    out[qi + 1] = projected[1];
                    out[qi + 2] = projected[2];
                }
                Joint::Fixed => unreachable!(),
                Joint::Custom(joint) => {
                    let state = &self.custom_state[self.custom_index[i]];
                    for k in 0..joint.dof_count() {
                        out[qi + k] = state.s.column(k).dot(&self.f_work[i]);
                    }
                }
            }
            let parent = self.parent[i];
            let folded = self.x_lambda[i].apply_transpose(&self.f_work[i]);
            self.f_work[parent] += folded;
        }
    }

    /// Computes the joint-space mass matrix with the composite-rigid-body
    /// recursion. `h` is overwritten; when `update_kinematics` is false the
    /// cached joint transforms are reused.
    pub fn mass_matrix(&mut self, q: &DVector<Real>, h: &mut DMatrix<Real>, update_kinematics: bool) {
        let dofs = self.dof_count();
        assert_eq!(q.len(), self.q_size(), "Q vector of the wrong size.");
        assert!(
            h.nrows() == dofs && h.ncols() == dofs,
            "H matrix of the wrong size."
        );

        let nb = self.body_count();
        if update_kinematics {
            for i in 1..nb {
                self.joint_calc(i, q, None);
            }
        }

        h.fill(0.0);
        for i in 1..nb {
            self.ic_work[i] = self.spatial_inertia[i];
        }

        for i in (1..nb).rev() {
            let parent = self.parent[i];
            if parent != 0 {
                let x = self.x_lambda[i];
                let folded = x.to_matrix_transpose() * self.ic_work[i] * x.to_matrix();
                self.ic_work[parent] += folded;
            }

            // Composite force induced by each of this joint's DoFs, then
            // folded towards the base for the off-diagonal blocks.
            let mut f = SMatrix::<Real, 6, 6>::zeros();
            let width = self.joint_dof_count(i);
            match &self.joints[i] {
                Joint::Revolute { .. } | Joint::Prismatic { .. } => {
                    f.set_column(0, &(self.ic_work[i] * self.s[i]));
                }
                Joint::Spherical | Joint::Translational => {
                    let f3 = self.ic_work[i] * self.s3[i];
                    for k in 0..3 {
                        f.set_column(k, &f3.column(k));
                    }
                }
                Joint::Fixed => unreachable!(),
                Joint::Custom(_) => {
                    let state = &self.custom_state[self.custom_index[i]];
                    for k in 0..width {
                        f.set_column(k, &(self.ic_work[i] * state.s.column(k)));
                    }
                }
            }

            let qi = self.q_index[i];
            for r in 0..width {
                for c in 0..width {
                    h[(qi + r, qi + c)] = self.joint_subspace_col(i, r).dot(&f.column(c).into_owned());
                }
            }

            let mut j = i;
            while self.parent[j] != 0 {
                for k in 0..width {
                    let col = f.column(k).into_owned();
                    f.set_column(k, &self.x_lambda[j].apply_transpose(&col));
                }
                j = self.parent[j];
                let qj = self.q_index[j];
                for a in 0..self.joint_dof_count(j) {
                    let s_a = self.joint_subspace_col(j, a);
                    for k in 0..width {
                        let val = f.column(k).dot(&s_a);
                        h[(qi + k, qj + a)] = val;
                        h[(qj + a, qi + k)] = val;
                    }
                }
            }
        }
    }

    /// The number of DoFs of the joint of body `i`.
    #[inline]
    pub(crate) fn joint_dof_count(&self, i: usize) -> usize {
        self.joints[i].dof_count()
    }

    /// The `k`-th motion subspace column of the joint of body `i`.
    pub(crate) fn joint_subspace_col(&self, i: usize, k: usize) -> SpatialVector {
        match &self.joints[i] {
            Joint::Revolute { .. } | Joint::Prismatic { .. } => self.s[i],
            Joint::Spherical | Joint::Translational => self.s3[i].column(k).into_owned(),
            Joint::Fixed => unreachable!(),
            Joint::Custom(_) => self.custom_state[self.custom_index[i]].s.column(k).into_owned(),
        }
    }
}

#[cfg(test)]
mod test {
    use crate::test_models;
    use approx::assert_relative_eq;
    use na::{DMatrix, DVector};

    #[test]
    fn mass_matrix_is_symmetric_positive_definite() {
        let mut model = test_models::branched_arm();
        let mut q = model.neutral_q();
        for i in 0..q.len() {
            q[i] = 0.7 - 0.3 * i as crate::math::Real;
        }
        let mut h = DMatrix::zeros(model.dof_count(), model.dof_count());
        model.mass_matrix(&q, &mut h, true);

        assert_relative_eq!(h, h.transpose(), epsilon = 1.0e-10);
        assert!(h.clone().cholesky().is_some(), "H should be positive definite");
    }

    #[test]
    fn bias_forces_of_static_pendulum_match_gravity_torque() {
        let mut model = test_models::double_pendulum();
        let q = model.neutral_q();
        let qdot = model.zero_qdot();
        let mut c = model.zero_qdot();
        model.nonlinear_effects(&q, &qdot, &mut c, None);

        // Hanging at rest along -y: gravity produces no torque about the
        // hinge axes.
        assert_relative_eq!(c, DVector::zeros(model.dof_count()), epsilon = 1.0e-10);

        let mut q2 = q.clone();
        q2[0] = std::f64::consts::FRAC_PI_2 as crate::math::Real;
        model.nonlinear_effects(&q2, &qdot, &mut c, None);
        // Both links now horizontal: torque about the first hinge is
        // m1*g*l_com1 + m2*g*(l1 + l_com2).
        let expected = 1.0 * 9.81 * 0.5 + 1.0 * 9.81 * 1.5;
        assert_relative_eq!(c[0], expected, epsilon = 1.0e-6);
    }
}
