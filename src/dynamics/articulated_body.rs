//! The articulated-body forward-dynamics pass.

use crate::dynamics::{Joint, Model};
use crate::math::{cross_force, join, Real, SpatialVector, Vector};
use na::{DVector, Matrix3};

impl Model {
    /// Computes the unconstrained forward dynamics of the model with the
    /// articulated-body recursion.
    ///
    /// The per-body articulated inertias, bias forces and joint-space
    /// factorization quantities are left cached in the model; the
    /// incremental contact solver reuses them to propagate test forces
    /// without redoing this pass.
    pub fn forward_dynamics(
        &mut self,
        q: &DVector<Real>,
        qdot: &DVector<Real>,
        tau: &DVector<Real>,
        qddot: &mut DVector<Real>,
        f_ext: Option<&[SpatialVector]>,
    ) {
        assert_eq!(q.len(), self.q_size(), "Q vector of the wrong size.");
        assert_eq!(qdot.len(), self.dof_count(), "QDot vector of the wrong size.");
        assert_eq!(tau.len(), self.dof_count(), "Tau vector of the wrong size.");
        assert_eq!(qddot.len(), self.dof_count(), "QDDot vector of the wrong size.");
        if let Some(f_ext) = f_ext {
            assert_eq!(f_ext.len(), self.body_count(), "f_ext of the wrong size.");
        }

        log::trace!("articulated-body forward dynamics, {} dofs", self.dof_count());
        let nb = self.body_count();

        // Outward sweep: kinematics, rigid-body inertias and bias forces.
        self.v[0] = SpatialVector::zeros();
        for i in 1..nb {
            self.joint_calc(i, q, Some(qdot));
            let parent = self.parent[i];
            self.x_base[i] = self.x_lambda[i] * self.x_base[parent];

            let bias = match &self.joints[i] {
                Joint::Custom(_) => self.custom_state[self.custom_index[i]].c_j,
                _ => SpatialVector::zeros(),
            };
            self.v[i] = self.x_lambda[i].apply(&self.v[parent]) + self.v_joint[i];
            self.c[i] = bias + crate::math::cross_motion(&self.v[i], &self.v_joint[i]);

            self.ia[i] = self.spatial_inertia[i];
            let momentum = self.spatial_inertia[i] * self.v[i];
            self.pa[i] = cross_force(&self.v[i], &momentum);
            if let Some(f_ext) = f_ext {
                self.pa[i] -= self.x_base[i].apply_adjoint(&f_ext[i]);
            }
        }

        // Inward sweep: fold articulated inertias and bias forces towards
        // the base, caching the joint-space factorization quantities.
        for i in (1..nb).rev() {
            let qi = self.q_index[i];
            let parent = self.parent[i];
            match &self.joints[i] {
                Joint::Revolute { .. } | Joint::Prismatic { .. } => {
                    self.u_s[i] = self.ia[i] * self.s[i];
                    self.d_s[i] = self.s[i].dot(&self.u_s[i]);
                    self.tau_s[i] = tau[qi] - self.s[i].dot(&self.pa[i]);

                    if parent != 0 {
                        let ia_art = self.ia[i]
                            - self.u_s[i] * (self.u_s[i] / self.d_s[i]).transpose();
                        let pa_art = self.pa[i]
                            + ia_art * self.c[i]
                            + self.u_s[i] * (self.tau_s[i] / self.d_s[i]);
                        let x = self.x_lambda[i];
                        let folded_ia = x.to_matrix_transpose() * ia_art * x.to_matrix();
                        let folded_pa = x.apply_transpose(&pa_art);
                        self.ia[parent] += folded_ia;
                        self.pa[parent] += folded_pa;
                    }
                }
                Joint::Spherical | Joint::Translational => {
                    self.u_s3[i] = self.ia[i] * self.s3[i];
                    let d3: Matrix3<Real> = self.s3[i].transpose() * self.u_s3[i];
                    self.dinv_s3[i] = d3
                        .try_inverse()
                        .unwrap_or_else(|| panic!("singular joint-space inertia at body {}", i));
                    let projected = self.s3[i].transpose() * self.pa[i];
                    self.tau_s3[i] =
                        Vector::new(tau[qi], tau[qi + 1], tau[qi + 2]) - projected;

                    if parent != 0 {
                        let ia_art = self.ia[i]
                            - self.u_s3[i] * self.dinv_s3[i] * self.u_s3[i].transpose();
                        let pa_art = self.pa[i]
                            + ia_art * self.c[i]
                            + self.u_s3[i] * self.dinv_s3[i] * self.tau_s3[i];
                        let x = self.x_lambda[i];
                        let folded_ia = x.to_matrix_transpose() * ia_art * x.to_matrix();
                        let folded_pa = x.apply_transpose(&pa_art);
                        self.ia[parent] += folded_ia;
                        self.pa[parent] += folded_pa;
                    }
                }
                Joint::Fixed => unreachable!(),
                Joint::Custom(joint) => {
                    let dofs = joint.dof_count();
                    let ci = self.custom_index[i];
                    {
                        let (ia_i, pa_i) = (self.ia[i], self.pa[i]);
                        let state = &mut self.custom_state[ci];
                        state.u_s = ia_i * &state.s;
                        let d = state.s.transpose() * &state.u_s;
                        state.dinv = d
                            .try_inverse()
                            .unwrap_or_else(|| panic!("singular joint-space inertia at body {}", i));
                        for k in 0..dofs {
                            state.tau_s[k] = tau[qi + k] - state.s.column(k).dot(&pa_i);
                        }
                    }
                    if parent != 0 {
                        let state = &self.custom_state[ci];
                        let ia_art = self.ia[i]
                            - &state.u_s * &state.dinv * state.u_s.transpose();
                        let pa_art = self.pa[i]
                            + ia_art * self.c[i]
                            + &state.u_s * &state.dinv * &state.tau_s;
                        let x = self.x_lambda[i];
                        let folded_ia = x.to_matrix_transpose() * ia_art * x.to_matrix();
                        let folded_pa = x.apply_transpose(&pa_art);
                        self.ia[parent] += folded_ia;
                        self.pa[parent] += folded_pa;
                    }
                }
            }
        }

        // Outward sweep: resolve joint accelerations against the base
        // acceleration (gravity enters here as a fictitious base motion).
        self.a[0] = join(&Vector::zeros(), &-self.gravity);
        for i in 1..nb {
            let qi = self.q_index[i];
            let parent = self.parent[i];
            let mut acc = self.x_lambda[i].apply(&self.a[parent]) + self.c[i];
            match &self.joints[i] {
                Joint::Revolute { .. } | Joint::Prismatic { .. } => {
                    qddot[qi] = (self.tau_s[i] - self.u_s[i].dot(&acc)) / self.d_s[i];
                    acc += self.s[i] * qddot[qi];
                }
                Joint::Spherical | Joint::Translational => {
                    let qdd3 =
                        self.dinv_s3[i] * (self.tau_s3[i] - self.u_s3[i].transpose() * acc);
                    qddot[qi] = qdd3[0];
                    qddot[qi + 1] = qdd3[1];
                    qddot[qi + 2] = qdd3[2];
                    acc += self.s3[i] * qdd3;
                }
                Joint::Fixed => unreachable!(),
                Joint::Custom(joint) => {
                    let state = &self.custom_state[self.custom_index[i]];
                    let qdd = &state.dinv * (&state.tau_s - state.u_s.transpose() * acc);
                    for k in 0..joint.dof_count() {
                        qddot[qi + k] = qdd[k];
                        acc += state.s.column(k) * qdd[k];
                    }
                }
            }
            self.a[i] = acc;
        }
    }
}

#[cfg(test)]
mod test {
    use crate::test_models;
    use approx::assert_relative_eq;
    use na::{DMatrix, DVector};

    #[test]
    fn articulated_body_matches_mass_matrix_solve() {
        let mut model = test_models::branched_arm();
        let mut q = model.neutral_q();
        let mut qdot = model.zero_qdot();
        let mut tau = model.zero_qdot();
        for i in 0..model.dof_count() {
            q[i] = 0.2 * (i as crate::math::Real) - 0.4;
            qdot[i] = 0.5 - 0.1 * i as crate::math::Real;
            tau[i] = 1.0 + 0.3 * i as crate::math::Real;
        }

        let mut qddot_aba = model.zero_qdot();
        model.forward_dynamics(&q, &qdot, &tau, &mut qddot_aba, None);

        let mut h = DMatrix::zeros(model.dof_count(), model.dof_count());
        let mut c = model.zero_qdot();
        model.nonlinear_effects(&q, &qdot, &mut c, None);
        model.mass_matrix(&q, &mut h, false);

        let rhs: DVector<crate::math::Real> = &tau - &c;
        let qddot_dense = h.lu().solve(&rhs).unwrap();
        assert_relative_eq!(qddot_aba, qddot_dense, epsilon = 1.0e-8);
    }

    #[test]
    fn custom_joint_matches_its_decomposed_form() {
        let mut custom = test_models::planar_arm();
        let mut decomposed = test_models::planar_arm_decomposed();
        assert_eq!(custom.dof_count(), decomposed.dof_count());

        let q = DVector::from_row_slice(&[0.3, -0.2, 0.7]);
        let qdot = DVector::from_row_slice(&[-0.4, 0.25, 1.1]);
        let tau = DVector::from_row_slice(&[0.6, -0.1, 0.9]);

        let mut qddot_custom = custom.zero_qdot();
        custom.forward_dynamics(&q, &qdot, &tau, &mut qddot_custom, None);
        let mut qddot_decomposed = decomposed.zero_qdot();
        decomposed.forward_dynamics(&q, &qdot, &tau, &mut qddot_decomposed, None);
        assert_relative_eq!(qddot_custom, qddot_decomposed, epsilon = 1.0e-8);

        let n = custom.dof_count();
        let mut h_custom = DMatrix::zeros(n, n);
        custom.mass_matrix(&q, &mut h_custom, true);
        let mut h_decomposed = DMatrix::zeros(n, n);
        decomposed.mass_matrix(&q, &mut h_decomposed, true);
        assert_relative_eq!(h_custom, h_decomposed, epsilon = 1.0e-10);
    }

    #[test]
    fn spherical_chain_dynamics_consistency() {
        let mut model = test_models::spherical_chain();
        let mut q = model.neutral_q();
        let qi = 3; // revolute joint coordinate
        q[qi] = 0.4;
        model.set_joint_quaternion(
            1,
            &na::UnitQuaternion::from_euler_angles(0.3, -0.2, 0.1),
            &mut q,
        );
        let mut qdot = model.zero_qdot();
        for i in 0..qdot.len() {
            qdot[i] = 0.2 + 0.1 * i as crate::math::Real;
        }
        let tau = model.zero_qdot();

        let mut qddot_aba = model.zero_qdot();
        model.forward_dynamics(&q, &qdot, &tau, &mut qddot_aba, None);

        let mut h = DMatrix::zeros(model.dof_count(), model.dof_count());
        let mut c = model.zero_qdot();
        model.nonlinear_effects(&q, &qdot, &mut c, None);
        model.mass_matrix(&q, &mut h, false);

        let rhs: DVector<crate::math::Real> = -c;
        let qddot_dense = h.lu().solve(&rhs).unwrap();
        assert_relative_eq!(qddot_aba, qddot_dense, epsilon = 1.0e-8);
    }
}
