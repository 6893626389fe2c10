//! Incremental test-force resolution of one-sided contact forces.
//!
//! Instead of factoring the full augmented system, this solver measures
//! how a unit force at each contact direction perturbs the acceleration of
//! every contact point, builds the dense contact-coupling matrix from
//! those responses, and solves a system of contact-row size only. Each
//! test force is propagated through the tree by a single linearized sweep
//! that reuses the articulated-body quantities cached by the baseline
//! forward-dynamics pass, so the per-force cost scales with tree depth.

use crate::constraints::{AnyConstraint, Constraint, ConstraintSet};
use crate::dynamics::{Joint, Model};
use crate::linalg::solve_linear_system;
use crate::math::{cross_force, join, Real, SpatialVector, Vector};
use na::DVector;

impl ConstraintSet {
    /// Constrained forward dynamics for a set of pure contact constraints,
    /// via the incremental test-force method.
    ///
    /// Fatal if any registered constraint is not a contact constraint.
    pub fn forward_dynamics_contacts_kokkevis(
        &mut self,
        model: &mut Model,
        q: &DVector<Real>,
        qdot: &DVector<Real>,
        tau: &DVector<Real>,
        qddot: &mut DVector<Real>,
    ) {
        log::debug!("forward dynamics, test-force contact strategy");
        self.check_dynamics_arguments_kokkevis(model, q, qdot, tau, qddot);
        assert!(
            self.constraints.len() == self.contact_indices.len(),
            "Incompatible constraint types: all constraints must be contact constraints for the test-force method"
        );

        let contact_count = self.contact_indices.len();

        // Baseline accelerations without contact forces, and the baseline
        // acceleration of every contact point under them.
        model.forward_dynamics(q, qdot, tau, &mut self.qddot_0, None);
        model.update_kinematics(None, None, Some(&self.qddot_0));
        for bi in 0..contact_count {
            let (row, size, accel) = {
                let contact = self.contact(bi);
                (
                    contact.row_offset(),
                    contact.size(),
                    contact.point_acceleration(model),
                )
            };
            for k in 0..size {
                self.point_accel_0[row + k] = accel;
            }
        }
        {
            let Self {
                constraints,
                contact_indices,
                point_accel_0,
                a_vec,
                ..
            } = self;
            for &ci in contact_indices.iter() {
                if let AnyConstraint::Contact(contact) = &constraints[ci] {
                    contact.point_acceleration_error(point_accel_0, a_vec);
                }
            }
        }

        // One test force per contact direction; each propagated response
        // fills one row block of the coupling matrix.
        for bi in 0..contact_count {
            {
                let Self {
                    constraints,
                    contact_indices,
                    f_t,
                    ..
                } = self;
                if let AnyConstraint::Contact(contact) = &constraints[contact_indices[bi]] {
                    contact.point_force_jacobians(model, f_t);
                }
            }
            let (row, directions, movable_body) = {
                let contact = self.contact(bi);
                (contact.row_offset(), contact.size(), contact.movable_body())
            };

            for j in 0..directions {
                self.f_ext_constraints[movable_body] = self.f_t[row + j];
                self.forward_dynamics_acceleration_deltas(model, movable_body);
                self.f_ext_constraints[movable_body].fill(0.0);

                self.qddot_t += &self.qddot_0;
                model.update_kinematics(None, None, Some(&self.qddot_t));

                for dj in 0..contact_count {
                    let accel_t = {
                        let contact = self.contact(dj);
                        contact.point_acceleration(model)
                    };
                    let Self {
                        constraints,
                        contact_indices,
                        k_work,
                        point_accel_0,
                        ..
                    } = self;
                    if let AnyConstraint::Contact(contact) = &constraints[contact_indices[dj]] {
                        let col = contact.row_offset();
                        for (k, normal) in contact.normals().iter().enumerate() {
                            k_work[(row + j, col + k)] =
                                normal.dot(&(accel_t - point_accel_0[col + k]));
                        }
                    }
                }
            }
        }

        log::trace!("contact coupling matrix K = {}", self.k_work);
        solve_linear_system(&self.k_work, &self.a_vec, &mut self.force, self.linear_solver);

        // Accumulate the resolved forces as external spatial forces on the
        // movable body of each contact.
        {
            let Self {
                constraints,
                contact_indices,
                f_ext_constraints,
                f_t,
                force,
                ..
            } = self;
            for &ci in contact_indices.iter() {
                if let AnyConstraint::Contact(contact) = &constraints[ci] {
                    let row = contact.row_offset();
                    let body = contact.movable_body();
                    for k in 0..contact.size() {
                        f_ext_constraints[body] -= f_t[row + k] * force[row + k];
                    }
                }
            }
        }

        self.forward_dynamics_apply_constraint_forces(model, tau, qddot);
    }

    fn check_dynamics_arguments_kokkevis(
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
        assert_eq!(self.f_ext_constraints.len(), model.body_count());
        assert_eq!(self.f_t.len(), self.size());
        assert_eq!(self.point_accel_0.len(), self.size());
    }

    /// Propagates the effect of the test force stored in
    /// `f_ext_constraints[body_id]` through the tree, writing the induced
    /// acceleration change into `qddot_t`.
    ///
    /// This mirrors the articulated-body sweeps but carries only the delta
    /// seeded at `body_id`, reusing the baseline inertia and factorization
    /// quantities cached in the model. Every delta buffer is zeroed first
    /// so consecutive test forces cannot contaminate each other.
    fn forward_dynamics_acceleration_deltas(&mut self, model: &mut Model, body_id: usize) {
        let nb = model.body_count();
        assert!(self.d_pa.len() == nb && self.d_a.len() == nb && self.d_u.len() == nb);

        for d in &mut self.d_pa {
            d.fill(0.0);
        }
        for d in &mut self.d_a {
            d.fill(0.0);
        }
        self.d_u.fill(0.0);
        for d in &mut self.d_u3 {
            d.fill(0.0);
        }
        for state in &mut model.custom_state {
            state.d_u.fill(0.0);
        }

        // Inward sweep: fold the injected force towards the base.
        for i in (1..=body_id).rev() {
            if i == body_id {
                self.d_pa[i] = -model.x_base[i].apply_adjoint(&self.f_ext_constraints[i]);
            }

            let parent = model.parent[i];
            match &model.joints[i] {
                Joint::Revolute { .. } | Joint::Prismatic { .. } => {
                    self.d_u[i] = -model.s[i].dot(&self.d_pa[i]);
                    if parent != 0 {
                        let corr =
                            self.d_pa[i] + model.u_s[i] * (self.d_u[i] / model.d_s[i]);
                        self.d_pa[parent] += model.x_lambda[i].apply_transpose(&corr);
                    }
                }
                Joint::Spherical | Joint::Translational => {
                    self.d_u3[i] = -(model.s3[i].transpose() * self.d_pa[i]);
                    if parent != 0 {
                        let corr =
                            self.d_pa[i] + model.u_s3[i] * (model.dinv_s3[i] * self.d_u3[i]);
                        self.d_pa[parent] += model.x_lambda[i].apply_transpose(&corr);
                    }
                }
                Joint::Fixed => unreachable!(),
                Joint::Custom(_) => {
                    let ci = model.custom_index[i];
                    let du = -(model.custom_state[ci].s.transpose() * self.d_pa[i]);
                    model.custom_state[ci].d_u = du;
                    if parent != 0 {
                        let state = &model.custom_state[ci];
                        let corr = self.d_pa[i] + &state.u_s * &state.dinv * &state.d_u;
                        self.d_pa[parent] += model.x_lambda[i].apply_transpose(&corr);
                    }
                }
            }
        }

        // Outward sweep: resolve the induced joint-acceleration deltas.
        self.qddot_t.fill(0.0);
        self.d_a[0] = model.a[0];
        for i in 1..nb {
            let parent = model.parent[i];
            let qi = model.q_index[i];
            let xa = model.x_lambda[i].apply(&self.d_a[parent]);
            match &model.joints[i] {
                Joint::Revolute { .. } | Joint::Prismatic { .. } => {
                    self.qddot_t[qi] =
                        (self.d_u[i] - model.u_s[i].dot(&xa)) / model.d_s[i];
                    self.d_a[i] = xa + model.s[i] * self.qddot_t[qi];
                }
                Joint::Spherical | Joint::Translational => {
                    let qdd3 = model.dinv_s3[i]
                        * (self.d_u3[i] - model.u_s3[i].transpose() * xa);
                    self.qddot_t[qi] = qdd3[0];
                    self.qddot_t[qi + 1] = qdd3[1];
                    self.qddot_t[qi + 2] = qdd3[2];
                    self.d_a[i] = xa + model.s3[i] * qdd3;
                }
                Joint::Fixed => unreachable!(),
                Joint::Custom(joint) => {
                    let state = &model.custom_state[model.custom_index[i]];
                    let qdd = &state.dinv * (&state.d_u - state.u_s.transpose() * xa);
                    let mut acc = xa;
                    for k in 0..joint.dof_count() {
                        self.qddot_t[qi + k] = qdd[k];
                        acc += state.s.column(k) * qdd[k];
                    }
                    self.d_a[i] = acc;
                }
            }
        }
    }

    /// Applies the accumulated external constraint forces through the
    /// standard force-application recursion: a backward fold of forces and
    /// articulated quantities, then a forward resolution of joint
    /// accelerations. Reuses the joint-space factorization quantities left
    /// by the baseline forward-dynamics pass.
    fn forward_dynamics_apply_constraint_forces(
        &mut self,
        model: &mut Model,
        tau: &DVector<Real>,
        qddot: &mut DVector<Real>,
    ) {
        assert_eq!(qddot.len(), model.dof_count(), "QDDot vector of the wrong size.");
        let nb = model.body_count();

        for i in 1..nb {
            model.ia[i] = model.spatial_inertia[i];
            let momentum = model.spatial_inertia[i] * model.v[i];
            model.pa[i] = cross_force(&model.v[i], &momentum);
            if self.f_ext_constraints[i] != SpatialVector::zeros() {
                log::trace!(
                    "external constraint force on body {}: {}",
                    i,
                    self.f_ext_constraints[i].transpose()
                );
                let folded = model.x_base[i].apply_adjoint(&self.f_ext_constraints[i]);
                model.pa[i] -= folded;
            }
        }

        for i in (1..nb).rev() {
            let qi = model.q_index[i];
            let parent = model.parent[i];
            match &model.joints[i] {
                Joint::Revolute { .. } | Joint::Prismatic { .. } => {
                    model.tau_s[i] = tau[qi] - model.s[i].dot(&model.pa[i]);
                    if parent != 0 {
                        let ia_art = model.ia[i]
                            - model.u_s[i] * (model.u_s[i] / model.d_s[i]).transpose();
                        let pa_art = model.pa[i]
                            + ia_art * model.c[i]
                            + model.u_s[i] * (model.tau_s[i] / model.d_s[i]);
                        let x = model.x_lambda[i];
                        let folded_ia = x.to_matrix_transpose() * ia_art * x.to_matrix();
                        let folded_pa = x.apply_transpose(&pa_art);
                        model.ia[parent] += folded_ia;
                        model.pa[parent] += folded_pa;
                    }
                }
                Joint::Spherical | Joint::Translational => {
                    let projected = model.s3[i].transpose() * model.pa[i];
                    model.tau_s3[i] =
                        Vector::new(tau[qi], tau[qi + 1], tau[qi + 2]) - projected;
                    if parent != 0 {
                        let ia_art = model.ia[i]
                            - model.u_s3[i] * model.dinv_s3[i] * model.u_s3[i].transpose();
                        let pa_art = model.pa[i]
                            + ia_art * model.c[i]
                            + model.u_s3[i] * model.dinv_s3[i] * model.tau_s3[i];
                        let x = model.x_lambda[i];
                        let folded_ia = x.to_matrix_transpose() * ia_art * x.to_matrix();
                        let folded_pa = x.apply_transpose(&pa_art);
                        model.ia[parent] += folded_ia;
                        model.pa[parent] += folded_pa;
                    }
                }
                Joint::Fixed => unreachable!(),
                Joint::Custom(joint) => {
                    let ci = model.custom_index[i];
                    {
                        let pa_i = model.pa[i];
                        let state = &mut model.custom_state[ci];
                        for k in 0..joint.dof_count() {
                            state.tau_s[k] = tau[qi + k] - state.s.column(k).dot(&pa_i);
                        }
                    }
                    if parent != 0 {
                        let state = &model.custom_state[ci];
                        let ia_art = model.ia[i]
                            - &state.u_s * &state.dinv * state.u_s.transpose();
                        let pa_art = model.pa[i]
                            + ia_art * model.c[i]
                            + &state.u_s * &state.dinv * &state.tau_s;
                        let x = model.x_lambda[i];
                        let folded_ia = x.to_matrix_transpose() * ia_art * x.to_matrix();
                        let folded_pa = x.apply_transpose(&pa_art);
                        model.ia[parent] += folded_ia;
                        model.pa[parent] += folded_pa;
                    }
                }
            }
        }

        model.a[0] = join(&Vector::zeros(), &-model.gravity);
        for i in 1..nb {
            let qi = model.q_index[i];
            let parent = model.parent[i];
            let mut acc = model.x_lambda[i].apply(&model.a[parent]) + model.c[i];
            match &model.joints[i] {
                Joint::Revolute { .. } | Joint::Prismatic { .. } => {
                    qddot[qi] = (model.tau_s[i] - model.u_s[i].dot(&acc)) / model.d_s[i];
                    acc += model.s[i] * qddot[qi];
                }
                Joint::Spherical | Joint::Translational => {
                    let qdd3 = model.dinv_s3[i]
                        * (model.tau_s3[i] - model.u_s3[i].transpose() * acc);
                    qddot[qi] = qdd3[0];
                    qddot[qi + 1] = qdd3[1];
                    qddot[qi + 2] = qdd3[2];
                    acc += model.s3[i] * qdd3;
                }
                Joint::Fixed => unreachable!(),
                Joint::Custom(joint) => {
                    let state = &model.custom_state[model.custom_index[i]];
                    let qdd = &state.dinv * (&state.tau_s - state.u_s.transpose() * acc);
                    for k in 0..joint.dof_count() {
                        qddot[qi + k] = qdd[k];
                        acc += state.s.column(k) * qdd[k];
                    }
                }
            }
            model.a[i] = acc;
        }
        log::trace!("QDDot after constraint forces: {}", qddot.transpose());
    }
}

#[cfg(test)]
mod test {
    use crate::constraints::ConstraintSet;
    use crate::dynamics::{Joint, RigidBody};
    use crate::math::{Real, SpatialTransform};
    use crate::test_models;
    use approx::assert_relative_eq;
    use na::vector;

    fn bent_state(
        model: &crate::dynamics::Model,
    ) -> (na::DVector<Real>, na::DVector<Real>, na::DVector<Real>) {
        let mut q = model.neutral_q();
        let mut qdot = model.zero_qdot();
        let mut tau = model.zero_qdot();
        for i in 0..model.dof_count() {
            q[i] = 0.25 - 0.11 * i as Real;
            qdot[i] = -0.3 + 0.08 * i as Real;
            tau[i] = 0.4 * i as Real - 0.2;
        }
        (q, qdot, tau)
    }

    #[test]
    fn test_force_method_matches_direct_solve() {
        let mut model = test_models::branched_arm();
        let build_set = || {
            let mut set = ConstraintSet::new();
            set.add_contact_constraint(3, vector![0.0, -0.5, 0.0], vector![0.0, 1.0, 0.0], None, false);
            set.add_contact_constraint(3, vector![0.0, -0.5, 0.0], vector![1.0, 0.0, 0.0], None, true);
            set.add_contact_constraint(5, vector![0.0, -0.4, 0.0], vector![0.0, 1.0, 0.0], None, false);
            set
        };
        let mut set_direct = build_set();
        set_direct.bind(&model);
        let mut set_kokkevis = build_set();
        set_kokkevis.bind(&model);

        let (q, qdot, tau) = bent_state(&model);

        let mut qddot_direct = model.zero_qdot();
        set_direct.forward_dynamics_constraints_direct(
            &mut model, &q, &qdot, &tau, &mut qddot_direct, None,
        );
        let mut qddot_kokkevis = model.zero_qdot();
        set_kokkevis.forward_dynamics_contacts_kokkevis(
            &mut model, &q, &qdot, &tau, &mut qddot_kokkevis,
        );

        assert_relative_eq!(qddot_direct, qddot_kokkevis, epsilon = 1.0e-8);
        // The test-force method stores the magnitude applied against the
        // constraint directions, the opposite of the augmented solve's
        // exerted-force convention.
        assert_relative_eq!(set_direct.force, -&set_kokkevis.force, epsilon = 1.0e-8);
    }

    #[test]
    fn test_force_method_handles_custom_joints() {
        let mut model = test_models::planar_arm();
        let build_set = || {
            let mut set = ConstraintSet::new();
            set.add_contact_constraint(2, vector![0.0, -0.5, 0.0], vector![0.0, 1.0, 0.0], None, false);
            set.add_contact_constraint(2, vector![0.0, -0.5, 0.0], vector![1.0, 0.0, 0.0], None, true);
            set
        };
        let mut set_direct = build_set();
        set_direct.bind(&model);
        let mut set_kokkevis = build_set();
        set_kokkevis.bind(&model);

        let q = na::DVector::from_row_slice(&[0.2, -0.1, 0.4]);
        let qdot = na::DVector::from_row_slice(&[0.3, 0.1, -0.5]);
        let tau = na::DVector::from_row_slice(&[0.0, 0.2, -0.3]);

        let mut qddot_direct = model.zero_qdot();
        set_direct.forward_dynamics_constraints_direct(
            &mut model, &q, &qdot, &tau, &mut qddot_direct, None,
        );
        let mut qddot_kokkevis = model.zero_qdot();
        set_kokkevis.forward_dynamics_contacts_kokkevis(
            &mut model, &q, &qdot, &tau, &mut qddot_kokkevis,
        );
        assert_relative_eq!(qddot_direct, qddot_kokkevis, epsilon = 1.0e-8);
    }

    #[test]
    fn contact_on_a_fixed_body_resolves_through_its_movable_parent() {
        let mut model = test_models::double_pendulum();
        let foot = model.add_body(
            2,
            SpatialTransform::translation(vector![0.0, -1.0, 0.0]),
            Joint::Fixed,
            RigidBody::new(0.1, vector![0.0, 0.0, 0.0], na::Matrix3::identity() * 1.0e-3),
        );
        assert!(model.is_fixed_body_id(foot));

        let run = |kokkevis: bool, model: &mut crate::dynamics::Model| {
            let mut set = ConstraintSet::new();
            set.add_contact_constraint(foot, vector![0.0, 0.0, 0.0], vector![0.0, 1.0, 0.0], None, false);
            set.bind(model);
            let (q, qdot, tau) = {
                let mut q = model.neutral_q();
                q[0] = 0.2;
                q[1] = -0.3;
                let mut qdot = model.zero_qdot();
                qdot[0] = 0.5;
                (q, qdot, model.zero_qdot())
            };
            let mut qddot = model.zero_qdot();
            if kokkevis {
                set.forward_dynamics_contacts_kokkevis(model, &q, &qdot, &tau, &mut qddot);
            } else {
                set.forward_dynamics_constraints_direct(model, &q, &qdot, &tau, &mut qddot, None);
            }
            qddot
        };

        let qddot_direct = run(false, &mut model);
        let qddot_kokkevis = run(true, &mut model);
        assert_relative_eq!(qddot_direct, qddot_kokkevis, epsilon = 1.0e-8);
    }

    #[test]
    #[should_panic(expected = "must be contact constraints")]
    fn mixed_constraint_sets_are_rejected() {
        let mut model = test_models::double_pendulum();
        let mut set = ConstraintSet::new();
        set.add_contact_constraint(2, vector![0.0, -1.0, 0.0], vector![0.0, 1.0, 0.0], None, false);
        set.add_loop_constraint(
            0,
            2,
            SpatialTransform::identity(),
            SpatialTransform::identity(),
            crate::math::SpatialVector::new(0.0, 0.0, 0.0, 1.0, 0.0, 0.0),
            true,
            true,
            false,
            0.1,
            None,
            false,
        );
        set.bind(&model);
        let q = model.neutral_q();
        let qdot = model.zero_qdot();
        let tau = model.zero_qdot();
        let mut qddot = model.zero_qdot();
        set.forward_dynamics_contacts_kokkevis(&mut model, &q, &qdot, &tau, &mut qddot);
    }
}
