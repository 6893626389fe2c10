//! Kinematic state propagation and point-level queries on the tree.

use crate::dynamics::model::FIXED_BODY_BASE;
use crate::dynamics::{Joint, Model};
use crate::math::{
    cross_motion, join, Matrix, Real, SpatialTransform, SpatialVector, Vector,
};
use na::{DMatrix, DVector};

impl Model {
    /// Updates the joint transform, motion subspace and (when `qdot` is
    /// given) the joint velocity of body `i`.
    pub(crate) fn joint_calc(&mut self, i: usize, q: &DVector<Real>, qdot: Option<&DVector<Real>>) {
        let Model {
            joints,
            q_index,
            w_index,
            x_tree,
            x_lambda,
            s,
            s3,
            v_joint,
            custom_index,
            custom_state,
            ..
        } = self;
        let qi = q_index[i];

        match &joints[i] {
            Joint::Revolute { axis } => {
                let x_joint = SpatialTransform::rotation_axis(q[qi], axis);
                s[i] = SpatialVector::new(axis.x, axis.y, axis.z, 0.0, 0.0, 0.0);
                x_lambda[i] = x_joint * x_tree[i];
                v_joint[i] = match qdot {
                    Some(qd) => s[i] * qd[qi],
                    None => SpatialVector::zeros(),
                };
            }
            Joint::Prismatic { axis } => {
                let x_joint = SpatialTransform::translation(axis.into_inner() * q[qi]);
                s[i] = SpatialVector::new(0.0, 0.0, 0.0, axis.x, axis.y, axis.z);
                x_lambda[i] = x_joint * x_tree[i];
                v_joint[i] = match qdot {
                    Some(qd) => s[i] * qd[qi],
                    None => SpatialVector::zeros(),
                };
            }
            Joint::Spherical => {
                let quat = na::Quaternion::new(q[w_index[i]], q[qi], q[qi + 1], q[qi + 2]);
                let rot = na::UnitQuaternion::from_quaternion(quat).to_rotation_matrix();
                let x_joint = SpatialTransform::rotation(rot.matrix().transpose());
                s3[i].fill(0.0);
                s3[i].fixed_view_mut::<3, 3>(0, 0).copy_from(&Matrix::identity());
                x_lambda[i] = x_joint * x_tree[i];
                v_joint[i] = match qdot {
                    Some(qd) => SpatialVector::new(qd[qi], qd[qi + 1], qd[qi + 2], 0.0, 0.0, 0.0),
                    None => SpatialVector::zeros(),
                };
            }
            Joint::Translational => {
                let x_joint =
                    SpatialTransform::translation(Vector::new(q[qi], q[qi + 1], q[qi + 2]));
                s3[i].fill(0.0);
                s3[i].fixed_view_mut::<3, 3>(3, 0).copy_from(&Matrix::identity());
                x_lambda[i] = x_joint * x_tree[i];
                v_joint[i] = match qdot {
                    Some(qd) => SpatialVector::new(0.0, 0.0, 0.0, qd[qi], qd[qi + 1], qd[qi + 2]),
                    None => SpatialVector::zeros(),
                };
            }
            Joint::Fixed => unreachable!("fixed joints are merged at model construction"),
            Joint::Custom(joint) => {
                let state = &mut custom_state[custom_index[i]];
                let dofs = joint.dof_count();
                let mut x_joint = SpatialTransform::identity();
                let zeros = vec![0.0; dofs];
                let qdot_slice = match qdot {
                    Some(qd) => qd.as_slice()[qi..qi + dofs].to_vec(),
                    None => zeros,
                };
                joint.update(
                    &q.as_slice()[qi..qi + dofs],
                    &qdot_slice,
                    &mut x_joint,
                    &mut state.s,
                    &mut state.c_j,
                );
                x_lambda[i] = x_joint * x_tree[i];
                v_joint[i] = match qdot {
                    Some(qd) => {
                        let mut v = SpatialVector::zeros();
                        for k in 0..dofs {
                            v += state.s.column(k) * qd[qi + k];
                        }
                        v
                    }
                    None => SpatialVector::zeros(),
                };
            }
        }
    }

    /// Selectively updates the kinematic state of the model.
    ///
    /// Any combination of the position, velocity and acceleration sections
    /// may be refreshed; each section reuses whatever the previous sections
    /// left cached. Passing only `qddot` recomputes body accelerations from
    /// the cached transforms and velocities, which is how constraint bias
    /// terms are evaluated against a zero-acceleration sweep.
    pub fn update_kinematics(
        &mut self,
        q: Option<&DVector<Real>>,
        qdot: Option<&DVector<Real>>,
        qddot: Option<&DVector<Real>>,
    ) {
        let nb = self.body_count();

        if let Some(q) = q {
            assert_eq!(q.len(), self.q_size(), "Q vector of the wrong size.");
            for i in 1..nb {
                self.joint_calc(i, q, qdot);
                let parent = self.parent[i];
                self.x_base[i] = self.x_lambda[i] * self.x_base[parent];
            }
        } else if qdot.is_some() {
            // Refresh joint velocities from the cached motion subspaces.
            let qd = qdot.unwrap();
            for i in 1..nb {
                let qi = self.q_index[i];
                self.v_joint[i] = match &self.joints[i] {
                    Joint::Revolute { .. } | Joint::Prismatic { .. } => self.s[i] * qd[qi],
                    Joint::Spherical | Joint::Translational => {
                        self.s3[i] * Vector::new(qd[qi], qd[qi + 1], qd[qi + 2])
                    }
                    Joint::Fixed => unreachable!(),
                    Joint::Custom(joint) => {
                        let state = &self.custom_state[self.custom_index[i]];
                        let mut v = SpatialVector::zeros();
                        for k in 0..joint.dof_count() {
                            v += state.s.column(k) * qd[qi + k];
                        }
                        v
                    }
                };
            }
        }

        if let Some(qd) = qdot {
            assert_eq!(qd.len(), self.dof_count(), "QDot vector of the wrong size.");
            self.v[0] = SpatialVector::zeros();
            for i in 1..nb {
                let parent = self.parent[i];
                let bias = match &self.joints[i] {
                    Joint::Custom(_) => self.custom_state[self.custom_index[i]].c_j,
                    _ => SpatialVector::zeros(),
                };
                self.v[i] = self.x_lambda[i].apply(&self.v[parent]) + self.v_joint[i];
                self.c[i] = bias + cross_motion(&self.v[i], &self.v_joint[i]);
            }
        }

        if let Some(qdd) = qddot {
            assert_eq!(qdd.len(), self.dof_count(), "QDDot vector of the wrong size.");
            self.a[0] = SpatialVector::zeros();
            for i in 1..nb {
                let parent = self.parent[i];
                let qi = self.q_index[i];
                let mut acc = self.x_lambda[i].apply(&self.a[parent]) + self.c[i];
                match &self.joints[i] {
                    Joint::Revolute { .. } | Joint::Prismatic { .. } => {
                        acc += self.s[i] * qdd[qi];
                    }
                    Joint::Spherical | Joint::Translational => {
                        acc += self.s3[i] * Vector::new(qdd[qi], qdd[qi + 1], qdd[qi + 2]);
                    }
                    Joint::Fixed => unreachable!(),
                    Joint::Custom(joint) => {
                        let state = &self.custom_state[self.custom_index[i]];
                        for k in 0..joint.dof_count() {
                            acc += state.s.column(k) * qdd[qi + k];
                        }
                    }
                }
                self.a[i] = acc;
            }
        }
    }

    /// Recomputes all body-to-base transforms from the cached joint
    /// transforms. Needed after routines that refresh joint transforms
    /// without propagating them to the base.
    pub fn refresh_base_transforms(&mut self) {
        for i in 1..self.body_count() {
            let parent = self.parent[i];
            self.x_base[i] = self.x_lambda[i] * self.x_base[parent];
        }
    }

    /// Resolves a (possibly fixed) body id and body-local point to the
    /// movable body carrying it and the point expressed in that body's
    /// frame.
    pub(crate) fn resolve_point(&self, body_id: usize, point: &Vector) -> (usize, Vector) {
        if self.is_fixed_body_id(body_id) {
            let fixed = &self.fixed_bodies[body_id - FIXED_BODY_BASE];
            (fixed.movable_parent, fixed.x_parent.point_to_source(point))
        } else {
            (body_id, *point)
        }
    }

    /// The orientation of `body_id` as a base-to-body coordinate rotation.
    pub fn base_orientation(&self, body_id: usize) -> Matrix {
        if self.is_fixed_body_id(body_id) {
            let fixed = &self.fixed_bodies[body_id - FIXED_BODY_BASE];
            fixed.x_parent.rot * self.x_base[fixed.movable_parent].rot
        } else {
            self.x_base[body_id].rot
        }
    }

    /// Maps a body-local point to base coordinates.
    pub fn body_to_base(&self, body_id: usize, point: &Vector) -> Vector {
        let (body, point) = self.resolve_point(body_id, point);
        self.x_base[body].point_to_source(&point)
    }

    /// The transform from body coordinates to a base-aligned frame located
    /// at the given body-local point.
    fn point_frame(&self, body: usize, point: &Vector) -> SpatialTransform {
        SpatialTransform {
            rot: self.x_base[body].rot.transpose(),
            trans: *point,
        }
    }

    /// The 6D spatial velocity of a body-local point, expressed in a
    /// base-aligned frame at that point.
    pub fn point_velocity_6d(&self, body_id: usize, point: &Vector) -> SpatialVector {
        let (body, point) = self.resolve_point(body_id, point);
        self.point_frame(body, &point).apply(&self.v[body])
    }

    /// The linear velocity of a body-local point in base coordinates.
    pub fn point_velocity(&self, body_id: usize, point: &Vector) -> Vector {
        let v = self.point_velocity_6d(body_id, point);
        Vector::new(v[3], v[4], v[5])
    }

    /// The 6D acceleration of a body-local point expressed in a
    /// base-aligned frame at that point; the linear rows carry the
    /// classical point acceleration.
    pub fn point_acceleration_6d(&self, body_id: usize, point: &Vector) -> SpatialVector {
        let (body, point) = self.resolve_point(body_id, point);
        let frame = self.point_frame(body, &point);
        let pv = frame.apply(&self.v[body]);
        let (w, vl) = crate::math::split(&pv);
        let classical = w.cross(&vl);
        frame.apply(&self.a[body]) + join(&Vector::zeros(), &classical)
    }

    /// The classical linear acceleration of a body-local point in base
    /// coordinates.
    pub fn point_acceleration(&self, body_id: usize, point: &Vector) -> Vector {
        let a = self.point_acceleration_6d(body_id, point);
        Vector::new(a[3], a[4], a[5])
    }

    /// Writes the translational point Jacobian into `out` (3 x DoF).
    ///
    /// Only the columns of joints supporting the body are written; the
    /// caller zeroes `out` beforehand.
    pub fn point_jacobian(&self, body_id: usize, point: &Vector, out: &mut DMatrix<Real>) {
        assert_eq!(out.nrows(), 3, "Jacobian matrix of the wrong size.");
        assert_eq!(out.ncols(), self.dof_count(), "Jacobian matrix of the wrong size.");
        self.fill_point_jacobian(body_id, point, |col, vec| {
            out[(0, col)] = vec[3];
            out[(1, col)] = vec[4];
            out[(2, col)] = vec[5];
        });
    }

    /// Writes the 6D point Jacobian into `out` (6 x DoF), angular rows on
    /// top. Only supporting columns are written.
    pub fn point_jacobian_6d(&self, body_id: usize, point: &Vector, out: &mut DMatrix<Real>) {
        assert_eq!(out.nrows(), 6, "Jacobian matrix of the wrong size.");
        assert_eq!(out.ncols(), self.dof_count(), "Jacobian matrix of the wrong size.");
        self.fill_point_jacobian(body_id, point, |col, vec| {
            for r in 0..6 {
                out[(r, col)] = vec[r];
            }
        });
    }

    fn fill_point_jacobian(
        &self,
        body_id: usize,
        point: &Vector,
        mut write_column: impl FnMut(usize, &SpatialVector),
    ) {
        let (body, point) = self.resolve_point(body_id, point);
        let point_base = self.x_base[body].point_to_source(&point);
        let point_trans = SpatialTransform::translation(point_base);

        let mut j = body;
        while j != 0 {
            let to_point = point_trans * self.x_base[j].inverse();
            let qi = self.q_index[j];
            match &self.joints[j] {
                Joint::Revolute { .. } | Joint::Prismatic { .. } => {
                    write_column(qi, &to_point.apply(&self.s[j]));
                }
                Joint::Spherical | Joint::Translational => {
                    for k in 0..3 {
                        let col = self.s3[j].column(k).into_owned();
                        write_column(qi + k, &to_point.apply(&col));
                    }
                }
                Joint::Fixed => unreachable!(),
                Joint::Custom(joint) => {
                    let state = &self.custom_state[self.custom_index[j]];
                    for k in 0..joint.dof_count() {
                        let col = state.s.column(k).into_owned();
                        write_column(qi + k, &to_point.apply(&col));
                    }
                }
            }
            j = self.parent[j];
        }
    }
}


#[cfg(test)]
mod test {
    use crate::test_models;
    use approx::assert_relative_eq;
    use na::DVector;

    #[test]
    fn point_velocity_matches_finite_difference_of_position() {
        let mut model = test_models::branched_arm();
        let mut q = model.neutral_q();
        for (i, qi) in q.iter_mut().enumerate() {
            *qi = 0.3 * (i as crate::math::Real + 1.0);
        }
        let mut qdot = model.zero_qdot();
        for (i, qd) in qdot.iter_mut().enumerate() {
            *qd = 0.1 - 0.05 * i as crate::math::Real;
        }

        let body = 3;
        let point = na::vector![0.1, -0.2, 0.3];

        model.update_kinematics(Some(&q), Some(&qdot), None);
        let vel = model.point_velocity(body, &point);

        let h = 1.0e-7;
        let q_plus = DVector::from_iterator(q.len(), q.iter().zip(qdot.iter()).map(|(qi, qd)| qi + h * qd));
        model.update_kinematics(Some(&q), None, None);
        let p0 = model.body_to_base(body, &point);
        model.update_kinematics(Some(&q_plus), None, None);
        let p1 = model.body_to_base(body, &point);

        assert_relative_eq!(vel, (p1 - p0) / h, epsilon = 1.0e-5);
    }

    #[test]
    fn point_jacobian_reproduces_point_velocity() {
        let mut model = test_models::branched_arm();
        let mut q = model.neutral_q();
        let mut qdot = model.zero_qdot();
        for i in 0..q.len() {
            q[i] = -0.2 + 0.15 * i as crate::math::Real;
        }
        for i in 0..qdot.len() {
            qdot[i] = 0.4 - 0.1 * i as crate::math::Real;
        }
        model.update_kinematics(Some(&q), Some(&qdot), None);

        let body = 4;
        let point = na::vector![0.0, -0.5, 0.1];
        let mut jac = na::DMatrix::zeros(3, model.dof_count());
        model.point_jacobian(body, &point, &mut jac);

        assert_relative_eq!(
            &jac * &qdot,
            DVector::from_column_slice(model.point_velocity(body, &point).as_slice()),
            epsilon = 1.0e-10
        );
    }
}
