//! Constraint-consistent assembly: projecting a configuration or velocity
//! onto the constraint manifold.

use crate::constraints::ConstraintSet;
use crate::dynamics::{Joint, Model};
use crate::linalg::solve_linear_system;
use crate::math::{Real, Vector};
use na::{DMatrix, DVector, Quaternion, UnitQuaternion};
use thiserror::Error;

/// Failure of the iterative assembly projection.
///
/// Non-convergence is a recoverable outcome, not a caller error: the best
/// available iterate has been written to the output and the caller decides
/// whether to retry with a looser tolerance or a better initial guess.
#[derive(Debug, Error)]
pub enum AssemblyError {
    /// The iteration ceiling was reached before the error and step norms
    /// fell below the tolerance.
    #[error("assembly did not converge within {max_iterations} iterations (residual {residual})")]
    NotConverged {
        /// The iteration ceiling that was hit.
        max_iterations: usize,
        /// The position-error norm of the final iterate.
        residual: Real,
    },
}

impl ConstraintSet {
    /// Finds a configuration near `q_init` satisfying all position-level
    /// constraints, by damped Gauss-Newton iteration on the weighted
    /// minimum-displacement problem.
    ///
    /// Each step solves the augmented system
    /// `[[diag(weights), Gᵀ], [G, 0]] · [δ; μ] = [0; -err]` and applies
    /// `δ` to the configuration — additively for ordinary joints, as a
    /// quaternion increment (renormalized) for spherical joints. Iteration
    /// stops once both the error norm and the step norm fall below
    /// `tolerance`. On non-convergence the best iterate is still written
    /// to `q`.
    pub fn calc_assembly_q(
        &mut self,
        model: &mut Model,
        q_init: &DVector<Real>,
        q: &mut DVector<Real>,
        weights: &DVector<Real>,
        tolerance: Real,
        max_iterations: usize,
    ) -> Result<(), AssemblyError> {
        assert!(self.bound, "the constraint set must be bound");
        assert_eq!(q.len(), model.q_size(), "Q vector of the wrong size.");
        assert_eq!(q_init.len(), model.q_size(), "QInit vector of the wrong size.");
        assert_eq!(weights.len(), model.dof_count(), "weights vector of the wrong size.");

        let n = model.dof_count();
        let m = self.size();

        // Assembly happens at initialization time, outside the
        // zero-allocation step path, so local buffers are fine here.
        let mut a = DMatrix::zeros(n + m, n + m);
        let mut b = DVector::zeros(n + m);
        let mut x = DVector::zeros(n + m);
        let mut d = DVector::zeros(n);
        let mut q_cur = q_init.clone();

        for i in 0..n {
            a[(i, i)] = weights[i];
        }

        self.update_position_error(model, &q_cur, true);
        if self.err.norm() < tolerance {
            q.copy_from(&q_cur);
            return Ok(());
        }

        for iteration in 0..max_iterations {
            self.update_jacobian(model, &q_cur, true);
            a.view_mut((n, 0), (m, n)).copy_from(&self.g);
            a.view_mut((0, n), (n, m)).copy_from(&self.g.transpose());
            b.rows_mut(n, m).copy_from(&(-&self.err));

            solve_linear_system(&a, &b, &mut x, self.linear_solver);
            d.copy_from(&x.rows(0, n));

            apply_displacement(model, &mut q_cur, &d);

            self.update_position_error(model, &q_cur, true);
            log::trace!(
                "assembly iteration {}: |err| = {}, |step| = {}",
                iteration,
                self.err.norm(),
                d.norm()
            );
            if self.err.norm() < tolerance && d.norm() < tolerance {
                q.copy_from(&q_cur);
                return Ok(());
            }
        }

        q.copy_from(&q_cur);
        Err(AssemblyError::NotConverged {
            max_iterations,
            residual: self.err.norm(),
        })
    }

    /// Finds the velocity closest to `qdot_init` (in the weighted norm)
    /// that satisfies all velocity-level constraints at the configuration
    /// `q`. Velocity constraints are linear, so a single solve is exact.
    pub fn calc_assembly_qdot(
        &mut self,
        model: &mut Model,
        q: &DVector<Real>,
        qdot_init: &DVector<Real>,
        qdot: &mut DVector<Real>,
        weights: &DVector<Real>,
    ) {
        assert!(self.bound, "the constraint set must be bound");
        assert_eq!(q.len(), model.q_size(), "Q vector of the wrong size.");
        assert_eq!(qdot.len(), model.dof_count(), "QDot vector of the wrong size.");
        assert_eq!(qdot_init.len(), qdot.len(), "QDotInit vector of the wrong size.");
        assert_eq!(weights.len(), qdot.len(), "weights vector of the wrong size.");

        let n = model.dof_count();
        let m = self.size();
        let mut a = DMatrix::zeros(n + m, n + m);
        let mut b = DVector::zeros(n + m);
        let mut x = DVector::zeros(n + m);

        for i in 0..n {
            a[(i, i)] = weights[i];
            b[i] = weights[i] * qdot_init[i];
        }
        self.update_jacobian(model, q, true);
        a.view_mut((n, 0), (m, n)).copy_from(&self.g);
        a.view_mut((0, n), (n, m)).copy_from(&self.g.transpose());

        solve_linear_system(&a, &b, &mut x, self.linear_solver);
        qdot.copy_from(&x.rows(0, n));
    }
}

/// Applies a joint-space displacement to a configuration, handling the
/// quaternion coordinates of spherical joints.
fn apply_displacement(model: &Model, q: &mut DVector<Real>, d: &DVector<Real>) {
    for i in 1..model.body_count() {
        let qi = model.q_index[i];
        match &model.joints[i] {
            Joint::Spherical => {
                let quat = model.joint_quaternion(i, q);
                let omega = Vector::new(d[qi], d[qi + 1], d[qi + 2]);
                // First-order quaternion increment for a body-frame
                // angular displacement, renormalized afterwards.
                let derivative =
                    quat.quaternion() * Quaternion::new(0.0, omega.x, omega.y, omega.z) * 0.5;
                let updated = UnitQuaternion::from_quaternion(quat.quaternion() + derivative);
                model.set_joint_quaternion(i, &updated, q);
            }
            joint => {
                for k in 0..joint.dof_count() {
                    q[qi + k] += d[qi + k];
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use crate::constraints::{AssemblyError, ConstraintSet};
    use crate::math::{Real, SpatialTransform, SpatialVector};
    use crate::test_models;
    use approx::assert_relative_eq;
    use na::{vector, DVector};

    /// Pins the tip of the second pendulum link to its resting location
    /// along the x and z directions.
    fn pinned_pendulum() -> (crate::dynamics::Model, ConstraintSet) {
        let mut model = test_models::double_pendulum();
        let mut set = ConstraintSet::new();
        for axis in [
            SpatialVector::new(0.0, 0.0, 0.0, 1.0, 0.0, 0.0),
            SpatialVector::new(0.0, 0.0, 0.0, 0.0, 0.0, 1.0),
        ] {
            set.add_loop_constraint(
                0,
                2,
                SpatialTransform::translation(vector![0.0, -2.0, 0.0]),
                SpatialTransform::translation(vector![0.0, -1.0, 0.0]),
                axis,
                true,
                true,
                false,
                0.1,
                None,
                true,
            );
        }
        set.bind(&model);
        (model, set)
    }

    #[test]
    fn satisfying_guess_returns_immediately_unchanged() {
        let (mut model, mut set) = pinned_pendulum();
        let q_init = model.neutral_q();
        let mut q = model.neutral_q();
        let weights = DVector::from_element(model.dof_count(), 1.0);

        let result = set.calc_assembly_q(&mut model, &q_init, &mut q, &weights, 1.0e-10, 0);
        assert!(result.is_ok());
        assert_relative_eq!(q, q_init);
    }

    #[test]
    fn small_offset_converges_to_tolerance() {
        let (mut model, mut set) = pinned_pendulum();
        let mut q_init = model.neutral_q();
        q_init[0] = 0.08;
        q_init[1] = -0.05;
        let mut q = model.neutral_q();
        let weights = DVector::from_element(model.dof_count(), 1.0);

        set.calc_assembly_q(&mut model, &q_init, &mut q, &weights, 1.0e-10, 20)
            .expect("assembly should converge");
        set.update_position_error(&mut model, &q, true);
        assert!(set.err.norm() < 1.0e-10);
    }

    #[test]
    fn exhausted_iteration_budget_reports_failure_with_best_iterate() {
        let (mut model, mut set) = pinned_pendulum();
        let mut q_init = model.neutral_q();
        q_init[0] = 0.4;
        let mut q = model.neutral_q();
        let weights = DVector::from_element(model.dof_count(), 1.0);

        let result = set.calc_assembly_q(&mut model, &q_init, &mut q, &weights, 1.0e-12, 1);
        match result {
            Err(AssemblyError::NotConverged { max_iterations, residual }) => {
                assert_eq!(max_iterations, 1);
                assert!(residual > 0.0);
            }
            Ok(()) => panic!("a single iteration cannot reach 1e-12 from 0.4 rad"),
        }
        // The best iterate is still written back and improves the guess.
        set.update_position_error(&mut model, &q_init, true);
        let initial_err = set.err.norm();
        set.update_position_error(&mut model, &q, true);
        assert!(set.err.norm() < initial_err);
    }

    #[test]
    fn velocity_projection_is_exact() {
        let (mut model, mut set) = pinned_pendulum();
        let q = model.neutral_q();
        let qdot_init = DVector::from_row_slice(&[0.7, -0.3]);
        let mut qdot = model.zero_qdot();
        let weights = DVector::from_element(model.dof_count(), 1.0);

        set.calc_assembly_qdot(&mut model, &q, &qdot_init, &mut qdot, &weights);
        assert_relative_eq!(
            &set.g * &qdot,
            DVector::zeros(set.size()),
            epsilon = 1.0e-10
        );
    }

    #[test]
    fn spherical_joints_take_the_quaternion_update_path() {
        let mut model = test_models::spherical_chain();
        let mut set = ConstraintSet::new();
        // Keep the chain tip on the x = 0 and z = 0 planes.
        for axis in [
            SpatialVector::new(0.0, 0.0, 0.0, 1.0, 0.0, 0.0),
            SpatialVector::new(0.0, 0.0, 0.0, 0.0, 0.0, 1.0),
        ] {
            set.add_loop_constraint(
                0,
                2,
                SpatialTransform::translation(vector![0.0, -1.6, 0.0]),
                SpatialTransform::translation(vector![0.0, -0.6, 0.0]),
                axis,
                true,
                true,
                false,
                0.1,
                None,
                true,
            );
        }
        set.bind(&model);

        let mut q_init = model.neutral_q();
        model.set_joint_quaternion(
            1,
            &na::UnitQuaternion::from_euler_angles(0.06, 0.0, -0.04),
            &mut q_init,
        );
        q_init[3] = 0.05;
        let mut q = model.neutral_q();
        let weights = DVector::from_element(model.dof_count(), 1.0);

        set.calc_assembly_q(&mut model, &q_init, &mut q, &weights, 1.0e-9, 30)
            .expect("assembly should converge");
        set.update_position_error(&mut model, &q, true);
        assert!(set.err.norm() < 1.0e-9);

        let quat = model.joint_quaternion(1, &q);
        assert_relative_eq!(quat.norm(), 1.0 as Real, epsilon = 1.0e-12);
    }
}
