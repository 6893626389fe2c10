//! The per-constraint contract shared by all constraint variants.

use crate::dynamics::Model;
use crate::math::Real;
use na::{DMatrix, DVector};

/// The kind of a registered constraint, recorded per row for diagnostics.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConstraintType {
    /// A point-contact constraint.
    Contact,
    /// A loop-closure constraint.
    Loop,
    /// A caller-supplied constraint.
    Custom,
}

/// Working memory shared by the constraint evaluations.
///
/// Sized once when the constraint set is bound so that per-step evaluation
/// never allocates.
#[derive(Clone, Debug)]
pub struct ConstraintCache {
    /// 3 x DoF scratch, used for translational point Jacobians.
    pub mat3_a: DMatrix<Real>,
    /// 6 x DoF scratch, used for spatial point Jacobians.
    pub mat6_a: DMatrix<Real>,
    /// 6 x DoF scratch, used for spatial point Jacobians.
    pub mat6_b: DMatrix<Real>,
    /// DoF-length scratch, free for custom constraints.
    pub vec_a: DVector<Real>,
}

impl Default for ConstraintCache {
    fn default() -> Self {
        ConstraintCache {
            mat3_a: DMatrix::zeros(3, 0),
            mat6_a: DMatrix::zeros(6, 0),
            mat6_b: DMatrix::zeros(6, 0),
            vec_a: DVector::zeros(0),
        }
    }
}

impl ConstraintCache {
    pub(crate) fn resize(&mut self, dof_count: usize) {
        self.mat3_a = DMatrix::zeros(3, dof_count);
        self.mat6_a = DMatrix::zeros(6, dof_count);
        self.mat6_b = DMatrix::zeros(6, dof_count);
        self.vec_a = DVector::zeros(dof_count);
    }

    pub(crate) fn set_zero(&mut self) {
        self.mat3_a.fill(0.0);
        self.mat6_a.fill(0.0);
        self.mat6_b.fill(0.0);
        self.vec_a.fill(0.0);
    }
}

/// A constraint contributing one or more rows to the global constraint
/// space of a [`super::ConstraintSet`].
///
/// Implementations write into the global error/Jacobian/bias structures at
/// their assigned row offset. The registry refreshes the model kinematics
/// before each evaluation pass, so the methods read cached model state
/// only; in particular [`Constraint::calc_gamma`] runs after a
/// zero-acceleration kinematics sweep and sees pure velocity-product
/// accelerations.
pub trait Constraint {
    /// The diagnostic name of this constraint, if any.
    fn name(&self) -> Option<&str>;

    /// The variant tag recorded for each of this constraint's rows.
    fn constraint_type(&self) -> ConstraintType;

    /// The number of rows this constraint occupies.
    fn size(&self) -> usize;

    /// The first global row assigned to this constraint.
    fn row_offset(&self) -> usize;

    /// Records the assigned global row range. Called once at registration.
    fn set_row_offset(&mut self, row: usize);

    /// Resolves body references against the final model topology. Called
    /// once when the constraint set is bound.
    fn bind(&mut self, model: &Model);

    /// Writes the geometric constraint violation into `err` at this
    /// constraint's rows.
    fn calc_position_error(
        &self,
        model: &Model,
        q: &DVector<Real>,
        err: &mut DVector<Real>,
        cache: &mut ConstraintCache,
    );

    /// Writes the constraint Jacobian rows into `g`.
    fn calc_jacobian(
        &self,
        model: &Model,
        q: &DVector<Real>,
        g: &mut DMatrix<Real>,
        cache: &mut ConstraintCache,
    );

    /// Writes the constraint-velocity violation into `errd`, given the
    /// current Jacobian.
    fn calc_velocity_error(
        &self,
        model: &Model,
        q: &DVector<Real>,
        qdot: &DVector<Real>,
        g: &DMatrix<Real>,
        errd: &mut DVector<Real>,
        cache: &mut ConstraintCache,
    );

    /// Writes the constraint bias term (the Jacobian-derivative effect)
    /// into `gamma`.
    fn calc_gamma(
        &self,
        model: &Model,
        q: &DVector<Real>,
        qdot: &DVector<Real>,
        g: &DMatrix<Real>,
        gamma: &mut DVector<Real>,
        cache: &mut ConstraintCache,
    );

    /// Whether drift stabilization is enabled for this constraint.
    fn stabilization_enabled(&self) -> bool {
        false
    }

    /// Enables or disables drift stabilization.
    fn set_stabilization_enabled(&mut self, _enabled: bool) {}

    /// The stabilization time constant.
    fn stabilization_time_constant(&self) -> Real {
        0.1
    }

    /// Sets the stabilization time constant.
    fn set_stabilization_time_constant(&mut self, _tau: Real) {}

    /// Adds the stabilization feedback `-2/τ·errd - 1/τ²·err` to this
    /// constraint's rows of `gamma`.
    fn add_stabilization(
        &self,
        err: &DVector<Real>,
        errd: &DVector<Real>,
        gamma: &mut DVector<Real>,
    ) {
        let tau = self.stabilization_time_constant();
        let (pos_gain, vel_gain) = (1.0 / (tau * tau), 2.0 / tau);
        let row = self.row_offset();
        for r in row..row + self.size() {
            gamma[r] += -vel_gain * errd[r] - pos_gain * err[r];
        }
    }
}
