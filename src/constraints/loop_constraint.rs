//! Loop-closure constraints between two bodies of the tree.

use crate::constraints::{Constraint, ConstraintCache, ConstraintType};
use crate::dynamics::Model;
use crate::math::{cross_motion, join, Matrix, Real, SpatialTransform, SpatialVector, Vector};
use na::{DMatrix, DVector};

/// A loop-closure constraint tying a frame on a predecessor body to a
/// frame on a successor body along one or more constraint axes.
///
/// Axes are expressed in the predecessor constraint frame. Each axis is
/// independently flagged for position-level and velocity-level
/// enforcement; all axes contribute acceleration-level rows.
pub struct LoopConstraint {
    name: Option<String>,
    row: usize,
    id_predecessor: usize,
    id_successor: usize,
    x_predecessor: SpatialTransform,
    x_successor: SpatialTransform,
    axes: Vec<SpatialVector>,
    position_level: Vec<bool>,
    velocity_level: Vec<bool>,
    stab_enabled: bool,
    stab_tau: Real,
}

impl LoopConstraint {
    /// Creates a loop constraint between `id_predecessor` and
    /// `id_successor`, with attachment frames `x_predecessor` /
    /// `x_successor` expressed in the respective body frames and a first
    /// constraint axis in predecessor-frame coordinates.
    pub fn new(
        id_predecessor: usize,
        id_successor: usize,
        x_predecessor: SpatialTransform,
        x_successor: SpatialTransform,
        axis: SpatialVector,
        position_level: bool,
        velocity_level: bool,
        name: Option<&str>,
    ) -> Self {
        LoopConstraint {
            name: name.map(str::to_owned),
            row: 0,
            id_predecessor,
            id_successor,
            x_predecessor,
            x_successor,
            axes: vec![axis],
            position_level: vec![position_level],
            velocity_level: vec![velocity_level],
            stab_enabled: false,
            stab_tau: 0.1,
        }
    }

    /// The (predecessor, successor) body pair.
    pub fn body_ids(&self) -> (usize, usize) {
        (self.id_predecessor, self.id_successor)
    }

    /// The attachment frames on the predecessor and successor bodies.
    pub fn body_frames(&self) -> (&SpatialTransform, &SpatialTransform) {
        (&self.x_predecessor, &self.x_successor)
    }

    /// The constraint axes, in predecessor-frame coordinates.
    pub fn axes(&self) -> &[SpatialVector] {
        &self.axes
    }

    /// Appends a constraint axis with its enforcement flags.
    pub fn append_axis(&mut self, axis: SpatialVector, position_level: bool, velocity_level: bool) {
        self.axes.push(axis);
        self.position_level.push(position_level);
        self.velocity_level.push(velocity_level);
    }

    /// The world rotation and world origin of the constraint frame
    /// attached to `body` through `frame`.
    fn frame_in_base(&self, model: &Model, body: usize, frame: &SpatialTransform) -> (Matrix, Vector) {
        // Columns of the returned matrix are the frame axes in base
        // coordinates.
        let rot = model.base_orientation(body).transpose() * frame.rot.transpose();
        let origin = model.body_to_base(body, &frame.trans);
        (rot, origin)
    }

    /// An axis expressed in base coordinates, rotating both its angular
    /// and linear parts by the predecessor constraint frame.
    fn axis_in_base(&self, rot: &Matrix, axis: &SpatialVector) -> SpatialVector {
        let (w, l) = crate::math::split(axis);
        join(&(rot * w), &(rot * l))
    }
}

impl Constraint for LoopConstraint {
    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn constraint_type(&self) -> ConstraintType {
        ConstraintType::Loop
    }

    fn size(&self) -> usize {
        self.axes.len()
    }

    fn row_offset(&self) -> usize {
        self.row
    }

    fn set_row_offset(&mut self, row: usize) {
        self.row = row;
    }

    fn bind(&mut self, model: &Model) {
        assert!(
            model.movable_body_id(self.id_predecessor) < model.body_count()
                && model.movable_body_id(self.id_successor) < model.body_count(),
            "loop constraint references an unknown body"
        );
    }

    fn calc_position_error(
        &self,
        model: &Model,
        _q: &DVector<Real>,
        err: &mut DVector<Real>,
        _cache: &mut ConstraintCache,
    ) {
        let (rot_p, pos_p) = self.frame_in_base(model, self.id_predecessor, &self.x_predecessor);
        let (rot_s, pos_s) = self.frame_in_base(model, self.id_successor, &self.x_successor);

        // Relative rotation of the two constraint frames; its
        // skew-symmetric part approximates the rotation error, which is
        // exact for the small violations a stabilized simulation sees.
        let rot_ps = rot_s.transpose() * rot_p;
        let d = SpatialVector::new(
            -0.5 * (rot_ps[(1, 2)] - rot_ps[(2, 1)]),
            -0.5 * (rot_ps[(2, 0)] - rot_ps[(0, 2)]),
            -0.5 * (rot_ps[(0, 1)] - rot_ps[(1, 0)]),
            0.0,
            0.0,
            0.0,
        ) + join(&Vector::zeros(), &(rot_p.transpose() * (pos_s - pos_p)));

        for (k, axis) in self.axes.iter().enumerate() {
            err[self.row + k] = if self.position_level[k] { axis.dot(&d) } else { 0.0 };
        }
    }

    fn calc_jacobian(
        &self,
        model: &Model,
        _q: &DVector<Real>,
        g: &mut DMatrix<Real>,
        cache: &mut ConstraintCache,
    ) {
        cache.mat6_a.fill(0.0);
        cache.mat6_b.fill(0.0);
        model.point_jacobian_6d(self.id_predecessor, &self.x_predecessor.trans, &mut cache.mat6_a);
        model.point_jacobian_6d(self.id_successor, &self.x_successor.trans, &mut cache.mat6_b);

        let (rot_p, _) = self.frame_in_base(model, self.id_predecessor, &self.x_predecessor);
        for (k, axis) in self.axes.iter().enumerate() {
            let axis_base = self.axis_in_base(&rot_p, axis);
            for col in 0..g.ncols() {
                let mut value = 0.0;
                for r in 0..6 {
                    value += axis_base[r] * (cache.mat6_b[(r, col)] - cache.mat6_a[(r, col)]);
                }
                g[(self.row + k, col)] = value;
            }
        }
    }

    fn calc_velocity_error(
        &self,
        _model: &Model,
        _q: &DVector<Real>,
        qdot: &DVector<Real>,
        g: &DMatrix<Real>,
        errd: &mut DVector<Real>,
        _cache: &mut ConstraintCache,
    ) {
        for k in 0..self.axes.len() {
            if self.velocity_level[k] {
                let mut value = 0.0;
                for col in 0..g.ncols() {
                    value += g[(self.row + k, col)] * qdot[col];
                }
                errd[self.row + k] = value;
            } else {
                errd[self.row + k] = 0.0;
            }
        }
    }

    fn calc_gamma(
        &self,
        model: &Model,
        _q: &DVector<Real>,
        _qdot: &DVector<Real>,
        _g: &DMatrix<Real>,
        gamma: &mut DVector<Real>,
        _cache: &mut ConstraintCache,
    ) {
        let (rot_p, _) = self.frame_in_base(model, self.id_predecessor, &self.x_predecessor);
        let vel_p = model.point_velocity_6d(self.id_predecessor, &self.x_predecessor.trans);
        let vel_s = model.point_velocity_6d(self.id_successor, &self.x_successor.trans);
        // Velocity-product accelerations: the registry ran a
        // zero-acceleration kinematics sweep before this pass.
        let acc_p = model.point_acceleration_6d(self.id_predecessor, &self.x_predecessor.trans);
        let acc_s = model.point_acceleration_6d(self.id_successor, &self.x_successor.trans);
        let vel_rel = vel_s - vel_p;

        for (k, axis) in self.axes.iter().enumerate() {
            let axis_base = self.axis_in_base(&rot_p, axis);
            // The axis rides on the predecessor frame, so its rate of
            // change is the predecessor velocity crossed with it.
            let axis_dot = cross_motion(&vel_p, &axis_base);
            gamma[self.row + k] = -axis_base.dot(&(acc_s - acc_p)) - axis_dot.dot(&vel_rel);
        }
    }

    fn stabilization_enabled(&self) -> bool {
        self.stab_enabled
    }

    fn set_stabilization_enabled(&mut self, enabled: bool) {
        self.stab_enabled = enabled;
    }

    fn stabilization_time_constant(&self) -> Real {
        self.stab_tau
    }

    fn set_stabilization_time_constant(&mut self, tau: Real) {
        self.stab_tau = tau;
    }
}
