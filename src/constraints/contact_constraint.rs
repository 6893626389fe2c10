//! Point-contact constraints restricting the acceleration of a body-fixed
//! point along a set of world-frame directions.

use crate::constraints::{Constraint, ConstraintCache, ConstraintType};
use crate::dynamics::Model;
use crate::math::{Real, SpatialVector, Vector};
use na::{DMatrix, DVector};

/// A contact constraint: a body-fixed point restricted along one or more
/// world-frame directions.
///
/// Several directions at the same point share one constraint object so the
/// point Jacobian is evaluated once for all of them.
pub struct ContactConstraint {
    name: Option<String>,
    row: usize,
    body_id: usize,
    body_point: Vector,
    normals: Vec<Vector>,
    /// World anchor the position error is measured against, when enabled.
    world_anchor: Vector,
    position_level: bool,
    stab_enabled: bool,
    stab_tau: Real,
    /// The movable body carrying the contact point, resolved at bind time.
    movable_body: usize,
}

impl ContactConstraint {
    /// Creates a contact constraint on `body_id` at the body-local
    /// `body_point`, restricted along the given world-frame directions.
    pub fn new(
        body_id: usize,
        body_point: Vector,
        normals: Vec<Vector>,
        name: Option<&str>,
    ) -> Self {
        assert!(!normals.is_empty(), "a contact constraint needs at least one direction");
        ContactConstraint {
            name: name.map(str::to_owned),
            row: 0,
            body_id,
            body_point,
            normals,
            world_anchor: Vector::zeros(),
            position_level: false,
            stab_enabled: false,
            stab_tau: 0.1,
            movable_body: 0,
        }
    }

    /// The id of the constrained body.
    pub fn body_id(&self) -> usize {
        self.body_id
    }

    /// The constrained point, in body coordinates.
    pub fn body_point(&self) -> &Vector {
        &self.body_point
    }

    /// The world-frame constraint directions.
    pub fn normals(&self) -> &[Vector] {
        &self.normals
    }

    /// Appends another constrained direction at the same point.
    pub fn append_normal(&mut self, normal: Vector) {
        self.normals.push(normal);
    }

    /// Measures position error against the given world anchor from now on.
    /// Without this, the constraint acts at the velocity/acceleration
    /// levels only and reports zero position error.
    pub fn enable_position_error(&mut self, world_anchor: Vector) {
        self.world_anchor = world_anchor;
        self.position_level = true;
    }

    /// The movable body the contact point is attached to (the body itself,
    /// or its movable parent for fixed bodies). Only valid once bound.
    pub(crate) fn movable_body(&self) -> usize {
        self.movable_body
    }

    /// Writes the spatial test force of every direction of this contact
    /// into `f_t` at this constraint's rows: a unit force along the
    /// direction, acting at the world position of the contact point.
    pub(crate) fn point_force_jacobians(&self, model: &Model, f_t: &mut [SpatialVector]) {
        let point_world = model.body_to_base(self.body_id, &self.body_point);
        for (k, normal) in self.normals.iter().enumerate() {
            let moment = point_world.cross(normal);
            f_t[self.row + k] = crate::math::join(&moment, normal);
        }
    }

    /// The classical acceleration of the contact point under the model's
    /// cached kinematic state.
    pub(crate) fn point_acceleration(&self, model: &Model) -> Vector {
        model.point_acceleration(self.body_id, &self.body_point)
    }

    /// Projects baseline point accelerations onto the constraint
    /// directions, writing the result into `a` at this constraint's rows.
    /// This is the negative of the constraint-acceleration error and the
    /// right-hand side of the contact-coupling system.
    pub(crate) fn point_acceleration_error(&self, point_accel: &[Vector], a: &mut DVector<Real>) {
        for (k, normal) in self.normals.iter().enumerate() {
            a[self.row + k] = normal.dot(&point_accel[self.row + k]);
        }
    }
}

impl Constraint for ContactConstraint {
    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn constraint_type(&self) -> ConstraintType {
        ConstraintType::Contact
    }

    fn size(&self) -> usize {
        self.normals.len()
    }

    fn row_offset(&self) -> usize {
        self.row
    }

    fn set_row_offset(&mut self, row: usize) {
        self.row = row;
    }

    fn bind(&mut self, model: &Model) {
        assert!(
            model.movable_body_id(self.body_id) < model.body_count(),
            "contact constraint references an unknown body"
        );
        self.movable_body = model.movable_body_id(self.body_id);
    }

    fn calc_position_error(
        &self,
        model: &Model,
        _q: &DVector<Real>,
        err: &mut DVector<Real>,
        _cache: &mut ConstraintCache,
    ) {
        if self.position_level {
            let offset = model.body_to_base(self.body_id, &self.body_point) - self.world_anchor;
            for (k, normal) in self.normals.iter().enumerate() {
                err[self.row + k] = normal.dot(&offset);
            }
        } else {
            for k in 0..self.normals.len() {
                err[self.row + k] = 0.0;
            }
        }
    }

    fn calc_jacobian(
        &self,
        model: &Model,
        _q: &DVector<Real>,
        g: &mut DMatrix<Real>,
        cache: &mut ConstraintCache,
    ) {
        cache.mat3_a.fill(0.0);
        model.point_jacobian(self.body_id, &self.body_point, &mut cache.mat3_a);
        for (k, normal) in self.normals.iter().enumerate() {
            for col in 0..g.ncols() {
                g[(self.row + k, col)] = normal.x * cache.mat3_a[(0, col)]
                    + normal.y * cache.mat3_a[(1, col)]
                    + normal.z * cache.mat3_a[(2, col)];
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
        for k in 0..self.normals.len() {
            let mut value = 0.0;
            for col in 0..g.ncols() {
                value += g[(self.row + k, col)] * qdot[col];
            }
            errd[self.row + k] = value;
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
        // The registry has refreshed kinematics with zero acceleration, so
        // the point acceleration is the pure velocity-product term.
        let bias = self.point_acceleration(model);
        for (k, normal) in self.normals.iter().enumerate() {
            gamma[self.row + k] = -normal.dot(&bias);
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
