//! The constraint registry: ordered constraints, their global row space,
//! and all working memory of the constrained-dynamics solvers.

use crate::constraints::{
    Constraint, ConstraintCache, ConstraintType, ContactConstraint, LoopConstraint,
};
use crate::dynamics::Model;
use crate::linalg::LinearSolver;
use crate::math::{Real, SpatialTransform, SpatialVector, Vector};
use na::{DMatrix, DVector};

/// Merge tolerance of the registration shortcuts, absolute.
fn merge_tolerance() -> Real {
    Real::EPSILON * 100.0
}

/// A registered constraint of any variant.
pub enum AnyConstraint {
    /// A point-contact constraint.
    Contact(ContactConstraint),
    /// A loop-closure constraint.
    Loop(LoopConstraint),
    /// A caller-supplied constraint.
    Custom(Box<dyn Constraint>),
}

impl AnyConstraint {
    /// The constraint contract of this variant.
    pub fn as_constraint(&self) -> &dyn Constraint {
        match self {
            AnyConstraint::Contact(c) => c,
            AnyConstraint::Loop(c) => c,
            AnyConstraint::Custom(c) => &**c,
        }
    }

    /// The mutable constraint contract of this variant.
    pub fn as_constraint_mut(&mut self) -> &mut dyn Constraint {
        match self {
            AnyConstraint::Contact(c) => c,
            AnyConstraint::Loop(c) => c,
            AnyConstraint::Custom(c) => &mut **c,
        }
    }
}

/// The registry of active constraints of a model.
///
/// Constraints are appended while the set is unbound; [`ConstraintSet::bind`]
/// freezes the row layout and allocates every solver buffer for the bound
/// model, after which a simulation step performs no allocation. The set is
/// not re-entrant: every solve mutates its working buffers in place, so one
/// set serves exactly one logical simulation state.
pub struct ConstraintSet {
    /// The dense factorization used by the solve strategies.
    pub linear_solver: LinearSolver,
    pub(crate) bound: bool,

    pub(crate) constraints: Vec<AnyConstraint>,
    pub(crate) contact_indices: Vec<usize>,
    pub(crate) loop_indices: Vec<usize>,

    /// Per-row diagnostic names.
    pub name: Vec<String>,
    /// Per-row variant tags.
    pub constraint_type: Vec<ConstraintType>,
    /// Per-row position errors.
    pub err: DVector<Real>,
    /// Per-row velocity errors.
    pub errd: DVector<Real>,
    /// Per-row resolved constraint forces.
    pub force: DVector<Real>,
    /// Per-row resolved constraint impulses.
    pub impulse: DVector<Real>,
    /// Per-row post-impact velocity targets.
    pub v_plus: DVector<Real>,

    /// Joint-space inertia matrix of the bound model.
    pub h: DMatrix<Real>,
    /// Generalized bias forces of the bound model.
    pub c_bias: DVector<Real>,
    /// The constraint Jacobian.
    pub g: DMatrix<Real>,
    /// The constraint bias term, including stabilization contributions.
    pub gamma: DVector<Real>,

    // Augmented-system scratch of the direct strategy.
    pub(crate) a_work: DMatrix<Real>,
    pub(crate) b_work: DVector<Real>,
    pub(crate) x_work: DVector<Real>,
    pub(crate) c_work: DVector<Real>,

    // Null-space strategy scratch.
    pub(crate) gt_qr_q: DMatrix<Real>,
    pub(crate) y: DMatrix<Real>,
    pub(crate) z: DMatrix<Real>,
    pub(crate) qddot_y: DVector<Real>,
    pub(crate) qddot_z: DVector<Real>,

    // Reduced system shared by the range-space strategy and the
    // test-force contact solver.
    pub(crate) k_work: DMatrix<Real>,
    pub(crate) a_vec: DVector<Real>,

    // Test-force solver state.
    pub(crate) qddot_0: DVector<Real>,
    pub(crate) qddot_t: DVector<Real>,
    pub(crate) f_t: Vec<SpatialVector>,
    pub(crate) point_accel_0: Vec<Vector>,
    pub(crate) f_ext_constraints: Vec<SpatialVector>,

    // Acceleration-delta recursion buffers.
    pub(crate) d_pa: Vec<SpatialVector>,
    pub(crate) d_a: Vec<SpatialVector>,
    pub(crate) d_u: DVector<Real>,
    pub(crate) d_u3: Vec<Vector>,

    pub(crate) cache: ConstraintCache,
}

impl ConstraintSet {
    /// Creates an empty, unbound constraint set.
    pub fn new() -> Self {
        ConstraintSet {
            linear_solver: LinearSolver::ColPivHouseholderQr,
            bound: false,
            constraints: Vec::new(),
            contact_indices: Vec::new(),
            loop_indices: Vec::new(),
            name: Vec::new(),
            constraint_type: Vec::new(),
            err: DVector::zeros(0),
            errd: DVector::zeros(0),
            force: DVector::zeros(0),
            impulse: DVector::zeros(0),
            v_plus: DVector::zeros(0),
            h: DMatrix::zeros(0, 0),
            c_bias: DVector::zeros(0),
            g: DMatrix::zeros(0, 0),
            gamma: DVector::zeros(0),
            a_work: DMatrix::zeros(0, 0),
            b_work: DVector::zeros(0),
            x_work: DVector::zeros(0),
            c_work: DVector::zeros(0),
            gt_qr_q: DMatrix::zeros(0, 0),
            y: DMatrix::zeros(0, 0),
            z: DMatrix::zeros(0, 0),
            qddot_y: DVector::zeros(0),
            qddot_z: DVector::zeros(0),
            k_work: DMatrix::zeros(0, 0),
            a_vec: DVector::zeros(0),
            qddot_0: DVector::zeros(0),
            qddot_t: DVector::zeros(0),
            f_t: Vec::new(),
            point_accel_0: Vec::new(),
            f_ext_constraints: Vec::new(),
            d_pa: Vec::new(),
            d_a: Vec::new(),
            d_u: DVector::zeros(0),
            d_u3: Vec::new(),
            cache: ConstraintCache::default(),
        }
    }

    /// The total number of constraint rows.
    #[inline]
    pub fn size(&self) -> usize {
        self.constraint_type.len()
    }

    /// Whether [`Self::bind`] has been called.
    #[inline]
    pub fn is_bound(&self) -> bool {
        self.bound
    }

    /// The number of registered constraint objects (merged directions and
    /// axes share one object).
    #[inline]
    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    /// A registered constraint by object index, in registration order.
    pub fn constraint(&self, index: usize) -> &dyn Constraint {
        self.constraints[index].as_constraint()
    }

    /// A mutable registered constraint by object index. Useful to toggle
    /// stabilization or adjust its time constant.
    pub fn constraint_mut(&mut self, index: usize) -> &mut dyn Constraint {
        self.constraints[index].as_constraint_mut()
    }

    fn grow_rows(&mut self, count: usize, tag: ConstraintType, name: Option<&str>) {
        let name = name.unwrap_or("");
        for _ in 0..count {
            self.constraint_type.push(tag);
            self.name.push(name.to_owned());
        }
        let rows = self.constraint_type.len();
        self.err.resize_vertically_mut(rows, 0.0);
        self.errd.resize_vertically_mut(rows, 0.0);
        self.force.resize_vertically_mut(rows, 0.0);
        self.impulse.resize_vertically_mut(rows, 0.0);
        self.v_plus.resize_vertically_mut(rows, 0.0);
    }

    /// Registers a contact constraint with several directions at one point.
    ///
    /// Returns the first global row assigned to it. Fatal if the set is
    /// already bound.
    pub fn add_contact_constraint_normals(
        &mut self,
        body_id: usize,
        body_point: Vector,
        world_normals: Vec<Vector>,
        name: Option<&str>,
    ) -> usize {
        assert!(!self.bound, "constraints can only be added to an unbound constraint set");
        let row = self.size();
        let count = world_normals.len();
        let mut constraint = ContactConstraint::new(body_id, body_point, world_normals, name);
        constraint.set_row_offset(row);
        self.contact_indices.push(self.constraints.len());
        self.constraints.push(AnyConstraint::Contact(constraint));
        self.grow_rows(count, ConstraintType::Contact, name);
        row
    }

    /// Registers a single-direction contact constraint.
    ///
    /// With `allow_merge`, a direction at the same body and point (within
    /// floating-point tolerance) as the immediately preceding registered
    /// constraint is stacked onto that constraint instead of creating a
    /// new one, so the point Jacobian is evaluated once for all shared
    /// directions. Returns the global row assigned to the new direction.
    pub fn add_contact_constraint(
        &mut self,
        body_id: usize,
        body_point: Vector,
        world_normal: Vector,
        name: Option<&str>,
        allow_merge: bool,
    ) -> usize {
        assert!(!self.bound, "constraints can only be added to an unbound constraint set");
        let row = self.size();

        if allow_merge {
            if let Some(AnyConstraint::Contact(last)) = self.constraints.last_mut() {
                if last.body_id() == body_id
                    && (last.body_point() - body_point).norm() < merge_tolerance()
                {
                    last.append_normal(world_normal);
                    self.grow_rows(1, ConstraintType::Contact, name);
                    return row;
                }
            }
        }

        self.add_contact_constraint_normals(body_id, body_point, vec![world_normal], name)
    }

    /// Registers a loop constraint with several axes between one pair of
    /// attachment frames. All axes share the given enforcement flags.
    ///
    /// Returns the first global row assigned to it.
    pub fn add_loop_constraint_axes(
        &mut self,
        id_predecessor: usize,
        id_successor: usize,
        x_predecessor: SpatialTransform,
        x_successor: SpatialTransform,
        axes: Vec<SpatialVector>,
        position_level: bool,
        velocity_level: bool,
        enable_stabilization: bool,
        stabilization_time_constant: Real,
        name: Option<&str>,
    ) -> usize {
        assert!(!self.bound, "constraints can only be added to an unbound constraint set");
        assert!(!axes.is_empty(), "a loop constraint needs at least one axis");
        let row = self.size();
        let count = axes.len();

        let mut axes = axes.into_iter();
        let mut constraint = LoopConstraint::new(
            id_predecessor,
            id_successor,
            x_predecessor,
            x_successor,
            axes.next().unwrap(),
            position_level,
            velocity_level,
            name,
        );
        for axis in axes {
            constraint.append_axis(axis, position_level, velocity_level);
        }
        constraint.set_row_offset(row);
        constraint.set_stabilization_enabled(enable_stabilization);
        constraint.set_stabilization_time_constant(stabilization_time_constant);

        self.loop_indices.push(self.constraints.len());
        self.constraints.push(AnyConstraint::Loop(constraint));
        self.grow_rows(count, ConstraintType::Loop, name);
        row
    }

    /// Registers a single-axis loop constraint.
    ///
    /// With `allow_merge`, an axis between the same body pair with
    /// numerically identical attachment frames as the immediately
    /// preceding registered constraint is stacked onto that constraint.
    /// Returns the global row assigned to the new axis.
    pub fn add_loop_constraint(
        &mut self,
        id_predecessor: usize,
        id_successor: usize,
        x_predecessor: SpatialTransform,
        x_successor: SpatialTransform,
        axis: SpatialVector,
        position_level: bool,
        velocity_level: bool,
        enable_stabilization: bool,
        stabilization_time_constant: Real,
        name: Option<&str>,
        allow_merge: bool,
    ) -> usize {
        assert!(!self.bound, "constraints can only be added to an unbound constraint set");
        let row = self.size();

        if allow_merge {
            if let Some(AnyConstraint::Loop(last)) = self.constraints.last_mut() {
                if last.body_ids() == (id_predecessor, id_successor)
                    && frames_identical(last.body_frames().0, &x_predecessor)
                    && frames_identical(last.body_frames().1, &x_successor)
                {
                    last.append_axis(axis, position_level, velocity_level);
                    last.set_stabilization_enabled(enable_stabilization);
                    last.set_stabilization_time_constant(stabilization_time_constant);
                    self.grow_rows(1, ConstraintType::Loop, name);
                    return row;
                }
            }
        }

        self.add_loop_constraint_axes(
            id_predecessor,
            id_successor,
            x_predecessor,
            x_successor,
            vec![axis],
            position_level,
            velocity_level,
            enable_stabilization,
            stabilization_time_constant,
            name,
        )
    }

    /// Registers a caller-supplied constraint. Returns the first global
    /// row assigned to it.
    pub fn add_custom_constraint(&mut self, mut constraint: Box<dyn Constraint>) -> usize {
        assert!(!self.bound, "constraints can only be added to an unbound constraint set");
        let row = self.size();
        let count = constraint.size();
        assert!(count > 0, "a custom constraint needs at least one row");
        constraint.set_row_offset(row);
        let name = constraint.name().map(str::to_owned);
        self.constraints.push(AnyConstraint::Custom(constraint));
        self.grow_rows(count, ConstraintType::Custom, name.as_deref());
        row
    }

    /// Binds the set to the final model topology, resolving body
    /// references and allocating every solver buffer. May be called once;
    /// registration is frozen afterwards.
    pub fn bind(&mut self, model: &Model) {
        assert!(!self.bound, "binding an already bound constraint set");

        for constraint in &mut self.constraints {
            constraint.as_constraint_mut().bind(model);
        }

        let dofs = model.dof_count();
        let rows = self.size();
        let bodies = model.body_count();

        self.cache.resize(dofs);

        self.h = DMatrix::zeros(dofs, dofs);
        self.c_bias = DVector::zeros(dofs);
        self.g = DMatrix::zeros(rows, dofs);
        self.gamma = DVector::zeros(rows);

        self.a_work = DMatrix::zeros(dofs + rows, dofs + rows);
        self.b_work = DVector::zeros(dofs + rows);
        self.x_work = DVector::zeros(dofs + rows);
        self.c_work = DVector::zeros(dofs);

        self.gt_qr_q = DMatrix::zeros(dofs, dofs);
        self.y = DMatrix::zeros(dofs, rows);
        self.z = DMatrix::zeros(dofs, dofs.saturating_sub(rows));
        self.qddot_y = DVector::zeros(rows);
        self.qddot_z = DVector::zeros(dofs.saturating_sub(rows));

        self.k_work = DMatrix::zeros(rows, rows);
        self.a_vec = DVector::zeros(rows);
        self.qddot_0 = DVector::zeros(dofs);
        self.qddot_t = DVector::zeros(dofs);
        self.f_t = vec![SpatialVector::zeros(); rows];
        self.point_accel_0 = vec![Vector::zeros(); rows];
        self.f_ext_constraints = vec![SpatialVector::zeros(); bodies];

        self.d_pa = vec![SpatialVector::zeros(); bodies];
        self.d_a = vec![SpatialVector::zeros(); bodies];
        self.d_u = DVector::zeros(bodies);
        self.d_u3 = vec![Vector::zeros(); bodies];

        self.bound = true;
        log::debug!(
            "bound constraint set: {} rows over {} dofs ({} constraint objects)",
            rows,
            dofs,
            self.constraints.len()
        );
    }

    /// Resets all derived numeric state (forces, impulses, errors, the
    /// assembled system and every scratch buffer) without touching the
    /// registered constraints, the row layout, or the per-row impact
    /// velocity targets.
    pub fn clear(&mut self) {
        self.force.fill(0.0);
        self.impulse.fill(0.0);
        self.err.fill(0.0);
        self.errd.fill(0.0);

        self.h.fill(0.0);
        self.c_bias.fill(0.0);
        self.g.fill(0.0);
        self.gamma.fill(0.0);
        self.a_work.fill(0.0);
        self.b_work.fill(0.0);
        self.x_work.fill(0.0);
        self.c_work.fill(0.0);
        self.gt_qr_q.fill(0.0);
        self.y.fill(0.0);
        self.z.fill(0.0);
        self.qddot_y.fill(0.0);
        self.qddot_z.fill(0.0);

        self.cache.set_zero();

        self.k_work.fill(0.0);
        self.a_vec.fill(0.0);
        self.qddot_0.fill(0.0);
        self.qddot_t.fill(0.0);
        for f in &mut self.f_t {
            f.fill(0.0);
        }
        for p in &mut self.point_accel_0 {
            p.fill(0.0);
        }
        for f in &mut self.f_ext_constraints {
            f.fill(0.0);
        }
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
    }

    /// The contact constraint at `index` into the contact side-list.
    pub(crate) fn contact(&self, index: usize) -> &ContactConstraint {
        match &self.constraints[self.contact_indices[index]] {
            AnyConstraint::Contact(c) => c,
            _ => unreachable!("contact index list points at a non-contact constraint"),
        }
    }

    /// Recomputes the position error vector.
    pub fn update_position_error(&mut self, model: &mut Model, q: &DVector<Real>, update_kinematics: bool) {
        assert!(self.bound, "the constraint set must be bound");
        if update_kinematics {
            model.update_kinematics(Some(q), None, None);
        }
        let Self { constraints, err, cache, .. } = self;
        for constraint in constraints.iter() {
            constraint.as_constraint().calc_position_error(model, q, err, cache);
        }
    }

    /// Recomputes the constraint Jacobian.
    pub fn update_jacobian(&mut self, model: &mut Model, q: &DVector<Real>, update_kinematics: bool) {
        assert!(self.bound, "the constraint set must be bound");
        if update_kinematics {
            model.update_kinematics(Some(q), None, None);
        }
        let Self { constraints, g, cache, .. } = self;
        for constraint in constraints.iter() {
            constraint.as_constraint().calc_jacobian(model, q, g, cache);
        }
    }

    /// Recomputes the constraint Jacobian and the velocity error vector.
    pub fn update_velocity_error(
        &mut self,
        model: &mut Model,
        q: &DVector<Real>,
        qdot: &DVector<Real>,
        update_kinematics: bool,
    ) {
        self.update_jacobian(model, q, update_kinematics);
        self.velocity_error_rows(model, q, qdot);
    }

    fn velocity_error_rows(&mut self, model: &Model, q: &DVector<Real>, qdot: &DVector<Real>) {
        let Self { constraints, g, errd, cache, .. } = self;
        for constraint in constraints.iter() {
            constraint
                .as_constraint()
                .calc_velocity_error(model, q, qdot, g, errd, cache);
        }
    }

    /// Assembles the full constrained system for the given state: the mass
    /// matrix, bias forces, constraint Jacobian, position and velocity
    /// errors, and the constraint bias term with stabilization
    /// contributions.
    ///
    /// The ordering matters: the bias-force pass refreshes joint
    /// transforms and velocities but not base transforms, which are
    /// re-derived before any constraint evaluation; error vectors are
    /// computed before the bias term, which consumes them for
    /// stabilization; and the bias term is evaluated against a
    /// zero-acceleration kinematics sweep.
    pub fn assemble_system(
        &mut self,
        model: &mut Model,
        q: &DVector<Real>,
        qdot: &DVector<Real>,
        f_ext: Option<&[SpatialVector]>,
    ) {
        assert!(self.bound, "the constraint set must be bound");

        model.nonlinear_effects(q, qdot, &mut self.c_bias, f_ext);
        model.mass_matrix(q, &mut self.h, false);

        // The bias-force pass leaves the base transforms stale.
        model.refresh_base_transforms();

        self.update_jacobian(model, q, false);
        self.update_position_error(model, q, false);
        self.velocity_error_rows(model, q, qdot);

        // Evaluate the bias term against zero joint accelerations.
        self.qddot_0.fill(0.0);
        model.update_kinematics(None, None, Some(&self.qddot_0));

        let Self { constraints, g, err, errd, gamma, cache, .. } = self;
        for constraint in constraints.iter() {
            let constraint = constraint.as_constraint();
            constraint.calc_gamma(model, q, qdot, g, gamma, cache);
            if constraint.stabilization_enabled() {
                constraint.add_stabilization(err, errd, gamma);
            }
        }
    }
}

impl Default for ConstraintSet {
    fn default() -> Self {
        Self::new()
    }
}

fn frames_identical(a: &SpatialTransform, b: &SpatialTransform) -> bool {
    let tol = merge_tolerance();
    for i in 0..3 {
        if (a.trans[i] - b.trans[i]).abs() > tol {
            return false;
        }
        for j in 0..3 {
            if (a.rot[(i, j)] - b.rot[(i, j)]).abs() > tol {
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_models;
    use na::vector;

    fn unit_y() -> Vector {
        vector![0.0, 1.0, 0.0]
    }

    #[test]
    fn row_accounting_over_mixed_registrations() {
        let mut set = ConstraintSet::new();
        set.add_contact_constraint(3, vector![0.0, -0.5, 0.0], unit_y(), Some("heel"), false);
        set.add_contact_constraint_normals(
            3,
            vector![0.1, -0.5, 0.0],
            vec![unit_y(), vector![1.0, 0.0, 0.0]],
            Some("toe"),
        );
        set.add_loop_constraint(
            2,
            5,
            SpatialTransform::identity(),
            SpatialTransform::identity(),
            crate::math::SpatialVector::new(0.0, 0.0, 1.0, 0.0, 0.0, 0.0),
            true,
            true,
            false,
            0.1,
            None,
            false,
        );

        let total: usize = (0..set.constraint_count()).map(|i| set.constraint(i).size()).sum();
        assert_eq!(total, set.size());
        assert_eq!(set.size(), 4);
        assert_eq!(set.err.len(), 4);
        assert_eq!(set.errd.len(), 4);
        assert_eq!(set.force.len(), 4);
        assert_eq!(set.impulse.len(), 4);
        assert_eq!(set.v_plus.len(), 4);
        assert_eq!(set.name.len(), 4);
        assert_eq!(set.constraint_type.len(), 4);
    }

    #[test]
    fn contact_merge_stacks_rows_on_one_object() {
        let point = vector![0.0, -1.0, 0.0];
        let mut merged = ConstraintSet::new();
        let r0 = merged.add_contact_constraint(2, point, unit_y(), None, true);
        let r1 = merged.add_contact_constraint(
            2,
            point + vector![1.0e-15, 0.0, 0.0],
            vector![1.0, 0.0, 0.0],
            None,
            true,
        );
        assert_eq!((r0, r1), (0, 1));
        assert_eq!(merged.constraint_count(), 1);
        assert_eq!(merged.size(), 2);
        assert_eq!(merged.constraint_type, vec![ConstraintType::Contact; 2]);

        let mut separate = ConstraintSet::new();
        separate.add_contact_constraint(2, point, unit_y(), None, false);
        separate.add_contact_constraint(2, point, vector![1.0, 0.0, 0.0], None, false);
        assert_eq!(separate.constraint_count(), 2);
        assert_eq!(separate.size(), 2);
    }

    #[test]
    fn contact_merge_requires_adjacency_and_matching_point() {
        let point = vector![0.0, -1.0, 0.0];
        let mut set = ConstraintSet::new();
        set.add_contact_constraint(2, point, unit_y(), None, true);
        // A different point breaks the merge.
        set.add_contact_constraint(2, point + vector![0.1, 0.0, 0.0], unit_y(), None, true);
        assert_eq!(set.constraint_count(), 2);
        // Matching again only merges with the immediately preceding
        // constraint, not with the first one.
        set.add_contact_constraint(2, point, unit_y(), None, true);
        assert_eq!(set.constraint_count(), 3);
    }

    #[test]
    fn loop_merge_requires_identical_frames() {
        let x_p = SpatialTransform::translation(vector![0.0, -1.0, 0.0]);
        let x_s = SpatialTransform::identity();
        let axis = crate::math::SpatialVector::new(0.0, 0.0, 1.0, 0.0, 0.0, 0.0);
        let mut set = ConstraintSet::new();
        set.add_loop_constraint(1, 2, x_p, x_s, axis, true, true, false, 0.1, None, true);
        set.add_loop_constraint(1, 2, x_p, x_s, axis, true, true, false, 0.1, None, true);
        assert_eq!(set.constraint_count(), 1);
        assert_eq!(set.size(), 2);

        let shifted = SpatialTransform::translation(vector![0.0, -1.0, 0.5]);
        set.add_loop_constraint(1, 2, shifted, x_s, axis, true, true, false, 0.1, None, true);
        assert_eq!(set.constraint_count(), 2);
    }

    #[test]
    fn clear_is_idempotent_and_preserves_layout() {
        let mut model = test_models::double_pendulum();
        let mut set = ConstraintSet::new();
        set.add_contact_constraint(2, vector![0.0, -1.0, 0.0], unit_y(), Some("tip"), false);
        set.bind(&model);

        let q = model.neutral_q();
        let qdot = model.zero_qdot();
        set.assemble_system(&mut model, &q, &qdot, None);
        set.force[0] = 3.0;
        set.impulse[0] = -1.0;
        set.v_plus[0] = 0.25;

        set.clear();
        let snapshot_g = set.g.clone();
        assert_eq!(set.force[0], 0.0);
        assert_eq!(set.impulse[0], 0.0);
        // Targets are caller input, not derived state.
        assert_eq!(set.v_plus[0], 0.25);
        assert_eq!(set.size(), 1);
        assert_eq!(set.constraint_count(), 1);

        set.clear();
        assert_eq!(set.g, snapshot_g);
        assert_eq!(set.force[0], 0.0);
    }

    #[test]
    #[should_panic(expected = "unbound")]
    fn registration_after_bind_is_fatal() {
        let model = test_models::double_pendulum();
        let mut set = ConstraintSet::new();
        set.add_contact_constraint(1, vector![0.0, -1.0, 0.0], unit_y(), None, false);
        set.bind(&model);
        set.add_contact_constraint(2, vector![0.0, -1.0, 0.0], unit_y(), None, false);
    }

    #[test]
    #[should_panic(expected = "already bound")]
    fn double_bind_is_fatal() {
        let model = test_models::double_pendulum();
        let mut set = ConstraintSet::new();
        set.add_contact_constraint(1, vector![0.0, -1.0, 0.0], unit_y(), None, false);
        set.bind(&model);
        set.bind(&model);
    }
}
