//! The reduced-coordinate model of an articulated mechanism.

use crate::dynamics::{Joint, RigidBody};
use crate::math::{Matrix, Real, SpatialMatrix, SpatialTransform, SpatialVector, Vector};
use na::{DMatrix, DVector, Matrix6xX, Quaternion, UnitQuaternion};

pub(crate) type Matrix63 = na::SMatrix<Real, 6, 3>;

/// Ids at or above this value denote bodies attached through a fixed joint
/// and merged into a movable parent.
pub const FIXED_BODY_BASE: usize = usize::MAX / 2;

const NO_CUSTOM: usize = usize::MAX;

/// A body merged into its movable parent through a fixed joint.
#[derive(Copy, Clone, Debug)]
pub(crate) struct FixedBody {
    pub movable_parent: usize,
    /// Transform from the movable parent frame to the fixed body frame.
    pub x_parent: SpatialTransform,
}

/// Articulated-body working quantities of a custom joint.
pub(crate) struct CustomJointState {
    /// Motion subspace in the child body frame.
    pub s: Matrix6xX<Real>,
    /// Velocity-dependent bias acceleration.
    pub c_j: SpatialVector,
    /// `IA * S`.
    pub u_s: Matrix6xX<Real>,
    /// `(S^T * IA * S)^-1`.
    pub dinv: DMatrix<Real>,
    /// `tau - S^T * pA`.
    pub tau_s: DVector<Real>,
    /// Test-force delta of `tau_s`.
    pub d_u: DVector<Real>,
}

/// A kinematic tree of rigid bodies in reduced coordinates.
///
/// Bodies are indexed in topological order: index 0 is the fixed base and
/// every body has a parent with a strictly smaller index. The model owns
/// all per-body kinematic state and the articulated-body factorization
/// quantities cached by the forward-dynamics pass; those caches are reused
/// by the incremental contact solver instead of being recomputed.
pub struct Model {
    /// The gravitational acceleration, in base coordinates.
    pub gravity: Vector,

    // Tree structure.
    pub(crate) parent: Vec<usize>,
    /// Per-DoF parent indices; `None` for DoFs whose chain reaches the base.
    pub(crate) dof_parent: Vec<Option<usize>>,
    pub(crate) joints: Vec<Joint>,
    pub(crate) q_index: Vec<usize>,
    pub(crate) w_index: Vec<usize>,
    pub(crate) custom_index: Vec<usize>,
    pub(crate) x_tree: Vec<SpatialTransform>,
    pub(crate) spatial_inertia: Vec<SpatialMatrix>,
    pub(crate) fixed_bodies: Vec<FixedBody>,
    dof_count: usize,
    q_size: usize,

    // Kinematic state.
    pub(crate) x_lambda: Vec<SpatialTransform>,
    pub(crate) x_base: Vec<SpatialTransform>,
    pub(crate) v: Vec<SpatialVector>,
    pub(crate) c: Vec<SpatialVector>,
    pub(crate) a: Vec<SpatialVector>,
    pub(crate) v_joint: Vec<SpatialVector>,
    pub(crate) s: Vec<SpatialVector>,
    pub(crate) s3: Vec<Matrix63>,

    // Articulated-body caches, maintained by the forward-dynamics pass.
    pub(crate) ia: Vec<SpatialMatrix>,
    pub(crate) pa: Vec<SpatialVector>,
    pub(crate) u_s: Vec<SpatialVector>,
    pub(crate) d_s: Vec<Real>,
    pub(crate) tau_s: Vec<Real>,
    pub(crate) u_s3: Vec<Matrix63>,
    pub(crate) dinv_s3: Vec<Matrix>,
    pub(crate) tau_s3: Vec<Vector>,
    pub(crate) custom_state: Vec<CustomJointState>,

    // Scratch for the joint-space dynamics routines.
    pub(crate) f_work: Vec<SpatialVector>,
    pub(crate) ic_work: Vec<SpatialMatrix>,
}

impl Model {
    /// Creates an empty model containing only the fixed base.
    pub fn new() -> Self {
        Model {
            gravity: Vector::new(0.0, -9.81, 0.0),
            parent: vec![0],
            dof_parent: Vec::new(),
            joints: vec![Joint::Fixed],
            q_index: vec![0],
            w_index: vec![0],
            custom_index: vec![NO_CUSTOM],
            x_tree: vec![SpatialTransform::identity()],
            spatial_inertia: vec![SpatialMatrix::zeros()],
            fixed_bodies: Vec::new(),
            dof_count: 0,
            q_size: 0,
            x_lambda: vec![SpatialTransform::identity()],
            x_base: vec![SpatialTransform::identity()],
            v: vec![SpatialVector::zeros()],
            c: vec![SpatialVector::zeros()],
            a: vec![SpatialVector::zeros()],
            v_joint: vec![SpatialVector::zeros()],
            s: vec![SpatialVector::zeros()],
            s3: vec![Matrix63::zeros()],
            ia: vec![SpatialMatrix::zeros()],
            pa: vec![SpatialVector::zeros()],
            u_s: vec![SpatialVector::zeros()],
            d_s: vec![0.0],
            tau_s: vec![0.0],
            u_s3: vec![Matrix63::zeros()],
            dinv_s3: vec![Matrix::zeros()],
            tau_s3: vec![Vector::zeros()],
            custom_state: Vec::new(),
            f_work: vec![SpatialVector::zeros()],
            ic_work: vec![SpatialMatrix::zeros()],
        }
    }

    /// Adds a body connected to `parent_id` through `joint`.
    ///
    /// `x_tree` is the transform from the parent frame to the joint frame.
    /// Returns the id of the new body. Bodies attached through
    /// [`Joint::Fixed`] are merged into their movable parent and receive an
    /// id offset by [`FIXED_BODY_BASE`].
    pub fn add_body(
        &mut self,
        parent_id: usize,
        x_tree: SpatialTransform,
        joint: Joint,
        body: RigidBody,
    ) -> usize {
        // Resolve a fixed parent to its movable parent.
        let (movable_parent, x_tree) = if self.is_fixed_body_id(parent_id) {
            let fixed = self.fixed_bodies[parent_id - FIXED_BODY_BASE];
            (fixed.movable_parent, x_tree * fixed.x_parent)
        } else {
            (parent_id, x_tree)
        };
        assert!(
            movable_parent < self.joints.len(),
            "Model::add_body: invalid parent id."
        );

        if let Joint::Fixed = joint {
            // Merge the new body's inertia into the movable parent.
            let x_mat = x_tree.to_matrix();
            let merged = x_mat.transpose() * body.spatial_inertia() * x_mat;
            self.spatial_inertia[movable_parent] += merged;
            self.fixed_bodies.push(FixedBody {
                movable_parent,
                x_parent: x_tree,
            });
            return FIXED_BODY_BASE + self.fixed_bodies.len() - 1;
        }

        let id = self.joints.len();
        let dofs = joint.dof_count();
        assert!(dofs > 0, "Model::add_body: custom joints need at least one DoF.");

        // Per-DoF ancestry: DoFs of one joint chain among themselves, the
        // first one attaches to the last DoF of the parent body.
        let parent_dof = if movable_parent == 0 {
            None
        } else {
            Some(self.q_index[movable_parent] + self.joints[movable_parent].dof_count() - 1)
        };
        self.dof_parent.push(parent_dof);
        for k in 1..dofs {
            self.dof_parent.push(Some(self.dof_count + k - 1));
        }

        self.q_index.push(self.dof_count);
        self.dof_count += dofs;

        if let Joint::Custom(_) = joint {
            self.custom_index.push(self.custom_state.len());
            self.custom_state.push(CustomJointState {
                s: Matrix6xX::zeros(dofs),
                c_j: SpatialVector::zeros(),
                u_s: Matrix6xX::zeros(dofs),
                dinv: DMatrix::zeros(dofs, dofs),
                tau_s: DVector::zeros(dofs),
                d_u: DVector::zeros(dofs),
            });
        } else {
            self.custom_index.push(NO_CUSTOM);
        }
        self.joints.push(joint);

        self.parent.push(movable_parent);
        self.x_tree.push(x_tree);
        self.spatial_inertia.push(body.spatial_inertia());
        self.w_index.push(0);

        // Reassign the quaternion scalar slots: they live past the DoF
        // section of `q`, which just grew.
        let mut w_slot = self.dof_count;
        for i in 1..self.joints.len() {
            if let Joint::Spherical = self.joints[i] {
                self.w_index[i] = w_slot;
                w_slot += 1;
            }
        }
        self.q_size = w_slot;

        self.x_lambda.push(SpatialTransform::identity());
        self.x_base.push(SpatialTransform::identity());
        self.v.push(SpatialVector::zeros());
        self.c.push(SpatialVector::zeros());
        self.a.push(SpatialVector::zeros());
        self.v_joint.push(SpatialVector::zeros());
        self.s.push(SpatialVector::zeros());
        self.s3.push(Matrix63::zeros());
        self.ia.push(SpatialMatrix::zeros());
        self.pa.push(SpatialVector::zeros());
        self.u_s.push(SpatialVector::zeros());
        self.d_s.push(0.0);
        self.tau_s.push(0.0);
        self.u_s3.push(Matrix63::zeros());
        self.dinv_s3.push(Matrix::zeros());
        self.tau_s3.push(Vector::zeros());
        self.f_work.push(SpatialVector::zeros());
        self.ic_work.push(SpatialMatrix::zeros());

        id
    }

    /// The number of velocity degrees of freedom.
    #[inline]
    pub fn dof_count(&self) -> usize {
        self.dof_count
    }

    /// The number of position coordinates (larger than [`Self::dof_count`]
    /// when the model contains spherical joints).
    #[inline]
    pub fn q_size(&self) -> usize {
        self.q_size
    }

    /// The number of movable bodies, including the fixed base at index 0.
    #[inline]
    pub fn body_count(&self) -> usize {
        self.joints.len()
    }

    /// Whether `id` denotes a body merged through a fixed joint.
    #[inline]
    pub fn is_fixed_body_id(&self, id: usize) -> bool {
        id >= FIXED_BODY_BASE && id - FIXED_BODY_BASE < self.fixed_bodies.len()
    }

    /// Resolves `id` to the movable body it is attached to.
    #[inline]
    pub fn movable_body_id(&self, id: usize) -> usize {
        if self.is_fixed_body_id(id) {
            self.fixed_bodies[id - FIXED_BODY_BASE].movable_parent
        } else {
            id
        }
    }

    /// The parent id of the movable body `id`.
    #[inline]
    pub fn parent_id(&self, id: usize) -> usize {
        self.parent[id]
    }

    /// A position vector of the right size with all joints in their neutral
    /// configuration (identity quaternions for spherical joints).
    pub fn neutral_q(&self) -> DVector<Real> {
        let mut q = DVector::zeros(self.q_size);
        for i in 1..self.joints.len() {
            if let Joint::Spherical = self.joints[i] {
                q[self.w_index[i]] = 1.0;
            }
        }
        q
    }

    /// A zero velocity (or acceleration, or force) vector of the right size.
    pub fn zero_qdot(&self) -> DVector<Real> {
        DVector::zeros(self.dof_count)
    }

    /// Reads the orientation quaternion of the spherical joint of `body_id`.
    pub fn joint_quaternion(&self, body_id: usize, q: &DVector<Real>) -> UnitQuaternion<Real> {
        let qi = self.q_index[body_id];
        let quat = Quaternion::new(q[self.w_index[body_id]], q[qi], q[qi + 1], q[qi + 2]);
        UnitQuaternion::from_quaternion(quat)
    }

    /// Writes the orientation quaternion of the spherical joint of `body_id`.
    pub fn set_joint_quaternion(
        &self,
        body_id: usize,
        quat: &UnitQuaternion<Real>,
        q: &mut DVector<Real>,
    ) {
        let qi = self.q_index[body_id];
        q[qi] = quat.i;
        q[qi + 1] = quat.j;
        q[qi + 2] = quat.k;
        q[self.w_index[body_id]] = quat.w;
    }
}

impl Default for Model {
    fn default() -> Self {
        Self::new()
    }
}
