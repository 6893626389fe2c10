//! Small articulated models shared by the test modules.

use crate::dynamics::{CustomJoint, Joint, Model, RigidBody};
use crate::math::{Matrix, Real, SpatialTransform, SpatialVector, Vector};
use na::{vector, Matrix6xX, Unit};

fn link(mass: crate::math::Real) -> RigidBody {
    RigidBody::new(
        mass,
        vector![0.0, -0.5, 0.0],
        Matrix::from_diagonal(&vector![0.1, 0.05, 0.1]),
    )
}

/// Two unit-mass links hanging along `-y`, both hinged about `z`.
pub(crate) fn double_pendulum() -> Model {
    let mut model = Model::new();
    let z = Unit::new_normalize(vector![0.0, 0.0, 1.0]);
    let b1 = model.add_body(
        0,
        SpatialTransform::identity(),
        Joint::revolute(z),
        link(1.0),
    );
    model.add_body(
        b1,
        SpatialTransform::translation(vector![0.0, -1.0, 0.0]),
        Joint::revolute(z),
        link(1.0),
    );
    model
}

/// A five-DoF arm with a branch at the first link and one prismatic joint;
/// exercises the branch-induced sparsity of the mass matrix.
pub(crate) fn branched_arm() -> Model {
    let mut model = Model::new();
    let x = Unit::new_normalize(vector![1.0, 0.0, 0.0]);
    let y = Unit::new_normalize(vector![0.0, 1.0, 0.0]);
    let z = Unit::new_normalize(vector![0.0, 0.0, 1.0]);

    let b1 = model.add_body(
        0,
        SpatialTransform::identity(),
        Joint::revolute(z),
        link(1.2),
    );
    let b2 = model.add_body(
        b1,
        SpatialTransform::translation(vector![0.0, -1.0, 0.0]),
        Joint::revolute(x),
        link(0.8),
    );
    model.add_body(
        b2,
        SpatialTransform::translation(vector![0.0, -1.0, 0.0]),
        Joint::prismatic(y),
        link(0.5),
    );
    let b4 = model.add_body(
        b1,
        SpatialTransform::translation(vector![0.5, 0.0, 0.0]),
        Joint::revolute(y),
        link(0.7),
    );
    model.add_body(
        b4,
        SpatialTransform::translation(vector![0.0, -0.5, 0.0]),
        Joint::revolute(z),
        link(0.4),
    );
    model
}

/// A 2-DoF slide in the x-y plane, supplied as a caller-defined joint.
pub(crate) struct PlanarJoint;

impl CustomJoint for PlanarJoint {
    fn dof_count(&self) -> usize {
        2
    }

    fn update(
        &self,
        q: &[Real],
        _qdot: &[Real],
        x_joint: &mut SpatialTransform,
        motion_subspace: &mut Matrix6xX<Real>,
        bias_accel: &mut SpatialVector,
    ) {
        *x_joint = SpatialTransform::translation(Vector::new(q[0], q[1], 0.0));
        motion_subspace.fill(0.0);
        motion_subspace[(3, 0)] = 1.0;
        motion_subspace[(4, 1)] = 1.0;
        bias_accel.fill(0.0);
    }
}

/// A planar slide (custom joint) carrying a hinged link; exercises the
/// custom-joint branch of every recursion.
pub(crate) fn planar_arm() -> Model {
    let mut model = Model::new();
    let z = Unit::new_normalize(vector![0.0, 0.0, 1.0]);
    let b1 = model.add_body(
        0,
        SpatialTransform::identity(),
        Joint::Custom(Box::new(PlanarJoint)),
        link(0.9),
    );
    model.add_body(
        b1,
        SpatialTransform::translation(vector![0.0, -1.0, 0.0]),
        Joint::revolute(z),
        link(0.5),
    );
    model
}

/// The same mechanism with the slide decomposed into two prismatic joints
/// through a massless intermediate body.
pub(crate) fn planar_arm_decomposed() -> Model {
    let mut model = Model::new();
    let x = Unit::new_normalize(vector![1.0, 0.0, 0.0]);
    let y = Unit::new_normalize(vector![0.0, 1.0, 0.0]);
    let z = Unit::new_normalize(vector![0.0, 0.0, 1.0]);
    let b1 = model.add_body(
        0,
        SpatialTransform::identity(),
        Joint::prismatic(x),
        RigidBody::massless(),
    );
    let b2 = model.add_body(b1, SpatialTransform::identity(), Joint::prismatic(y), link(0.9));
    model.add_body(
        b2,
        SpatialTransform::translation(vector![0.0, -1.0, 0.0]),
        Joint::revolute(z),
        link(0.5),
    );
    model
}

/// A spherical joint followed by a revolute joint; the model's position
/// vector is one entry longer than its velocity vector.
pub(crate) fn spherical_chain() -> Model {
    let mut model = Model::new();
    let x = Unit::new_normalize(vector![1.0, 0.0, 0.0]);
    let b1 = model.add_body(
        0,
        SpatialTransform::identity(),
        Joint::Spherical,
        link(1.0),
    );
    model.add_body(
        b1,
        SpatialTransform::translation(vector![0.0, -1.0, 0.0]),
        Joint::revolute(x),
        link(0.6),
    );
    model
}
