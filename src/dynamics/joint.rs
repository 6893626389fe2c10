//! Joint models connecting the bodies of the kinematic tree.

use crate::math::{Real, SpatialTransform, SpatialVector, Vector};
use na::{Matrix6xX, Unit};

/// A joint connecting a body to its parent in the kinematic tree.
pub enum Joint {
    /// A 1-DoF hinge about `axis` (expressed in the joint frame).
    Revolute {
        /// Rotation axis in joint coordinates.
        axis: Unit<Vector>,
    },
    /// A 1-DoF slider along `axis` (expressed in the joint frame).
    Prismatic {
        /// Translation axis in joint coordinates.
        axis: Unit<Vector>,
    },
    /// A 3-DoF ball joint parameterised by a unit quaternion.
    ///
    /// The quaternion vector part occupies the joint's three slots in `q`
    /// while the scalar part is stored past the DoF section of `q`, so a
    /// model containing spherical joints has `q_size() > dof_count()`.
    Spherical,
    /// A 3-DoF translational joint.
    Translational,
    /// A 0-DoF joint. The body is merged into its movable parent and
    /// addressed through a fixed-body id.
    Fixed,
    /// A caller-supplied joint model with an arbitrary motion subspace.
    Custom(Box<dyn CustomJoint>),
}

impl Joint {
    /// A revolute joint about the given axis.
    pub fn revolute(axis: Unit<Vector>) -> Self {
        Joint::Revolute { axis }
    }

    /// A prismatic joint along the given axis.
    pub fn prismatic(axis: Unit<Vector>) -> Self {
        Joint::Prismatic { axis }
    }

    /// The number of velocity degrees of freedom of this joint.
    pub fn dof_count(&self) -> usize {
        match self {
            Joint::Revolute { .. } | Joint::Prismatic { .. } => 1,
            Joint::Spherical | Joint::Translational => 3,
            Joint::Fixed => 0,
            Joint::Custom(joint) => joint.dof_count(),
        }
    }

    /// The number of position coordinates of this joint.
    pub fn q_count(&self) -> usize {
        match self {
            // The quaternion scalar part is stored separately.
            Joint::Spherical => 3,
            _ => self.dof_count(),
        }
    }
}

impl std::fmt::Debug for Joint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Joint::Revolute { axis } => write!(f, "Revolute({:?})", axis),
            Joint::Prismatic { axis } => write!(f, "Prismatic({:?})", axis),
            Joint::Spherical => write!(f, "Spherical"),
            Joint::Translational => write!(f, "Translational"),
            Joint::Fixed => write!(f, "Fixed"),
            Joint::Custom(joint) => write!(f, "Custom(dofs: {})", joint.dof_count()),
        }
    }
}

/// A caller-supplied joint model.
///
/// Implementations describe the joint transform and motion subspace as a
/// function of the joint coordinates; the model owns the articulated-body
/// working quantities associated with the joint.
pub trait CustomJoint {
    /// The number of degrees of freedom (and position coordinates).
    fn dof_count(&self) -> usize;

    /// Evaluates the joint kinematics at the given coordinates.
    ///
    /// Writes the parent-to-child joint transform, the 6 x DoF motion
    /// subspace expressed in the child frame, and the velocity-dependent
    /// bias acceleration (zero for subspaces that are constant in the
    /// child frame).
    fn update(
        &self,
        q: &[Real],
        qdot: &[Real],
        x_joint: &mut SpatialTransform,
        motion_subspace: &mut Matrix6xX<Real>,
        bias_accel: &mut SpatialVector,
    );
}
