//! The reduced-coordinate multibody model and its unconstrained dynamics:
//! kinematics, joint-space quantities and the articulated-body solver.

pub use self::joint::{CustomJoint, Joint};
pub use self::model::{Model, FIXED_BODY_BASE};
pub use self::rigid_body::RigidBody;

mod articulated_body;
mod joint;
mod joint_space;
mod kinematics;
pub(crate) mod model;
mod rigid_body;
