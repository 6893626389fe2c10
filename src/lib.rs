//! # Arbordyn
//!
//! Arbordyn computes the forward dynamics of articulated rigid-body
//! mechanisms subject to algebraic motion constraints: point contacts,
//! closed kinematic loops and user-supplied constraint equations. Given
//! joint positions, velocities and applied generalized forces it produces
//! the joint accelerations and constraint forces that keep every
//! constraint satisfied, with optional drift stabilization.
//!
//! The crate is organised around a reduced-coordinate [`dynamics::Model`]
//! (the kinematic tree, joint-space dynamics and the articulated-body
//! solver) and a [`constraints::ConstraintSet`] which owns the registered
//! constraints, the assembled constrained system and all per-step working
//! memory. Three interchangeable strategies solve the constrained system
//! (dense augmented solve, branch-sparse range-space solve, null-space
//! solve), and an incremental test-force method resolves pure contact
//! problems without factoring the full system.
//!
//! Everything is single-threaded and allocation-free once a constraint
//! set has been bound to a model; callers that need concurrent
//! simulations keep one model/constraint-set pair per simulation state.

#![warn(missing_docs)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::needless_range_loop)] // index-based loops mirror the recursions they implement.

pub extern crate nalgebra as na;

#[cfg(all(feature = "f32", feature = "f64"))]
std::compile_error!("Exactly one of the `f32` and `f64` features must be enabled.");
#[cfg(not(any(feature = "f32", feature = "f64")))]
std::compile_error!("Exactly one of the `f32` and `f64` features must be enabled.");

pub mod constraints;
pub mod dynamics;
pub mod linalg;
pub mod math;

#[cfg(test)]
pub(crate) mod test_models;

/// Prelude containing the common types defined by Arbordyn.
pub mod prelude {
    pub use crate::constraints::*;
    pub use crate::dynamics::*;
    pub use crate::linalg::LinearSolver;
    pub use crate::math::*;
    pub use na::{vector, DMatrix, DVector};
}
