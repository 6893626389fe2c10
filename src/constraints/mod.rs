//! The constrained-dynamics core: constraint registration, assembly of the
//! constrained equations of motion, the interchangeable solve strategies,
//! impulse resolution, the incremental contact solver, and
//! constraint-consistent assembly.

pub use self::assembly::AssemblyError;
pub use self::constraint::{Constraint, ConstraintCache, ConstraintType};
pub use self::constraint_set::{AnyConstraint, ConstraintSet};
pub use self::contact_constraint::ContactConstraint;
pub use self::loop_constraint::LoopConstraint;
pub use self::solver::{
    solve_constrained_system_direct, solve_constrained_system_null_space,
    solve_constrained_system_range_space_sparse,
};

mod assembly;
mod constraint;
mod constraint_set;
mod contact_constraint;
mod kokkevis;
mod loop_constraint;
mod solver;
