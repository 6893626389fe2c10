//! Dense solver selection and the branch-sparse factorization used by the
//! range-space strategy.

pub use self::dense::{solve_linear_system, LinearSolver};
pub use self::sparse_ltl::{factorize_ltl, solve_ltx, solve_lx};

mod dense;
mod sparse_ltl;
