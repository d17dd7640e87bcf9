//! The constraint solver interface.
//!
//! The engine treats the solver as an opaque oracle exposing a single
//! operation: given a set of width-1 constraints and a set of symbolic
//! arrays, decide satisfiability and, when satisfiable, produce one concrete
//! byte string per array that makes every constraint true.

pub mod z3;

pub use self::z3::Z3Solver;

use thiserror::Error;

use crate::array::ArrayRef;
use crate::expr::ExprRef;

/// The outcome of a successful solver call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Solution {
    /// The constraints cannot all hold.
    Unsat,
    /// The constraints hold under the returned model: one byte string per
    /// requested array, each of the array's size.
    Sat(Vec<Vec<u8>>),
}

impl Solution {
    pub fn is_sat(&self) -> bool {
        matches!(self, Solution::Sat(_))
    }
}

/// Errors reported by a solver backend. The engine neither retries nor
/// suppresses these; they propagate from the driver loop unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SolverError {
    #[error("solver timeout")]
    Timeout,
    #[error("solver canceled")]
    Canceled,
    #[error("solver resource limit")]
    ResourceLimit,
    #[error("solver unknown error")]
    Unknown,
    #[error("solver backend: {0}")]
    Backend(String),
}

/// A logical constraint solver.
pub trait Solver {
    /// Decides the satisfiability of `constraints`. On a satisfiable result,
    /// a valid initial value is returned for each array in `arrays`.
    fn solve(&self, constraints: &[ExprRef], arrays: &[ArrayRef]) -> Result<Solution, SolverError>;
}
