use thiserror::Error;

use crate::solver::SolverError;

/// Errors surfaced by the executor driver loop.
///
/// Invariant violations (width mismatches, out-of-bounds extracts, false
/// constraints) are engine bugs and panic instead of returning an error.
#[derive(Error, Debug)]
pub enum Error {
    /// The searcher has no more states to explore.
    #[error("no state available")]
    NoStateAvailable,

    /// The current state has no instruction left to execute.
    #[error("no instruction available")]
    NoInstructionAvailable,

    /// The configured OS/architecture pair is not in the accepted set.
    #[error("invalid os/arch combination")]
    InvalidTarget,

    /// A solver must be installed before states can be executed.
    #[error("no solver installed")]
    NoSolver,

    /// The program uses an IR feature outside the supported subset.
    #[error("{0}")]
    Unsupported(String),

    /// An operand that must be concrete evaluated to a symbolic expression.
    #[error("expected constant {0}")]
    NonConstant(String),

    /// A value of the wrong binding class reached an operation.
    #[error("invalid operand: {0}")]
    InvalidOperand(String),

    /// A state's constraints have no model; forks only follow satisfiable
    /// branches, so this indicates an invariant violation of the fork logic.
    #[error("unsatisfiable")]
    Unsatisfiable,

    /// A pointer does not fall within any live allocation.
    #[error("allocation not found: addr={0}")]
    AllocNotFound(u64),

    /// The evaluator was asked about an array it has no value for.
    #[error("array not bound: id={0}")]
    ArrayNotBound(u64),

    /// The evaluator read past the end of an array value.
    #[error("select index out of bounds: {index} >= {len}")]
    SelectOutOfBounds { index: u64, len: usize },

    #[error(transparent)]
    Solver(#[from] SolverError),
}
