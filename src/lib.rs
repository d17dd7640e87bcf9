//! Svarog is a symbolic execution engine for a strongly-typed, SSA-form
//! intermediate representation. Given an entry function whose inputs are
//! marked symbolic, it explores all feasible control-flow paths, accumulates
//! bit-vector path constraints, and works with an SMT solver to produce
//! concrete input values that exercise each reachable path.

pub mod array;
pub mod error;
pub mod exec;
pub mod expr;
pub mod ir;
pub mod solver;
pub mod state;
pub mod target;

pub use array::{compare_arrays, compare_updates, Array, ArrayRef, ArrayUpdate, UpdateRef};
pub use error::Error;
pub use exec::{
    BfsSearcher, CallContext, DfsSearcher, Executor, FunctionHandler, MultiSearcher,
    RandomPathSearcher, RandomSearcher, Searcher, SYMBOLIC_PKG,
};
pub use expr::{
    compare_exprs, find_arrays, walk_expr, BinaryOp, Evaluator, Expr, ExprRef, WIDTH_16, WIDTH_32,
    WIDTH_64, WIDTH_8, WIDTH_BOOL,
};
pub use solver::{Solution, Solver, SolverError, Z3Solver};
pub use state::{BindKey, Binding, ExecutionState, StackFrame, StateRef, Status};
pub use target::{Arch, Os, Target};
