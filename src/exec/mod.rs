pub mod builtins;
pub mod executor;
pub mod executor_binop;
pub mod executor_mem;
pub mod searcher;

pub use executor::{CallContext, Executor, FunctionHandler, SYMBOLIC_PKG};
pub use searcher::{
    BfsSearcher, DfsSearcher, MultiSearcher, RandomPathSearcher, RandomSearcher, Searcher,
};
