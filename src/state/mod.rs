pub mod execution_state;
pub mod frame;

pub use execution_state::{ExecutionState, StateRef, Status};
pub use frame::{BindKey, Binding, StackFrame};
