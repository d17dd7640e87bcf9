#![allow(dead_code)]

use svarog::ir::{FuncId, Operand, Program, Type};
use svarog::{Binding, Evaluator, Executor, StateRef, Status, Z3Solver, SYMBOLIC_PKG};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Declarations for the engine's symbolic-input package.
pub struct SymDecls {
    pub int: FuncId,
    pub int8: FuncId,
    pub int16: FuncId,
    pub int32: FuncId,
    pub int64: FuncId,
    pub byte: FuncId,
    pub string: FuncId,
    pub byte_slice: FuncId,
    pub assert: FuncId,
}

pub fn declare_symbolics(prog: &mut Program) -> SymDecls {
    use svarog::ir::IntKind::*;
    SymDecls {
        int: prog.declare(SYMBOLIC_PKG, "Int", &[], &[Type::int()]),
        int8: prog.declare(SYMBOLIC_PKG, "Int8", &[], &[Type::Int(I8)]),
        int16: prog.declare(SYMBOLIC_PKG, "Int16", &[], &[Type::Int(I16)]),
        int32: prog.declare(SYMBOLIC_PKG, "Int32", &[], &[Type::Int(I32)]),
        int64: prog.declare(SYMBOLIC_PKG, "Int64", &[], &[Type::Int(I64)]),
        byte: prog.declare(SYMBOLIC_PKG, "Byte", &[], &[Type::byte()]),
        string: prog.declare(SYMBOLIC_PKG, "String", &[Type::int()], &[Type::Str]),
        byte_slice: prog.declare(
            SYMBOLIC_PKG,
            "ByteSlice",
            &[Type::int()],
            &[Type::slice(Type::byte())],
        ),
        assert: prog.declare(SYMBOLIC_PKG, "Assert", &[Type::Bool], &[]),
    }
}

/// Builds an executor wired to a Z3 solver.
pub fn new_executor(prog: Program, entry: FuncId) -> Executor {
    let mut e = Executor::new(prog, entry);
    e.solver = Some(Box::new(Z3Solver::new()));
    e
}

/// Drains the finished continuation forked by a top-level return: the next
/// state must have popped its last frame and completed cleanly.
pub fn next_finished(e: &mut Executor) -> StateRef {
    let state = e.execute_next_state().expect("expected a finished continuation");
    assert_eq!(state.borrow().status(), Status::Finished);
    assert!(state.borrow().frame().is_none());
    state
}

/// Renders a state's position the way the driver logs it.
pub fn pos_of(e: &Executor, state: &StateRef) -> String {
    match state.borrow().position(e.program()) {
        Some(pos) => pos.to_string(),
        None => "-".to_string(),
    }
}

/// Evaluates the expression bound to `op` in the state's current frame down
/// to a concrete value under a solver model.
pub fn eval_u64(
    state: &StateRef,
    arrays: &[svarog::ArrayRef],
    values: &[Vec<u8>],
    op: &Operand,
) -> u64 {
    let binding = state.borrow_mut().eval(op).expect("binding not found");
    let Binding::Expr(expr) = binding else {
        panic!("binding is not an expression");
    };
    let constant = Evaluator::new(arrays, values).evaluate(&expr).expect("evaluation failed");
    constant.as_constant().expect("evaluation did not fold").0
}
