//! The executor: per-instruction small-step semantics and the driver loop.
//!
//! Execution is single-threaded and cooperative. `execute_next_state` picks
//! one state from the search strategy and steps it until it forks (at a
//! branch, call, or return) or terminates. Forks insert new states back into
//! the strategy; a forked state may not execute further instructions, so the
//! search always advances through its children.

use std::collections::HashMap;

use log::debug;

use crate::error::Error;
use crate::expr::{find_arrays, Expr};
use crate::ir::{
    BlockId, Callee, FuncId, InstrId, InstrKind, Operand, Program, Signature,
};
use crate::solver::{Solution, Solver};
use crate::state::{BindKey, Binding, ExecutionState, StateRef};
use crate::target::Target;

use super::builtins;
use super::searcher::{DfsSearcher, Searcher};
use super::{executor_binop, executor_mem};

/// Package path of the engine's symbolic-input constructors.
pub const SYMBOLIC_PKG: &str = "svarog";

/// Context handed to a registered function handler: the call's result slot,
/// the call-site signature, and the pre-evaluated arguments.
pub struct CallContext<'a> {
    pub result: BindKey,
    pub sig: &'a Signature,
    pub args: Vec<Binding>,
}

/// Special execution of a function call. Once registered, every invocation
/// of the function is delegated to the handler instead of being pushed onto
/// the call stack.
pub type FunctionHandler =
    fn(&Program, Target, &mut ExecutionState, CallContext<'_>) -> Result<(), Error>;

#[derive(PartialEq, Eq, Hash)]
struct FuncKey {
    path: String,
    name: String,
}

/// The symbolic executor for one entry function.
pub struct Executor {
    program: Program,
    root: StateRef,
    states: Vec<StateRef>,
    state_id_seq: usize,
    handlers: HashMap<FuncKey, FunctionHandler>,
    target: Target,

    /// Used for solving symbolic values. Must be set before execution.
    pub solver: Option<Box<dyn Solver>>,
    /// Search strategy. Defaults to depth-first.
    pub searcher: Box<dyn Searcher>,
}

impl Executor {
    /// Creates an executor for `entry` on the default target and seeds the
    /// search with the initial state.
    pub fn new(program: Program, entry: FuncId) -> Executor {
        Self::with_target(program, entry, Target::default())
    }

    /// Creates an executor configured for a specific OS/architecture.
    pub fn with_target(program: Program, entry: FuncId, target: Target) -> Executor {
        let root = ExecutionState::new(target, &program, entry);
        let mut e = Executor {
            program,
            root: root.clone(),
            states: Vec::new(),
            state_id_seq: 0,
            handlers: HashMap::new(),
            target,
            solver: None,
            searcher: Box::new(DfsSearcher::new()),
        };
        builtins::register_defaults(&mut e);

        root.borrow_mut().id = e.next_state_id();
        e.states.push(root.clone());
        e.searcher.add_state(root);
        e
    }

    /// The initial state for the entry function.
    pub fn root_state(&self) -> StateRef {
        self.root.clone()
    }

    /// Every state created so far, in creation order.
    pub fn states(&self) -> &[StateRef] {
        &self.states
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn target(&self) -> Target {
        self.target
    }

    fn next_state_id(&mut self) -> usize {
        self.state_id_seq += 1;
        self.state_id_seq
    }

    /// Registers a handler for every invocation of `path.name`.
    pub fn register(&mut self, path: &str, name: &str, handler: FunctionHandler) {
        self.handlers
            .insert(FuncKey { path: path.to_string(), name: name.to_string() }, handler);
    }

    /// Computes initial values for all symbolic arrays referenced by the
    /// state's constraints. Errors with [`Error::Unsatisfiable`] if the
    /// constraints have no model.
    pub fn values(&self, state: &StateRef) -> Result<(Vec<crate::array::ArrayRef>, Vec<Vec<u8>>), Error> {
        let state = state.borrow();
        let arrays = find_arrays(state.constraints());
        let solver = self.solver.as_deref().ok_or(Error::NoSolver)?;
        match solver.solve(state.constraints(), &arrays)? {
            Solution::Unsat => Err(Error::Unsatisfiable),
            Solution::Sat(values) => Ok((arrays, values)),
        }
    }

    /// Executes the next available state until it forks or terminates.
    /// Call continually until [`Error::NoStateAvailable`] is returned.
    pub fn execute_next_state(&mut self) -> Result<StateRef, Error> {
        if !self.target.is_valid() {
            return Err(Error::InvalidTarget);
        }

        // A forked state may not execute further instructions; skip it and
        // fall through to the next candidate (a multi-searcher may hand the
        // same state out more than once).
        let state = loop {
            let Some(state) = self.searcher.select_state() else {
                return Err(Error::NoStateAvailable);
            };
            if !state.borrow().forked() {
                break state;
            }
        };

        debug!(
            "[state] begin: id={} pos={}",
            state.borrow().id(),
            self.position_string(&state)
        );

        loop {
            // A faulted or finished state stays in the tree but may not
            // advance any further.
            if state.borrow().terminated() {
                break;
            }
            match self.execute_next_instruction(&state) {
                Err(Error::NoInstructionAvailable) => break,
                Err(err) => return Err(err),
                Ok(()) => {
                    if state.borrow().done(&self.program) {
                        break;
                    }
                }
            }
        }
        Ok(state)
    }

    fn position_string(&self, state: &StateRef) -> String {
        match state.borrow().position(&self.program) {
            Some(pos) => pos.to_string(),
            None => "-".to_string(),
        }
    }

    fn execute_next_instruction(&mut self, state: &StateRef) -> Result<(), Error> {
        // Find the next instruction on the current frame, popping up to the
        // caller when a frame runs out. No frames left means the path is
        // complete.
        {
            let mut s = state.borrow_mut();
            loop {
                let Some(fid) = s.frame().map(|f| f.func) else {
                    return Err(Error::NoInstructionAvailable);
                };
                let func = self.program.func(fid);
                let frame = s.frame_mut().expect("frame disappeared");
                frame.next_instr(func);
                if frame.instr(func).is_some() {
                    break;
                }
                s.pop();
            }
        }

        let (kind, iid, block) = {
            let s = state.borrow();
            let frame = s.frame().expect("no current frame");
            let instr = frame.instr(self.program.func(frame.func)).expect("no current instruction");
            (instr.kind.clone(), instr.id, frame.block)
        };

        debug!("[exec] {}: {:?}", self.position_string(state), kind);

        let key = BindKey::Instr(iid);
        let target = self.target;
        match kind {
            InstrKind::Alloc { typ, heap } => {
                // Non-heap allocs were allocated when the frame was pushed.
                if !heap {
                    return Ok(());
                }
                let mut s = state.borrow_mut();
                let size = typ.deref().size_bytes(&target);
                let (addr, _) = s.alloc_zeroed(size);
                s.frame_mut().unwrap().bind(key, Binding::Expr(addr));
                Ok(())
            }
            InstrKind::BinOp { op, typ, x, y } => executor_binop::execute_binop(
                &mut state.borrow_mut(),
                key,
                op,
                &typ,
                &x,
                &y,
            ),
            InstrKind::Call { callee, args, sig } => {
                self.execute_call(state, iid, &callee, &args, &sig)
            }
            InstrKind::ChangeInterface { x } | InstrKind::ChangeType { x } => {
                let mut s = state.borrow_mut();
                let binding = s.eval(&x).expect("unbound operand");
                s.frame_mut().unwrap().bind(key, binding);
                Ok(())
            }
            InstrKind::Convert { src, dst, x } => {
                executor_mem::execute_convert(target, &mut state.borrow_mut(), key, &src, &dst, &x)
            }
            InstrKind::Extract { tuple, index } => {
                let mut s = state.borrow_mut();
                let Some(Binding::Tuple(items)) = s.eval(&tuple) else {
                    return Err(Error::InvalidOperand("extract expects a tuple".to_string()));
                };
                let item = items[index].clone();
                s.frame_mut().unwrap().bind(key, item);
                Ok(())
            }
            InstrKind::FieldAddr { struct_type, x, field } => executor_mem::execute_field_addr(
                target,
                &mut state.borrow_mut(),
                key,
                &struct_type,
                &x,
                field,
            ),
            InstrKind::If { cond } => self.execute_if(state, &cond, block),
            InstrKind::IndexAddr { typ, x, index } => executor_mem::execute_index_addr(
                target,
                &mut state.borrow_mut(),
                key,
                &typ,
                &x,
                &index,
            ),
            InstrKind::Jump => {
                let mut s = state.borrow_mut();
                let succ = {
                    let frame = s.frame().unwrap();
                    self.program.func(frame.func).blocks[frame.block.0].succs[0]
                };
                s.frame_mut().unwrap().jump(succ);
                Ok(())
            }
            InstrKind::Lookup { x, index } => {
                executor_mem::execute_lookup(&mut state.borrow_mut(), key, &x, &index)
            }
            InstrKind::MakeInterface { typ, x } => executor_mem::execute_make_interface(
                &self.program,
                target,
                &mut state.borrow_mut(),
                key,
                &typ,
                &x,
            ),
            InstrKind::MakeSlice { typ, len, cap } => executor_mem::execute_make_slice(
                target,
                &mut state.borrow_mut(),
                key,
                &typ,
                &len,
                cap.as_ref(),
            ),
            InstrKind::Phi { edges } => self.execute_phi(state, key, &edges),
            InstrKind::Return { results } => self.execute_return(state, &results),
            InstrKind::Slice { typ, x, low, high, max } => executor_mem::execute_slice(
                target,
                &mut state.borrow_mut(),
                key,
                &typ,
                &x,
                low.as_ref(),
                high.as_ref(),
                max.as_ref(),
            ),
            InstrKind::Store { addr, val } => {
                executor_mem::execute_store(&mut state.borrow_mut(), &addr, &val)
            }
            InstrKind::Deref { typ, x } => {
                executor_mem::execute_deref(target, &mut state.borrow_mut(), key, &typ, &x)
            }

            InstrKind::Defer | InstrKind::RunDefers => {
                Err(Error::Unsupported("defer is not supported".to_string()))
            }
            InstrKind::Go => Err(Error::Unsupported("goroutines are not supported".to_string())),
            InstrKind::MakeChan | InstrKind::Select | InstrKind::Send => {
                Err(Error::Unsupported("channels are not supported".to_string()))
            }
            InstrKind::MakeClosure => {
                Err(Error::Unsupported("closures are not supported".to_string()))
            }
            InstrKind::MakeMap | InstrKind::MapUpdate => {
                Err(Error::Unsupported("maps are not supported".to_string()))
            }
            InstrKind::Next | InstrKind::Range => {
                Err(Error::Unsupported("range iteration is not supported".to_string()))
            }
            InstrKind::Panic => Err(Error::Unsupported("panic is not supported".to_string())),
            InstrKind::TypeAssert => {
                Err(Error::Unsupported("type assertion is not supported".to_string()))
            }
            InstrKind::Field => {
                Err(Error::Unsupported("field value extraction is not supported".to_string()))
            }
            InstrKind::Index => {
                Err(Error::Unsupported("index value extraction is not supported".to_string()))
            }
        }
    }

    /// Call semantics: registered functions run through their handler; all
    /// other calls fork the state to represent the post-return position and
    /// push the callee's frame on the fork.
    fn execute_call(
        &mut self,
        state: &StateRef,
        iid: InstrId,
        callee: &Callee,
        arg_ops: &[Operand],
        sig: &Signature,
    ) -> Result<(), Error> {
        match callee {
            Callee::Builtin(name) => {
                let handler = *self
                    .handlers
                    .get(&FuncKey { path: String::new(), name: name.clone() })
                    .unwrap_or_else(|| panic!("unregistered builtin function: {name}"));
                let args = eval_args(state, arg_ops);
                let cx = CallContext { result: BindKey::Instr(iid), sig, args };
                handler(&self.program, self.target, &mut state.borrow_mut(), cx)
            }
            Callee::Function(fid) => {
                let (pkg, name) = {
                    let f = self.program.func(*fid);
                    (f.pkg.clone(), f.name.clone())
                };
                if let Some(&handler) =
                    self.handlers.get(&FuncKey { path: pkg.clone(), name: name.clone() })
                {
                    let args = eval_args(state, arg_ops);
                    let cx = CallContext { result: BindKey::Instr(iid), sig, args };
                    return handler(&self.program, self.target, &mut state.borrow_mut(), cx);
                }
                assert!(
                    !self.program.func(*fid).is_declaration(),
                    "call to undefined function: {pkg}.{name}"
                );

                let args = eval_args(state, arg_ops);
                debug!("[fork] call: {pkg} {name}");
                self.fork_into_callee(state, *fid, args);
                Ok(())
            }
            Callee::Invoke { value, method } => {
                // Read the interface's type-id and data words and resolve
                // the concrete method.
                let Some(Binding::Array(iface)) = state.borrow_mut().eval(value) else {
                    return Err(Error::InvalidOperand("invoke expects an interface".to_string()));
                };
                let (type_id, data) = {
                    let s = state.borrow();
                    (s.select_int_at(&iface, 0), s.select_int_at(&iface, 1))
                };
                let (tid, _) = type_id
                    .as_constant()
                    .expect("interface type id must be concrete");
                let fid = self
                    .program
                    .method(tid, method)
                    .unwrap_or_else(|| panic!("method not found: type={tid} name={method}"));

                let mut args = vec![Binding::Expr(data)]; // receiver
                args.extend(eval_args(state, arg_ops));
                debug!("[fork] invoke: {method}");
                self.fork_into_callee(state, fid, args);
                Ok(())
            }
        }
    }

    fn fork_into_callee(&mut self, state: &StateRef, fid: FuncId, args: Vec<Binding>) {
        let child = ExecutionState::fork(state, None);
        child.borrow_mut().id = self.next_state_id();
        child.borrow_mut().push(&self.program, fid);
        {
            let mut c = child.borrow_mut();
            let frame = c.frame_mut().expect("pushed frame missing");
            for (i, arg) in args.into_iter().enumerate() {
                frame.bind(BindKey::Param(i), arg);
            }
        }
        self.add_state(child);
    }

    /// Branch semantics: each feasible side forks a child carrying that
    /// side's constraint. The false branch is emitted before the true branch
    /// so that depth-first search explores the true branch first. If neither
    /// side is feasible the path dies silently.
    fn execute_if(&mut self, state: &StateRef, cond_op: &Operand, block: BlockId) -> Result<(), Error> {
        let cond = state
            .borrow_mut()
            .must_eval_expr(cond_op)
            .expect("unbound branch condition");
        let succs = {
            let s = state.borrow();
            let frame = s.frame().expect("no current frame");
            self.program.func(frame.func).blocks[block.0].succs.clone()
        };

        let not_cond = Expr::not(cond.clone());
        if self.feasible(state, not_cond.clone())? {
            debug!("[fork] condition false");
            let child = ExecutionState::fork(state, Some(not_cond));
            child.borrow_mut().id = self.next_state_id();
            child.borrow_mut().frame_mut().unwrap().jump(succs[1]);
            self.add_state(child);
        }

        if self.feasible(state, cond.clone())? {
            debug!("[fork] condition true");
            let child = ExecutionState::fork(state, Some(cond));
            child.borrow_mut().id = self.next_state_id();
            child.borrow_mut().frame_mut().unwrap().jump(succs[0]);
            self.add_state(child);
        }

        Ok(())
    }

    fn feasible(&self, state: &StateRef, extra: crate::expr::ExprRef) -> Result<bool, Error> {
        let solver = self.solver.as_deref().ok_or(Error::NoSolver)?;
        let mut constraints = state.borrow().constraints().to_vec();
        constraints.push(extra);
        Ok(solver.solve(&constraints, &[])?.is_sat())
    }

    /// Return semantics: results bind to the caller's call instruction (a
    /// single value for arity 1, a tuple otherwise), then the state forks
    /// and the fork pops its top frame. With a caller the fork resumes at
    /// the call site; returning from the outermost frame pops the last
    /// frame, which releases its stack-class arrays and finishes the fork.
    fn execute_return(&mut self, state: &StateRef, result_ops: &[Operand]) -> Result<(), Error> {
        if state.borrow().caller_frame().is_some() {
            let results: Vec<Binding> = {
                let mut s = state.borrow_mut();
                result_ops
                    .iter()
                    .map(|op| s.eval(op).expect("unbound return value"))
                    .collect()
            };

            let mut s = state.borrow_mut();
            let caller_idx = s.stack.len() - 2;
            let func = self.program.func(s.stack[caller_idx].func);
            if let Some(call) = s.stack[caller_idx].instr(func) {
                if matches!(call.kind, InstrKind::Call { .. }) {
                    let call_id = call.id;
                    let binding = match results.len() {
                        0 => None,
                        1 => results.into_iter().next(),
                        _ => Some(Binding::Tuple(results)),
                    };
                    if let Some(binding) = binding {
                        s.stack[caller_idx].bind(BindKey::Instr(call_id), binding);
                    }
                }
            }
        }

        // Split off a new state with the same constraints to keep the
        // returner's position observable.
        debug!("[fork] return");
        let child = ExecutionState::fork(state, None);
        child.borrow_mut().id = self.next_state_id();
        child.borrow_mut().pop();
        self.add_state(child);
        Ok(())
    }

    fn execute_phi(&mut self, state: &StateRef, key: BindKey, edges: &[Operand]) -> Result<(), Error> {
        let mut s = state.borrow_mut();
        let (prev, block, fid) = {
            let frame = s.frame().expect("no current frame");
            (frame.prev, frame.block, frame.func)
        };
        let preds = &self.program.func(fid).blocks[block.0].preds;
        let i = preds
            .iter()
            .position(|p| Some(*p) == prev)
            .expect("phi predecessor block not found");
        let binding = s.eval(&edges[i]).expect("unbound phi edge");
        s.frame_mut().unwrap().bind(key, binding);
        Ok(())
    }

    fn add_state(&mut self, state: StateRef) {
        self.states.push(state.clone());
        self.searcher.add_state(state);
    }
}

fn eval_args(state: &StateRef, ops: &[Operand]) -> Vec<Binding> {
    let mut s = state.borrow_mut();
    ops.iter().map(|op| s.eval(op).expect("unbound argument")).collect()
}
