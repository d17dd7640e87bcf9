//! Execution states: one snapshot per path under exploration.
//!
//! States form a tree rooted at the entry state. A fork deep-copies the call
//! stack and constraint list while sharing the heap snapshot and every
//! expression and array node by reference, then links the child under its
//! parent. States are never destroyed during a search so that tree-walking
//! strategies can reach every leaf through child pointers.

use std::cell::RefCell;
use std::fmt;
use std::fmt::Write as _;
use std::rc::{Rc, Weak};

use im::OrdMap;
use log::trace;

use crate::array::{Array, ArrayRef};
use crate::expr::{BinaryOp, Expr, ExprRef};
use crate::ir::{
    ConstKind, ConstValue, Function, FuncId, InstrKind, Operand, Position, Program,
};
use crate::target::Target;

use super::frame::{BindKey, Binding, StackFrame};

/// Shared handle to an execution state.
pub type StateRef = Rc<RefCell<ExecutionState>>;

/// The lifecycle status of a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Has future states.
    Running,
    /// Clean completion.
    Finished,
    /// A state-level fault occurred (see the reason string).
    Panicked,
    /// A test failure was recorded.
    Failed,
    /// The process exited.
    Exited,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Running => "running",
            Status::Finished => "finished",
            Status::Panicked => "panicked",
            Status::Failed => "failed",
            Status::Exited => "exited",
        };
        f.write_str(s)
    }
}

/// A snapshot of one path: call stack, heap, and path constraints.
pub struct ExecutionState {
    pub(crate) id: usize,
    pub(crate) parent: Option<Weak<RefCell<ExecutionState>>>,
    pub(crate) children: Vec<StateRef>,
    pub(crate) stack: Vec<StackFrame>,
    pub(crate) status: Status,
    pub(crate) reason: Option<String>,
    /// Heap address space: ordered map from base address to array. The map
    /// is persistent, so forks share the snapshot structurally.
    pub(crate) heap: OrdMap<u64, ArrayRef>,
    pub(crate) constraints: Vec<ExprRef>,
    target: Target,
}

impl ExecutionState {
    /// Creates the root state for the entry function and pushes its frame.
    pub fn new(target: Target, prog: &Program, entry: FuncId) -> StateRef {
        let state = Rc::new(RefCell::new(ExecutionState {
            id: 0,
            parent: None,
            children: Vec::new(),
            stack: Vec::new(),
            status: Status::Running,
            reason: None,
            heap: OrdMap::new(),
            constraints: Vec::new(),
            target,
        }));
        state.borrow_mut().push(prog, entry);
        state
    }

    /// The executor-assigned id.
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// Additional information when the status is not running.
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// Transitions the state's status, recording the reason.
    pub fn set_status(&mut self, status: Status, reason: &str) {
        self.status = status;
        self.reason = Some(reason.to_string());
    }

    /// True once the state has completed execution of a path.
    pub fn terminated(&self) -> bool {
        self.status != Status::Running
    }

    /// True once the state has child states; a forked state may not execute
    /// further instructions.
    pub fn forked(&self) -> bool {
        !self.children.is_empty()
    }

    pub fn children(&self) -> &[StateRef] {
        &self.children
    }

    pub fn parent(&self) -> Option<StateRef> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    pub fn constraints(&self) -> &[ExprRef] {
        &self.constraints
    }

    pub fn target(&self) -> Target {
        self.target
    }

    /// The current (innermost) stack frame.
    pub fn frame(&self) -> Option<&StackFrame> {
        self.stack.last()
    }

    pub fn frame_mut(&mut self) -> Option<&mut StackFrame> {
        self.stack.last_mut()
    }

    /// The frame that called the current frame.
    pub fn caller_frame(&self) -> Option<&StackFrame> {
        if self.stack.len() < 2 {
            return None;
        }
        self.stack.get(self.stack.len() - 2)
    }

    /// The source position of the current instruction. Conditional branches
    /// report the position of their condition.
    pub fn position(&self, prog: &Program) -> Option<Position> {
        let frame = self.frame()?;
        let f = prog.func(frame.func);
        let instr = frame.instr(f)?;
        match &instr.kind {
            InstrKind::If { cond } => f.operand_pos(cond),
            _ => instr.pos.clone(),
        }
    }

    /// True if the state has reached a point where the driver must stop
    /// stepping it: terminated, forked, or sitting on a branch or return.
    pub fn done(&self, prog: &Program) -> bool {
        if self.terminated() || self.forked() {
            return true;
        }
        let Some(frame) = self.frame() else { return false };
        match frame.instr(prog.func(frame.func)) {
            Some(instr) => matches!(instr.kind, InstrKind::If { .. } | InstrKind::Return { .. }),
            None => false,
        }
    }

    /// Evaluates an operand to its binding. Constants materialize on demand;
    /// zero-valued aggregates allocate zeroed storage.
    pub fn eval(&mut self, op: &Operand) -> Option<Binding> {
        match op {
            Operand::Const(c) => Some(self.eval_const(c)),
            Operand::Param(i) => self.frame()?.binding(BindKey::Param(*i)).cloned(),
            Operand::Result(id) => self.frame()?.binding(BindKey::Instr(*id)).cloned(),
        }
    }

    fn eval_const(&mut self, c: &ConstValue) -> Binding {
        match &c.kind {
            ConstKind::Int(v) => {
                Binding::Expr(Expr::constant(*v, c.typ.size_bits(&self.target)))
            }
            ConstKind::Bool(b) => Binding::Expr(Expr::bool_const(*b)),
            ConstKind::Str(s) => {
                let mut array = Array::new(0, s.len() as u32);
                for (i, byte) in s.bytes().enumerate() {
                    array.store_byte(Expr::constant64(i as u64), Expr::constant8(byte as u64));
                }
                Binding::Array(Rc::new(array))
            }
            ConstKind::Zero => {
                let size = c.typ.deref().size_bytes(&self.target);
                let (_, array) = self.alloc_zeroed(size);
                Binding::Array(array)
            }
        }
    }

    /// Evaluates an operand that must be a scalar expression. Panics on an
    /// array or tuple binding.
    pub fn must_eval_expr(&mut self, op: &Operand) -> Option<ExprRef> {
        match self.eval(op)? {
            Binding::Expr(e) => Some(e),
            other => panic!("binding must be an expression: {other}"),
        }
    }

    /// Evaluates an optional operand that must fold to a constant. A missing
    /// operand is `Ok(None)`; a symbolic binding is `Err(())`.
    pub fn eval_const_expr(&mut self, op: Option<&Operand>) -> Result<Option<ExprRef>, ()> {
        let Some(op) = op else { return Ok(None) };
        match self.eval(op) {
            None => Ok(None),
            Some(Binding::Expr(e)) if e.is_constant() => Ok(Some(e)),
            Some(_) => Err(()),
        }
    }

    /// Pushes a frame for `func`, pre-allocating its stack-class locals as
    /// zeroed arrays bound to their allocation instructions.
    pub fn push(&mut self, prog: &Program, func: FuncId) {
        let f = prog.func(func);
        let mut frame = StackFrame::new(func);

        for &local in &f.locals {
            let InstrKind::Alloc { typ, .. } = &f.instr(local).kind else {
                panic!("local is not an alloc instruction");
            };
            let size = typ.deref().size_bytes(&self.target);
            let (addr, array) = self.alloc_zeroed(size);
            frame.locals.push(array);
            frame.bind(BindKey::Instr(local), Binding::Expr(addr));
        }

        self.stack.push(frame);
    }

    /// Pops the current frame, releasing its stack-class arrays from the
    /// heap. The state finishes when the last frame leaves.
    pub fn pop(&mut self) {
        let frame = self.stack.pop().expect("pop on empty stack");
        for array in &frame.locals {
            self.heap.remove(&array.id);
        }
        if self.stack.is_empty() {
            self.status = Status::Finished;
        }
    }

    /// Creates a child copy of this state with an optional extra constraint.
    /// The stack and constraint list are deep-copied; the heap snapshot and
    /// all expression/array nodes are shared.
    pub fn fork(this: &StateRef, constraint: Option<ExprRef>) -> StateRef {
        let child = {
            let s = this.borrow();
            ExecutionState {
                id: 0,
                parent: Some(Rc::downgrade(this)),
                children: Vec::new(),
                stack: s.stack.clone(),
                status: s.status,
                reason: s.reason.clone(),
                heap: s.heap.clone(),
                constraints: s.constraints.clone(),
                target: s.target,
            }
        };
        let child = Rc::new(RefCell::new(child));
        if let Some(constraint) = constraint {
            child.borrow_mut().add_constraint(constraint);
        }
        this.borrow_mut().children.push(child.clone());
        child
    }

    /// Appends a constraint. Top-level conjunctions split into independent
    /// constraints to keep the solver context tight. A constant false
    /// constraint is an invariant violation of the fork logic and panics.
    pub fn add_constraint(&mut self, expr: ExprRef) {
        if expr.is_constant() {
            assert!(expr.is_true(), "invalid false constraint");
        }

        if let Expr::Binary { op: BinaryOp::And, lhs, rhs } = &*expr {
            self.add_constraint(lhs.clone());
            self.add_constraint(rhs.clone());
            return;
        }

        self.constraints.push(expr);
    }

    /// Allocates an array on the heap and returns its address expression and
    /// the array. Addresses are monotonic and never zero, so zero can stand
    /// for nil.
    pub fn alloc(&mut self, size: u32) -> (ExprRef, ArrayRef) {
        assert!(
            (size as u64) <= self.target.max_alloc_size(),
            "allocation too large: {size} > {}",
            self.target.max_alloc_size()
        );
        let addr = self.next_addr();
        let array = Rc::new(Array::new(addr, size));
        self.heap.insert(addr, array.clone());
        trace!("[alloc] addr={addr} size={size}");
        (Expr::constant(addr, self.target.pointer_width()), array)
    }

    /// Allocates a zero-initialized array.
    pub fn alloc_zeroed(&mut self, size: u32) -> (ExprRef, ArrayRef) {
        assert!(
            (size as u64) <= self.target.max_alloc_size(),
            "allocation too large: {size} > {}",
            self.target.max_alloc_size()
        );
        let addr = self.next_addr();
        let mut array = Array::new(addr, size);
        array.zero();
        let array = Rc::new(array);
        self.heap.insert(addr, array.clone());
        trace!("[alloc] addr={addr} size={size} zeroed");
        (Expr::constant(addr, self.target.pointer_width()), array)
    }

    /// The next available heap address: one past the highest live
    /// allocation, or the pointer size for an empty heap.
    fn next_addr(&self) -> u64 {
        match self.heap.get_max() {
            Some((addr, array)) => addr + array.size as u64,
            None => self.target.pointer_bytes() as u64,
        }
    }

    /// Returns the array allocated exactly at `addr`, if any.
    pub fn find_alloc_by_addr(&self, addr: u64) -> Option<ArrayRef> {
        self.heap.get(&addr).cloned()
    }

    /// Returns the base address and array whose range contains `addr`.
    pub fn find_alloc_containing(&self, addr: u64) -> Option<(u64, ArrayRef)> {
        let (base, array) = self.heap.range(..=addr).next_back()?;
        if addr >= *base && addr < base + array.size as u64 {
            return Some((*base, array.clone()));
        }
        None
    }

    /// Stores an expression value at a concrete address with the target's
    /// endianness, replacing the containing array in the heap.
    pub fn store(&mut self, addr: &ExprRef, value: ExprRef) {
        let (av, _) = addr.as_constant().expect("store: symbolic address");
        let (base, array) = self
            .find_alloc_containing(av)
            .unwrap_or_else(|| panic!("store: allocation not found: addr={av}"));
        let offset = Expr::binary(
            BinaryOp::Sub,
            addr.clone(),
            Expr::constant(base, self.target.pointer_width()),
        );
        let array = array.store(offset, value, self.target.is_little_endian());
        self.heap.insert(base, array);
    }

    /// Copies the bytes of `value` to a concrete address, byte by byte.
    pub fn copy(&mut self, addr: &ExprRef, value: &ArrayRef) {
        let (av, _) = addr.as_constant().expect("copy: symbolic address");
        let (base, array) = self
            .find_alloc_containing(av)
            .unwrap_or_else(|| panic!("copy: allocation not found: addr={av}"));

        let mut new_array = (*array).clone();
        let offset = av - base;
        for i in 0..value.size as u64 {
            new_array.store_byte(
                Expr::constant64(offset + i),
                value.select_byte(Expr::constant64(i)),
            );
        }
        self.heap.insert(base, Rc::new(new_array));
    }

    /// Reads the i-th pointer-width word from an array.
    pub fn select_int_at(&self, array: &ArrayRef, i: u32) -> ExprRef {
        let pw = self.target.pointer_width();
        array.select(
            Expr::constant((i * (pw / 8)) as u64, pw),
            pw,
            self.target.is_little_endian(),
        )
    }

    /// Returns a new array with the i-th pointer-width word updated.
    pub fn store_int_at(&self, array: &ArrayRef, i: u32, value: ExprRef) -> ArrayRef {
        let pw = self.target.pointer_width();
        array.store(
            Expr::constant((i * (pw / 8)) as u64, pw),
            value,
            self.target.is_little_endian(),
        )
    }

    /// Replaces (or inserts) a heap entry keyed by the array's own id.
    pub fn heap_set(&mut self, array: ArrayRef) {
        self.heap.insert(array.id, array);
    }

    /// Renders the frames, heap, and constraints for debugging.
    pub fn dump(&self, prog: &Program) -> String {
        let mut buf = String::new();
        writeln!(buf, "EXECUTION STATE").unwrap();
        writeln!(buf, "===============").unwrap();
        writeln!(buf, "status={}", self.status).unwrap();
        writeln!(buf, "reason={}", self.reason.as_deref().unwrap_or("")).unwrap();
        writeln!(buf).unwrap();

        for (i, frame) in self.stack.iter().enumerate().rev() {
            let f: &Function = prog.func(frame.func);
            writeln!(buf, "== FRAME #{i} fn={}.{}", f.pkg, f.name).unwrap();
            let mut keys: Vec<_> = frame.bindings.keys().copied().collect();
            keys.sort_by_key(|k| match k {
                BindKey::Param(i) => (0, *i),
                BindKey::Instr(id) => (1, id.0),
            });
            for key in keys {
                writeln!(buf, "{key:?}: {}", frame.bindings[&key]).unwrap();
            }
            writeln!(buf).unwrap();
        }

        writeln!(buf, "== HEAP").unwrap();
        for (addr, array) in self.heap.iter() {
            writeln!(buf, "{addr:08} {array}").unwrap();
            let mut upd = array.updates.clone();
            while let Some(u) = upd {
                writeln!(buf, "  + UPD: I={}; V={}", u.index, u.value).unwrap();
                upd = u.next.clone();
            }
        }
        writeln!(buf).unwrap();

        writeln!(buf, "== CONSTRAINTS").unwrap();
        for (i, expr) in self.constraints.iter().enumerate() {
            writeln!(buf, "{i}. {expr}").unwrap();
        }
        buf
    }
}
