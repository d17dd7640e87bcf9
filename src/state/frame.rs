//! Call stack frames and SSA value bindings.

use std::collections::HashMap;
use std::fmt;

use crate::array::ArrayRef;
use crate::expr::ExprRef;
use crate::ir::{BlockId, Function, FuncId, Instr, InstrId};

/// Key identifying an SSA value within one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindKey {
    Param(usize),
    Instr(InstrId),
}

/// The value tied to an SSA name: an expression for scalars, an array for
/// aggregates (slices, strings, interfaces), or a tuple for multi-result
/// instructions.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    Expr(ExprRef),
    Array(ArrayRef),
    Tuple(Vec<Binding>),
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::Expr(e) => write!(f, "{e}"),
            Binding::Array(a) => write!(f, "{a}"),
            Binding::Tuple(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

/// The state of a call into a function.
#[derive(Debug, Clone)]
pub struct StackFrame {
    pub func: FuncId,
    /// Stack-class allocations, released from the heap when the frame pops.
    pub(crate) locals: Vec<ArrayRef>,
    pub(crate) bindings: HashMap<BindKey, Binding>,
    /// Current basic block.
    pub block: BlockId,
    /// Previously executed block, for phi resolution.
    pub prev: Option<BlockId>,
    /// Program counter within the block; -1 before the first fetch.
    pub pc: i64,
}

impl StackFrame {
    pub fn new(func: FuncId) -> StackFrame {
        StackFrame {
            func,
            locals: Vec::new(),
            bindings: HashMap::new(),
            block: BlockId(0),
            prev: None,
            pc: -1,
        }
    }

    /// Returns the current instruction, if the pc is inside the block.
    pub fn instr<'a>(&self, f: &'a Function) -> Option<&'a Instr> {
        if self.pc < 0 {
            return None;
        }
        f.blocks[self.block.0].instrs.get(self.pc as usize)
    }

    /// Moves execution to the next instruction.
    pub fn next_instr(&mut self, f: &Function) {
        if self.pc < f.blocks[self.block.0].instrs.len() as i64 {
            self.pc += 1;
        }
    }

    /// Moves to `dst`, remembering the current block for phi resolution.
    pub fn jump(&mut self, dst: BlockId) {
        self.prev = Some(self.block);
        self.block = dst;
        self.pc = -1;
    }

    /// Binds a value to an SSA name.
    pub fn bind(&mut self, key: BindKey, binding: Binding) {
        self.bindings.insert(key, binding);
    }

    /// Returns the binding for an SSA name, if any.
    pub fn binding(&self, key: BindKey) -> Option<&Binding> {
        self.bindings.get(&key)
    }
}
