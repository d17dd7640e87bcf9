//! The SSA program representation interpreted by the executor.
//!
//! The front end that lowers source code into this form is an external
//! collaborator; this module is the surface it targets. Programs are a set
//! of functions made of basic blocks holding instructions in static single
//! assignment form: every instruction that produces a value is itself the
//! name of that value, and operands refer to parameters or instruction
//! results. [`FunctionBuilder`] wires blocks and value numbering for hosts
//! and tests that assemble programs directly.

pub mod builder;
pub mod types;

pub use builder::FunctionBuilder;
pub use types::{field_offsets, IntKind, Type};

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Index of a function within a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuncId(pub usize);

/// Index of a basic block within a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub usize);

/// Function-local instruction number (flat across blocks).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstrId(pub usize);

/// A source position attached to an instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    pub file: Rc<str>,
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub fn new(file: &str, line: u32) -> Position {
        Position { file: file.into(), line, column: 0 }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.line == 0 {
            return f.write_str("-");
        }
        write!(f, "{}:{}", self.file, self.line)?;
        if self.column > 0 {
            write!(f, ":{}", self.column)?;
        }
        Ok(())
    }
}

/// A typed constant literal.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstValue {
    pub typ: Type,
    pub kind: ConstKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConstKind {
    Int(u64),
    Bool(bool),
    Str(String),
    /// The zero value of an aggregate type.
    Zero,
}

/// A reference to an SSA value.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Const(ConstValue),
    Param(usize),
    Result(InstrId),
}

impl Operand {
    /// An integer constant literal of the given type.
    pub fn int(value: u64, typ: Type) -> Operand {
        Operand::Const(ConstValue { typ, kind: ConstKind::Int(value) })
    }

    pub fn bool(value: bool) -> Operand {
        Operand::Const(ConstValue { typ: Type::Bool, kind: ConstKind::Bool(value) })
    }

    pub fn str(value: &str) -> Operand {
        Operand::Const(ConstValue { typ: Type::Str, kind: ConstKind::Str(value.to_string()) })
    }

    /// The zero value of an aggregate type.
    pub fn zero(typ: Type) -> Operand {
        Operand::Const(ConstValue { typ, kind: ConstKind::Zero })
    }
}

/// A function signature: parameter and result types.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Signature {
    pub params: Vec<Type>,
    pub results: Vec<Type>,
}

/// The callee of a call instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Callee {
    /// Statically resolved function.
    Function(FuncId),
    /// A language builtin such as `len` or `copy`.
    Builtin(String),
    /// Interface method dispatch: the method is resolved at execution time
    /// from the interface value's type-id word.
    Invoke { value: Operand, method: String },
}

/// The binary operator tokens of the source language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOpKind {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    /// Bit clear (AND NOT).
    AndNot,
    Eql,
    Neq,
    Lss,
    Leq,
    Gtr,
    Geq,
}

/// An SSA instruction kind.
#[derive(Debug, Clone, PartialEq)]
pub enum InstrKind {
    /// Stack or heap allocation of the zero value of `typ`.
    Alloc { typ: Type, heap: bool },
    /// Binary operation on operands of type `typ`.
    BinOp { op: BinOpKind, typ: Type, x: Operand, y: Operand },
    Call { callee: Callee, args: Vec<Operand>, sig: Signature },
    ChangeInterface { x: Operand },
    ChangeType { x: Operand },
    Convert { src: Type, dst: Type, x: Operand },
    /// Select the i-th element of a tuple value.
    Extract { tuple: Operand, index: usize },
    /// Address of the i-th field of the struct pointed to by `x`.
    FieldAddr { struct_type: Type, x: Operand, field: usize },
    /// Conditional branch; block successors are [then, else].
    If { cond: Operand },
    /// Address of the i-th element of an array or slice.
    IndexAddr { typ: Type, x: Operand, index: Operand },
    /// Unconditional branch to the block's sole successor.
    Jump,
    /// Byte read from a string.
    Lookup { x: Operand, index: Operand },
    MakeInterface { typ: Type, x: Operand },
    MakeSlice { typ: Type, len: Operand, cap: Option<Operand> },
    /// Merge of values flowing in from predecessor blocks (edge-ordered).
    Phi { edges: Vec<Operand> },
    Return { results: Vec<Operand> },
    /// Slice of an array pointer, slice, or string.
    Slice { typ: Type, x: Operand, low: Option<Operand>, high: Option<Operand>, max: Option<Operand> },
    Store { addr: Operand, val: Operand },
    /// Pointer dereference producing a value of `typ`.
    Deref { typ: Type, x: Operand },

    // Recognized but unsupported instruction kinds. Executing any of these
    // surfaces a feature-not-supported error and leaves the state intact.
    Defer,
    Go,
    MakeChan,
    MakeClosure,
    MakeMap,
    MapUpdate,
    Next,
    Panic,
    Range,
    RunDefers,
    Select,
    Send,
    TypeAssert,
    Field,
    Index,
}

/// An instruction with its function-local id and optional source position.
#[derive(Debug, Clone, PartialEq)]
pub struct Instr {
    pub id: InstrId,
    pub kind: InstrKind,
    pub pos: Option<Position>,
}

/// A basic block: an instruction list plus control-flow edges.
#[derive(Debug, Clone, Default)]
pub struct Block {
    pub instrs: Vec<Instr>,
    pub preds: Vec<BlockId>,
    pub succs: Vec<BlockId>,
}

/// A function definition. Functions with no blocks are external
/// declarations; calling one requires a registered handler.
#[derive(Debug, Clone)]
pub struct Function {
    pub pkg: String,
    pub name: String,
    pub sig: Signature,
    /// Non-heap allocation instructions, pre-allocated on frame push.
    pub locals: Vec<InstrId>,
    pub blocks: Vec<Block>,
    /// Location of each instruction id as (block, index-in-block).
    instr_index: Vec<(usize, usize)>,
}

impl Function {
    /// Looks up an instruction by id.
    pub fn instr(&self, id: InstrId) -> &Instr {
        let (b, i) = self.instr_index[id.0];
        &self.blocks[b].instrs[i]
    }

    /// The position of the instruction defining an operand, if any.
    pub fn operand_pos(&self, op: &Operand) -> Option<Position> {
        match op {
            Operand::Result(id) => self.instr(*id).pos.clone(),
            _ => None,
        }
    }

    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// A complete program: functions, an interned type table for interface
/// dispatch, and a method table.
#[derive(Debug, Default)]
pub struct Program {
    pub functions: Vec<Function>,
    types: Vec<Type>,
    type_ids: HashMap<Type, u64>,
    methods: HashMap<(u64, String), FuncId>,
}

impl Program {
    pub fn new() -> Program {
        Program::default()
    }

    /// Adds a function, interning any types it boxes into interfaces so that
    /// type ids are assigned deterministically in program order.
    pub fn add_function(&mut self, f: Function) -> FuncId {
        for block in &f.blocks {
            for instr in &block.instrs {
                if let InstrKind::MakeInterface { typ, .. } = &instr.kind {
                    self.intern_type(typ);
                }
            }
        }
        self.functions.push(f);
        FuncId(self.functions.len() - 1)
    }

    /// Declares an external function with no body.
    pub fn declare(&mut self, pkg: &str, name: &str, params: &[Type], results: &[Type]) -> FuncId {
        self.functions.push(Function {
            pkg: pkg.to_string(),
            name: name.to_string(),
            sig: Signature { params: params.to_vec(), results: results.to_vec() },
            locals: Vec::new(),
            blocks: Vec::new(),
            instr_index: Vec::new(),
        });
        FuncId(self.functions.len() - 1)
    }

    pub fn func(&self, id: FuncId) -> &Function {
        &self.functions[id.0]
    }

    /// Registers `fid` as the implementation of `name` on `typ`.
    pub fn register_method(&mut self, typ: &Type, name: &str, fid: FuncId) {
        let id = self.intern_type(typ);
        self.methods.insert((id, name.to_string()), fid);
    }

    /// Resolves a method on the type identified by `type_id`.
    pub fn method(&self, type_id: u64, name: &str) -> Option<FuncId> {
        self.methods.get(&(type_id, name.to_string())).copied()
    }

    /// Returns the id previously interned for `typ`. Panics for types that
    /// were never boxed into an interface.
    pub fn type_id(&self, typ: &Type) -> u64 {
        *self
            .type_ids
            .get(typ)
            .unwrap_or_else(|| panic!("type not interned: {typ:?}"))
    }

    /// Returns the type registered under `id`, if any.
    pub fn type_by_id(&self, id: u64) -> Option<&Type> {
        if id == 0 {
            return None;
        }
        self.types.get(id as usize - 1)
    }

    fn intern_type(&mut self, typ: &Type) -> u64 {
        if let Some(id) = self.type_ids.get(typ) {
            return *id;
        }
        self.types.push(typ.clone());
        let id = self.types.len() as u64;
        self.type_ids.insert(typ.clone(), id);
        id
    }
}
