//! Convenience builder for assembling SSA functions.
//!
//! Front ends and tests construct functions by pushing instructions into
//! blocks; the builder assigns value numbers, records non-heap allocations,
//! and wires predecessor/successor edges for the branch helpers.

use std::rc::Rc;

use super::{
    BinOpKind, Block, BlockId, Callee, Function, InstrId, Instr, InstrKind, Operand, Position,
    Program, Signature, Type,
};

pub struct FunctionBuilder {
    pkg: String,
    name: String,
    sig: Signature,
    blocks: Vec<Block>,
    locals: Vec<InstrId>,
    instr_index: Vec<(usize, usize)>,
    file: Rc<str>,
}

impl FunctionBuilder {
    /// Starts a function with a single empty entry block. `file` is the
    /// source file used for instruction positions.
    pub fn new(pkg: &str, name: &str, file: &str) -> FunctionBuilder {
        FunctionBuilder {
            pkg: pkg.to_string(),
            name: name.to_string(),
            sig: Signature::default(),
            blocks: vec![Block::default()],
            locals: Vec::new(),
            instr_index: Vec::new(),
            file: file.into(),
        }
    }

    /// The entry block created by `new`.
    pub fn entry(&self) -> BlockId {
        BlockId(0)
    }

    /// Appends a parameter and returns the operand referring to it.
    pub fn param(&mut self, typ: Type) -> Operand {
        self.sig.params.push(typ);
        Operand::Param(self.sig.params.len() - 1)
    }

    pub fn set_results(&mut self, results: Vec<Type>) {
        self.sig.results = results;
    }

    /// Appends a new empty block.
    pub fn block(&mut self) -> BlockId {
        self.blocks.push(Block::default());
        BlockId(self.blocks.len() - 1)
    }

    /// Appends an instruction with a source line in the builder's file.
    pub fn push(&mut self, block: BlockId, kind: InstrKind, line: u32) -> Operand {
        self.push_pos(block, kind, Some(Position { file: self.file.clone(), line, column: 0 }))
    }

    /// Appends an instruction with no source position.
    pub fn push_unpositioned(&mut self, block: BlockId, kind: InstrKind) -> Operand {
        self.push_pos(block, kind, None)
    }

    fn push_pos(&mut self, block: BlockId, kind: InstrKind, pos: Option<Position>) -> Operand {
        let id = InstrId(self.instr_index.len());
        if let InstrKind::Alloc { heap: false, .. } = kind {
            self.locals.push(id);
        }
        self.instr_index.push((block.0, self.blocks[block.0].instrs.len()));
        self.blocks[block.0].instrs.push(Instr { id, kind, pos });
        Operand::Result(id)
    }

    /// Appends a conditional branch; wires `then`/`els` as the block's
    /// successors in that order.
    pub fn cond_br(&mut self, block: BlockId, cond: Operand, then: BlockId, els: BlockId, line: u32) {
        self.push(block, InstrKind::If { cond }, line);
        self.blocks[block.0].succs = vec![then, els];
        self.blocks[then.0].preds.push(block);
        self.blocks[els.0].preds.push(block);
    }

    /// Appends an unconditional branch to `to`.
    pub fn jump(&mut self, block: BlockId, to: BlockId, line: u32) {
        self.push(block, InstrKind::Jump, line);
        self.blocks[block.0].succs = vec![to];
        self.blocks[to.0].preds.push(block);
    }

    /// Appends a return with a source position.
    pub fn ret(&mut self, block: BlockId, results: Vec<Operand>, line: u32) {
        self.push(block, InstrKind::Return { results }, line);
    }

    /// Appends a return with no position (an implicit return).
    pub fn ret_implicit(&mut self, block: BlockId, results: Vec<Operand>) {
        self.push_unpositioned(block, InstrKind::Return { results });
    }

    /// Appends a non-heap allocation of `typ`, bound when the frame is
    /// pushed. Returns the operand holding the allocation's address.
    pub fn local(&mut self, block: BlockId, typ: Type, line: u32) -> Operand {
        self.push(block, InstrKind::Alloc { typ, heap: false }, line)
    }

    /// Appends a binary operation on operands of type `typ`.
    pub fn binop(
        &mut self,
        block: BlockId,
        op: BinOpKind,
        typ: Type,
        x: Operand,
        y: Operand,
        line: u32,
    ) -> Operand {
        self.push(block, InstrKind::BinOp { op, typ, x, y }, line)
    }

    /// Appends a call to a declared or defined function, cloning its
    /// signature from the program.
    pub fn call(
        &mut self,
        block: BlockId,
        prog: &Program,
        callee: super::FuncId,
        args: Vec<Operand>,
        line: u32,
    ) -> Operand {
        let sig = prog.func(callee).sig.clone();
        self.push(block, InstrKind::Call { callee: Callee::Function(callee), args, sig }, line)
    }

    /// Appends a call to a language builtin such as `len` or `copy`.
    pub fn call_builtin(
        &mut self,
        block: BlockId,
        name: &str,
        args: Vec<Operand>,
        sig: Signature,
        line: u32,
    ) -> Operand {
        self.push(
            block,
            InstrKind::Call { callee: Callee::Builtin(name.to_string()), args, sig },
            line,
        )
    }

    /// Appends an interface method invocation.
    pub fn invoke(
        &mut self,
        block: BlockId,
        value: Operand,
        method: &str,
        args: Vec<Operand>,
        sig: Signature,
        line: u32,
    ) -> Operand {
        self.push(
            block,
            InstrKind::Call {
                callee: Callee::Invoke { value, method: method.to_string() },
                args,
                sig,
            },
            line,
        )
    }

    pub fn finish(self) -> Function {
        Function {
            pkg: self.pkg,
            name: self.name,
            sig: self.sig,
            locals: self.locals,
            blocks: self.blocks,
            instr_index: self.instr_index,
        }
    }
}
