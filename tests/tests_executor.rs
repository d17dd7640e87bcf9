//! End-to-end executor tests over hand-assembled SSA programs.
//!
//! Each test mirrors a small source program; line numbers in the builders
//! refer to the commented listings so that position assertions read like the
//! original sources.

mod common;

use common::{declare_symbolics, eval_u64, init_logging, new_executor, next_finished, pos_of};
use svarog::ir::{BinOpKind, FunctionBuilder, IntKind, InstrKind, Operand, Program, Signature, Type};
use svarog::{BinaryOp, Error, Expr, Status};

/// func simple() {            // line 2
///     x := svarog.Int()      // line 3
///     if x == 0xAABB {       // line 4
///         return             // line 5
///     }
/// }
fn simple_if_program() -> (Program, svarog::ir::FuncId, Operand) {
    let mut prog = Program::new();
    let sym = declare_symbolics(&mut prog);

    let mut f = FunctionBuilder::new("main", "simple", "simple.go");
    let b0 = f.entry();
    let b_then = f.block();
    let b_else = f.block();
    let x = f.call(b0, &prog, sym.int, vec![], 3);
    let cond = f.binop(b0, BinOpKind::Eql, Type::int(), x.clone(), Operand::int(0xAABB, Type::int()), 4);
    f.cond_br(b0, cond, b_then, b_else, 4);
    f.ret(b_then, vec![], 5);
    f.ret_implicit(b_else, vec![]);
    let fid = prog.add_function(f.finish());
    (prog, fid, x)
}

#[test]
fn symbolic_if() {
    init_logging();
    let (prog, fid, x) = simple_if_program();
    let mut e = new_executor(prog, fid);

    // The initial state runs to the branch, forking both sides; it reports
    // the condition's position and carries no constraints.
    let state = e.execute_next_state().unwrap();
    assert_eq!(pos_of(&e, &state), "simple.go:4");
    assert!(state.borrow_mut().eval(&x).is_some());
    assert!(state.borrow().constraints().is_empty());

    // Depth-first explores the true branch next: one EQ constraint whose
    // model pins x to 0xAABB (64-bit little-endian).
    let state = e.execute_next_state().unwrap();
    assert_eq!(pos_of(&e, &state), "simple.go:5");
    {
        let s = state.borrow();
        assert_eq!(s.constraints().len(), 1);
        assert!(matches!(&*s.constraints()[0], Expr::Binary { op: BinaryOp::Eq, .. }));
    }
    let (arrays, values) = e.values(&state).unwrap();
    assert_eq!(arrays.len(), 1);
    assert_eq!(values[0], vec![0xBB, 0xAA, 0, 0, 0, 0, 0, 0]);

    // The return pops the only frame on a forked continuation, which
    // surfaces as a finished state.
    next_finished(&mut e);

    // The false branch carries the negation and any model avoids 0xAABB.
    let state = e.execute_next_state().unwrap();
    assert_eq!(pos_of(&e, &state), "-");
    {
        let s = state.borrow();
        assert_eq!(s.constraints().len(), 1);
        assert!(matches!(&*s.constraints()[0], Expr::Not { .. }));
    }
    let (arrays, values) = e.values(&state).unwrap();
    assert_eq!(arrays.len(), 1);
    assert_ne!(values[0], vec![0xBB, 0xAA, 0, 0, 0, 0, 0, 0]);
    next_finished(&mut e);

    // Both sides explored; nothing remains.
    assert!(matches!(e.execute_next_state(), Err(Error::NoStateAvailable)));
}

/// func caller() {                     // line 7
///     x := svarog.Int8()              // line 8
///     y := svarog.Int16()             // line 9
///     z := callee(x, y)               // line 10
///     if z == 0xAABB {                // line 11
///         return                      // line 12
///     }
/// }
/// func callee(a int8, b int16) int32 { // line 17
///     x := int32(a) * int32(b)         // line 18
///     if x > 10 {                      // line 18
///         return x + 1                 // line 19
///     }
///     return x - 1                     // line 21
/// }
fn call_program() -> (Program, svarog::ir::FuncId, Operand, Operand, Operand) {
    let mut prog = Program::new();
    let sym = declare_symbolics(&mut prog);

    let i32t = Type::Int(IntKind::I32);

    let mut f = FunctionBuilder::new("main", "callee", "simple.go");
    let b0 = f.entry();
    let b_then = f.block();
    let b_else = f.block();
    let a = f.param(Type::Int(IntKind::I8));
    let b = f.param(Type::Int(IntKind::I16));
    f.set_results(vec![i32t.clone()]);
    let ca = f.push(b0, InstrKind::Convert { src: Type::Int(IntKind::I8), dst: i32t.clone(), x: a }, 18);
    let cb = f.push(b0, InstrKind::Convert { src: Type::Int(IntKind::I16), dst: i32t.clone(), x: b }, 18);
    let x = f.binop(b0, BinOpKind::Mul, i32t.clone(), ca, cb, 18);
    let cond = f.binop(b0, BinOpKind::Gtr, i32t.clone(), x.clone(), Operand::int(10, i32t.clone()), 18);
    f.cond_br(b0, cond, b_then, b_else, 18);
    let plus = f.binop(b_then, BinOpKind::Add, i32t.clone(), x.clone(), Operand::int(1, i32t.clone()), 19);
    f.ret(b_then, vec![plus], 19);
    let minus = f.binop(b_else, BinOpKind::Sub, i32t.clone(), x.clone(), Operand::int(1, i32t.clone()), 21);
    f.ret(b_else, vec![minus], 21);
    let callee = prog.add_function(f.finish());

    let mut f = FunctionBuilder::new("main", "caller", "simple.go");
    let b0 = f.entry();
    let b_then = f.block();
    let b_else = f.block();
    let cx = f.call(b0, &prog, sym.int8, vec![], 8);
    let cy = f.call(b0, &prog, sym.int16, vec![], 9);
    let z = f.call(b0, &prog, callee, vec![cx.clone(), cy.clone()], 10);
    let cond = f.binop(b0, BinOpKind::Eql, i32t.clone(), z, Operand::int(0xAABB, i32t), 11);
    f.cond_br(b0, cond, b_then, b_else, 11);
    f.ret(b_then, vec![], 12);
    f.ret_implicit(b_else, vec![]);
    let caller = prog.add_function(f.finish());

    (prog, caller, cx, cy, x)
}

#[test]
fn call_and_branch_composition() {
    init_logging();
    let (prog, caller, x_op, y_op, callee_x) = call_program();
    let mut e = new_executor(prog, caller);

    // The initial state stops at the call to callee().
    let state = e.execute_next_state().unwrap();
    assert_eq!(pos_of(&e, &state), "simple.go:10");

    // The callee frame stops at its branch.
    let state = e.execute_next_state().unwrap();
    assert_eq!(pos_of(&e, &state), "simple.go:18");

    // Callee true branch runs to its return; the model satisfies x > 10.
    let state = e.execute_next_state().unwrap();
    assert_eq!(pos_of(&e, &state), "simple.go:19");
    let (arrays, values) = e.values(&state).unwrap();
    let xv = eval_u64(&state, &arrays, &values, &callee_x) as u32 as i32;
    assert!(xv > 10, "x={xv}");

    // Back in the caller, stopping at its branch.
    let state = e.execute_next_state().unwrap();
    assert_eq!(pos_of(&e, &state), "simple.go:11");

    // Caller true: x*y + 1 == 0xAABB. Its top-level return finishes on a
    // forked continuation.
    let state = e.execute_next_state().unwrap();
    assert_eq!(pos_of(&e, &state), "simple.go:12");
    let (arrays, values) = e.values(&state).unwrap();
    let xv = eval_u64(&state, &arrays, &values, &x_op) as u8 as i8;
    let yv = eval_u64(&state, &arrays, &values, &y_op) as u16 as i16;
    assert_eq!((xv as i32) * (yv as i32) + 1, 0xAABB, "x={xv} y={yv}");
    next_finished(&mut e);

    // Caller false: the implicit return has no position.
    let state = e.execute_next_state().unwrap();
    assert_eq!(pos_of(&e, &state), "-");
    let (arrays, values) = e.values(&state).unwrap();
    let xv = eval_u64(&state, &arrays, &values, &x_op) as u8 as i8;
    let yv = eval_u64(&state, &arrays, &values, &y_op) as u16 as i16;
    assert_ne!((xv as i32) * (yv as i32) + 1, 0xAABB);
    next_finished(&mut e);

    // Callee false branch runs to its return with x <= 10.
    let state = e.execute_next_state().unwrap();
    assert_eq!(pos_of(&e, &state), "simple.go:21");
    let (arrays, values) = e.values(&state).unwrap();
    let xv = eval_u64(&state, &arrays, &values, &callee_x) as u32 as i32;
    assert!(xv <= 10, "x={xv}");

    // Back in the caller.
    let state = e.execute_next_state().unwrap();
    assert_eq!(pos_of(&e, &state), "simple.go:11");

    // The caller's true side is infeasible after callee false (x <= 10
    // forces z <= 9), so only the false leaf emerges.
    let state = e.execute_next_state().unwrap();
    assert_eq!(pos_of(&e, &state), "-");
    let (arrays, values) = e.values(&state).unwrap();
    let xv = eval_u64(&state, &arrays, &values, &x_op) as u8 as i8;
    let yv = eval_u64(&state, &arrays, &values, &y_op) as u16 as i16;
    assert_ne!((xv as i32) * (yv as i32) + 1, 0xAABB);
    next_finished(&mut e);

    assert!(matches!(e.execute_next_state(), Err(Error::NoStateAvailable)));
}

/// func sliceByteSlice() {        // line 7
///     a := svarog.ByteSlice(4)   // line 8
///     b := a[1:3]                // line 9
///     s := string(b)             // line 10
///     if s == "XY" {             // line 12
///         return                 // line 13
///     }
///     return                     // line 15
/// }
#[test]
fn byte_slice_to_string_compare() {
    init_logging();
    let mut prog = Program::new();
    let sym = declare_symbolics(&mut prog);

    let byte_slice = Type::slice(Type::byte());
    let mut f = FunctionBuilder::new("main", "sliceByteSlice", "byte_slice.go");
    let b0 = f.entry();
    let b_then = f.block();
    let b_else = f.block();
    let a = f.call(b0, &prog, sym.byte_slice, vec![Operand::int(4, Type::int())], 8);
    let b = f.push(
        b0,
        InstrKind::Slice {
            typ: byte_slice.clone(),
            x: a,
            low: Some(Operand::int(1, Type::int())),
            high: Some(Operand::int(3, Type::int())),
            max: None,
        },
        9,
    );
    let s = f.push(b0, InstrKind::Convert { src: byte_slice, dst: Type::Str, x: b }, 10);
    let cond = f.binop(b0, BinOpKind::Eql, Type::Str, s, Operand::str("XY"), 12);
    f.cond_br(b0, cond, b_then, b_else, 12);
    f.ret(b_then, vec![], 13);
    f.ret(b_else, vec![], 15);
    let fid = prog.add_function(f.finish());

    let mut e = new_executor(prog, fid);

    let state = e.execute_next_state().unwrap();
    assert_eq!(pos_of(&e, &state), "byte_slice.go:12");

    // True side: the backing array holds "XY" at bytes 1..3.
    let state = e.execute_next_state().unwrap();
    assert_eq!(pos_of(&e, &state), "byte_slice.go:13");
    let (_, values) = e.values(&state).unwrap();
    assert_eq!(&values[0][1..3], b"XY");
    next_finished(&mut e);

    // False side: anything else.
    let state = e.execute_next_state().unwrap();
    assert_eq!(pos_of(&e, &state), "byte_slice.go:15");
    let (_, values) = e.values(&state).unwrap();
    assert_ne!(&values[0][1..3], b"XY");
}

/// Appends `svarog.Assert(a[i] <op> b[i])` to the block.
fn assert_byte_compare(
    f: &mut FunctionBuilder,
    prog: &Program,
    assert_fid: svarog::ir::FuncId,
    b0: svarog::ir::BlockId,
    a: &Operand,
    b: &Operand,
    i: u64,
    op: BinOpKind,
    line: u32,
) {
    let ai = f.push(b0, InstrKind::Lookup { x: a.clone(), index: Operand::int(i, Type::int()) }, line);
    let bi = f.push(b0, InstrKind::Lookup { x: b.clone(), index: Operand::int(i, Type::int()) }, line);
    let cond = f.binop(b0, op, Type::byte(), ai, bi, line);
    f.call(b0, prog, assert_fid, vec![cond], line);
}

/// func geqImpossible() {          // line 7
///     a := svarog.String(3)       // line 8
///     b := svarog.String(3)       // line 9
///     svarog.Assert(a[0] == b[0]) // line 10
///     svarog.Assert(a[1] < b[1])  // line 11
///     svarog.Assert(a[2] > b[2])  // line 12
///     if a >= b {                 // line 14
///         return                  // line 15
///     }
///     return                      // line 17
/// }
#[test]
fn string_compare_impossible_side() {
    init_logging();
    let mut prog = Program::new();
    let sym = declare_symbolics(&mut prog);

    let mut f = FunctionBuilder::new("main", "geqImpossible", "geq.go");
    let b0 = f.entry();
    let b_then = f.block();
    let b_else = f.block();
    let a = f.call(b0, &prog, sym.string, vec![Operand::int(3, Type::int())], 8);
    let b = f.call(b0, &prog, sym.string, vec![Operand::int(3, Type::int())], 9);
    assert_byte_compare(&mut f, &prog, sym.assert, b0, &a, &b, 0, BinOpKind::Eql, 10);
    assert_byte_compare(&mut f, &prog, sym.assert, b0, &a, &b, 1, BinOpKind::Lss, 11);
    assert_byte_compare(&mut f, &prog, sym.assert, b0, &a, &b, 2, BinOpKind::Gtr, 12);
    let cond = f.binop(b0, BinOpKind::Geq, Type::Str, a, b, 14);
    f.cond_br(b0, cond, b_then, b_else, 14);
    f.ret(b_then, vec![], 15);
    f.ret(b_else, vec![], 17);
    let fid = prog.add_function(f.finish());

    let mut e = new_executor(prog, fid);

    // The asserted bytes make a >= b unsatisfiable: a[1] < b[1] decides the
    // comparison before a[2] can. Only the false side forks.
    let state = e.execute_next_state().unwrap();
    assert_eq!(pos_of(&e, &state), "geq.go:14");
    assert_eq!(state.borrow().children().len(), 1);

    let state = e.execute_next_state().unwrap();
    assert_eq!(pos_of(&e, &state), "geq.go:17");
    assert!(e.values(&state).is_ok());
    next_finished(&mut e);

    assert!(matches!(e.execute_next_state(), Err(Error::NoStateAvailable)));
}

/// Both sides of an ordered compare stay feasible without pinning asserts,
/// and the true-side model is lexicographically ordered.
#[test]
fn string_compare_feasible_both_sides() {
    init_logging();
    let mut prog = Program::new();
    let sym = declare_symbolics(&mut prog);

    let mut f = FunctionBuilder::new("main", "lssEqualLen", "lss.go");
    let b0 = f.entry();
    let b_then = f.block();
    let b_else = f.block();
    let a = f.call(b0, &prog, sym.string, vec![Operand::int(2, Type::int())], 8);
    let b = f.call(b0, &prog, sym.string, vec![Operand::int(2, Type::int())], 9);
    let cond = f.binop(b0, BinOpKind::Lss, Type::Str, a, b, 11);
    f.cond_br(b0, cond, b_then, b_else, 11);
    f.ret(b_then, vec![], 12);
    f.ret(b_else, vec![], 14);
    let fid = prog.add_function(f.finish());

    let mut e = new_executor(prog, fid);

    let state = e.execute_next_state().unwrap();
    assert_eq!(state.borrow().children().len(), 2);

    // True side: a < b byte-wise.
    let state = e.execute_next_state().unwrap();
    assert_eq!(pos_of(&e, &state), "lss.go:12");
    let (arrays, values) = e.values(&state).unwrap();
    assert_eq!(arrays.len(), 2);
    assert!(values[0] < values[1], "{:?} vs {:?}", values[0], values[1]);
    next_finished(&mut e);

    // False side: a >= b.
    let state = e.execute_next_state().unwrap();
    assert_eq!(pos_of(&e, &state), "lss.go:14");
    let (_, values) = e.values(&state).unwrap();
    assert!(values[0] >= values[1], "{:?} vs {:?}", values[0], values[1]);
}

/// func outOfBounds() {       // line 7
///     a := svarog.String(3)  // line 8
///     b := a[0:5]            // line 9
///     _ = b
/// }
#[test]
fn string_slice_out_of_bounds_panics_state() {
    init_logging();
    let mut prog = Program::new();
    let sym = declare_symbolics(&mut prog);

    let mut f = FunctionBuilder::new("main", "outOfBounds", "oob.go");
    let b0 = f.entry();
    let a = f.call(b0, &prog, sym.string, vec![Operand::int(3, Type::int())], 8);
    f.push(
        b0,
        InstrKind::Slice {
            typ: Type::Str,
            x: a,
            low: Some(Operand::int(0, Type::int())),
            high: Some(Operand::int(5, Type::int())),
            max: None,
        },
        9,
    );
    f.ret(b0, vec![], 10);
    let fid = prog.add_function(f.finish());

    let mut e = new_executor(prog, fid);

    let state = e.execute_next_state().unwrap();
    let s = state.borrow();
    assert_eq!(s.status(), Status::Panicked);
    assert_eq!(s.reason(), Some("slice bounds out of range"));
    assert!(s.constraints().is_empty());
}

/// type T struct {            // A int8; B, C int; D int32
/// }
/// func simple() {            // line 7
///     var t T                // line 8
///     t.A = 5                // line 9
///     t.B = svarog.Int()     // line 10
///     t.C = 7                // line 11
///     t.D = 8                // line 12
///     if int(t.A)+t.B == t.C { // line 14
///         return             // line 15
///     }
///     return                 // line 17
/// }
#[test]
fn struct_fields_through_memory() {
    init_logging();
    let mut prog = Program::new();
    let sym = declare_symbolics(&mut prog);

    let t = Type::strukt(vec![
        Type::Int(IntKind::I8),
        Type::int(),
        Type::int(),
        Type::Int(IntKind::I32),
    ]);

    let mut f = FunctionBuilder::new("main", "simple", "struct.go");
    let b0 = f.entry();
    let b_then = f.block();
    let b_else = f.block();

    let tp = f.local(b0, t.clone(), 8);
    let fa = f.push(b0, InstrKind::FieldAddr { struct_type: t.clone(), x: tp.clone(), field: 0 }, 9);
    f.push(b0, InstrKind::Store { addr: fa, val: Operand::int(5, Type::Int(IntKind::I8)) }, 9);
    let x = f.call(b0, &prog, sym.int, vec![], 10);
    let fb = f.push(b0, InstrKind::FieldAddr { struct_type: t.clone(), x: tp.clone(), field: 1 }, 10);
    f.push(b0, InstrKind::Store { addr: fb, val: x.clone() }, 10);
    let fc = f.push(b0, InstrKind::FieldAddr { struct_type: t.clone(), x: tp.clone(), field: 2 }, 11);
    f.push(b0, InstrKind::Store { addr: fc, val: Operand::int(7, Type::int()) }, 11);
    let fd = f.push(b0, InstrKind::FieldAddr { struct_type: t.clone(), x: tp.clone(), field: 3 }, 12);
    f.push(b0, InstrKind::Store { addr: fd, val: Operand::int(8, Type::Int(IntKind::I32)) }, 12);

    let fa2 = f.push(b0, InstrKind::FieldAddr { struct_type: t.clone(), x: tp.clone(), field: 0 }, 14);
    let va = f.push(b0, InstrKind::Deref { typ: Type::Int(IntKind::I8), x: fa2 }, 14);
    let ca = f.push(b0, InstrKind::Convert { src: Type::Int(IntKind::I8), dst: Type::int(), x: va }, 14);
    let fb2 = f.push(b0, InstrKind::FieldAddr { struct_type: t.clone(), x: tp.clone(), field: 1 }, 14);
    let vb = f.push(b0, InstrKind::Deref { typ: Type::int(), x: fb2 }, 14);
    let sum = f.binop(b0, BinOpKind::Add, Type::int(), ca, vb, 14);
    let fc2 = f.push(b0, InstrKind::FieldAddr { struct_type: t.clone(), x: tp, field: 2 }, 14);
    let vc = f.push(b0, InstrKind::Deref { typ: Type::int(), x: fc2 }, 14);
    let cond = f.binop(b0, BinOpKind::Eql, Type::int(), sum, vc, 14);
    f.cond_br(b0, cond, b_then, b_else, 14);
    f.ret(b_then, vec![], 15);
    f.ret(b_else, vec![], 17);
    let fid = prog.add_function(f.finish());

    let mut e = new_executor(prog, fid);

    let state = e.execute_next_state().unwrap();
    assert_eq!(pos_of(&e, &state), "struct.go:14");

    // True side: 5 + B == 7 forces B to 2.
    let state = e.execute_next_state().unwrap();
    assert_eq!(pos_of(&e, &state), "struct.go:15");
    let (arrays, values) = e.values(&state).unwrap();
    assert_eq!(eval_u64(&state, &arrays, &values, &x), 2);
    next_finished(&mut e);

    // False side: anything but 2.
    let state = e.execute_next_state().unwrap();
    assert_eq!(pos_of(&e, &state), "struct.go:17");
    let (arrays, values) = e.values(&state).unwrap();
    assert_ne!(eval_u64(&state, &arrays, &values, &x), 2);
}

/// func changeInterface() {    // line 7
///     x := svarog.Int()       // line 8
///     var u U = T(x)          // line 9
///     var v V = u             // line 10
///     if v.Add(10) == 100 {   // line 12
///         return              // line 13
///     }
///     return                  // line 15
/// }
/// func (t T) Add(i int) int { return int(t) + i } // line 21
#[test]
fn interface_method_invoke() {
    init_logging();
    let mut prog = Program::new();
    let sym = declare_symbolics(&mut prog);

    // T's underlying type is int.
    let t = Type::int();

    let mut f = FunctionBuilder::new("main", "T.Add", "interface.go");
    let b0 = f.entry();
    let recv = f.param(Type::int());
    let i = f.param(Type::int());
    f.set_results(vec![Type::int()]);
    let r = f.binop(b0, BinOpKind::Add, Type::int(), recv, i, 21);
    f.ret(b0, vec![r], 21);
    let add = prog.add_function(f.finish());
    prog.register_method(&t, "Add", add);

    let mut f = FunctionBuilder::new("main", "changeInterface", "interface.go");
    let b0 = f.entry();
    let b_then = f.block();
    let b_else = f.block();
    let x = f.call(b0, &prog, sym.int, vec![], 8);
    let u = f.push(b0, InstrKind::MakeInterface { typ: t.clone(), x: x.clone() }, 9);
    let v = f.push(b0, InstrKind::ChangeInterface { x: u }, 10);
    let sig = Signature { params: vec![Type::int()], results: vec![Type::int()] };
    let r = f.invoke(b0, v, "Add", vec![Operand::int(10, Type::int())], sig, 12);
    let cond = f.binop(b0, BinOpKind::Eql, Type::int(), r, Operand::int(100, Type::int()), 12);
    f.cond_br(b0, cond, b_then, b_else, 12);
    f.ret(b_then, vec![], 13);
    f.ret(b_else, vec![], 15);
    let fid = prog.add_function(f.finish());

    let mut e = new_executor(prog, fid);

    // The initial state stops at the invocation.
    let state = e.execute_next_state().unwrap();
    assert_eq!(pos_of(&e, &state), "interface.go:12");

    // The method body runs to its return.
    let state = e.execute_next_state().unwrap();
    assert_eq!(pos_of(&e, &state), "interface.go:21");

    // Back in the caller, stopping at the branch.
    let state = e.execute_next_state().unwrap();
    assert_eq!(pos_of(&e, &state), "interface.go:12");

    // True side: x + 10 == 100.
    let state = e.execute_next_state().unwrap();
    assert_eq!(pos_of(&e, &state), "interface.go:13");
    let (arrays, values) = e.values(&state).unwrap();
    assert_eq!(eval_u64(&state, &arrays, &values, &x), 90);
    next_finished(&mut e);

    // False side.
    let state = e.execute_next_state().unwrap();
    assert_eq!(pos_of(&e, &state), "interface.go:15");
    let (arrays, values) = e.values(&state).unwrap();
    assert_ne!(eval_u64(&state, &arrays, &values, &x), 90);
    next_finished(&mut e);

    assert!(matches!(e.execute_next_state(), Err(Error::NoStateAvailable)));
}

/// func phi() {            // line 7
///     x := svarog.Int()   // line 8
///     var y int
///     if x == 0 {         // line 9
///         y = 1           // line 10
///     } else {
///         y = 2           // line 12
///     }
///     _ = y               // line 14
/// }
#[test]
fn phi_resolves_by_predecessor() {
    init_logging();
    let mut prog = Program::new();
    let sym = declare_symbolics(&mut prog);

    let mut f = FunctionBuilder::new("main", "phi", "phi.go");
    let b0 = f.entry();
    let b_then = f.block();
    let b_else = f.block();
    let b_join = f.block();
    let x = f.call(b0, &prog, sym.int, vec![], 8);
    let cond = f.binop(b0, BinOpKind::Eql, Type::int(), x, Operand::int(0, Type::int()), 9);
    f.cond_br(b0, cond, b_then, b_else, 9);
    f.jump(b_then, b_join, 10);
    f.jump(b_else, b_join, 12);
    let y = f.push(
        b_join,
        InstrKind::Phi {
            edges: vec![Operand::int(1, Type::int()), Operand::int(2, Type::int())],
        },
        14,
    );
    f.ret(b_join, vec![], 14);
    let fid = prog.add_function(f.finish());

    let mut e = new_executor(prog, fid);

    // Root forks at the branch.
    e.execute_next_state().unwrap();

    // True side flows through b_then, so the phi picks 1.
    let state = e.execute_next_state().unwrap();
    let binding = state.borrow_mut().eval(&y).unwrap();
    assert_eq!(binding, svarog::Binding::Expr(Expr::constant64(1)));
    next_finished(&mut e);

    // False side flows through b_else, so the phi picks 2.
    let state = e.execute_next_state().unwrap();
    let binding = state.borrow_mut().eval(&y).unwrap();
    assert_eq!(binding, svarog::Binding::Expr(Expr::constant64(2)));
}

/// Returning from the outermost frame must finish the path: the forked
/// continuation pops the last frame, releasing its stack-class arrays, and
/// transitions to the finished status.
#[test]
fn entry_runs_to_completion() {
    init_logging();
    let mut prog = Program::new();

    let mut f = FunctionBuilder::new("main", "done", "done.go");
    let b0 = f.entry();
    f.local(b0, Type::int(), 3);
    f.ret(b0, vec![], 4);
    let fid = prog.add_function(f.finish());

    let mut e = new_executor(prog, fid);

    // The returner keeps its frame and position; the local allocated at
    // frame push is still live in its heap.
    let state = e.execute_next_state().unwrap();
    assert_eq!(pos_of(&e, &state), "done.go:4");
    assert_eq!(state.borrow().status(), Status::Running);
    assert!(state.borrow().frame().is_some());
    assert!(state.borrow().find_alloc_containing(8).is_some());
    assert_eq!(state.borrow().children().len(), 1);

    // The continuation popped the last frame: finished, no frames, and the
    // stack-class allocation is gone from its heap.
    let state = e.execute_next_state().unwrap();
    assert_eq!(state.borrow().status(), Status::Finished);
    assert!(state.borrow().frame().is_none());
    assert!(state.borrow().find_alloc_containing(8).is_none());
    assert!(state.borrow().constraints().is_empty());

    assert!(matches!(e.execute_next_state(), Err(Error::NoStateAvailable)));
}

#[test]
fn unsupported_instructions_error() {
    init_logging();
    let mut prog = Program::new();

    let mut f = FunctionBuilder::new("main", "bad", "bad.go");
    let b0 = f.entry();
    f.push(b0, InstrKind::MakeMap, 3);
    f.ret(b0, vec![], 4);
    let fid = prog.add_function(f.finish());

    let mut e = new_executor(prog, fid);
    match e.execute_next_state() {
        Err(Error::Unsupported(msg)) => assert!(msg.contains("maps"), "{msg}"),
        other => panic!("expected unsupported error, got {other:?}"),
    }

    // The faulting state is left intact and unadvanced.
    let root = e.root_state();
    assert_eq!(root.borrow().status(), Status::Running);
    assert!(root.borrow().children().is_empty());
}

#[test]
fn missing_solver_is_a_configuration_error() {
    let (prog, fid, _) = simple_if_program();
    let mut e = svarog::Executor::new(prog, fid);
    assert!(matches!(e.execute_next_state(), Err(Error::NoSolver)));
}

#[test]
fn invalid_target_is_a_configuration_error() {
    let (prog, fid, _) = simple_if_program();
    let target = svarog::Target::new(svarog::Os::Plan9, svarog::Arch::Wasm);
    assert!(!target.is_valid());
    let mut e = svarog::Executor::with_target(prog, fid, target);
    e.solver = Some(Box::new(svarog::Z3Solver::new()));
    assert!(matches!(e.execute_next_state(), Err(Error::InvalidTarget)));
}

/// Builtin len() over strings and slices.
#[test]
fn builtin_len() {
    init_logging();
    let mut prog = Program::new();
    let sym = declare_symbolics(&mut prog);

    let mut f = FunctionBuilder::new("main", "lengths", "len.go");
    let b0 = f.entry();
    let b_then = f.block();
    let b_else = f.block();
    let s = f.call(b0, &prog, sym.string, vec![Operand::int(3, Type::int())], 8);
    let sl = f.call(b0, &prog, sym.byte_slice, vec![Operand::int(5, Type::int())], 9);
    let n1 = f.call_builtin(
        b0,
        "len",
        vec![s],
        Signature { params: vec![Type::Str], results: vec![Type::int()] },
        10,
    );
    let n2 = f.call_builtin(
        b0,
        "len",
        vec![sl],
        Signature { params: vec![Type::slice(Type::byte())], results: vec![Type::int()] },
        11,
    );
    let sum = f.binop(b0, BinOpKind::Add, Type::int(), n1, n2, 12);
    let cond = f.binop(b0, BinOpKind::Eql, Type::int(), sum, Operand::int(8, Type::int()), 12);
    f.cond_br(b0, cond, b_then, b_else, 12);
    f.ret(b_then, vec![], 13);
    f.ret(b_else, vec![], 15);
    let fid = prog.add_function(f.finish());

    let mut e = new_executor(prog, fid);
    let state = e.execute_next_state().unwrap();

    // Lengths are concrete, so the condition folds to true and only the
    // true side forks.
    assert_eq!(state.borrow().children().len(), 1);
    let state = e.execute_next_state().unwrap();
    assert_eq!(pos_of(&e, &state), "len.go:13");
}

/// copy() between a byte slice and a fixed array, then a compare through the
/// copied bytes (the array-slice round trip of the original sources).
#[test]
fn builtin_copy_overrun_faults_state() {
    init_logging();
    let mut prog = Program::new();
    let sym = declare_symbolics(&mut prog);

    let byte_slice = Type::slice(Type::byte());
    let mut f = FunctionBuilder::new("main", "copyOverrun", "copy.go");
    let b0 = f.entry();
    let src = f.call(b0, &prog, sym.byte_slice, vec![Operand::int(4, Type::int())], 8);
    let dst = f.push(
        b0,
        InstrKind::MakeSlice {
            typ: byte_slice.clone(),
            len: Operand::int(2, Type::int()),
            cap: Some(Operand::int(2, Type::int())),
        },
        9,
    );
    f.call_builtin(
        b0,
        "copy",
        vec![dst, src],
        Signature { params: vec![byte_slice.clone(), byte_slice], results: vec![Type::int()] },
        10,
    );
    f.ret(b0, vec![], 11);
    let fid = prog.add_function(f.finish());

    let mut e = new_executor(prog, fid);
    let state = e.execute_next_state().unwrap();
    assert_eq!(state.borrow().status(), Status::Panicked);
    assert_eq!(state.borrow().reason(), Some("copy out of range"));
}

/// func arraySlice() {          // line 7
///     a := svarog.ByteSlice(4) // line 8
///     var b [4]byte            // line 9
///     copy(b[:], a)            // line 10
///     if string(b[1:3]) == "XY" { // line 12
///         return               // line 13
///     }
///     return                   // line 15
/// }
#[test]
fn array_copy_and_slice() {
    init_logging();
    let mut prog = Program::new();
    let sym = declare_symbolics(&mut prog);

    let byte_slice = Type::slice(Type::byte());
    let arr4 = Type::array(Type::byte(), 4);
    let mut f = FunctionBuilder::new("main", "arraySlice", "array_slice.go");
    let b0 = f.entry();
    let b_then = f.block();
    let b_else = f.block();

    let a = f.call(b0, &prog, sym.byte_slice, vec![Operand::int(4, Type::int())], 8);
    let bp = f.local(b0, arr4.clone(), 9);
    let full = f.push(
        b0,
        InstrKind::Slice {
            typ: Type::pointer(arr4.clone()),
            x: bp.clone(),
            low: None,
            high: None,
            max: None,
        },
        10,
    );
    f.call_builtin(
        b0,
        "copy",
        vec![full, a],
        Signature { params: vec![byte_slice.clone(), byte_slice.clone()], results: vec![Type::int()] },
        10,
    );
    let window = f.push(
        b0,
        InstrKind::Slice {
            typ: Type::pointer(arr4),
            x: bp,
            low: Some(Operand::int(1, Type::int())),
            high: Some(Operand::int(3, Type::int())),
            max: None,
        },
        12,
    );
    let s = f.push(b0, InstrKind::Convert { src: byte_slice, dst: Type::Str, x: window }, 12);
    let cond = f.binop(b0, BinOpKind::Eql, Type::Str, s, Operand::str("XY"), 12);
    f.cond_br(b0, cond, b_then, b_else, 12);
    f.ret(b_then, vec![], 13);
    f.ret(b_else, vec![], 15);
    let fid = prog.add_function(f.finish());

    let mut e = new_executor(prog, fid);

    let state = e.execute_next_state().unwrap();
    assert_eq!(pos_of(&e, &state), "array_slice.go:12");

    // True side: the copied window of the symbolic slice must spell "XY".
    let state = e.execute_next_state().unwrap();
    assert_eq!(pos_of(&e, &state), "array_slice.go:13");
    let (_, values) = e.values(&state).unwrap();
    assert_eq!(&values[0][1..3], b"XY");
    next_finished(&mut e);

    // False side.
    let state = e.execute_next_state().unwrap();
    assert_eq!(pos_of(&e, &state), "array_slice.go:15");
    let (_, values) = e.values(&state).unwrap();
    assert_ne!(&values[0][1..3], b"XY");
}

/// make([]byte, n) + index stores + string conversion, mirroring the
/// byteSliceMake source.
#[test]
fn make_slice_index_addr_and_compare() {
    init_logging();
    let mut prog = Program::new();
    let sym = declare_symbolics(&mut prog);

    let byte_slice = Type::slice(Type::byte());
    let mut f = FunctionBuilder::new("main", "byteSliceMake", "make.go");
    let b0 = f.entry();
    let b_then = f.block();
    let b_else = f.block();

    let b = f.push(
        b0,
        InstrKind::MakeSlice {
            typ: byte_slice.clone(),
            len: Operand::int(2, Type::int()),
            cap: Some(Operand::int(3, Type::int())),
        },
        8,
    );
    let v0 = f.call(b0, &prog, sym.byte, vec![], 9);
    let p0 = f.push(
        b0,
        InstrKind::IndexAddr { typ: byte_slice.clone(), x: b.clone(), index: Operand::int(0, Type::int()) },
        9,
    );
    f.push(b0, InstrKind::Store { addr: p0, val: v0 }, 9);
    let v1 = f.call(b0, &prog, sym.byte, vec![], 10);
    let p1 = f.push(
        b0,
        InstrKind::IndexAddr { typ: byte_slice.clone(), x: b.clone(), index: Operand::int(1, Type::int()) },
        10,
    );
    f.push(b0, InstrKind::Store { addr: p1, val: v1 }, 10);

    let s = f.push(b0, InstrKind::Convert { src: byte_slice, dst: Type::Str, x: b }, 12);
    let cond = f.binop(b0, BinOpKind::Eql, Type::Str, s, Operand::str("XY"), 13);
    f.cond_br(b0, cond, b_then, b_else, 13);
    f.ret(b_then, vec![], 14);
    f.ret(b_else, vec![], 16);
    let fid = prog.add_function(f.finish());

    let mut e = new_executor(prog, fid);

    let state = e.execute_next_state().unwrap();
    assert_eq!(pos_of(&e, &state), "make.go:13");

    // True side: the two symbolic bytes must spell "XY".
    let state = e.execute_next_state().unwrap();
    assert_eq!(pos_of(&e, &state), "make.go:14");
    let (arrays, values) = e.values(&state).unwrap();
    assert_eq!(arrays.len(), 2);
    assert_eq!((values[0][0], values[1][0]), (b'X', b'Y'));
    next_finished(&mut e);

    // False side.
    let state = e.execute_next_state().unwrap();
    assert_eq!(pos_of(&e, &state), "make.go:16");
    let (_, values) = e.values(&state).unwrap();
    assert_ne!((values[0][0], values[1][0]), (b'X', b'Y'));
}
