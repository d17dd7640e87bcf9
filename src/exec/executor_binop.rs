//! Binary operation semantics, dispatched on the operand type.
//!
//! Integer operations map directly onto the bit-vector constructors, with
//! the signed opcode chosen by the operand type. Boolean AND/OR stay at
//! width 1. Interface and string equality delegate to byte-wise array
//! comparison; ordered string comparison expands into an OR-chain over byte
//! positions.

use std::rc::Rc;

use log::debug;

use crate::array::{Array, ArrayRef};
use crate::error::Error;
use crate::expr::{BinaryOp, Expr, ExprRef};
use crate::ir::{BinOpKind, Operand, Type};
use crate::state::{BindKey, Binding, ExecutionState};

pub(crate) fn execute_binop(
    state: &mut ExecutionState,
    key: BindKey,
    op: BinOpKind,
    typ: &Type,
    x: &Operand,
    y: &Operand,
) -> Result<(), Error> {
    match typ {
        Type::Interface => execute_binop_interface(state, key, op, x, y),
        Type::Bool => execute_binop_boolean(state, key, op, x, y),
        Type::Int(_) => execute_binop_integer(state, key, op, typ.is_signed(), x, y),
        Type::Str => execute_binop_string(state, key, op, x, y),
        other => Err(Error::InvalidOperand(format!("unexpected binop operand type: {other:?}"))),
    }
}

fn eval_array(state: &mut ExecutionState, op: &Operand) -> Result<ArrayRef, Error> {
    match state.eval(op) {
        Some(Binding::Array(a)) => Ok(a),
        other => Err(Error::InvalidOperand(format!("expected array operand, got {other:?}"))),
    }
}

fn execute_binop_interface(
    state: &mut ExecutionState,
    key: BindKey,
    op: BinOpKind,
    x: &Operand,
    y: &Operand,
) -> Result<(), Error> {
    let (x, y) = (eval_array(state, x)?, eval_array(state, y)?);
    let expr = match op {
        BinOpKind::Eql => x.equal(&y),
        BinOpKind::Neq => x.not_equal(&y),
        _ => return Err(Error::InvalidOperand("invalid interface binop operator".to_string())),
    };
    state.frame_mut().unwrap().bind(key, Binding::Expr(expr));
    Ok(())
}

fn execute_binop_boolean(
    state: &mut ExecutionState,
    key: BindKey,
    op: BinOpKind,
    x: &Operand,
    y: &Operand,
) -> Result<(), Error> {
    let x = state.must_eval_expr(x).expect("unbound operand");
    let y = state.must_eval_expr(y).expect("unbound operand");
    let expr = match op {
        BinOpKind::And => Expr::binary(BinaryOp::And, x, y),
        BinOpKind::Or => Expr::binary(BinaryOp::Or, x, y),
        _ => return Err(Error::InvalidOperand("invalid boolean binop operator".to_string())),
    };
    state.frame_mut().unwrap().bind(key, Binding::Expr(expr));
    Ok(())
}

fn execute_binop_integer(
    state: &mut ExecutionState,
    key: BindKey,
    op: BinOpKind,
    signed: bool,
    x: &Operand,
    y: &Operand,
) -> Result<(), Error> {
    let x = state.must_eval_expr(x).expect("unbound operand");
    let y = state.must_eval_expr(y).expect("unbound operand");

    let pick = |s: BinaryOp, u: BinaryOp| if signed { s } else { u };
    let expr = match op {
        BinOpKind::Add => Expr::binary(BinaryOp::Add, x, y),
        BinOpKind::Sub => Expr::binary(BinaryOp::Sub, x, y),
        BinOpKind::Mul => Expr::binary(BinaryOp::Mul, x, y),
        BinOpKind::Div => Expr::binary(pick(BinaryOp::Sdiv, BinaryOp::Udiv), x, y),
        BinOpKind::Rem => Expr::binary(pick(BinaryOp::Srem, BinaryOp::Urem), x, y),
        BinOpKind::And => Expr::binary(BinaryOp::And, x, y),
        BinOpKind::Or => Expr::binary(BinaryOp::Or, x, y),
        BinOpKind::Xor => Expr::binary(BinaryOp::Xor, x, y),
        BinOpKind::Shl => Expr::binary(BinaryOp::Shl, x, y),
        BinOpKind::Shr => Expr::binary(pick(BinaryOp::Ashr, BinaryOp::Lshr), x, y),
        // Bit clear: x AND NOT y.
        BinOpKind::AndNot => Expr::binary(BinaryOp::And, x, Expr::not(y)),
        BinOpKind::Eql => Expr::binary(BinaryOp::Eq, x, y),
        BinOpKind::Neq => Expr::binary(BinaryOp::Ne, x, y),
        BinOpKind::Lss => Expr::binary(pick(BinaryOp::Slt, BinaryOp::Ult), x, y),
        BinOpKind::Leq => Expr::binary(pick(BinaryOp::Sle, BinaryOp::Ule), x, y),
        BinOpKind::Gtr => Expr::binary(pick(BinaryOp::Sgt, BinaryOp::Ugt), x, y),
        BinOpKind::Geq => Expr::binary(pick(BinaryOp::Sge, BinaryOp::Uge), x, y),
    };
    state.frame_mut().unwrap().bind(key, Binding::Expr(expr));
    Ok(())
}

fn execute_binop_string(
    state: &mut ExecutionState,
    key: BindKey,
    op: BinOpKind,
    x: &Operand,
    y: &Operand,
) -> Result<(), Error> {
    match op {
        BinOpKind::Add => execute_binop_string_add(state, key, x, y),
        BinOpKind::Eql => {
            let (x, y) = (eval_array(state, x)?, eval_array(state, y)?);
            let expr = x.equal(&y);
            state.frame_mut().unwrap().bind(key, Binding::Expr(expr));
            Ok(())
        }
        BinOpKind::Neq => {
            let (x, y) = (eval_array(state, x)?, eval_array(state, y)?);
            let expr = x.not_equal(&y);
            state.frame_mut().unwrap().bind(key, Binding::Expr(expr));
            Ok(())
        }
        BinOpKind::Lss | BinOpKind::Leq | BinOpKind::Gtr | BinOpKind::Geq => {
            execute_binop_string_compare(state, key, op, x, y)
        }
        _ => Err(Error::InvalidOperand("invalid string binop operator".to_string())),
    }
}

fn execute_binop_string_add(
    state: &mut ExecutionState,
    key: BindKey,
    x: &Operand,
    y: &Operand,
) -> Result<(), Error> {
    let (x, y) = (eval_array(state, x)?, eval_array(state, y)?);

    debug!("[binop] str-add x={x} y={y}");

    // Return the other side when one is empty.
    if x.size == 0 {
        state.frame_mut().unwrap().bind(key, Binding::Array(y));
        return Ok(());
    } else if y.size == 0 {
        state.frame_mut().unwrap().bind(key, Binding::Array(x));
        return Ok(());
    }

    // Otherwise build a fresh array holding both byte sequences.
    let mut array = Array::new(0, x.size + y.size);
    for i in 0..x.size as u64 {
        array.store_byte(Expr::constant64(i), x.select_byte(Expr::constant64(i)));
    }
    for i in 0..y.size as u64 {
        array.store_byte(
            Expr::constant64(x.size as u64 + i),
            y.select_byte(Expr::constant64(i)),
        );
    }

    state.frame_mut().unwrap().bind(key, Binding::Array(Rc::new(array)));
    Ok(())
}

/// Ordered string comparison (LSS, LEQ, GTR, GEQ).
///
/// The result is an OR-chain with one term per byte position i over the
/// shorter length: "bytes 0..i-1 equal AND byte i decides". The final term
/// uses an inclusive compare when the shorter string sits on the winning
/// side of the operator, or when lengths are equal and the operator itself
/// is inclusive.
fn execute_binop_string_compare(
    state: &mut ExecutionState,
    key: BindKey,
    op: BinOpKind,
    x: &Operand,
    y: &Operand,
) -> Result<(), Error> {
    let (x, y) = (eval_array(state, x)?, eval_array(state, y)?);

    let n = x.size.min(y.size) as u64;

    // With no overlapping bytes the lengths alone decide.
    if n == 0 {
        let result = match op {
            BinOpKind::Lss => x.size < y.size,
            BinOpKind::Leq => x.size <= y.size,
            BinOpKind::Gtr => x.size > y.size,
            BinOpKind::Geq => x.size >= y.size,
            _ => unreachable!("invalid string compare operator"),
        };
        state.frame_mut().unwrap().bind(key, Binding::Expr(Expr::bool_const(result)));
        return Ok(());
    }

    // Generate all byte selections once.
    let xs: Vec<ExprRef> = (0..n).map(|i| x.select_byte(Expr::constant64(i))).collect();
    let ys: Vec<ExprRef> = (0..n).map(|i| y.select_byte(Expr::constant64(i))).collect();

    let mut cond: Option<ExprRef> = None;
    for i in 0..n as usize {
        let last = i == n as usize - 1;
        let mut base = match op {
            BinOpKind::Lss | BinOpKind::Leq => {
                if last && (x.size < y.size || (x.size == y.size && op == BinOpKind::Leq)) {
                    Expr::binary(BinaryOp::Ule, xs[i].clone(), ys[i].clone())
                } else {
                    Expr::binary(BinaryOp::Ult, xs[i].clone(), ys[i].clone())
                }
            }
            BinOpKind::Gtr | BinOpKind::Geq => {
                if last && (x.size > y.size || (x.size == y.size && op == BinOpKind::Geq)) {
                    Expr::binary(BinaryOp::Ule, ys[i].clone(), xs[i].clone())
                } else {
                    Expr::binary(BinaryOp::Ult, ys[i].clone(), xs[i].clone())
                }
            }
            _ => unreachable!("invalid string compare operator"),
        };

        // All previous bytes must be equal for byte i to decide.
        for j in 0..i {
            base = Expr::binary(
                BinaryOp::And,
                base,
                Expr::binary(BinaryOp::Eq, xs[j].clone(), ys[j].clone()),
            );
        }

        cond = Some(match cond {
            None => base,
            Some(acc) => Expr::binary(BinaryOp::Or, acc, base),
        });
    }

    state.frame_mut().unwrap().bind(key, Binding::Expr(cond.unwrap()));
    Ok(())
}
