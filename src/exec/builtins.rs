//! Host-registered function handlers.
//!
//! The engine ships a package of symbolic-input constructors under
//! [`SYMBOLIC_PKG`](super::SYMBOLIC_PKG): fixed-width integers, platform
//! width `Int`/`Uint`/`Byte`, `String(n)`, `ByteSlice(n)`, and `Assert(cond)`
//! which adds a path constraint. It also hooks the language builtins `len`
//! and `copy` and the test framework's `Fatal`.

use std::rc::Rc;

use crate::error::Error;
use crate::ir::{Program, Type};
use crate::state::{Binding, ExecutionState, Status};
use crate::target::Target;

use super::executor::{CallContext, Executor, SYMBOLIC_PKG};

pub(crate) fn register_defaults(e: &mut Executor) {
    e.register(SYMBOLIC_PKG, "Assert", exec_assert);
    e.register(SYMBOLIC_PKG, "Byte", exec_int);
    e.register(SYMBOLIC_PKG, "Int", exec_int);
    e.register(SYMBOLIC_PKG, "Int8", exec_int);
    e.register(SYMBOLIC_PKG, "Int16", exec_int);
    e.register(SYMBOLIC_PKG, "Int32", exec_int);
    e.register(SYMBOLIC_PKG, "Int64", exec_int);
    e.register(SYMBOLIC_PKG, "Uint", exec_int);
    e.register(SYMBOLIC_PKG, "Uint8", exec_int);
    e.register(SYMBOLIC_PKG, "Uint16", exec_int);
    e.register(SYMBOLIC_PKG, "Uint32", exec_int);
    e.register(SYMBOLIC_PKG, "Uint64", exec_int);
    e.register(SYMBOLIC_PKG, "ByteSlice", exec_byte_slice);
    e.register(SYMBOLIC_PKG, "String", exec_string);
    e.register("", "copy", exec_copy);
    e.register("", "len", exec_len);
    e.register("testing", "Fatal", exec_fatal);
}

/// Adds the argument as a constraint on the current state.
fn exec_assert(
    _prog: &Program,
    _target: Target,
    state: &mut ExecutionState,
    cx: CallContext<'_>,
) -> Result<(), Error> {
    let Some(Binding::Expr(cond)) = cx.args.first().cloned() else {
        return Err(Error::InvalidOperand("assert condition must be an expression".to_string()));
    };
    state.add_constraint(cond);
    Ok(())
}

/// Allocates fresh symbolic storage for an integer of the declared result
/// width and binds the read expression.
fn exec_int(
    _prog: &Program,
    target: Target,
    state: &mut ExecutionState,
    cx: CallContext<'_>,
) -> Result<(), Error> {
    let width = cx.sig.results[0].size_bits(&target);
    let (_, array) = state.alloc(width / 8);
    let expr = array.select(
        crate::expr::Expr::constant(0, target.pointer_width()),
        width,
        target.is_little_endian(),
    );
    state.frame_mut().unwrap().bind(cx.result, Binding::Expr(expr));
    Ok(())
}

/// Allocates an `n`-byte symbolic string.
fn exec_string(
    _prog: &Program,
    _target: Target,
    state: &mut ExecutionState,
    cx: CallContext<'_>,
) -> Result<(), Error> {
    let n = match cx.args.first() {
        Some(Binding::Expr(e)) => e
            .as_constant()
            .ok_or_else(|| Error::NonConstant("String size".to_string()))?
            .0,
        _ => return Err(Error::NonConstant("String size".to_string())),
    };

    let (_, array) = state.alloc(n as u32);
    state.frame_mut().unwrap().bind(cx.result, Binding::Array(array));
    Ok(())
}

/// Allocates an `n`-byte symbolic backing array plus a slice header.
fn exec_byte_slice(
    _prog: &Program,
    target: Target,
    state: &mut ExecutionState,
    cx: CallContext<'_>,
) -> Result<(), Error> {
    let n = match cx.args.first() {
        Some(Binding::Expr(e)) => e.clone(),
        _ => return Err(Error::NonConstant("ByteSlice size".to_string())),
    };
    let (nv, _) = n.as_constant().ok_or_else(|| Error::NonConstant("ByteSlice size".to_string()))?;

    let (addr, _) = state.alloc(nv as u32);

    let (_, hdr) = state.alloc(target.pointer_bytes() * 3);
    let hdr = state.store_int_at(&hdr, 0, addr); // data
    let hdr = state.store_int_at(&hdr, 1, n.clone()); // len
    let hdr = state.store_int_at(&hdr, 2, n); // cap
    state.heap_set(hdr.clone());

    state.frame_mut().unwrap().bind(cx.result, Binding::Array(hdr));
    Ok(())
}

/// `len` of a slice (from its header) or string (from its array size).
fn exec_len(
    _prog: &Program,
    target: Target,
    state: &mut ExecutionState,
    cx: CallContext<'_>,
) -> Result<(), Error> {
    let Some(Binding::Array(arg)) = cx.args.first().cloned() else {
        return Err(Error::InvalidOperand("len expects an array operand".to_string()));
    };

    match &cx.sig.params[0] {
        Type::Slice(_) => {
            let length = state.select_int_at(&arg, 1);
            if !length.is_constant() {
                return Err(Error::NonConstant("slice len".to_string()));
            }
            state.frame_mut().unwrap().bind(cx.result, Binding::Expr(length));
            Ok(())
        }
        Type::Str => {
            let length =
                crate::expr::Expr::constant(arg.size as u64, target.pointer_width());
            state.frame_mut().unwrap().bind(cx.result, Binding::Expr(length));
            Ok(())
        }
        other => Err(Error::InvalidOperand(format!("invalid len argument type: {other:?}"))),
    }
}

/// `copy(dst, src)`: byte copy between a slice and a slice or string.
/// Copying more than the destination holds faults the state.
fn exec_copy(
    _prog: &Program,
    target: Target,
    state: &mut ExecutionState,
    cx: CallContext<'_>,
) -> Result<(), Error> {
    let Some(Binding::Array(dst_hdr)) = cx.args.first().cloned() else {
        return Err(Error::InvalidOperand("copy expects a slice destination".to_string()));
    };

    let Type::Slice(dst_elem) = &cx.sig.params[0] else {
        return Err(Error::InvalidOperand("copy destination must be a slice".to_string()));
    };

    // Resolve the destination's backing array, offset, and byte size.
    let (dst_data, _) = state
        .select_int_at(&dst_hdr, 0)
        .as_constant()
        .ok_or_else(|| Error::NonConstant("copy dst slice data address".to_string()))?;
    let (dst_len, _) = state
        .select_int_at(&dst_hdr, 1)
        .as_constant()
        .ok_or_else(|| Error::NonConstant("copy dst slice len".to_string()))?;
    let (dst_base, dst_array) = state
        .find_alloc_containing(dst_data)
        .ok_or(Error::AllocNotFound(dst_data))?;
    let dst_offset = dst_data - dst_base;
    let dst_size = dst_len * dst_elem.size_bytes(&target) as u64;

    // The source is either a slice header or a raw string array.
    let (src_array, src_offset, src_size) = match &cx.sig.params[1] {
        Type::Slice(src_elem) => {
            let Some(Binding::Array(src_hdr)) = cx.args.get(1).cloned() else {
                return Err(Error::InvalidOperand("copy expects a slice source".to_string()));
            };
            let (src_data, _) = state
                .select_int_at(&src_hdr, 0)
                .as_constant()
                .ok_or_else(|| Error::NonConstant("copy src slice data address".to_string()))?;
            let (src_len, _) = state
                .select_int_at(&src_hdr, 1)
                .as_constant()
                .ok_or_else(|| Error::NonConstant("copy src slice len".to_string()))?;
            let (src_base, src_array) = state
                .find_alloc_containing(src_data)
                .ok_or(Error::AllocNotFound(src_data))?;
            (src_array, src_data - src_base, src_len * src_elem.size_bytes(&target) as u64)
        }
        Type::Str => {
            let Some(Binding::Array(src)) = cx.args.get(1).cloned() else {
                return Err(Error::InvalidOperand("copy expects a string source".to_string()));
            };
            let size = src.size as u64;
            (src, 0, size)
        }
        other => return Err(Error::InvalidOperand(format!("invalid copy source type: {other:?}"))),
    };

    if src_size > dst_size {
        state.set_status(Status::Panicked, "copy out of range");
        return Ok(());
    }

    let mut other = (*dst_array).clone();
    for i in 0..src_size {
        other.store_byte(
            crate::expr::Expr::constant64(dst_offset + i),
            src_array.select_byte(crate::expr::Expr::constant64(src_offset + i)),
        );
    }
    state.heap_set(Rc::new(other));

    Ok(())
}

/// Test-framework fatal: the state records a failure and stops advancing.
fn exec_fatal(
    _prog: &Program,
    _target: Target,
    state: &mut ExecutionState,
    _cx: CallContext<'_>,
) -> Result<(), Error> {
    state.set_status(Status::Failed, "fatal");
    Ok(())
}
