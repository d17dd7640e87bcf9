//! Memory-shaped instruction semantics: conversions, slices, aggregate
//! construction, address arithmetic, and loads/stores.
//!
//! Slice values are three pointer-width words {data, len, cap}; interface
//! values are two words {type id, data}; strings are bound directly as
//! transient byte arrays. Address arithmetic is only valid on concrete
//! addresses.

use std::rc::Rc;

use log::debug;

use crate::array::Array;
use crate::error::Error;
use crate::expr::{BinaryOp, Expr, ExprRef, WIDTH_64};
use crate::ir::{field_offsets, Operand, Program, Type};
use crate::state::{BindKey, Binding, ExecutionState, Status};
use crate::target::Target;

fn eval_array(state: &mut ExecutionState, op: &Operand) -> Result<crate::array::ArrayRef, Error> {
    match state.eval(op) {
        Some(Binding::Array(a)) => Ok(a),
        other => Err(Error::InvalidOperand(format!("expected array operand, got {other:?}"))),
    }
}

pub(crate) fn execute_convert(
    target: Target,
    state: &mut ExecutionState,
    key: BindKey,
    src: &Type,
    dst: &Type,
    x: &Operand,
) -> Result<(), Error> {
    match (src, dst) {
        (Type::Slice(elem), Type::Str) if **elem == Type::byte() => {
            execute_convert_byte_slice_to_string(target, state, key, x)
        }
        (Type::Slice(_), _) => {
            Err(Error::Unsupported("slice conversion is not supported".to_string()))
        }
        (Type::Str, Type::Slice(elem)) if **elem == Type::byte() => {
            execute_convert_string_to_byte_slice(target, state, key, x)
        }
        (Type::Str, Type::Slice(_)) => {
            Err(Error::Unsupported("string-to-rune conversion is not supported".to_string()))
        }
        (Type::Str, Type::Str) => {
            let binding = state.eval(x).expect("unbound operand");
            state.frame_mut().unwrap().bind(key, binding);
            Ok(())
        }
        (Type::Int(_), Type::Str) => {
            Err(Error::Unsupported("int-to-string conversion is not supported".to_string()))
        }
        (Type::Int(_), Type::Int(_)) => {
            // Integer width conversion: extension follows the signedness of
            // the source type.
            let value = state.must_eval_expr(x).expect("unbound operand");
            let expr = Expr::cast(value, dst.size_bits(&target), src.is_signed());
            state.frame_mut().unwrap().bind(key, Binding::Expr(expr));
            Ok(())
        }
        (Type::Pointer(_), _) => {
            Err(Error::Unsupported("pointer conversion is not supported".to_string()))
        }
        (src, _) => Err(Error::Unsupported(format!("type conversion from {src:?} is not supported"))),
    }
}

fn execute_convert_byte_slice_to_string(
    _target: Target,
    state: &mut ExecutionState,
    key: BindKey,
    x: &Operand,
) -> Result<(), Error> {
    let hdr = eval_array(state, x)?;

    debug!("[convert] byte-slice-to-string: {hdr}");

    // Locate the backing data through the header. The data pointer must be
    // concrete.
    let (ptr, _) = state
        .select_int_at(&hdr, 0)
        .as_constant()
        .ok_or_else(|| Error::NonConstant("slice data pointer".to_string()))?;
    let (length, _) = state
        .select_int_at(&hdr, 1)
        .as_constant()
        .ok_or_else(|| Error::NonConstant("slice length".to_string()))?;

    let (base, src) = state.find_alloc_containing(ptr).ok_or(Error::AllocNotFound(ptr))?;
    let offset = ptr - base;

    // Copy the slice window into a fresh transient array.
    let mut dst = Array::new(0, length as u32);
    for i in 0..length {
        dst.store_byte(Expr::constant64(i), src.select_byte(Expr::constant64(offset + i)));
    }

    state.frame_mut().unwrap().bind(key, Binding::Array(Rc::new(dst)));
    Ok(())
}

fn execute_convert_string_to_byte_slice(
    target: Target,
    state: &mut ExecutionState,
    key: BindKey,
    x: &Operand,
) -> Result<(), Error> {
    let x = eval_array(state, x)?;
    let length = Expr::constant(x.size as u64, target.pointer_width());

    // Build the backing array and copy the string bytes into it.
    let (addr, array) = state.alloc(x.size);
    let mut copy = (*array).clone();
    for i in 0..x.size as u64 {
        copy.store_byte(Expr::constant64(i), x.select_byte(Expr::constant64(i)));
    }
    state.heap_set(Rc::new(copy));

    // Build the slice header.
    let (_, hdr) = state.alloc(target.pointer_bytes() * 3);
    let hdr = state.store_int_at(&hdr, 0, addr); // data
    let hdr = state.store_int_at(&hdr, 1, length.clone()); // len
    let hdr = state.store_int_at(&hdr, 2, length); // cap
    state.heap_set(hdr.clone());

    state.frame_mut().unwrap().bind(key, Binding::Array(hdr));
    Ok(())
}

pub(crate) fn execute_field_addr(
    target: Target,
    state: &mut ExecutionState,
    key: BindKey,
    struct_type: &Type,
    x: &Operand,
    field: usize,
) -> Result<(), Error> {
    let Type::Struct(fields) = struct_type else {
        return Err(Error::InvalidOperand(format!("field address of non-struct: {struct_type:?}")));
    };
    let offsets = field_offsets(fields, &target);
    let offset = offsets[field];

    // The base address must be concrete.
    let base = state.must_eval_expr(x).expect("unbound operand");
    let (bv, _) = base.as_constant().expect("field address base must be concrete");

    debug!("[field] base={bv} offset={offset}");

    let expr = Expr::binary(
        BinaryOp::Add,
        base,
        Expr::constant(offset, target.pointer_width()),
    );
    state.frame_mut().unwrap().bind(key, Binding::Expr(expr));
    Ok(())
}

pub(crate) fn execute_index_addr(
    target: Target,
    state: &mut ExecutionState,
    key: BindKey,
    typ: &Type,
    x: &Operand,
    index: &Operand,
) -> Result<(), Error> {
    let pw = target.pointer_width();
    match typ {
        Type::Array { elem, .. } => {
            let array = eval_array(state, x)?;
            let index = state.must_eval_expr(index).expect("unbound index");
            let index_bytes = Expr::binary(
                BinaryOp::Mul,
                index,
                Expr::constant(elem.size_bytes(&target) as u64, pw),
            );
            let expr = Expr::binary(BinaryOp::Add, Expr::constant(array.id, pw), index_bytes);
            state.frame_mut().unwrap().bind(key, Binding::Expr(expr));
            Ok(())
        }
        Type::Slice(elem) => {
            let hdr = eval_array(state, x)?;
            let index = state.must_eval_expr(index).expect("unbound index");
            let index_bytes = Expr::binary(
                BinaryOp::Mul,
                index,
                Expr::constant(elem.size_bytes(&target) as u64, pw),
            );
            let data = state.select_int_at(&hdr, 0);
            let expr = Expr::binary(BinaryOp::Add, data, index_bytes);
            state.frame_mut().unwrap().bind(key, Binding::Expr(expr));
            Ok(())
        }
        other => Err(Error::InvalidOperand(format!("unexpected index address type: {other:?}"))),
    }
}

pub(crate) fn execute_lookup(
    state: &mut ExecutionState,
    key: BindKey,
    x: &Operand,
    index: &Operand,
) -> Result<(), Error> {
    let x = eval_array(state, x)?;
    let index = Expr::zext(state.must_eval_expr(index).expect("unbound index"), WIDTH_64);
    let expr = x.select_byte(index);
    state.frame_mut().unwrap().bind(key, Binding::Expr(expr));
    Ok(())
}

pub(crate) fn execute_make_interface(
    prog: &Program,
    target: Target,
    state: &mut ExecutionState,
    key: BindKey,
    typ: &Type,
    x: &Operand,
) -> Result<(), Error> {
    let type_id = prog.type_id(typ);
    let pw = target.pointer_width();

    // Two words: one for the type, one for the data.
    let (_, iface) = state.alloc(target.pointer_bytes() * 2);
    let iface = state.store_int_at(&iface, 0, Expr::constant(type_id, pw));
    let value = state.must_eval_expr(x).expect("unbound operand");
    let iface = state.store_int_at(&iface, 1, value);
    state.heap_set(iface.clone());

    state.frame_mut().unwrap().bind(key, Binding::Array(iface));
    Ok(())
}

pub(crate) fn execute_make_slice(
    target: Target,
    state: &mut ExecutionState,
    key: BindKey,
    typ: &Type,
    len: &Operand,
    cap: Option<&Operand>,
) -> Result<(), Error> {
    let Type::Slice(elem) = typ else {
        return Err(Error::InvalidOperand(format!("make slice of non-slice type: {typ:?}")));
    };

    let len = state
        .eval_const_expr(Some(len))
        .map_err(|()| Error::NonConstant("make slice len".to_string()))?
        .ok_or_else(|| Error::NonConstant("make slice len".to_string()))?;
    let cap = state
        .eval_const_expr(cap)
        .map_err(|()| Error::NonConstant("make slice cap".to_string()))?
        .unwrap_or_else(|| len.clone());

    let (cap_value, _) = cap.as_constant().expect("constant capacity");

    // Build the zeroed backing array.
    let elem_size = elem.size_bytes(&target);
    let (addr, _) = state.alloc_zeroed(cap_value as u32 * elem_size);

    // Build the slice header.
    let (_, hdr) = state.alloc(target.pointer_bytes() * 3);
    let hdr = state.store_int_at(&hdr, 0, addr); // data
    let hdr = state.store_int_at(&hdr, 1, len); // len
    let hdr = state.store_int_at(&hdr, 2, cap); // cap
    state.heap_set(hdr.clone());

    state.frame_mut().unwrap().bind(key, Binding::Array(hdr));
    Ok(())
}

pub(crate) fn execute_slice(
    target: Target,
    state: &mut ExecutionState,
    key: BindKey,
    typ: &Type,
    x: &Operand,
    low: Option<&Operand>,
    high: Option<&Operand>,
    max: Option<&Operand>,
) -> Result<(), Error> {
    match typ.deref() {
        Type::Array { elem, .. } => {
            execute_slice_array(target, state, key, elem, x, low, high, max)
        }
        Type::Str => execute_slice_string(state, key, x, low, high),
        Type::Slice(elem) => execute_slice_slice(target, state, key, elem, x, low, high, max),
        other => Err(Error::InvalidOperand(format!("unexpected slice type: {other:?}"))),
    }
}

#[allow(clippy::too_many_arguments)]
fn execute_slice_array(
    target: Target,
    state: &mut ExecutionState,
    key: BindKey,
    elem: &Type,
    x: &Operand,
    low: Option<&Operand>,
    high: Option<&Operand>,
    max: Option<&Operand>,
) -> Result<(), Error> {
    let pw = target.pointer_width();

    // The array address must be concrete.
    let addr = state
        .eval_const_expr(Some(x))
        .map_err(|()| Error::NonConstant("array slice address".to_string()))?
        .ok_or_else(|| Error::NonConstant("array slice address".to_string()))?;
    let (av, _) = addr.as_constant().expect("constant address");
    let array = state.find_alloc_by_addr(av).ok_or(Error::AllocNotFound(av))?;

    let lo = eval_opt_expr(state, low);
    let hi = eval_opt_expr(state, high);
    let mx = eval_opt_expr(state, max);

    debug!("[slice] array low={lo:?} high={hi:?} max={mx:?}");

    let elem_width = Expr::constant(elem.size_bytes(&target) as u64, pw);
    let lo = lo.unwrap_or_else(|| Expr::constant(0, pw));
    let hi = hi.unwrap_or_else(|| Expr::constant(array.size as u64, pw));
    let mx = mx.unwrap_or_else(|| Expr::constant(array.size as u64, pw));

    let data = Expr::binary(
        BinaryOp::Add,
        addr,
        Expr::binary(BinaryOp::Mul, lo.clone(), elem_width),
    );
    let length = Expr::binary(BinaryOp::Sub, hi, lo.clone());
    let capacity = Expr::binary(BinaryOp::Sub, mx, lo);

    let (_, hdr) = state.alloc(target.pointer_bytes() * 3);
    let hdr = state.store_int_at(&hdr, 0, data);
    let hdr = state.store_int_at(&hdr, 1, length);
    let hdr = state.store_int_at(&hdr, 2, capacity);
    state.heap_set(hdr.clone());

    state.frame_mut().unwrap().bind(key, Binding::Array(hdr));
    Ok(())
}

fn execute_slice_string(
    state: &mut ExecutionState,
    key: BindKey,
    x: &Operand,
    low: Option<&Operand>,
    high: Option<&Operand>,
) -> Result<(), Error> {
    let x = eval_array(state, x)?;

    // String slice bounds must be concrete.
    let lo = state
        .eval_const_expr(low)
        .map_err(|()| Error::NonConstant("string slice low index".to_string()))?
        .unwrap_or_else(|| Expr::constant64(0));
    let hi = state
        .eval_const_expr(high)
        .map_err(|()| Error::NonConstant("string slice high index".to_string()))?
        .unwrap_or_else(|| Expr::constant64(x.size as u64));

    let (lov, _) = lo.as_constant().expect("constant low bound");
    let (hiv, _) = hi.as_constant().expect("constant high bound");

    debug!("[slice] string low={lov} high={hiv}");

    if hiv > x.size as u64 || lov > x.size as u64 || lov > hiv {
        state.set_status(Status::Panicked, "slice bounds out of range");
        return Ok(());
    }

    // Copy the substring into a fresh transient array.
    let mut array = Array::new(0, (hiv - lov) as u32);
    for i in 0..array.size as u64 {
        array.store_byte(Expr::constant64(i), x.select_byte(Expr::constant64(i + lov)));
    }

    state.frame_mut().unwrap().bind(key, Binding::Array(Rc::new(array)));
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn execute_slice_slice(
    target: Target,
    state: &mut ExecutionState,
    key: BindKey,
    elem: &Type,
    x: &Operand,
    low: Option<&Operand>,
    high: Option<&Operand>,
    max: Option<&Operand>,
) -> Result<(), Error> {
    let pw = target.pointer_width();
    let x = eval_array(state, x)?;

    let lo = eval_opt_expr(state, low);
    let hi = eval_opt_expr(state, high);
    let mx = eval_opt_expr(state, max);

    debug!("[slice] slice low={lo:?} high={hi:?} max={mx:?} id=#{}", x.id);

    let elem_width = Expr::constant(elem.size_bytes(&target) as u64, pw);
    let lo = lo.unwrap_or_else(|| Expr::constant(0, pw));
    let hi = hi.unwrap_or_else(|| state.select_int_at(&x, 1));
    let mx = mx.unwrap_or_else(|| state.select_int_at(&x, 2));

    // Data offsets by element width; len and cap rebase onto the low bound.
    let prev_data = state.select_int_at(&x, 0);
    let data = Expr::binary(
        BinaryOp::Add,
        prev_data,
        Expr::binary(BinaryOp::Mul, lo.clone(), elem_width),
    );
    let length = Expr::binary(BinaryOp::Sub, hi, lo.clone());
    let capacity = Expr::binary(BinaryOp::Sub, mx, lo);

    let (_, hdr) = state.alloc(target.pointer_bytes() * 3);
    let hdr = state.store_int_at(&hdr, 0, data);
    let hdr = state.store_int_at(&hdr, 1, length);
    let hdr = state.store_int_at(&hdr, 2, capacity);
    state.heap_set(hdr.clone());

    state.frame_mut().unwrap().bind(key, Binding::Array(hdr));
    Ok(())
}

fn eval_opt_expr(state: &mut ExecutionState, op: Option<&Operand>) -> Option<ExprRef> {
    op.and_then(|op| state.must_eval_expr(op))
}

pub(crate) fn execute_store(
    state: &mut ExecutionState,
    addr: &Operand,
    val: &Operand,
) -> Result<(), Error> {
    let addr = state
        .eval_const_expr(Some(addr))
        .map_err(|()| Error::NonConstant("store address".to_string()))?
        .ok_or_else(|| Error::NonConstant("store address".to_string()))?;

    match state.eval(val).expect("unbound store value") {
        Binding::Array(value) => {
            state.copy(&addr, &value);
            Ok(())
        }
        Binding::Expr(value) => {
            state.store(&addr, value);
            Ok(())
        }
        other => Err(Error::InvalidOperand(format!("unexpected store value: {other}"))),
    }
}

pub(crate) fn execute_deref(
    target: Target,
    state: &mut ExecutionState,
    key: BindKey,
    typ: &Type,
    x: &Operand,
) -> Result<(), Error> {
    let pw = target.pointer_width();
    let width = typ.size_bits(&target);

    // The pointer must be concrete.
    let addr = state.must_eval_expr(x).expect("unbound operand");
    let (av, _) = addr.as_constant().expect("dereference of symbolic pointer");
    let (base, array) = state
        .find_alloc_containing(av)
        .unwrap_or_else(|| panic!("deref: allocation not found: addr={av}"));

    if typ.is_expr_type() {
        // Scalars read directly as an expression.
        let offset = Expr::binary(BinaryOp::Sub, addr, Expr::constant(base, pw));
        let expr = array.select(offset, width, target.is_little_endian());
        state.frame_mut().unwrap().bind(key, Binding::Expr(expr));
    } else {
        // Aggregates copy into a fresh allocation.
        let offset = Expr::binary(BinaryOp::Sub, addr, Expr::constant(base, pw));
        let (_, dst) = state.alloc(width / 8);
        let mut copy = (*dst).clone();
        for i in 0..copy.size as u64 {
            let src_index = Expr::binary(BinaryOp::Add, offset.clone(), Expr::constant(i, pw));
            copy.store_byte(Expr::constant64(i), array.select_byte(Expr::zext(src_index, WIDTH_64)));
        }
        let copy = Rc::new(copy);
        state.heap_set(copy.clone());
        state.frame_mut().unwrap().bind(key, Binding::Array(copy));
    }
    Ok(())
}
