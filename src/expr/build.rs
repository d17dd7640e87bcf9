//! Smart constructor internals.
//!
//! Each `new_*` function returns an expression semantically equivalent to the
//! naive construction but locally normalized. Rewrites are one or two levels
//! deep and recurse through the public constructors; every recursive step
//! either folds a constant or strictly shrinks the non-constant side, so the
//! recursion is well founded.

use std::cmp::Ordering;
use std::rc::Rc;

use super::compare::compare_exprs;
use super::{BinaryOp, Expr, ExprRef, WIDTH_BOOL};

/// Returns a mask with the low `width` bits set.
pub(crate) fn bitmask(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

/// Interprets `value` as a two's-complement integer of `width` bits.
/// Only the standard widths are accepted.
fn to_signed(value: u64, width: u32) -> i64 {
    match width {
        WIDTH_BOOL => {
            if value & 1 != 0 {
                -1
            } else {
                0
            }
        }
        8 => value as u8 as i8 as i64,
        16 => value as u16 as i16 as i64,
        32 => value as u32 as i32 as i64,
        64 => value as i64,
        _ => panic!("signed operand: non-standard width: {width}"),
    }
}

fn assert_standard_width(op: &str, width: u32) {
    assert!(
        matches!(width, 1 | 8 | 16 | 32 | 64),
        "{op}: non-standard width: {width}"
    );
}

fn bare(op: BinaryOp, lhs: ExprRef, rhs: ExprRef) -> ExprRef {
    Rc::new(Expr::Binary { op, lhs, rhs })
}

/// Dispatches to the per-operation constructor.
pub(crate) fn new_binary(op: BinaryOp, lhs: ExprRef, rhs: ExprRef) -> ExprRef {
    assert!(
        lhs.width() == rhs.width(),
        "binary expr width mismatch: op={} {} != {}",
        op,
        lhs.width(),
        rhs.width()
    );

    match op {
        // Arithmetic operators.
        BinaryOp::Add => new_add(lhs, rhs),
        BinaryOp::Sub => new_sub(lhs, rhs),
        BinaryOp::Mul => new_mul(lhs, rhs),
        BinaryOp::Udiv | BinaryOp::Sdiv => new_div(op, lhs, rhs),
        BinaryOp::Urem | BinaryOp::Srem => new_rem(op, lhs, rhs),
        BinaryOp::And => new_and(lhs, rhs),
        BinaryOp::Or => new_or(lhs, rhs),
        BinaryOp::Xor => new_xor(lhs, rhs),
        BinaryOp::Shl => new_shl(lhs, rhs),
        BinaryOp::Lshr => new_lshr(lhs, rhs),
        BinaryOp::Ashr => new_ashr(lhs, rhs),

        // Comparison operators. Greater-than forms reverse into less-than
        // forms; NE rewrites into a negated EQ.
        BinaryOp::Eq => new_eq(lhs, rhs),
        BinaryOp::Ne => new_binary(
            BinaryOp::Eq,
            Expr::constant(0, WIDTH_BOOL),
            new_binary(BinaryOp::Eq, lhs, rhs),
        ),
        BinaryOp::Ult => new_ult(lhs, rhs),
        BinaryOp::Ugt => new_ult(rhs, lhs),
        BinaryOp::Ule => new_ule(lhs, rhs),
        BinaryOp::Uge => new_ule(rhs, lhs),
        BinaryOp::Slt => new_slt(lhs, rhs),
        BinaryOp::Sgt => new_slt(rhs, lhs),
        BinaryOp::Sle => new_sle(lhs, rhs),
        BinaryOp::Sge => new_sle(rhs, lhs),
    }
}

/// Splits a binary expression into (op, lhs, rhs) if it is one.
fn as_binary(e: &ExprRef) -> Option<(BinaryOp, &ExprRef, &ExprRef)> {
    match &**e {
        Expr::Binary { op, lhs, rhs } => Some((*op, lhs, rhs)),
        _ => None,
    }
}

fn new_add(mut lhs: ExprRef, mut rhs: ExprRef) -> ExprRef {
    // Move constant expression to the left hand side.
    if !lhs.is_constant() && rhs.is_constant() {
        std::mem::swap(&mut lhs, &mut rhs);
    }

    // Refactor to XOR for boolean expressions.
    if lhs.width() == WIDTH_BOOL {
        return new_binary(BinaryOp::Xor, lhs, rhs);
    }

    // Compute constant if both sides are constant.
    if let Some((lv, lw)) = lhs.as_constant() {
        if lv == 0 {
            return rhs;
        } else if let Some((rv, _)) = rhs.as_constant() {
            return Expr::constant(lv.wrapping_add(rv), lw);
        }
    }

    // Merge constant LHS with constant in RHS binary expression.
    if lhs.is_constant() {
        if let Some((op, rl, rr)) = as_binary(&rhs) {
            if op == BinaryOp::Add && rl.is_constant() {
                // X + (Y+z) == (X+Y) + z
                return new_binary(
                    BinaryOp::Add,
                    new_binary(BinaryOp::Add, lhs, rl.clone()),
                    rr.clone(),
                );
            } else if op == BinaryOp::Sub && rl.is_constant() {
                // X + (Y-z) == (X+Y) - z
                return new_binary(
                    BinaryOp::Sub,
                    new_binary(BinaryOp::Add, lhs, rl.clone()),
                    rr.clone(),
                );
            }
        }
    }

    // Refactor constant LHS.LHS to a standalone value on LHS.
    if let Some((op, ll, lr)) = as_binary(&lhs) {
        if ll.is_constant() {
            if op == BinaryOp::Add {
                // (X+y) + z = X + (y+z)
                return new_binary(
                    BinaryOp::Add,
                    ll.clone(),
                    new_binary(BinaryOp::Add, lr.clone(), rhs),
                );
            } else if op == BinaryOp::Sub {
                // (X-y) + z = X + (z-y)
                return new_binary(
                    BinaryOp::Add,
                    ll.clone(),
                    new_binary(BinaryOp::Sub, rhs, lr.clone()),
                );
            }
        }
    }

    // Refactor constant RHS.LHS to a standalone value on LHS.
    if let Some((op, rl, rr)) = as_binary(&rhs) {
        if rl.is_constant() {
            if op == BinaryOp::Add {
                // a + (K+b) = K + (a+b)
                return new_binary(
                    BinaryOp::Add,
                    rl.clone(),
                    new_binary(BinaryOp::Add, lhs, rr.clone()),
                );
            } else if op == BinaryOp::Sub {
                // a + (K-b) = K + (a-b)
                return new_binary(
                    BinaryOp::Add,
                    rl.clone(),
                    new_binary(BinaryOp::Sub, lhs, rr.clone()),
                );
            }
        }
    }

    bare(BinaryOp::Add, lhs, rhs)
}

fn new_sub(lhs: ExprRef, rhs: ExprRef) -> ExprRef {
    // Subtracting a value from itself is zero.
    if compare_exprs(&lhs, &rhs) == Ordering::Equal {
        return Expr::constant(0, lhs.width());
    }

    // Compute constant if both sides are constant.
    if let Some((lv, lw)) = lhs.as_constant() {
        if let Some((rv, _)) = rhs.as_constant() {
            return Expr::constant(lv.wrapping_sub(rv), lw);
        }
    }

    // Refactor to XOR for boolean expressions.
    if lhs.width() == WIDTH_BOOL {
        return new_binary(BinaryOp::Xor, lhs, rhs);
    }

    // If constant is on right side, refactor to addition with sides flipped.
    if let Some((rv, rw)) = rhs.as_constant() {
        if !lhs.is_constant() {
            return new_binary(BinaryOp::Add, Expr::constant(0u64.wrapping_sub(rv), rw), lhs);
        }
    }

    // Combine with children of RHS binary expression, if possible.
    if lhs.is_constant() {
        if let Some((op, rl, rr)) = as_binary(&rhs) {
            if op == BinaryOp::Add && rl.is_constant() {
                // X - (Y+z) == (X-Y) - z
                return new_binary(
                    BinaryOp::Sub,
                    new_binary(BinaryOp::Sub, lhs, rl.clone()),
                    rr.clone(),
                );
            } else if op == BinaryOp::Sub && rl.is_constant() {
                // X - (Y-z) == (X-Y) + z
                return new_binary(
                    BinaryOp::Add,
                    new_binary(BinaryOp::Sub, lhs, rl.clone()),
                    rr.clone(),
                );
            }
        }
    }

    // Refactor constant LHS.LHS to a standalone value on LHS.
    if let Some((op, ll, lr)) = as_binary(&lhs) {
        if ll.is_constant() {
            if op == BinaryOp::Add {
                // (X+y) - z = X + (y-z)
                return new_binary(
                    BinaryOp::Add,
                    ll.clone(),
                    new_binary(BinaryOp::Sub, lr.clone(), rhs),
                );
            } else if op == BinaryOp::Sub {
                // (X-y) - z = X - (y+z)
                return new_binary(
                    BinaryOp::Sub,
                    ll.clone(),
                    new_binary(BinaryOp::Add, lr.clone(), rhs),
                );
            }
        }
    }

    // Refactor constant RHS.LHS to a standalone value on LHS.
    if let Some((op, rl, rr)) = as_binary(&rhs) {
        if rl.is_constant() {
            if op == BinaryOp::Add {
                // x - (K+z) = (x-z) - K
                return new_binary(
                    BinaryOp::Sub,
                    new_binary(BinaryOp::Sub, lhs, rr.clone()),
                    rl.clone(),
                );
            } else if op == BinaryOp::Sub {
                // x - (K-z) = (x+z) - K
                return new_binary(
                    BinaryOp::Sub,
                    new_binary(BinaryOp::Add, lhs, rr.clone()),
                    rl.clone(),
                );
            }
        }
    }

    bare(BinaryOp::Sub, lhs, rhs)
}

fn new_mul(mut lhs: ExprRef, mut rhs: ExprRef) -> ExprRef {
    // If constant is on right side, swap to left side.
    if rhs.is_constant() && !lhs.is_constant() {
        std::mem::swap(&mut lhs, &mut rhs);
    }

    // Compute constant if both sides are constant.
    if let Some((lv, lw)) = lhs.as_constant() {
        if let Some((rv, _)) = rhs.as_constant() {
            return Expr::constant(lv.wrapping_mul(rv), lw);
        }
    }

    // Refactor to AND for boolean expressions.
    if lhs.width() == WIDTH_BOOL {
        return new_binary(BinaryOp::And, lhs, rhs);
    }

    // Multiplication by a constant one or zero.
    if let Some((lv, _)) = lhs.as_constant() {
        if lv == 1 {
            return rhs;
        } else if lv == 0 {
            return lhs;
        }
    }
    bare(BinaryOp::Mul, lhs, rhs)
}

fn new_div(op: BinaryOp, lhs: ExprRef, rhs: ExprRef) -> ExprRef {
    if let (Some((lv, lw)), Some((rv, _))) = (lhs.as_constant(), rhs.as_constant()) {
        assert!(rv != 0, "{op}: division by zero");
        return match op {
            BinaryOp::Udiv => Expr::constant(lv / rv, lw),
            BinaryOp::Sdiv => {
                assert_standard_width("sdiv", lw);
                let q = to_signed(lv, lw).wrapping_div(to_signed(rv, lw));
                Expr::constant(q as u64, lw)
            }
            _ => unreachable!("invalid div op: {op}"),
        };
    }
    if lhs.width() == WIDTH_BOOL {
        return lhs; // rhs must be 1
    }
    bare(op, lhs, rhs)
}

fn new_rem(op: BinaryOp, lhs: ExprRef, rhs: ExprRef) -> ExprRef {
    if let (Some((lv, lw)), Some((rv, _))) = (lhs.as_constant(), rhs.as_constant()) {
        assert!(rv != 0, "{op}: remainder by zero");
        return match op {
            BinaryOp::Urem => Expr::constant(lv % rv, lw),
            BinaryOp::Srem => {
                assert_standard_width("srem", lw);
                let r = to_signed(lv, lw).wrapping_rem(to_signed(rv, lw));
                Expr::constant(r as u64, lw)
            }
            _ => unreachable!("invalid rem op: {op}"),
        };
    }
    if lhs.width() == WIDTH_BOOL {
        return Expr::constant(0, WIDTH_BOOL); // rhs must be 1
    }
    bare(op, lhs, rhs)
}

fn new_and(mut lhs: ExprRef, mut rhs: ExprRef) -> ExprRef {
    // Compute constant if both sides are constant.
    if let (Some((lv, lw)), Some((rv, _))) = (lhs.as_constant(), rhs.as_constant()) {
        return Expr::constant(lv & rv, lw);
    }

    // If constant is on left side, swap to right side.
    if lhs.is_constant() && !rhs.is_constant() {
        std::mem::swap(&mut lhs, &mut rhs);
    }

    // All-ones and zero constants absorb.
    if rhs.is_all_ones() {
        return lhs;
    } else if let Some((0, _)) = rhs.as_constant() {
        return rhs;
    }
    bare(BinaryOp::And, lhs, rhs)
}

fn new_or(mut lhs: ExprRef, mut rhs: ExprRef) -> ExprRef {
    // Compute constant if both sides are constant.
    if let (Some((lv, lw)), Some((rv, _))) = (lhs.as_constant(), rhs.as_constant()) {
        return Expr::constant(lv | rv, lw);
    }

    // If constant is on left side, swap to right side.
    if lhs.is_constant() && !rhs.is_constant() {
        std::mem::swap(&mut lhs, &mut rhs);
    }

    // All-ones and zero constants absorb.
    if rhs.is_all_ones() {
        return rhs;
    } else if let Some((0, _)) = rhs.as_constant() {
        return lhs;
    }
    bare(BinaryOp::Or, lhs, rhs)
}

fn new_xor(mut lhs: ExprRef, mut rhs: ExprRef) -> ExprRef {
    // If constant is on right side, swap to left side.
    if !lhs.is_constant() && rhs.is_constant() {
        std::mem::swap(&mut lhs, &mut rhs);
    }

    // Compute constant if both sides are constant.
    if let Some((lv, lw)) = lhs.as_constant() {
        if lv == 0 {
            return rhs;
        } else if let Some((rv, _)) = rhs.as_constant() {
            return Expr::constant(lv ^ rv, lw);
        }
    }

    bare(BinaryOp::Xor, lhs, rhs)
}

fn fold_shl(lv: u64, rv: u64, width: u32) -> ExprRef {
    assert_standard_width("shl", width);
    if rv >= width as u64 {
        return Expr::constant(0, width);
    }
    Expr::constant(lv << rv, width)
}

fn fold_lshr(lv: u64, rv: u64, width: u32) -> ExprRef {
    assert_standard_width("lshr", width);
    if rv >= width as u64 {
        return Expr::constant(0, width);
    }
    Expr::constant(lv >> rv, width)
}

fn fold_ashr(lv: u64, rv: u64, width: u32) -> ExprRef {
    assert_standard_width("ashr", width);
    let sv = to_signed(lv, width);
    if rv >= width as u64 {
        return Expr::constant(if sv < 0 { u64::MAX } else { 0 }, width);
    }
    Expr::constant((sv >> rv) as u64, width)
}

fn new_shl(lhs: ExprRef, rhs: ExprRef) -> ExprRef {
    if let (Some((lv, lw)), Some((rv, _))) = (lhs.as_constant(), rhs.as_constant()) {
        return fold_shl(lv, rv, lw);
    }
    if lhs.width() == WIDTH_BOOL {
        // l & (r == 0)
        return new_binary(BinaryOp::And, lhs, Expr::is_zero(rhs));
    }
    bare(BinaryOp::Shl, lhs, rhs)
}

fn new_lshr(lhs: ExprRef, rhs: ExprRef) -> ExprRef {
    if let (Some((lv, lw)), Some((rv, _))) = (lhs.as_constant(), rhs.as_constant()) {
        return fold_lshr(lv, rv, lw);
    }
    if lhs.width() == WIDTH_BOOL {
        // l & (r == 0)
        return new_binary(BinaryOp::And, lhs, Expr::is_zero(rhs));
    }
    bare(BinaryOp::Lshr, lhs, rhs)
}

fn new_ashr(lhs: ExprRef, rhs: ExprRef) -> ExprRef {
    if let (Some((lv, lw)), Some((rv, _))) = (lhs.as_constant(), rhs.as_constant()) {
        return fold_ashr(lv, rv, lw);
    }
    if lhs.width() == WIDTH_BOOL {
        // sign bit is the value itself
        return lhs;
    }
    bare(BinaryOp::Ashr, lhs, rhs)
}

/// Zero-extends (or truncates) a constant value from one width to another,
/// matching the constant cast semantics: extending to the boolean width
/// collapses to a zero test.
pub(crate) fn const_zext(value: u64, to: u32) -> u64 {
    if to == WIDTH_BOOL {
        (value != 0) as u64
    } else {
        value & bitmask(to)
    }
}

fn new_eq(mut lhs: ExprRef, mut rhs: ExprRef) -> ExprRef {
    // If constant is on right side, swap to left side.
    if !lhs.is_constant() && rhs.is_constant() {
        std::mem::swap(&mut lhs, &mut rhs);
    }

    if let Some((lv, lw)) = lhs.as_constant() {
        // Compute constant if both sides are constant.
        if let Some((rv, _)) = rhs.as_constant() {
            return Expr::bool_const(lv == rv);
        }

        match &*rhs {
            Expr::Binary { op, lhs: rl, rhs: rr } => match op {
                BinaryOp::Eq => {
                    if lw == WIDTH_BOOL {
                        if lhs.is_true() {
                            return rhs;
                        } else if lhs.is_false() && rl.is_false() {
                            // 0 == (0 == A) => A
                            return rr.clone();
                        }
                    }
                }
                BinaryOp::Or => {
                    if lw == WIDTH_BOOL {
                        if lhs.is_true() {
                            // T == (X || Y) => X || Y
                            return rhs;
                        } else if rl.width() == WIDTH_BOOL {
                            // F == (X || Y) => !X && !Y
                            return new_binary(
                                BinaryOp::And,
                                Expr::is_zero(rl.clone()),
                                Expr::is_zero(rr.clone()),
                            );
                        }
                    }
                }
                BinaryOp::Add => {
                    if rl.is_constant() {
                        // X == (K+z) => (X-K) == z
                        return new_binary(
                            BinaryOp::Eq,
                            new_binary(BinaryOp::Sub, lhs, rl.clone()),
                            rr.clone(),
                        );
                    }
                }
                BinaryOp::Sub => {
                    if rl.is_constant() {
                        // X == (K-z) => (K-X) == z
                        return new_binary(
                            BinaryOp::Eq,
                            new_binary(BinaryOp::Sub, rl.clone(), lhs),
                            rr.clone(),
                        );
                    }
                }
                _ => {}
            },
            Expr::Cast { src, signed, .. } => {
                // A constant compared against an extension: the compare holds
                // iff the constant survives a round-trip through the source
                // width; otherwise it is statically false.
                let src_width = src.width();
                let trunc = Expr::constant(const_zext(lv, src_width), src_width);
                let (tv, _) = trunc.as_constant().unwrap();
                let round_trip = if *signed {
                    to_signed(tv, src_width) as u64 & bitmask(lw)
                } else {
                    tv
                };
                if round_trip == lv {
                    return new_binary(BinaryOp::Eq, src.clone(), trunc);
                }
                return Expr::bool_const(false);
            }
            _ => {}
        }
    }

    if compare_exprs(&lhs, &rhs) == Ordering::Equal {
        return Expr::bool_const(true);
    }
    bare(BinaryOp::Eq, lhs, rhs)
}

fn new_ult(lhs: ExprRef, rhs: ExprRef) -> ExprRef {
    if let (Some((lv, _)), Some((rv, _))) = (lhs.as_constant(), rhs.as_constant()) {
        return Expr::bool_const(lv < rv);
    }
    if lhs.width() == WIDTH_BOOL {
        // !l && r
        return new_binary(BinaryOp::And, Expr::is_zero(lhs), rhs);
    }
    bare(BinaryOp::Ult, lhs, rhs)
}

fn new_ule(lhs: ExprRef, rhs: ExprRef) -> ExprRef {
    if let (Some((lv, _)), Some((rv, _))) = (lhs.as_constant(), rhs.as_constant()) {
        return Expr::bool_const(lv <= rv);
    }
    if lhs.width() == WIDTH_BOOL {
        // !l || r
        return new_binary(BinaryOp::Or, Expr::is_zero(lhs), rhs);
    }
    bare(BinaryOp::Ule, lhs, rhs)
}

fn new_slt(lhs: ExprRef, rhs: ExprRef) -> ExprRef {
    if let (Some((lv, lw)), Some((rv, _))) = (lhs.as_constant(), rhs.as_constant()) {
        assert_standard_width("slt", lw);
        return Expr::bool_const(to_signed(lv, lw) < to_signed(rv, lw));
    }
    if lhs.width() == WIDTH_BOOL {
        // l && !r (true sorts below false in two's complement)
        return new_binary(BinaryOp::And, lhs, Expr::is_zero(rhs));
    }
    bare(BinaryOp::Slt, lhs, rhs)
}

fn new_sle(lhs: ExprRef, rhs: ExprRef) -> ExprRef {
    if let (Some((lv, lw)), Some((rv, _))) = (lhs.as_constant(), rhs.as_constant()) {
        assert_standard_width("sle", lw);
        return Expr::bool_const(to_signed(lv, lw) <= to_signed(rv, lw));
    }
    if lhs.width() == WIDTH_BOOL {
        // l || !r
        return new_binary(BinaryOp::Or, lhs, Expr::is_zero(rhs));
    }
    bare(BinaryOp::Sle, lhs, rhs)
}

pub(crate) fn new_concat(msb: ExprRef, lsb: ExprRef) -> ExprRef {
    // Combine expressions if they are both constants.
    if let (Some((mv, mw)), Some((lv, lw))) = (msb.as_constant(), lsb.as_constant()) {
        assert!(mw + lw <= 64, "concat: width overflow: {mw}+{lw}");
        return Expr::constant((mv << lw) | lv, mw + lw);
    }

    // Combine extract expressions if they are contiguous over one parent.
    if let (
        Expr::Extract { src: ms, offset: mo, width: mw },
        Expr::Extract { src: ls, offset: lo, width: lw },
    ) = (&*msb, &*lsb)
    {
        if Rc::ptr_eq(ms, ls) && lo + lw == *mo {
            return new_extract(ms.clone(), *lo, mw + lw);
        }
    }

    Rc::new(Expr::Concat { msb, lsb })
}

pub(crate) fn new_extract(src: ExprRef, offset: u32, width: u32) -> ExprRef {
    let kw = src.width();
    assert!(width > 0, "extract width cannot be zero");
    assert!(
        offset + width <= kw,
        "extract out of bounds: {offset}+{width} > {kw}"
    );

    if width == kw {
        return src;
    } else if let Some((value, _)) = src.as_constant() {
        return Expr::constant(value >> offset, width);
    }

    // Extract from a concatenation: take whichever side covers the window,
    // splitting into two extracts when the window straddles the seam.
    if let Expr::Concat { msb, lsb } = &*src {
        let lsb_width = lsb.width();
        if offset >= lsb_width {
            return new_extract(msb.clone(), offset - lsb_width, width);
        }
        if offset + width <= lsb_width {
            return new_extract(lsb.clone(), offset, width);
        }
        return new_concat(
            new_extract(msb.clone(), 0, width - (lsb_width - offset)),
            new_extract(lsb.clone(), offset, lsb_width - offset),
        );
    }

    Rc::new(Expr::Extract { src, offset, width })
}

pub(crate) fn new_not(src: ExprRef) -> ExprRef {
    if let Some((value, width)) = src.as_constant() {
        return Expr::constant(!value, width);
    }
    Rc::new(Expr::Not { src })
}

pub(crate) fn new_zext(src: ExprRef, width: u32) -> ExprRef {
    let sw = src.width();
    if width == sw {
        return src; // nop
    } else if width < sw {
        return new_extract(src, 0, width); // truncate
    } else if let Some((value, _)) = src.as_constant() {
        return Expr::constant(value, width);
    }
    Rc::new(Expr::Cast { src, width, signed: false })
}

pub(crate) fn new_sext(src: ExprRef, width: u32) -> ExprRef {
    let sw = src.width();
    if width == sw {
        return src; // nop
    } else if width < sw {
        return new_extract(src, 0, width); // truncate
    } else if let Some((value, _)) = src.as_constant() {
        return Expr::constant(to_signed(value, sw) as u64, width);
    }
    Rc::new(Expr::Cast { src, width, signed: true })
}
