//! Canonical total order over expressions.
//!
//! The order compares by kind tag first, then by kind-specific fields. It is
//! deterministic, purely structural, and is the only equality notion used by
//! the rewrite rules and for stable serialization of array sets.

use std::cmp::Ordering;

use crate::array::compare_arrays;

use super::Expr;

fn kind_rank(expr: &Expr) -> u8 {
    match expr {
        Expr::Constant { .. } => 1,
        Expr::NotOptimized { .. } => 2,
        Expr::Select { .. } => 3,
        Expr::Concat { .. } => 4,
        Expr::Extract { .. } => 5,
        Expr::Not { .. } => 6,
        Expr::Cast { .. } => 7,
        Expr::Binary { .. } => 8,
    }
}

/// Compares two expressions under the canonical structural order.
pub fn compare_exprs(a: &Expr, b: &Expr) -> Ordering {
    match kind_rank(a).cmp(&kind_rank(b)) {
        Ordering::Equal => {}
        other => return other,
    }

    match (a, b) {
        (
            Expr::Constant { value: av, width: aw },
            Expr::Constant { value: bv, width: bw },
        ) => aw.cmp(bw).then_with(|| av.cmp(bv)),

        (Expr::NotOptimized { src: a }, Expr::NotOptimized { src: b }) => compare_exprs(a, b),

        (
            Expr::Select { array: aa, index: ai },
            Expr::Select { array: ba, index: bi },
        ) => compare_exprs(ai, bi).then_with(|| compare_arrays(aa, ba)),

        (
            Expr::Concat { msb: am, lsb: al },
            Expr::Concat { msb: bm, lsb: bl },
        ) => compare_exprs(am, bm).then_with(|| compare_exprs(al, bl)),

        (
            Expr::Extract { src: ae, offset: ao, width: aw },
            Expr::Extract { src: be, offset: bo, width: bw },
        ) => ao
            .cmp(bo)
            .then_with(|| aw.cmp(bw))
            .then_with(|| compare_exprs(ae, be)),

        (Expr::Not { src: a }, Expr::Not { src: b }) => compare_exprs(a, b),

        (
            Expr::Cast { src: ae, width: aw, signed: asg },
            Expr::Cast { src: be, width: bw, signed: bsg },
        ) => {
            // Signed casts sort before unsigned.
            match (asg, bsg) {
                (true, false) => return Ordering::Less,
                (false, true) => return Ordering::Greater,
                _ => {}
            }
            aw.cmp(bw).then_with(|| compare_exprs(ae, be))
        }

        (
            Expr::Binary { op: aop, lhs: al, rhs: ar },
            Expr::Binary { op: bop, lhs: bl, rhs: br },
        ) => aop
            .cmp(bop)
            .then_with(|| compare_exprs(al, bl))
            .then_with(|| compare_exprs(ar, br)),

        _ => unreachable!("kind rank mismatch"),
    }
}
