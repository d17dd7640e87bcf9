//! Z3-backed implementation of the [`Solver`] trait.
//!
//! Expressions lower onto the quantifier-free bit-vector + array theory.
//! Width-1 expressions map to the boolean sort: constants become
//! `true`/`false`, single-bit extracts become an equality test against 1,
//! and width-1 connectives use the boolean operations. Arrays lower as
//! `(Array (_ BitVec 64) (_ BitVec 8))` constants named `A<id>` with their
//! update chains applied oldest-first as nested stores.

use z3::ast::{Ast, Bool, BV};
use z3::{Config, Context, SatResult, Sort, Symbol};

use crate::array::{Array, ArrayRef, UpdateRef};
use crate::expr::{BinaryOp, Expr, ExprRef, WIDTH_64, WIDTH_8, WIDTH_BOOL};

use super::{Solution, Solver, SolverError};

/// A solver backed by an embedded Z3 context.
pub struct Z3Solver {
    ctx: Context,
}

impl Default for Z3Solver {
    fn default() -> Self {
        Self::new()
    }
}

impl Z3Solver {
    pub fn new() -> Z3Solver {
        let config = Config::new();
        Z3Solver { ctx: Context::new(&config) }
    }
}

impl Solver for Z3Solver {
    fn solve(&self, constraints: &[ExprRef], arrays: &[ArrayRef]) -> Result<Solution, SolverError> {
        let solver = z3::Solver::new(&self.ctx);

        for constraint in constraints {
            assert!(
                constraint.width() == WIDTH_BOOL,
                "constraint width must be 1: {}",
                constraint.width()
            );
            solver.assert(&lower(&self.ctx, constraint).boolean());
        }

        match solver.check() {
            SatResult::Unsat => Ok(Solution::Unsat),
            SatResult::Unknown => Err(reason_to_error(solver.get_reason_unknown())),
            SatResult::Sat => {
                if arrays.is_empty() {
                    return Ok(Solution::Sat(Vec::new())); // no symbolics, skip model
                }
                let model = solver
                    .get_model()
                    .ok_or_else(|| SolverError::Backend("model unavailable".to_string()))?;

                let mut values = Vec::with_capacity(arrays.len());
                for array in arrays {
                    values.push(eval_array(&self.ctx, &model, array)?);
                }
                Ok(Solution::Sat(values))
            }
        }
    }
}

fn reason_to_error(reason: Option<String>) -> SolverError {
    let reason = reason.unwrap_or_default();
    if reason.contains("timeout") {
        SolverError::Timeout
    } else if reason.contains("canceled") {
        SolverError::Canceled
    } else if reason.contains("(resource limits reached)") {
        SolverError::ResourceLimit
    } else if reason.contains("unknown") {
        SolverError::Unknown
    } else {
        SolverError::Backend(reason)
    }
}

/// A lowered expression: boolean sort for width 1, bit-vector otherwise.
enum Lowered<'ctx> {
    Bv(BV<'ctx>),
    Bool(Bool<'ctx>),
}

impl<'ctx> Lowered<'ctx> {
    fn boolean(self) -> Bool<'ctx> {
        match self {
            Lowered::Bool(b) => b,
            Lowered::Bv(_) => panic!("expected boolean sort"),
        }
    }

    fn bv(self, ctx: &'ctx Context) -> BV<'ctx> {
        match self {
            Lowered::Bv(bv) => bv,
            // A width-1 value used as a bit-vector becomes an if-then-else.
            Lowered::Bool(b) => {
                b.ite(&BV::from_u64(ctx, 1, 1), &BV::from_u64(ctx, 0, 1))
            }
        }
    }
}

fn lower<'ctx>(ctx: &'ctx Context, expr: &ExprRef) -> Lowered<'ctx> {
    match &**expr {
        Expr::Constant { value, width } => {
            if *width == WIDTH_BOOL {
                Lowered::Bool(Bool::from_bool(ctx, *value != 0))
            } else {
                Lowered::Bv(BV::from_u64(ctx, *value, *width))
            }
        }
        Expr::NotOptimized { src } => lower(ctx, src),
        Expr::Select { array, index } => {
            let z3_array = lower_array(ctx, array, array.updates.as_ref());
            let index = lower(ctx, index).bv(ctx);
            let byte = z3_array.select(&index).as_bv().expect("select yields a bit-vector");
            Lowered::Bv(byte)
        }
        Expr::Concat { msb, lsb } => {
            Lowered::Bv(lower(ctx, msb).bv(ctx).concat(&lower(ctx, lsb).bv(ctx)))
        }
        Expr::Extract { src, offset, width } => {
            let src = lower(ctx, src).bv(ctx);
            if *width == WIDTH_BOOL {
                // Single-bit extracts convert to the boolean sort.
                let bit = src.extract(*offset, *offset);
                Lowered::Bool(bit._eq(&BV::from_u64(ctx, 1, 1)))
            } else {
                Lowered::Bv(src.extract(offset + width - 1, *offset))
            }
        }
        Expr::Not { src } => match lower(ctx, src) {
            Lowered::Bool(b) => Lowered::Bool(b.not()),
            Lowered::Bv(bv) => Lowered::Bv(bv.bvnot()),
        },
        Expr::Cast { src, width, signed } => {
            let src_width = src.width();
            let lowered = lower(ctx, src);
            if src_width == WIDTH_BOOL {
                // Boolean casts become an if-then-else over the two images.
                let cond = match lowered {
                    Lowered::Bool(b) => b,
                    Lowered::Bv(bv) => bv._eq(&BV::from_u64(ctx, 1, 1)),
                };
                let ones = if *signed { u64::MAX } else { 1 };
                return Lowered::Bv(cond.ite(
                    &BV::from_u64(ctx, ones, *width),
                    &BV::from_u64(ctx, 0, *width),
                ));
            }
            let bv = lowered.bv(ctx);
            if *signed {
                Lowered::Bv(bv.sign_ext(width - src_width))
            } else {
                Lowered::Bv(bv.zero_ext(width - src_width))
            }
        }
        Expr::Binary { op, lhs, rhs } => lower_binary(ctx, *op, lhs, rhs),
    }
}

fn lower_binary<'ctx>(
    ctx: &'ctx Context,
    op: BinaryOp,
    lhs: &ExprRef,
    rhs: &ExprRef,
) -> Lowered<'ctx> {
    let width = lhs.width();
    let ll = lower(ctx, lhs);
    let rl = lower(ctx, rhs);

    // Width-1 operands use the boolean connectives.
    if width == WIDTH_BOOL {
        let (lb, rb) = (ll.boolean(), rl.boolean());
        return match op {
            BinaryOp::And => Lowered::Bool(Bool::and(ctx, &[&lb, &rb])),
            BinaryOp::Or => Lowered::Bool(Bool::or(ctx, &[&lb, &rb])),
            BinaryOp::Xor => Lowered::Bool(lb.xor(&rb)),
            BinaryOp::Eq => Lowered::Bool(lb._eq(&rb)),
            other => panic!("non-boolean operation on width-1 operands: {other}"),
        };
    }

    let (lb, rb) = (ll.bv(ctx), rl.bv(ctx));
    match op {
        BinaryOp::Add => Lowered::Bv(lb.bvadd(&rb)),
        BinaryOp::Sub => Lowered::Bv(lb.bvsub(&rb)),
        BinaryOp::Mul => Lowered::Bv(lb.bvmul(&rb)),
        BinaryOp::Udiv => Lowered::Bv(lb.bvudiv(&rb)),
        BinaryOp::Sdiv => Lowered::Bv(lb.bvsdiv(&rb)),
        BinaryOp::Urem => Lowered::Bv(lb.bvurem(&rb)),
        BinaryOp::Srem => Lowered::Bv(lb.bvsrem(&rb)),
        BinaryOp::And => Lowered::Bv(lb.bvand(&rb)),
        BinaryOp::Or => Lowered::Bv(lb.bvor(&rb)),
        BinaryOp::Xor => Lowered::Bv(lb.bvxor(&rb)),
        BinaryOp::Shl => Lowered::Bv(lb.bvshl(&rb)),
        BinaryOp::Lshr => Lowered::Bv(lb.bvlshr(&rb)),
        BinaryOp::Ashr => Lowered::Bv(lb.bvashr(&rb)),
        BinaryOp::Eq => Lowered::Bool(lb._eq(&rb)),
        BinaryOp::Ult => Lowered::Bool(lb.bvult(&rb)),
        BinaryOp::Ule => Lowered::Bool(lb.bvule(&rb)),
        BinaryOp::Slt => Lowered::Bool(lb.bvslt(&rb)),
        BinaryOp::Sle => Lowered::Bool(lb.bvsle(&rb)),
        // Canonicalized away by the constructors.
        other => panic!("non-canonical comparison reached solver: {other}"),
    }
}

fn array_sort<'ctx>(ctx: &'ctx Context) -> (Sort<'ctx>, Sort<'ctx>) {
    (Sort::bitvector(ctx, WIDTH_64), Sort::bitvector(ctx, WIDTH_8))
}

/// The root constant for an array, with no updates applied.
fn lower_array_const<'ctx>(ctx: &'ctx Context, array: &Array) -> z3::ast::Array<'ctx> {
    let (domain, range) = array_sort(ctx);
    z3::ast::Array::new_const(ctx, Symbol::String(format!("A{}", array.id)), &domain, &range)
}

/// Lowers an array with its update chain applied oldest-first.
fn lower_array<'ctx>(
    ctx: &'ctx Context,
    root: &Array,
    upd: Option<&UpdateRef>,
) -> z3::ast::Array<'ctx> {
    match upd {
        None => lower_array_const(ctx, root),
        Some(u) => {
            let inner = lower_array(ctx, root, u.next.as_ref());
            let index = lower(ctx, &u.index).bv(ctx);
            let value = lower(ctx, &u.value).bv(ctx);
            inner.store(&index, &value)
        }
    }
}

/// Evaluates an array's initial bytes against a model, one select per index.
fn eval_array(
    ctx: &Context,
    model: &z3::Model<'_>,
    array: &ArrayRef,
) -> Result<Vec<u8>, SolverError> {
    let root = lower_array_const(ctx, array);
    let mut value = Vec::with_capacity(array.size as usize);
    for offset in 0..array.size {
        let select = root
            .select(&BV::from_u64(ctx, offset as u64, WIDTH_64))
            .as_bv()
            .expect("select yields a bit-vector");
        let byte = model
            .eval(&select, true)
            .and_then(|bv| bv.as_u64())
            .ok_or_else(|| SolverError::Backend("model evaluation failed".to_string()))?;
        value.push(byte as u8);
    }
    Ok(value)
}
