//! Expression traversal and concrete evaluation.

use std::collections::HashMap;

use crate::array::ArrayRef;
use crate::error::Error;

use super::{Expr, ExprRef};

/// Walks `expr` depth-first, invoking `f` for every node. Select nodes also
/// visit their array's update chain since updates may reference other arrays.
pub fn walk_expr<F: FnMut(&ExprRef)>(expr: &ExprRef, f: &mut F) {
    f(expr);
    match &**expr {
        Expr::Constant { .. } => {}
        Expr::NotOptimized { src } | Expr::Not { src } | Expr::Cast { src, .. } => {
            walk_expr(src, f)
        }
        Expr::Extract { src, .. } => walk_expr(src, f),
        Expr::Concat { msb, lsb } => {
            walk_expr(msb, f);
            walk_expr(lsb, f);
        }
        Expr::Binary { lhs, rhs, .. } => {
            walk_expr(lhs, f);
            walk_expr(rhs, f);
        }
        Expr::Select { array, index } => {
            walk_expr(index, f);
            let mut upd = array.updates.clone();
            while let Some(u) = upd {
                walk_expr(&u.index, f);
                walk_expr(&u.value, f);
                upd = u.next.clone();
            }
        }
    }
}

/// Returns all symbolic arrays referenced by the expressions, deduplicated by
/// id and sorted under the canonical array order.
pub fn find_arrays(exprs: &[ExprRef]) -> Vec<ArrayRef> {
    let mut m: HashMap<u64, ArrayRef> = HashMap::new();
    for expr in exprs {
        walk_expr(expr, &mut |e| {
            if let Expr::Select { array, .. } = &**e {
                if array.is_symbolic() {
                    m.entry(array.id).or_insert_with(|| array.clone());
                }
            }
        });
    }

    let mut arrays: Vec<ArrayRef> = m.into_values().collect();
    arrays.sort_by(|a, b| crate::array::compare_arrays(a, b));
    arrays
}

/// Evaluates expressions to constants using known concrete array values.
pub struct Evaluator {
    values: HashMap<u64, Vec<u8>>,
}

impl Evaluator {
    /// Builds an evaluator from parallel array/value lists, as returned by a
    /// solver model.
    pub fn new(arrays: &[ArrayRef], values: &[Vec<u8>]) -> Self {
        assert!(
            arrays.len() == values.len(),
            "array/value count mismatch: {} != {}",
            arrays.len(),
            values.len()
        );

        let mut m = HashMap::new();
        for (array, value) in arrays.iter().zip(values) {
            let prev = m.insert(array.id, value.clone());
            assert!(prev.is_none(), "duplicate array: id={}", array.id);
        }
        Evaluator { values: m }
    }

    /// Evaluates `expr` down to a constant expression. Returns an error if an
    /// unknown array is encountered or a select lands outside its value.
    pub fn evaluate(&self, expr: &ExprRef) -> Result<ExprRef, Error> {
        match &**expr {
            Expr::Constant { .. } => Ok(expr.clone()),
            Expr::NotOptimized { src } => self.evaluate(src),
            Expr::Not { src } => Ok(Expr::not(self.evaluate(src)?)),
            Expr::Cast { src, width, signed } => {
                Ok(Expr::cast(self.evaluate(src)?, *width, *signed))
            }
            Expr::Extract { src, offset, width } => {
                Ok(Expr::extract(self.evaluate(src)?, *offset, *width))
            }
            Expr::Concat { msb, lsb } => {
                Ok(Expr::concat(self.evaluate(msb)?, self.evaluate(lsb)?))
            }
            Expr::Binary { op, lhs, rhs } => {
                Ok(Expr::binary(*op, self.evaluate(lhs)?, self.evaluate(rhs)?))
            }
            Expr::Select { array, index } => {
                let index = self.evaluate(index)?;
                let (iv, _) = index.as_constant().expect("evaluated index not constant");

                // Return the most recent update at the index, if any.
                let mut upd = array.updates.clone();
                while let Some(u) = upd {
                    let ui = self.evaluate(&u.index)?;
                    if ui.as_constant().expect("evaluated index not constant").0 == iv {
                        return self.evaluate(&u.value);
                    }
                    upd = u.next.clone();
                }

                // Otherwise fall back to the array's initial value.
                let initial = self
                    .values
                    .get(&array.id)
                    .ok_or(Error::ArrayNotBound(array.id))?;
                if iv as usize >= initial.len() {
                    return Err(Error::SelectOutOfBounds { index: iv, len: initial.len() });
                }
                Ok(Expr::constant8(initial[iv as usize] as u64))
            }
        }
    }
}
