//! Symbolic byte arrays.
//!
//! An array is a fixed-length sequence of bytes carrying a newest-first
//! linked list of symbolic writes. Stores are clone-on-write: they return a
//! fresh head linked to the untouched tail, so tails may be shared between
//! sibling execution states. A non-zero id means the array is addressable in
//! the heap (the id doubles as its base address); id zero marks a transient
//! value array such as a string constant.

use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use crate::expr::{BinaryOp, Expr, ExprRef, WIDTH_64, WIDTH_8, WIDTH_BOOL};

/// Shared reference to an array snapshot.
pub type ArrayRef = Rc<Array>;

/// Shared link in an update chain.
pub type UpdateRef = Rc<ArrayUpdate>;

/// An array of symbolic or concrete bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct Array {
    /// Unique id; doubles as the heap base address when non-zero.
    pub id: u64,
    /// Width in bytes.
    pub size: u32,
    /// Newest-first linked list of symbolic updates.
    pub updates: Option<UpdateRef>,
}

/// A single symbolic write: one byte value at a 64-bit index.
#[derive(Debug, PartialEq)]
pub struct ArrayUpdate {
    pub index: ExprRef,
    pub value: ExprRef,
    pub next: Option<UpdateRef>,
}

impl ArrayUpdate {
    /// Returns a new update link. The index is zero-extended to 64 bits and
    /// the value to 8 bits.
    pub fn new(index: ExprRef, value: ExprRef, next: Option<UpdateRef>) -> UpdateRef {
        Rc::new(ArrayUpdate {
            index: Expr::zext(index, WIDTH_64),
            value: Expr::zext(value, WIDTH_8),
            next,
        })
    }
}

impl Array {
    /// Returns a new array of the given size with no updates.
    pub fn new(id: u64, size: u32) -> Array {
        Array { id, size, updates: None }
    }

    /// Zero-initializes every byte in place. Panics if updates already exist.
    pub fn zero(&mut self) {
        assert!(self.updates.is_none(), "cannot zero-initialize array with updates");
        for i in 0..self.size {
            self.store_byte(Expr::constant64(i as u64), Expr::constant(0, WIDTH_8));
        }
    }

    /// Reads a value of `width` bits starting at `offset`. The offset is
    /// zero-extended to 64 bits. Boolean reads extract the low bit of the
    /// addressed byte; wider reads concatenate `width/8` consecutive bytes in
    /// endianness order.
    pub fn select(self: &Rc<Self>, offset: ExprRef, width: u32, little_endian: bool) -> ExprRef {
        assert!(width > 0, "select: invalid width");

        let offset = Expr::zext(offset, WIDTH_64);

        if width == WIDTH_BOOL {
            return Expr::extract(self.select_byte(offset), 0, WIDTH_BOOL);
        }

        let n = (width / 8) as u64;
        let mut result: Option<ExprRef> = None;
        for i in 0..n {
            let byte_offset = if little_endian { i } else { n - i - 1 };
            let value = self.select_byte(Expr::binary(
                BinaryOp::Add,
                offset.clone(),
                Expr::constant64(byte_offset),
            ));
            result = Some(match result {
                None => value,
                Some(acc) => Expr::concat(value, acc),
            });
        }
        result.unwrap()
    }

    /// Reads a single byte at a 64-bit index.
    ///
    /// Walks the update history newest-first looking for a concrete match.
    /// Falls back to a select expression as soon as a symbolic index is
    /// encountered, because a later concrete entry may still be overridden by
    /// that symbolic write under some model.
    pub fn select_byte(self: &Rc<Self>, index: ExprRef) -> ExprRef {
        assert!(
            index.width() == WIDTH_64,
            "select_byte: invalid array index width: {}",
            index.width()
        );
        let mut upd = self.updates.clone();
        while let Some(u) = upd {
            let cond = Expr::binary(BinaryOp::Eq, index.clone(), u.index.clone());
            match cond.as_constant() {
                None => break, // symbolic index, stop
                Some((v, _)) => {
                    if v != 0 {
                        return u.value.clone();
                    }
                }
            }
            upd = u.next.clone();
        }
        Expr::select(self.clone(), index)
    }

    /// Writes a value at an offset and returns the new array snapshot.
    /// Boolean values occupy a single byte; wider values are split into 8-bit
    /// extracts in endianness order.
    pub fn store(self: &Rc<Self>, offset: ExprRef, value: ExprRef, little_endian: bool) -> ArrayRef {
        let mut other = (**self).clone();

        let offset = Expr::zext(offset, WIDTH_64);

        // A boolean is the only non-byte-sized write allowed.
        let width = value.width();
        assert!(width > 0, "store: invalid width");
        if width == WIDTH_BOOL {
            other.store_byte(offset, value);
            return Rc::new(other);
        }

        let n = (width / 8) as u64;
        for i in 0..n {
            let byte_offset = if little_endian { i } else { n - i - 1 };
            other.store_byte(
                Expr::binary(
                    BinaryOp::Add,
                    offset.clone(),
                    Expr::constant64(byte_offset),
                ),
                Expr::extract(value.clone(), (i * 8) as u32, WIDTH_8),
            );
        }
        Rc::new(other)
    }

    /// Writes a single byte at the head of the update chain.
    ///
    /// When the index is concrete, shadowed entries at the same index are
    /// elided from the tail up to (but never across) the first symbolic-index
    /// entry.
    pub fn store_byte(&mut self, index: ExprRef, value: ExprRef) {
        assert!(
            index.width() == WIDTH_64,
            "store_byte: invalid array index width: {}",
            index.width()
        );

        // A concrete index must land inside the array.
        if let Some((iv, _)) = index.as_constant() {
            assert!(
                iv < self.size as u64,
                "store_byte: index out of bounds: {} >= {}",
                iv,
                self.size
            );
        }

        let tail = self.updates.take();
        let tail = match index.as_constant() {
            None => tail,
            Some((iv, _)) => {
                // Collect the concrete prefix, dropping shadowed writes, and
                // keep everything at and below the symbolic barrier shared.
                let mut kept: Vec<(ExprRef, ExprRef)> = Vec::new();
                let mut cursor = tail;
                while let Some(u) = cursor.clone() {
                    match u.index.as_constant() {
                        None => break, // symbolic barrier
                        Some((uv, _)) => {
                            if uv != iv {
                                kept.push((u.index.clone(), u.value.clone()));
                            }
                            cursor = u.next.clone();
                        }
                    }
                }
                let mut rebuilt = cursor;
                for (i, v) in kept.into_iter().rev() {
                    rebuilt = Some(Rc::new(ArrayUpdate { index: i, value: v, next: rebuilt }));
                }
                rebuilt
            }
        };

        self.updates = Some(ArrayUpdate::new(index, value, tail));
    }

    /// Reports whether any byte of the array is symbolic: an unset byte, a
    /// symbolic index, or a symbolic value all count.
    pub fn is_symbolic(&self) -> bool {
        let mut concrete = vec![false; self.size as usize];
        let mut upd = self.updates.clone();
        while let Some(u) = upd {
            match u.index.as_constant() {
                None => return true, // symbolic index
                Some((iv, _)) => {
                    if u.value.is_constant() {
                        concrete[iv as usize] = true;
                    }
                }
            }
            upd = u.next.clone();
        }
        concrete.iter().any(|c| !c)
    }

    /// Returns a boolean expression stating whether the arrays hold equal
    /// bytes. Size mismatches are decided immediately; otherwise the result
    /// is a conjunction of byte-wise equalities, short-circuited to false as
    /// soon as any byte is proven unequal.
    pub fn equal(self: &Rc<Self>, other: &ArrayRef) -> ExprRef {
        if self.size != other.size {
            return Expr::bool_const(false);
        } else if self.size == 0 {
            return Expr::bool_const(true);
        }

        let mut cond: Option<ExprRef> = None;
        for i in 0..self.size {
            let index = Expr::constant64(i as u64);
            let x = self.select_byte(index.clone());
            let y = other.select_byte(index);

            let expr = Expr::binary(BinaryOp::Eq, x, y);
            if expr.is_false() {
                return Expr::bool_const(false);
            }

            cond = Some(match cond {
                None => expr,
                Some(acc) => Expr::binary(BinaryOp::And, acc, expr),
            });
        }
        cond.unwrap()
    }

    /// Complement of [`Array::equal`]: a disjunction of byte inequalities,
    /// short-circuited to true as soon as any byte is proven unequal.
    pub fn not_equal(self: &Rc<Self>, other: &ArrayRef) -> ExprRef {
        if self.size != other.size {
            return Expr::bool_const(true);
        } else if self.size == 0 {
            return Expr::bool_const(false);
        }

        let mut cond: Option<ExprRef> = None;
        for i in 0..self.size {
            let index = Expr::constant64(i as u64);
            let x = self.select_byte(index.clone());
            let y = other.select_byte(index);

            let expr = Expr::not(Expr::binary(BinaryOp::Eq, x, y));
            if expr.is_true() {
                return Expr::bool_const(true);
            }

            cond = Some(match cond {
                None => expr,
                Some(acc) => Expr::binary(BinaryOp::Or, acc, expr),
            });
        }
        cond.unwrap()
    }
}

impl fmt::Display for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.id != 0 {
            write!(f, "(array #{} {})", self.id, self.size)
        } else {
            write!(f, "(array {})", self.size)
        }
    }
}

/// Compares two arrays by id, then size, then update chain.
pub fn compare_arrays(a: &Array, b: &Array) -> Ordering {
    a.id
        .cmp(&b.id)
        .then_with(|| a.size.cmp(&b.size))
        .then_with(|| compare_updates(a.updates.as_ref(), b.updates.as_ref()))
}

/// Compares two update chains entry-wise; shorter chains sort first.
pub fn compare_updates(a: Option<&UpdateRef>, b: Option<&UpdateRef>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => crate::expr::compare_exprs(&a.index, &b.index)
            .then_with(|| crate::expr::compare_exprs(&a.value, &b.value))
            .then_with(|| compare_updates(a.next.as_ref(), b.next.as_ref())),
    }
}
