//! Element-wise reduction operators for all-reduce.
//!
//! Operators combine two `i64` words at a time and must be commutative and
//! associative so that the substrate may fold contributions in any order.

/// Marker produced by [`AgreeOp`] when the contributions for a field differ.
///
/// Agreement vectors are built from non-negative counters, identifiers and
/// small enum codes, so `i64::MIN` never occurs as a genuine field value.
pub const DISAGREE: i64 = i64::MIN;

/// A commutative, associative element-wise reduction operator.
pub trait ReduceOp: Send + Sync {
    /// Short name used in log output.
    fn name(&self) -> &'static str;

    /// Combines two contributions for the same vector element.
    fn combine(&self, a: i64, b: i64) -> i64;

    /// Folds `other` into `acc` element by element.
    fn fold_into(&self, acc: &mut [i64], other: &[i64]) {
        for (a, b) in acc.iter_mut().zip(other) {
            *a = self.combine(*a, *b);
        }
    }
}

/// Yields the common value when every rank contributed the same value for a
/// field, and [`DISAGREE`] otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct AgreeOp;

impl ReduceOp for AgreeOp {
    fn name(&self) -> &'static str {
        "agree"
    }

    fn combine(&self, a: i64, b: i64) -> i64 {
        if a == b {
            a
        } else {
            DISAGREE
        }
    }
}

/// Numeric minimum.
#[derive(Debug, Clone, Copy, Default)]
pub struct MinOp;

impl ReduceOp for MinOp {
    fn name(&self) -> &'static str {
        "min"
    }

    fn combine(&self, a: i64, b: i64) -> i64 {
        a.min(b)
    }
}
