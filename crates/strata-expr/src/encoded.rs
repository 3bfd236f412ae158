//! Strata Encoded Accumulator - Buffer-Resident Evaluation
//!
//! The same arithmetic as live accumulators, but with all state held in a
//! caller-owned fixed-width byte region so that many accumulator states can
//! be packed contiguously into storage rows. The expression itself is
//! stateless; it only interprets and mutates the buffer it is given.
//!
//! Region layout follows the tree: an aggregate stores its own state
//! followed by its wrapped expression's region, a binary expression stores
//! its left region followed by its right region, and constants and fields
//! occupy no bytes.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::expr::Expr;
use crate::params::{NoParams, Params};
use crate::state::AggregateState;
use crate::submerge::{self, SubMerge};
use chrono::Duration;
use strata_common::{Result, StrataError};

// =============================================================================
// Update Result
// =============================================================================

/// Outcome of folding one record into an encoded region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Updated {
    /// Value before the update, `None` if the region had never been written.
    pub prior: Option<f64>,
    /// Value after the update.
    pub value: f64,
    /// Whether any state in the region changed.
    pub updated: bool,
}

impl Updated {
    /// Change in value caused by the update, for incremental indexing.
    pub fn delta(&self) -> f64 {
        self.value - self.prior.unwrap_or(0.0)
    }
}

// =============================================================================
// Encoded Accumulator
// =============================================================================

/// Accumulator operations over externally-owned byte regions.
///
/// Every buffer argument must hold at least `encoded_width()` bytes; only
/// that prefix is read or written. A single region must not be mutated by
/// more than one caller at a time.
pub trait EncodedAccumulator {
    /// Bytes of state this expression occupies.
    fn encoded_width(&self) -> usize;

    /// Fold one record into `buf`, returning the value before and after.
    fn update(&self, buf: &mut [u8], params: &dyn Params, meta: Option<&dyn Params>)
        -> Result<Updated>;

    /// Decode the current value; `valid` is false when nothing was ever written.
    fn get(&self, buf: &[u8]) -> Result<(f64, bool)>;

    /// Combine two encoded states into `dst`.
    fn merge(&self, dst: &mut [u8], x: &[u8], y: &[u8]) -> Result<()>;

    /// Combine `src` into `dst` in place.
    fn merge_into(&self, dst: &mut [u8], src: &[u8]) -> Result<()>;

    /// Net time offset of the expression.
    fn shift(&self) -> Duration;

    /// Merge functions deriving this expression's state from `deps`' states,
    /// aligned with `deps`; `None` where a dependency is not consumed.
    fn sub_mergers(&self, deps: &[Expr]) -> Vec<Option<SubMerge>>;
}

impl EncodedAccumulator for Expr {
    fn encoded_width(&self) -> usize {
        match self {
            Expr::Constant(_) | Expr::Field(_) => 0,
            Expr::Aggregate { op, wrapped } => AggregateState::width(*op) + wrapped.encoded_width(),
            Expr::Binary { left, right, .. } => left.encoded_width() + right.encoded_width(),
            Expr::Unary { wrapped, .. } | Expr::Shift { wrapped, .. } | Expr::If { wrapped, .. } => {
                wrapped.encoded_width()
            }
        }
    }

    fn update(
        &self,
        buf: &mut [u8],
        params: &dyn Params,
        meta: Option<&dyn Params>,
    ) -> Result<Updated> {
        let width = self.check_width(buf.len())?;
        let region = &mut buf[..width];
        let (prior, valid) = self.read(region);
        let (value, updated) = self.write(region, params, meta);
        Ok(Updated {
            prior: valid.then_some(prior),
            value,
            updated,
        })
    }

    fn get(&self, buf: &[u8]) -> Result<(f64, bool)> {
        let width = self.check_width(buf.len())?;
        Ok(self.read(&buf[..width]))
    }

    fn merge(&self, dst: &mut [u8], x: &[u8], y: &[u8]) -> Result<()> {
        let width = self.check_width(dst.len())?;
        self.check_width(x.len())?;
        self.check_width(y.len())?;
        dst[..width].copy_from_slice(&x[..width]);
        self.fold(&mut dst[..width], &y[..width]);
        Ok(())
    }

    fn merge_into(&self, dst: &mut [u8], src: &[u8]) -> Result<()> {
        let width = self.check_width(dst.len())?;
        self.check_width(src.len())?;
        self.fold(&mut dst[..width], &src[..width]);
        Ok(())
    }

    fn shift(&self) -> Duration {
        match self {
            Expr::Constant(_) | Expr::Field(_) => Duration::zero(),
            Expr::Shift { wrapped, offset } => *offset + wrapped.shift(),
            Expr::Binary { left, right, .. } => left.shift().min(right.shift()),
            Expr::Aggregate { wrapped, .. }
            | Expr::Unary { wrapped, .. }
            | Expr::If { wrapped, .. } => wrapped.shift(),
        }
    }

    fn sub_mergers(&self, deps: &[Expr]) -> Vec<Option<SubMerge>> {
        submerge::build(self, deps)
    }
}

// =============================================================================
// Region Operations
// =============================================================================

// The helpers below take regions of exactly `encoded_width()` bytes.
impl Expr {
    fn check_width(&self, len: usize) -> Result<usize> {
        let width = self.encoded_width();
        if len < width {
            return Err(StrataError::BufferTooShort {
                expected: width,
                actual: len,
            });
        }
        Ok(width)
    }

    // Only aggregate state makes a region valid; constants and fields are neutral.
    fn read(&self, region: &[u8]) -> (f64, bool) {
        match self {
            Expr::Constant(value) => (*value, false),
            Expr::Field(_) => (0.0, false),
            Expr::Aggregate { op, .. } => {
                let state = AggregateState::decode(*op, region);
                (state.value(*op), state.set)
            }
            Expr::Binary { op, left, right } => {
                let (l, r) = region.split_at(left.encoded_width());
                let (left_value, left_valid) = left.read(l);
                let (right_value, right_valid) = right.read(r);
                (op.apply(left_value, right_value), left_valid || right_valid)
            }
            Expr::Unary { op, wrapped } => {
                let (value, valid) = wrapped.read(region);
                (op.apply(value), valid)
            }
            Expr::Shift { wrapped, .. } | Expr::If { wrapped, .. } => wrapped.read(region),
        }
    }

    fn write(
        &self,
        region: &mut [u8],
        params: &dyn Params,
        meta: Option<&dyn Params>,
    ) -> (f64, bool) {
        match self {
            Expr::Constant(value) => (*value, true),
            Expr::Field(name) => (params.get(name).unwrap_or(0.0), true),
            Expr::Aggregate { op, wrapped } => {
                let (own, rest) = region.split_at_mut(AggregateState::width(*op));
                let (value, updated) = wrapped.write(rest, params, meta);
                let mut state = AggregateState::decode(*op, own);
                if updated {
                    state.fold(*op, value);
                    state.encode(*op, own);
                }
                (state.value(*op), updated)
            }
            Expr::Binary { op, left, right } => {
                let (l, r) = region.split_at_mut(left.encoded_width());
                let (left_value, left_updated) = left.write(l, params, meta);
                let (right_value, right_updated) = right.write(r, params, meta);
                (op.apply(left_value, right_value), left_updated || right_updated)
            }
            Expr::Unary { op, wrapped } => {
                let (value, updated) = wrapped.write(region, params, meta);
                (op.apply(value), updated)
            }
            Expr::Shift { wrapped, .. } => wrapped.write(region, params, meta),
            Expr::If { condition, wrapped } => {
                let holds = condition
                    .evaluate(meta.unwrap_or(&NoParams))
                    .map_or(false, |v| v != 0.0);
                if holds {
                    wrapped.write(region, params, meta)
                } else {
                    (wrapped.read(region).0, false)
                }
            }
        }
    }

    fn fold(&self, dst: &mut [u8], src: &[u8]) {
        match self {
            Expr::Constant(_) | Expr::Field(_) => {}
            Expr::Aggregate { op, wrapped } => {
                let width = AggregateState::width(*op);
                let (own, rest) = dst.split_at_mut(width);
                let mut state = AggregateState::decode(*op, own);
                let other = AggregateState::decode(*op, src);
                if other.set {
                    state.combine(*op, &other);
                    state.encode(*op, own);
                }
                wrapped.fold(rest, &src[width..]);
            }
            Expr::Binary { left, right, .. } => {
                let width = left.encoded_width();
                let (l, r) = dst.split_at_mut(width);
                left.fold(l, &src[..width]);
                right.fold(r, &src[width..]);
            }
            Expr::Unary { wrapped, .. } | Expr::Shift { wrapped, .. } | Expr::If { wrapped, .. } => {
                wrapped.fold(dst, src)
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
