//! Strata Accumulator - Live Evaluation
//!
//! Memory-resident accumulators bound to an expression. Each accumulator
//! owns fresh state and consumes one record at a time.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::expr::{AggregateOp, BinaryOp, Expr, UnaryOp};
use crate::params::{NoParams, Params};
use crate::state::AggregateState;

// =============================================================================
// Accumulator
// =============================================================================

/// Live accumulator state for one expression instance.
#[derive(Debug, Clone, PartialEq)]
pub enum Accumulator {
    Constant(f64),
    Field {
        name: String,
        value: f64,
    },
    Aggregate {
        op: AggregateOp,
        state: AggregateState,
        wrapped: Box<Accumulator>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Accumulator>,
        right: Box<Accumulator>,
    },
    Unary {
        op: UnaryOp,
        wrapped: Box<Accumulator>,
    },
    If {
        condition: Expr,
        wrapped: Box<Accumulator>,
    },
}

impl Accumulator {
    /// Fold one record into the accumulator without metadata.
    pub fn update(&mut self, params: &dyn Params) {
        self.update_with_meta(params, None);
    }

    /// Fold one record; `IF` conditions are evaluated against `meta` only.
    pub fn update_with_meta(&mut self, params: &dyn Params, meta: Option<&dyn Params>) {
        match self {
            Accumulator::Constant(_) => {}
            Accumulator::Field { name, value } => {
                *value = params.get(name).unwrap_or(0.0);
            }
            Accumulator::Aggregate { op, state, wrapped } => {
                wrapped.update_with_meta(params, meta);
                state.fold(*op, wrapped.get());
            }
            Accumulator::Binary { left, right, .. } => {
                left.update_with_meta(params, meta);
                right.update_with_meta(params, meta);
            }
            Accumulator::Unary { wrapped, .. } => wrapped.update_with_meta(params, meta),
            Accumulator::If { condition, wrapped } => {
                let holds = condition
                    .evaluate(meta.unwrap_or(&NoParams))
                    .map_or(false, |v| v != 0.0);
                if holds {
                    wrapped.update_with_meta(params, meta);
                }
            }
        }
    }

    /// Current value.
    pub fn get(&self) -> f64 {
        match self {
            Accumulator::Constant(value) => *value,
            Accumulator::Field { value, .. } => *value,
            Accumulator::Aggregate { op, state, .. } => state.value(*op),
            Accumulator::Binary { op, left, right } => op.apply(left.get(), right.get()),
            Accumulator::Unary { op, wrapped } => op.apply(wrapped.get()),
            Accumulator::If { wrapped, .. } => wrapped.get(),
        }
    }
}

impl Expr {
    /// Build a fresh live accumulator for this expression.
    pub fn accumulator(&self) -> Accumulator {
        match self {
            Expr::Constant(value) => Accumulator::Constant(*value),
            Expr::Field(name) => Accumulator::Field {
                name: name.clone(),
                value: 0.0,
            },
            Expr::Aggregate { op, wrapped } => Accumulator::Aggregate {
                op: *op,
                state: AggregateState::default(),
                wrapped: Box::new(wrapped.accumulator()),
            },
            Expr::Binary { op, left, right } => Accumulator::Binary {
                op: *op,
                left: Box::new(left.accumulator()),
                right: Box::new(right.accumulator()),
            },
            Expr::Unary { op, wrapped } => Accumulator::Unary {
                op: *op,
                wrapped: Box::new(wrapped.accumulator()),
            },
            // Time offsets are applied by the storage layer; live values pass through.
            Expr::Shift { wrapped, .. } => wrapped.accumulator(),
            Expr::If { condition, wrapped } => Accumulator::If {
                condition: (**condition).clone(),
                wrapped: Box::new(wrapped.accumulator()),
            },
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn params(pairs: &[(&'static str, f64)]) -> HashMap<&'static str, f64> {
        pairs.iter().copied().collect()
    }

    fn assert_close(expected: f64, actual: f64) {
        assert!(
            (expected - actual).abs() < 1e-9,
            "expected {}, got {}",
            expected,
            actual
        );
    }

    #[test]
    fn test_combined() {
        let e = Expr::avg(Expr::sub(
            Expr::add(
                Expr::div(Expr::field("a"), Expr::field("b")),
                Expr::constant(1.0),
            ),
            Expr::constant(0.5),
        ));

        let mut acc = e.accumulator();
        acc.update(&params(&[("a", 8.8), ("b", 4.4)]));
        assert_close(2.5, acc.get());
        acc.update(&params(&[("a", 20.0), ("b", 5.0)]));
        assert_close(3.5, acc.get());
        assert_close(3.5, acc.get());
    }

    #[test]
    fn test_aggregates() {
        let records = [params(&[("a", 3.0)]), params(&[("a", -2.0)]), params(&[("a", 5.0)])];

        for (e, expected) in [
            (Expr::sum(Expr::field("a")), 6.0),
            (Expr::count(Expr::field("a")), 3.0),
            (Expr::avg(Expr::field("a")), 2.0),
            (Expr::min(Expr::field("a")), -2.0),
            (Expr::max(Expr::field("a")), 5.0),
        ] {
            let mut acc = e.accumulator();
            for record in &records {
                acc.update(record);
            }
            assert_close(expected, acc.get());
        }
    }

    #[test]
    fn test_constant_and_missing_field() {
        let mut constant = Expr::constant(7.0).accumulator();
        constant.update(&params(&[("a", 1.0)]));
        assert_eq!(constant.get(), 7.0);

        let mut sum = Expr::sum(Expr::field("missing")).accumulator();
        sum.update(&params(&[("a", 1.0)]));
        assert_eq!(sum.get(), 0.0);
    }

    #[test]
    fn test_conditional() {
        let e = Expr::if_then(
            Expr::binary(BinaryOp::Gt, Expr::field("weight"), Expr::constant(2.0)),
            Expr::sum(Expr::field("a")),
        );
        let mut acc = e.accumulator();
        for (a, weight) in [(1.0, 1.0), (3.0, 3.0), (2.0, 2.0), (4.0, 5.0)] {
            let meta = params(&[("weight", weight)]);
            acc.update_with_meta(&params(&[("a", a)]), Some(&meta));
        }
        assert_eq!(acc.get(), 7.0);

        // Conditions never read the record itself.
        acc.update(&params(&[("a", 100.0), ("weight", 9.0)]));
        assert_eq!(acc.get(), 7.0);
    }

    #[test]
    fn test_fresh_state_per_accumulator() {
        let e = Expr::sum(Expr::field("a"));
        let mut first = e.accumulator();
        first.update(&params(&[("a", 2.0)]));
        let second = e.accumulator();
        assert_eq!(first.get(), 2.0);
        assert_eq!(second.get(), 0.0);
    }
}
