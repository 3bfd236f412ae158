//! Strata Expr - Expression Tree
//!
//! Immutable expression trees describing computations over named record
//! fields. Every node exposes its field dependencies and a canonical
//! textual form; accumulators (live and encoded) are built from the tree.
//!
//! Key Features:
//! - Closed variant set: constants, fields, aggregates, arithmetic,
//!   comparisons, logarithms, time shifts and conditionals
//! - First-seen, duplicate-free field dependency lists
//! - Canonical text that re-parses to an equal tree
//! - Serde/bincode encoding for shipping expressions between partitions
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::params::Params;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use strata_common::utils::{format_duration, serde_duration_nanos};
use strata_common::{Result, StrataError};

/// Shared zero constant, the default for absent or unstarted dependencies.
pub static ZERO: Expr = Expr::Constant(0.0);

// =============================================================================
// Operators
// =============================================================================

/// Aggregation applied across updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregateOp {
    Sum,
    Count,
    Avg,
    Min,
    Max,
}

impl AggregateOp {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sum => "SUM",
            Self::Count => "COUNT",
            Self::Avg => "AVG",
            Self::Min => "MIN",
            Self::Max => "MAX",
        }
    }
}

/// Binary combinator applied to the values of two sub-expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    Lte,
    Eq,
    Neq,
    Gte,
    Gt,
    And,
    Or,
}

impl BinaryOp {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Add => "ADD",
            Self::Sub => "SUB",
            Self::Mul => "MUL",
            Self::Div => "DIV",
            Self::Lt => "LT",
            Self::Lte => "LTE",
            Self::Eq => "EQ",
            Self::Neq => "NEQ",
            Self::Gte => "GTE",
            Self::Gt => "GT",
            Self::And => "AND",
            Self::Or => "OR",
        }
    }

    /// Combine two values. Division by zero yields zero.
    pub fn apply(&self, left: f64, right: f64) -> f64 {
        let truth = |b: bool| if b { 1.0 } else { 0.0 };
        match self {
            Self::Add => left + right,
            Self::Sub => left - right,
            Self::Mul => left * right,
            Self::Div => {
                if right == 0.0 {
                    0.0
                } else {
                    left / right
                }
            }
            Self::Lt => truth(left < right),
            Self::Lte => truth(left <= right),
            Self::Eq => truth(left == right),
            Self::Neq => truth(left != right),
            Self::Gte => truth(left >= right),
            Self::Gt => truth(left > right),
            Self::And => truth(left != 0.0 && right != 0.0),
            Self::Or => truth(left != 0.0 || right != 0.0),
        }
    }
}

/// Unary math function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Ln,
    Log2,
    Log10,
}

impl UnaryOp {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ln => "LN",
            Self::Log2 => "LOG2",
            Self::Log10 => "LOG10",
        }
    }

    /// Apply the function. Non-positive input yields zero.
    pub fn apply(&self, value: f64) -> f64 {
        if value <= 0.0 {
            return 0.0;
        }
        match self {
            Self::Ln => value.ln(),
            Self::Log2 => value.log2(),
            Self::Log10 => value.log10(),
        }
    }
}

// =============================================================================
// Expression
// =============================================================================

/// An immutable expression tree node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Constant(f64),
    Field(String),
    Aggregate {
        op: AggregateOp,
        wrapped: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        wrapped: Box<Expr>,
    },
    Shift {
        wrapped: Box<Expr>,
        #[serde(with = "serde_duration_nanos")]
        offset: Duration,
    },
    If {
        condition: Box<Expr>,
        wrapped: Box<Expr>,
    },
}

impl Default for Expr {
    fn default() -> Self {
        ZERO.clone()
    }
}

impl Expr {
    pub fn constant(value: f64) -> Self {
        Expr::Constant(value)
    }

    pub fn field(name: impl Into<String>) -> Self {
        Expr::Field(name.into())
    }

    pub fn aggregate(op: AggregateOp, wrapped: Expr) -> Self {
        Expr::Aggregate {
            op,
            wrapped: Box::new(wrapped),
        }
    }

    pub fn sum(wrapped: Expr) -> Self {
        Self::aggregate(AggregateOp::Sum, wrapped)
    }

    pub fn count(wrapped: Expr) -> Self {
        Self::aggregate(AggregateOp::Count, wrapped)
    }

    pub fn avg(wrapped: Expr) -> Self {
        Self::aggregate(AggregateOp::Avg, wrapped)
    }

    pub fn min(wrapped: Expr) -> Self {
        Self::aggregate(AggregateOp::Min, wrapped)
    }

    pub fn max(wrapped: Expr) -> Self {
        Self::aggregate(AggregateOp::Max, wrapped)
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn add(left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOp::Add, left, right)
    }

    pub fn sub(left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOp::Sub, left, right)
    }

    pub fn mul(left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOp::Mul, left, right)
    }

    pub fn div(left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOp::Div, left, right)
    }

    pub fn unary(op: UnaryOp, wrapped: Expr) -> Self {
        Expr::Unary {
            op,
            wrapped: Box::new(wrapped),
        }
    }

    pub fn ln(wrapped: Expr) -> Self {
        Self::unary(UnaryOp::Ln, wrapped)
    }

    pub fn log2(wrapped: Expr) -> Self {
        Self::unary(UnaryOp::Log2, wrapped)
    }

    pub fn log10(wrapped: Expr) -> Self {
        Self::unary(UnaryOp::Log10, wrapped)
    }

    /// Value of `wrapped` as of `offset` from the bucket being computed.
    pub fn shifted(wrapped: Expr, offset: Duration) -> Self {
        Expr::Shift {
            wrapped: Box::new(wrapped),
            offset,
        }
    }

    /// Apply updates to `wrapped` only when `condition` evaluates non-zero.
    pub fn if_then(condition: Expr, wrapped: Expr) -> Self {
        Expr::If {
            condition: Box::new(condition),
            wrapped: Box::new(wrapped),
        }
    }

    /// Field names this expression reads, in first-seen order without duplicates.
    ///
    /// `If` conditions read record metadata, not params, so their fields are not listed.
    pub fn depends_on(&self) -> Vec<String> {
        let mut fields = Vec::new();
        self.collect_fields(&mut fields);
        fields
    }

    fn collect_fields(&self, fields: &mut Vec<String>) {
        match self {
            Expr::Constant(_) => {}
            Expr::Field(name) => {
                if !fields.iter().any(|f| f == name) {
                    fields.push(name.clone());
                }
            }
            Expr::Aggregate { wrapped, .. }
            | Expr::Unary { wrapped, .. }
            | Expr::Shift { wrapped, .. }
            | Expr::If { wrapped, .. } => wrapped.collect_fields(fields),
            Expr::Binary { left, right, .. } => {
                left.collect_fields(fields);
                right.collect_fields(fields);
            }
        }
    }

    /// True when the value never changes regardless of updates.
    pub fn is_constant(&self) -> bool {
        match self {
            Expr::Constant(_) => true,
            Expr::Field(_) | Expr::Aggregate { .. } => false,
            Expr::Unary { wrapped, .. } | Expr::Shift { wrapped, .. } => wrapped.is_constant(),
            Expr::If { wrapped, .. } => wrapped.is_constant(),
            Expr::Binary { left, right, .. } => left.is_constant() && right.is_constant(),
        }
    }

    /// True when the expression holds no encoded state (width zero).
    pub fn is_stateless(&self) -> bool {
        match self {
            Expr::Constant(_) | Expr::Field(_) => true,
            Expr::Aggregate { .. } => false,
            Expr::Unary { wrapped, .. } | Expr::Shift { wrapped, .. } => wrapped.is_stateless(),
            Expr::If { wrapped, .. } => wrapped.is_stateless(),
            Expr::Binary { left, right, .. } => left.is_stateless() && right.is_stateless(),
        }
    }

    /// Check that the expression can be stored in encoded form.
    ///
    /// Fields must be enclosed by an aggregate, aggregates may not nest
    /// directly, and `If` conditions must be stateless.
    pub fn validate(&self) -> Result<()> {
        self.validate_within(false)
    }

    fn validate_within(&self, in_aggregate: bool) -> Result<()> {
        match self {
            Expr::Constant(_) => Ok(()),
            Expr::Field(name) => {
                if in_aggregate {
                    Ok(())
                } else {
                    Err(StrataError::InvalidExpression(format!(
                        "field \"{}\" must be wrapped in an aggregate",
                        name
                    )))
                }
            }
            Expr::Aggregate { op, wrapped } => {
                if in_aggregate {
                    return Err(StrataError::InvalidExpression(format!(
                        "{} cannot be nested inside another aggregate",
                        op.name()
                    )));
                }
                wrapped.validate_within(true)
            }
            Expr::Binary { left, right, .. } => {
                left.validate_within(in_aggregate)?;
                right.validate_within(in_aggregate)
            }
            Expr::Unary { wrapped, .. } | Expr::Shift { wrapped, .. } => {
                wrapped.validate_within(in_aggregate)
            }
            Expr::If { condition, wrapped } => {
                if !condition.is_stateless() {
                    return Err(StrataError::InvalidExpression(format!(
                        "IF condition {} must not contain aggregates",
                        condition
                    )));
                }
                wrapped.validate_within(in_aggregate)
            }
        }
    }

    /// Evaluate a stateless expression directly against a record.
    ///
    /// Returns `None` for expressions that hold aggregate state.
    pub fn evaluate(&self, params: &dyn Params) -> Option<f64> {
        match self {
            Expr::Constant(value) => Some(*value),
            Expr::Field(name) => Some(params.get(name).unwrap_or(0.0)),
            Expr::Aggregate { .. } => None,
            Expr::Binary { op, left, right } => {
                Some(op.apply(left.evaluate(params)?, right.evaluate(params)?))
            }
            Expr::Unary { op, wrapped } => Some(op.apply(wrapped.evaluate(params)?)),
            Expr::Shift { wrapped, .. } => wrapped.evaluate(params),
            Expr::If { condition, wrapped } => {
                if condition.evaluate(params)? != 0.0 {
                    wrapped.evaluate(params)
                } else {
                    Some(0.0)
                }
            }
        }
    }

    /// Encode for transport between partitions.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| StrataError::Serialization(e.to_string()))
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        bincode::deserialize(data).map_err(|e| StrataError::Serialization(e.to_string()))
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Constant(value) => write!(f, "{}", value),
            Expr::Field(name) => write!(f, "{:?}", name),
            Expr::Aggregate { op, wrapped } => write!(f, "{}({})", op.name(), wrapped),
            Expr::Binary { op, left, right } => {
                write!(f, "{}({}, {})", op.name(), left, right)
            }
            Expr::Unary { op, wrapped } => write!(f, "{}({})", op.name(), wrapped),
            Expr::Shift { wrapped, offset } => {
                write!(f, "SHIFT({}, \"{}\")", wrapped, format_duration(*offset))
            }
            Expr::If { condition, wrapped } => write!(f, "IF({}, {})", condition, wrapped),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
