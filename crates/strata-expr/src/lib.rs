//! Strata Expr - Expression and Accumulator Engine
//!
//! Declarative aggregate expressions over record fields, evaluated either
//! with in-memory accumulators or against fixed-width encoded state that
//! lives inside storage rows.
//!
//! Key Features:
//! - Expression tree with aggregates, arithmetic, comparisons, logarithms,
//!   time shifts and conditionals
//! - Live accumulators for one-off evaluation
//! - Encoded accumulators with update, get, merge and time shift
//! - Sub-merge functions for deriving coarser resolutions from finer ones
//! - Function-call text syntax with positioned parse errors
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

pub mod params;
pub mod expr;
mod state;
pub mod accumulator;
pub mod encoded;
pub mod submerge;
pub mod parser;

pub use params::{FieldValue, NoParams, Params, Record};
pub use expr::{AggregateOp, BinaryOp, Expr, UnaryOp, ZERO};
pub use state::AggregateState;
pub use accumulator::Accumulator;
pub use encoded::{EncodedAccumulator, Updated};
pub use submerge::SubMerge;
pub use parser::parse;
