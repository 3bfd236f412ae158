//! Strata Time Series - Sequence Storage Format
//!
//! Binary bucket sequences and the table-level machinery that produces
//! them from encoded accumulator rows.
//!
//! Key Features:
//! - Fixed-layout big-endian sequences with implicit zero fill
//! - Retention-bounded append of adjacent or overlapping sequences
//! - Rollups from finer to coarser resolutions via sub-merge functions
//! - Compiled table schemas with packed row layout
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

pub mod sequence;
pub mod rollup;
pub mod table;

pub use sequence::{Bucket, Sequence};
pub use rollup::{bucket_start, rollup, to_sequence, Rollup, Source};
pub use table::{Field, Table};
