//! Strata Sub-Merge - Cross-Resolution Derivation
//!
//! Derives an expression's encoded state at one resolution directly from
//! the already-aggregated encoded states of its dependencies, without
//! replaying raw records.
//!
//! Source buffers are contiguous newest-first bucket arrays laid out at
//! the dependency's encoded width. A merge function receives the source
//! slice starting at the bucket being folded and extending to the end of
//! the array, so time shifts can reach older buckets.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::encoded::EncodedAccumulator;
use crate::expr::Expr;
use crate::params::{NoParams, Params};
use chrono::Duration;
use strata_common::utils::duration_nanos;
use strata_common::{Result, StrataError};

/// Folds one source bucket (`src`, at the dependency's width) into one
/// target bucket (`dst`, at the target expression's width).
pub type SubMerge =
    Box<dyn Fn(&mut [u8], &[u8], Duration, Option<&dyn Params>) -> Result<()> + Send + Sync>;

fn boxed<F>(f: F) -> SubMerge
where
    F: Fn(&mut [u8], &[u8], Duration, Option<&dyn Params>) -> Result<()> + Send + Sync + 'static,
{
    Box::new(f)
}

/// Build merge functions for `target`, one slot per dependency.
pub(crate) fn build(target: &Expr, deps: &[Expr]) -> Vec<Option<SubMerge>> {
    if deps.iter().any(|dep| dep == target) {
        return deps
            .iter()
            .map(|dep| (dep == target).then(|| direct(target.clone())))
            .collect();
    }

    match target {
        Expr::Constant(_) | Expr::Field(_) | Expr::Aggregate { .. } => {
            deps.iter().map(|_| None).collect()
        }
        Expr::Binary { left, right, .. } => {
            let left_width = left.encoded_width();
            build(left, deps)
                .into_iter()
                .zip(build(right, deps))
                .map(|(l, r)| split(l, left_width, r))
                .collect()
        }
        Expr::Unary { wrapped, .. } => build(wrapped, deps),
        Expr::Shift { wrapped, offset } => build(wrapped, deps)
            .into_iter()
            .zip(deps)
            .map(|(merger, dep)| merger.map(|m| shifted(m, *offset, dep.encoded_width())))
            .collect(),
        Expr::If { condition, wrapped } => build(wrapped, deps)
            .into_iter()
            .map(|merger| merger.map(|m| conditional(m, (**condition).clone())))
            .collect(),
    }
}

fn direct(target: Expr) -> SubMerge {
    boxed(move |dst, src, _resolution, _meta| target.merge_into(dst, src))
}

fn split(left: Option<SubMerge>, left_width: usize, right: Option<SubMerge>) -> Option<SubMerge> {
    if left.is_none() && right.is_none() {
        return None;
    }
    Some(boxed(move |dst, src, resolution, meta| {
        if dst.len() < left_width {
            return Err(StrataError::BufferTooShort {
                expected: left_width,
                actual: dst.len(),
            });
        }
        let (l, r) = dst.split_at_mut(left_width);
        if let Some(left) = &left {
            left(l, src, resolution, meta)?;
        }
        if let Some(right) = &right {
            right(r, src, resolution, meta)?;
        }
        Ok(())
    }))
}

fn shifted(merger: SubMerge, offset: Duration, source_width: usize) -> SubMerge {
    boxed(move |dst, src, resolution, meta| {
        let resolution_nanos = duration_nanos(resolution);
        if resolution_nanos <= 0 {
            return Err(StrataError::InvalidExpression(format!(
                "cannot shift by {} at non-positive resolution",
                offset
            )));
        }

        // Negative offsets look back in time, i.e. further into the newest-first array.
        let periods = duration_nanos(offset).saturating_neg() / resolution_nanos;
        if periods < 0 {
            return Ok(());
        }
        let start = match usize::try_from(periods)
            .ok()
            .and_then(|p| p.checked_mul(source_width))
        {
            Some(start) if start < src.len() => start,
            _ => return Ok(()),
        };
        merger(dst, &src[start..], resolution, meta)
    })
}

fn conditional(merger: SubMerge, condition: Expr) -> SubMerge {
    boxed(move |dst, src, resolution, meta| {
        let holds = condition
            .evaluate(meta.unwrap_or(&NoParams))
            .map_or(false, |v| v != 0.0);
        if holds {
            merger(dst, src, resolution, meta)
        } else {
            Ok(())
        }
    })
}

// =============================================================================
// Tests
// =============================================================================
