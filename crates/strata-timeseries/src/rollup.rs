//! Strata Rollup - Resolution Downsampling
//!
//! Derives an expression's encoded buckets at a coarse resolution from the
//! encoded buckets of its dependencies at a finer resolution, using the
//! expressions' sub-merge functions instead of replaying raw records.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::sequence::Sequence;
use chrono::{DateTime, Duration, Utc};
use strata_common::utils::{duration_nanos, from_nanos, to_nanos};
use strata_common::{Result, StrataError};
use strata_expr::{EncodedAccumulator, Expr, Params};

// =============================================================================
// Source
// =============================================================================

/// A dependency's contiguous newest-first bucket array.
#[derive(Debug, Clone, Copy)]
pub struct Source<'a> {
    pub expr: &'a Expr,
    pub buckets: &'a [u8],
}

impl<'a> Source<'a> {
    pub fn new(expr: &'a Expr, buckets: &'a [u8]) -> Self {
        Self { expr, buckets }
    }

    fn num_buckets(&self) -> Result<usize> {
        let width = self.expr.encoded_width();
        if width == 0 {
            return Ok(0);
        }
        if self.buckets.len() % width != 0 {
            return Err(StrataError::BufferTooShort {
                expected: (self.buckets.len() / width + 1) * width,
                actual: self.buckets.len(),
            });
        }
        Ok(self.buckets.len() / width)
    }
}

// =============================================================================
// Rollup
// =============================================================================

/// Encoded buckets of one expression, newest first.
#[derive(Debug, Clone, PartialEq)]
pub struct Rollup {
    pub start: DateTime<Utc>,
    pub resolution: Duration,
    pub width: usize,
    pub buckets: Vec<u8>,
}

impl Rollup {
    pub fn num_buckets(&self) -> usize {
        if self.width == 0 {
            0
        } else {
            self.buckets.len() / self.width
        }
    }

    /// Encoded state of bucket `index`.
    pub fn bucket(&self, index: usize) -> Option<&[u8]> {
        let from = index.checked_mul(self.width)?;
        self.buckets.get(from..from + self.width)
    }

    /// Decode every bucket's value into a sequence.
    pub fn to_sequence(&self, expr: &Expr) -> Result<Sequence> {
        to_sequence(expr, &self.buckets, self.start, self.num_buckets())
    }
}

/// Start of the interval of width `resolution` containing `ts`.
pub fn bucket_start(ts: DateTime<Utc>, resolution: Duration) -> DateTime<Utc> {
    let resolution = duration_nanos(resolution);
    if resolution <= 0 {
        return ts;
    }
    let nanos = to_nanos(ts);
    from_nanos(nanos - nanos.rem_euclid(resolution))
}

/// Build `periods` buckets of `target` at `target_resolution`.
///
/// `source_start` is the start of bucket 0 of every source array. Each
/// source bucket folds into the target bucket covering its start. Buckets
/// that fall beyond `periods` are dropped.
pub fn rollup(
    target: &Expr,
    sources: &[Source<'_>],
    source_start: DateTime<Utc>,
    source_resolution: Duration,
    target_resolution: Duration,
    periods: usize,
    meta: Option<&dyn Params>,
) -> Result<Rollup> {
    let source_nanos = duration_nanos(source_resolution);
    let target_nanos = duration_nanos(target_resolution);
    if source_nanos <= 0 || target_nanos < source_nanos || target_nanos % source_nanos != 0 {
        return Err(StrataError::Configuration(format!(
            "cannot roll up from {} to {}: target resolution must be a multiple of the source",
            source_resolution, target_resolution
        )));
    }

    let width = target.encoded_width();
    let start = bucket_start(source_start, target_resolution);
    let mut buckets = vec![0u8; width * periods];
    if width == 0 || periods == 0 {
        return Ok(Rollup {
            start,
            resolution: target_resolution,
            width,
            buckets,
        });
    }

    let deps: Vec<Expr> = sources.iter().map(|s| s.expr.clone()).collect();
    let mergers = target.sub_mergers(&deps);
    let start_nanos = to_nanos(start) as i128;
    let mut folded = 0usize;

    for (source, merger) in sources.iter().zip(&mergers) {
        let Some(merger) = merger else {
            continue;
        };
        let source_width = source.expr.encoded_width();
        let count = source.num_buckets()?;

        for i in (0..count).rev() {
            let bucket_nanos = to_nanos(source_start) as i128 - i as i128 * source_nanos as i128;
            let aligned = bucket_nanos - bucket_nanos.rem_euclid(target_nanos as i128);
            let index = (start_nanos - aligned) / target_nanos as i128;
            let Ok(index) = usize::try_from(index) else {
                continue;
            };
            if index >= periods {
                continue;
            }
            let dst = &mut buckets[index * width..(index + 1) * width];
            merger(dst, &source.buckets[i * source_width..], source_resolution, meta)?;
            folded += 1;
        }
    }

    tracing::debug!(
        expr = %target,
        sources = sources.len(),
        folded,
        periods,
        "rolled up buckets"
    );

    Ok(Rollup {
        start,
        resolution: target_resolution,
        width,
        buckets,
    })
}

/// Decode `count` newest-first encoded buckets of `expr` into a sequence.
pub fn to_sequence(
    expr: &Expr,
    buckets: &[u8],
    start: DateTime<Utc>,
    count: usize,
) -> Result<Sequence> {
    let width = expr.encoded_width();
    let mut values = Vec::with_capacity(count);
    for i in 0..count {
        let from = i * width;
        let region = buckets.get(from..).ok_or(StrataError::BufferTooShort {
            expected: from + width,
            actual: buckets.len(),
        })?;
        values.push(expr.get(region)?.0);
    }
    Ok(Sequence::from_values(start, &values))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashMap;

    fn record(a: f64) -> HashMap<&'static str, f64> {
        [("a", a)].into_iter().collect()
    }

    fn minute_buckets(expr: &Expr, values: &[f64]) -> Vec<u8> {
        let width = expr.encoded_width();
        let mut buf = vec![0u8; width * values.len()];
        for (i, v) in values.iter().enumerate() {
            expr.update(&mut buf[i * width..], &record(*v), None).unwrap();
        }
        buf
    }

    #[test]
    fn test_bucket_start() {
        let ts = Utc.with_ymd_and_hms(2020, 1, 1, 10, 42, 7).unwrap();
        assert_eq!(
            bucket_start(ts, Duration::hours(1)),
            Utc.with_ymd_and_hms(2020, 1, 1, 10, 0, 0).unwrap()
        );
        assert_eq!(
            bucket_start(ts, Duration::minutes(5)),
            Utc.with_ymd_and_hms(2020, 1, 1, 10, 40, 0).unwrap()
        );
    }

    #[test]
    fn test_rollup_sum() {
        let sum = Expr::sum(Expr::field("a"));
        // 10:04 back to 09:58, one value per minute.
        let start = Utc.with_ymd_and_hms(2020, 1, 1, 10, 4, 0).unwrap();
        let fine = minute_buckets(&sum, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);

        let coarse = rollup(
            &sum,
            &[Source::new(&sum, &fine)],
            start,
            Duration::minutes(1),
            Duration::minutes(5),
            3,
            None,
        )
        .unwrap();

        assert_eq!(coarse.start, Utc.with_ymd_and_hms(2020, 1, 1, 10, 0, 0).unwrap());
        assert_eq!(coarse.num_buckets(), 3);
        let seq = coarse.to_sequence(&sum).unwrap();
        assert_eq!(seq.values().collect::<Vec<_>>(), vec![15.0, 13.0, 0.0]);
    }

    #[test]
    fn test_rollup_drops_beyond_periods() {
        let sum = Expr::sum(Expr::field("a"));
        let start = Utc.with_ymd_and_hms(2020, 1, 1, 10, 1, 0).unwrap();
        let fine = minute_buckets(&sum, &[1.0, 1.0, 1.0, 1.0]);

        let coarse = rollup(
            &sum,
            &[Source::new(&sum, &fine)],
            start,
            Duration::minutes(1),
            Duration::minutes(2),
            1,
            None,
        )
        .unwrap();
        assert_eq!(coarse.num_buckets(), 1);
        assert_eq!(sum.get(coarse.bucket(0).unwrap()).unwrap(), (2.0, true));
        assert!(coarse.bucket(1).is_none());
    }

    #[test]
    fn test_rollup_rejects_incompatible_resolution() {
        let sum = Expr::sum(Expr::field("a"));
        let start = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        for target in [Duration::seconds(90), Duration::seconds(30)] {
            let err = rollup(&sum, &[], start, Duration::minutes(1), target, 1, None).unwrap_err();
            assert!(matches!(err, StrataError::Configuration(_)));
        }
    }

    #[test]
    fn test_rollup_rejects_ragged_source() {
        let sum = Expr::sum(Expr::field("a"));
        let start = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let ragged = vec![0u8; sum.encoded_width() + 3];
        let err = rollup(
            &sum,
            &[Source::new(&sum, &ragged)],
            start,
            Duration::minutes(1),
            Duration::minutes(2),
            1,
            None,
        )
        .unwrap_err();
        assert!(err.is_decode_error());
    }

    #[test]
    fn test_to_sequence_short_buffer() {
        let sum = Expr::sum(Expr::field("a"));
        let start = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let buf = vec![0u8; sum.encoded_width()];
        assert!(to_sequence(&sum, &buf, start, 2).is_err());
        let seq = to_sequence(&sum, &buf, start, 1).unwrap();
        assert_eq!(seq.num_buckets(), 1);
        assert_eq!(seq.value_at(0), 0.0);
    }
}
