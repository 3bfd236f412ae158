//! Strata Sequence - Binary Bucket Series
//!
//! A sequence is an immutable byte buffer holding a descending-time series
//! of doubles at a fixed resolution. The resolution itself is not stored;
//! callers supply it from the table schema.
//!
//! Layout: `[start: u64 BE nanoseconds][value: f64 BE]*`, bucket 0 being the
//! most recent interval. The empty buffer is the canonical empty sequence.
//! Bucket positions past the encoded length read as `0.0`.
//!
//! Key Features:
//! - Point and time-indexed lookup with implicit zero fill
//! - Non-mutating append enforcing a retention floor
//! - Construction from a newest-first chain of buckets with gap filling
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use bytes::{Buf, BufMut, Bytes, BytesMut};
use chrono::{DateTime, Duration, Utc};
use strata_common::utils::{duration_nanos, from_nanos, to_nanos};
use strata_common::{Result, StrataError};

// =============================================================================
// Constants
// =============================================================================

pub const HEADER_SIZE: usize = 8;
pub const BUCKET_SIZE: usize = 8;

// =============================================================================
// Bucket
// =============================================================================

/// One interval's value, used when building a sequence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bucket {
    pub start: DateTime<Utc>,
    pub value: f64,
}

impl Bucket {
    pub fn new(start: DateTime<Utc>, value: f64) -> Self {
        Self { start, value }
    }
}

// =============================================================================
// Sequence
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Sequence {
    data: Bytes,
}

impl Sequence {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Wrap an encoded buffer, rejecting lengths that are not `8 + 8n`.
    pub fn from_bytes(data: impl Into<Bytes>) -> Result<Self> {
        let data = data.into();
        if data.len() % BUCKET_SIZE != 0 {
            return Err(StrataError::InvalidSequence(format!(
                "length {} is not a header plus whole buckets",
                data.len()
            )));
        }
        Ok(Self { data })
    }

    /// Build a sequence starting at `start` from newest-first values.
    pub fn from_values(start: DateTime<Utc>, values: &[f64]) -> Self {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + values.len() * BUCKET_SIZE);
        buf.put_u64(to_nanos(start) as u64);
        for value in values {
            buf.put_f64(*value);
        }
        Self { data: buf.freeze() }
    }

    /// Build a sequence from a newest-first chain of buckets.
    ///
    /// Intervals missing between consecutive buckets are written as zeros.
    /// Bucket starts must be strictly descending and a whole number of
    /// resolutions apart.
    pub fn from_buckets<I>(buckets: I, resolution: Duration) -> Result<Self>
    where
        I: IntoIterator<Item = Bucket>,
    {
        let resolution_nanos = duration_nanos(resolution);
        if resolution_nanos <= 0 {
            return Err(StrataError::Configuration(
                "sequence resolution must be positive".to_string(),
            ));
        }

        let mut buckets = buckets.into_iter();
        let Some(first) = buckets.next() else {
            return Ok(Self::empty());
        };

        let mut buf = BytesMut::with_capacity(1024);
        buf.put_u64(to_nanos(first.start) as u64);
        buf.put_f64(first.value);

        let mut newer = first;
        for bucket in buckets {
            let delta = to_nanos(newer.start) as i128 - to_nanos(bucket.start) as i128;
            if delta <= 0 || delta % resolution_nanos as i128 != 0 {
                return Err(StrataError::InvalidSequence(format!(
                    "bucket at {} does not follow {} at resolution {}",
                    bucket.start, newer.start, resolution
                )));
            }
            let gap = (delta / resolution_nanos as i128 - 1) as usize;
            buf.put_bytes(0, gap * BUCKET_SIZE);
            buf.put_f64(bucket.value);
            newer = bucket;
        }

        Ok(Self { data: buf.freeze() })
    }

    /// At least a header and one bucket.
    pub fn is_valid(&self) -> bool {
        self.data.len() >= HEADER_SIZE + BUCKET_SIZE
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Start time of bucket 0, `None` for the empty sequence.
    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.start_nanos().map(from_nanos)
    }

    fn start_nanos(&self) -> Option<i64> {
        if self.data.len() < HEADER_SIZE {
            return None;
        }
        let mut header = &self.data[..HEADER_SIZE];
        Some(header.get_u64() as i64)
    }

    pub fn num_buckets(&self) -> usize {
        (self.data.len() / BUCKET_SIZE).saturating_sub(1)
    }

    /// Value of bucket `bucket` (0 = newest); `0.0` outside the encoded range.
    pub fn value_at(&self, bucket: isize) -> f64 {
        let Ok(bucket) = usize::try_from(bucket) else {
            return 0.0;
        };
        let offset = match bucket.checked_add(1).and_then(|b| b.checked_mul(BUCKET_SIZE)) {
            Some(offset) if offset + BUCKET_SIZE <= self.data.len() => offset,
            _ => return 0.0,
        };
        let mut slot = &self.data[offset..offset + BUCKET_SIZE];
        slot.get_f64()
    }

    /// Value of the bucket covering `t`; `0.0` for times after the start.
    pub fn value_at_time(&self, t: DateTime<Utc>, resolution: Duration) -> f64 {
        let (Some(start), resolution) = (self.start_nanos(), duration_nanos(resolution)) else {
            return 0.0;
        };
        let t = to_nanos(t);
        if t > start || resolution <= 0 {
            return 0.0;
        }
        let bucket = (start as i128 - t as i128) / resolution as i128;
        isize::try_from(bucket).map_or(0.0, |b| self.value_at(b))
    }

    /// Bucket values, newest first.
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.data
            .get(HEADER_SIZE..)
            .unwrap_or_default()
            .chunks_exact(BUCKET_SIZE)
            .map(|mut chunk| chunk.get_f64())
    }

    /// Merge with `other` into a new sequence, dropping buckets older than
    /// `truncate_before`.
    ///
    /// The operand with the later start leads. Buckets between its oldest
    /// bucket and the other operand's newest bucket are zero-filled. Where
    /// the operands overlap the leading operand's buckets are kept as is:
    /// the trailing operand's overlapping buckets are discarded, never summed
    /// in and never written over the leading ones. Only the trailing
    /// operand's buckets older than the leading operand's oldest bucket
    /// are carried over.
    pub fn append(
        &self,
        other: &Sequence,
        resolution: Duration,
        truncate_before: DateTime<Utc>,
    ) -> Sequence {
        let (a, b) = match (self.start_nanos(), other.start_nanos()) {
            (None, None) => return Sequence::empty(),
            (Some(_), None) => (self, None),
            (None, Some(_)) => (other, None),
            (Some(s), Some(o)) if s >= o => (self, Some(other)),
            (Some(_), Some(_)) => (other, Some(self)),
        };
        let resolution_nanos = duration_nanos(resolution) as i128;
        if resolution_nanos <= 0 {
            tracing::warn!(%resolution, "append at non-positive resolution, keeping newer sequence");
            return a.clone();
        }

        let a_start = a.start_nanos().unwrap_or_default() as i128;
        let floor = to_nanos(truncate_before) as i128;
        let max_periods = (a_start - floor).div_euclid(resolution_nanos) + 1;
        if max_periods <= 0 {
            return Sequence::empty();
        }
        let a_buckets = a.num_buckets() as i128;
        if a_buckets >= max_periods {
            return a.truncated(max_periods as usize);
        }

        let Some(b) = b else {
            return a.clone();
        };
        let b_start = b.start_nanos().unwrap_or_default() as i128;
        if b_start < floor {
            return a.clone();
        }

        let offset = (a_start - b_start).div_euclid(resolution_nanos);
        let gap = offset - a_buckets;
        let (gap, skip) = if gap >= 0 { (gap, 0) } else { (0, -gap) };

        // Every count below is bounded by max_periods - a_buckets.
        let room = (max_periods - a_buckets) as usize;
        let gap = (gap as usize).min(room);
        let skip = usize::try_from(skip).unwrap_or(usize::MAX);
        let tail = b.num_buckets().saturating_sub(skip).min(room - gap);

        let mut buf = BytesMut::with_capacity(a.data.len() + (gap + tail) * BUCKET_SIZE);
        buf.put_slice(&a.data);
        buf.put_bytes(0, gap * BUCKET_SIZE);
        if tail > 0 {
            let from = HEADER_SIZE + skip * BUCKET_SIZE;
            buf.put_slice(&b.data[from..from + tail * BUCKET_SIZE]);
        }

        let dropped = b.num_buckets().saturating_sub(skip + tail);
        if dropped > 0 {
            tracing::debug!(dropped, max_periods = max_periods as u64, "truncated appended sequence");
        }
        Sequence { data: buf.freeze() }
    }

    fn truncated(&self, buckets: usize) -> Sequence {
        let len = HEADER_SIZE + buckets * BUCKET_SIZE;
        if len >= self.data.len() {
            return self.clone();
        }
        tracing::debug!(
            from = self.num_buckets(),
            to = buckets,
            "truncated sequence to retention"
        );
        Sequence {
            data: self.data.slice(..len),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Bytes {
        self.data
    }
}

impl AsRef<[u8]> for Sequence {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn epoch() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2015, 5, 11, 0, 0, 0).unwrap()
    }

    fn res() -> Duration {
        Duration::minutes(1)
    }

    fn at(minutes: i64) -> DateTime<Utc> {
        epoch() + Duration::minutes(minutes)
    }

    fn values(seq: &Sequence) -> Vec<f64> {
        seq.values().collect()
    }

    #[test]
    fn test_layout() {
        let seq = Sequence::from_values(epoch(), &[1.5, -2.0]);
        let bytes = seq.as_bytes();
        assert_eq!(bytes.len(), 24);
        assert_eq!(&bytes[..8], &(to_nanos(epoch()) as u64).to_be_bytes());
        assert_eq!(&bytes[8..16], &1.5f64.to_be_bytes());
        assert_eq!(&bytes[16..24], &(-2.0f64).to_be_bytes());
        assert_eq!(seq.start(), Some(epoch()));
        assert_eq!(seq.num_buckets(), 2);
        assert!(seq.is_valid());
    }

    #[test]
    fn test_empty() {
        let seq = Sequence::empty();
        assert_eq!(seq.start(), None);
        assert_eq!(seq.num_buckets(), 0);
        assert!(!seq.is_valid());
        assert_eq!(seq.value_at(0), 0.0);
        assert_eq!(seq.value_at_time(epoch(), res()), 0.0);

        let header_only = Sequence::from_values(epoch(), &[]);
        assert_eq!(header_only.num_buckets(), 0);
        assert!(!header_only.is_valid());
    }

    #[test]
    fn test_from_bytes() {
        let seq = Sequence::from_values(epoch(), &[4.0]);
        let decoded = Sequence::from_bytes(seq.as_bytes().to_vec()).unwrap();
        assert_eq!(decoded, seq);

        let err = Sequence::from_bytes(vec![0u8; 12]).unwrap_err();
        assert!(err.is_decode_error());
        assert!(Sequence::from_bytes(vec![0u8; 4]).is_err());
        assert!(Sequence::from_bytes(Vec::new()).unwrap().is_empty());
    }

    #[test]
    fn test_value_at() {
        let seq = Sequence::from_values(epoch(), &[1.0, 2.0, 3.0]);
        assert_eq!(seq.value_at(0), 1.0);
        assert_eq!(seq.value_at(2), 3.0);
        assert_eq!(seq.value_at(3), 0.0);
        assert_eq!(seq.value_at(-1), 0.0);
        assert_eq!(seq.value_at(isize::MAX), 0.0);
    }

    #[test]
    fn test_value_at_time() {
        let seq = Sequence::from_values(at(10), &[1.0, 2.0, 3.0]);
        assert_eq!(seq.value_at_time(at(11), res()), 0.0);
        assert_eq!(seq.value_at_time(at(10), res()), 1.0);
        assert_eq!(seq.value_at_time(at(9) + Duration::seconds(30), res()), 1.0);
        assert_eq!(seq.value_at_time(at(9), res()), 2.0);
        assert_eq!(seq.value_at_time(at(8), res()), 3.0);
        assert_eq!(seq.value_at_time(at(7), res()), 0.0);
    }

    #[test]
    fn test_from_buckets_fills_gaps() {
        let seq = Sequence::from_buckets(
            [
                Bucket::new(at(10), 5.0),
                Bucket::new(at(9), 4.0),
                Bucket::new(at(6), 1.0),
            ],
            res(),
        )
        .unwrap();
        assert_eq!(seq.start(), Some(at(10)));
        assert_eq!(values(&seq), vec![5.0, 4.0, 0.0, 0.0, 1.0]);
        assert_eq!(seq.value_at_time(at(7), res()), 0.0);
        assert_eq!(seq.value_at_time(at(6), res()), 1.0);
    }

    #[test]
    fn test_from_buckets_rejects_disorder() {
        let ascending = [Bucket::new(at(1), 1.0), Bucket::new(at(2), 2.0)];
        assert!(Sequence::from_buckets(ascending, res()).is_err());

        let misaligned = [
            Bucket::new(at(2), 1.0),
            Bucket::new(at(1) - Duration::seconds(10), 2.0),
        ];
        assert!(Sequence::from_buckets(misaligned, res()).is_err());

        let none: [Bucket; 0] = [];
        assert!(Sequence::from_buckets(none, res()).unwrap().is_empty());
    }

    #[test]
    fn test_append_with_gap() {
        let a = Sequence::from_values(at(10), &[10.0, 9.0]);
        let b = Sequence::from_values(at(6), &[6.0, 5.0]);

        let merged = a.append(&b, res(), at(0));
        assert_eq!(merged.start(), Some(at(10)));
        assert_eq!(values(&merged), vec![10.0, 9.0, 0.0, 0.0, 6.0, 5.0]);

        // Operand order does not matter.
        assert_eq!(b.append(&a, res(), at(0)), merged);
        assert_eq!(a.as_bytes().len(), 24);
    }

    #[test]
    fn test_append_adjacent() {
        let a = Sequence::from_values(at(10), &[10.0, 9.0]);
        let b = Sequence::from_values(at(8), &[8.0]);
        assert_eq!(values(&a.append(&b, res(), at(0))), vec![10.0, 9.0, 8.0]);
    }

    #[test]
    fn test_append_overlap_keeps_newer() {
        let a = Sequence::from_values(at(10), &[10.0, 9.0, 8.0]);
        let b = Sequence::from_values(at(9), &[-9.0, -8.0, 7.0, 6.0]);
        assert_eq!(
            values(&a.append(&b, res(), at(0))),
            vec![10.0, 9.0, 8.0, 7.0, 6.0]
        );
    }

    #[test]
    fn test_append_truncates_tail() {
        let a = Sequence::from_values(at(10), &[10.0, 9.0]);
        let b = Sequence::from_values(at(8), &[8.0, 7.0, 6.0, 5.0]);
        let merged = a.append(&b, res(), at(7));
        assert_eq!(values(&merged), vec![10.0, 9.0, 8.0, 7.0]);
    }

    #[test]
    fn test_append_newer_exceeds_retention() {
        let a = Sequence::from_values(at(10), &[10.0, 9.0, 8.0, 7.0]);
        let b = Sequence::from_values(at(5), &[5.0]);
        let merged = a.append(&b, res(), at(8));
        assert_eq!(values(&merged), vec![10.0, 9.0, 8.0]);
    }

    #[test]
    fn test_append_older_before_floor() {
        let a = Sequence::from_values(at(10), &[10.0]);
        let b = Sequence::from_values(at(3), &[3.0, 2.0]);
        let merged = a.append(&b, res(), at(5));
        assert_eq!(merged, a);
    }

    #[test]
    fn test_append_entirely_out_of_range() {
        let a = Sequence::from_values(at(10), &[10.0]);
        let b = Sequence::from_values(at(9), &[9.0]);
        assert!(a.append(&b, res(), at(11)).is_empty());
    }

    #[test]
    fn test_append_empty_operand() {
        let a = Sequence::from_values(at(10), &[10.0, 9.0, 8.0]);
        assert_eq!(a.append(&Sequence::empty(), res(), at(0)), a);
        assert_eq!(
            values(&Sequence::empty().append(&a, res(), at(9))),
            vec![10.0, 9.0]
        );
        assert!(Sequence::empty()
            .append(&Sequence::empty(), res(), at(0))
            .is_empty());
    }
}
