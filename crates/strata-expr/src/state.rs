//! Strata Aggregate State
//!
//! Running state of one aggregate, shared by live accumulators (held in
//! memory) and encoded accumulators (decoded from and re-encoded into a
//! caller-owned byte region).
//!
//! Encoded layout: `[set: u8][primary: f64 BE]` plus `[secondary: f64 BE]`
//! for averages (total, count).
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::expr::AggregateOp;
use bytes::{Buf, BufMut};

const FLAG_WIDTH: usize = 1;
const SLOT_WIDTH: usize = 8;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AggregateState {
    pub set: bool,
    pub primary: f64,
    pub secondary: f64,
}

impl AggregateState {
    /// Encoded width of the state for `op`.
    pub fn width(op: AggregateOp) -> usize {
        FLAG_WIDTH + SLOT_WIDTH * Self::slots(op)
    }

    fn slots(op: AggregateOp) -> usize {
        match op {
            AggregateOp::Avg => 2,
            _ => 1,
        }
    }

    /// Fold one observed value into the state.
    pub fn fold(&mut self, op: AggregateOp, value: f64) {
        match op {
            AggregateOp::Sum => self.primary += value,
            AggregateOp::Count => self.primary += 1.0,
            AggregateOp::Avg => {
                self.primary += value;
                self.secondary += 1.0;
            }
            AggregateOp::Min => {
                self.primary = if self.set { self.primary.min(value) } else { value };
            }
            AggregateOp::Max => {
                self.primary = if self.set { self.primary.max(value) } else { value };
            }
        }
        self.set = true;
    }

    /// Combine another partial state into this one. Unset states are identities.
    pub fn combine(&mut self, op: AggregateOp, other: &AggregateState) {
        if !other.set {
            return;
        }
        if !self.set {
            *self = *other;
            return;
        }
        match op {
            AggregateOp::Sum | AggregateOp::Count => self.primary += other.primary,
            AggregateOp::Avg => {
                self.primary += other.primary;
                self.secondary += other.secondary;
            }
            AggregateOp::Min => self.primary = self.primary.min(other.primary),
            AggregateOp::Max => self.primary = self.primary.max(other.primary),
        }
    }

    pub fn value(&self, op: AggregateOp) -> f64 {
        if !self.set {
            return 0.0;
        }
        match op {
            AggregateOp::Avg => {
                if self.secondary == 0.0 {
                    0.0
                } else {
                    self.primary / self.secondary
                }
            }
            _ => self.primary,
        }
    }

    /// Decode from the front of `buf`, which must hold at least `width(op)` bytes.
    pub fn decode(op: AggregateOp, mut buf: &[u8]) -> Self {
        let set = buf.get_u8() != 0;
        let primary = buf.get_f64();
        let secondary = if Self::slots(op) > 1 { buf.get_f64() } else { 0.0 };
        Self {
            set,
            primary,
            secondary,
        }
    }

    /// Encode into the front of `buf`, which must hold at least `width(op)` bytes.
    pub fn encode(&self, op: AggregateOp, mut buf: &mut [u8]) {
        buf.put_u8(u8::from(self.set));
        buf.put_f64(self.primary);
        if Self::slots(op) > 1 {
            buf.put_f64(self.secondary);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
