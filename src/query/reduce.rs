//! Slot reductions: rotate-and-add squash, relocation into slot windows and
//! broadcast of one slot to all logical slots.
//!
//! Slot counts that are not a power of two are handled by folding the tail
//! [L, S) onto [0, S - L) first, where L is the largest power of two ≤ S.

use tracing::{debug, info};

use crate::bfv::Ciphertext;
use crate::context::CryptoContext;
use crate::error::{CohortError, Result};
use crate::query::types::{Denominator, MafAggregate, Squashed};

/// Largest power of two ≤ `slots`.
pub fn working_width(slots: usize) -> usize {
    1 << slots.max(1).ilog2()
}

/// Squash policy: stop after `depth` levels, or once the estimated budget
/// drops below `floor` bits.
pub struct Reducer<'a> {
    ctx: &'a CryptoContext,
    floor: f64,
    depth: Option<u32>,
}

impl<'a> Reducer<'a> {
    pub fn new(ctx: &'a CryptoContext, floor: f64, depth: Option<u32>) -> Self {
        Self { ctx, floor, depth }
    }

    /// Fold the irregular tail and return the working width L.
    fn fold_tail(&self, ct: &Ciphertext) -> Result<(Ciphertext, usize)> {
        let slots = self.ctx.slots();
        let width = working_width(slots);
        if width == slots {
            return Ok((ct.clone(), width));
        }
        let head = self.ctx.mask(ct, 0, width)?;
        let tail = self.ctx.mask(ct, width, slots)?;
        let tail = self.ctx.rotate_left(&tail, width)?;
        Ok((self.ctx.add(&head, &tail)?, width))
    }

    /// One rotate-and-add step: slot j gains slot j + shift.
    fn step(&self, acc: &Ciphertext, shift: usize) -> Result<Ciphertext> {
        let rotated = self.ctx.rotate_left(acc, shift)?;
        let sum = self.ctx.add(acc, &rotated)?;
        let remaining = sum.remaining_budget();
        if remaining < 0.0 {
            return Err(CohortError::NoiseBudgetExceeded { remaining, floor: 0.0 });
        }
        Ok(sum)
    }

    /// Reduce all logical slots under the termination policy.
    pub fn squash(&self, ct: &Ciphertext) -> Result<Squashed> {
        let (mut acc, width) = self.fold_tail(ct)?;
        let mut shift = width / 2;
        let mut level = 0u32;
        while shift > 0 {
            acc = self.step(&acc, shift)?;
            let remaining = acc.remaining_budget();
            debug!(level, shift, remaining, "squash step");

            if self.depth == Some(level) || remaining < self.floor {
                info!(level, stride = shift, remaining, floor = self.floor, "squash stopped early");
                return Ok(Squashed { ciphertext: acc, stride: shift });
            }
            shift /= 2;
            level += 1;
        }
        Ok(Squashed { ciphertext: acc, stride: 1 })
    }

    /// Reduce to exactly `stride` slots, ignoring the termination policy.
    pub fn squash_to(&self, ct: &Ciphertext, stride: usize) -> Result<Squashed> {
        let (acc, width) = self.fold_tail(ct)?;
        self.narrow(Squashed { ciphertext: acc, stride: width }, stride)
    }

    /// Continue a squash until its stride is `stride`.
    pub fn narrow(&self, squashed: Squashed, stride: usize) -> Result<Squashed> {
        if !stride.is_power_of_two() || stride > squashed.stride {
            return Err(CohortError::InvalidArgument(format!(
                "cannot narrow stride {} to {stride}",
                squashed.stride
            )));
        }
        let mut acc = squashed.ciphertext;
        let mut shift = squashed.stride / 2;
        while shift >= stride {
            acc = self.step(&acc, shift)?;
            shift /= 2;
        }
        Ok(Squashed { ciphertext: acc, stride })
    }

    /// Move the window [0, stride) to [offset, offset + stride) and zero the rest.
    pub fn relocate(&self, squashed: &Squashed, offset: usize) -> Result<Ciphertext> {
        let slots = self.ctx.slots();
        if offset + squashed.stride > slots {
            return Err(CohortError::InvalidArgument(format!(
                "window [{offset}, {}) outside 0..{slots}",
                offset + squashed.stride
            )));
        }
        let moved = if offset == 0 {
            squashed.ciphertext.clone()
        } else {
            self.ctx.rotate_right(&squashed.ciphertext, offset)?
        };
        self.ctx.mask(&moved, offset, offset + squashed.stride)
    }

    /// Squash a numerator and a denominator to a common stride and pack them
    /// into disjoint windows of one ciphertext.
    pub fn pack_pair(&self, numerator: &Ciphertext, denominator: &Ciphertext) -> Result<MafAggregate> {
        let slots = self.ctx.slots();
        let mut num = self.squash(numerator)?;
        if slots == 1 {
            let den = self.squash_to(denominator, num.stride)?;
            return Ok(MafAggregate {
                ciphertext: num.ciphertext,
                stride: num.stride,
                denominator: Denominator::Separate(den.ciphertext),
            });
        }
        if 2 * num.stride > slots {
            let half = num.stride / 2;
            num = self.narrow(num, half)?;
        }
        let stride = num.stride;
        let den = self.squash_to(denominator, stride)?;
        let packed = self.ctx.add(&self.relocate(&num, 0)?, &self.relocate(&den, stride)?)?;
        debug!(stride, remaining = packed.remaining_budget(), "packed numerator and denominator");
        Ok(MafAggregate { ciphertext: packed, stride, denominator: Denominator::Packed { offset: stride } })
    }

    /// Replicate slot 0 into every logical slot. Other slots must be zero.
    pub fn broadcast(&self, ct: &Ciphertext) -> Result<Ciphertext> {
        let slots = self.ctx.slots();
        let width = working_width(slots);
        let mut acc = ct.clone();
        let mut shift = 1;
        while shift < width {
            let rotated = self.ctx.rotate_right(&acc, shift)?;
            acc = self.ctx.add(&acc, &rotated)?;
            shift *= 2;
        }
        if slots > width {
            let head = self.ctx.mask(&acc, 0, slots - width)?;
            let tail = self.ctx.rotate_right(&head, width)?;
            acc = self.ctx.add(&acc, &tail)?;
        }
        Ok(acc)
    }
}

/// Balanced sum; the empty sum is a fresh zero.
pub fn add_many(ctx: &CryptoContext, cts: &[Ciphertext]) -> Result<Ciphertext> {
    match cts {
        [] => Ok(ctx.zero()),
        [one] => Ok(one.clone()),
        _ => {
            let (left, right) = cts.split_at(cts.len() / 2);
            ctx.add(&add_many(ctx, left)?, &add_many(ctx, right)?)
        }
    }
}

/// Balanced product tree of depth ⌈log2 len⌉.
pub fn mul_many(ctx: &CryptoContext, cts: &[Ciphertext]) -> Result<Ciphertext> {
    match cts {
        [] => Err(CohortError::InvalidArgument("empty product".into())),
        [one] => Ok(one.clone()),
        _ => {
            let (left, right) = cts.split_at(cts.len() / 2);
            ctx.mul(&mul_many(ctx, left)?, &mul_many(ctx, right)?)
        }
    }
}

/// Zero the padding slots of the last compressed row.
pub fn mask_last_row(ctx: &CryptoContext, rows: usize, cts: &mut [Ciphertext]) -> Result<()> {
    let used = rows % ctx.slots();
    if used != 0 {
        if let Some(last) = cts.last_mut() {
            *last = ctx.mask(last, 0, used)?;
        }
    }
    Ok(())
}
