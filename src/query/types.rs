use serde::{Deserialize, Serialize};

use crate::bfv::Ciphertext;
use crate::context::{sum_slots, CryptoContext};
use crate::error::{CohortError, Result};

/// How the terms of an equality query combine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Connective {
    And,
    Or,
}

/// `genotype[column] == value` with `value` in {0, 1, 2}.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EqualityTerm {
    pub column: usize,
    pub value: u8,
}

impl EqualityTerm {
    pub fn new(column: usize, value: u8) -> Self {
        Self { column, value }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EqualityQuery {
    pub terms: Vec<EqualityTerm>,
    pub connective: Connective,
}

impl EqualityQuery {
    pub fn and(terms: Vec<EqualityTerm>) -> Self {
        Self { terms, connective: Connective::And }
    }

    pub fn or(terms: Vec<EqualityTerm>) -> Self {
        Self { terms, connective: Connective::Or }
    }

    pub fn is_conjunctive(&self) -> bool {
        self.connective == Connective::And
    }
}

/// One weighted genotype column of a polygenic risk score.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrsWeight {
    pub column: usize,
    pub weight: i64,
}

impl PrsWeight {
    pub fn new(column: usize, weight: i64) -> Self {
        Self { column, weight }
    }
}

/// A squashed aggregate: the true value is the sum of the first `stride` slots.
#[derive(Clone, Debug)]
pub struct Squashed {
    pub ciphertext: Ciphertext,
    pub stride: usize,
}

impl Squashed {
    /// Owner-side decryption of the aggregate.
    pub fn decrypt(&self, ctx: &CryptoContext) -> Result<u64> {
        ctx.decrypt_sum(&self.ciphertext, self.stride)
    }

    /// Total of already decrypted slots.
    pub fn total(&self, slots: &[u64], plain_modulus: u64) -> Result<u64> {
        sum_slots(slots, 0, self.stride, plain_modulus)
    }
}

/// Where the doubled MAF denominator travels.
#[derive(Clone, Debug)]
pub enum Denominator {
    /// Packed into slots [offset, offset + stride) of the numerator ciphertext.
    Packed { offset: usize },
    /// Single-slot stores cannot pack; the denominator comes separately.
    Separate(Ciphertext),
}

/// Allele count over matching rows and 2 × the number of matching rows.
#[derive(Clone, Debug)]
pub struct MafAggregate {
    pub ciphertext: Ciphertext,
    pub stride: usize,
    pub denominator: Denominator,
}

impl MafAggregate {
    /// Owner-side decryption of (numerator, denominator).
    pub fn decrypt(&self, ctx: &CryptoContext) -> Result<(u64, u64)> {
        let slots = ctx.decrypt(&self.ciphertext)?;
        match &self.denominator {
            Denominator::Separate(ct) => {
                let denom = ctx.decrypt(ct)?;
                self.totals(&slots, Some(&denom), ctx.plain_modulus())
            }
            Denominator::Packed { .. } => self.totals(&slots, None, ctx.plain_modulus()),
        }
    }

    /// (numerator, denominator) from decrypted slots; `separate` holds the
    /// decrypted denominator ciphertext when it was not packed.
    pub fn totals(&self, slots: &[u64], separate: Option<&[u64]>, p: u64) -> Result<(u64, u64)> {
        let numerator = sum_slots(slots, 0, self.stride, p)?;
        let denominator = match (&self.denominator, separate) {
            (Denominator::Packed { offset }, _) => sum_slots(slots, *offset, self.stride, p)?,
            (Denominator::Separate(_), Some(denom)) => sum_slots(denom, 0, self.stride, p)?,
            (Denominator::Separate(_), None) => {
                return Err(CohortError::InvalidArgument("denominator slots missing".into()))
            }
        };
        Ok((numerator, denominator))
    }
}

/// Per-individual scores, one ciphertext per compressed row.
#[derive(Clone, Debug)]
pub struct PrsResult {
    pub scores: Vec<Ciphertext>,
    pub compressed_rows: usize,
    pub rows: usize,
}

impl PrsResult {
    /// Owner-side decryption of the `rows` signed scores.
    pub fn decrypt(&self, ctx: &CryptoContext) -> Result<Vec<i64>> {
        let mut out = Vec::with_capacity(self.compressed_rows * ctx.slots());
        for ct in &self.scores {
            out.extend(ctx.decrypt_signed(ct)?);
        }
        out.truncate(self.rows);
        Ok(out)
    }
}

/// Rows within the distance threshold, split by outcome.
#[derive(Clone, Debug)]
pub struct SimilarityAggregate {
    pub with_outcome: Squashed,
    pub without_outcome: Squashed,
}

impl SimilarityAggregate {
    pub fn decrypt(&self, ctx: &CryptoContext) -> Result<(u64, u64)> {
        Ok((self.with_outcome.decrypt(ctx)?, self.without_outcome.decrypt(ctx)?))
    }
}
