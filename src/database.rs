//! Encrypted cohort database: column setup, synthetic data and row-level updates.

use std::sync::Arc;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::bfv::Ciphertext;
use crate::context::CryptoContext;
use crate::error::{CohortError, Result};
use crate::store::{ColumnKind, ColumnStore, ValueBounds};

/// Column-packed encrypted dataset over an injected [`ColumnStore`].
///
/// Logical row r lives in compressed row r / S at slot r % S of every column.
pub struct EncryptedDatabase<S: ColumnStore> {
    ctx: Arc<CryptoContext>,
    store: S,
    genotype_headers: Vec<String>,
    binary_pheno_headers: Vec<String>,
    continuous_pheno_headers: Vec<String>,
    num_deletes: usize,
}

impl<S: ColumnStore> EncryptedDatabase<S> {
    pub fn new(ctx: Arc<CryptoContext>, store: S) -> Result<Self> {
        if store.slots() != ctx.slots() {
            return Err(CohortError::DimensionMismatch { expected: ctx.slots(), got: store.slots() });
        }
        Ok(Self {
            ctx,
            store,
            genotype_headers: Vec::new(),
            binary_pheno_headers: Vec::new(),
            continuous_pheno_headers: Vec::new(),
            num_deletes: 0,
        })
    }

    pub fn context(&self) -> &Arc<CryptoContext> {
        &self.ctx
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn num_rows(&self) -> usize {
        self.store.num_rows()
    }

    pub fn compressed_rows(&self) -> usize {
        self.store.compressed_rows()
    }

    pub fn slots(&self) -> usize {
        self.store.slots()
    }

    pub fn genotype_columns(&self) -> usize {
        self.store.columns(ColumnKind::Genotype)
    }

    pub fn binary_pheno_columns(&self) -> usize {
        self.store.columns(ColumnKind::BinaryPheno)
    }

    pub fn continuous_pheno_columns(&self) -> usize {
        self.store.columns(ColumnKind::ContinuousPheno)
    }

    pub fn is_set(&self, kind: ColumnKind) -> bool {
        self.store.is_set(kind)
    }

    /// Per-column value bounds of `kind` as loaded, widened by inserts and
    /// destructive deletes. Additive updates are not tracked.
    pub fn value_bounds(&self, kind: ColumnKind) -> Option<&[ValueBounds]> {
        self.store.bounds(kind)
    }

    /// Destructive deletes performed since the columns were last encrypted.
    pub fn num_deletes(&self) -> usize {
        self.num_deletes
    }

    /// Squash level at which per-slot sums could start to wrap mod p, if any.
    ///
    /// Returns the first level i below ⌊log2 min(S, rows)⌋ with
    /// 2^(i+2) · compressed_rows > p.
    pub fn chunking_factor(&self) -> Option<u32> {
        let rows = self.num_rows();
        if rows == 0 {
            return None;
        }
        let depth = self.slots().min(rows).ilog2();
        let crows = self.compressed_rows() as u128;
        let p = self.ctx.plain_modulus() as u128;
        (0..depth).find(|&i| (1u128 << (i + 2)) * crows > p)
    }

    // ----------------------------------------------------------------
    // Setup
    // ----------------------------------------------------------------

    /// Encrypt a row-major genotype matrix of values in {-1, 0, 1, 2}, where
    /// -1 marks a missing call.
    pub fn set_genotypes(&mut self, rows: &[Vec<i64>]) -> Result<()> {
        self.load_kind(ColumnKind::Genotype, rows)
    }

    /// Encrypt 0/1 phenotypes, one row per genotype row.
    pub fn set_binary_pheno(&mut self, rows: &[Vec<i64>]) -> Result<()> {
        self.load_kind(ColumnKind::BinaryPheno, rows)
    }

    /// Encrypt non-negative integer phenotypes and record each column's bounds
    /// for the range comparator.
    pub fn set_continuous_pheno(&mut self, rows: &[Vec<i64>]) -> Result<()> {
        self.load_kind(ColumnKind::ContinuousPheno, rows)
    }

    /// Uniform genotypes in {0, 1, 2}; returns the plaintext matrix.
    pub fn generate_genotypes(&mut self, rows: usize, cols: usize, seed: u64) -> Result<Vec<Vec<i64>>> {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let data: Vec<Vec<i64>> = (0..rows)
            .map(|_| (0..cols).map(|_| rng.random_range(0..3)).collect())
            .collect();
        self.set_genotypes(&data)?;
        Ok(data)
    }

    /// Uniform 0/1 phenotypes for the current rows.
    pub fn generate_binary_pheno(&mut self, cols: usize, seed: u64) -> Result<Vec<Vec<i64>>> {
        let rows = self.require_rows()?;
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let data: Vec<Vec<i64>> = (0..rows)
            .map(|_| (0..cols).map(|_| rng.random_range(0..2)).collect())
            .collect();
        self.set_binary_pheno(&data)?;
        Ok(data)
    }

    /// Uniform integer phenotypes in [low, high) for the current rows.
    pub fn generate_continuous_pheno(
        &mut self,
        cols: usize,
        low: i64,
        high: i64,
        seed: u64,
    ) -> Result<Vec<Vec<i64>>> {
        if low >= high {
            return Err(CohortError::InvalidArgument(format!("empty phenotype range [{low}, {high})")));
        }
        let rows = self.require_rows()?;
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let data: Vec<Vec<i64>> = (0..rows)
            .map(|_| (0..cols).map(|_| rng.random_range(low..high)).collect())
            .collect();
        self.set_continuous_pheno(&data)?;
        Ok(data)
    }

    fn require_rows(&self) -> Result<usize> {
        match self.num_rows() {
            0 => Err(CohortError::InvalidArgument("set genotypes before phenotypes".into())),
            rows => Ok(rows),
        }
    }

    /// Pack row-major `rows` column-wise and encrypt every column in parallel.
    fn load_kind(&mut self, kind: ColumnKind, rows: &[Vec<i64>]) -> Result<()> {
        let cols = rows.first().map(Vec::len).unwrap_or(0);
        if rows.is_empty() || cols == 0 {
            return Err(CohortError::InvalidArgument(format!("empty {kind} matrix")));
        }
        if let Some(bad) = rows.iter().find(|r| r.len() != cols) {
            return Err(CohortError::DimensionMismatch { expected: cols, got: bad.len() });
        }
        let any_set = ColumnKind::ALL.iter().any(|&k| k != kind && self.store.is_set(k));
        if any_set && self.num_rows() != rows.len() {
            return Err(CohortError::DimensionMismatch { expected: self.num_rows(), got: rows.len() });
        }
        for (r, row) in rows.iter().enumerate() {
            check_values(kind, row, r)?;
        }
        let bounds = (0..cols)
            .map(|c| ValueBounds::of(rows.iter().map(|r| r[c])))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| CohortError::InvalidArgument(format!("empty {kind} matrix")))?;

        let slots = self.slots();
        let ctx = &self.ctx;
        let columns = (0..cols)
            .into_par_iter()
            .map(|c| {
                rows.chunks(slots)
                    .map(|chunk| {
                        let values: Vec<i64> = chunk.iter().map(|r| r[c]).collect();
                        ctx.encrypt_signed(&values)
                    })
                    .collect::<Result<Vec<Ciphertext>>>()
            })
            .collect::<Result<Vec<_>>>()?;

        self.store.load_columns(kind, columns)?;
        self.store.set_bounds(kind, bounds)?;
        self.store.set_num_rows(rows.len())?;
        if kind == ColumnKind::Genotype {
            self.num_deletes = 0;
        }
        info!(kind = kind.name(), rows = rows.len(), columns = cols, "encrypted columns");
        Ok(())
    }

    // ----------------------------------------------------------------
    // Headers
    // ----------------------------------------------------------------

    pub fn set_column_headers(&mut self, headers: Vec<String>) {
        self.genotype_headers = headers;
    }

    pub fn set_binary_pheno_headers(&mut self, headers: Vec<String>) {
        self.binary_pheno_headers = headers;
    }

    pub fn set_continuous_pheno_headers(&mut self, headers: Vec<String>) {
        self.continuous_pheno_headers = headers;
    }

    pub fn column_headers(&self) -> &[String] {
        &self.genotype_headers
    }

    pub fn binary_pheno_headers(&self) -> &[String] {
        &self.binary_pheno_headers
    }

    pub fn continuous_pheno_headers(&self) -> &[String] {
        &self.continuous_pheno_headers
    }

    // ----------------------------------------------------------------
    // DML
    // ----------------------------------------------------------------

    pub fn set_genotype(&mut self, ct: Ciphertext, column: usize, compressed_row: usize) -> Result<()> {
        self.store.set_genotype(ct, column, compressed_row)
    }

    /// Add `delta` to one genotype cell.
    pub fn update_one_value(&mut self, row: usize, column: usize, delta: i64) -> Result<()> {
        self.check_row(row)?;
        self.check_column(column)?;
        let (crow, slot) = self.locate(row);
        let current = self.store.genotype(column, crow)?;
        let updated = self.ctx.add(&current, &self.one_hot(slot, delta)?)?;
        self.store.set_genotype(updated, column, crow)
    }

    /// Add `deltas[c]` to every genotype column c of one row.
    pub fn update_one_row(&mut self, row: usize, deltas: &[i64]) -> Result<()> {
        self.check_row(row)?;
        self.check_width(deltas.len())?;
        for (column, &delta) in deltas.iter().enumerate() {
            self.update_one_value(row, column, delta)?;
        }
        Ok(())
    }

    /// Append a genotype row and return its index.
    ///
    /// When the row opens a new compressed row, every set column of every kind
    /// gets a fresh ciphertext so column shapes stay aligned.
    pub fn insert_one_row(&mut self, values: &[i64]) -> Result<usize> {
        self.check_width(values.len())?;
        let row = self.num_rows();
        check_values(ColumnKind::Genotype, values, row)?;
        let (crow, slot) = self.locate(row);

        if crow == self.compressed_rows() {
            for kind in [ColumnKind::BinaryPheno, ColumnKind::ContinuousPheno] {
                for column in 0..self.store.columns(kind) {
                    let zero = self.ctx.zero();
                    self.store.put(kind, column, crow, zero)?;
                }
            }
            for (column, &v) in values.iter().enumerate() {
                let fresh = self.one_hot(slot, v)?;
                self.store.set_genotype(fresh, column, crow)?;
            }
        } else {
            for (column, &v) in values.iter().enumerate() {
                let current = self.store.genotype(column, crow)?;
                let updated = self.ctx.add(&current, &self.one_hot(slot, v)?)?;
                self.store.set_genotype(updated, column, crow)?;
            }
        }

        self.widen_bounds(ColumnKind::Genotype, |c| values[c])?;
        for kind in [ColumnKind::BinaryPheno, ColumnKind::ContinuousPheno] {
            self.widen_bounds(kind, |_| 0)?;
        }
        self.store.set_num_rows(row + 1)?;
        debug!(row, compressed_row = crow, "inserted row");
        Ok(row)
    }

    /// Additive delete: subtract the caller-known values of a row.
    ///
    /// Costs no multiplicative noise and does not count as a destructive delete.
    pub fn delete_row_addition(&mut self, row: usize, current_values: &[i64]) -> Result<()> {
        let negated: Vec<i64> = current_values.iter().map(|v| -v).collect();
        self.update_one_row(row, &negated)
    }

    /// Destructive delete: overwrite the row's slot in every genotype column
    /// with the missing marker -1, so the row fails every equality test.
    pub fn delete_row_multiplication(&mut self, row: usize) -> Result<()> {
        self.check_row(row)?;
        let (crow, slot) = self.locate(row);
        let mut keep = vec![1u64; self.slots()];
        keep[slot] = 0;
        let keep = self.ctx.encoder().encode(&keep)?;
        let missing = self.one_hot(slot, -1)?;
        for column in 0..self.genotype_columns() {
            let current = self.store.genotype(column, crow)?;
            let masked = self.ctx.mul_plain(&current, &keep)?;
            let marked = self.ctx.add(&masked, &missing)?;
            self.store.set_genotype(marked, column, crow)?;
        }
        self.widen_bounds(ColumnKind::Genotype, |_| -1)?;
        self.num_deletes += 1;
        debug!(row, deletes = self.num_deletes, "masked row");
        Ok(())
    }

    fn widen_bounds(&mut self, kind: ColumnKind, value: impl Fn(usize) -> i64) -> Result<()> {
        let Some(bounds) = self.store.bounds(kind) else {
            return Ok(());
        };
        let widened: Vec<ValueBounds> = bounds.iter().enumerate().map(|(c, b)| b.widen(value(c))).collect();
        self.store.set_bounds(kind, widened)
    }

    fn one_hot(&self, slot: usize, value: i64) -> Result<Ciphertext> {
        let p = self.ctx.plain_modulus() as i64;
        self.ctx.encrypt_one_hot(slot, value.rem_euclid(p) as u64)
    }

    fn locate(&self, row: usize) -> (usize, usize) {
        (row / self.slots(), row % self.slots())
    }

    fn check_row(&self, row: usize) -> Result<()> {
        if row >= self.num_rows() {
            return Err(CohortError::InvalidArgument(format!(
                "row {row} out of range (have {})",
                self.num_rows()
            )));
        }
        Ok(())
    }

    fn check_column(&self, column: usize) -> Result<()> {
        if column >= self.genotype_columns() {
            return Err(CohortError::InvalidArgument(format!(
                "genotype column {column} out of range (have {})",
                self.genotype_columns()
            )));
        }
        Ok(())
    }

    fn check_width(&self, width: usize) -> Result<()> {
        if !self.store.is_set(ColumnKind::Genotype) {
            return Err(CohortError::InvalidArgument("genotype data has not been set".into()));
        }
        if width != self.genotype_columns() {
            return Err(CohortError::DimensionMismatch { expected: self.genotype_columns(), got: width });
        }
        Ok(())
    }
}

/// Genotypes are in {-1, 0, 1, 2}, binary phenotypes in {0, 1} and
/// continuous phenotypes non-negative.
fn check_values(kind: ColumnKind, row: &[i64], index: usize) -> Result<()> {
    let allowed = match kind {
        ColumnKind::Genotype => -1..=2,
        ColumnKind::BinaryPheno => 0..=1,
        ColumnKind::ContinuousPheno => 0..=i64::MAX,
    };
    match row.iter().find(|&&v| !allowed.contains(&v)) {
        Some(v) => Err(CohortError::InvalidArgument(format!(
            "{kind} value {v} in row {index} outside {}..={}",
            allowed.start(),
            allowed.end()
        ))),
        None => Ok(()),
    }
}
