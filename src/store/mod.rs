//! Per-(column, compressed row) ciphertext storage.
//!
//! Logical row r lives in compressed row r / S, slot r % S. Every column of a
//! kind has the same number of compressed rows.

pub mod disk;
pub mod memory;

pub use disk::DiskColumnStore;
pub use memory::MemoryColumnStore;

use std::fmt;
use serde::{Deserialize, Serialize};

use crate::bfv::Ciphertext;
use crate::error::{CohortError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnKind {
    Genotype,
    BinaryPheno,
    ContinuousPheno,
}

impl ColumnKind {
    pub const ALL: [ColumnKind; 3] = [Self::Genotype, Self::BinaryPheno, Self::ContinuousPheno];

    pub fn name(self) -> &'static str {
        match self {
            Self::Genotype => "genotype",
            Self::BinaryPheno => "binary_pheno",
            Self::ContinuousPheno => "continuous_pheno",
        }
    }
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Smallest and largest plaintext value written to one column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueBounds {
    pub min: i64,
    pub max: i64,
}

impl ValueBounds {
    /// Bounds of `values`, or `None` when empty.
    pub fn of(values: impl IntoIterator<Item = i64>) -> Option<Self> {
        values.into_iter().fold(None, |acc, v| Some(match acc {
            None => Self { min: v, max: v },
            Some(b) => b.widen(v),
        }))
    }

    pub fn widen(self, value: i64) -> Self {
        Self { min: self.min.min(value), max: self.max.max(value) }
    }
}

/// Storage capability the query engine reads ciphertexts through.
pub trait ColumnStore: Send + Sync {
    /// Logical slots per ciphertext.
    fn slots(&self) -> usize;

    fn num_rows(&self) -> usize;

    fn set_num_rows(&mut self, rows: usize) -> Result<()>;

    fn columns(&self, kind: ColumnKind) -> usize;

    fn is_set(&self, kind: ColumnKind) -> bool;

    fn get(&self, kind: ColumnKind, column: usize, compressed_row: usize) -> Result<Ciphertext>;

    /// Replace a ciphertext, or append one when `compressed_row` equals the
    /// current number of compressed rows of that column.
    fn put(&mut self, kind: ColumnKind, column: usize, compressed_row: usize, ct: Ciphertext) -> Result<()>;

    /// Replace every column of `kind`; `columns[c][r]` is column c, compressed row r.
    fn load_columns(&mut self, kind: ColumnKind, columns: Vec<Vec<Ciphertext>>) -> Result<()>;

    /// Per-column value bounds recorded for `kind`, if any.
    fn bounds(&self, kind: ColumnKind) -> Option<&[ValueBounds]>;

    fn set_bounds(&mut self, kind: ColumnKind, bounds: Vec<ValueBounds>) -> Result<()>;

    fn compressed_rows(&self) -> usize {
        self.num_rows().div_ceil(self.slots())
    }

    fn genotype(&self, column: usize, compressed_row: usize) -> Result<Ciphertext> {
        self.get(ColumnKind::Genotype, column, compressed_row)
    }

    fn binary_pheno(&self, column: usize, compressed_row: usize) -> Result<Ciphertext> {
        self.get(ColumnKind::BinaryPheno, column, compressed_row)
    }

    fn continuous_pheno(&self, column: usize, compressed_row: usize) -> Result<Ciphertext> {
        self.get(ColumnKind::ContinuousPheno, column, compressed_row)
    }

    fn set_genotype(&mut self, ct: Ciphertext, column: usize, compressed_row: usize) -> Result<()> {
        self.put(ColumnKind::Genotype, column, compressed_row, ct)
    }
}

/// Fail fast on unset kinds and out-of-range indices.
pub(crate) fn check_access(
    kind: ColumnKind,
    column: usize,
    compressed_row: usize,
    columns: Option<usize>,
    rows: usize,
) -> Result<()> {
    let Some(columns) = columns else {
        return Err(CohortError::InvalidArgument(format!("{kind} data has not been set")));
    };
    if column >= columns {
        return Err(CohortError::InvalidArgument(format!(
            "{kind} column {column} out of range (have {columns})"
        )));
    }
    if compressed_row >= rows {
        return Err(CohortError::InvalidArgument(format!(
            "{kind} compressed row {compressed_row} out of range (have {rows})"
        )));
    }
    Ok(())
}

/// All columns of a bulk load must have the same, non-zero length.
pub(crate) fn check_shape(kind: ColumnKind, columns: &[Vec<Ciphertext>]) -> Result<usize> {
    let rows = columns.first().map(Vec::len).unwrap_or(0);
    if columns.is_empty() || rows == 0 {
        return Err(CohortError::InvalidArgument(format!("empty {kind} load")));
    }
    if let Some(bad) = columns.iter().find(|c| c.len() != rows) {
        return Err(CohortError::DimensionMismatch { expected: rows, got: bad.len() });
    }
    Ok(rows)
}
