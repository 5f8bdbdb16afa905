//! Plaintext reference database with the same query surface.

use crate::error::{CohortError, Result};
use crate::query::types::{Connective, EqualityQuery, EqualityTerm, PrsWeight};

/// Row-major plaintext cohort. Mirrors the encrypted DML so both can be
/// driven by the same script.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PlaintextDatabase {
    genotypes: Vec<Vec<i64>>,
    binary_pheno: Vec<Vec<i64>>,
    continuous_pheno: Vec<Vec<i64>>,
    num_deletes: usize,
}

impl PlaintextDatabase {
    pub fn new(genotypes: Vec<Vec<i64>>) -> Self {
        Self { genotypes, ..Self::default() }
    }

    pub fn with_binary_pheno(mut self, rows: Vec<Vec<i64>>) -> Self {
        self.binary_pheno = rows;
        self
    }

    pub fn with_continuous_pheno(mut self, rows: Vec<Vec<i64>>) -> Self {
        self.continuous_pheno = rows;
        self
    }

    pub fn num_rows(&self) -> usize {
        self.genotypes.len()
    }

    pub fn genotypes(&self) -> &[Vec<i64>] {
        &self.genotypes
    }

    pub fn num_deletes(&self) -> usize {
        self.num_deletes
    }

    fn matches(&self, row: &[i64], query: &EqualityQuery) -> bool {
        let hit = |t: &EqualityTerm| row.get(t.column) == Some(&(t.value as i64));
        match query.connective {
            Connective::And => query.terms.iter().all(hit),
            Connective::Or => query.terms.iter().any(hit),
        }
    }

    pub fn count(&self, query: &EqualityQuery) -> u64 {
        self.genotypes.iter().filter(|row| self.matches(row, query)).count() as u64
    }

    /// (Σ genotype[snp] over matches, 2 × matches).
    pub fn maf(&self, snp: usize, query: &EqualityQuery) -> (i64, u64) {
        let rows: Vec<usize> = (0..self.num_rows()).filter(|&r| self.matches(&self.genotypes[r], query)).collect();
        self.maf_over(snp, &rows)
    }

    fn maf_over(&self, snp: usize, rows: &[usize]) -> (i64, u64) {
        let alleles = rows.iter().map(|&r| self.genotypes[r].get(snp).copied().unwrap_or(0)).sum();
        (alleles, 2 * rows.len() as u64)
    }

    pub fn prs(&self, weights: &[PrsWeight]) -> Vec<i64> {
        self.genotypes
            .iter()
            .map(|row| weights.iter().map(|w| w.weight * row.get(w.column).copied().unwrap_or(0)).sum())
            .collect()
    }

    /// (within ∧ outcome = 1, within ∧ outcome = 0) for Σ (g_i - t_i)² < threshold.
    pub fn similarity(&self, target: &[i64], threshold: u64, outcome_column: usize) -> Result<(u64, u64)> {
        if self.binary_pheno.len() != self.num_rows() {
            return Err(CohortError::UnsupportedOperation("binary phenotype data has not been set".into()));
        }
        let mut with = 0;
        let mut without = 0;
        for (row, pheno) in self.genotypes.iter().zip(&self.binary_pheno) {
            let score: i64 = target.iter().enumerate().map(|(i, t)| (row[i] - t).pow(2)).sum();
            if score < threshold as i64 {
                match pheno.get(outcome_column) {
                    Some(1) => with += 1,
                    _ => without += 1,
                }
            }
        }
        Ok((with, without))
    }

    fn in_range(&self, lower: u64, upper: u64, column: usize) -> Result<Vec<usize>> {
        if self.continuous_pheno.len() != self.num_rows() {
            return Err(CohortError::UnsupportedOperation("continuous phenotype data has not been set".into()));
        }
        Ok(self
            .continuous_pheno
            .iter()
            .enumerate()
            .filter(|(_, row)| {
                let v = row[column];
                v >= lower as i64 && v < upper as i64
            })
            .map(|(r, _)| r)
            .collect())
    }

    pub fn counting_range(&self, lower: u64, upper: u64, column: usize) -> Result<u64> {
        Ok(self.in_range(lower, upper, column)?.len() as u64)
    }

    pub fn maf_range(&self, snp: usize, lower: u64, upper: u64, column: usize) -> Result<(i64, u64)> {
        Ok(self.maf_over(snp, &self.in_range(lower, upper, column)?))
    }

    // ----------------------------------------------------------------
    // DML mirror
    // ----------------------------------------------------------------

    pub fn update_one_value(&mut self, row: usize, column: usize, delta: i64) {
        if let Some(cell) = self.genotypes.get_mut(row).and_then(|r| r.get_mut(column)) {
            *cell += delta;
        }
    }

    pub fn update_one_row(&mut self, row: usize, deltas: &[i64]) {
        for (column, &delta) in deltas.iter().enumerate() {
            self.update_one_value(row, column, delta);
        }
    }

    /// Phenotypes of inserted rows are zero, as in the encrypted store.
    pub fn insert_one_row(&mut self, values: &[i64]) -> usize {
        self.genotypes.push(values.to_vec());
        for pheno in [&mut self.binary_pheno, &mut self.continuous_pheno] {
            if let Some(width) = pheno.first().map(Vec::len) {
                pheno.push(vec![0; width]);
            }
        }
        self.genotypes.len() - 1
    }

    pub fn delete_row_addition(&mut self, row: usize, current_values: &[i64]) {
        let negated: Vec<i64> = current_values.iter().map(|v| -v).collect();
        self.update_one_row(row, &negated);
    }

    /// The row reads as missing (-1) in every genotype column.
    pub fn delete_row_multiplication(&mut self, row: usize) {
        if let Some(r) = self.genotypes.get_mut(row) {
            r.iter_mut().for_each(|v| *v = -1);
        }
        self.num_deletes += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario() -> PlaintextDatabase {
        let snp0 = [0, 0, 0, 1, 1, 1, 2, 2, 2, 0];
        let snp1 = [0, 1, 2, 0, 1, 2, 0, 1, 2, 1];
        let pheno = [0, 0, 0, 0, 1, 1, 0, 1, 0, 0];
        PlaintextDatabase::new((0..10).map(|r| vec![snp0[r], snp1[r]]).collect())
            .with_binary_pheno(pheno.iter().map(|&p| vec![p]).collect())
    }

    #[test]
    fn test_scenario_queries() {
        let db = scenario();
        let and = EqualityQuery::and(vec![EqualityTerm::new(0, 0), EqualityTerm::new(1, 1)]);
        let or = EqualityQuery::or(vec![EqualityTerm::new(0, 1), EqualityTerm::new(1, 2)]);
        assert_eq!(db.count(&and), 2);
        assert_eq!(db.count(&or), 5);
        assert_eq!(db.maf(1, &and), (2, 4));
        assert_eq!(db.similarity(&[2, 2], 4, 0).unwrap(), (3, 1));
        assert_eq!(db.prs(&[PrsWeight::new(0, 2), PrsWeight::new(1, -1)])[6], 4);
    }

    #[test]
    fn test_dml_mirror() {
        let mut db = scenario();
        db.delete_row_multiplication(6);
        assert_eq!(db.genotypes()[6], vec![-1, -1]);
        // rows 0 and 3 still have snp1 = 0
        assert_eq!(db.count(&EqualityQuery::and(vec![EqualityTerm::new(1, 0)])), 2);
        assert_eq!(db.insert_one_row(&[2, 2]), 10);
        assert_eq!(db.similarity(&[2, 2], 1, 0).unwrap(), (0, 2));
        db.delete_row_addition(10, &[2, 2]);
        assert_eq!(db.genotypes()[10], vec![0, 0]);
        assert_eq!(db.num_deletes(), 1);
    }
}
