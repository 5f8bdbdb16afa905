use std::collections::HashMap;

use crate::bfv::Ciphertext;
use crate::error::{CohortError, Result};
use crate::store::{check_access, check_shape, ColumnKind, ColumnStore, ValueBounds};

/// In-memory SIMD column store. With `slots = 1` it is the single-slot store.
#[derive(Clone, Debug)]
pub struct MemoryColumnStore {
    slots: usize,
    rows: usize,
    data: HashMap<ColumnKind, Vec<Vec<Ciphertext>>>,
    bounds: HashMap<ColumnKind, Vec<ValueBounds>>,
}

impl MemoryColumnStore {
    pub fn new(slots: usize) -> Self {
        Self { slots: slots.max(1), rows: 0, data: HashMap::new(), bounds: HashMap::new() }
    }
}

impl ColumnStore for MemoryColumnStore {
    fn slots(&self) -> usize {
        self.slots
    }

    fn num_rows(&self) -> usize {
        self.rows
    }

    fn set_num_rows(&mut self, rows: usize) -> Result<()> {
        self.rows = rows;
        Ok(())
    }

    fn columns(&self, kind: ColumnKind) -> usize {
        self.data.get(&kind).map_or(0, Vec::len)
    }

    fn is_set(&self, kind: ColumnKind) -> bool {
        self.data.contains_key(&kind)
    }

    fn get(&self, kind: ColumnKind, column: usize, compressed_row: usize) -> Result<Ciphertext> {
        let data = self.data.get(&kind);
        let stored = data.and_then(|cols| cols.get(column)).map_or(0, Vec::len);
        check_access(kind, column, compressed_row, data.map(Vec::len), stored)?;
        data.and_then(|cols| cols.get(column))
            .and_then(|col| col.get(compressed_row))
            .cloned()
            .ok_or_else(|| CohortError::InvalidArgument(format!("{kind} ({column}, {compressed_row}) missing")))
    }

    fn put(&mut self, kind: ColumnKind, column: usize, compressed_row: usize, ct: Ciphertext) -> Result<()> {
        let cols = self.data.get_mut(&kind).ok_or_else(|| {
            CohortError::InvalidArgument(format!("{kind} data has not been set"))
        })?;
        let count = cols.len();
        let col = cols.get_mut(column).ok_or_else(|| {
            CohortError::InvalidArgument(format!("{kind} column {column} out of range (have {count})"))
        })?;
        match compressed_row.cmp(&col.len()) {
            std::cmp::Ordering::Less => col[compressed_row] = ct,
            std::cmp::Ordering::Equal => col.push(ct),
            std::cmp::Ordering::Greater => {
                return Err(CohortError::InvalidArgument(format!(
                    "{kind} compressed row {compressed_row} out of range (have {})",
                    col.len()
                )))
            }
        }
        Ok(())
    }

    fn load_columns(&mut self, kind: ColumnKind, columns: Vec<Vec<Ciphertext>>) -> Result<()> {
        check_shape(kind, &columns)?;
        self.data.insert(kind, columns);
        Ok(())
    }

    fn bounds(&self, kind: ColumnKind) -> Option<&[ValueBounds]> {
        self.bounds.get(&kind).map(Vec::as_slice)
    }

    fn set_bounds(&mut self, kind: ColumnKind, bounds: Vec<ValueBounds>) -> Result<()> {
        self.bounds.insert(kind, bounds);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;
    use crate::context::CryptoContext;
    use crate::params::presets::toy;

    #[test]
    fn test_get_put_append() {
        let mut rng = ChaCha20Rng::seed_from_u64(31);
        let ctx = CryptoContext::with_rng(&toy().unwrap(), &mut rng).unwrap();
        let mut store = MemoryColumnStore::new(ctx.slots());
        assert!(!store.is_set(ColumnKind::Genotype));
        assert!(store.genotype(0, 0).is_err());

        let a = ctx.encrypt(&[1, 2]).unwrap();
        let b = ctx.encrypt(&[3, 4]).unwrap();
        store.load_columns(ColumnKind::Genotype, vec![vec![a.clone()], vec![b.clone()]]).unwrap();
        store.set_num_rows(2).unwrap();
        assert_eq!(store.columns(ColumnKind::Genotype), 2);
        assert_eq!(store.compressed_rows(), 1);
        assert_eq!(ctx.decrypt(&store.genotype(1, 0).unwrap()).unwrap()[..2], [3u64, 4]);

        store.set_genotype(a.clone(), 1, 0).unwrap();
        assert_eq!(ctx.decrypt(&store.genotype(1, 0).unwrap()).unwrap()[..2], [1u64, 2]);
        store.set_genotype(b, 1, 1).unwrap();
        assert!(store.set_genotype(a, 1, 3).is_err());
        assert!(store.genotype(2, 0).is_err());
        assert!(store.binary_pheno(0, 0).is_err());
    }

    #[test]
    fn test_rejects_ragged_load() {
        let mut rng = ChaCha20Rng::seed_from_u64(32);
        let ctx = CryptoContext::with_rng(&toy().unwrap(), &mut rng).unwrap();
        let mut store = MemoryColumnStore::new(ctx.slots());
        let ct = ctx.zero();
        let ragged = vec![vec![ct.clone(), ct.clone()], vec![ct]];
        assert!(store.load_columns(ColumnKind::Genotype, ragged).is_err());
        assert!(store.load_columns(ColumnKind::Genotype, Vec::new()).is_err());
    }
}
