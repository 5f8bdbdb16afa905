use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bfv::Ciphertext;
use crate::error::{CohortError, Result};
use crate::params::BfvParams;
use crate::store::{check_access, check_shape, ColumnKind, ColumnStore, ValueBounds};

const MANIFEST: &str = "manifest.json";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct Manifest {
    slots: usize,
    rows: usize,
    /// Per kind: compressed rows stored for each column.
    shapes: Vec<(ColumnKind, Vec<usize>)>,
    #[serde(default)]
    bounds: Vec<(ColumnKind, Vec<ValueBounds>)>,
}

/// Disk-backed column store: one bincode file per (kind, column, compressed row).
///
/// Reads are synchronous and uncached. A missing or unreadable file fails the
/// calling query with `StorageIo`.
pub struct DiskColumnStore {
    root: PathBuf,
    params: Arc<BfvParams>,
    rows: usize,
    shapes: HashMap<ColumnKind, Vec<usize>>,
    bounds: HashMap<ColumnKind, Vec<ValueBounds>>,
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> CohortError + '_ {
    move |source| CohortError::StorageIo { path: path.to_path_buf(), source }
}

impl DiskColumnStore {
    /// Start an empty store under `root`, creating the directory.
    pub fn create(root: impl Into<PathBuf>, params: &Arc<BfvParams>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(io_err(&root))?;
        let store = Self {
            root,
            params: params.clone(),
            rows: 0,
            shapes: HashMap::new(),
            bounds: HashMap::new(),
        };
        store.write_manifest()?;
        Ok(store)
    }

    /// Reopen a store written earlier with the same parameters.
    pub fn open(root: impl Into<PathBuf>, params: &Arc<BfvParams>) -> Result<Self> {
        let root = root.into();
        let path = root.join(MANIFEST);
        let text = fs::read_to_string(&path).map_err(io_err(&path))?;
        let manifest: Manifest = serde_json::from_str(&text)
            .map_err(|e| CohortError::Serialization(format!("{}: {e}", path.display())))?;
        if manifest.slots != params.slots {
            return Err(CohortError::DimensionMismatch { expected: params.slots, got: manifest.slots });
        }
        Ok(Self {
            root,
            params: params.clone(),
            rows: manifest.rows,
            shapes: manifest.shapes.into_iter().collect(),
            bounds: manifest.bounds.into_iter().collect(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, kind: ColumnKind, column: usize, compressed_row: usize) -> PathBuf {
        self.root.join(kind.name()).join(format!("{column:05}-{compressed_row:05}.ct"))
    }

    fn write_manifest(&self) -> Result<()> {
        let mut shapes: Vec<_> = self.shapes.iter().map(|(k, v)| (*k, v.clone())).collect();
        shapes.sort_by_key(|(k, _)| k.name());
        let mut bounds: Vec<_> = self.bounds.iter().map(|(k, v)| (*k, v.clone())).collect();
        bounds.sort_by_key(|(k, _)| k.name());
        let manifest = Manifest { slots: self.params.slots, rows: self.rows, shapes, bounds };
        let path = self.root.join(MANIFEST);
        let text = serde_json::to_string_pretty(&manifest)?;
        fs::write(&path, text).map_err(io_err(&path))
    }

    fn write_ct(path: &Path, ct: &Ciphertext) -> Result<()> {
        fs::write(path, ct.to_bytes()?).map_err(io_err(path))
    }
}

impl ColumnStore for DiskColumnStore {
    fn slots(&self) -> usize {
        self.params.slots
    }

    fn num_rows(&self) -> usize {
        self.rows
    }

    fn set_num_rows(&mut self, rows: usize) -> Result<()> {
        self.rows = rows;
        self.write_manifest()
    }

    fn columns(&self, kind: ColumnKind) -> usize {
        self.shapes.get(&kind).map_or(0, Vec::len)
    }

    fn is_set(&self, kind: ColumnKind) -> bool {
        self.shapes.contains_key(&kind)
    }

    fn get(&self, kind: ColumnKind, column: usize, compressed_row: usize) -> Result<Ciphertext> {
        let shape = self.shapes.get(&kind);
        let stored = shape.and_then(|s| s.get(column)).copied().unwrap_or(0);
        check_access(kind, column, compressed_row, shape.map(Vec::len), stored)?;
        let path = self.path_for(kind, column, compressed_row);
        let bytes = fs::read(&path).map_err(io_err(&path))?;
        Ciphertext::from_bytes(&self.params, &bytes)
    }

    fn put(&mut self, kind: ColumnKind, column: usize, compressed_row: usize, ct: Ciphertext) -> Result<()> {
        let shape = self.shapes.get(&kind).ok_or_else(|| {
            CohortError::InvalidArgument(format!("{kind} data has not been set"))
        })?;
        let stored = *shape.get(column).ok_or_else(|| {
            CohortError::InvalidArgument(format!("{kind} column {column} out of range (have {})", shape.len()))
        })?;
        if compressed_row > stored {
            return Err(CohortError::InvalidArgument(format!(
                "{kind} compressed row {compressed_row} out of range (have {stored})"
            )));
        }
        Self::write_ct(&self.path_for(kind, column, compressed_row), &ct)?;
        if compressed_row == stored {
            if let Some(count) = self.shapes.get_mut(&kind).and_then(|s| s.get_mut(column)) {
                *count += 1;
            }
            self.write_manifest()?;
        }
        Ok(())
    }

    fn load_columns(&mut self, kind: ColumnKind, columns: Vec<Vec<Ciphertext>>) -> Result<()> {
        let rows = check_shape(kind, &columns)?;
        let dir = self.root.join(kind.name());
        if dir.exists() {
            fs::remove_dir_all(&dir).map_err(io_err(&dir))?;
        }
        fs::create_dir_all(&dir).map_err(io_err(&dir))?;

        // every worker writes its own column's files
        columns.par_iter().enumerate().try_for_each(|(c, column)| {
            column.iter().enumerate().try_for_each(|(r, ct)| {
                Self::write_ct(&self.path_for(kind, c, r), ct)
            })
        })?;

        debug!(kind = kind.name(), columns = columns.len(), compressed_rows = rows, "wrote columns to disk");
        self.shapes.insert(kind, vec![rows; columns.len()]);
        self.write_manifest()
    }

    fn bounds(&self, kind: ColumnKind) -> Option<&[ValueBounds]> {
        self.bounds.get(&kind).map(Vec::as_slice)
    }

    fn set_bounds(&mut self, kind: ColumnKind, bounds: Vec<ValueBounds>) -> Result<()> {
        self.bounds.insert(kind, bounds);
        self.write_manifest()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;
    use tempfile::tempdir;
    use crate::context::CryptoContext;
    use crate::params::presets::toy;

    #[test]
    fn test_round_trip_and_reopen() {
        let dir = tempdir().unwrap();
        let params = toy().unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(41);
        let ctx = CryptoContext::with_rng(&params, &mut rng).unwrap();

        let mut store = DiskColumnStore::create(dir.path().join("db"), &params).unwrap();
        let cols = vec![
            vec![ctx.encrypt(&[1, 2, 3]).unwrap()],
            vec![ctx.encrypt(&[4, 5, 6]).unwrap()],
        ];
        store.load_columns(ColumnKind::Genotype, cols).unwrap();
        store.set_num_rows(3).unwrap();
        store.set_genotype(ctx.encrypt(&[7]).unwrap(), 0, 1).unwrap();
        let bounds = vec![ValueBounds { min: 1, max: 7 }, ValueBounds { min: 4, max: 6 }];
        store.set_bounds(ColumnKind::Genotype, bounds.clone()).unwrap();

        let reopened = DiskColumnStore::open(dir.path().join("db"), &params).unwrap();
        assert_eq!(reopened.num_rows(), 3);
        assert_eq!(reopened.columns(ColumnKind::Genotype), 2);
        assert_eq!(ctx.decrypt(&reopened.genotype(1, 0).unwrap()).unwrap()[..3], [4u64, 5, 6]);
        assert_eq!(ctx.decrypt(&reopened.genotype(0, 1).unwrap()).unwrap()[0], 7);
        assert!(reopened.genotype(1, 1).is_err());
        assert_eq!(reopened.bounds(ColumnKind::Genotype), Some(bounds.as_slice()));
        assert_eq!(reopened.bounds(ColumnKind::ContinuousPheno), None);
    }

    #[test]
    fn test_missing_file_is_storage_error() {
        let dir = tempdir().unwrap();
        let params = toy().unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        let ctx = CryptoContext::with_rng(&params, &mut rng).unwrap();
        let mut store = DiskColumnStore::create(dir.path(), &params).unwrap();
        store.load_columns(ColumnKind::BinaryPheno, vec![vec![ctx.zero()]]).unwrap();
        store.set_num_rows(1).unwrap();

        fs::remove_file(store.path_for(ColumnKind::BinaryPheno, 0, 0)).unwrap();
        assert!(matches!(store.binary_pheno(0, 0), Err(CohortError::StorageIo { .. })));
        assert!(matches!(store.genotype(0, 0), Err(CohortError::InvalidArgument(_))));
    }

    #[test]
    fn test_open_without_manifest_fails() {
        let dir = tempdir().unwrap();
        let params = toy().unwrap();
        assert!(matches!(
            DiskColumnStore::open(dir.path(), &params),
            Err(CohortError::StorageIo { .. })
        ));
    }
}
