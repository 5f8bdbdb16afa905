//! # cohort-fhe: encrypted cohort statistics over batched BFV
//!
//! A data owner encrypts a genotype/phenotype table column by column, one
//! individual per plaintext slot. The server answers count, MAF, PRS,
//! similarity and range queries without decrypting, and re-keys each result
//! for the client that asked.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use cohort_fhe::prelude::*;
//!
//! let params = cohort_fhe::params::presets::toy().unwrap();
//! let ctx = Arc::new(CryptoContext::generate(&params).unwrap());
//! let mut db = EncryptedDatabase::new(ctx.clone(), MemoryColumnStore::new(ctx.slots())).unwrap();
//! db.set_genotypes(&[vec![0, 1], vec![1, 1], vec![2, 0]]).unwrap();
//!
//! let engine = QueryEngine::new(&db, EngineConfig::default()).unwrap();
//! let query = EqualityQuery::and(vec![EqualityTerm::new(1, 1)]);
//! let count = engine.count_query(&query).unwrap();
//! assert_eq!(count.decrypt(&ctx).unwrap(), 2);
//! ```

pub mod error;
pub mod params;
pub mod ring;
pub mod sampling;
pub mod bfv;
pub mod config;
pub mod context;
pub mod store;
pub mod database;
pub mod query;
pub mod gate;
pub mod oracle;

/// Convenient re-exports for common types and functions.
pub mod prelude {
    pub use crate::error::{CohortError, Result};
    pub use crate::params::{BfvParams, BfvParamsBuilder};
    pub use crate::bfv::{Ciphertext, PublicKey, SecretKey};
    pub use crate::config::{EngineConfig, SchemeConfig};
    pub use crate::context::CryptoContext;
    pub use crate::store::{ColumnKind, ColumnStore, DiskColumnStore, MemoryColumnStore, ValueBounds};
    pub use crate::database::EncryptedDatabase;
    pub use crate::query::{
        Connective, Denominator, EqualityQuery, EqualityTerm, InterpolationComparator, MafAggregate,
        PrsResult, PrsWeight, QueryEngine, RangeComparator, SimilarityAggregate, Squashed,
    };
    pub use crate::gate::{ClientKeys, KeySwitchGate};
    pub use crate::oracle::PlaintextDatabase;
}
