//! JSON-loadable configuration for the scheme and the query engine.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use serde::{Deserialize, Serialize};

use crate::error::{CohortError, Result};
use crate::params::{BfvParams, BfvParamsBuilder};

/// Scheme parameters in serializable form.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemeConfig {
    pub ring_degree: usize,
    pub plain_modulus: u64,
    pub ct_prime_bits: u32,
    pub ct_prime_count: usize,
    pub sigma: f64,
    pub gadget_base_bits: u32,
    /// Logical slots per ciphertext; defaults to n/2. 1 gives the single-slot store.
    pub slots: Option<usize>,
}

impl Default for SchemeConfig {
    fn default() -> Self {
        Self {
            ring_degree: 1024,
            plain_modulus: 65537,
            ct_prime_bits: 55,
            ct_prime_count: 10,
            sigma: 3.2,
            gadget_base_bits: 12,
            slots: None,
        }
    }
}

impl SchemeConfig {
    /// Tiny ring for tests: n = 16, 8 slots.
    pub fn toy() -> Self {
        Self { ring_degree: 16, ct_prime_count: 8, gadget_base_bits: 8, ..Self::default() }
    }

    pub fn build_params(&self) -> Result<Arc<BfvParams>> {
        let mut builder = BfvParamsBuilder::new()
            .ring_degree(self.ring_degree)
            .plain_modulus(self.plain_modulus)
            .ct_primes(self.ct_prime_bits, self.ct_prime_count)
            .sigma(self.sigma)
            .gadget_base_bits(self.gadget_base_bits);
        if let Some(slots) = self.slots {
            builder = builder.slots(slots);
        }
        builder.build()
    }
}

/// Query engine settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Parameters for building a new context. An engine over an existing
    /// database takes its parameters from the database context instead.
    pub scheme: SchemeConfig,
    /// Squash stops early once fewer bits than this remain.
    pub early_termination_floor: f64,
    /// Fixed number of squash steps; `None` uses the database chunking factor.
    pub reduction_depth: Option<u32>,
    /// Destructive deletes tolerated before similarity queries are refused.
    pub delete_limit: usize,
    /// Worker threads for the sharded query variants.
    pub threads: usize,
    /// Value domain of the range comparator; `None` disables range and similarity queries.
    ///
    /// Similarity over k dimensions needs a domain above 9k. Range queries need
    /// it above the column's largest value.
    pub comparator_domain: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scheme: SchemeConfig::default(),
            early_termination_floor: 50.0,
            reduction_depth: None,
            delete_limit: 5,
            threads: 4,
            comparator_domain: None,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|source| CohortError::StorageIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Checks that need no database. `QueryEngine::new` repeats the domain check
    /// against the database's own modulus.
    pub fn validate(&self) -> Result<()> {
        if self.threads == 0 {
            return Err(CohortError::Config("threads must be at least 1".into()));
        }
        if !self.early_termination_floor.is_finite() || self.early_termination_floor < 0.0 {
            return Err(CohortError::Config(format!(
                "early termination floor must be a non-negative number, got {}",
                self.early_termination_floor
            )));
        }
        if let Some(domain) = self.comparator_domain {
            if domain < 2 || domain >= self.scheme.plain_modulus {
                return Err(CohortError::Config(format!(
                    "comparator domain must be in 2..{}, got {domain}",
                    self.scheme.plain_modulus
                )));
            }
        }
        Ok(())
    }
}
