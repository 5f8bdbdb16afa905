pub mod keygen;
pub mod encrypt;
pub mod eval;
pub mod encoding;
pub mod keyswitch;
pub mod noise;

pub use keygen::{GaloisKeys, PublicKey, RelinKey, SecretKey};
pub use encrypt::{decrypt, encrypt_pk, encrypt_sk, measure_budget};
pub use eval::{
    bfv_add, bfv_add_plain, bfv_mul_and_relin, bfv_mul_plain, bfv_mul_scalar, bfv_neg,
    bfv_rotate_left, bfv_rotate_right, bfv_sub,
};
pub use encoding::BatchEncoder;
pub use keyswitch::KeySwitchKey;

use std::sync::Arc;
use serde::{Deserialize, Serialize};

use crate::error::{CohortError, Result};
use crate::params::BfvParams;
use crate::ring::ntt::NttPoly;
use crate::ring::rns::RnsPoly;

/// A BFV ciphertext (c0, c1[, c2]) over the batched plaintext ring.
///
/// `noise_bits` is a conservative estimate of log2 of the invariant noise,
/// updated by every homomorphic operation. It only grows.
#[derive(Clone, Debug)]
pub struct Ciphertext {
    pub c: Vec<RnsPoly>,
    pub params: Arc<BfvParams>,
    pub noise_bits: f64,
}

#[derive(Serialize, Deserialize)]
struct CiphertextWire {
    ring_degree: usize,
    moduli: Vec<u64>,
    noise_bits: f64,
    /// components × primes × evaluations
    evals: Vec<Vec<Vec<u64>>>,
}

impl Ciphertext {
    pub fn degree(&self) -> usize {
        self.c.len() - 1
    }

    /// Estimated bits of headroom left before decryption fails.
    pub fn remaining_budget(&self) -> f64 {
        self.params.log2_delta() - self.noise_bits - 1.0
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let wire = CiphertextWire {
            ring_degree: self.params.ring_degree,
            moduli: self.params.ct_basis.moduli.clone(),
            noise_bits: self.noise_bits,
            evals: self.c.iter()
                .map(|poly| poly.components.iter().map(|c| c.evals.clone()).collect())
                .collect(),
        };
        Ok(bincode::serialize(&wire)?)
    }

    /// Decode a ciphertext produced under the same parameters.
    pub fn from_bytes(params: &Arc<BfvParams>, bytes: &[u8]) -> Result<Self> {
        let wire: CiphertextWire = bincode::deserialize(bytes)?;
        let basis = &params.ct_basis;
        if wire.ring_degree != params.ring_degree || wire.moduli != basis.moduli {
            return Err(CohortError::ModulusMismatch);
        }
        if wire.evals.len() < 2 {
            return Err(CohortError::Serialization(format!(
                "ciphertext needs at least 2 components, got {}",
                wire.evals.len()
            )));
        }
        let mut c = Vec::with_capacity(wire.evals.len());
        for residues in wire.evals {
            if residues.len() != basis.num_moduli() {
                return Err(CohortError::DimensionMismatch {
                    expected: basis.num_moduli(),
                    got: residues.len(),
                });
            }
            let mut components = Vec::with_capacity(residues.len());
            for ((evals, &q), plan) in residues.into_iter().zip(&basis.moduli).zip(&basis.plans) {
                if evals.len() != params.ring_degree {
                    return Err(CohortError::DimensionMismatch {
                        expected: params.ring_degree,
                        got: evals.len(),
                    });
                }
                if evals.iter().any(|&e| e >= q) {
                    return Err(CohortError::Serialization("residue out of range".into()));
                }
                components.push(NttPoly { evals, modulus: q, plan: plan.clone() });
            }
            c.push(RnsPoly { components, ring_degree: params.ring_degree });
        }
        Ok(Self { c, params: params.clone(), noise_bits: wire.noise_bits })
    }
}
