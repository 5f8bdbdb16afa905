use std::sync::Arc;

use crate::error::{CohortError, Result};
use crate::params::BfvParams;
use crate::ring::modular::{barrett_constant, mod_add, mod_inv, mod_mul, mod_pow, primitive_root_2n};
use crate::ring::poly::CoeffPoly;

/// SIMD encoder for Z_p[X]/(X^n+1) with p ≡ 1 (mod 2n).
///
/// Slot j of row 0 holds m(ζ^{3^j}) and slot j of row 1 holds m(ζ^{-3^j}),
/// so the automorphism X ↦ X^{3^k} rotates each row left by k. Queries only
/// use row 0 slots [0, S); everything else encodes to zero.
#[derive(Clone, Debug)]
pub struct BatchEncoder {
    params: Arc<BfvParams>,
    /// ζ^e for e in 0..2n
    zeta_pows: Vec<u64>,
    /// Odd exponent 3^j mod 2n of row-0 slot j.
    slot_exps: Vec<usize>,
    n_inv: u64,
    barrett_k: u64,
}

impl BatchEncoder {
    pub fn new(params: &Arc<BfvParams>) -> Result<Self> {
        let n = params.ring_degree;
        let p = params.plain_modulus;
        let zeta = primitive_root_2n(n, p).ok_or_else(|| {
            CohortError::InvalidParam(format!("no primitive {}-th root of unity mod {p}", 2 * n))
        })?;
        let barrett_k = barrett_constant(p);
        let mut zeta_pows = Vec::with_capacity(2 * n);
        let mut acc = 1u64;
        for _ in 0..2 * n {
            zeta_pows.push(acc);
            acc = mod_mul(acc, zeta, p, barrett_k);
        }
        let two_n = 2 * n as u64;
        let slot_exps = (0..params.row_size())
            .map(|j| mod_pow(3, j as u64, two_n) as usize)
            .collect();
        let n_inv = mod_inv(n as u64 % p, p)
            .ok_or_else(|| CohortError::InvalidParam("ring degree not invertible mod p".into()))?;
        Ok(Self { params: params.clone(), zeta_pows, slot_exps, n_inv, barrett_k })
    }

    pub fn params(&self) -> &Arc<BfvParams> {
        &self.params
    }

    pub fn slots(&self) -> usize {
        self.params.slots
    }

    /// Encode up to S values into row 0; missing slots are zero.
    ///
    /// m_i = n⁻¹ · Σ_j v_j · ζ^{-e_j·i}: the inverse negacyclic DFT restricted
    /// to the non-zero slots.
    pub fn encode(&self, values: &[u64]) -> Result<CoeffPoly> {
        let s = self.params.slots;
        if values.len() > s {
            return Err(CohortError::DimensionMismatch { expected: s, got: values.len() });
        }
        let n = self.params.ring_degree;
        let p = self.params.plain_modulus;
        let two_n = 2 * n;
        let mut coeffs = vec![0u64; n];
        for (&v, &e) in values.iter().zip(&self.slot_exps) {
            let v = v % p;
            if v == 0 {
                continue;
            }
            for (i, c) in coeffs.iter_mut().enumerate() {
                let exp = (two_n - (e * i) % two_n) % two_n;
                *c = mod_add(*c, mod_mul(v, self.zeta_pows[exp], p, self.barrett_k), p);
            }
        }
        for c in coeffs.iter_mut() {
            *c = mod_mul(*c, self.n_inv, p, self.barrett_k);
        }
        Ok(CoeffPoly { coeffs, modulus: p })
    }

    /// Encode signed values, reducing them into [0, p).
    pub fn encode_signed(&self, values: &[i64]) -> Result<CoeffPoly> {
        let p = self.params.plain_modulus as i64;
        let reduced: Vec<u64> = values.iter().map(|&v| v.rem_euclid(p) as u64).collect();
        self.encode(&reduced)
    }

    /// Decode the S logical slots of row 0.
    pub fn decode(&self, pt: &CoeffPoly) -> Vec<u64> {
        let p = self.params.plain_modulus;
        let two_n = 2 * self.params.ring_degree;
        self.slot_exps[..self.params.slots]
            .iter()
            .map(|&e| {
                pt.coeffs.iter().enumerate().fold(0u64, |acc, (i, &c)| {
                    if c == 0 {
                        return acc;
                    }
                    mod_add(acc, mod_mul(c, self.zeta_pows[(e * i) % two_n], p, self.barrett_k), p)
                })
            })
            .collect()
    }

    /// Decode into centered values in (-p/2, p/2].
    pub fn decode_signed(&self, pt: &CoeffPoly) -> Vec<i64> {
        let p = self.params.plain_modulus;
        self.decode(pt)
            .into_iter()
            .map(|v| crate::ring::modular::center(v, p))
            .collect()
    }

    /// `value` in every logical slot.
    pub fn constant(&self, value: u64) -> Result<CoeffPoly> {
        self.encode(&vec![value; self.params.slots])
    }

    /// Indicator of the slot window [start, end) within the logical slots.
    pub fn mask(&self, start: usize, end: usize) -> Result<CoeffPoly> {
        let s = self.params.slots;
        if start > end || end > s {
            return Err(CohortError::InvalidArgument(format!(
                "mask window [{start}, {end}) outside 0..{s}"
            )));
        }
        let mut values = vec![0u64; end];
        for v in values[start..].iter_mut() {
            *v = 1;
        }
        self.encode(&values)
    }

    /// `value` at one slot, zero elsewhere.
    pub fn one_hot(&self, slot: usize, value: u64) -> Result<CoeffPoly> {
        let s = self.params.slots;
        if slot >= s {
            return Err(CohortError::InvalidArgument(format!("slot {slot} outside 0..{s}")));
        }
        let mut values = vec![0u64; slot + 1];
        values[slot] = value;
        self.encode(&values)
    }
}
