pub mod presets;

use std::sync::Arc;
use num_bigint::BigUint;
use num_traits::One;
use tracing::debug;

use crate::error::{CohortError, Result};
use crate::ring::modular::{is_prime, ntt_primes};
use crate::ring::rns::RnsBasis;

/// Parameters for batched BFV.
///
/// The plaintext ring Z_p[X]/(X^n+1) splits into n slots because p ≡ 1 (mod 2n);
/// the first row of n/2 slots is the one queries compute on, and only its
/// first `slots` lanes ever hold data.
#[derive(Clone, Debug)]
pub struct BfvParams {
    /// Ring degree n (power of 2, at least 16).
    pub ring_degree: usize,
    /// Plaintext modulus p.
    pub plain_modulus: u64,
    /// Logical slot count S ≤ n/2.
    pub slots: usize,
    /// Ciphertext modulus Q = ∏ q_i.
    pub ct_basis: Arc<RnsBasis>,
    /// Q ∪ P, large enough to hold an unreduced tensor product exactly.
    pub mul_basis: Arc<RnsBasis>,
    /// Gaussian noise standard deviation.
    pub sigma: f64,
    /// Gadget base is 2^gadget_base_bits.
    pub gadget_base_bits: u32,
    /// Number of balanced gadget digits covering Q.
    pub gadget_digits: usize,
}

impl BfvParams {
    /// Physical lanes in one rotation row (n/2).
    pub fn row_size(&self) -> usize {
        self.ring_degree / 2
    }

    pub fn gadget_base(&self) -> u64 {
        1u64 << self.gadget_base_bits
    }

    pub fn log2_q(&self) -> f64 {
        self.ct_basis.log2_product()
    }

    /// log2(Q/p): the noise headroom of a noiseless ciphertext.
    pub fn log2_delta(&self) -> f64 {
        self.log2_q() - (self.plain_modulus as f64).log2()
    }

    /// Same ring and moduli; keys and ciphertexts are interchangeable.
    pub fn is_compatible(&self, other: &BfvParams) -> bool {
        self.ring_degree == other.ring_degree
            && self.plain_modulus == other.plain_modulus
            && self.ct_basis.moduli == other.ct_basis.moduli
    }

    /// Copy of these parameters with a different logical slot count.
    pub fn with_slots(&self, slots: usize) -> Result<Arc<BfvParams>> {
        validate_slots(slots, self.ring_degree)?;
        Ok(Arc::new(BfvParams { slots, ..self.clone() }))
    }
}

fn validate_slots(slots: usize, ring_degree: usize) -> Result<()> {
    if slots == 0 || slots > ring_degree / 2 {
        return Err(CohortError::InvalidParam(format!(
            "slot count must be in 1..={}, got {slots}",
            ring_degree / 2
        )));
    }
    Ok(())
}

/// Builder for BfvParams.
pub struct BfvParamsBuilder {
    ring_degree: usize,
    plain_modulus: u64,
    slots: Option<usize>,
    ct_moduli: Vec<u64>,
    ct_prime_bits: u32,
    ct_prime_count: usize,
    sigma: f64,
    gadget_base_bits: u32,
}

impl Default for BfvParamsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BfvParamsBuilder {
    pub fn new() -> Self {
        Self {
            ring_degree: 1024,
            plain_modulus: 65537,
            slots: None,
            ct_moduli: Vec::new(),
            ct_prime_bits: 55,
            ct_prime_count: 8,
            sigma: 3.2,
            gadget_base_bits: 8,
        }
    }

    pub fn ring_degree(mut self, n: usize) -> Self {
        self.ring_degree = n;
        self
    }

    pub fn plain_modulus(mut self, p: u64) -> Self {
        self.plain_modulus = p;
        self
    }

    pub fn slots(mut self, slots: usize) -> Self {
        self.slots = Some(slots);
        self
    }

    /// Use these primes for Q instead of generating them.
    pub fn ct_moduli(mut self, moduli: Vec<u64>) -> Self {
        self.ct_moduli = moduli;
        self
    }

    /// Generate `count` primes of `bits` bits for Q.
    pub fn ct_primes(mut self, bits: u32, count: usize) -> Self {
        self.ct_prime_bits = bits;
        self.ct_prime_count = count;
        self
    }

    pub fn sigma(mut self, sigma: f64) -> Self {
        self.sigma = sigma;
        self
    }

    pub fn gadget_base_bits(mut self, bits: u32) -> Self {
        self.gadget_base_bits = bits;
        self
    }

    pub fn build(self) -> Result<Arc<BfvParams>> {
        let n = self.ring_degree;
        if !n.is_power_of_two() || n < 16 {
            return Err(CohortError::InvalidRingDegree(n));
        }
        let p = self.plain_modulus;
        if !is_prime(p) || p >= 1 << 31 {
            return Err(CohortError::InvalidParam(format!(
                "plaintext modulus must be a prime below 2^31, got {p}"
            )));
        }
        if (p - 1) % (2 * n as u64) != 0 {
            return Err(CohortError::InvalidParam(format!(
                "plaintext modulus {p} does not support batching: need p ≡ 1 mod {}",
                2 * n
            )));
        }
        let slots = self.slots.unwrap_or(n / 2);
        validate_slots(slots, n)?;
        if !(self.sigma > 0.0) {
            return Err(CohortError::InvalidParam("sigma must be positive".into()));
        }
        if !(1..=30).contains(&self.gadget_base_bits) {
            return Err(CohortError::InvalidParam(format!(
                "gadget base bits must be in 1..=30, got {}",
                self.gadget_base_bits
            )));
        }

        let ct_moduli = if self.ct_moduli.is_empty() {
            if self.ct_prime_count == 0 {
                return Err(CohortError::InvalidParam("need at least one ciphertext prime".into()));
            }
            ntt_primes(self.ct_prime_bits, n, self.ct_prime_count, &[p]).ok_or_else(|| {
                CohortError::InvalidParam(format!(
                    "not enough {}-bit NTT primes for n={n}",
                    self.ct_prime_bits
                ))
            })?
        } else {
            self.ct_moduli
        };
        let ct_basis = Arc::new(RnsBasis::new(ct_moduli.clone(), n)?);
        if ct_basis.product <= BigUint::from(p) << 20 {
            return Err(CohortError::InvalidParam(
                "ciphertext modulus leaves no room above the plaintext modulus".into(),
            ));
        }

        // P must exceed n·Q so that |c·d| < QP/2 for centered Q-elements.
        let aux_bits = ct_moduli.iter().map(|q| 64 - q.leading_zeros()).max().unwrap_or(50).min(60);
        let bound = &ct_basis.product * BigUint::from(4 * n as u64);
        let mut aux = Vec::new();
        let mut aux_product = BigUint::one();
        let mut exclude = ct_moduli.clone();
        exclude.push(p);
        while aux_product <= bound {
            let next = ntt_primes(aux_bits, n, 1, &exclude).ok_or_else(|| {
                CohortError::InvalidParam("ran out of auxiliary NTT primes".into())
            })?;
            aux_product *= next[0];
            exclude.push(next[0]);
            aux.push(next[0]);
        }
        let mut all = ct_moduli;
        all.extend_from_slice(&aux);
        let mul_basis = Arc::new(RnsBasis::new(all, n)?);

        let gadget_digits = gadget_digit_count(&ct_basis.product, self.gadget_base_bits);

        debug!(
            ring_degree = n,
            plain_modulus = p,
            slots,
            q_bits = ct_basis.log2_product(),
            aux_primes = aux.len(),
            gadget_digits,
            "built BFV parameters"
        );

        Ok(Arc::new(BfvParams {
            ring_degree: n,
            plain_modulus: p,
            slots,
            ct_basis,
            mul_basis,
            sigma: self.sigma,
            gadget_base_bits: self.gadget_base_bits,
            gadget_digits,
        }))
    }
}

/// Balanced digits needed to represent every centered element of Z_Q;
/// one extra digit absorbs the final carry.
fn gadget_digit_count(q: &BigUint, base_bits: u32) -> usize {
    let bits = q.bits() as usize;
    bits.div_ceil(base_bits as usize) + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_generates_bases() {
        let params = BfvParamsBuilder::new()
            .ring_degree(16)
            .ct_primes(50, 3)
            .build()
            .unwrap();
        assert_eq!(params.ct_basis.num_moduli(), 3);
        assert!(params.mul_basis.num_moduli() > 3);
        assert_eq!(params.slots, 8);
        assert_eq!(params.row_size(), 8);
        let aux: BigUint = params.mul_basis.moduli[3..].iter().fold(BigUint::one(), |a, &q| a * q);
        assert!(aux > &params.ct_basis.product * 16u64);
        assert!(params.gadget_digits * 8 >= params.log2_q() as usize);
    }

    #[test]
    fn test_rejects_non_batching_modulus() {
        // 257 - 1 is not divisible by 2·256
        let err = BfvParamsBuilder::new().ring_degree(256).plain_modulus(257).build();
        assert!(matches!(err, Err(CohortError::InvalidParam(_))));
        let err = BfvParamsBuilder::new().ring_degree(16).plain_modulus(65535).build();
        assert!(matches!(err, Err(CohortError::InvalidParam(_))));
    }

    #[test]
    fn test_rejects_bad_slots_and_degree() {
        assert!(BfvParamsBuilder::new().ring_degree(16).slots(9).build().is_err());
        assert!(BfvParamsBuilder::new().ring_degree(16).slots(0).build().is_err());
        assert!(matches!(
            BfvParamsBuilder::new().ring_degree(24).build(),
            Err(CohortError::InvalidRingDegree(24))
        ));
    }

    #[test]
    fn test_with_slots() {
        let params = BfvParamsBuilder::new().ring_degree(16).ct_primes(50, 2).build().unwrap();
        let single = params.with_slots(1).unwrap();
        assert_eq!(single.slots, 1);
        assert!(single.is_compatible(&params));
        assert!(params.with_slots(16).is_err());
    }
}
