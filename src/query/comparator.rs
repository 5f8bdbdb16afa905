//! Less-than predicates on encrypted values.

use crate::bfv::Ciphertext;
use crate::context::CryptoContext;
use crate::error::{CohortError, Result};
use crate::ring::modular::{center, mod_inv, mod_sub};

/// Encrypted [value < threshold] per slot, as 0/1.
pub trait RangeComparator: Send + Sync {
    fn less_than(&self, ctx: &CryptoContext, value: &Ciphertext, threshold: u64) -> Result<Ciphertext>;

    /// Values must lie in [0, domain) for the predicate to be exact.
    fn domain(&self) -> u64;
}

/// Lagrange interpolation of the step function [x < t] over {0, ..., D-1}.
///
/// The degree is D - 1 and powers come from a balanced tree, so depth is
/// ⌈log2 (D - 1)⌉ multiplications.
#[derive(Clone, Debug)]
pub struct InterpolationComparator {
    domain: u64,
    plain_modulus: u64,
}

impl InterpolationComparator {
    pub fn new(domain: u64, plain_modulus: u64) -> Result<Self> {
        if domain < 2 || domain >= plain_modulus {
            return Err(CohortError::InvalidParam(format!(
                "comparator domain {domain} must be in 2..{plain_modulus}"
            )));
        }
        Ok(Self { domain, plain_modulus })
    }

    /// Coefficients c_0..c_{D-1} in [0, p) of the step polynomial.
    pub fn coefficients(&self, threshold: u64) -> Result<Vec<u64>> {
        if threshold > self.domain {
            return Err(CohortError::InvalidArgument(format!(
                "threshold {threshold} outside 0..={}",
                self.domain
            )));
        }
        let p = self.plain_modulus;
        let d = self.domain as usize;
        let mul = |a: u64, b: u64| ((a as u128 * b as u128) % p as u128) as u64;

        // F(x) = Π_{m < D} (x - m), low degree first
        let mut full = vec![1u64];
        for m in 0..self.domain {
            let mut next = vec![0u64; full.len() + 1];
            for (i, &c) in full.iter().enumerate() {
                next[i + 1] = (next[i + 1] + c) % p;
                next[i] = mod_sub(next[i], mul(c, m % p), p);
            }
            full = next;
        }

        let mut coeffs = vec![0u64; d];
        for j in 0..threshold {
            // N_j = F / (x - j) by synthetic division from the top
            let mut basis = vec![0u64; d];
            let mut carry = 0u64;
            for k in (0..d).rev() {
                carry = (full[k + 1] + mul(carry, j)) % p;
                basis[k] = carry;
            }
            let denom = (0..self.domain)
                .filter(|&m| m != j)
                .fold(1u64, |acc, m| mul(acc, (j + p - m) % p));
            let scale = mod_inv(denom, p).ok_or_else(|| {
                CohortError::InvalidParam(format!("comparator node {j} not invertible modulo {p}"))
            })?;
            for (c, b) in coeffs.iter_mut().zip(&basis) {
                *c = (*c + mul(*b, scale)) % p;
            }
        }
        Ok(coeffs)
    }

    /// Plaintext evaluation, for checking the interpolation.
    pub fn evaluate_plain(&self, threshold: u64, x: u64) -> Result<u64> {
        let p = self.plain_modulus;
        let coeffs = self.coefficients(threshold)?;
        Ok(coeffs.iter().rev().fold(0u64, |acc, &c| {
            ((acc as u128 * (x % p) as u128 + c as u128) % p as u128) as u64
        }))
    }
}

/// x^1..=x^degree; x^k = x^h · x^(k-h) with h the largest power of two below k.
fn power_tree(ctx: &CryptoContext, x: &Ciphertext, degree: usize) -> Result<Vec<Ciphertext>> {
    let mut powers: Vec<Ciphertext> = Vec::with_capacity(degree);
    powers.push(x.clone());
    for k in 2..=degree {
        let high = 1usize << (k - 1).ilog2();
        let next = ctx.mul(&powers[high - 1], &powers[k - high - 1])?;
        powers.push(next);
    }
    Ok(powers)
}

impl RangeComparator for InterpolationComparator {
    fn less_than(&self, ctx: &CryptoContext, value: &Ciphertext, threshold: u64) -> Result<Ciphertext> {
        if ctx.plain_modulus() != self.plain_modulus {
            return Err(CohortError::ModulusMismatch);
        }
        let p = self.plain_modulus;
        let coeffs = self.coefficients(threshold)?;
        let degree = coeffs.iter().rposition(|&c| c != 0).unwrap_or(0);

        let mut acc: Option<Ciphertext> = None;
        if degree > 0 {
            let powers = power_tree(ctx, value, degree)?;
            for (power, &c) in powers.iter().zip(&coeffs[1..]) {
                if c == 0 {
                    continue;
                }
                let term = ctx.mul_scalar(power, center(c, p));
                acc = Some(match acc {
                    Some(sum) => ctx.add(&sum, &term)?,
                    None => term,
                });
            }
        }
        let acc = match acc {
            Some(sum) => sum,
            None => ctx.zero(),
        };
        if coeffs[0] == 0 {
            return Ok(acc);
        }
        ctx.add_constant(&acc, center(coeffs[0], p))
    }

    fn domain(&self) -> u64 {
        self.domain
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;
    use crate::params::presets::toy;

    #[test]
    fn test_step_function() {
        let cmp = InterpolationComparator::new(9, 65537).unwrap();
        for t in 0..=9 {
            for x in 0..9 {
                assert_eq!(cmp.evaluate_plain(t, x).unwrap(), u64::from(x < t), "x={x} t={t}");
            }
        }
        assert!(cmp.coefficients(10).is_err());
        assert!(InterpolationComparator::new(1, 65537).is_err());
        assert!(InterpolationComparator::new(70000, 65537).is_err());
    }

    #[test]
    fn test_constant_thresholds() {
        let cmp = InterpolationComparator::new(5, 65537).unwrap();
        assert_eq!(cmp.coefficients(0).unwrap(), vec![0; 5]);
        assert_eq!(cmp.coefficients(5).unwrap(), vec![1, 0, 0, 0, 0]);
    }

    #[test]
    fn test_encrypted_less_than() {
        let mut rng = ChaCha20Rng::seed_from_u64(81);
        let ctx = CryptoContext::with_rng(&toy().unwrap(), &mut rng).unwrap();
        let cmp = InterpolationComparator::new(9, ctx.plain_modulus()).unwrap();
        let values = [0u64, 1, 3, 4, 5, 7, 8, 2];
        let ct = ctx.encrypt(&values).unwrap();
        for t in [0, 4, 9] {
            let got = ctx.decrypt(&cmp.less_than(&ctx, &ct, t).unwrap()).unwrap();
            let want: Vec<u64> = values.iter().map(|&v| u64::from(v < t)).collect();
            assert_eq!(got, want, "t={t}");
        }
    }
}
