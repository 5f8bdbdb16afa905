//! Encrypted equality against a genotype literal.
//!
//! Genotype slots hold -1 (missing), 0, 1 or 2. For a literal a the cubic
//! f_a with f_a(-1) = 0 and f_a(v) = [v = a] on {0, 1, 2} is
//!
//! ```text
//! f_0(x) = 1 - x/2 - x^2 + x^3/2
//! f_1(x) = x + x^2/2 - x^3/2
//! f_2(x) = -x/6 + x^3/6
//! ```
//!
//! so a missing call fails every test. Evaluation costs two multiplicative levels.

use crate::bfv::Ciphertext;
use crate::context::CryptoContext;
use crate::error::{CohortError, Result};
use crate::ring::modular::{barrett_constant, center, mod_inv, mod_mul};

/// Largest literal a genotype can hold.
pub const MAX_LITERAL: u8 = 2;

/// Per-literal coefficients (c0, c1, c2, c3) as centered residues mod p.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EqualityEvaluator {
    coeffs: [[i64; 4]; 3],
    plain_modulus: u64,
}

impl EqualityEvaluator {
    pub fn new(plain_modulus: u64) -> Result<Self> {
        let p = plain_modulus;
        let inverse = |d: u64| {
            mod_inv(d, p).ok_or_else(|| {
                CohortError::InvalidParam(format!("{d} is not invertible modulo {p}"))
            })
        };
        let inv2 = inverse(2)?;
        let inv3 = inverse(3)?;
        let inv6 = mod_mul(inv2, inv3, p, barrett_constant(p));

        let pos = |x: u64| center(x % p, p);
        let neg = |x: u64| center((p - x % p) % p, p);
        let coeffs = [
            [1, neg(inv2), -1, pos(inv2)],
            [0, 1, pos(inv2), neg(inv2)],
            [0, neg(inv6), 0, pos(inv6)],
        ];
        Ok(Self { coeffs, plain_modulus })
    }

    pub fn plain_modulus(&self) -> u64 {
        self.plain_modulus
    }

    pub fn coefficients(&self, literal: u8) -> Result<[i64; 4]> {
        self.coeffs
            .get(literal as usize)
            .copied()
            .ok_or_else(|| CohortError::InvalidArgument(format!(
                "equality literal {literal} outside 0..={MAX_LITERAL}"
            )))
    }

    /// Encrypted [x = literal] in every logical slot.
    pub fn evaluate(&self, ctx: &CryptoContext, x: &Ciphertext, literal: u8) -> Result<Ciphertext> {
        let [c0, c1, c2, c3] = self.coefficients(literal)?;
        let x2 = ctx.square(x)?;
        let x3 = ctx.mul(&x2, x)?;

        let mut acc = ctx.mul_scalar(&x3, c3);
        for (power, c) in [(&x2, c2), (x, c1)] {
            if c != 0 {
                acc = ctx.add(&acc, &ctx.mul_scalar(power, c))?;
            }
        }
        if c0 != 0 {
            acc = ctx.add_constant(&acc, c0)?;
        }
        Ok(acc)
    }

    /// The same polynomial on a plaintext value, reduced into [0, p).
    pub fn evaluate_plain(&self, x: i64, literal: u8) -> Result<u64> {
        let p = self.plain_modulus as i128;
        let x = x as i128;
        let value = self
            .coefficients(literal)?
            .iter()
            .rev()
            .fold(0i128, |acc, &c| (acc * x + c as i128).rem_euclid(p));
        Ok(value as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;
    use crate::params::presets::toy;

    #[test]
    fn test_truth_table() {
        let eval = EqualityEvaluator::new(65537).unwrap();
        for literal in 0..=MAX_LITERAL {
            for x in -1i64..=2 {
                let expected = u64::from(x == literal as i64);
                assert_eq!(eval.evaluate_plain(x, literal).unwrap(), expected, "x={x} a={literal}");
            }
        }
        assert!(eval.coefficients(3).is_err());
    }

    #[test]
    fn test_small_modulus_needs_inverses() {
        assert!(EqualityEvaluator::new(3).is_err());
        assert!(EqualityEvaluator::new(7).is_ok());
    }

    #[test]
    fn test_encrypted_matches_plain() {
        let mut rng = ChaCha20Rng::seed_from_u64(61);
        let ctx = CryptoContext::with_rng(&toy().unwrap(), &mut rng).unwrap();
        let eval = EqualityEvaluator::new(ctx.plain_modulus()).unwrap();
        let values = [-1i64, 0, 1, 2, 2, 1, 0, -1];
        let x = ctx.encrypt_signed(&values).unwrap();
        for literal in 0..=MAX_LITERAL {
            let got = ctx.decrypt(&eval.evaluate(&ctx, &x, literal).unwrap()).unwrap();
            let want: Vec<u64> = values.iter().map(|&v| u64::from(v == literal as i64)).collect();
            assert_eq!(got, want);
        }
    }
}
