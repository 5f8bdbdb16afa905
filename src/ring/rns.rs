use std::sync::Arc;
use concrete_ntt::prime64::Plan;
use num_bigint::{BigInt, BigUint, Sign};
use num_traits::{One, ToPrimitive, Zero};

use crate::error::{CohortError, Result};
use crate::ring::modular::{barrett_constant, mod_inv, reduce_signed};
use crate::ring::ntt::{make_plan, NttPoly};
use crate::ring::poly::automorphism_coeffs;

/// Precomputed data for an RNS basis Q = ∏ q_i.
#[derive(Clone, Debug)]
pub struct RnsBasis {
    pub moduli: Vec<u64>,
    pub plans: Vec<Arc<Plan>>,
    pub ring_degree: usize,
    pub barrett_ks: Vec<u64>,
    /// Q as an integer.
    pub product: BigUint,
    /// CRT lifting terms (Q/q_i) · ((Q/q_i)^{-1} mod q_i).
    crt_terms: Vec<BigUint>,
}

impl RnsBasis {
    /// Create a basis from pairwise coprime NTT-friendly primes.
    pub fn new(moduli: Vec<u64>, ring_degree: usize) -> Result<Self> {
        if moduli.is_empty() {
            return Err(CohortError::InvalidParam("RNS basis needs at least one modulus".into()));
        }
        let plans = moduli.iter()
            .map(|&q| make_plan(ring_degree, q))
            .collect::<Result<Vec<_>>>()?;
        let barrett_ks = moduli.iter().map(|&q| barrett_constant(q)).collect();

        let product = moduli.iter().fold(BigUint::one(), |acc, &q| acc * q);
        let crt_terms = moduli.iter()
            .map(|&qi| {
                let q_star = &product / qi;
                let q_star_mod = (&q_star % qi).to_u64().unwrap_or(0);
                let inv = mod_inv(q_star_mod, qi).ok_or_else(|| {
                    CohortError::InvalidParam(format!("RNS modulus {qi} is not coprime to the rest"))
                })?;
                Ok(q_star * inv)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { moduli, plans, ring_degree, barrett_ks, product, crt_terms })
    }

    pub fn num_moduli(&self) -> usize {
        self.moduli.len()
    }

    /// log2(Q) as a float.
    pub fn log2_product(&self) -> f64 {
        self.moduli.iter().map(|&q| (q as f64).log2()).sum()
    }

    /// Reconstruct the centered integer in (-Q/2, Q/2] from its residues.
    pub fn reconstruct_centered(&self, residues: &[u64]) -> BigInt {
        let mut x = BigUint::zero();
        for (term, &r) in self.crt_terms.iter().zip(residues) {
            x += term * r;
        }
        x %= &self.product;
        let half = &self.product >> 1;
        if x > half {
            BigInt::from_biguint(Sign::Minus, &self.product - x)
        } else {
            BigInt::from_biguint(Sign::Plus, x)
        }
    }
}

/// Reduce a signed big integer into [0, q).
pub fn bigint_mod(x: &BigInt, q: u64) -> u64 {
    let r = x % BigInt::from(q);
    let r = if r.sign() == Sign::Minus { r + BigInt::from(q) } else { r };
    r.to_u64().unwrap_or(0)
}

/// Polynomial in RNS representation, one NTT-form residue per prime.
#[derive(Clone, Debug)]
pub struct RnsPoly {
    pub components: Vec<NttPoly>,
    pub ring_degree: usize,
}

impl RnsPoly {
    pub fn zero(basis: &RnsBasis) -> Self {
        let components = basis.moduli.iter()
            .zip(&basis.plans)
            .map(|(&q, plan)| NttPoly::zero(basis.ring_degree, q, plan.clone()))
            .collect();
        Self { components, ring_degree: basis.ring_degree }
    }

    /// Lift small signed coefficients (keys, errors, centered plaintexts).
    pub fn from_signed(coeffs: &[i64], basis: &RnsBasis) -> Result<Self> {
        if coeffs.len() != basis.ring_degree {
            return Err(CohortError::DimensionMismatch {
                expected: basis.ring_degree,
                got: coeffs.len(),
            });
        }
        let components = basis.moduli.iter()
            .zip(&basis.plans)
            .map(|(&q, plan)| {
                let residues = coeffs.iter().map(|&c| reduce_signed(c, q)).collect();
                NttPoly::from_coeffs(residues, plan.clone())
            })
            .collect();
        Ok(Self { components, ring_degree: basis.ring_degree })
    }

    /// Lift arbitrary integers, reducing modulo every prime of the basis.
    pub fn from_bigints(coeffs: &[BigInt], basis: &RnsBasis) -> Result<Self> {
        if coeffs.len() != basis.ring_degree {
            return Err(CohortError::DimensionMismatch {
                expected: basis.ring_degree,
                got: coeffs.len(),
            });
        }
        let components = basis.moduli.iter()
            .zip(&basis.plans)
            .map(|(&q, plan)| {
                let residues = coeffs.iter().map(|c| bigint_mod(c, q)).collect();
                NttPoly::from_coeffs(residues, plan.clone())
            })
            .collect();
        Ok(Self { components, ring_degree: basis.ring_degree })
    }

    /// Build from residue vectors already in coefficient form, one per prime.
    pub fn from_residues(residues: Vec<Vec<u64>>, basis: &RnsBasis) -> Result<Self> {
        if residues.len() != basis.num_moduli() {
            return Err(CohortError::DimensionMismatch {
                expected: basis.num_moduli(),
                got: residues.len(),
            });
        }
        let components = residues.into_iter()
            .zip(&basis.plans)
            .map(|(r, plan)| NttPoly::from_coeffs(r, plan.clone()))
            .collect();
        Ok(Self { components, ring_degree: basis.ring_degree })
    }

    /// Coefficient-form residues, one vector per prime.
    pub fn to_residues(&self) -> Vec<Vec<u64>> {
        self.components.iter().map(NttPoly::to_coeffs).collect()
    }

    /// Exact centered coefficients in (-Q/2, Q/2].
    pub fn to_centered_bigints(&self, basis: &RnsBasis) -> Vec<BigInt> {
        let residues = self.to_residues();
        let mut column = vec![0u64; residues.len()];
        (0..self.ring_degree)
            .map(|j| {
                for (slot, r) in column.iter_mut().zip(&residues) {
                    *slot = r[j];
                }
                basis.reconstruct_centered(&column)
            })
            .collect()
    }

    pub fn num_components(&self) -> usize {
        self.components.len()
    }

    fn check_len(&self, other: &Self) -> Result<()> {
        if self.components.len() != other.components.len() {
            return Err(CohortError::DimensionMismatch {
                expected: self.components.len(),
                got: other.components.len(),
            });
        }
        Ok(())
    }

    pub fn add_assign(&mut self, other: &Self) -> Result<()> {
        self.check_len(other)?;
        for (a, b) in self.components.iter_mut().zip(&other.components) {
            a.add_assign(b)?;
        }
        Ok(())
    }

    pub fn sub_assign(&mut self, other: &Self) -> Result<()> {
        self.check_len(other)?;
        for (a, b) in self.components.iter_mut().zip(&other.components) {
            a.sub_assign(b)?;
        }
        Ok(())
    }

    pub fn add(&self, other: &Self) -> Result<Self> {
        let mut out = self.clone();
        out.add_assign(other)?;
        Ok(out)
    }

    pub fn sub(&self, other: &Self) -> Result<Self> {
        let mut out = self.clone();
        out.sub_assign(other)?;
        Ok(out)
    }

    pub fn neg(&self) -> Self {
        let mut out = self.clone();
        for c in out.components.iter_mut() {
            c.neg_assign();
        }
        out
    }

    /// Negacyclic product, residue by residue.
    pub fn mul(&self, other: &Self) -> Result<Self> {
        self.check_len(other)?;
        let components = self.components.iter()
            .zip(&other.components)
            .map(|(a, b)| a.mul(b))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { components, ring_degree: self.ring_degree })
    }

    /// self += a * b
    pub fn mul_acc(&mut self, a: &Self, b: &Self) -> Result<()> {
        self.check_len(a)?;
        a.check_len(b)?;
        for ((acc, x), y) in self.components.iter_mut().zip(&a.components).zip(&b.components) {
            acc.mul_acc(x, y)?;
        }
        Ok(())
    }

    /// Multiply by a signed integer scalar.
    pub fn scalar_mul_signed(&self, scalar: i64) -> Self {
        let mut out = self.clone();
        for c in out.components.iter_mut() {
            let s = reduce_signed(scalar, c.modulus);
            c.scalar_mul_assign(s);
        }
        out
    }

    /// Multiply by a big integer scalar (e.g. a gadget power larger than one prime).
    pub fn scalar_mul_bigint(&self, scalar: &BigInt) -> Self {
        let mut out = self.clone();
        for c in out.components.iter_mut() {
            let s = bigint_mod(scalar, c.modulus);
            c.scalar_mul_assign(s);
        }
        out
    }

    /// Apply X ↦ X^k residue by residue; valid for any number of primes.
    pub fn automorphism(&self, k: usize) -> Self {
        let components = self.components.iter()
            .map(|c| {
                let permuted = automorphism_coeffs(&c.to_coeffs(), k, c.modulus);
                NttPoly::from_coeffs(permuted, c.plan.clone())
            })
            .collect();
        Self { components, ring_degree: self.ring_degree }
    }

    /// Move an element of R_Q into another basis using its centered lift.
    pub fn switch_basis(&self, from: &RnsBasis, to: &RnsBasis) -> Result<Self> {
        let lifted = self.to_centered_bigints(from);
        Self::from_bigints(&lifted, to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::modular::ntt_primes;

    const N: usize = 16;

    fn basis(count: usize) -> RnsBasis {
        let primes = ntt_primes(50, N, count, &[]).unwrap();
        RnsBasis::new(primes, N).unwrap()
    }

    fn signed_vec(v: &[i64]) -> Vec<i64> {
        let mut r = vec![0i64; N];
        r[..v.len()].copy_from_slice(v);
        r
    }

    #[test]
    fn test_signed_roundtrip_multi_prime() {
        let b = basis(3);
        let coeffs = signed_vec(&[1, -2, 3, -4, 0, 0, 123456789, -987654321]);
        let poly = RnsPoly::from_signed(&coeffs, &b).unwrap();
        let back: Vec<i64> = poly.to_centered_bigints(&b)
            .iter()
            .map(|c| c.to_i64().unwrap())
            .collect();
        assert_eq!(back, coeffs);
    }

    #[test]
    fn test_mul_beyond_single_prime() {
        // (2^40 + X)·(2^40 - X) = 2^80 - X^2, which only fits in the full product.
        let b = basis(3);
        let big = 1i64 << 40;
        let a = RnsPoly::from_signed(&signed_vec(&[big, 1]), &b).unwrap();
        let c = RnsPoly::from_signed(&signed_vec(&[big, -1]), &b).unwrap();
        let prod = a.mul(&c).unwrap().to_centered_bigints(&b);
        assert_eq!(prod[0], BigInt::one() << 80);
        assert_eq!(prod[1], BigInt::zero());
        assert_eq!(prod[2], BigInt::from(-1));
    }

    #[test]
    fn test_automorphism_multi_prime() {
        let b = basis(2);
        let coeffs = signed_vec(&[5, -1, 0, 2]);
        let poly = RnsPoly::from_signed(&coeffs, &b).unwrap();
        let rotated = poly.automorphism(3).to_centered_bigints(&b);
        // X -> X^3, X^3 -> X^9
        assert_eq!(rotated[0], BigInt::from(5));
        assert_eq!(rotated[3], BigInt::from(-1));
        assert_eq!(rotated[9], BigInt::from(2));
    }

    #[test]
    fn test_switch_basis_keeps_centered_value() {
        let from = basis(2);
        let primes = ntt_primes(50, N, 3, &from.moduli).unwrap();
        let to = RnsBasis::new(primes, N).unwrap();
        let coeffs = signed_vec(&[-7, 1 << 45, -(1 << 45)]);
        let poly = RnsPoly::from_signed(&coeffs, &from).unwrap();
        let moved = poly.switch_basis(&from, &to).unwrap().to_centered_bigints(&to);
        for (got, &want) in moved.iter().zip(&coeffs) {
            assert_eq!(*got, BigInt::from(want));
        }
    }

    #[test]
    fn test_scalar_mul_signed() {
        let b = basis(2);
        let poly = RnsPoly::from_signed(&signed_vec(&[3, -4]), &b).unwrap();
        let scaled = poly.scalar_mul_signed(-5).to_centered_bigints(&b);
        assert_eq!(scaled[0], BigInt::from(-15));
        assert_eq!(scaled[1], BigInt::from(20));
    }
}
