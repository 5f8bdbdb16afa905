use std::sync::Arc;
use num_bigint::{BigInt, BigUint, Sign};
use num_traits::{ToPrimitive, Zero};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

use crate::error::{CohortError, Result};
use crate::params::BfvParams;
use crate::ring::modular::{barrett_constant, mod_mul};
use crate::ring::poly::CoeffPoly;
use crate::ring::rns::{bigint_mod, RnsPoly};
use crate::sampling::{sample_binary_coeffs, sample_gaussian_coeffs, sample_uniform_rns};
use crate::bfv::{noise, Ciphertext, keygen::{PublicKey, SecretKey}};

/// round(num · x / den) for signed x, rounding half away from zero.
pub(crate) fn scale_round(x: &BigInt, num: u64, den: &BigUint) -> BigInt {
    let half = den >> 1;
    let mag = (x.magnitude() * num + half) / den;
    match x.sign() {
        Sign::Minus => BigInt::from_biguint(Sign::Minus, mag),
        _ => BigInt::from_biguint(Sign::Plus, mag),
    }
}

/// Δ·m in R_Q with Δ = ⌊Q/p⌋, computed residue by residue.
pub(crate) fn scale_plaintext(pt: &CoeffPoly, params: &BfvParams) -> Result<RnsPoly> {
    let basis = &params.ct_basis;
    if pt.len() != params.ring_degree {
        return Err(CohortError::DimensionMismatch { expected: params.ring_degree, got: pt.len() });
    }
    if pt.modulus != params.plain_modulus {
        return Err(CohortError::ModulusMismatch);
    }
    let delta = &basis.product / params.plain_modulus;
    let residues = basis.moduli.iter()
        .map(|&q| {
            let bk = barrett_constant(q);
            let delta_q = (&delta % q).to_u64().unwrap_or(0);
            pt.coeffs.iter().map(|&m| mod_mul(m % q, delta_q, q, bk)).collect()
        })
        .collect();
    RnsPoly::from_residues(residues, basis)
}

/// Public-key encryption: (pk0·u + e1 + Δ·m, pk1·u + e2) with binary u.
pub fn encrypt_pk(pt: &CoeffPoly, pk: &PublicKey) -> Result<Ciphertext> {
    let mut rng = ChaCha20Rng::from_os_rng();
    encrypt_pk_with_rng(pt, pk, &mut rng)
}

pub fn encrypt_pk_with_rng<R: rand::Rng>(
    pt: &CoeffPoly,
    pk: &PublicKey,
    rng: &mut R,
) -> Result<Ciphertext> {
    let params = &pk.params;
    let basis = &params.ct_basis;
    let n = params.ring_degree;

    let delta_m = scale_plaintext(pt, params)?;
    let u = RnsPoly::from_signed(&sample_binary_coeffs(n, rng), basis)?;
    let e1 = RnsPoly::from_signed(&sample_gaussian_coeffs(n, params.sigma, rng), basis)?;
    let e2 = RnsPoly::from_signed(&sample_gaussian_coeffs(n, params.sigma, rng), basis)?;

    let mut c0 = pk.pk0.mul(&u)?;
    c0.add_assign(&e1)?;
    c0.add_assign(&delta_m)?;
    let mut c1 = pk.pk1.mul(&u)?;
    c1.add_assign(&e2)?;

    Ok(Ciphertext { c: vec![c0, c1], params: params.clone(), noise_bits: noise::fresh_pk(params) })
}

/// Symmetric encryption: (-(a·s) + e + Δ·m, a).
pub fn encrypt_sk(pt: &CoeffPoly, sk: &SecretKey) -> Result<Ciphertext> {
    let mut rng = ChaCha20Rng::from_os_rng();
    encrypt_sk_with_rng(pt, sk, &mut rng)
}

pub fn encrypt_sk_with_rng<R: rand::Rng>(
    pt: &CoeffPoly,
    sk: &SecretKey,
    rng: &mut R,
) -> Result<Ciphertext> {
    let params = &sk.params;
    let basis = &params.ct_basis;

    let delta_m = scale_plaintext(pt, params)?;
    let a = sample_uniform_rns(basis, rng);
    let e = RnsPoly::from_signed(&sample_gaussian_coeffs(params.ring_degree, params.sigma, rng), basis)?;

    let mut c0 = a.mul(&sk.poly)?.neg();
    c0.add_assign(&e)?;
    c0.add_assign(&delta_m)?;

    Ok(Ciphertext { c: vec![c0, a], params: params.clone(), noise_bits: noise::fresh_sk(params) })
}

/// c0 + c1·s + c2·s² + ...
fn phase(ct: &Ciphertext, sk: &SecretKey) -> Result<RnsPoly> {
    if !ct.params.is_compatible(&sk.params) {
        return Err(CohortError::ModulusMismatch);
    }
    let mut acc = ct.c[0].clone();
    let mut s_power = sk.poly.clone();
    for (i, ci) in ct.c.iter().enumerate().skip(1) {
        acc.mul_acc(ci, &s_power)?;
        if i + 1 < ct.c.len() {
            s_power = s_power.mul(&sk.poly)?;
        }
    }
    Ok(acc)
}

/// m = round(p · phase / Q) mod p, coefficient by coefficient.
pub fn decrypt(ct: &Ciphertext, sk: &SecretKey) -> Result<CoeffPoly> {
    let params = &ct.params;
    let basis = &params.ct_basis;
    let p = params.plain_modulus;
    let coeffs = phase(ct, sk)?
        .to_centered_bigints(basis)
        .iter()
        .map(|x| bigint_mod(&scale_round(x, p, &basis.product), p))
        .collect();
    Ok(CoeffPoly { coeffs, modulus: p })
}

/// Invariant noise budget in bits: log2(Q) - log2‖[p·phase]_Q‖∞ - 1.
///
/// Needs the secret key, so it is only used for tracing and tests.
pub fn measure_budget(ct: &Ciphertext, sk: &SecretKey) -> Result<f64> {
    let params = &ct.params;
    let basis = &params.ct_basis;
    let phase = phase(ct, sk)?;
    let scaled = phase.scalar_mul_signed(params.plain_modulus as i64);
    let norm = scaled.to_centered_bigints(basis)
        .into_iter()
        .map(|c| c.magnitude().clone())
        .max()
        .unwrap_or_else(BigUint::zero);
    if norm.is_zero() {
        return Ok(params.log2_q() - 1.0);
    }
    let log_norm = norm.to_f64().map(f64::log2).unwrap_or(norm.bits() as f64);
    Ok(params.log2_q() - log_norm - 1.0)
}

/// Fresh encryption of the zero polynomial.
pub fn encrypt_zero(pk: &PublicKey) -> Result<Ciphertext> {
    let params: &Arc<BfvParams> = &pk.params;
    encrypt_pk(&CoeffPoly::zero(params.ring_degree, params.plain_modulus), pk)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bfv::encoding::BatchEncoder;
    use crate::bfv::keygen::{gen_public_key_with_rng, gen_secret_key_with_rng};
    use crate::params::presets::toy;

    #[test]
    fn test_scale_round_signs() {
        let den = BigUint::from(10u64);
        assert_eq!(scale_round(&BigInt::from(14), 1, &den), BigInt::from(1));
        assert_eq!(scale_round(&BigInt::from(15), 1, &den), BigInt::from(2));
        assert_eq!(scale_round(&BigInt::from(-15), 1, &den), BigInt::from(-2));
        assert_eq!(scale_round(&BigInt::from(-14), 1, &den), BigInt::from(-1));
        assert_eq!(scale_round(&BigInt::from(7), 3, &den), BigInt::from(2));
    }

    #[test]
    fn test_pk_and_sk_encryption() {
        let params = toy().unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let sk = gen_secret_key_with_rng(&params, &mut rng).unwrap();
        let pk = gen_public_key_with_rng(&sk, &mut rng).unwrap();
        let encoder = BatchEncoder::new(&params).unwrap();
        let values = vec![0, 1, 2, 65536, 5, 6, 7, 30000];
        let pt = encoder.encode(&values).unwrap();

        let ct = encrypt_pk_with_rng(&pt, &pk, &mut rng).unwrap();
        assert_eq!(decrypt(&ct, &sk).unwrap(), pt);
        let ct = encrypt_sk_with_rng(&pt, &sk, &mut rng).unwrap();
        assert_eq!(encoder.decode(&decrypt(&ct, &sk).unwrap()), values);
    }

    #[test]
    fn test_estimate_is_conservative_for_fresh() {
        let params = toy().unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(4);
        let sk = gen_secret_key_with_rng(&params, &mut rng).unwrap();
        let pk = gen_public_key_with_rng(&sk, &mut rng).unwrap();
        let encoder = BatchEncoder::new(&params).unwrap();
        let ct = encrypt_pk_with_rng(&encoder.constant(65536).unwrap(), &pk, &mut rng).unwrap();
        let measured = measure_budget(&ct, &sk).unwrap();
        assert!(measured >= ct.remaining_budget(), "{measured} < {}", ct.remaining_budget());
        assert!(measured < params.log2_q());
    }
}
