use std::sync::Arc;
use num_bigint::BigInt;
use num_traits::{One, Signed, ToPrimitive, Zero};
use rand::Rng;

use crate::error::{CohortError, Result};
use crate::params::BfvParams;
use crate::ring::rns::{RnsBasis, RnsPoly};
use crate::sampling::{sample_binary_coeffs, sample_gaussian_coeffs, sample_uniform_rns};
use crate::bfv::{noise, Ciphertext};
use crate::bfv::keygen::{PublicKey, RelinKey, SecretKey};

/// Balanced base-2^w decomposition of an element of R_Q.
///
/// Works on the exact centered lift of every coefficient, so Σ d_i·2^{w·i}
/// equals the coefficient as an integer (not only modulo one prime). Each
/// digit lies in [-2^{w-1}, 2^{w-1}).
pub fn gadget_decompose(
    poly: &RnsPoly,
    basis: &RnsBasis,
    base_bits: u32,
    num_digits: usize,
) -> Result<Vec<Vec<i64>>> {
    let n = poly.ring_degree;
    let base = BigInt::one() << base_bits;
    let half = 1i64 << (base_bits - 1);
    let mut digits = vec![vec![0i64; n]; num_digits];

    for (pos, coeff) in poly.to_centered_bigints(basis).into_iter().enumerate() {
        let mut rest = coeff;
        for digit in digits.iter_mut() {
            if rest.is_zero() {
                break;
            }
            // BigInt remainder takes the sign of the dividend
            let mut r = (&rest % &base).to_i64().unwrap_or(0);
            if r >= half {
                r -= 1 << base_bits;
            } else if r < -half {
                r += 1 << base_bits;
            }
            digit[pos] = r;
            rest = (rest - r) >> base_bits;
        }
        if !rest.is_zero() {
            return Err(CohortError::DecompositionError(format!(
                "coefficient {pos} needs more than {num_digits} digits (remainder has {} bits)",
                rest.abs().bits()
            )));
        }
    }
    Ok(digits)
}

/// Gadget key-switching key: entry i encrypts 2^{w·i}·source under the target key.
///
/// Used for relinearization (source s²), rotations (source σ_k(s)) and for
/// re-keying owner results to a client (source = owner key, target = client key).
#[derive(Clone, Debug)]
pub struct KeySwitchKey {
    pub keys: Vec<(RnsPoly, RnsPoly)>,
    pub params: Arc<BfvParams>,
    /// Estimated bits added by one application.
    pub noise_bits: f64,
}

impl KeySwitchKey {
    /// Symmetric key from `source` to `sk`: (-(a_i·s + e_i) + g_i·source, a_i).
    pub fn generate_symmetric<R: Rng>(
        source: &RnsPoly,
        sk: &SecretKey,
        rng: &mut R,
    ) -> Result<Self> {
        let params = &sk.params;
        let basis = &params.ct_basis;
        let mut keys = Vec::with_capacity(params.gadget_digits);

        for i in 0..params.gadget_digits {
            let a = sample_uniform_rns(basis, rng);
            let e = RnsPoly::from_signed(&sample_gaussian_coeffs(params.ring_degree, params.sigma, rng), basis)?;
            let gadget = BigInt::one() << (params.gadget_base_bits as usize * i);

            let mut k0 = a.mul(&sk.poly)?;
            k0.add_assign(&e)?;
            let mut k0 = k0.neg();
            k0.add_assign(&source.scalar_mul_bigint(&gadget))?;
            keys.push((k0, a));
        }

        let noise_bits = noise::key_switch(params, noise::symmetric_key_error(params));
        Ok(Self { keys, params: params.clone(), noise_bits })
    }

    /// Asymmetric key from the owner's secret to a client's public key.
    ///
    /// ksk_i = (pk0·u_i + e1_i + g_i·s, pk1·u_i + e2_i); decrypting entry i with
    /// the client secret gives g_i·s plus small noise.
    pub fn generate<R: Rng>(
        client_pk: &PublicKey,
        owner_sk: &SecretKey,
        rng: &mut R,
    ) -> Result<Self> {
        let params = &owner_sk.params;
        if !params.is_compatible(&client_pk.params) {
            return Err(CohortError::ModulusMismatch);
        }
        let basis = &params.ct_basis;
        let n = params.ring_degree;
        let mut keys = Vec::with_capacity(params.gadget_digits);

        for i in 0..params.gadget_digits {
            let u = RnsPoly::from_signed(&sample_binary_coeffs(n, rng), basis)?;
            let e1 = RnsPoly::from_signed(&sample_gaussian_coeffs(n, params.sigma, rng), basis)?;
            let e2 = RnsPoly::from_signed(&sample_gaussian_coeffs(n, params.sigma, rng), basis)?;
            let gadget = BigInt::one() << (params.gadget_base_bits as usize * i);

            let mut k0 = client_pk.pk0.mul(&u)?;
            k0.add_assign(&e1)?;
            k0.add_assign(&owner_sk.poly.scalar_mul_bigint(&gadget))?;
            let mut k1 = client_pk.pk1.mul(&u)?;
            k1.add_assign(&e2)?;
            keys.push((k0, k1));
        }

        let noise_bits = noise::key_switch(params, noise::public_key_error(params));
        Ok(Self { keys, params: params.clone(), noise_bits })
    }

    /// Σ d_i·(k0_i, k1_i) for the gadget digits d_i of `poly`.
    pub fn switch(&self, poly: &RnsPoly) -> Result<(RnsPoly, RnsPoly)> {
        let params = &self.params;
        let basis = &params.ct_basis;
        let digits = gadget_decompose(poly, basis, params.gadget_base_bits, params.gadget_digits)?;
        if digits.len() > self.keys.len() {
            return Err(CohortError::MissingKey(format!(
                "key has {} gadget entries, need {}",
                self.keys.len(),
                digits.len()
            )));
        }

        let mut out0 = RnsPoly::zero(basis);
        let mut out1 = RnsPoly::zero(basis);
        for (digit, (k0, k1)) in digits.iter().zip(&self.keys) {
            if digit.iter().all(|&d| d == 0) {
                continue;
            }
            let d = RnsPoly::from_signed(digit, basis)?;
            out0.mul_acc(&d, k0)?;
            out1.mul_acc(&d, k1)?;
        }
        Ok((out0, out1))
    }

    /// Re-key a degree-1 ciphertext: the result decrypts under the key this
    /// key-switching key targets.
    pub fn apply(&self, ct: &Ciphertext) -> Result<Ciphertext> {
        if ct.c.len() != 2 {
            return Err(CohortError::InvalidParam("key switching needs a degree-1 ciphertext".into()));
        }
        if !self.params.is_compatible(&ct.params) {
            return Err(CohortError::ModulusMismatch);
        }
        let (mut c0, c1) = self.switch(&ct.c[1])?;
        c0.add_assign(&ct.c[0])?;
        Ok(Ciphertext {
            c: vec![c0, c1],
            params: ct.params.clone(),
            noise_bits: noise::after_switch(ct.noise_bits, self.noise_bits),
        })
    }
}

/// Reduce (c0, c1, c2) to (c0', c1') with the relinearization key.
pub fn relinearize(c: &[RnsPoly], rlk: &RelinKey) -> Result<(RnsPoly, RnsPoly)> {
    if c.len() != 3 {
        return Err(CohortError::InvalidParam(format!(
            "relinearization needs 3 components, got {}",
            c.len()
        )));
    }
    let (mut c0, mut c1) = rlk.key.switch(&c[2])?;
    c0.add_assign(&c[0])?;
    c1.add_assign(&c[1])?;
    Ok((c0, c1))
}
