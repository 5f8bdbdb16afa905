use std::sync::Arc;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use zeroize::Zeroize;

use crate::error::{CohortError, Result};
use crate::params::BfvParams;
use crate::ring::modular::mod_pow;
use crate::ring::rns::RnsPoly;
use crate::sampling::{sample_gaussian_coeffs, sample_ternary_coeffs, sample_uniform_rns};
use crate::bfv::keyswitch::KeySwitchKey;

/// BFV secret key: ternary s in RNS-NTT form.
pub struct SecretKey {
    pub poly: RnsPoly,
    pub params: Arc<BfvParams>,
}

impl Drop for SecretKey {
    fn drop(&mut self) {
        for comp in &mut self.poly.components {
            comp.evals.zeroize();
        }
    }
}

/// pk = (pk0, pk1) = (-(a·s + e), a).
#[derive(Clone, Debug)]
pub struct PublicKey {
    pub pk0: RnsPoly,
    pub pk1: RnsPoly,
    pub params: Arc<BfvParams>,
}

/// Switches the s² component of a product back to s.
#[derive(Clone, Debug)]
pub struct RelinKey {
    pub key: KeySwitchKey,
}

/// Rotation keys for the power-of-two left shifts 1, 2, 4, ... < n/2.
///
/// `keys[b]` switches from σ_{3^{2^b}}(s) back to s.
#[derive(Clone, Debug)]
pub struct GaloisKeys {
    pub keys: Vec<KeySwitchKey>,
    /// Galois element 3^{2^b} mod 2n for each entry of `keys`.
    pub elements: Vec<usize>,
    pub params: Arc<BfvParams>,
}

impl GaloisKeys {
    /// Key and Galois element for a left shift of 2^bit.
    pub fn get(&self, bit: usize) -> Result<(&KeySwitchKey, usize)> {
        match (self.keys.get(bit), self.elements.get(bit)) {
            (Some(key), Some(&element)) => Ok((key, element)),
            _ => Err(CohortError::MissingKey(format!("no rotation key for shift {}", 1usize << bit))),
        }
    }
}

/// Galois element for a left rotation of row 0 by `shift` slots.
pub fn rotation_element(params: &BfvParams, shift: usize) -> usize {
    let two_n = 2 * params.ring_degree as u64;
    mod_pow(3, shift as u64, two_n) as usize
}

pub fn gen_secret_key(params: &Arc<BfvParams>) -> Result<SecretKey> {
    let mut rng = ChaCha20Rng::from_os_rng();
    gen_secret_key_with_rng(params, &mut rng)
}

pub fn gen_secret_key_with_rng<R: rand::Rng>(
    params: &Arc<BfvParams>,
    rng: &mut R,
) -> Result<SecretKey> {
    let coeffs = sample_ternary_coeffs(params.ring_degree, rng);
    let poly = RnsPoly::from_signed(&coeffs, &params.ct_basis)?;
    Ok(SecretKey { poly, params: params.clone() })
}

pub fn gen_public_key(sk: &SecretKey) -> Result<PublicKey> {
    let mut rng = ChaCha20Rng::from_os_rng();
    gen_public_key_with_rng(sk, &mut rng)
}

pub fn gen_public_key_with_rng<R: rand::Rng>(
    sk: &SecretKey,
    rng: &mut R,
) -> Result<PublicKey> {
    let params = &sk.params;
    let basis = &params.ct_basis;

    let a = sample_uniform_rns(basis, rng);
    let e = RnsPoly::from_signed(&sample_gaussian_coeffs(params.ring_degree, params.sigma, rng), basis)?;

    // pk0 = -(a·s + e)
    let mut a_s = a.mul(&sk.poly)?;
    a_s.add_assign(&e)?;
    Ok(PublicKey { pk0: a_s.neg(), pk1: a, params: params.clone() })
}

pub fn gen_relin_key(sk: &SecretKey) -> Result<RelinKey> {
    let mut rng = ChaCha20Rng::from_os_rng();
    gen_relin_key_with_rng(sk, &mut rng)
}

pub fn gen_relin_key_with_rng<R: rand::Rng>(
    sk: &SecretKey,
    rng: &mut R,
) -> Result<RelinKey> {
    let s_sq = sk.poly.mul(&sk.poly)?;
    Ok(RelinKey { key: KeySwitchKey::generate_symmetric(&s_sq, sk, rng)? })
}

pub fn gen_galois_keys(sk: &SecretKey) -> Result<GaloisKeys> {
    let mut rng = ChaCha20Rng::from_os_rng();
    gen_galois_keys_with_rng(sk, &mut rng)
}

/// Keys for every power-of-two shift below the row size.
pub fn gen_galois_keys_with_rng<R: rand::Rng>(
    sk: &SecretKey,
    rng: &mut R,
) -> Result<GaloisKeys> {
    let params = &sk.params;
    let row = params.row_size();
    let mut keys = Vec::new();
    let mut elements = Vec::new();
    let mut shift = 1usize;
    while shift < row {
        let element = rotation_element(params, shift);
        let s_auto = sk.poly.automorphism(element);
        keys.push(KeySwitchKey::generate_symmetric(&s_auto, sk, rng)?);
        elements.push(element);
        shift <<= 1;
    }
    Ok(GaloisKeys { keys, elements, params: params.clone() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::presets::toy;

    #[test]
    fn test_keygen_shapes() {
        let params = toy().unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let sk = gen_secret_key_with_rng(&params, &mut rng).unwrap();
        let pk = gen_public_key_with_rng(&sk, &mut rng).unwrap();
        assert_eq!(pk.pk0.num_components(), params.ct_basis.num_moduli());

        let rlk = gen_relin_key_with_rng(&sk, &mut rng).unwrap();
        assert_eq!(rlk.key.keys.len(), params.gadget_digits);

        // n = 16: shifts 1, 2, 4
        let gk = gen_galois_keys_with_rng(&sk, &mut rng).unwrap();
        assert_eq!(gk.keys.len(), 3);
        assert_eq!(gk.elements, vec![3, 9, 17]);
        assert!(gk.get(3).is_err());
    }

    #[test]
    fn test_rotation_element_has_row_order() {
        let params = toy().unwrap();
        // 3 generates a subgroup of order n/2 in (Z/2nZ)*
        assert_eq!(rotation_element(&params, params.row_size()), 1);
        assert_ne!(rotation_element(&params, params.row_size() / 2), 1);
    }
}
