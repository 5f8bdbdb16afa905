use std::sync::Arc;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use tracing::debug;

use crate::bfv::{self, BatchEncoder, Ciphertext, GaloisKeys, PublicKey, RelinKey, SecretKey};
use crate::bfv::keygen;
use crate::error::Result;
use crate::params::BfvParams;
use crate::ring::poly::CoeffPoly;

/// The data owner's scheme state: parameters, every key, the batch encoder
/// and a reusable encryption of zero.
///
/// All homomorphic operations used by the query layer go through here so that
/// the right evaluation keys are always at hand.
pub struct CryptoContext {
    params: Arc<BfvParams>,
    secret_key: SecretKey,
    public_key: PublicKey,
    relin_key: RelinKey,
    galois_keys: GaloisKeys,
    encoder: BatchEncoder,
    zero: Ciphertext,
}

impl CryptoContext {
    pub fn generate(params: &Arc<BfvParams>) -> Result<Self> {
        let mut rng = ChaCha20Rng::from_os_rng();
        Self::with_rng(params, &mut rng)
    }

    /// Deterministic key generation for tests and benches.
    pub fn with_rng<R: rand::Rng>(params: &Arc<BfvParams>, rng: &mut R) -> Result<Self> {
        let secret_key = keygen::gen_secret_key_with_rng(params, rng)?;
        let public_key = keygen::gen_public_key_with_rng(&secret_key, rng)?;
        let relin_key = keygen::gen_relin_key_with_rng(&secret_key, rng)?;
        let galois_keys = keygen::gen_galois_keys_with_rng(&secret_key, rng)?;
        let encoder = BatchEncoder::new(params)?;
        let zero_pt = CoeffPoly::zero(params.ring_degree, params.plain_modulus);
        let zero = bfv::encrypt::encrypt_pk_with_rng(&zero_pt, &public_key, rng)?;
        debug!(
            ring_degree = params.ring_degree,
            slots = params.slots,
            rotation_keys = galois_keys.keys.len(),
            "generated crypto context"
        );
        Ok(Self { params: params.clone(), secret_key, public_key, relin_key, galois_keys, encoder, zero })
    }

    pub fn params(&self) -> &Arc<BfvParams> {
        &self.params
    }

    pub fn slots(&self) -> usize {
        self.params.slots
    }

    pub fn plain_modulus(&self) -> u64 {
        self.params.plain_modulus
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub(crate) fn secret_key(&self) -> &SecretKey {
        &self.secret_key
    }

    pub fn encoder(&self) -> &BatchEncoder {
        &self.encoder
    }

    /// A copy of the encryption of zero that seeds additive folds.
    pub fn zero(&self) -> Ciphertext {
        self.zero.clone()
    }

    pub fn encrypt(&self, values: &[u64]) -> Result<Ciphertext> {
        bfv::encrypt_pk(&self.encoder.encode(values)?, &self.public_key)
    }

    pub fn encrypt_signed(&self, values: &[i64]) -> Result<Ciphertext> {
        bfv::encrypt_pk(&self.encoder.encode_signed(values)?, &self.public_key)
    }

    /// `value` in every logical slot.
    pub fn encrypt_constant(&self, value: u64) -> Result<Ciphertext> {
        bfv::encrypt_pk(&self.encoder.constant(value)?, &self.public_key)
    }

    pub fn encrypt_one_hot(&self, slot: usize, value: u64) -> Result<Ciphertext> {
        bfv::encrypt_pk(&self.encoder.one_hot(slot, value)?, &self.public_key)
    }

    /// Decrypt the logical slots.
    pub fn decrypt(&self, ct: &Ciphertext) -> Result<Vec<u64>> {
        Ok(self.encoder.decode(&bfv::decrypt(ct, &self.secret_key)?))
    }

    pub fn decrypt_signed(&self, ct: &Ciphertext) -> Result<Vec<i64>> {
        Ok(self.encoder.decode_signed(&bfv::decrypt(ct, &self.secret_key)?))
    }

    /// Sum of the first `stride` decrypted slots modulo p.
    pub fn decrypt_sum(&self, ct: &Ciphertext, stride: usize) -> Result<u64> {
        sum_slots(&self.decrypt(ct)?, 0, stride, self.plain_modulus())
    }

    /// Exact remaining noise budget, measured with the secret key.
    pub fn measure_budget(&self, ct: &Ciphertext) -> Result<f64> {
        bfv::measure_budget(ct, &self.secret_key)
    }

    pub fn add(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
        bfv::bfv_add(a, b)
    }

    pub fn sub(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
        bfv::bfv_sub(a, b)
    }

    pub fn mul(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
        bfv::bfv_mul_and_relin(a, b, &self.relin_key)
    }

    pub fn square(&self, a: &Ciphertext) -> Result<Ciphertext> {
        bfv::bfv_mul_and_relin(a, a, &self.relin_key)
    }

    pub fn mul_scalar(&self, a: &Ciphertext, scalar: i64) -> Ciphertext {
        bfv::bfv_mul_scalar(a, scalar)
    }

    pub fn mul_plain(&self, a: &Ciphertext, pt: &CoeffPoly) -> Result<Ciphertext> {
        bfv::bfv_mul_plain(a, pt)
    }

    pub fn add_plain(&self, a: &Ciphertext, pt: &CoeffPoly) -> Result<Ciphertext> {
        bfv::bfv_add_plain(a, pt)
    }

    /// Add `value` to every logical slot.
    pub fn add_constant(&self, a: &Ciphertext, value: i64) -> Result<Ciphertext> {
        let pt = self.encoder.encode_signed(&vec![value; self.slots()])?;
        bfv::bfv_add_plain(a, &pt)
    }

    /// 1 - x on the logical slots; unused slots stay zero.
    pub fn not(&self, a: &Ciphertext) -> Result<Ciphertext> {
        bfv::bfv_add_plain(&bfv::bfv_neg(a), &self.encoder.constant(1)?)
    }

    /// Keep the slot window [start, end), zero everything else.
    pub fn mask(&self, a: &Ciphertext, start: usize, end: usize) -> Result<Ciphertext> {
        bfv::bfv_mul_plain(a, &self.encoder.mask(start, end)?)
    }

    pub fn rotate_left(&self, a: &Ciphertext, k: usize) -> Result<Ciphertext> {
        bfv::bfv_rotate_left(a, k, &self.galois_keys)
    }

    pub fn rotate_right(&self, a: &Ciphertext, k: usize) -> Result<Ciphertext> {
        bfv::bfv_rotate_right(a, k, &self.galois_keys)
    }
}

/// Sum of `values[start..start + len]` modulo p.
pub fn sum_slots(values: &[u64], start: usize, len: usize, p: u64) -> Result<u64> {
    let window = values.get(start..start + len).ok_or_else(|| {
        crate::error::CohortError::InvalidArgument(format!(
            "slot window [{start}, {}) outside 0..{}",
            start + len,
            values.len()
        ))
    })?;
    Ok(window.iter().fold(0u64, |acc, &v| (acc + v) % p))
}
