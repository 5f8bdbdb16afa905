//! Worst-case noise growth, tracked in bits of the absolute phase error.
//!
//! The estimates are upper bounds: a ciphertext whose estimated budget is
//! still positive always decrypts correctly. The measured budget from
//! `encrypt::measure_budget` is usually much better.

use crate::params::BfvParams;
use crate::sampling::gaussian::gaussian_bound;

fn log2_sum(a: f64, b: f64) -> f64 {
    a.max(b) + 1.0
}

/// Fresh public-key encryption: e·u + e1 + e2·s, plus the Δ rounding term.
pub fn fresh_pk(params: &BfvParams) -> f64 {
    let b = gaussian_bound(params.sigma);
    let n = params.ring_degree as f64;
    (b * (2.0 * n + 1.0) + params.plain_modulus as f64).log2()
}

/// Fresh secret-key encryption: e plus the Δ rounding term.
pub fn fresh_sk(params: &BfvParams) -> f64 {
    (gaussian_bound(params.sigma) + params.plain_modulus as f64).log2()
}

pub fn add(a: f64, b: f64) -> f64 {
    log2_sum(a, b)
}

/// Adding a plaintext only contributes its Δ rounding term.
pub fn add_plain(params: &BfvParams, a: f64) -> f64 {
    log2_sum(a, (params.plain_modulus as f64).log2())
}

/// Multiplication by an integer scalar, given in centered form.
pub fn scalar(a: f64, c: i64) -> f64 {
    let m = c.unsigned_abs();
    if m <= 1 {
        a
    } else {
        a + (m as f64).log2() + 1.0
    }
}

/// Multiplication by an arbitrary plaintext with centered coefficients.
pub fn mul_plain(params: &BfvParams, a: f64) -> f64 {
    let n = params.ring_degree as f64;
    let half_p = params.plain_modulus as f64 / 2.0;
    a + (n * half_p).log2() + 1.0
}

/// Tensor, rescale and relinearize.
pub fn mul(params: &BfvParams, a: f64, b: f64, relin_bits: f64) -> f64 {
    let growth = (params.plain_modulus as f64).log2() + 2.0 * (params.ring_degree as f64).log2() + 2.0;
    log2_sum(a.max(b) + growth, relin_bits)
}

/// Error added by one key switch: Σ d_i·e_i with balanced digits.
pub fn key_switch(params: &BfvParams, key_error: f64) -> f64 {
    let digits = params.gadget_digits as f64;
    let n = params.ring_degree as f64;
    let half_base = (params.gadget_base() as f64) / 2.0;
    (digits * n * half_base * key_error).log2()
}

/// Key error of a symmetric key-switching key (a single Gaussian).
pub fn symmetric_key_error(params: &BfvParams) -> f64 {
    gaussian_bound(params.sigma)
}

/// Key error of a key-switching key built from a public key: −e·u + e1 + e2·s'.
pub fn public_key_error(params: &BfvParams) -> f64 {
    gaussian_bound(params.sigma) * (2.0 * params.ring_degree as f64 + 1.0)
}

/// Result of switching a ciphertext with estimated noise `a`.
pub fn after_switch(a: f64, switch_bits: f64) -> f64 {
    log2_sum(a, switch_bits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::presets::toy;

    #[test]
    fn test_estimates_are_monotone() {
        let params = toy().unwrap();
        let fresh = fresh_pk(&params);
        assert!(fresh > fresh_sk(&params));
        assert!(add(fresh, fresh) > fresh);
        assert_eq!(scalar(fresh, -1), fresh);
        assert!(scalar(fresh, 6) > fresh + 2.0);
        let ks = key_switch(&params, symmetric_key_error(&params));
        let product = mul(&params, fresh, fresh, ks);
        assert!(product > fresh + 16.0);
        assert!(mul_plain(&params, fresh) > fresh);
    }
}
