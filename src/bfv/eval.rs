use crate::error::{CohortError, Result};
use crate::ring::modular::center;
use crate::ring::poly::CoeffPoly;
use crate::ring::rns::RnsPoly;
use crate::bfv::{noise, Ciphertext};
use crate::bfv::encrypt::{scale_plaintext, scale_round};
use crate::bfv::keygen::{GaloisKeys, RelinKey};
use crate::bfv::keyswitch::relinearize;

fn check_pair(a: &Ciphertext, b: &Ciphertext) -> Result<()> {
    if !a.params.is_compatible(&b.params) {
        return Err(CohortError::ModulusMismatch);
    }
    Ok(())
}

fn zip_components(
    a: &Ciphertext,
    b: &Ciphertext,
    op: impl Fn(&RnsPoly, &RnsPoly) -> Result<RnsPoly>,
    missing_b: impl Fn(&RnsPoly) -> RnsPoly,
) -> Result<Vec<RnsPoly>> {
    let len = a.c.len().max(b.c.len());
    (0..len)
        .map(|i| match (a.c.get(i), b.c.get(i)) {
            (Some(x), Some(y)) => op(x, y),
            (Some(x), None) => Ok(x.clone()),
            (None, Some(y)) => Ok(missing_b(y)),
            (None, None) => Err(CohortError::DimensionMismatch { expected: len, got: i }),
        })
        .collect()
}

/// Homomorphic addition, slot by slot.
pub fn bfv_add(a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
    check_pair(a, b)?;
    let c = zip_components(a, b, |x, y| x.add(y), RnsPoly::clone)?;
    Ok(Ciphertext { c, params: a.params.clone(), noise_bits: noise::add(a.noise_bits, b.noise_bits) })
}

pub fn bfv_sub(a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
    check_pair(a, b)?;
    let c = zip_components(a, b, |x, y| x.sub(y), RnsPoly::neg)?;
    Ok(Ciphertext { c, params: a.params.clone(), noise_bits: noise::add(a.noise_bits, b.noise_bits) })
}

pub fn bfv_neg(ct: &Ciphertext) -> Ciphertext {
    Ciphertext {
        c: ct.c.iter().map(RnsPoly::neg).collect(),
        params: ct.params.clone(),
        noise_bits: ct.noise_bits,
    }
}

/// ct + pt, adding Δ·pt to c0.
pub fn bfv_add_plain(ct: &Ciphertext, pt: &CoeffPoly) -> Result<Ciphertext> {
    let delta_m = scale_plaintext(pt, &ct.params)?;
    let mut out = ct.clone();
    out.c[0].add_assign(&delta_m)?;
    out.noise_bits = noise::add_plain(&ct.params, ct.noise_bits);
    Ok(out)
}

/// Multiply every slot by an integer; `scalar` is read in centered form.
pub fn bfv_mul_scalar(ct: &Ciphertext, scalar: i64) -> Ciphertext {
    let p = ct.params.plain_modulus;
    let centered = center(scalar.rem_euclid(p as i64) as u64, p);
    Ciphertext {
        c: ct.c.iter().map(|ci| ci.scalar_mul_signed(centered)).collect(),
        params: ct.params.clone(),
        noise_bits: noise::scalar(ct.noise_bits, centered),
    }
}

/// Slot-wise product with a plaintext (masks, one-hot vectors).
pub fn bfv_mul_plain(ct: &Ciphertext, pt: &CoeffPoly) -> Result<Ciphertext> {
    let params = &ct.params;
    if pt.modulus != params.plain_modulus {
        return Err(CohortError::ModulusMismatch);
    }
    let lifted = RnsPoly::from_signed(&pt.centered_coeffs(), &params.ct_basis)?;
    let c = ct.c.iter().map(|ci| ci.mul(&lifted)).collect::<Result<Vec<_>>>()?;
    Ok(Ciphertext { c, params: params.clone(), noise_bits: noise::mul_plain(params, ct.noise_bits) })
}

/// Refuse to multiply operands that no longer decrypt.
pub fn ensure_budget(ct: &Ciphertext, floor: f64) -> Result<()> {
    let remaining = ct.remaining_budget();
    if remaining < floor {
        return Err(CohortError::NoiseBudgetExceeded { remaining, floor });
    }
    Ok(())
}

/// Homomorphic multiplication followed by relinearization.
///
/// Components are lifted from Q into Q∪P, where the tensor product is exact,
/// then every coefficient is scaled by p/Q with rounding and reduced back to Q.
pub fn bfv_mul_and_relin(a: &Ciphertext, b: &Ciphertext, rlk: &RelinKey) -> Result<Ciphertext> {
    check_pair(a, b)?;
    if a.c.len() != 2 || b.c.len() != 2 {
        return Err(CohortError::InvalidParam("multiplication needs degree-1 ciphertexts".into()));
    }
    ensure_budget(a, 0.0)?;
    ensure_budget(b, 0.0)?;

    let params = &a.params;
    let q = &params.ct_basis;
    let qp = &params.mul_basis;

    let a0 = a.c[0].switch_basis(q, qp)?;
    let a1 = a.c[1].switch_basis(q, qp)?;
    let b0 = b.c[0].switch_basis(q, qp)?;
    let b1 = b.c[1].switch_basis(q, qp)?;

    let t0 = a0.mul(&b0)?;
    let mut t1 = a0.mul(&b1)?;
    t1.mul_acc(&a1, &b0)?;
    let t2 = a1.mul(&b1)?;

    let rescale = |t: &RnsPoly| -> Result<RnsPoly> {
        let scaled: Vec<_> = t.to_centered_bigints(qp)
            .iter()
            .map(|x| scale_round(x, params.plain_modulus, &q.product))
            .collect();
        RnsPoly::from_bigints(&scaled, q)
    };
    let tensor = [rescale(&t0)?, rescale(&t1)?, rescale(&t2)?];
    let (c0, c1) = relinearize(&tensor, rlk)?;

    Ok(Ciphertext {
        c: vec![c0, c1],
        params: params.clone(),
        noise_bits: noise::mul(params, a.noise_bits, b.noise_bits, rlk.key.noise_bits),
    })
}

/// Apply one Galois automorphism and switch back to s.
fn apply_galois(ct: &Ciphertext, gk: &GaloisKeys, bit: usize) -> Result<Ciphertext> {
    let (key, element) = gk.get(bit)?;
    let c0 = ct.c[0].automorphism(element);
    let c1 = ct.c[1].automorphism(element);
    let (mut k0, k1) = key.switch(&c1)?;
    k0.add_assign(&c0)?;
    Ok(Ciphertext {
        c: vec![k0, k1],
        params: ct.params.clone(),
        noise_bits: noise::after_switch(ct.noise_bits, key.noise_bits),
    })
}

/// Rotate row 0 left: new slot j holds old slot j + k (mod n/2).
///
/// Shifts compose from the binary expansion of k over the power-of-two keys.
pub fn bfv_rotate_left(ct: &Ciphertext, k: usize, gk: &GaloisKeys) -> Result<Ciphertext> {
    if ct.c.len() != 2 {
        return Err(CohortError::InvalidParam("rotation needs a degree-1 ciphertext".into()));
    }
    if !ct.params.is_compatible(&gk.params) {
        return Err(CohortError::ModulusMismatch);
    }
    let row = ct.params.row_size();
    let mut shift = k % row;
    let mut out = ct.clone();
    let mut bit = 0;
    while shift > 0 {
        if shift & 1 == 1 {
            out = apply_galois(&out, gk, bit)?;
        }
        shift >>= 1;
        bit += 1;
    }
    Ok(out)
}

/// Rotate row 0 right by k, i.e. left by n/2 - k.
pub fn bfv_rotate_right(ct: &Ciphertext, k: usize, gk: &GaloisKeys) -> Result<Ciphertext> {
    let row = ct.params.row_size();
    bfv_rotate_left(ct, (row - k % row) % row, gk)
}
