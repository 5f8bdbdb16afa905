use rand::Rng;

use crate::ring::rns::{RnsBasis, RnsPoly};
use crate::ring::ntt::NttPoly;

/// Uniform element of R_Q.
///
/// Independent uniform residues are uniform modulo Q by CRT, so each prime is
/// sampled on its own with rejection sampling to avoid bias.
pub fn sample_uniform_rns<R: Rng>(basis: &RnsBasis, rng: &mut R) -> RnsPoly {
    let n = basis.ring_degree;
    let components = basis.moduli.iter()
        .zip(&basis.plans)
        .map(|(&q, plan)| {
            let mask = (1u64 << (64 - q.leading_zeros())) - 1;
            let coeffs = (0..n)
                .map(|_| loop {
                    let v = rng.random::<u64>() & mask;
                    if v < q {
                        break v;
                    }
                })
                .collect();
            NttPoly::from_coeffs(coeffs, plan.clone())
        })
        .collect();
    RnsPoly { components, ring_degree: n }
}

/// Ternary coefficients, each of {-1, 0, 1} with probability 1/3.
pub fn sample_ternary_coeffs<R: Rng>(n: usize, rng: &mut R) -> Vec<i64> {
    (0..n)
        .map(|_| loop {
            let r = rng.random::<u8>() & 0x03;
            if r < 3 {
                break r as i64 - 1;
            }
        })
        .collect()
}

/// Binary coefficients in {0, 1}.
pub fn sample_binary_coeffs<R: Rng>(n: usize, rng: &mut R) -> Vec<i64> {
    (0..n).map(|_| (rng.random::<u64>() & 1) as i64).collect()
}
