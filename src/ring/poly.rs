use crate::ring::modular::{barrett_constant, center, mod_add, mod_mul, mod_sub};

/// Polynomial in coefficient representation over Z_q[X]/(X^n + 1).
///
/// Used for plaintexts (q = p) and as the exchange format between the
/// batch encoder and the RNS layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoeffPoly {
    pub coeffs: Vec<u64>,
    pub modulus: u64,
}

impl CoeffPoly {
    pub fn zero(n: usize, modulus: u64) -> Self {
        Self { coeffs: vec![0u64; n], modulus }
    }

    /// Create a polynomial from coefficients (reduced mod q).
    pub fn from_coeffs(mut coeffs: Vec<u64>, modulus: u64) -> Self {
        for c in coeffs.iter_mut() {
            *c %= modulus;
        }
        Self { coeffs, modulus }
    }

    pub fn len(&self) -> usize {
        self.coeffs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coeffs.is_empty()
    }

    pub fn is_zero(&self) -> bool {
        self.coeffs.iter().all(|&c| c == 0)
    }

    /// Centered representation: [0, q) -> (-q/2, q/2]
    pub fn centered_coeffs(&self) -> Vec<i64> {
        self.coeffs.iter().map(|&c| center(c, self.modulus)).collect()
    }

    /// Infinity norm of the centered representative.
    pub fn centered_norm(&self) -> u64 {
        self.centered_coeffs().iter().map(|c| c.unsigned_abs()).max().unwrap_or(0)
    }
}

/// Schoolbook product in Z_q[X]/(X^n+1). Reference for tests and tiny rings.
pub fn negacyclic_mul_mod(a: &[u64], b: &[u64], q: u64) -> Vec<u64> {
    let n = a.len();
    let bk = barrett_constant(q);
    let mut result = vec![0u64; n];
    for (i, &ai) in a.iter().enumerate() {
        if ai == 0 {
            continue;
        }
        for (j, &bj) in b.iter().enumerate() {
            if bj == 0 {
                continue;
            }
            let prod = mod_mul(ai, bj, q, bk);
            let idx = i + j;
            if idx < n {
                result[idx] = mod_add(result[idx], prod, q);
            } else {
                result[idx - n] = mod_sub(result[idx - n], prod, q);
            }
        }
    }
    result
}

/// Apply X ↦ X^k to a coefficient vector modulo q.
///
/// Since X^n = -1 this is a signed permutation; k must be odd so the map is
/// a ring automorphism.
pub fn automorphism_coeffs(coeffs: &[u64], k: usize, q: u64) -> Vec<u64> {
    let n = coeffs.len();
    let mut result = vec![0u64; n];
    for (i, &c) in coeffs.iter().enumerate() {
        if c == 0 {
            continue;
        }
        let e = (i * k) % (2 * n);
        if e < n {
            result[e] = mod_add(result[e], c, q);
        } else {
            result[e - n] = mod_sub(result[e - n], c, q);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_coeffs_reduces() {
        let p = CoeffPoly::from_coeffs(vec![17, 18, 3, 0], 17);
        assert_eq!(p.coeffs, vec![0, 1, 3, 0]);
        assert!(!p.is_zero());
        assert!(CoeffPoly::zero(4, 17).is_zero());
    }

    #[test]
    fn test_negacyclic_wraparound() {
        // X^3 * X^3 = X^6 = -X^2 in Z_17[X]/(X^4+1)
        let a = vec![0, 0, 0, 1];
        assert_eq!(negacyclic_mul_mod(&a, &a, 17), vec![0, 0, 16, 0]);
        // (1 + X)^2 = 1 + 2X + X^2
        let b = vec![1, 1, 0, 0];
        assert_eq!(negacyclic_mul_mod(&b, &b, 17), vec![1, 2, 1, 0]);
    }

    #[test]
    fn test_centered() {
        let a = CoeffPoly::from_coeffs(vec![0, 1, 16, 9], 17);
        assert_eq!(a.centered_coeffs(), vec![0, 1, -1, -8]);
        assert_eq!(a.centered_norm(), 8);
    }

    #[test]
    fn test_automorphism() {
        // 1 + X + X^2 + X^3 under X -> X^3 in Z_17[X]/(X^4+1):
        // X -> X^3, X^2 -> X^6 = -X^2, X^3 -> X^9 = X
        let r = automorphism_coeffs(&[1, 1, 1, 1], 3, 17);
        assert_eq!(r, vec![1, 1, 16, 1]);
    }

    #[test]
    fn test_automorphism_is_ring_map() {
        let q = 97;
        let a = vec![3, 0, 5, 1, 0, 0, 2, 7];
        let b = vec![1, 4, 0, 0, 9, 0, 0, 1];
        let k = 5;
        let lhs = automorphism_coeffs(&negacyclic_mul_mod(&a, &b, q), k, q);
        let rhs = negacyclic_mul_mod(
            &automorphism_coeffs(&a, k, q),
            &automorphism_coeffs(&b, k, q),
            q,
        );
        assert_eq!(lhs, rhs);
    }
}
