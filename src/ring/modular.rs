//! Word-sized arithmetic modulo primes below 2^62.
//!
//! Residues are always kept in [0, m). Multiplication goes through a 128-bit
//! product and a Barrett step keyed by `barrett_constant(m)`.

/// ⌊2^64 / m⌋ for `barrett_reduce`.
#[inline]
pub fn barrett_constant(m: u64) -> u64 {
    debug_assert!(m > 1);
    ((1u128 << 64) / u128::from(m)) as u64
}

/// `a mod m` for a < m². The one-word estimate is exact up to a single
/// correction when m < 2^32; wider moduli take the 128-bit remainder.
#[inline(always)]
pub fn barrett_reduce(a: u128, m: u64, barrett_k: u64) -> u64 {
    if m >> 32 != 0 {
        return (a % u128::from(m)) as u64;
    }
    let estimate = ((a * u128::from(barrett_k)) >> 64) as u64;
    let r = (a as u64).wrapping_sub(estimate.wrapping_mul(m));
    r.checked_sub(m).unwrap_or(r)
}

#[inline(always)]
pub fn mod_add(a: u64, b: u64, m: u64) -> u64 {
    let (sum, carry) = a.overflowing_add(b);
    if carry || sum >= m { sum.wrapping_sub(m) } else { sum }
}

#[inline(always)]
pub fn mod_sub(a: u64, b: u64, m: u64) -> u64 {
    match a.checked_sub(b) {
        Some(d) => d,
        None => a.wrapping_sub(b).wrapping_add(m),
    }
}

#[inline(always)]
pub fn mod_neg(a: u64, m: u64) -> u64 {
    mod_sub(0, a, m)
}

#[inline(always)]
pub fn mod_mul(a: u64, b: u64, m: u64, barrett_k: u64) -> u64 {
    barrett_reduce(u128::from(a) * u128::from(b), m, barrett_k)
}

/// Square-and-multiply, most significant bit first.
pub fn mod_pow(base: u64, exp: u64, m: u64) -> u64 {
    let bk = barrett_constant(m);
    let base = base % m;
    let mut acc = 1 % m;
    for bit in (0..u64::BITS - exp.leading_zeros()).rev() {
        acc = mod_mul(acc, acc, m, bk);
        if (exp >> bit) & 1 == 1 {
            acc = mod_mul(acc, base, m, bk);
        }
    }
    acc
}

/// Inverse of `a` modulo `m`, or `None` when gcd(a, m) ≠ 1.
pub fn mod_inv(a: u64, m: u64) -> Option<u64> {
    let (mut r0, mut r1) = (i128::from(m), i128::from(a % m));
    let (mut t0, mut t1) = (0i128, 1i128);
    while r1 != 0 {
        let q = r0 / r1;
        (r0, r1) = (r1, r0 - q * r1);
        (t0, t1) = (t1, t0 - q * t1);
    }
    (r0 == 1).then(|| t0.rem_euclid(i128::from(m)) as u64)
}

/// Reduce a signed integer into [0, m).
#[inline(always)]
pub fn reduce_signed(x: i64, m: u64) -> u64 {
    let r = (x as i128).rem_euclid(m as i128);
    r as u64
}

/// Centered representative of a ∈ [0, m) in (-m/2, m/2].
#[inline(always)]
pub fn center(a: u64, m: u64) -> i64 {
    if a > m / 2 {
        -((m - a) as i64)
    } else {
        a as i64
    }
}

/// Deterministic Miller-Rabin for 64-bit integers.
///
/// The first twelve primes as witnesses are exact for every n < 3.3·10^24.
pub fn is_prime(n: u64) -> bool {
    const WITNESSES: [u64; 12] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37];
    if n < 2 {
        return false;
    }
    for &p in &WITNESSES {
        if n % p == 0 {
            return n == p;
        }
    }

    let mut d = n - 1;
    let mut r = 0u32;
    while d % 2 == 0 {
        d /= 2;
        r += 1;
    }

    let bk = barrett_constant(n);
    'witness: for &a in &WITNESSES {
        let mut x = mod_pow(a, d, n);
        if x == 1 || x == n - 1 {
            continue;
        }
        for _ in 1..r {
            x = mod_mul(x, x, n, bk);
            if x == n - 1 {
                continue 'witness;
            }
        }
        return false;
    }
    true
}

/// Generate `count` distinct primes q ≡ 1 (mod 2n) strictly below 2^bits,
/// scanning downward and skipping anything listed in `exclude`.
pub fn ntt_primes(bits: u32, n: usize, count: usize, exclude: &[u64]) -> Option<Vec<u64>> {
    if !(8..=62).contains(&bits) || n == 0 {
        return None;
    }
    let step = 2 * n as u64;
    let upper = 1u64 << bits;
    let mut k = (upper - 2) / step;
    let mut primes = Vec::with_capacity(count);

    while primes.len() < count {
        if k == 0 {
            return None;
        }
        let candidate = k * step + 1;
        if candidate < upper && !exclude.contains(&candidate) && is_prime(candidate) {
            primes.push(candidate);
        }
        k -= 1;
    }
    Some(primes)
}

/// Primitive 2n-th root of unity modulo a prime p ≡ 1 (mod 2n).
///
/// For a power-of-two 2n, ζ = x^((p-1)/2n) is primitive exactly when ζ^n = -1.
pub fn primitive_root_2n(n: usize, p: u64) -> Option<u64> {
    let two_n = 2 * n as u64;
    if p < 3 || (p - 1) % two_n != 0 {
        return None;
    }
    let exponent = (p - 1) / two_n;
    (2..p.min(1 << 20)).find_map(|x| {
        let zeta = mod_pow(x, exponent, p);
        (mod_pow(zeta, n as u64, p) == p - 1).then_some(zeta)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_barrett_matches_remainder() {
        for m in [17u64, 65537, 786433, (1 << 50) - 27] {
            let bk = barrett_constant(m);
            for a in [0u128, 1, m as u128 - 1, m as u128, 123_456_789, (m as u128 - 1) * (m as u128 - 1)] {
                assert_eq!(barrett_reduce(a, m, bk), (a % m as u128) as u64, "a={a} m={m}");
            }
        }
    }

    #[test]
    fn test_word_ops() {
        let m = 65537u64;
        let bk = barrett_constant(m);
        assert_eq!(mod_mul(40_000, 50_000, m, bk), ((40_000u128 * 50_000) % m as u128) as u64);
        assert_eq!(mod_add(m - 3, 5, m), 2);
        assert_eq!(mod_sub(3, 5, m), m - 2);
        assert_eq!(mod_neg(0, m), 0);
        assert_eq!(mod_add(77, mod_neg(77, m), m), 0);
        assert_eq!(mod_pow(3, 0, m), 1);
        assert_eq!(mod_pow(2, 16, m), 65536);
        assert_eq!(mod_pow(3, m - 1, m), 1);

        let big = (1u64 << 62) - 57;
        assert_eq!(mod_add(big - 1, big - 1, big), big - 2);
    }

    #[test]
    fn test_mod_inv() {
        let m = 65537u64;
        let bk = barrett_constant(m);
        for a in [1u64, 2, 3, 6, 12345, m - 1] {
            assert_eq!(mod_mul(a, mod_inv(a, m).unwrap(), m, bk), 1);
        }
        assert_eq!(mod_inv(4, 8), None);
        assert_eq!(mod_inv(0, 17), None);
    }

    #[test]
    fn test_center_and_reduce_signed() {
        assert_eq!(center(16, 17), -1);
        assert_eq!(center(8, 17), 8);
        assert_eq!(center(9, 17), -8);
        assert_eq!(reduce_signed(-1, 17), 16);
        assert_eq!(reduce_signed(-35, 17), 16);
        assert_eq!(reduce_signed(35, 17), 1);
    }

    #[test]
    fn test_is_prime() {
        let primes = [2u64, 3, 17, 257, 7681, 12289, 65537, 786433, 2305843009213693951];
        for p in primes {
            assert!(is_prime(p), "{p} should be prime");
        }
        let composites = [0u64, 1, 4, 65535, 561, 1105, 3215031751, 65537 * 257];
        for c in composites {
            assert!(!is_prime(c), "{c} should be composite");
        }
    }

    #[test]
    fn test_ntt_primes() {
        let n = 32;
        let primes = ntt_primes(50, n, 4, &[]).unwrap();
        assert_eq!(primes.len(), 4);
        for w in primes.windows(2) {
            assert!(w[0] > w[1]);
        }
        for &q in &primes {
            assert!(is_prime(q));
            assert_eq!(q % (2 * n as u64), 1);
            assert!(q < 1 << 50);
        }

        let more = ntt_primes(50, n, 2, &primes).unwrap();
        assert!(more.iter().all(|q| !primes.contains(q)));
    }

    #[test]
    fn test_primitive_root() {
        for n in [16usize, 32, 1024] {
            let p = 65537u64;
            let zeta = primitive_root_2n(n, p).unwrap();
            assert_eq!(mod_pow(zeta, 2 * n as u64, p), 1);
            assert_eq!(mod_pow(zeta, n as u64, p), p - 1);
        }
        assert!(primitive_root_2n(16, 257 * 3).is_none());
    }
}
