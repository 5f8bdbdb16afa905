use rand::Rng;

/// Cumulative table for a centered discrete Gaussian truncated at ±⌈6σ⌉.
struct CdtTable {
    tail: i64,
    cdf: Vec<f64>,
}

impl CdtTable {
    fn new(sigma: f64) -> Self {
        let tail = (6.0 * sigma).ceil() as i64;
        let two_sigma_sq = 2.0 * sigma * sigma;
        let mut cumulative = 0.0f64;
        let cdf = (-tail..=tail)
            .map(|x| {
                cumulative += (-((x * x) as f64) / two_sigma_sq).exp();
                cumulative
            })
            .collect();
        Self { tail, cdf }
    }

    /// Branchless scan over the whole table so timing does not depend on the sample.
    fn sample<R: Rng>(&self, rng: &mut R) -> i64 {
        let total = self.cdf.last().copied().unwrap_or(1.0);
        let u: f64 = rng.random::<f64>() * total;
        let mut result = self.tail;
        for (i, &c) in self.cdf.iter().enumerate().rev() {
            let mask = ((u < c) as i64).wrapping_neg();
            let candidate = -self.tail + i as i64;
            result = (candidate & mask) | (result & !mask);
        }
        result
    }
}

/// Sample n coefficients from the discrete Gaussian with standard deviation σ.
///
/// Samples are bounded by ⌈6σ⌉ in absolute value; the noise estimates in
/// `bfv::noise` rely on that bound.
pub fn sample_gaussian_coeffs<R: Rng>(n: usize, sigma: f64, rng: &mut R) -> Vec<i64> {
    let table = CdtTable::new(sigma);
    (0..n).map(|_| table.sample(rng)).collect()
}

/// Largest absolute value `sample_gaussian_coeffs` can return.
pub fn gaussian_bound(sigma: f64) -> f64 {
    (6.0 * sigma).ceil()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn test_gaussian_moments() {
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        let sigma = 3.2;
        let samples = sample_gaussian_coeffs(10_000, sigma, &mut rng);

        let n = samples.len() as f64;
        let mean = samples.iter().map(|&x| x as f64).sum::<f64>() / n;
        assert!(mean.abs() < 0.5, "mean = {mean}");

        let var = samples.iter().map(|&x| (x as f64 - mean).powi(2)).sum::<f64>() / n;
        assert!((var - sigma * sigma).abs() < 2.0, "var = {var}");

        let bound = gaussian_bound(sigma) as i64;
        assert!(samples.iter().all(|s| s.abs() <= bound));
    }
}
