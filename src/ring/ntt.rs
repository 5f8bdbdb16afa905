use std::sync::Arc;
use concrete_ntt::prime64::Plan;

use crate::error::{CohortError, Result};
use crate::ring::modular::{barrett_constant, mod_add, mod_mul, mod_neg, mod_sub};

/// One residue of an RNS polynomial, kept in NTT (evaluation) form over
/// Z_q[X]/(X^n + 1).
///
/// Pointwise products in this form are negacyclic products of the
/// underlying coefficient vectors. The evaluation order is whatever
/// `concrete-ntt` uses internally, so it is never inspected directly.
#[derive(Clone, Debug)]
pub struct NttPoly {
    pub evals: Vec<u64>,
    pub modulus: u64,
    pub plan: Arc<Plan>,
}

/// Build a negacyclic NTT plan for (n, q).
pub fn make_plan(n: usize, modulus: u64) -> Result<Arc<Plan>> {
    if !n.is_power_of_two() || n < 16 {
        return Err(CohortError::InvalidRingDegree(n));
    }
    let plan = Plan::try_new(n, modulus).ok_or_else(|| {
        CohortError::InvalidParam(format!(
            "cannot create NTT plan for n={n}, q={modulus} (need prime q ≡ 1 mod {})",
            2 * n
        ))
    })?;
    Ok(Arc::new(plan))
}

impl NttPoly {
    pub fn zero(n: usize, modulus: u64, plan: Arc<Plan>) -> Self {
        Self { evals: vec![0u64; n], modulus, plan }
    }

    /// Forward transform of coefficients already reduced into [0, q).
    pub fn from_coeffs(mut coeffs: Vec<u64>, plan: Arc<Plan>) -> Self {
        plan.fwd(&mut coeffs);
        Self { modulus: plan.modulus(), evals: coeffs, plan }
    }

    /// Inverse transform back to coefficients in [0, q).
    pub fn to_coeffs(&self) -> Vec<u64> {
        let mut coeffs = self.evals.clone();
        self.plan.inv(&mut coeffs);
        self.plan.normalize(&mut coeffs);
        coeffs
    }

    pub fn len(&self) -> usize {
        self.evals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.evals.is_empty()
    }

    fn check_compatible(&self, other: &Self) -> Result<()> {
        if self.modulus != other.modulus {
            return Err(CohortError::ModulusMismatch);
        }
        if self.len() != other.len() {
            return Err(CohortError::DimensionMismatch { expected: self.len(), got: other.len() });
        }
        Ok(())
    }

    pub fn add_assign(&mut self, other: &Self) -> Result<()> {
        self.check_compatible(other)?;
        let q = self.modulus;
        for (a, &b) in self.evals.iter_mut().zip(&other.evals) {
            *a = mod_add(*a, b, q);
        }
        Ok(())
    }

    pub fn sub_assign(&mut self, other: &Self) -> Result<()> {
        self.check_compatible(other)?;
        let q = self.modulus;
        for (a, &b) in self.evals.iter_mut().zip(&other.evals) {
            *a = mod_sub(*a, b, q);
        }
        Ok(())
    }

    pub fn neg_assign(&mut self) {
        let q = self.modulus;
        for a in self.evals.iter_mut() {
            *a = mod_neg(*a, q);
        }
    }

    /// Pointwise product (= negacyclic polynomial product).
    pub fn mul(&self, other: &Self) -> Result<Self> {
        self.check_compatible(other)?;
        let q = self.modulus;
        let bk = barrett_constant(q);
        let evals = self.evals.iter()
            .zip(&other.evals)
            .map(|(&a, &b)| mod_mul(a, b, q, bk))
            .collect();
        Ok(Self { evals, modulus: q, plan: self.plan.clone() })
    }

    /// Accumulate `a * b` into `self`.
    pub fn mul_acc(&mut self, a: &Self, b: &Self) -> Result<()> {
        self.check_compatible(a)?;
        a.check_compatible(b)?;
        let q = self.modulus;
        let bk = barrett_constant(q);
        for ((acc, &x), &y) in self.evals.iter_mut().zip(&a.evals).zip(&b.evals) {
            *acc = mod_add(*acc, mod_mul(x, y, q, bk), q);
        }
        Ok(())
    }

    /// Multiply by a scalar already reduced into [0, q).
    pub fn scalar_mul_assign(&mut self, scalar: u64) {
        let q = self.modulus;
        let bk = barrett_constant(q);
        let s = scalar % q;
        for a in self.evals.iter_mut() {
            *a = mod_mul(*a, s, q, bk);
        }
    }

    pub fn is_zero(&self) -> bool {
        self.evals.iter().all(|&e| e == 0)
    }
}

impl PartialEq for NttPoly {
    fn eq(&self, other: &Self) -> bool {
        self.modulus == other.modulus && self.evals == other.evals
    }
}
