use std::sync::Arc;
use crate::error::Result;
use crate::params::{BfvParams, BfvParamsBuilder};

/// Tiny insecure parameters for unit tests: n=16 (8 slots), p=65537,
/// eight 55-bit primes for Q.
///
/// Q leaves room for the deepest query paths (comparator plus two products,
/// masking and a full squash) under the worst-case noise estimate.
pub fn toy() -> Result<Arc<BfvParams>> {
    BfvParamsBuilder::new()
        .ring_degree(16)
        .plain_modulus(65537)
        .ct_primes(55, 8)
        .gadget_base_bits(8)
        .sigma(3.2)
        .build()
}

/// Toy ring with a single logical slot: the single-slot store.
pub fn toy_single_slot() -> Result<Arc<BfvParams>> {
    toy()?.with_slots(1)
}

/// Small insecure parameters for demos: n=1024 (512 slots), p=65537.
pub fn small() -> Result<Arc<BfvParams>> {
    BfvParamsBuilder::new()
        .ring_degree(1024)
        .plain_modulus(65537)
        .ct_primes(55, 10)
        .gadget_base_bits(12)
        .sigma(3.2)
        .build()
}

/// n=4096 (2048 slots), p=65537, twelve 55-bit primes.
pub fn standard() -> Result<Arc<BfvParams>> {
    BfvParamsBuilder::new()
        .ring_degree(4096)
        .plain_modulus(65537)
        .ct_primes(55, 12)
        .gadget_base_bits(16)
        .sigma(3.2)
        .build()
}
