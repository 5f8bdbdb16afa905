use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

use cohort_fhe::params::presets::toy;
use cohort_fhe::prelude::*;
use cohort_fhe::query::{EqualityEvaluator, Reducer};

fn setup(seed: u64) -> Arc<CryptoContext> {
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    Arc::new(CryptoContext::with_rng(&toy().unwrap(), &mut rng).unwrap())
}

fn equality_eval(c: &mut Criterion) {
    let ctx = setup(0);
    let evaluator = EqualityEvaluator::new(ctx.plain_modulus()).unwrap();
    let ct = ctx.encrypt_signed(&[0, 1, 2, -1, 2, 1, 0, 0]).unwrap();

    c.bench_function("equality_literal_1", |b| {
        b.iter(|| evaluator.evaluate(&ctx, black_box(&ct), 1).unwrap())
    });
}

fn squash(c: &mut Criterion) {
    let ctx = setup(1);
    let ct = ctx.encrypt(&[1, 0, 1, 1, 0, 0, 1, 1]).unwrap();
    let full = Reducer::new(&ctx, 0.0, None);
    let early = Reducer::new(&ctx, 0.0, Some(1));

    c.bench_function("squash_full", |b| b.iter(|| full.squash(black_box(&ct)).unwrap()));
    c.bench_function("squash_depth_1", |b| b.iter(|| early.squash(black_box(&ct)).unwrap()));
}

fn queries(c: &mut Criterion) {
    let ctx = setup(2);
    let mut db = EncryptedDatabase::new(ctx.clone(), MemoryColumnStore::new(ctx.slots())).unwrap();
    db.generate_genotypes(32, 4, 7).unwrap();
    let engine = QueryEngine::new(&db, EngineConfig::default()).unwrap();
    let query = EqualityQuery::and(vec![EqualityTerm::new(0, 1), EqualityTerm::new(2, 0)]);

    c.bench_function("count_query_32_rows", |b| {
        b.iter(|| engine.count_query(black_box(&query)).unwrap())
    });
    c.bench_function("count_query_32_rows_sharded", |b| {
        b.iter(|| engine.count_query_sharded(black_box(&query), 4).unwrap())
    });
}

criterion_group!(benches, equality_eval, squash, queries);
criterion_main!(benches);
