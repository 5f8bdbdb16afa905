//! cohort-demo: runs every query kind over a small cohort and prints the
//! decrypted results next to the plaintext answers.
//!
//! Usage: `cohort_demo [engine-config.json]`

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use cohort_fhe::prelude::*;

type AppResult<T> = std::result::Result<T, Box<dyn std::error::Error>>;

const SNP0: [i64; 10] = [0, 0, 0, 1, 1, 1, 2, 2, 2, 0];
const SNP1: [i64; 10] = [0, 1, 2, 0, 1, 2, 0, 1, 2, 1];
const OUTCOME: [i64; 10] = [0, 0, 0, 0, 1, 1, 0, 1, 0, 0];
const AGE_BUCKET: [i64; 10] = [3, 7, 1, 0, 8, 5, 2, 6, 4, 3];

fn load_config() -> AppResult<EngineConfig> {
    match std::env::args().nth(1) {
        Some(path) => Ok(EngineConfig::from_json_file(&PathBuf::from(path))?),
        None => Ok(EngineConfig {
            scheme: SchemeConfig::toy(),
            comparator_domain: Some(19),
            ..EngineConfig::default()
        }),
    }
}

fn report(label: &str, encrypted: impl std::fmt::Debug, plain: impl std::fmt::Debug, started: Instant) {
    println!("{label:<28} encrypted={encrypted:<12?} plaintext={plain:<12?} {:>8.1?}", started.elapsed());
}

fn main() -> AppResult<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config()?;
    let params = config.scheme.build_params()?;
    let mut rng = ChaCha20Rng::seed_from_u64(2024);
    let ctx = Arc::new(CryptoContext::with_rng(&params, &mut rng)?);
    info!(n = params.ring_degree, slots = ctx.slots(), "generated keys");

    let genotypes: Vec<Vec<i64>> = (0..SNP0.len()).map(|r| vec![SNP0[r], SNP1[r]]).collect();
    let outcome: Vec<Vec<i64>> = OUTCOME.iter().map(|&v| vec![v]).collect();
    let ages: Vec<Vec<i64>> = AGE_BUCKET.iter().map(|&v| vec![v]).collect();

    let mut db = EncryptedDatabase::new(ctx.clone(), MemoryColumnStore::new(ctx.slots()))?;
    db.set_genotypes(&genotypes)?;
    db.set_binary_pheno(&outcome)?;
    db.set_continuous_pheno(&ages)?;
    db.set_column_headers(vec!["snp0".into(), "snp1".into()]);
    let oracle = PlaintextDatabase::new(genotypes)
        .with_binary_pheno(outcome)
        .with_continuous_pheno(ages);

    let threads = config.threads;
    let engine = QueryEngine::new(&db, config)?;

    let and = EqualityQuery::and(vec![EqualityTerm::new(0, 0), EqualityTerm::new(1, 1)]);
    let or = EqualityQuery::or(vec![EqualityTerm::new(0, 1), EqualityTerm::new(1, 2)]);

    let t = Instant::now();
    report("count snp0=0 AND snp1=1", engine.count_query(&and)?.decrypt(&ctx)?, oracle.count(&and), t);
    let t = Instant::now();
    report("count snp0=1 OR snp1=2", engine.count_query(&or)?.decrypt(&ctx)?, oracle.count(&or), t);
    let t = Instant::now();
    report(
        "count OR, sharded",
        engine.count_query_sharded(&or, threads)?.decrypt(&ctx)?,
        oracle.count(&or),
        t,
    );
    let t = Instant::now();
    report("maf snp1 | AND", engine.maf_query(1, &and)?.decrypt(&ctx)?, oracle.maf(1, &and), t);

    let weights = [PrsWeight::new(0, 2), PrsWeight::new(1, -1)];
    let t = Instant::now();
    report("prs 2*snp0 - snp1", engine.prs_query(&weights)?.decrypt(&ctx)?, oracle.prs(&weights), t);

    let t = Instant::now();
    let target = engine.encrypt_similarity_target(&[2, 2])?;
    report(
        "similarity [2,2] < 4",
        engine.similarity_query(&target, 4, 0)?.decrypt(&ctx)?,
        oracle.similarity(&[2, 2], 4, 0)?,
        t,
    );
    let t = Instant::now();
    report(
        "similarity, sharded",
        engine.similarity_query_sharded(&target, 4, 0, threads)?.decrypt(&ctx)?,
        oracle.similarity(&[2, 2], 4, 0)?,
        t,
    );

    let t = Instant::now();
    report(
        "count age in [2, 6)",
        engine.counting_range_query(2, 6, 0)?.decrypt(&ctx)?,
        oracle.counting_range(2, 6, 0)?,
        t,
    );
    let t = Instant::now();
    report(
        "maf snp0 | age in [0, 5)",
        engine.maf_range_query(0, 0, 5, 0)?.decrypt(&ctx)?,
        oracle.maf_range(0, 0, 5, 0)?,
        t,
    );

    let client = ClientKeys::with_rng(&params, &mut rng)?;
    let gate = KeySwitchGate::new(ctx.clone());
    gate.register_with_rng("analyst", client.public_key(), &mut rng)?;
    let t = Instant::now();
    let switched = gate.apply_squashed("analyst", &engine.count_query(&or)?)?;
    report("count OR, re-keyed", client.decrypt_squashed(&switched)?, oracle.count(&or), t);

    Ok(())
}
