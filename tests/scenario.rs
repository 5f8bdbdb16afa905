use std::sync::Arc;

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

use cohort_fhe::params::presets::toy;
use cohort_fhe::prelude::*;

const SNP0: [i64; 10] = [0, 0, 0, 1, 1, 1, 2, 2, 2, 0];
const SNP1: [i64; 10] = [0, 1, 2, 0, 1, 2, 0, 1, 2, 1];
const OUTCOME: [i64; 10] = [0, 0, 0, 0, 1, 1, 0, 1, 0, 0];
const BUCKET: [i64; 10] = [3, 7, 1, 0, 8, 5, 2, 6, 4, 3];

fn config() -> EngineConfig {
    EngineConfig { scheme: SchemeConfig::toy(), comparator_domain: Some(19), ..EngineConfig::default() }
}

fn cohort(seed: u64) -> (EncryptedDatabase<MemoryColumnStore>, PlaintextDatabase) {
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    let ctx = Arc::new(CryptoContext::with_rng(&toy().unwrap(), &mut rng).unwrap());
    let genotypes: Vec<Vec<i64>> = (0..10).map(|r| vec![SNP0[r], SNP1[r]]).collect();
    let outcome: Vec<Vec<i64>> = OUTCOME.iter().map(|&v| vec![v]).collect();
    let bucket: Vec<Vec<i64>> = BUCKET.iter().map(|&v| vec![v]).collect();

    let mut db = EncryptedDatabase::new(ctx.clone(), MemoryColumnStore::new(ctx.slots())).unwrap();
    db.set_genotypes(&genotypes).unwrap();
    db.set_binary_pheno(&outcome).unwrap();
    db.set_continuous_pheno(&bucket).unwrap();
    let oracle = PlaintextDatabase::new(genotypes)
        .with_binary_pheno(outcome)
        .with_continuous_pheno(bucket);
    (db, oracle)
}

#[test]
fn test_count_queries_match_plaintext() {
    let (db, oracle) = cohort(1);
    let engine = QueryEngine::new(&db, config()).unwrap();
    let ctx = engine.context();
    assert_eq!(db.compressed_rows(), 2);

    let and = EqualityQuery::and(vec![EqualityTerm::new(0, 0), EqualityTerm::new(1, 1)]);
    let or = EqualityQuery::or(vec![EqualityTerm::new(0, 1), EqualityTerm::new(1, 2)]);
    let single = EqualityQuery::and(vec![EqualityTerm::new(1, 2)]);

    assert_eq!(engine.count_query(&and).unwrap().decrypt(ctx).unwrap(), 2);
    assert_eq!(engine.count_query(&or).unwrap().decrypt(ctx).unwrap(), 5);
    for query in [&and, &or, &single] {
        let got = engine.count_query(query).unwrap().decrypt(ctx).unwrap();
        assert_eq!(got, oracle.count(query), "{query:?}");
    }
}

#[test]
fn test_maf_queries_match_plaintext() {
    let (db, oracle) = cohort(2);
    let engine = QueryEngine::new(&db, config()).unwrap();
    let ctx = engine.context();

    let and = EqualityQuery::and(vec![EqualityTerm::new(0, 0), EqualityTerm::new(1, 1)]);
    let maf = engine.maf_query(1, &and).unwrap();
    assert!(matches!(maf.denominator, Denominator::Packed { offset } if offset == maf.stride));
    assert_eq!(maf.decrypt(ctx).unwrap(), (2, 4));

    let or = EqualityQuery::or(vec![EqualityTerm::new(0, 2), EqualityTerm::new(1, 0)]);
    let (alleles, denom) = engine.maf_query(0, &or).unwrap().decrypt(ctx).unwrap();
    let (want_alleles, want_denom) = oracle.maf(0, &or);
    assert_eq!((alleles as i64, denom), (want_alleles, want_denom));
}

#[test]
fn test_prs_matches_plaintext() {
    let (db, oracle) = cohort(3);
    let engine = QueryEngine::new(&db, config()).unwrap();
    let weights = [PrsWeight::new(0, 2), PrsWeight::new(1, -1)];
    let scores = engine.prs_query(&weights).unwrap().decrypt(engine.context()).unwrap();
    assert_eq!(scores.len(), 10);
    assert_eq!(scores, oracle.prs(&weights));
}

#[test]
fn test_similarity_matches_plaintext() {
    let (db, oracle) = cohort(4);
    let engine = QueryEngine::new(&db, config()).unwrap();
    let ctx = engine.context();

    let target = engine.encrypt_similarity_target(&[2, 2]).unwrap();
    let result = engine.similarity_query(&target, 4, 0).unwrap().decrypt(ctx).unwrap();
    assert_eq!(result, (3, 1));
    assert_eq!(result, oracle.similarity(&[2, 2], 4, 0).unwrap());

    // a packed target expands to the same per-dimension broadcasts
    let packed = ctx.encrypt(&[0, 1]).unwrap();
    let expanded = engine.expand_target(&packed, 2).unwrap();
    let result = engine.similarity_query(&expanded, 3, 0).unwrap().decrypt(ctx).unwrap();
    assert_eq!(result, oracle.similarity(&[0, 1], 3, 0).unwrap());
}

#[test]
fn test_range_queries_match_plaintext() {
    let (db, oracle) = cohort(5);
    let engine = QueryEngine::new(&db, config()).unwrap();
    let ctx = engine.context();

    for (lower, upper) in [(0, 5), (2, 6), (0, 9), (4, 4)] {
        let count = engine.counting_range_query(lower, upper, 0).unwrap().decrypt(ctx).unwrap();
        assert_eq!(count, oracle.counting_range(lower, upper, 0).unwrap(), "[{lower}, {upper})");
    }

    let (alleles, denom) = engine.maf_range_query(1, 3, 8, 0).unwrap().decrypt(ctx).unwrap();
    let (want_alleles, want_denom) = oracle.maf_range(1, 3, 8, 0).unwrap();
    assert_eq!((alleles as i64, denom), (want_alleles, want_denom));

    assert!(matches!(engine.counting_range_query(0, 20, 0), Err(CohortError::InvalidArgument(_))));
    assert!(matches!(engine.counting_range_query(5, 2, 0), Err(CohortError::InvalidArgument(_))));
    assert!(matches!(engine.counting_range_query(0, 2, 1), Err(CohortError::InvalidArgument(_))));
}

#[test]
fn test_fixed_reduction_depth_keeps_totals() {
    let (db, oracle) = cohort(6);
    let config = EngineConfig { reduction_depth: Some(0), ..config() };
    let engine = QueryEngine::new(&db, config).unwrap();
    let or = EqualityQuery::or(vec![EqualityTerm::new(0, 1), EqualityTerm::new(1, 2)]);
    let count = engine.count_query(&or).unwrap();
    assert_eq!(count.stride, 4);
    assert_eq!(count.decrypt(engine.context()).unwrap(), oracle.count(&or));
}

#[test]
fn test_result_rekeyed_for_client() {
    let (db, oracle) = cohort(7);
    let engine = QueryEngine::new(&db, config()).unwrap();
    let ctx = db.context().clone();
    let mut rng = ChaCha20Rng::seed_from_u64(70);
    let analyst = ClientKeys::with_rng(ctx.params(), &mut rng).unwrap();
    let gate = KeySwitchGate::new(ctx.clone());
    gate.register_with_rng("analyst", analyst.public_key(), &mut rng).unwrap();

    let and = EqualityQuery::and(vec![EqualityTerm::new(0, 0), EqualityTerm::new(1, 1)]);
    let switched = gate.apply_squashed("analyst", &engine.count_query(&and).unwrap()).unwrap();
    assert_eq!(analyst.decrypt_squashed(&switched).unwrap(), oracle.count(&and));
    assert!(matches!(
        gate.apply_squashed("nobody", &switched),
        Err(CohortError::Unauthorized(_))
    ));
}
