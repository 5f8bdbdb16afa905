use std::sync::Arc;

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

use cohort_fhe::params::presets::toy;
use cohort_fhe::prelude::*;

fn config() -> EngineConfig {
    EngineConfig { scheme: SchemeConfig::toy(), comparator_domain: Some(19), ..EngineConfig::default() }
}

fn context(seed: u64) -> Arc<CryptoContext> {
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    Arc::new(CryptoContext::with_rng(&toy().unwrap(), &mut rng).unwrap())
}

fn rows() -> (Vec<Vec<i64>>, Vec<Vec<i64>>) {
    let genotypes = vec![vec![0, 1], vec![1, 1], vec![2, 2], vec![1, 0], vec![0, 2], vec![2, 1], vec![1, 2]];
    let pheno = vec![vec![1], vec![0], vec![1], vec![1], vec![0], vec![0], vec![1]];
    (genotypes, pheno)
}

fn assert_agrees<S: ColumnStore>(db: &EncryptedDatabase<S>, oracle: &PlaintextDatabase) {
    let engine = QueryEngine::new(db, config()).unwrap();
    let ctx = engine.context();
    let queries = [
        EqualityQuery::and(vec![EqualityTerm::new(0, 1)]),
        EqualityQuery::or(vec![EqualityTerm::new(0, 2), EqualityTerm::new(1, 2)]),
    ];
    for query in &queries {
        assert_eq!(engine.count_query(query).unwrap().decrypt(ctx).unwrap(), oracle.count(query), "{query:?}");
    }
    let weights = [PrsWeight::new(0, 1), PrsWeight::new(1, 1)];
    assert_eq!(engine.prs_query(&weights).unwrap().decrypt(ctx).unwrap(), oracle.prs(&weights));
}

#[test]
fn test_dml_sequence_tracks_plaintext() {
    let ctx = context(21);
    let (genotypes, pheno) = rows();
    let mut db = EncryptedDatabase::new(ctx.clone(), MemoryColumnStore::new(ctx.slots())).unwrap();
    db.set_genotypes(&genotypes).unwrap();
    db.set_binary_pheno(&pheno).unwrap();
    let mut oracle = PlaintextDatabase::new(genotypes).with_binary_pheno(pheno);
    assert_agrees(&db, &oracle);

    db.update_one_value(3, 1, 2).unwrap();
    oracle.update_one_value(3, 1, 2);
    db.update_one_row(0, &[1, 1]).unwrap();
    oracle.update_one_row(0, &[1, 1]);
    assert_agrees(&db, &oracle);

    // slot 7 of the first compressed row, then a second compressed row
    assert_eq!(db.insert_one_row(&[2, 0]).unwrap(), 7);
    assert_eq!(oracle.insert_one_row(&[2, 0]), 7);
    assert_eq!(db.insert_one_row(&[1, 1]).unwrap(), 8);
    assert_eq!(oracle.insert_one_row(&[1, 1]), 8);
    assert_eq!(db.compressed_rows(), 2);
    assert_agrees(&db, &oracle);

    db.delete_row_addition(2, &[2, 2]).unwrap();
    oracle.delete_row_addition(2, &[2, 2]);
    db.delete_row_multiplication(8).unwrap();
    oracle.delete_row_multiplication(8);
    assert_eq!(db.num_deletes(), 1);
    assert_agrees(&db, &oracle);

    let engine = QueryEngine::new(&db, config()).unwrap();
    let target = engine.encrypt_similarity_target(&[2, 0]).unwrap();
    let got = engine.similarity_query(&target, 2, 0).unwrap().decrypt(engine.context()).unwrap();
    assert_eq!(got, oracle.similarity(&[2, 0], 2, 0).unwrap());
}

#[test]
fn test_deleted_row_reads_as_missing() {
    let ctx = context(25);
    let genotypes = vec![vec![1], vec![2], vec![1]];
    let mut db = EncryptedDatabase::new(ctx.clone(), MemoryColumnStore::new(ctx.slots())).unwrap();
    db.set_genotypes(&genotypes).unwrap();
    let mut oracle = PlaintextDatabase::new(genotypes);

    db.delete_row_multiplication(1).unwrap();
    oracle.delete_row_multiplication(1);
    let engine = QueryEngine::new(&db, config()).unwrap();
    for value in 0..=2 {
        let query = EqualityQuery::and(vec![EqualityTerm::new(0, value)]);
        let got = engine.count_query(&query).unwrap().decrypt(&ctx).unwrap();
        assert_eq!(got, oracle.count(&query), "snp0={value}");
    }
    let zero = EqualityQuery::and(vec![EqualityTerm::new(0, 0)]);
    assert_eq!(engine.count_query(&zero).unwrap().decrypt(&ctx).unwrap(), 0);
    // neither 0 nor 2 matches the deleted row
    let either = EqualityQuery::or(vec![EqualityTerm::new(0, 0), EqualityTerm::new(0, 2)]);
    let (_, denom) = engine.maf_query(0, &either).unwrap().decrypt(&ctx).unwrap();
    assert_eq!(denom, 0);
}

#[test]
fn test_dml_rejects_bad_coordinates() {
    let ctx = context(22);
    let (genotypes, _) = rows();
    let mut db = EncryptedDatabase::new(ctx.clone(), MemoryColumnStore::new(ctx.slots())).unwrap();
    db.set_genotypes(&genotypes).unwrap();
    assert!(matches!(db.update_one_value(7, 0, 1), Err(CohortError::InvalidArgument(_))));
    assert!(db.update_one_value(0, 2, 1).is_err());
    assert!(db.update_one_row(0, &[1]).is_err());
    assert!(db.insert_one_row(&[1, 1, 1]).is_err());
    assert!(db.delete_row_multiplication(9).is_err());
    assert_eq!(db.num_deletes(), 0);
}

#[test]
fn test_similarity_refused_after_delete_limit() {
    let ctx = context(23);
    let (genotypes, pheno) = rows();
    let mut db = EncryptedDatabase::new(ctx.clone(), MemoryColumnStore::new(ctx.slots())).unwrap();
    db.set_genotypes(&genotypes).unwrap();
    db.set_binary_pheno(&pheno).unwrap();
    for row in 0..6 {
        db.delete_row_multiplication(row).unwrap();
    }
    assert_eq!(db.num_deletes(), 6);

    let engine = QueryEngine::new(&db, config()).unwrap();
    let target = engine.encrypt_similarity_target(&[1, 1]).unwrap();
    assert!(matches!(
        engine.similarity_query(&target, 3, 0),
        Err(CohortError::StaleCiphertextState { deletes: 6, limit: 5 })
    ));
    assert!(matches!(
        engine.similarity_query_sharded(&target, 3, 0, 2),
        Err(CohortError::StaleCiphertextState { .. })
    ));

    // other queries still run over the masked rows
    let query = EqualityQuery::and(vec![EqualityTerm::new(0, 1)]);
    assert_eq!(engine.count_query(&query).unwrap().decrypt(engine.context()).unwrap(), 1);

    // a higher limit lets it through
    let relaxed = QueryEngine::new(&db, EngineConfig { delete_limit: 6, ..config() }).unwrap();
    assert!(relaxed.similarity_query(&target, 3, 0).is_ok());

    // reloading genotypes starts a fresh count
    db.set_genotypes(&genotypes).unwrap();
    assert_eq!(db.num_deletes(), 0);
}

#[test]
fn test_disk_store_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(24);
    let (genotypes, pheno) = rows();
    let oracle = PlaintextDatabase::new(genotypes.clone()).with_binary_pheno(pheno.clone());

    {
        let store = DiskColumnStore::create(dir.path(), ctx.params()).unwrap();
        let mut db = EncryptedDatabase::new(ctx.clone(), store).unwrap();
        db.set_genotypes(&genotypes).unwrap();
        db.set_binary_pheno(&pheno).unwrap();
        assert_agrees(&db, &oracle);
    }

    let reopened = DiskColumnStore::open(dir.path(), ctx.params()).unwrap();
    let db = EncryptedDatabase::new(ctx.clone(), reopened).unwrap();
    assert_eq!(db.num_rows(), 7);
    assert!(db.is_set(ColumnKind::BinaryPheno));
    assert_agrees(&db, &oracle);

    let engine = QueryEngine::new(&db, config()).unwrap();
    let target = engine.encrypt_similarity_target(&[1, 1]).unwrap();
    let got = engine.similarity_query(&target, 2, 0).unwrap().decrypt(engine.context()).unwrap();
    assert_eq!(got, oracle.similarity(&[1, 1], 2, 0).unwrap());

    std::fs::remove_dir_all(dir.path().join("genotype")).unwrap();
    let query = EqualityQuery::and(vec![EqualityTerm::new(0, 1)]);
    assert!(matches!(engine.count_query(&query), Err(CohortError::StorageIo { .. })));
}
