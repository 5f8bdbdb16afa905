//! Thread-sharded query variants.
//!
//! Work is split into contiguous chunks, the remainder going to the last one,
//! with one scoped OS thread per chunk. Each worker pushes its partial result
//! once into a mutex-guarded list; the caller merges after the join.

use std::ops::Range;
use std::sync::{Mutex, PoisonError};
use std::thread;
use tracing::{debug, instrument};

use crate::bfv::Ciphertext;
use crate::error::{CohortError, Result};
use crate::query::engine::QueryEngine;
use crate::query::reduce::{add_many, mul_many};
use crate::query::types::{EqualityQuery, MafAggregate, PrsResult, PrsWeight, SimilarityAggregate, Squashed};
use crate::store::ColumnStore;

/// Split `0..len` into at most `threads` contiguous chunks.
pub fn partition(len: usize, threads: usize) -> Result<Vec<Range<usize>>> {
    if threads == 0 {
        return Err(CohortError::InvalidArgument("thread count must be at least 1".into()));
    }
    if len == 0 {
        return Ok(Vec::new());
    }
    let workers = threads.min(len);
    let chunk = len / workers;
    Ok((0..workers)
        .map(|i| {
            let end = if i + 1 == workers { len } else { (i + 1) * chunk };
            i * chunk..end
        })
        .collect())
}

/// Run `work` on every range in its own thread; results come back in range order.
fn run_sharded<T, F>(ranges: Vec<Range<usize>>, work: F) -> Result<Vec<T>>
where
    T: Send,
    F: Fn(Range<usize>) -> Result<T> + Sync,
{
    let results: Mutex<Vec<(usize, Result<T>)>> = Mutex::new(Vec::with_capacity(ranges.len()));
    thread::scope(|scope| {
        for (index, range) in ranges.into_iter().enumerate() {
            let results = &results;
            let work = &work;
            scope.spawn(move || {
                let partial = work(range);
                results.lock().unwrap_or_else(PoisonError::into_inner).push((index, partial));
            });
        }
    });
    let mut results = results.into_inner().unwrap_or_else(PoisonError::into_inner);
    results.sort_by_key(|(index, _)| *index);
    results.into_iter().map(|(_, partial)| partial).collect()
}

impl<S: ColumnStore> QueryEngine<'_, S> {
    fn row_shards(&self, threads: usize) -> Result<Vec<Range<usize>>> {
        let shards = partition(self.database().compressed_rows(), threads)?;
        debug!(threads, shards = shards.len(), "sharding compressed rows");
        Ok(shards)
    }

    /// Term sharding reads compressed row 0 only.
    fn require_single_row(&self) -> Result<()> {
        let crows = self.database().compressed_rows();
        if crows != 1 {
            return Err(CohortError::UnsupportedOperation(format!(
                "term sharding needs a single compressed row, database has {crows}"
            )));
        }
        Ok(())
    }

    /// `count_query` with compressed rows split across threads.
    #[instrument(skip(self, query), fields(terms = query.terms.len()))]
    pub fn count_query_sharded(&self, query: &EqualityQuery, threads: usize) -> Result<Squashed> {
        self.check_equality_query(query)?;
        let ctx = self.context();
        let partials = run_sharded(self.row_shards(threads)?, |rows| {
            let filters = rows.map(|crow| self.row_filter(query, crow)).collect::<Result<Vec<_>>>()?;
            add_many(ctx, &filters)
        })?;
        self.reducer().squash(&add_many(ctx, &partials)?)
    }

    /// `maf_query` with compressed rows split across threads.
    #[instrument(skip(self, query), fields(terms = query.terms.len()))]
    pub fn maf_query_sharded(&self, snp: usize, query: &EqualityQuery, threads: usize) -> Result<MafAggregate> {
        self.check_maf_query(snp, query)?;
        let ctx = self.context();
        let partials = run_sharded(self.row_shards(threads)?, |rows| {
            let mut alleles = Vec::with_capacity(rows.len());
            let mut filters = Vec::with_capacity(rows.len());
            for crow in rows {
                let filter = self.row_filter(query, crow)?;
                alleles.push(self.allele_row(snp, &filter, crow)?);
                filters.push(filter);
            }
            Ok((add_many(ctx, &alleles)?, add_many(ctx, &filters)?))
        })?;
        let (alleles, filters): (Vec<Ciphertext>, Vec<Ciphertext>) = partials.into_iter().unzip();
        self.pack_maf(&add_many(ctx, &alleles)?, &add_many(ctx, &filters)?)
    }

    /// `prs_query` with compressed rows split across threads.
    #[instrument(skip(self, weights), fields(weights = weights.len()))]
    pub fn prs_query_sharded(&self, weights: &[PrsWeight], threads: usize) -> Result<PrsResult> {
        self.check_prs(weights)?;
        let partials = run_sharded(self.row_shards(threads)?, |rows| {
            rows.map(|crow| self.prs_row(weights, crow)).collect::<Result<Vec<_>>>()
        })?;
        let db = self.database();
        Ok(PrsResult {
            scores: partials.into_iter().flatten().collect(),
            compressed_rows: db.compressed_rows(),
            rows: db.num_rows(),
        })
    }

    /// `similarity_query` with compressed rows split across threads.
    #[instrument(skip(self, target), fields(dims = target.len()))]
    pub fn similarity_query_sharded(
        &self,
        target: &[Ciphertext],
        threshold: u64,
        outcome_column: usize,
        threads: usize,
    ) -> Result<SimilarityAggregate> {
        let comparator = self.check_similarity(target, outcome_column)?;
        let ctx = self.context();
        let partials = run_sharded(self.row_shards(threads)?, |rows| {
            let mut with = Vec::with_capacity(rows.len());
            let mut without = Vec::with_capacity(rows.len());
            for crow in rows {
                let (w, wo) = self.similarity_row(comparator, target, threshold, outcome_column, crow)?;
                with.push(w);
                without.push(wo);
            }
            Ok((add_many(ctx, &with)?, add_many(ctx, &without)?))
        })?;
        let (with, without): (Vec<Ciphertext>, Vec<Ciphertext>) = partials.into_iter().unzip();
        self.finish_similarity(&with, &without)
    }

    /// Filter of a single-row database with the query terms split across threads.
    fn term_sharded_filter(&self, query: &EqualityQuery, threads: usize) -> Result<Ciphertext> {
        self.require_single_row()?;
        let shards = partition(query.terms.len(), threads)?;
        debug!(threads, shards = shards.len(), "sharding query terms");
        let partials = run_sharded(shards, |terms| {
            self.partial_terms(&query.terms[terms], query.connective, 0)
        })?;
        let product = mul_many(self.context(), &partials)?;
        let filter = self.finish_terms(product, query.connective)?;
        self.mask_if_last(filter, 0)
    }

    /// `count_query` with the terms split across threads; single compressed row only.
    #[instrument(skip(self, query), fields(terms = query.terms.len()))]
    pub fn count_query_term_sharded(&self, query: &EqualityQuery, threads: usize) -> Result<Squashed> {
        self.check_equality_query(query)?;
        let filter = self.term_sharded_filter(query, threads)?;
        self.reducer().squash(&filter)
    }

    /// `maf_query` with the terms split across threads; single compressed row only.
    #[instrument(skip(self, query), fields(terms = query.terms.len()))]
    pub fn maf_query_term_sharded(&self, snp: usize, query: &EqualityQuery, threads: usize) -> Result<MafAggregate> {
        self.check_maf_query(snp, query)?;
        let filter = self.term_sharded_filter(query, threads)?;
        let alleles = self.allele_row(snp, &filter, 0)?;
        self.pack_maf(&alleles, &filter)
    }
}
