use tracing::{debug, info, instrument};

use crate::bfv::Ciphertext;
use crate::config::EngineConfig;
use crate::context::CryptoContext;
use crate::database::EncryptedDatabase;
use crate::error::{CohortError, Result};
use crate::query::comparator::{InterpolationComparator, RangeComparator};
use crate::query::equality::{EqualityEvaluator, MAX_LITERAL};
use crate::query::reduce::{add_many, mul_many, Reducer};
use crate::query::types::{
    Connective, EqualityQuery, EqualityTerm, MafAggregate, PrsResult, PrsWeight, SimilarityAggregate,
    Squashed,
};
use crate::store::{ColumnKind, ColumnStore};

/// Largest (g - t)² for g, t in {-1, 0, 1, 2}.
const MAX_SQUARED_GAP: u64 = 9;

/// Evaluates aggregate queries over an encrypted database.
///
/// Holds the equality constants for the database's plaintext modulus and the
/// optional comparator used by range and similarity queries.
pub struct QueryEngine<'a, S: ColumnStore> {
    db: &'a EncryptedDatabase<S>,
    config: EngineConfig,
    equality: EqualityEvaluator,
    comparator: Option<Box<dyn RangeComparator>>,
}

impl<'a, S: ColumnStore> QueryEngine<'a, S> {
    /// Build an engine over `db`. The comparator domain is checked against the
    /// database context's plaintext modulus, not `config.scheme`.
    pub fn new(db: &'a EncryptedDatabase<S>, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let p = db.context().plain_modulus();
        if let Some(domain) = config.comparator_domain.filter(|&d| d >= p) {
            return Err(CohortError::Config(format!(
                "comparator domain {domain} must be below the database plaintext modulus {p}"
            )));
        }
        let equality = EqualityEvaluator::new(p)?;
        let comparator = match config.comparator_domain {
            Some(domain) => Some(Box::new(InterpolationComparator::new(domain, p)?) as Box<dyn RangeComparator>),
            None => None,
        };
        Ok(Self { db, config, equality, comparator })
    }

    /// Replace the configured comparator.
    pub fn with_comparator(mut self, comparator: Box<dyn RangeComparator>) -> Self {
        self.comparator = Some(comparator);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn database(&self) -> &EncryptedDatabase<S> {
        self.db
    }

    pub fn context(&self) -> &CryptoContext {
        self.db.context()
    }

    pub(crate) fn reducer(&self) -> Reducer<'_> {
        let depth = self.config.reduction_depth.or_else(|| self.db.chunking_factor());
        Reducer::new(self.context(), self.config.early_termination_floor, depth)
    }

    // ----------------------------------------------------------------
    // Validation
    // ----------------------------------------------------------------

    fn check_genotype_column(&self, column: usize) -> Result<()> {
        if !self.db.is_set(ColumnKind::Genotype) {
            return Err(CohortError::InvalidArgument("genotype data has not been set".into()));
        }
        if column >= self.db.genotype_columns() {
            return Err(CohortError::InvalidArgument(format!(
                "genotype column {column} out of range (have {})",
                self.db.genotype_columns()
            )));
        }
        Ok(())
    }

    pub(crate) fn check_equality_query(&self, query: &EqualityQuery) -> Result<()> {
        if query.terms.is_empty() {
            return Err(CohortError::InvalidArgument("query has no terms".into()));
        }
        for term in &query.terms {
            if term.value > MAX_LITERAL {
                return Err(CohortError::InvalidArgument(format!(
                    "equality literal {} outside 0..={MAX_LITERAL}",
                    term.value
                )));
            }
            self.check_genotype_column(term.column)?;
        }
        Ok(())
    }

    pub(crate) fn check_maf_query(&self, snp: usize, query: &EqualityQuery) -> Result<()> {
        self.check_genotype_column(snp)?;
        self.check_equality_query(query)
    }

    pub(crate) fn check_prs(&self, weights: &[PrsWeight]) -> Result<()> {
        if weights.is_empty() {
            return Err(CohortError::InvalidArgument("no PRS weights".into()));
        }
        weights.iter().try_for_each(|w| self.check_genotype_column(w.column))
    }

    fn comparator(&self) -> Result<&dyn RangeComparator> {
        self.comparator.as_deref().ok_or_else(|| {
            CohortError::UnsupportedOperation("no comparator configured".into())
        })
    }

    pub(crate) fn check_range(&self, lower: u64, upper: u64, column: usize) -> Result<&dyn RangeComparator> {
        let comparator = self.comparator()?;
        if !self.db.is_set(ColumnKind::ContinuousPheno) {
            return Err(CohortError::UnsupportedOperation("continuous phenotype data has not been set".into()));
        }
        if column >= self.db.continuous_pheno_columns() {
            return Err(CohortError::InvalidArgument(format!(
                "continuous phenotype column {column} out of range (have {})",
                self.db.continuous_pheno_columns()
            )));
        }
        if lower > upper || upper > comparator.domain() {
            return Err(CohortError::InvalidArgument(format!(
                "range [{lower}, {upper}) outside 0..={}",
                comparator.domain()
            )));
        }
        // the comparator is a step function only on [0, domain)
        let bounds = self.db.value_bounds(ColumnKind::ContinuousPheno).and_then(|b| b.get(column));
        match bounds {
            Some(b) if b.min >= 0 && (b.max as u64) < comparator.domain() => Ok(comparator),
            Some(b) => Err(CohortError::UnsupportedOperation(format!(
                "continuous phenotype column {column} spans [{}, {}], outside comparator domain 0..{}",
                b.min,
                b.max,
                comparator.domain()
            ))),
            None => Err(CohortError::UnsupportedOperation(format!(
                "no value bounds recorded for continuous phenotype column {column}"
            ))),
        }
    }

    pub(crate) fn check_similarity(
        &self,
        target: &[Ciphertext],
        outcome_column: usize,
    ) -> Result<&dyn RangeComparator> {
        let comparator = self.comparator()?;
        if !self.db.is_set(ColumnKind::BinaryPheno) {
            return Err(CohortError::UnsupportedOperation("binary phenotype data has not been set".into()));
        }
        let deletes = self.db.num_deletes();
        if deletes > self.config.delete_limit {
            return Err(CohortError::StaleCiphertextState { deletes, limit: self.config.delete_limit });
        }
        if outcome_column >= self.db.binary_pheno_columns() {
            return Err(CohortError::InvalidArgument(format!(
                "binary phenotype column {outcome_column} out of range (have {})",
                self.db.binary_pheno_columns()
            )));
        }
        if target.is_empty() {
            return Err(CohortError::InvalidArgument("empty similarity target".into()));
        }
        self.check_genotype_column(target.len() - 1)?;
        let max_score = MAX_SQUARED_GAP * target.len() as u64;
        if comparator.domain() <= max_score {
            return Err(CohortError::UnsupportedOperation(format!(
                "{} target dimensions reach score {max_score}, comparator domain is 0..{}",
                target.len(),
                comparator.domain()
            )));
        }
        Ok(comparator)
    }

    // ----------------------------------------------------------------
    // Per compressed row building blocks
    // ----------------------------------------------------------------

    /// Zero the padding slots when `crow` is the last, partially used row.
    pub(crate) fn mask_if_last(&self, ct: Ciphertext, crow: usize) -> Result<Ciphertext> {
        let used = self.db.num_rows() % self.db.slots();
        if used != 0 && crow + 1 == self.db.compressed_rows() {
            return self.context().mask(&ct, 0, used);
        }
        Ok(ct)
    }

    fn term_predicate(&self, term: &EqualityTerm, crow: usize) -> Result<Ciphertext> {
        let x = self.db.store().genotype(term.column, crow)?;
        self.equality.evaluate(self.context(), &x, term.value)
    }

    /// AND of the term predicates, or of their negations under OR.
    pub(crate) fn partial_terms(
        &self,
        terms: &[EqualityTerm],
        connective: Connective,
        crow: usize,
    ) -> Result<Ciphertext> {
        let ctx = self.context();
        let preds = terms
            .iter()
            .map(|term| {
                let pred = self.term_predicate(term, crow)?;
                match connective {
                    Connective::And => Ok(pred),
                    Connective::Or => ctx.not(&pred),
                }
            })
            .collect::<Result<Vec<_>>>()?;
        mul_many(ctx, &preds)
    }

    /// Undo the De Morgan negation once all partial products are merged.
    pub(crate) fn finish_terms(&self, product: Ciphertext, connective: Connective) -> Result<Ciphertext> {
        match connective {
            Connective::And => Ok(product),
            Connective::Or => self.context().not(&product),
        }
    }

    /// 0/1 per slot: does the row match the query. Padding rows are zero.
    pub(crate) fn row_filter(&self, query: &EqualityQuery, crow: usize) -> Result<Ciphertext> {
        let product = self.partial_terms(&query.terms, query.connective, crow)?;
        let filter = self.finish_terms(product, query.connective)?;
        self.mask_if_last(filter, crow)
    }

    /// genotype[snp] · filter for one compressed row.
    pub(crate) fn allele_row(&self, snp: usize, filter: &Ciphertext, crow: usize) -> Result<Ciphertext> {
        let genotype = self.db.store().genotype(snp, crow)?;
        self.context().mul(&genotype, filter)
    }

    pub(crate) fn prs_row(&self, weights: &[PrsWeight], crow: usize) -> Result<Ciphertext> {
        let ctx = self.context();
        let terms = weights
            .iter()
            .map(|w| Ok(ctx.mul_scalar(&self.db.store().genotype(w.column, crow)?, w.weight)))
            .collect::<Result<Vec<_>>>()?;
        add_many(ctx, &terms)
    }

    /// [lower ≤ value < upper] on one compressed row of a continuous column.
    pub(crate) fn range_filter(
        &self,
        comparator: &dyn RangeComparator,
        lower: u64,
        upper: u64,
        column: usize,
        crow: usize,
    ) -> Result<Ciphertext> {
        let ctx = self.context();
        let value = self.db.store().continuous_pheno(column, crow)?;
        let below_upper = comparator.less_than(ctx, &value, upper)?;
        let filter = if lower == 0 {
            below_upper
        } else {
            let below_lower = comparator.less_than(ctx, &value, lower)?;
            ctx.mul(&ctx.not(&below_lower)?, &below_upper)?
        };
        self.mask_if_last(filter, crow)
    }

    /// (within ∧ outcome, within ∧ ¬outcome) for one compressed row.
    pub(crate) fn similarity_row(
        &self,
        comparator: &dyn RangeComparator,
        target: &[Ciphertext],
        threshold: u64,
        outcome_column: usize,
        crow: usize,
    ) -> Result<(Ciphertext, Ciphertext)> {
        let ctx = self.context();
        let squares = target
            .iter()
            .enumerate()
            .map(|(dim, t)| {
                let diff = ctx.sub(&self.db.store().genotype(dim, crow)?, t)?;
                ctx.square(&diff)
            })
            .collect::<Result<Vec<_>>>()?;
        let score = add_many(ctx, &squares)?;
        let within = comparator.less_than(ctx, &score, threshold)?;
        let within = self.mask_if_last(within, crow)?;

        let outcome = self.db.store().binary_pheno(outcome_column, crow)?;
        let with_outcome = ctx.mul(&within, &outcome)?;
        let without_outcome = ctx.sub(&within, &with_outcome)?;
        Ok((with_outcome, without_outcome))
    }

    // ----------------------------------------------------------------
    // Queries
    // ----------------------------------------------------------------

    /// Number of rows matching an equality query.
    #[instrument(skip(self, query), fields(terms = query.terms.len(), compressed_rows = self.db.compressed_rows()))]
    pub fn count_query(&self, query: &EqualityQuery) -> Result<Squashed> {
        self.check_equality_query(query)?;
        let filters = (0..self.db.compressed_rows())
            .map(|crow| self.row_filter(query, crow))
            .collect::<Result<Vec<_>>>()?;
        let total = add_many(self.context(), &filters)?;
        let squashed = self.reducer().squash(&total)?;
        info!(stride = squashed.stride, remaining = squashed.ciphertext.remaining_budget(), "count query done");
        Ok(squashed)
    }

    /// Allele count of `snp` over matching rows, and twice the match count.
    #[instrument(skip(self, query), fields(terms = query.terms.len(), compressed_rows = self.db.compressed_rows()))]
    pub fn maf_query(&self, snp: usize, query: &EqualityQuery) -> Result<MafAggregate> {
        self.check_maf_query(snp, query)?;
        let filters = (0..self.db.compressed_rows())
            .map(|crow| self.row_filter(query, crow))
            .collect::<Result<Vec<_>>>()?;
        self.maf_from_filters(snp, &filters)
    }

    fn maf_from_filters(&self, snp: usize, filters: &[Ciphertext]) -> Result<MafAggregate> {
        let ctx = self.context();
        let alleles = filters
            .iter()
            .enumerate()
            .map(|(crow, filter)| self.allele_row(snp, filter, crow))
            .collect::<Result<Vec<_>>>()?;
        let maf = self.pack_maf(&add_many(ctx, &alleles)?, &add_many(ctx, filters)?)?;
        info!(stride = maf.stride, remaining = maf.ciphertext.remaining_budget(), "maf query done");
        Ok(maf)
    }

    /// Per-individual Σ weight · genotype, one ciphertext per compressed row.
    #[instrument(skip(self, weights), fields(weights = weights.len(), compressed_rows = self.db.compressed_rows()))]
    pub fn prs_query(&self, weights: &[PrsWeight]) -> Result<PrsResult> {
        self.check_prs(weights)?;
        let scores = (0..self.db.compressed_rows())
            .map(|crow| self.prs_row(weights, crow))
            .collect::<Result<Vec<_>>>()?;
        Ok(PrsResult { scores, compressed_rows: self.db.compressed_rows(), rows: self.db.num_rows() })
    }

    /// One ciphertext per target dimension, the value replicated into every slot.
    pub fn encrypt_similarity_target(&self, values: &[i64]) -> Result<Vec<Ciphertext>> {
        if let Some(v) = values.iter().find(|v| !(-1..=2).contains(*v)) {
            return Err(CohortError::InvalidArgument(format!("similarity target value {v} outside -1..=2")));
        }
        let ctx = self.context();
        let slots = ctx.slots();
        values.iter().map(|&v| ctx.encrypt_signed(&vec![v; slots])).collect()
    }

    /// Split a packed target (dimension i in slot i) into per-dimension broadcasts.
    ///
    /// The packed values are encrypted, so the caller keeps them in -1..=2.
    pub fn expand_target(&self, packed: &Ciphertext, dims: usize) -> Result<Vec<Ciphertext>> {
        let ctx = self.context();
        if dims == 0 || dims > ctx.slots() {
            return Err(CohortError::InvalidArgument(format!(
                "cannot expand {dims} dimensions from {} slots",
                ctx.slots()
            )));
        }
        let reducer = self.reducer();
        (0..dims)
            .map(|dim| {
                let moved = ctx.rotate_left(packed, dim)?;
                reducer.broadcast(&ctx.mask(&moved, 0, 1)?)
            })
            .collect()
    }

    /// Rows whose squared distance to `target` is below `threshold`, split by
    /// the binary outcome column.
    #[instrument(skip(self, target), fields(dims = target.len(), compressed_rows = self.db.compressed_rows()))]
    pub fn similarity_query(
        &self,
        target: &[Ciphertext],
        threshold: u64,
        outcome_column: usize,
    ) -> Result<SimilarityAggregate> {
        let comparator = self.check_similarity(target, outcome_column)?;
        let mut with = Vec::new();
        let mut without = Vec::new();
        for crow in 0..self.db.compressed_rows() {
            let (w, wo) = self.similarity_row(comparator, target, threshold, outcome_column, crow)?;
            with.push(w);
            without.push(wo);
        }
        self.finish_similarity(&with, &without)
    }

    pub(crate) fn finish_similarity(
        &self,
        with: &[Ciphertext],
        without: &[Ciphertext],
    ) -> Result<SimilarityAggregate> {
        let ctx = self.context();
        let reducer = self.reducer();
        let with_outcome = reducer.squash(&add_many(ctx, with)?)?;
        let without_outcome = reducer.squash(&add_many(ctx, without)?)?;
        debug!(
            with_stride = with_outcome.stride,
            without_stride = without_outcome.stride,
            "similarity query done"
        );
        Ok(SimilarityAggregate { with_outcome, without_outcome })
    }

    /// Number of rows with `lower ≤ continuous[column] < upper`.
    #[instrument(skip(self), fields(compressed_rows = self.db.compressed_rows()))]
    pub fn counting_range_query(&self, lower: u64, upper: u64, column: usize) -> Result<Squashed> {
        let comparator = self.check_range(lower, upper, column)?;
        let filters = (0..self.db.compressed_rows())
            .map(|crow| self.range_filter(comparator, lower, upper, column, crow))
            .collect::<Result<Vec<_>>>()?;
        let squashed = self.reducer().squash(&add_many(self.context(), &filters)?)?;
        info!(stride = squashed.stride, "range count done");
        Ok(squashed)
    }

    /// MAF of `snp` over rows with `lower ≤ continuous[column] < upper`.
    #[instrument(skip(self), fields(compressed_rows = self.db.compressed_rows()))]
    pub fn maf_range_query(&self, snp: usize, lower: u64, upper: u64, column: usize) -> Result<MafAggregate> {
        self.check_genotype_column(snp)?;
        let comparator = self.check_range(lower, upper, column)?;
        let filters = (0..self.db.compressed_rows())
            .map(|crow| self.range_filter(comparator, lower, upper, column, crow))
            .collect::<Result<Vec<_>>>()?;
        self.maf_from_filters(snp, &filters)
    }

    /// Pack the allele sum with twice the filter sum.
    pub(crate) fn pack_maf(&self, numerator: &Ciphertext, filters_sum: &Ciphertext) -> Result<MafAggregate> {
        let denominator = self.context().mul_scalar(filters_sum, 2);
        self.reducer().pack_pair(numerator, &denominator)
    }
}
