//! Query evaluation over the encrypted column store.
//!
//! Equality and range predicates produce 0/1 slot masks; masks are combined,
//! summed over compressed rows and squashed into a few aggregate slots.

pub mod comparator;
pub mod engine;
pub mod equality;
pub mod parallel;
pub mod reduce;
pub mod types;

pub use comparator::{InterpolationComparator, RangeComparator};
pub use engine::QueryEngine;
pub use equality::EqualityEvaluator;
pub use reduce::Reducer;
pub use types::{
    Connective, Denominator, EqualityQuery, EqualityTerm, MafAggregate, PrsResult, PrsWeight,
    SimilarityAggregate, Squashed,
};
