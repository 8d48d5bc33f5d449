//! Pipeline stages: filters, scorers and composers, plus the stock ones.

use catalogue::ResourceId;
use matcher::{MatchRecord, MatchType, TypeRange};

/// Rejects candidates before they are scored.
pub trait MatchFilter<T: MatchType>: Send + Sync {
    fn name(&self) -> &str;

    /// `false` removes the candidate from the run.
    fn accept(&self, resource: &ResourceId, record: &MatchRecord<T>) -> bool;
}

/// Produces one numeric contribution per surviving candidate.
pub trait Scorer<T: MatchType>: Send + Sync {
    fn name(&self) -> &str;

    fn score(&self, resource: &ResourceId, record: &MatchRecord<T>) -> f64;
}

/// Reduces the scorers' contributions to one rank value.
///
/// Must be total: with no contributions it still returns a value.
pub trait Composer<T: MatchType>: Send + Sync {
    fn compose(&self, record: &MatchRecord<T>, contributions: &[f64]) -> f64;
}

/// Keeps records whose verdict lies in a range. Empty composites are rejected.
pub struct TypeRangeFilter<T: MatchType> {
    range: TypeRange<T>,
}

impl<T: MatchType> TypeRangeFilter<T> {
    pub fn new(range: TypeRange<T>) -> Self {
        Self { range }
    }
}

impl<T: MatchType> MatchFilter<T> for TypeRangeFilter<T> {
    fn name(&self) -> &str {
        "type-range"
    }

    fn accept(&self, _resource: &ResourceId, record: &MatchRecord<T>) -> bool {
        record
            .match_type()
            .is_some_and(|t| self.range.contains(&t))
    }
}

pub struct MinScoreFilter {
    min_score: f64,
}

impl MinScoreFilter {
    pub fn new(min_score: f64) -> Self {
        Self { min_score }
    }
}

impl<T: MatchType> MatchFilter<T> for MinScoreFilter {
    fn name(&self) -> &str {
        "min-score"
    }

    fn accept(&self, _resource: &ResourceId, record: &MatchRecord<T>) -> bool {
        record.score() >= self.min_score
    }
}

/// Keeps resources whose id starts with a prefix.
pub struct NamespaceFilter {
    prefix: String,
}

impl NamespaceFilter {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl<T: MatchType> MatchFilter<T> for NamespaceFilter {
    fn name(&self) -> &str {
        "namespace"
    }

    fn accept(&self, resource: &ResourceId, _record: &MatchRecord<T>) -> bool {
        resource.as_str().starts_with(&self.prefix)
    }
}

/// Filter from a closure.
pub struct FilterFn<F> {
    name: String,
    f: F,
}

pub fn filter_fn<F>(name: impl Into<String>, f: F) -> FilterFn<F> {
    FilterFn {
        name: name.into(),
        f,
    }
}

impl<T, F> MatchFilter<T> for FilterFn<F>
where
    T: MatchType,
    F: Fn(&ResourceId, &MatchRecord<T>) -> bool + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn accept(&self, resource: &ResourceId, record: &MatchRecord<T>) -> bool {
        (self.f)(resource, record)
    }
}

/// The record's own confidence.
pub struct MatchScoreScorer;

impl<T: MatchType> Scorer<T> for MatchScoreScorer {
    fn name(&self) -> &str {
        "match-score"
    }

    fn score(&self, _resource: &ResourceId, record: &MatchRecord<T>) -> f64 {
        record.score()
    }
}

/// Verdict position scaled to `[0, 1]`: lowest is 0, highest is 1.
pub struct TypeRankScorer<T: MatchType> {
    types: matcher::MatchTypes<T>,
}

impl<T: MatchType> TypeRankScorer<T> {
    pub fn new(types: matcher::MatchTypes<T>) -> Self {
        Self { types }
    }
}

impl<T: MatchType> Scorer<T> for TypeRankScorer<T> {
    fn name(&self) -> &str {
        "type-rank"
    }

    fn score(&self, _resource: &ResourceId, record: &MatchRecord<T>) -> f64 {
        let top = self.types.len().saturating_sub(1);
        match record.match_type().and_then(|t| self.types.rank(&t)) {
            Some(rank) if top > 0 => rank as f64 / top as f64,
            Some(_) => 1.0,
            None => 0.0,
        }
    }
}

/// Scorer from a closure.
pub struct ScorerFn<F> {
    name: String,
    f: F,
}

pub fn scorer_fn<F>(name: impl Into<String>, f: F) -> ScorerFn<F> {
    ScorerFn {
        name: name.into(),
        f,
    }
}

impl<T, F> Scorer<T> for ScorerFn<F>
where
    T: MatchType,
    F: Fn(&ResourceId, &MatchRecord<T>) -> f64 + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn score(&self, resource: &ResourceId, record: &MatchRecord<T>) -> f64 {
        (self.f)(resource, record)
    }
}

/// Mean of the contributions; the record's own score when there are none.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeutralComposer;

impl<T: MatchType> Composer<T> for NeutralComposer {
    fn compose(&self, record: &MatchRecord<T>, contributions: &[f64]) -> f64 {
        if contributions.is_empty() {
            return record.score();
        }
        contributions.iter().sum::<f64>() / contributions.len() as f64
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SumComposer;

impl<T: MatchType> Composer<T> for SumComposer {
    fn compose(&self, record: &MatchRecord<T>, contributions: &[f64]) -> f64 {
        if contributions.is_empty() {
            return record.score();
        }
        contributions.iter().sum()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MaxComposer;

impl<T: MatchType> Composer<T> for MaxComposer {
    fn compose(&self, record: &MatchRecord<T>, contributions: &[f64]) -> f64 {
        contributions
            .iter()
            .copied()
            .reduce(f64::max)
            .unwrap_or_else(|| record.score())
    }
}

/// Weighted sum, one weight per scorer in pipeline order. Scorers beyond
/// the weight list get weight 1.
#[derive(Debug, Clone)]
pub struct WeightedComposer {
    weights: Vec<f64>,
}

impl WeightedComposer {
    pub fn new(weights: impl IntoIterator<Item = f64>) -> Self {
        Self {
            weights: weights.into_iter().collect(),
        }
    }
}

impl<T: MatchType> Composer<T> for WeightedComposer {
    fn compose(&self, record: &MatchRecord<T>, contributions: &[f64]) -> f64 {
        if contributions.is_empty() {
            return record.score();
        }
        contributions
            .iter()
            .enumerate()
            .map(|(i, c)| c * self.weights.get(i).copied().unwrap_or(1.0))
            .sum()
    }
}
