//! Match result records: single comparisons and aggregates of comparisons.

use std::cmp::{Ordering, Reverse};

use serde::{Deserialize, Serialize};

use crate::concept::Concept;
use crate::lattice::{MatchType, MatchTypes};

/// Outcome of comparing one origin concept with one destination concept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult<T> {
    /// The concept offered (or requested) by the caller.
    pub origin: Concept,
    /// The concept it was compared against.
    pub matched: Concept,
    /// Verdict drawn from the producing matcher's `MatchTypes`.
    pub match_type: T,
    /// Confidence attached to the verdict.
    pub score: f64,
    /// Name of the matcher that produced this result.
    pub produced_by: String,
    /// Human-readable explanation.
    pub explanation: String,
}

impl<T: MatchType> MatchResult<T> {
    pub fn new(
        origin: Concept,
        matched: Concept,
        match_type: T,
        score: f64,
        produced_by: impl Into<String>,
    ) -> Self {
        let explanation = format!("{origin} -> {matched}: {match_type}");
        Self {
            origin,
            matched,
            match_type,
            score,
            produced_by: produced_by.into(),
            explanation,
        }
    }

    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = explanation.into();
        self
    }
}

/// How a composite reduces its inner scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreAggregation {
    Sum,
    #[default]
    Mean,
    Max,
    Min,
}

impl ScoreAggregation {
    /// Reduce `scores`; `None` when there is nothing to reduce.
    pub fn apply(self, scores: &[f64]) -> Option<f64> {
        if scores.is_empty() {
            return None;
        }
        let value = match self {
            ScoreAggregation::Sum => scores.iter().sum(),
            ScoreAggregation::Mean => scores.iter().sum::<f64>() / scores.len() as f64,
            ScoreAggregation::Max => scores.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            ScoreAggregation::Min => scores.iter().copied().fold(f64::INFINITY, f64::min),
        };
        Some(value)
    }
}

#[derive(Debug, Clone)]
struct Entry<T> {
    seq: u64,
    rank: Option<usize>,
    result: MatchResult<T>,
}

/// An aggregate of match results between two resources.
///
/// Inner results are de-duplicated on `(origin, matched, produced_by)` and
/// kept ordered best verdict first, then by matched concept, then by
/// insertion. The composite verdict is the weakest inner verdict.
#[derive(Debug, Clone)]
pub struct CompositeMatchResult<T: MatchType> {
    origin: Concept,
    matched: Concept,
    produced_by: String,
    aggregation: ScoreAggregation,
    types: MatchTypes<T>,
    inner: Vec<Entry<T>>,
    next_seq: u64,
}

impl<T: MatchType> CompositeMatchResult<T> {
    pub fn new(
        origin: Concept,
        matched: Concept,
        types: MatchTypes<T>,
        produced_by: impl Into<String>,
    ) -> Self {
        Self {
            origin,
            matched,
            produced_by: produced_by.into(),
            aggregation: ScoreAggregation::default(),
            types,
            inner: Vec::new(),
            next_seq: 0,
        }
    }

    pub fn with_aggregation(mut self, aggregation: ScoreAggregation) -> Self {
        self.aggregation = aggregation;
        self
    }

    /// Add an inner result. Returns `false` if an equivalent one is already present.
    pub fn add(&mut self, result: MatchResult<T>) -> bool {
        let duplicate = self.inner.iter().any(|e| {
            e.result.origin == result.origin
                && e.result.matched == result.matched
                && e.result.produced_by == result.produced_by
        });
        if duplicate {
            return false;
        }
        let entry = Entry {
            seq: self.next_seq,
            rank: self.types.rank(&result.match_type),
            result,
        };
        self.next_seq += 1;
        let pos = self
            .inner
            .partition_point(|e| Self::entry_order(e, &entry) == Ordering::Less);
        self.inner.insert(pos, entry);
        true
    }

    fn entry_order(a: &Entry<T>, b: &Entry<T>) -> Ordering {
        (Reverse(a.rank), &a.result.matched, a.seq).cmp(&(Reverse(b.rank), &b.result.matched, b.seq))
    }

    pub fn origin(&self) -> &Concept {
        &self.origin
    }

    pub fn matched(&self) -> &Concept {
        &self.matched
    }

    pub fn produced_by(&self) -> &str {
        &self.produced_by
    }

    pub fn aggregation(&self) -> ScoreAggregation {
        self.aggregation
    }

    /// Inner results in comparator order.
    pub fn inner(&self) -> impl Iterator<Item = &MatchResult<T>> {
        self.inner.iter().map(|e| &e.result)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Weakest inner verdict; `None` while empty.
    pub fn match_type(&self) -> Option<T> {
        self.inner
            .iter()
            .min_by_key(|e| e.rank)
            .map(|e| e.result.match_type)
    }

    /// Aggregated inner score; `None` while empty.
    pub fn score(&self) -> Option<f64> {
        let scores: Vec<f64> = self.inner.iter().map(|e| e.result.score).collect();
        self.aggregation.apply(&scores)
    }

    pub fn explanation(&self) -> String {
        self.inner
            .iter()
            .map(|e| e.result.explanation.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Either a single comparison or an aggregate, as seen by discovery stages.
#[derive(Debug, Clone)]
pub enum MatchRecord<T: MatchType> {
    Atomic(MatchResult<T>),
    Composite(CompositeMatchResult<T>),
}

impl<T: MatchType> MatchRecord<T> {
    pub fn origin(&self) -> &Concept {
        match self {
            MatchRecord::Atomic(r) => &r.origin,
            MatchRecord::Composite(c) => c.origin(),
        }
    }

    pub fn matched(&self) -> &Concept {
        match self {
            MatchRecord::Atomic(r) => &r.matched,
            MatchRecord::Composite(c) => c.matched(),
        }
    }

    /// Verdict; `None` only for an empty composite.
    pub fn match_type(&self) -> Option<T> {
        match self {
            MatchRecord::Atomic(r) => Some(r.match_type),
            MatchRecord::Composite(c) => c.match_type(),
        }
    }

    /// Confidence; an empty composite scores `0.0`.
    pub fn score(&self) -> f64 {
        match self {
            MatchRecord::Atomic(r) => r.score,
            MatchRecord::Composite(c) => c.score().unwrap_or(0.0),
        }
    }

    pub fn explanation(&self) -> String {
        match self {
            MatchRecord::Atomic(r) => r.explanation.clone(),
            MatchRecord::Composite(c) => c.explanation(),
        }
    }

    /// Every atomic result behind this record.
    pub fn atomic_results(&self) -> Vec<&MatchResult<T>> {
        match self {
            MatchRecord::Atomic(r) => vec![r],
            MatchRecord::Composite(c) => c.inner().collect(),
        }
    }
}

impl<T: MatchType> From<MatchResult<T>> for MatchRecord<T> {
    fn from(value: MatchResult<T>) -> Self {
        MatchRecord::Atomic(value)
    }
}

impl<T: MatchType> From<CompositeMatchResult<T>> for MatchRecord<T> {
    fn from(value: CompositeMatchResult<T>) -> Self {
        MatchRecord::Composite(value)
    }
}
