use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use crate::concept::Concept;
use crate::error::MatchError;
use crate::hierarchy::HierarchyMatcher;
use crate::lattice::{LogicMatchType, MatchTypes};
use crate::matcher::{MatchTable, Matcher};
use crate::result::MatchResult;

/// Small vehicle taxonomy shared by tests and demos.
///
/// `ex:SportsCar ⊂ ex:Car ⊂ ex:Vehicle`, `ex:Bike ⊂ ex:Vehicle`, and
/// `ex:Price` unrelated to everything else.
pub fn demo_hierarchy() -> HierarchyMatcher {
    HierarchyMatcher::new()
        .with_subconcept("ex:SportsCar", "ex:Car")
        .with_subconcept("ex:Car", "ex:Vehicle")
        .with_subconcept("ex:Bike", "ex:Vehicle")
        .with_subconcept("ex:Price", "ex:Quantity")
}

/// Wraps a matcher and records every pair it is asked to compare.
pub struct CountingMatcher<M> {
    inner: M,
    calls: AtomicUsize,
    pairs: Mutex<Vec<(Concept, Concept)>>,
}

impl<M: Matcher> CountingMatcher<M> {
    pub fn new(inner: M) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
            pairs: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Pairs compared so far, in call order.
    pub fn pairs(&self) -> Vec<(Concept, Concept)> {
        self.pairs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl<M: Matcher> Matcher for CountingMatcher<M> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn match_types(&self) -> MatchTypes<LogicMatchType> {
        self.inner.match_types()
    }

    fn match_concepts(
        &self,
        origin: &Concept,
        destination: &Concept,
    ) -> Result<MatchResult<LogicMatchType>, MatchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.pairs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((origin.clone(), destination.clone()));
        self.inner.match_concepts(origin, destination)
    }
}

/// Answers batches through an overridden `match_all`, the way a backend with
/// a bulk query protocol would, and counts those calls separately from
/// single comparisons.
pub struct BulkMatcher<M> {
    inner: M,
    batches: AtomicUsize,
    singles: AtomicUsize,
}

impl<M: Matcher> BulkMatcher<M> {
    pub fn new(inner: M) -> Self {
        Self {
            inner,
            batches: AtomicUsize::new(0),
            singles: AtomicUsize::new(0),
        }
    }

    /// `match_all` calls so far.
    pub fn batches(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }

    /// `match_concepts` calls made directly, outside any batch.
    pub fn singles(&self) -> usize {
        self.singles.load(Ordering::SeqCst)
    }
}

impl<M: Matcher> Matcher for BulkMatcher<M> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn match_types(&self) -> MatchTypes<LogicMatchType> {
        self.inner.match_types()
    }

    fn match_concepts(
        &self,
        origin: &Concept,
        destination: &Concept,
    ) -> Result<MatchResult<LogicMatchType>, MatchError> {
        self.singles.fetch_add(1, Ordering::SeqCst);
        self.inner.match_concepts(origin, destination)
    }

    fn match_all(
        &self,
        origins: &BTreeSet<Concept>,
        destinations: &BTreeSet<Concept>,
    ) -> Result<MatchTable<LogicMatchType>, MatchError> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        self.inner.match_all(origins, destinations)
    }
}

/// Fails with `MatcherUnavailable` for selected comparisons.
pub struct FailingMatcher<M> {
    inner: M,
    destination: Option<Concept>,
}

impl<M: Matcher> FailingMatcher<M> {
    /// Fail every comparison whose destination is `destination`.
    pub fn on_destination(inner: M, destination: impl Into<Concept>) -> Self {
        Self {
            inner,
            destination: Some(destination.into()),
        }
    }

    /// Fail every comparison.
    pub fn always(inner: M) -> Self {
        Self {
            inner,
            destination: None,
        }
    }
}

impl<M: Matcher> Matcher for FailingMatcher<M> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn match_types(&self) -> MatchTypes<LogicMatchType> {
        self.inner.match_types()
    }

    fn match_concepts(
        &self,
        origin: &Concept,
        destination: &Concept,
    ) -> Result<MatchResult<LogicMatchType>, MatchError> {
        let fails = self.destination.as_ref().map_or(true, |d| d == destination);
        if fails {
            return Err(MatchError::unavailable(
                self.inner.name(),
                format!("backend refused {origin} -> {destination}"),
            ));
        }
        self.inner.match_concepts(origin, destination)
    }
}

/// Sleeps before every comparison.
pub struct DelayMatcher<M> {
    inner: M,
    delay: Duration,
}

impl<M: Matcher> DelayMatcher<M> {
    pub fn new(inner: M, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

impl<M: Matcher> Matcher for DelayMatcher<M> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn match_types(&self) -> MatchTypes<LogicMatchType> {
        self.inner.match_types()
    }

    fn match_concepts(
        &self,
        origin: &Concept,
        destination: &Concept,
    ) -> Result<MatchResult<LogicMatchType>, MatchError> {
        thread::sleep(self.delay);
        self.inner.match_concepts(origin, destination)
    }
}

/// Answers from a fixed `(origin, destination) -> verdict` table; anything
/// not listed (and not identical) is `Fail`.
#[derive(Debug, Clone, Default)]
pub struct TableMatcher {
    verdicts: HashMap<(Concept, Concept), LogicMatchType>,
}

impl TableMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(
        mut self,
        origin: impl Into<Concept>,
        destination: impl Into<Concept>,
        verdict: LogicMatchType,
    ) -> Self {
        self.verdicts
            .insert((origin.into(), destination.into()), verdict);
        self
    }
}

impl Matcher for TableMatcher {
    fn name(&self) -> &str {
        "table"
    }

    fn match_types(&self) -> MatchTypes<LogicMatchType> {
        LogicMatchType::types()
    }

    fn match_concepts(
        &self,
        origin: &Concept,
        destination: &Concept,
    ) -> Result<MatchResult<LogicMatchType>, MatchError> {
        let verdict = if origin == destination {
            LogicMatchType::Exact
        } else {
            self.verdicts
                .get(&(origin.clone(), destination.clone()))
                .copied()
                .unwrap_or(LogicMatchType::Fail)
        };
        Ok(MatchResult::new(
            origin.clone(),
            destination.clone(),
            verdict,
            verdict.default_score(),
            self.name(),
        ))
    }
}
