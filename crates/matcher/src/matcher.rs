use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::concept::Concept;
use crate::error::MatchError;
use crate::executor::cartesian_blocks;
use crate::lattice::{LogicMatchType, MatchType, MatchTypes, TypeRange};
use crate::result::MatchResult;

/// Results keyed by `(origin, destination)`.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchTable<T> {
    entries: BTreeMap<(Concept, Concept), MatchResult<T>>,
}

impl<T> Default for MatchTable<T> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<T: MatchType> MatchTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a result under its own `(origin, matched)` key, replacing any
    /// previous result for that pair.
    pub fn insert(&mut self, result: MatchResult<T>) -> Option<MatchResult<T>> {
        let key = (result.origin.clone(), result.matched.clone());
        self.entries.insert(key, result)
    }

    pub fn get(&self, origin: &Concept, destination: &Concept) -> Option<&MatchResult<T>> {
        self.entries.get(&(origin.clone(), destination.clone()))
    }

    /// All results for one origin, keyed by destination.
    pub fn row(&self, origin: &Concept) -> BTreeMap<&Concept, &MatchResult<T>> {
        self.entries
            .iter()
            .filter(|((o, _), _)| o == origin)
            .map(|((_, d), r)| (d, r))
            .collect()
    }

    /// A copy holding only the results accepted by `range`.
    pub fn filter(&self, range: &TypeRange<T>) -> MatchTable<T> {
        MatchTable {
            entries: self
                .entries
                .iter()
                .filter(|(_, r)| range.accepts(r))
                .map(|(k, r)| (k.clone(), r.clone()))
                .collect(),
        }
    }

    pub fn retain(&mut self, range: &TypeRange<T>) {
        self.entries.retain(|_, r| range.accepts(r));
    }

    pub fn merge(&mut self, other: MatchTable<T>) {
        self.entries.extend(other.entries);
    }

    pub fn origins(&self) -> BTreeSet<&Concept> {
        self.entries.keys().map(|(o, _)| o).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MatchResult<T>> {
        self.entries.values()
    }

    pub fn into_results(self) -> impl Iterator<Item = MatchResult<T>> {
        self.entries.into_values()
    }
}

impl<T: MatchType> FromIterator<MatchResult<T>> for MatchTable<T> {
    fn from_iter<I: IntoIterator<Item = MatchResult<T>>>(iter: I) -> Self {
        let mut table = MatchTable::new();
        for result in iter {
            table.insert(result);
        }
        table
    }
}

/// Introspection record for a matcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatcherInfo {
    pub name: String,
    pub description: String,
    pub version: String,
    /// Supported verdicts, lowest first.
    pub match_types: Vec<String>,
}

/// Compares concepts and answers range queries over the verdicts.
///
/// Implementors provide [`match_concepts`](Matcher::match_concepts); every
/// other operation has a default built on it. `match_concepts` must not have
/// side effects beyond the comparison itself, and a failing backend must be
/// reported as [`MatchError::MatcherUnavailable`], never swallowed.
pub trait Matcher<T: MatchType = LogicMatchType>: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    fn version(&self) -> &str {
        "1.0"
    }

    /// Verdicts this matcher may return.
    fn match_types(&self) -> MatchTypes<T>;

    /// Compare a single pair.
    fn match_concepts(
        &self,
        origin: &Concept,
        destination: &Concept,
    ) -> Result<MatchResult<T>, MatchError>;

    /// Compare every origin with every destination.
    ///
    /// The default walks the Cartesian product one pair at a time, which is
    /// rarely the cheapest strategy for a remote backend. Matchers backed by a
    /// bulk query protocol should override it: every batch an executor issues
    /// reaches the backend through this method.
    fn match_all(
        &self,
        origins: &BTreeSet<Concept>,
        destinations: &BTreeSet<Concept>,
    ) -> Result<MatchTable<T>, MatchError> {
        let mut table = MatchTable::new();
        for origin in origins {
            for destination in destinations {
                table.insert(self.match_concepts(origin, destination)?);
            }
        }
        Ok(table)
    }

    /// Compare an arbitrary list of pairs; results come back in input order.
    ///
    /// Pairs are regrouped into Cartesian blocks (origins sharing the same
    /// destinations) and each block is answered by one
    /// [`match_all`](Matcher::match_all) call.
    fn match_pairs(
        &self,
        pairs: &[(Concept, Concept)],
    ) -> Result<Vec<MatchResult<T>>, MatchError> {
        let mut table = MatchTable::new();
        for (origins, destinations) in cartesian_blocks(pairs) {
            table.merge(self.match_all(&origins, &destinations)?);
        }
        pairs
            .iter()
            .map(|(o, d)| {
                table.get(o, d).cloned().ok_or_else(|| {
                    MatchError::unavailable(self.name(), format!("no result for {o} -> {d}"))
                })
            })
            .collect()
    }

    /// Candidates whose verdict against `origin` lies within `range`.
    fn list_matches_within_range(
        &self,
        origin: &Concept,
        candidates: &BTreeSet<Concept>,
        range: &TypeRange<T>,
    ) -> Result<BTreeMap<Concept, MatchResult<T>>, MatchError> {
        if candidates.is_empty() {
            return Ok(BTreeMap::new());
        }
        let origins = BTreeSet::from([origin.clone()]);
        let table = self.match_all(&origins, candidates)?;
        Ok(table
            .into_results()
            .filter(|r| range.accepts(r))
            .map(|r| (r.matched.clone(), r))
            .collect())
    }

    fn list_matches_of_type(
        &self,
        origin: &Concept,
        candidates: &BTreeSet<Concept>,
        match_type: T,
    ) -> Result<BTreeMap<Concept, MatchResult<T>>, MatchError> {
        let range = self.match_types().of_type(match_type);
        self.list_matches_within_range(origin, candidates, &range)
    }

    fn list_matches_at_least_of_type(
        &self,
        origin: &Concept,
        candidates: &BTreeSet<Concept>,
        min_type: T,
    ) -> Result<BTreeMap<Concept, MatchResult<T>>, MatchError> {
        let range = self.match_types().at_least(min_type);
        self.list_matches_within_range(origin, candidates, &range)
    }

    fn list_matches_at_most_of_type(
        &self,
        origin: &Concept,
        candidates: &BTreeSet<Concept>,
        max_type: T,
    ) -> Result<BTreeMap<Concept, MatchResult<T>>, MatchError> {
        let range = self.match_types().at_most(max_type);
        self.list_matches_within_range(origin, candidates, &range)
    }

    /// Batch form: runs the single-origin query for each origin and merges the
    /// results into one table.
    fn list_matches_within_range_batch(
        &self,
        origins: &BTreeSet<Concept>,
        candidates: &BTreeSet<Concept>,
        range: &TypeRange<T>,
    ) -> Result<MatchTable<T>, MatchError> {
        let mut table = MatchTable::new();
        for origin in origins {
            for (_, result) in self.list_matches_within_range(origin, candidates, range)? {
                table.insert(result);
            }
        }
        Ok(table)
    }

    fn list_matches_of_type_batch(
        &self,
        origins: &BTreeSet<Concept>,
        candidates: &BTreeSet<Concept>,
        match_type: T,
    ) -> Result<MatchTable<T>, MatchError> {
        let range = self.match_types().of_type(match_type);
        self.list_matches_within_range_batch(origins, candidates, &range)
    }

    fn list_matches_at_least_of_type_batch(
        &self,
        origins: &BTreeSet<Concept>,
        candidates: &BTreeSet<Concept>,
        min_type: T,
    ) -> Result<MatchTable<T>, MatchError> {
        let range = self.match_types().at_least(min_type);
        self.list_matches_within_range_batch(origins, candidates, &range)
    }

    fn list_matches_at_most_of_type_batch(
        &self,
        origins: &BTreeSet<Concept>,
        candidates: &BTreeSet<Concept>,
        max_type: T,
    ) -> Result<MatchTable<T>, MatchError> {
        let range = self.match_types().at_most(max_type);
        self.list_matches_within_range_batch(origins, candidates, &range)
    }

    fn info(&self) -> MatcherInfo {
        MatcherInfo {
            name: self.name().to_string(),
            description: self.description().to_string(),
            version: self.version().to_string(),
            match_types: self.match_types().iter().map(|t| t.to_string()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo_utils::{demo_hierarchy, BulkMatcher, CountingMatcher};
    use crate::lattice::LogicMatchType::*;

    fn concepts(ids: &[&str]) -> BTreeSet<Concept> {
        ids.iter().map(|id| Concept::new(*id)).collect()
    }

    #[test]
    fn match_all_is_cartesian_product() {
        let matcher = CountingMatcher::new(demo_hierarchy());
        let table = matcher
            .match_all(&concepts(&["ex:Car", "ex:Bike"]), &concepts(&["ex:Vehicle", "ex:Car", "ex:Price"]))
            .unwrap();
        assert_eq!(table.len(), 6);
        assert_eq!(matcher.calls(), 6);
        assert_eq!(
            table.get(&"ex:Car".into(), &"ex:Vehicle".into()).unwrap().match_type,
            Plugin
        );
    }

    #[test]
    fn match_pairs_sends_one_bulk_call_per_block() {
        let matcher = BulkMatcher::new(demo_hierarchy());
        // Car and Bike share destinations; SportsCar has its own.
        let pairs: Vec<(Concept, Concept)> = vec![
            ("ex:Car".into(), "ex:Vehicle".into()),
            ("ex:SportsCar".into(), "ex:Car".into()),
            ("ex:Bike".into(), "ex:Vehicle".into()),
            ("ex:Car".into(), "ex:Vehicle".into()),
        ];
        let results = matcher.match_pairs(&pairs).unwrap();
        assert_eq!(matcher.batches(), 2);
        assert_eq!(results.len(), 4);
        for ((o, d), r) in pairs.iter().zip(&results) {
            assert_eq!((&r.origin, &r.matched), (o, d));
        }
        assert_eq!(results[1].match_type, Plugin);
    }

    #[test]
    fn match_pairs_reports_missing_bulk_entries() {
        struct Lossy;
        impl Matcher for Lossy {
            fn name(&self) -> &str {
                "lossy"
            }
            fn match_types(&self) -> MatchTypes<LogicMatchType> {
                LogicMatchType::types()
            }
            fn match_concepts(
                &self,
                origin: &Concept,
                destination: &Concept,
            ) -> Result<MatchResult<LogicMatchType>, MatchError> {
                Ok(MatchResult::new(origin.clone(), destination.clone(), Exact, 1.0, "lossy"))
            }
            fn match_all(
                &self,
                _origins: &BTreeSet<Concept>,
                _destinations: &BTreeSet<Concept>,
            ) -> Result<MatchTable<LogicMatchType>, MatchError> {
                Ok(MatchTable::new())
            }
        }
        let err = Lossy
            .match_pairs(&[("A".into(), "B".into())])
            .unwrap_err();
        assert!(err.to_string().contains("A -> B"), "{err}");
    }

    #[test]
    fn empty_candidates_give_empty_map_without_calls() {
        let matcher = CountingMatcher::new(demo_hierarchy());
        let hits = matcher
            .list_matches_at_least_of_type(&"ex:Car".into(), &BTreeSet::new(), Exact)
            .unwrap();
        assert!(hits.is_empty());
        assert_eq!(matcher.calls(), 0);
    }

    #[test]
    fn at_least_contains_of_type_for_every_level() {
        let matcher = demo_hierarchy();
        let origin: Concept = "ex:Car".into();
        let candidates = concepts(&["ex:Car", "ex:Vehicle", "ex:SportsCar", "ex:Price"]);
        for t in matcher.match_types().iter() {
            let exact = matcher.list_matches_of_type(&origin, &candidates, t).unwrap();
            let at_least = matcher.list_matches_at_least_of_type(&origin, &candidates, t).unwrap();
            for key in exact.keys() {
                assert!(at_least.contains_key(key), "{key} missing at level {t}");
            }
        }
    }

    #[test]
    fn at_least_lowest_equals_match_all() {
        let matcher = demo_hierarchy();
        let origin: Concept = "ex:Car".into();
        let candidates = concepts(&["ex:Car", "ex:Vehicle", "ex:SportsCar", "ex:Price"]);
        let lowest = matcher.match_types().lowest();
        let at_least = matcher
            .list_matches_at_least_of_type(&origin, &candidates, lowest)
            .unwrap();
        let all = matcher
            .match_all(&BTreeSet::from([origin.clone()]), &candidates)
            .unwrap();
        assert_eq!(at_least.len(), all.len());
        for (dest, result) in &at_least {
            assert_eq!(all.get(&origin, dest), Some(result));
        }
    }

    #[test]
    fn at_most_and_ranges_filter_table() {
        let matcher = demo_hierarchy();
        let origin: Concept = "ex:Car".into();
        let candidates = concepts(&["ex:Car", "ex:Vehicle", "ex:SportsCar", "ex:Price"]);
        let at_most = matcher
            .list_matches_at_most_of_type(&origin, &candidates, Subsume)
            .unwrap();
        let mut kinds: Vec<_> = at_most.values().map(|r| r.match_type).collect();
        kinds.sort_by_key(|t| t.as_str());
        assert_eq!(kinds, vec![Fail, Subsume]);
    }

    #[test]
    fn batch_merges_rows_per_origin() {
        let matcher = demo_hierarchy();
        let table = matcher
            .list_matches_at_least_of_type_batch(
                &concepts(&["ex:Car", "ex:SportsCar"]),
                &concepts(&["ex:Vehicle", "ex:Car"]),
                Plugin,
            )
            .unwrap();
        assert_eq!(table.row(&"ex:SportsCar".into()).len(), 2);
        assert_eq!(table.row(&"ex:Car".into()).len(), 2);
        assert_eq!(table.origins().len(), 2);
    }

    #[test]
    fn info_lists_verdicts_lowest_first() {
        let info = demo_hierarchy().info();
        assert_eq!(info.match_types, vec!["fail", "subsume", "plugin", "exact"]);
    }
}
