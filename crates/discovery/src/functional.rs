//! Candidate generation from a catalogue: operations that produce or
//! consume given concepts.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use catalogue::{Catalogue, Operation, ResourceId};
use matcher::{
    CancellationToken, CompositeMatchResult, Concept, ExecutorConfig, LogicMatchType,
    MatchExecutor, MatchRecord, MatchResult, MatchType, MatchTypes, Matcher, RunContext,
    ScoreAggregation, TypeRange,
};
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};

use crate::error::DiscoveryError;
use crate::pipeline::{DiscoveryPipeline, DiscoveryResults};

const DEFAULT_REQUEST_CONCEPT: &str = "urn:capmatch:request";

/// How many requested concepts an operation must cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryMode {
    /// At least one.
    #[default]
    Any,
    /// Every one.
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Producing,
    Consuming,
}

/// Finds catalogue operations by the concepts they produce or consume.
///
/// Each candidate is a [`CompositeMatchResult`] holding, for every requested
/// concept the operation covers, its best match within the range.
pub struct OperationDiscoverer<T: MatchType = LogicMatchType> {
    matcher: Arc<dyn Matcher<T>>,
    catalogue: Arc<dyn Catalogue>,
    executor: ExecutorConfig,
    pool: Option<Arc<ThreadPool>>,
    request_concept: Concept,
    aggregation: ScoreAggregation,
}

impl<T: MatchType> OperationDiscoverer<T> {
    pub fn new(
        matcher: Arc<dyn Matcher<T>>,
        catalogue: Arc<dyn Catalogue>,
        executor: ExecutorConfig,
    ) -> Result<Self, DiscoveryError> {
        executor.validate()?;
        let pool = executor.build_pool()?;
        Ok(Self {
            matcher,
            catalogue,
            executor,
            pool,
            request_concept: Concept::new(DEFAULT_REQUEST_CONCEPT),
            aggregation: ScoreAggregation::default(),
        })
    }

    /// Origin recorded on every composite this discoverer builds.
    pub fn with_request_concept(mut self, concept: impl Into<Concept>) -> Self {
        self.request_concept = concept.into();
        self
    }

    pub fn with_aggregation(mut self, aggregation: ScoreAggregation) -> Self {
        self.aggregation = aggregation;
        self
    }

    pub fn match_types(&self) -> MatchTypes<T> {
        self.matcher.match_types()
    }

    /// Operations with an output matching the wanted concepts, compared as
    /// `match(output, wanted)`.
    pub fn find_operations_producing(
        &self,
        wanted: &BTreeSet<Concept>,
        range: &TypeRange<T>,
        mode: DiscoveryMode,
    ) -> Result<BTreeMap<ResourceId, MatchRecord<T>>, DiscoveryError> {
        self.candidates(Direction::Producing, wanted, range, mode, CancellationToken::new())
    }

    /// Operations whose required inputs are matched by the offered concepts,
    /// compared as `match(offered, required)`. Operations without required
    /// inputs are never returned.
    pub fn find_operations_consuming(
        &self,
        offered: &BTreeSet<Concept>,
        range: &TypeRange<T>,
        mode: DiscoveryMode,
    ) -> Result<BTreeMap<ResourceId, MatchRecord<T>>, DiscoveryError> {
        self.candidates(Direction::Consuming, offered, range, mode, CancellationToken::new())
    }

    pub fn discover_producing(
        &self,
        wanted: &BTreeSet<Concept>,
        range: &TypeRange<T>,
        mode: DiscoveryMode,
        pipeline: &DiscoveryPipeline<T>,
    ) -> Result<DiscoveryResults<T>, DiscoveryError> {
        let candidates = self.find_operations_producing(wanted, range, mode)?;
        Ok(pipeline.discover(candidates))
    }

    pub fn discover_consuming(
        &self,
        offered: &BTreeSet<Concept>,
        range: &TypeRange<T>,
        mode: DiscoveryMode,
        pipeline: &DiscoveryPipeline<T>,
    ) -> Result<DiscoveryResults<T>, DiscoveryError> {
        let candidates = self.find_operations_consuming(offered, range, mode)?;
        Ok(pipeline.discover(candidates))
    }

    fn executor(&self, token: CancellationToken) -> MatchExecutor<T, dyn Matcher<T>> {
        let ctx = RunContext::new()
            .with_token(token)
            .with_call_timeout(self.executor.call_timeout());
        MatchExecutor::sequential(Arc::clone(&self.matcher))
            .with_pool(self.pool.clone())
            .with_context(ctx)
    }

    fn candidates(
        &self,
        direction: Direction,
        concepts: &BTreeSet<Concept>,
        range: &TypeRange<T>,
        mode: DiscoveryMode,
        token: CancellationToken,
    ) -> Result<BTreeMap<ResourceId, MatchRecord<T>>, DiscoveryError> {
        if concepts.is_empty() {
            return Ok(BTreeMap::new());
        }
        let started = Instant::now();
        let exec = self.executor(token);
        let ops: Vec<Arc<Operation>> = self
            .catalogue
            .operations()
            .into_iter()
            .filter(|op| direction == Direction::Producing || !op.required_inputs.is_empty())
            .collect();

        // One batch for the whole catalogue; `owners[i]` says which operation
        // and which requested concept `pairs[i]` answers for.
        let mut pairs = Vec::new();
        let mut owners = Vec::new();
        for (i, op) in ops.iter().enumerate() {
            match direction {
                Direction::Producing => {
                    for wanted in concepts {
                        for output in &op.produced_outputs {
                            pairs.push((output.clone(), wanted.clone()));
                            owners.push((i, wanted.clone()));
                        }
                    }
                }
                Direction::Consuming => {
                    for required in &op.required_inputs {
                        for offered in concepts {
                            pairs.push((offered.clone(), required.clone()));
                            owners.push((i, required.clone()));
                        }
                    }
                }
            }
        }
        let results = exec.match_pairs(&pairs)?;

        let types = exec.match_types().clone();
        let mut best: Vec<BTreeMap<Concept, MatchResult<T>>> =
            (0..ops.len()).map(|_| BTreeMap::new()).collect();
        for ((i, key), result) in owners.into_iter().zip(results) {
            if !range.accepts(&result) {
                continue;
            }
            match best[i].entry(key) {
                Entry::Vacant(slot) => {
                    slot.insert(result);
                }
                Entry::Occupied(mut slot) => {
                    if is_better(&types, &result, slot.get()) {
                        slot.insert(result);
                    }
                }
            }
        }

        let mut found = BTreeMap::new();
        for (op, covered) in ops.iter().zip(best) {
            let needed = match direction {
                Direction::Producing => concepts.len(),
                Direction::Consuming => op.required_inputs.len(),
            };
            let keep = match mode {
                DiscoveryMode::Any => !covered.is_empty(),
                DiscoveryMode::All => covered.len() == needed,
            };
            if !keep {
                continue;
            }
            let mut composite = CompositeMatchResult::new(
                self.request_concept.clone(),
                op.id.as_concept(),
                types.clone(),
                self.matcher.name(),
            )
            .with_aggregation(self.aggregation);
            for result in covered.into_values() {
                composite.add(result);
            }
            found.insert(op.id.clone(), composite.into());
        }

        tracing::info!(
            ?direction,
            ?mode,
            operations = ops.len(),
            candidates = found.len(),
            comparisons = exec.context().comparisons(),
            latency = ?started.elapsed(),
            "discovery: candidates collected"
        );
        Ok(found)
    }
}

fn is_better<T: MatchType>(types: &MatchTypes<T>, a: &MatchResult<T>, b: &MatchResult<T>) -> bool {
    match types.rank(&a.match_type).cmp(&types.rank(&b.match_type)) {
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Less => false,
        std::cmp::Ordering::Equal => a.score > b.score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::{MatchScoreScorer, TypeRangeFilter};
    use catalogue::{InMemoryCatalogue, Service};
    use matcher::demo_utils::{demo_hierarchy, FailingMatcher};
    use matcher::LogicMatchType::*;
    use matcher::MatchError;

    fn set(ids: &[&str]) -> BTreeSet<Concept> {
        ids.iter().map(|c| Concept::new(*c)).collect()
    }

    fn op(id: &str, inputs: &[&str], outputs: &[&str]) -> Operation {
        Operation::new(id, "dealer", set(inputs), set(outputs))
    }

    fn dealer() -> Arc<dyn Catalogue> {
        let service = Service::new("dealer")
            .with_operation(op("sell_sports_car", &["ex:Price"], &["ex:SportsCar"]))
            .with_operation(op("sell_vehicle", &["ex:Price", "ex:Bike"], &["ex:Vehicle"]))
            .with_operation(op("quote", &["ex:Car"], &["ex:Price"]))
            .with_operation(op("catalog", &[], &["ex:Car"]));
        Arc::new(InMemoryCatalogue::from_services([service]).unwrap())
    }

    fn discoverer(matcher: Arc<dyn Matcher>) -> OperationDiscoverer {
        OperationDiscoverer::new(matcher, dealer(), ExecutorConfig::default()).unwrap()
    }

    fn ids(found: &BTreeMap<ResourceId, MatchRecord<LogicMatchType>>) -> Vec<&str> {
        found.keys().map(ResourceId::as_str).collect()
    }

    #[test]
    fn producing_keeps_best_match_per_wanted_concept() {
        let d = discoverer(Arc::new(demo_hierarchy()));
        let range = LogicMatchType::types().at_least(Subsume);
        let found = d
            .find_operations_producing(&set(&["ex:Car"]), &range, DiscoveryMode::Any)
            .unwrap();
        assert_eq!(ids(&found), vec!["catalog", "sell_sports_car", "sell_vehicle"]);
        assert_eq!(found[&ResourceId::from("catalog")].match_type(), Some(Exact));
        assert_eq!(found[&ResourceId::from("sell_sports_car")].match_type(), Some(Plugin));
        assert_eq!(found[&ResourceId::from("sell_vehicle")].match_type(), Some(Subsume));

        let record = &found[&ResourceId::from("sell_vehicle")];
        assert_eq!(record.origin().as_str(), DEFAULT_REQUEST_CONCEPT);
        assert_eq!(record.matched().as_str(), "sell_vehicle");
    }

    #[test]
    fn all_mode_requires_every_concept_covered() {
        let d = discoverer(Arc::new(demo_hierarchy()));
        let range = LogicMatchType::types().at_least(Plugin);
        let wanted = set(&["ex:Car", "ex:Price"]);
        let any = d
            .find_operations_producing(&wanted, &range, DiscoveryMode::Any)
            .unwrap();
        assert_eq!(ids(&any), vec!["catalog", "quote", "sell_sports_car"]);
        let all = d
            .find_operations_producing(&wanted, &range, DiscoveryMode::All)
            .unwrap();
        assert!(all.is_empty());
    }

    #[test]
    fn consuming_skips_operations_without_inputs() {
        let d = discoverer(Arc::new(demo_hierarchy()));
        let range = LogicMatchType::types().at_least(Plugin);
        let offered = set(&["ex:Price", "ex:SportsCar"]);
        let any = d
            .find_operations_consuming(&offered, &range, DiscoveryMode::Any)
            .unwrap();
        assert_eq!(ids(&any), vec!["quote", "sell_sports_car", "sell_vehicle"]);

        let all = d
            .find_operations_consuming(&offered, &range, DiscoveryMode::All)
            .unwrap();
        assert_eq!(ids(&all), vec!["quote", "sell_sports_car"]);
        let quote = &all[&ResourceId::from("quote")];
        assert_eq!(quote.match_type(), Some(Plugin));
    }

    #[test]
    fn empty_request_yields_no_candidates() {
        let d = discoverer(Arc::new(demo_hierarchy()));
        let range = LogicMatchType::types().at_least(Fail);
        let found = d
            .find_operations_producing(&BTreeSet::new(), &range, DiscoveryMode::All)
            .unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn discover_runs_candidates_through_pipeline() {
        let d = discoverer(Arc::new(demo_hierarchy()));
        let range = LogicMatchType::types().at_least(Subsume);
        let pipeline = DiscoveryPipeline::default()
            .with_filter(TypeRangeFilter::new(LogicMatchType::types().at_least(Plugin)))
            .with_scorer(MatchScoreScorer);
        let results = d
            .discover_producing(&set(&["ex:Car"]), &range, DiscoveryMode::Any, &pipeline)
            .unwrap();
        let order: Vec<&str> = results.ranked().iter().map(|r| r.resource.as_str()).collect();
        assert_eq!(order, vec!["catalog", "sell_sports_car"]);
    }

    #[test]
    fn matcher_failure_aborts_discovery() {
        let d = discoverer(Arc::new(FailingMatcher::on_destination(demo_hierarchy(), "ex:Car")));
        let range = LogicMatchType::types().at_least(Subsume);
        let err = d
            .find_operations_producing(&set(&["ex:Car"]), &range, DiscoveryMode::Any)
            .unwrap_err();
        assert!(matches!(
            err,
            DiscoveryError::Match(MatchError::MatcherUnavailable { .. })
        ));
    }

    #[test]
    fn invalid_executor_config_is_rejected() {
        let config = ExecutorConfig {
            parallel: true,
            workers: 0,
            call_timeout_ms: None,
        };
        let result = OperationDiscoverer::<LogicMatchType>::new(
            Arc::new(demo_hierarchy()),
            dealer(),
            config,
        );
        assert!(result.is_err());
    }
}
