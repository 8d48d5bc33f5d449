//! Filter → score → compose over a set of candidate matches.

use std::cmp::{Ordering, Reverse};
use std::collections::BTreeMap;
use std::sync::Arc;

use catalogue::ResourceId;
use matcher::{LogicMatchType, MatchRecord, MatchType, MatchTypes};
use rayon::prelude::*;
use serde_json::{json, Map, Value};

use crate::config::DiscoveryConfig;
use crate::stages::{Composer, MatchFilter, NeutralComposer, Scorer};

/// One ranked candidate.
#[derive(Debug, Clone)]
pub struct DiscoveryResult<T: MatchType = LogicMatchType> {
    pub resource: ResourceId,
    pub rank_score: f64,
    pub match_result: MatchRecord<T>,
    /// Per-scorer contributions under `"scores"`, plus the verdict and
    /// explanation of the underlying match.
    pub metadata: Value,
}

impl<T: MatchType> DiscoveryResult<T> {
    pub fn match_type(&self) -> Option<T> {
        self.match_result.match_type()
    }

    /// Contribution recorded for the scorer called `name`.
    pub fn contribution(&self, name: &str) -> Option<f64> {
        self.metadata.get("scores")?.get(name)?.as_f64()
    }
}

/// Output of one discovery run, keyed by resource id.
#[derive(Debug, Clone)]
pub struct DiscoveryResults<T: MatchType = LogicMatchType> {
    types: MatchTypes<T>,
    results: BTreeMap<ResourceId, DiscoveryResult<T>>,
}

impl<T: MatchType> DiscoveryResults<T> {
    pub fn new(types: MatchTypes<T>) -> Self {
        Self {
            types,
            results: BTreeMap::new(),
        }
    }

    pub fn get(&self, resource: &ResourceId) -> Option<&DiscoveryResult<T>> {
        self.results.get(resource)
    }

    pub fn contains(&self, resource: &ResourceId) -> bool {
        self.results.contains_key(resource)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ResourceId, &DiscoveryResult<T>)> {
        self.results.iter()
    }

    pub fn into_map(self) -> BTreeMap<ResourceId, DiscoveryResult<T>> {
        self.results
    }

    /// Best first: rank score, then verdict, then resource id ascending.
    pub fn ranked(&self) -> Vec<&DiscoveryResult<T>> {
        let mut ranked: Vec<&DiscoveryResult<T>> = self.results.values().collect();
        ranked.sort_by(|a, b| self.rank_order(a, b));
        ranked
    }

    /// [`ranked`](Self::ranked), dropping results under `min_rank_score`
    /// and keeping at most `max_results`.
    pub fn top(&self, config: &DiscoveryConfig) -> Vec<&DiscoveryResult<T>> {
        self.ranked()
            .into_iter()
            .filter(|r| r.rank_score >= config.min_rank_score)
            .take(config.max_results)
            .collect()
    }

    fn rank_order(&self, a: &DiscoveryResult<T>, b: &DiscoveryResult<T>) -> Ordering {
        let verdict = |r: &DiscoveryResult<T>| r.match_type().and_then(|t| self.types.rank(&t));
        b.rank_score
            .total_cmp(&a.rank_score)
            .then_with(|| Reverse(verdict(a)).cmp(&Reverse(verdict(b))))
            .then_with(|| a.resource.cmp(&b.resource))
    }

    fn insert(&mut self, result: DiscoveryResult<T>) {
        self.results.insert(result.resource.clone(), result);
    }
}

/// A configured chain of filters and scorers feeding one composer.
pub struct DiscoveryPipeline<T: MatchType = LogicMatchType> {
    types: MatchTypes<T>,
    filters: Vec<Arc<dyn MatchFilter<T>>>,
    scorers: Vec<Arc<dyn Scorer<T>>>,
    composer: Arc<dyn Composer<T>>,
    parallel: bool,
}

impl Default for DiscoveryPipeline<LogicMatchType> {
    fn default() -> Self {
        Self::new(LogicMatchType::types())
    }
}

impl<T: MatchType> DiscoveryPipeline<T> {
    /// Empty pipeline ranking by [`NeutralComposer`].
    pub fn new(types: MatchTypes<T>) -> Self {
        Self {
            types,
            filters: Vec::new(),
            scorers: Vec::new(),
            composer: Arc::new(NeutralComposer),
            parallel: false,
        }
    }

    pub fn with_filter(mut self, filter: impl MatchFilter<T> + 'static) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    pub fn with_scorer(mut self, scorer: impl Scorer<T> + 'static) -> Self {
        self.scorers.push(Arc::new(scorer));
        self
    }

    pub fn with_composer(mut self, composer: impl Composer<T> + 'static) -> Self {
        self.composer = Arc::new(composer);
        self
    }

    /// Score candidates on the rayon global pool. Output is unchanged.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn types(&self) -> &MatchTypes<T> {
        &self.types
    }

    pub fn discover(
        &self,
        candidates: BTreeMap<ResourceId, MatchRecord<T>>,
    ) -> DiscoveryResults<T> {
        let total = candidates.len();
        let survivors: Vec<(ResourceId, MatchRecord<T>)> = candidates
            .into_iter()
            .filter(|(id, record)| self.accepts(id, record))
            .collect();

        tracing::debug!(
            candidates = total,
            accepted = survivors.len(),
            filters = self.filters.len(),
            scorers = self.scorers.len(),
            "discovery: filtered candidates"
        );

        let scored: Vec<DiscoveryResult<T>> = if self.parallel {
            survivors
                .into_par_iter()
                .map(|(id, record)| self.rank(id, record))
                .collect()
        } else {
            survivors
                .into_iter()
                .map(|(id, record)| self.rank(id, record))
                .collect()
        };

        let mut results = DiscoveryResults::new(self.types.clone());
        for result in scored {
            results.insert(result);
        }
        results
    }

    fn accepts(&self, id: &ResourceId, record: &MatchRecord<T>) -> bool {
        match self.filters.iter().find(|f| !f.accept(id, record)) {
            Some(filter) => {
                tracing::trace!(resource = %id, filter = filter.name(), "discovery: rejected");
                false
            }
            None => true,
        }
    }

    fn rank(&self, resource: ResourceId, record: MatchRecord<T>) -> DiscoveryResult<T> {
        let contributions: Vec<f64> = self
            .scorers
            .iter()
            .map(|s| s.score(&resource, &record))
            .collect();
        let rank_score = self.composer.compose(&record, &contributions);

        let scores: Map<String, Value> = self
            .scorers
            .iter()
            .zip(&contributions)
            .map(|(s, c)| (s.name().to_string(), json!(c)))
            .collect();
        let metadata = json!({
            "scores": scores,
            "match_type": record.match_type().map(|t| t.to_string()),
            "explanation": record.explanation(),
        });

        DiscoveryResult {
            resource,
            rank_score,
            match_result: record,
            metadata,
        }
    }
}

/// One-shot discovery with explicit stages.
pub fn discover<T: MatchType>(
    types: MatchTypes<T>,
    candidates: BTreeMap<ResourceId, MatchRecord<T>>,
    filters: Vec<Arc<dyn MatchFilter<T>>>,
    scorers: Vec<Arc<dyn Scorer<T>>>,
    composer: Arc<dyn Composer<T>>,
) -> DiscoveryResults<T> {
    let pipeline = DiscoveryPipeline {
        types,
        filters,
        scorers,
        composer,
        parallel: false,
    };
    pipeline.discover(candidates)
}
