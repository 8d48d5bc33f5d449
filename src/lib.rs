//! Workspace umbrella crate for capmatch.
//!
//! Re-exports the matching, catalogue, discovery and composition layers and
//! stitches them together behind [`Engine`]: one matcher, one catalogue and
//! one configuration answering `search`, `build_graph` and `discover` calls.

pub mod config;

pub use catalogue::{
    Catalogue, CatalogueDocument, CatalogueError, InMemoryCatalogue, MessageContent, MessagePart,
    Operation, OperationDefinition, Resource, ResourceId, Service, ServiceDefinition,
};
pub use composition::{
    consumes_any, is_invokable, set_plan_metrics, AssignmentStrategy, CompositionGraph,
    CompositionPlan, CompositionPlanner, ConceptEdge, Layer, PlanError, PlanMetrics, PlanStats,
    PlannerConfig,
};
pub use discovery::{
    discover, filter_fn, scorer_fn, Composer, DiscoveryConfig, DiscoveryError, DiscoveryMode,
    DiscoveryPipeline, DiscoveryResult, DiscoveryResults, MatchFilter, MatchScoreScorer,
    MaxComposer, MinScoreFilter, NamespaceFilter, NeutralComposer, OperationDiscoverer, Scorer,
    SumComposer, TypeRangeFilter, TypeRankScorer, WeightedComposer,
};
pub use matcher::{
    set_match_metrics, CancellationToken, CompositeMatchResult, Concept, ConceptDefinition,
    ExecutorConfig, HierarchyMatcher, LogicMatchType, MatchError, MatchMetrics, MatchRecord,
    MatchResult, MatchType, MatchTypes, Matcher, MatcherRegistry, ScoreAggregation, TypeRange,
};

pub use crate::config::{ConfigLoadError, EngineConfig, MatcherYamlConfig, PlannerYamlConfig};

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use thiserror::Error;

/// Errors surfaced by [`Engine`].
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigLoadError),
    #[error(transparent)]
    Match(#[from] MatchError),
    #[error(transparent)]
    Catalogue(#[from] CatalogueError),
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
}

/// A matcher, a catalogue and the settings to plan and discover over them.
pub struct Engine {
    config: EngineConfig,
    matcher: Arc<dyn Matcher>,
    catalogue: Arc<dyn Catalogue>,
    planner: CompositionPlanner,
    discoverer: OperationDiscoverer,
}

impl Engine {
    pub fn new(
        matcher: Arc<dyn Matcher>,
        catalogue: Arc<dyn Catalogue>,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let planner =
            CompositionPlanner::new(matcher.clone(), catalogue.clone(), config.planner_config())?;
        let discoverer = OperationDiscoverer::new(
            matcher.clone(),
            catalogue.clone(),
            config.matcher.executor_config(),
        )?;
        tracing::debug!(
            matcher = matcher.name(),
            resources = catalogue.list_resource_ids().len(),
            "engine: ready"
        );
        Ok(Self {
            config,
            matcher,
            catalogue,
            planner,
            discoverer,
        })
    }

    /// Engine using the matcher the configuration names in `registry`.
    pub fn from_registry(
        registry: &MatcherRegistry,
        catalogue: Arc<dyn Catalogue>,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        let matcher = registry.get(&config.matcher.default)?;
        Self::new(matcher, catalogue, config)
    }

    /// Engine over a catalogue document, matched by a [`HierarchyMatcher`]
    /// built from the document's concept definitions.
    pub fn from_document(
        document: &CatalogueDocument,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        let mut registry = MatcherRegistry::new();
        registry.register_instance(
            HierarchyMatcher::NAME,
            Arc::new(HierarchyMatcher::from_definitions(&document.concepts)),
        );
        let catalogue = Arc::new(document.to_catalogue()?);
        Self::from_registry(&registry, catalogue, config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn matcher(&self) -> &Arc<dyn Matcher> {
        &self.matcher
    }

    pub fn catalogue(&self) -> &Arc<dyn Catalogue> {
        &self.catalogue
    }

    pub fn planner(&self) -> &CompositionPlanner {
        &self.planner
    }

    pub fn discoverer(&self) -> &OperationDiscoverer {
        &self.discoverer
    }

    /// Forward-chaining search from `available_inputs`.
    pub fn search(
        &self,
        available_inputs: &BTreeSet<Concept>,
        threshold: LogicMatchType,
    ) -> Result<CompositionPlan, EngineError> {
        Ok(self.planner.search(available_inputs, threshold)?)
    }

    pub fn build_graph(
        &self,
        layers: &[Layer],
        threshold: LogicMatchType,
    ) -> Result<CompositionGraph, EngineError> {
        Ok(self.planner.build_graph(layers, threshold)?)
    }

    /// Rank caller-supplied candidates through `pipeline`.
    pub fn discover(
        &self,
        candidates: BTreeMap<ResourceId, MatchRecord<LogicMatchType>>,
        pipeline: &DiscoveryPipeline,
    ) -> DiscoveryResults {
        pipeline.discover(candidates)
    }

    /// Operations producing the wanted concepts at or above `min_type`,
    /// best first, truncated by the discovery settings.
    pub fn discover_producing(
        &self,
        wanted: &BTreeSet<Concept>,
        min_type: LogicMatchType,
        mode: DiscoveryMode,
    ) -> Result<Vec<DiscoveryResult>, EngineError> {
        let types = self.matcher.match_types();
        let range = types.at_least(min_type);
        let pipeline = self.default_pipeline(types);
        let results = self
            .discoverer
            .discover_producing(wanted, &range, mode, &pipeline)?;
        Ok(self.truncate(&results))
    }

    /// Operations whose inputs the offered concepts satisfy at or above
    /// `min_type`, best first, truncated by the discovery settings.
    pub fn discover_consuming(
        &self,
        offered: &BTreeSet<Concept>,
        min_type: LogicMatchType,
        mode: DiscoveryMode,
    ) -> Result<Vec<DiscoveryResult>, EngineError> {
        let types = self.matcher.match_types();
        let range = types.at_least(min_type);
        let pipeline = self.default_pipeline(types);
        let results = self
            .discoverer
            .discover_consuming(offered, &range, mode, &pipeline)?;
        Ok(self.truncate(&results))
    }

    fn default_pipeline(&self, types: MatchTypes<LogicMatchType>) -> DiscoveryPipeline {
        DiscoveryPipeline::new(types.clone())
            .with_scorer(MatchScoreScorer)
            .with_scorer(TypeRankScorer::new(types))
            .with_parallel(self.config.matcher.parallel)
    }

    fn truncate(&self, results: &DiscoveryResults) -> Vec<DiscoveryResult> {
        results
            .top(&self.config.discovery)
            .into_iter()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document() -> CatalogueDocument {
        CatalogueDocument::from_json(
            r#"{
                "concepts": [
                    { "id": "ex:SportsCar", "parents": ["ex:Car"] },
                    { "id": "ex:Car", "parents": ["ex:Vehicle"] }
                ],
                "services": [
                    { "id": "dealer", "operations": [
                        { "id": "quote", "requires": ["ex:Car"], "produces": ["ex:Price"] }
                    ] },
                    { "id": "bank", "operations": [
                        { "id": "loan", "requires": ["ex:Price"], "produces": ["ex:Loan"] }
                    ] }
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn engine_plans_over_document() {
        let engine = Engine::from_document(&document(), EngineConfig::default()).unwrap();
        let inputs = BTreeSet::from([Concept::new("ex:SportsCar")]);

        let plan = engine.search(&inputs, LogicMatchType::Plugin).unwrap();
        assert_eq!(plan.layer_of(&"quote".into()), Some(0));
        assert_eq!(plan.layer_of(&"loan".into()), Some(1));

        let graph = engine.build_graph(&plan.layers, LogicMatchType::Exact).unwrap();
        assert!(graph.contains_edge(&"quote".into(), &"loan".into()));
    }

    #[test]
    fn unknown_default_matcher_is_reported() {
        let mut config = EngineConfig::default();
        config.matcher.default = "reasoner".into();
        let err = Engine::from_document(&document(), config).err().unwrap();
        assert!(matches!(
            err,
            EngineError::Match(MatchError::UnknownMatcher(name)) if name == "reasoner"
        ));
    }

    #[test]
    fn discovery_respects_result_limit() {
        let mut config = EngineConfig::default();
        config.discovery.max_results = 1;
        let engine = Engine::from_document(&document(), config).unwrap();
        let wanted = BTreeSet::from([Concept::new("ex:Price"), Concept::new("ex:Loan")]);
        let found = engine
            .discover_producing(&wanted, LogicMatchType::Exact, DiscoveryMode::Any)
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].resource.as_str(), "loan");
    }
}
