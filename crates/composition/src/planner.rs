//! Forward-chaining composition planner.
//!
//! Starting from a set of available concepts, each pass selects the
//! operations that have just become invokable, adds what they produce to the
//! available set, and records them as one [`Layer`]. The search stops at the
//! first pass that introduces no new concept.
//!
//! Per pass, for every not-yet-selected operation (services and operations in
//! catalogue order):
//! 1. pre-filter: does any required input match any concept introduced by the
//!    previous pass (all available concepts on pass 0)?
//! 2. full check: can every required input be assigned a distinct available
//!    concept that matches it, using the configured [`AssignmentStrategy`]?
//!
//! With `one_operation_per_service` set, the first operation selected from a
//! service ends that service's turn for the pass.
//!
//! Comparisons are `match(available, required)` and accepted at or above the
//! threshold verdict. A failing comparison aborts the run.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Instant;

use catalogue::{Catalogue, Operation, ResourceId};
use matcher::{
    CancellationToken, Concept, LogicMatchType, MatchExecutor, MatchType, Matcher, RunContext,
    TypeRange,
};
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};

use crate::config::{AssignmentStrategy, PlannerConfig};
use crate::error::PlanError;
use crate::graph::CompositionGraph;
use crate::metrics::metrics_recorder;

/// Operations that became invokable in the same pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    index: usize,
    operations: Vec<Arc<Operation>>,
}

impl Layer {
    pub fn new(index: usize, operations: Vec<Arc<Operation>>) -> Self {
        Self { index, operations }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Operations in selection order.
    pub fn operations(&self) -> &[Arc<Operation>] {
        &self.operations
    }

    pub fn ids(&self) -> Vec<&ResourceId> {
        self.operations.iter().map(|op| &op.id).collect()
    }

    pub fn contains(&self, id: &ResourceId) -> bool {
        self.operations.iter().any(|op| &op.id == id)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStats {
    pub passes: usize,
    /// Comparisons issued to the matcher.
    pub comparisons: u64,
    pub operations_selected: usize,
    /// Operations skipped because a sibling was already selected that pass.
    pub deferred_by_service_rule: usize,
}

/// Outcome of one `search`.
#[derive(Debug, Clone)]
pub struct CompositionPlan<T: MatchType = LogicMatchType> {
    pub initial_inputs: BTreeSet<Concept>,
    /// Initial inputs plus every concept produced along the way.
    pub available_inputs: BTreeSet<Concept>,
    /// One entry per pass. The last one is empty whenever the search ran to
    /// its fixpoint after selecting something.
    pub layers: Vec<Layer>,
    pub threshold: T,
    pub stats: PlanStats,
}

impl<T: MatchType> CompositionPlan<T> {
    pub fn non_empty_layers(&self) -> impl Iterator<Item = &Layer> {
        self.layers.iter().filter(|l| !l.is_empty())
    }

    /// Every selected operation, layer by layer.
    pub fn operations(&self) -> impl Iterator<Item = &Arc<Operation>> {
        self.layers.iter().flat_map(|l| l.operations.iter())
    }

    /// Index of the layer that selected `id`.
    pub fn layer_of(&self, id: &ResourceId) -> Option<usize> {
        self.layers.iter().position(|l| l.contains(id))
    }

    /// True when no operation was selected.
    pub fn is_empty(&self) -> bool {
        self.layers.iter().all(Layer::is_empty)
    }

    /// Concepts produced by the plan that were not initially available.
    pub fn produced(&self) -> BTreeSet<Concept> {
        self.available_inputs
            .difference(&self.initial_inputs)
            .cloned()
            .collect()
    }
}

/// Plans over one catalogue with one matcher.
pub struct CompositionPlanner<T: MatchType = LogicMatchType> {
    matcher: Arc<dyn Matcher<T>>,
    catalogue: Arc<dyn Catalogue>,
    config: PlannerConfig,
    pool: Option<Arc<ThreadPool>>,
}

impl<T: MatchType> CompositionPlanner<T> {
    pub fn new(
        matcher: Arc<dyn Matcher<T>>,
        catalogue: Arc<dyn Catalogue>,
        config: PlannerConfig,
    ) -> Result<Self, PlanError> {
        config.validate()?;
        let pool = config.executor.build_pool()?;
        Ok(Self {
            matcher,
            catalogue,
            config,
            pool,
        })
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn matcher(&self) -> &Arc<dyn Matcher<T>> {
        &self.matcher
    }

    pub fn catalogue(&self) -> &Arc<dyn Catalogue> {
        &self.catalogue
    }

    /// Executor bound to a fresh run context carrying `token`.
    pub fn executor(&self, token: CancellationToken) -> MatchExecutor<T, dyn Matcher<T>> {
        let ctx = RunContext::new()
            .with_token(token)
            .with_call_timeout(self.config.executor.call_timeout());
        MatchExecutor::sequential(Arc::clone(&self.matcher))
            .with_pool(self.pool.clone())
            .with_context(ctx)
    }

    pub fn search(
        &self,
        available_inputs: &BTreeSet<Concept>,
        threshold: T,
    ) -> Result<CompositionPlan<T>, PlanError> {
        self.search_with_token(available_inputs, threshold, CancellationToken::new())
    }

    /// As [`search`](Self::search), abandoning the run once `token` fires.
    pub fn search_with_token(
        &self,
        available_inputs: &BTreeSet<Concept>,
        threshold: T,
        token: CancellationToken,
    ) -> Result<CompositionPlan<T>, PlanError> {
        let started = Instant::now();
        let exec = self.executor(token);
        let range = exec.match_types().greater_or_equal_to(threshold);
        let services = self.catalogue.services();

        let mut available = available_inputs.clone();
        let mut new_inputs = available.clone();
        let mut selected: HashSet<ResourceId> = HashSet::new();
        let mut layers = Vec::new();
        let mut deferred = 0usize;

        tracing::debug!(
            inputs = available.len(),
            services = services.len(),
            %threshold,
            "planner: starting search"
        );

        loop {
            let pass = layers.len();
            if let Some(limit) = self.config.max_passes {
                if pass >= limit {
                    tracing::warn!(limit, "planner: pass limit reached");
                    return Err(PlanError::PassLimitExceeded { limit });
                }
            }
            exec.context().check()?;

            let mut chosen: Vec<Arc<Operation>> = Vec::new();
            for service in &services {
                let mut service_done = false;
                for op in &service.operations {
                    if selected.contains(&op.id) {
                        continue;
                    }
                    if service_done {
                        deferred += 1;
                        continue;
                    }
                    if !consumes_any(&exec, &new_inputs, op, &range)? {
                        continue;
                    }
                    if !is_invokable(&exec, &available, op, &range, self.config.assignment)? {
                        continue;
                    }
                    tracing::trace!(pass, operation = %op.id, "planner: operation invokable");
                    chosen.push(op.clone());
                    service_done = self.config.one_operation_per_service;
                }
            }

            let produced: BTreeSet<Concept> = chosen
                .iter()
                .flat_map(|op| op.produced_outputs.iter().cloned())
                .filter(|c| !available.contains(c))
                .collect();
            available.extend(produced.iter().cloned());
            selected.extend(chosen.iter().map(|op| op.id.clone()));

            tracing::debug!(
                pass,
                selected = chosen.len(),
                new_inputs = produced.len(),
                "planner: pass complete"
            );
            layers.push(Layer::new(pass, chosen));
            new_inputs = produced;
            if new_inputs.is_empty() {
                break;
            }
        }

        let stats = PlanStats {
            passes: layers.len(),
            comparisons: exec.context().comparisons(),
            operations_selected: selected.len(),
            deferred_by_service_rule: deferred,
        };
        let latency = started.elapsed();
        tracing::info!(
            passes = stats.passes,
            operations = stats.operations_selected,
            comparisons = stats.comparisons,
            ?latency,
            "planner: search finished"
        );
        if let Some(recorder) = metrics_recorder() {
            recorder.record_plan(stats.passes, stats.operations_selected, latency);
        }

        Ok(CompositionPlan {
            initial_inputs: available_inputs.clone(),
            available_inputs: available,
            layers,
            threshold,
            stats,
        })
    }

    /// Dependency graph over `layers`, edges accepted at or above `threshold`.
    pub fn build_graph(
        &self,
        layers: &[Layer],
        threshold: T,
    ) -> Result<CompositionGraph<T>, PlanError> {
        let exec = self.executor(CancellationToken::new());
        let range = exec.match_types().greater_or_equal_to(threshold);
        Ok(CompositionGraph::build(layers, &exec, &range)?)
    }
}

/// Whether any required input of `op` is matched by any of `offered`.
///
/// Operations with no required inputs never pass. The pairs go to the
/// matcher as one batch.
pub fn consumes_any<T, M>(
    exec: &MatchExecutor<T, M>,
    offered: &BTreeSet<Concept>,
    op: &Operation,
    range: &TypeRange<T>,
) -> Result<bool, PlanError>
where
    T: MatchType,
    M: Matcher<T> + ?Sized + 'static,
{
    if offered.is_empty() || op.required_inputs.is_empty() {
        return Ok(false);
    }
    let pairs = matcher::cartesian(offered, &op.required_inputs);
    Ok(exec.any_within(&pairs, range)?)
}

/// Whether every required input of `op` can be given a distinct concept
/// from `available` that satisfies it.
///
/// `Greedy` compares lazily: each required input, in order, takes the first
/// unused concept it accepts, and the check stops at the first input left
/// without one. `Exact` needs the whole compatibility matrix, so it compares
/// every pair in one batch before solving the assignment.
pub fn is_invokable<T, M>(
    exec: &MatchExecutor<T, M>,
    available: &BTreeSet<Concept>,
    op: &Operation,
    range: &TypeRange<T>,
    strategy: AssignmentStrategy,
) -> Result<bool, PlanError>
where
    T: MatchType,
    M: Matcher<T> + ?Sized + 'static,
{
    let required: Vec<&Concept> = op.required_inputs.iter().collect();
    if required.len() > available.len() {
        return Ok(false);
    }
    let offered: Vec<&Concept> = available.iter().collect();
    let width = offered.len();

    match strategy {
        AssignmentStrategy::Greedy => {
            let mut used = vec![false; width];
            'inputs: for input in &required {
                for (j, candidate) in offered.iter().enumerate() {
                    if used[j] {
                        continue;
                    }
                    if range.accepts(&exec.compare(candidate, input)?) {
                        used[j] = true;
                        continue 'inputs;
                    }
                }
                return Ok(false);
            }
            Ok(true)
        }
        AssignmentStrategy::Exact => {
            let pairs: Vec<(Concept, Concept)> = required
                .iter()
                .flat_map(|r| offered.iter().map(move |a| ((*a).clone(), (*r).clone())))
                .collect();
            let results = exec.match_pairs(&pairs)?;
            let compatible: Vec<Vec<usize>> = (0..required.len())
                .map(|i| {
                    (0..width)
                        .filter(|&j| range.accepts(&results[i * width + j]))
                        .collect()
                })
                .collect();
            Ok(strategy.assign(&compatible, width).is_some())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalogue::{InMemoryCatalogue, Service};
    use matcher::demo_utils::{
        demo_hierarchy, BulkMatcher, CountingMatcher, FailingMatcher, TableMatcher,
    };
    use matcher::{ExecutorConfig, LogicMatchType::*};

    fn set(ids: &[&str]) -> BTreeSet<Concept> {
        ids.iter().map(|id| Concept::new(*id)).collect()
    }

    fn op(id: &str, inputs: &[&str], outputs: &[&str]) -> Operation {
        Operation::new(id, "", set(inputs), set(outputs))
    }

    fn chain_catalogue() -> Arc<dyn Catalogue> {
        Arc::new(
            InMemoryCatalogue::from_services([
                Service::new("svc:1").with_operation(op("Op1", &["A"], &["B"])),
                Service::new("svc:2").with_operation(op("Op2", &["B"], &["C"])),
                Service::new("svc:3").with_operation(op("Op3", &["A", "C"], &["D"])),
            ])
            .unwrap(),
        )
    }

    fn planner(catalogue: Arc<dyn Catalogue>, config: PlannerConfig) -> CompositionPlanner {
        let matcher: Arc<dyn Matcher> = Arc::new(TableMatcher::new());
        CompositionPlanner::new(matcher, catalogue, config).unwrap()
    }

    fn layer_ids(plan: &CompositionPlan) -> Vec<Vec<String>> {
        plan.layers
            .iter()
            .map(|l| l.ids().iter().map(|id| id.to_string()).collect())
            .collect()
    }

    #[test]
    fn chain_is_layered_pass_by_pass() {
        let plan = planner(chain_catalogue(), PlannerConfig::default())
            .search(&set(&["A"]), Exact)
            .unwrap();
        assert_eq!(
            layer_ids(&plan),
            vec![vec!["Op1"], vec!["Op2"], vec!["Op3"], Vec::<&str>::new()]
        );
        assert_eq!(plan.available_inputs, set(&["A", "B", "C", "D"]));
        assert_eq!(plan.produced(), set(&["B", "C", "D"]));
        assert_eq!(plan.layer_of(&"Op3".into()), Some(2));
        assert_eq!(plan.non_empty_layers().count(), 3);
        assert_eq!(plan.stats.operations_selected, 3);
    }

    #[test]
    fn no_progress_yields_single_empty_layer() {
        let catalogue: Arc<dyn Catalogue> = Arc::new(
            InMemoryCatalogue::from_services([
                Service::new("svc").with_operation(op("needsY", &["Y"], &["Z"]))
            ])
            .unwrap(),
        );
        let plan = planner(catalogue, PlannerConfig::default())
            .search(&set(&["X"]), Exact)
            .unwrap();
        assert_eq!(plan.layers.len(), 1);
        assert!(plan.layers[0].is_empty());
        assert!(plan.is_empty());
        // Only the pre-filter comparison X -> Y.
        assert_eq!(plan.stats.comparisons, 1);
    }

    #[test]
    fn operations_without_inputs_are_never_selected() {
        let catalogue: Arc<dyn Catalogue> = Arc::new(
            InMemoryCatalogue::from_services([
                Service::new("svc").with_operation(op("free", &[], &["B"]))
            ])
            .unwrap(),
        );
        let plan = planner(catalogue, PlannerConfig::default())
            .search(&set(&["A"]), Exact)
            .unwrap();
        assert!(plan.is_empty());
    }

    fn sibling_catalogue() -> Arc<dyn Catalogue> {
        Arc::new(
            InMemoryCatalogue::from_services([Service::new("svc")
                .with_operation(op("first", &["A"], &["B"]))
                .with_operation(op("second", &["A"], &["C"]))])
            .unwrap(),
        )
    }

    #[test]
    fn one_operation_per_service_defers_siblings() {
        let plan = planner(sibling_catalogue(), PlannerConfig::default())
            .search(&set(&["A"]), Exact)
            .unwrap();
        // A is not new on pass 1, so "second" never passes the pre-filter again.
        assert_eq!(layer_ids(&plan)[0], vec!["first"]);
        assert!(plan.layer_of(&"second".into()).is_none());
        assert_eq!(plan.stats.deferred_by_service_rule, 1);
    }

    #[test]
    fn service_rule_can_be_disabled() {
        let plan = planner(
            sibling_catalogue(),
            PlannerConfig::default().with_one_operation_per_service(false),
        )
        .search(&set(&["A"]), Exact)
        .unwrap();
        assert_eq!(layer_ids(&plan)[0], vec!["first", "second"]);
        assert_eq!(plan.stats.deferred_by_service_rule, 0);
    }

    #[test]
    fn exact_assignment_selects_what_greedy_rejects() {
        // r1 takes a1 first, leaving nothing for r2.
        let table = TableMatcher::new()
            .with("a1", "r1", Exact)
            .with("a1", "r2", Exact)
            .with("a2", "r1", Exact);
        let catalogue: Arc<dyn Catalogue> = Arc::new(
            InMemoryCatalogue::from_services([
                Service::new("svc").with_operation(op("op", &["r1", "r2"], &["out"]))
            ])
            .unwrap(),
        );
        let run = |strategy| {
            let planner: CompositionPlanner = CompositionPlanner::new(
                Arc::new(table.clone()),
                catalogue.clone(),
                PlannerConfig::default().with_assignment(strategy),
            )
            .unwrap();
            planner.search(&set(&["a1", "a2"]), Exact).unwrap()
        };
        assert!(run(AssignmentStrategy::Greedy).is_empty());
        assert_eq!(run(AssignmentStrategy::Exact).layer_of(&"op".into()), Some(0));
    }

    #[test]
    fn threshold_admits_weaker_verdicts() {
        let catalogue: Arc<dyn Catalogue> = Arc::new(
            InMemoryCatalogue::from_services([
                Service::new("svc").with_operation(op("ride", &["ex:Vehicle"], &["ex:Trip"]))
            ])
            .unwrap(),
        );
        let strict: CompositionPlanner = CompositionPlanner::new(
            Arc::new(demo_hierarchy()),
            catalogue.clone(),
            PlannerConfig::default(),
        )
        .unwrap();
        assert!(strict.search(&set(&["ex:Car"]), Exact).unwrap().is_empty());
        let plan = strict.search(&set(&["ex:Car"]), Plugin).unwrap();
        assert_eq!(plan.layer_of(&"ride".into()), Some(0));
    }

    #[test]
    fn pass_limit_aborts_long_chains() {
        let err = planner(chain_catalogue(), PlannerConfig::default().with_max_passes(2))
            .search(&set(&["A"]), Exact)
            .unwrap_err();
        assert!(matches!(err, PlanError::PassLimitExceeded { limit: 2 }));
    }

    #[test]
    fn cancelled_token_aborts_before_first_pass() {
        let token = CancellationToken::new();
        token.cancel();
        let err = planner(chain_catalogue(), PlannerConfig::default())
            .search_with_token(&set(&["A"]), Exact, token)
            .unwrap_err();
        assert!(matches!(err, PlanError::Match(matcher::MatchError::Cancelled)));
    }

    #[test]
    fn parallel_executor_gives_identical_layers() {
        let seq = planner(chain_catalogue(), PlannerConfig::default())
            .search(&set(&["A"]), Exact)
            .unwrap();
        let par = planner(
            chain_catalogue(),
            PlannerConfig::default().with_executor(ExecutorConfig::parallel(3)),
        )
        .search(&set(&["A"]), Exact)
        .unwrap();
        assert_eq!(seq.layers, par.layers);
        assert_eq!(seq.available_inputs, par.available_inputs);
    }

    #[test]
    fn consumes_any_sends_one_batch() {
        let matcher = Arc::new(BulkMatcher::new(TableMatcher::new()));
        let exec = MatchExecutor::sequential(matcher.clone());
        let range = exec.match_types().greater_or_equal_to(Exact);
        let operation = op("op", &["A", "B"], &["C"]);
        assert!(consumes_any(&exec, &set(&["A", "Z"]), &operation, &range).unwrap());
        assert_eq!(matcher.batches(), 1);
        assert_eq!(matcher.singles(), 0);
    }

    #[test]
    fn greedy_stops_comparing_at_first_unsatisfied_input() {
        let matcher = Arc::new(CountingMatcher::new(TableMatcher::new()));
        let exec = MatchExecutor::sequential(matcher.clone());
        let range = exec.match_types().greater_or_equal_to(Exact);
        let operation = op("op", &["r1", "r2"], &["out"]);
        let invokable = is_invokable(
            &exec,
            &set(&["a1", "a2"]),
            &operation,
            &range,
            AssignmentStrategy::Greedy,
        )
        .unwrap();
        assert!(!invokable);
        // a1 -> r1 and a2 -> r1 only.
        assert_eq!(matcher.calls(), 2);
    }

    #[test]
    fn greedy_takes_first_accepted_concept_per_input() {
        let table = TableMatcher::new()
            .with("a1", "r1", Exact)
            .with("a2", "r2", Exact);
        let matcher = Arc::new(CountingMatcher::new(table));
        let exec = MatchExecutor::sequential(matcher.clone());
        let range = exec.match_types().greater_or_equal_to(Exact);
        let operation = op("op", &["r1", "r2"], &["out"]);
        let invokable = is_invokable(
            &exec,
            &set(&["a1", "a2", "a3"]),
            &operation,
            &range,
            AssignmentStrategy::Greedy,
        )
        .unwrap();
        assert!(invokable);
        // r1: a1. r2: a2 (a1 already used). a3 is never compared.
        assert_eq!(matcher.calls(), 2);
    }

    #[test]
    fn greedy_never_reaches_a_failing_later_input() {
        let failing = Arc::new(FailingMatcher::on_destination(TableMatcher::new(), "r2"));
        let operation = op("op", &["r1", "r2"], &["out"]);
        let available = set(&["a1", "a2"]);

        let exec = MatchExecutor::sequential(failing.clone());
        let range = exec.match_types().greater_or_equal_to(Exact);
        let greedy = is_invokable(&exec, &available, &operation, &range, AssignmentStrategy::Greedy);
        assert!(!greedy.unwrap());

        let exec = MatchExecutor::sequential(failing);
        let exact = is_invokable(&exec, &available, &operation, &range, AssignmentStrategy::Exact);
        assert!(matches!(
            exact,
            Err(PlanError::Match(matcher::MatchError::MatcherUnavailable { .. }))
        ));
    }

    #[test]
    fn failed_search_leaves_caller_token_usable() {
        let token = CancellationToken::new();
        let failing: CompositionPlanner = CompositionPlanner::new(
            Arc::new(FailingMatcher::always(TableMatcher::new())),
            chain_catalogue(),
            PlannerConfig::default(),
        )
        .unwrap();
        assert!(failing
            .search_with_token(&set(&["A"]), Exact, token.clone())
            .is_err());
        assert!(!token.is_cancelled());

        let plan = planner(chain_catalogue(), PlannerConfig::default())
            .search_with_token(&set(&["A"]), Exact, token)
            .unwrap();
        assert_eq!(plan.non_empty_layers().count(), 3);
    }
}
