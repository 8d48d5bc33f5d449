// Metrics hooks for the `composition` crate.
//
// Install a `PlanMetrics` implementation via [`set_plan_metrics`] to observe
// every completed planning run: number of passes, operations selected and
// wall-clock latency. Failed runs are not reported.
use std::sync::{Arc, RwLock};
use std::time::Duration;

use once_cell::sync::OnceCell;

/// Observer for completed planning runs.
pub trait PlanMetrics: Send + Sync {
    fn record_plan(&self, passes: usize, operations_selected: usize, latency: Duration);
}

fn metrics_lock() -> &'static RwLock<Option<Arc<dyn PlanMetrics>>> {
    static METRICS: OnceCell<RwLock<Option<Arc<dyn PlanMetrics>>>> = OnceCell::new();
    METRICS.get_or_init(|| RwLock::new(None))
}

pub(crate) fn metrics_recorder() -> Option<Arc<dyn PlanMetrics>> {
    let guard = metrics_lock()
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    guard.clone()
}

/// Install or clear the global planning metrics recorder.
pub fn set_plan_metrics(recorder: Option<Arc<dyn PlanMetrics>>) {
    let mut guard = metrics_lock()
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    *guard = recorder;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use catalogue::{InMemoryCatalogue, Operation, Service};
    use matcher::demo_utils::TableMatcher;
    use matcher::{Concept, LogicMatchType, Matcher};

    use crate::{CompositionPlanner, PlannerConfig};

    #[derive(Default)]
    struct Recorder {
        plans: AtomicUsize,
        selected: AtomicUsize,
    }

    impl PlanMetrics for Recorder {
        fn record_plan(&self, _passes: usize, operations_selected: usize, _latency: Duration) {
            self.plans.fetch_add(1, Ordering::SeqCst);
            self.selected.fetch_add(operations_selected, Ordering::SeqCst);
        }
    }

    #[test]
    fn completed_plans_are_reported() {
        let recorder = Arc::new(Recorder::default());
        set_plan_metrics(Some(recorder.clone()));

        let catalogue = InMemoryCatalogue::from_services([Service::new("svc").with_operation(
            Operation::new("op", "svc", [Concept::new("A")], [Concept::new("B")]),
        )])
        .unwrap();
        let matcher: Arc<dyn Matcher> = Arc::new(TableMatcher::new());
        let planner = CompositionPlanner::new(matcher, Arc::new(catalogue), PlannerConfig::default())
            .unwrap();
        planner
            .search(&BTreeSet::from([Concept::new("A")]), LogicMatchType::Exact)
            .unwrap();

        set_plan_metrics(None);
        assert!(recorder.plans.load(Ordering::SeqCst) >= 1);
        assert!(recorder.selected.load(Ordering::SeqCst) >= 1);
    }
}
