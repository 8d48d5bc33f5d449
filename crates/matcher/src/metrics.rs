// Metrics hooks for the `matcher` crate.
//
// Callers install a global `MatchMetrics` implementation via [`set_match_metrics`];
// every matcher call issued through a `MatchExecutor` (one pair or one batch)
// then reports the matcher name, wall-clock latency and whether the call
// succeeded. This keeps
// instrumentation decoupled from any specific metrics backend.
use std::sync::{Arc, RwLock};
use std::time::Duration;

use once_cell::sync::OnceCell;

/// Metrics observer for concept comparisons.
pub trait MatchMetrics: Send + Sync {
    /// Record the outcome of one comparison.
    fn record_comparison(&self, matcher: &str, latency: Duration, succeeded: bool);
}

fn metrics_lock() -> &'static RwLock<Option<Arc<dyn MatchMetrics>>> {
    static METRICS: OnceCell<RwLock<Option<Arc<dyn MatchMetrics>>>> = OnceCell::new();
    METRICS.get_or_init(|| RwLock::new(None))
}

pub(crate) fn metrics_recorder() -> Option<Arc<dyn MatchMetrics>> {
    let guard = metrics_lock()
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    guard.clone()
}

/// Install or clear the global comparison metrics recorder.
///
/// This is typically called once during startup so every executor shares the
/// same metrics backend.
pub fn set_match_metrics(recorder: Option<Arc<dyn MatchMetrics>>) {
    let lock = metrics_lock();
    let mut guard = lock
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    *guard = recorder;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::demo_utils::demo_hierarchy;
    use crate::executor::MatchExecutor;

    #[derive(Default)]
    struct Recorder {
        ok: AtomicUsize,
        names: RwLock<Vec<String>>,
    }

    impl MatchMetrics for Recorder {
        fn record_comparison(&self, matcher: &str, _latency: Duration, succeeded: bool) {
            if succeeded {
                self.ok.fetch_add(1, Ordering::SeqCst);
            }
            self.names.write().unwrap().push(matcher.to_string());
        }
    }

    #[test]
    fn executor_reports_each_matcher_call() {
        let recorder = Arc::new(Recorder::default());
        set_match_metrics(Some(recorder.clone()));

        MatchExecutor::sequential(Arc::new(demo_hierarchy()))
            .compare(&"ex:Car".into(), &"ex:Vehicle".into())
            .unwrap();

        set_match_metrics(None);
        // Other tests may run concurrently with the recorder installed.
        assert!(recorder.ok.load(Ordering::SeqCst) >= 1);
        assert!(recorder
            .names
            .read()
            .unwrap()
            .iter()
            .any(|n| n == "hierarchy"));
    }
}
