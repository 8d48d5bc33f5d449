//! Fan-out of comparisons over a bounded worker pool.
//!
//! Comparisons are pure functions of `(origin, destination)`, so a batch can
//! be spread across a rayon pool and collected back in input order. Every run
//! carries a [`RunContext`]: cancellation checked before each call, an
//! optional per-call budget, and the first failure seen. The first failure
//! aborts the run so outstanding comparisons stop, and that failure (not the
//! resulting `Cancelled`s) is what the caller gets back.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};

use crate::concept::Concept;
use crate::error::MatchError;
use crate::lattice::{MatchType, MatchTypes, TypeRange};
use crate::matcher::{MatchTable, Matcher};
use crate::metrics::metrics_recorder;
use crate::result::MatchResult;

/// Worker pool and per-call budget settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Fan comparisons out across a worker pool. Sequential when `false`.
    #[serde(default)]
    pub parallel: bool,
    /// Pool size when `parallel` is set.
    #[serde(default = "ExecutorConfig::default_workers")]
    pub workers: usize,
    /// Budget for a single comparison, in milliseconds.
    #[serde(default)]
    pub call_timeout_ms: Option<u64>,
}

impl ExecutorConfig {
    pub(crate) fn default_workers() -> usize {
        4
    }

    pub fn parallel(workers: usize) -> Self {
        Self {
            parallel: true,
            workers,
            call_timeout_ms: None,
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<(), MatchError> {
        if self.workers == 0 {
            return Err(MatchError::InvalidConfig(
                "workers must be greater than zero".into(),
            ));
        }
        if self.call_timeout_ms == Some(0) {
            return Err(MatchError::InvalidConfig(
                "call_timeout_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Build the worker pool, or `None` for sequential execution.
    pub fn build_pool(&self) -> Result<Option<Arc<ThreadPool>>, MatchError> {
        self.validate()?;
        if !self.parallel {
            return Ok(None);
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|idx| format!("capmatch-match-{idx}"))
            .build()
            .map_err(|e| MatchError::InvalidConfig(format!("worker pool: {e}")))?;
        Ok(Some(Arc::new(pool)))
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            parallel: false,
            workers: Self::default_workers(),
            call_timeout_ms: None,
        }
    }
}

/// Shared flag that aborts a run.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// State owned by one planning or discovery run.
///
/// Two tokens stop a run: the caller's, which the run only ever reads, and
/// an internal one that the run's own first failure fires. Clones share both,
/// so every worker of a run sees the same state, while separate runs that
/// were handed the same caller token stay independent.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    token: CancellationToken,
    aborted: CancellationToken,
    call_timeout: Option<Duration>,
    comparisons: Arc<AtomicU64>,
    first_error: Arc<Mutex<Option<MatchError>>>,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// The caller's token.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout
    }

    /// Comparisons issued so far in this run.
    pub fn comparisons(&self) -> u64 {
        self.comparisons.load(Ordering::Relaxed)
    }

    /// Whether the caller cancelled the run or the run aborted itself.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled() || self.aborted.is_cancelled()
    }

    /// `Err(Cancelled)` once the run has been stopped.
    pub fn check(&self) -> Result<(), MatchError> {
        if self.is_cancelled() {
            return Err(MatchError::Cancelled);
        }
        Ok(())
    }

    /// Record `err` as the run's failure (first one wins) and abort the run.
    /// The caller's token is left alone.
    pub fn fail(&self, err: MatchError) -> MatchError {
        let mut slot = self
            .first_error
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.is_none() && err != MatchError::Cancelled {
            *slot = Some(err.clone());
        }
        drop(slot);
        self.aborted.cancel();
        err
    }

    /// The failure that aborted the run, if any.
    pub fn root_cause(&self) -> Option<MatchError> {
        self.first_error
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn resolve(&self, err: MatchError) -> MatchError {
        match err {
            MatchError::Cancelled => self.root_cause().unwrap_or(MatchError::Cancelled),
            other => other,
        }
    }
}

/// Runs comparisons for one matcher under one [`RunContext`].
///
/// Batches go to the matcher through [`Matcher::match_pairs`], so a bulk
/// `match_all` override serves them; single comparisons go through
/// `match_concepts`. With a call budget set, each matcher call runs on its
/// own thread and the run fails with [`MatchError::Timeout`] as soon as the
/// budget expires. The late answer is dropped when it arrives.
pub struct MatchExecutor<T: MatchType, M: Matcher<T> + ?Sized> {
    matcher: Arc<M>,
    types: MatchTypes<T>,
    ctx: RunContext,
    pool: Option<Arc<ThreadPool>>,
}

impl<T: MatchType, M: Matcher<T> + ?Sized + 'static> MatchExecutor<T, M> {
    /// Sequential executor with a fresh context.
    pub fn sequential(matcher: Arc<M>) -> Self {
        let types = matcher.match_types();
        Self {
            matcher,
            types,
            ctx: RunContext::new(),
            pool: None,
        }
    }

    /// Executor configured from `config`, with a fresh context carrying the
    /// configured call budget.
    pub fn new(matcher: Arc<M>, config: &ExecutorConfig) -> Result<Self, MatchError> {
        let pool = config.build_pool()?;
        Ok(Self::sequential(matcher)
            .with_pool(pool)
            .with_context(RunContext::new().with_call_timeout(config.call_timeout())))
    }

    /// Share an already built pool (`None` for sequential).
    pub fn with_pool(mut self, pool: Option<Arc<ThreadPool>>) -> Self {
        self.pool = pool;
        self
    }

    pub fn with_context(mut self, ctx: RunContext) -> Self {
        self.ctx = ctx;
        self
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    pub fn matcher(&self) -> &M {
        self.matcher.as_ref()
    }

    pub fn match_types(&self) -> &MatchTypes<T> {
        &self.types
    }

    pub fn is_parallel(&self) -> bool {
        self.pool.is_some()
    }

    /// Compare one pair, enforcing cancellation, the call budget and the
    /// matcher's declared verdicts.
    pub fn compare(
        &self,
        origin: &Concept,
        destination: &Concept,
    ) -> Result<MatchResult<T>, MatchError> {
        self.ctx.check()?;
        self.ctx.comparisons.fetch_add(1, Ordering::Relaxed);
        let (o, d) = (origin.clone(), destination.clone());
        let result = self.call(move |m| m.match_concepts(&o, &d))?;
        self.verify(&result)?;
        tracing::trace!(
            matcher = self.matcher.name(),
            %origin,
            %destination,
            verdict = %result.match_type,
            "compared"
        );
        Ok(result)
    }

    /// Compare every pair; results come back in input order.
    ///
    /// Sequentially the whole list is one matcher call. On a pool the pairs
    /// are split by origin and each origin's pairs are one call.
    pub fn match_pairs(
        &self,
        pairs: &[(Concept, Concept)],
    ) -> Result<Vec<MatchResult<T>>, MatchError> {
        let results = match &self.pool {
            Some(pool) => {
                let groups = origin_groups(pairs);
                pool.install(|| {
                    groups
                        .par_iter()
                        .map(|indices| {
                            let chunk: Vec<_> = indices.iter().map(|&i| pairs[i].clone()).collect();
                            self.batch(chunk)
                                .map(|rs| indices.iter().copied().zip(rs).collect::<Vec<_>>())
                        })
                        .collect::<Result<Vec<_>, _>>()
                })
                .map(|groups| {
                    let mut indexed: Vec<(usize, MatchResult<T>)> =
                        groups.into_iter().flatten().collect();
                    indexed.sort_by_key(|(i, _)| *i);
                    indexed.into_iter().map(|(_, r)| r).collect()
                })
            }
            None => self.batch(pairs.to_vec()),
        };
        self.finish(results)
    }

    /// Whether any pair has a verdict within `range`. The pairs go out as
    /// one batch.
    pub fn any_within(
        &self,
        pairs: &[(Concept, Concept)],
        range: &TypeRange<T>,
    ) -> Result<bool, MatchError> {
        Ok(self.match_pairs(pairs)?.iter().any(|r| range.accepts(r)))
    }

    /// Cartesian product of `origins` and `destinations`.
    pub fn match_all(
        &self,
        origins: &BTreeSet<Concept>,
        destinations: &BTreeSet<Concept>,
    ) -> Result<MatchTable<T>, MatchError> {
        let pairs = cartesian(origins, destinations);
        Ok(self.match_pairs(&pairs)?.into_iter().collect())
    }

    /// Candidates whose verdict against `origin` lies within `range`.
    pub fn list_matches_within_range(
        &self,
        origin: &Concept,
        candidates: &BTreeSet<Concept>,
        range: &TypeRange<T>,
    ) -> Result<BTreeMap<Concept, MatchResult<T>>, MatchError> {
        let pairs: Vec<_> = candidates
            .iter()
            .map(|c| (origin.clone(), c.clone()))
            .collect();
        Ok(self
            .match_pairs(&pairs)?
            .into_iter()
            .filter(|r| range.accepts(r))
            .map(|r| (r.matched.clone(), r))
            .collect())
    }

    /// All `(origin, candidate)` results within `range`, fanned out as one batch.
    pub fn list_matches_within_range_batch(
        &self,
        origins: &BTreeSet<Concept>,
        candidates: &BTreeSet<Concept>,
        range: &TypeRange<T>,
    ) -> Result<MatchTable<T>, MatchError> {
        let mut table = self.match_all(origins, candidates)?;
        table.retain(range);
        Ok(table)
    }

    /// One matcher call for `pairs`.
    fn batch(&self, pairs: Vec<(Concept, Concept)>) -> Result<Vec<MatchResult<T>>, MatchError> {
        self.ctx.check()?;
        if pairs.is_empty() {
            return Ok(Vec::new());
        }
        let expected = pairs.len();
        self.ctx
            .comparisons
            .fetch_add(expected as u64, Ordering::Relaxed);
        let results = self.call(move |m| m.match_pairs(&pairs))?;
        if results.len() != expected {
            return Err(self.ctx.fail(MatchError::unavailable(
                self.matcher.name(),
                format!("answered {} of {expected} pairs", results.len()),
            )));
        }
        for result in &results {
            self.verify(result)?;
        }
        tracing::trace!(matcher = self.matcher.name(), pairs = expected, "compared batch");
        Ok(results)
    }

    /// Run `call` against the matcher under the call budget, recording
    /// metrics and aborting the run on failure.
    fn call<R, F>(&self, call: F) -> Result<R, MatchError>
    where
        R: Send + 'static,
        F: FnOnce(&M) -> Result<R, MatchError> + Send + 'static,
    {
        let start = Instant::now();
        let outcome = match self.ctx.call_timeout {
            None => call(self.matcher.as_ref()),
            Some(budget) => self.call_with_deadline(call, budget, start),
        };

        if let Some(recorder) = metrics_recorder() {
            recorder.record_comparison(self.matcher.name(), start.elapsed(), outcome.is_ok());
        }

        outcome.map_err(|err| {
            tracing::warn!(
                matcher = self.matcher.name(),
                error = %err,
                "matcher call failed; cancelling run"
            );
            self.ctx.fail(err)
        })
    }

    fn call_with_deadline<R, F>(
        &self,
        call: F,
        budget: Duration,
        start: Instant,
    ) -> Result<R, MatchError>
    where
        R: Send + 'static,
        F: FnOnce(&M) -> Result<R, MatchError> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let matcher = Arc::clone(&self.matcher);
        thread::Builder::new()
            .name("capmatch-call".into())
            .spawn(move || {
                let outcome = call(matcher.as_ref());
                if tx.send(outcome).is_err() {
                    tracing::debug!(matcher = matcher.name(), "late answer dropped");
                }
            })
            .map_err(|e| {
                MatchError::unavailable(self.matcher.name(), format!("cannot start call: {e}"))
            })?;

        match rx.recv_timeout(budget) {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => {
                let elapsed = start.elapsed();
                tracing::warn!(matcher = self.matcher.name(), ?elapsed, ?budget, "call over budget");
                Err(MatchError::Timeout {
                    matcher: self.matcher.name().to_string(),
                    elapsed,
                    budget,
                })
            }
            Err(RecvTimeoutError::Disconnected) => Err(MatchError::unavailable(
                self.matcher.name(),
                "call ended without an answer",
            )),
        }
    }

    fn verify(&self, result: &MatchResult<T>) -> Result<(), MatchError> {
        if self.types.contains(&result.match_type) {
            return Ok(());
        }
        Err(self.ctx.fail(MatchError::UndeclaredMatchType {
            matcher: self.matcher.name().to_string(),
            verdict: result.match_type.to_string(),
        }))
    }

    fn finish<R>(&self, outcome: Result<R, MatchError>) -> Result<R, MatchError> {
        match outcome {
            Ok(value) => match self.ctx.root_cause() {
                Some(err) => Err(err),
                None => Ok(value),
            },
            Err(err) => Err(self.ctx.resolve(err)),
        }
    }
}

/// Every `(origin, destination)` pair in iteration order.
pub fn cartesian(
    origins: &BTreeSet<Concept>,
    destinations: &BTreeSet<Concept>,
) -> Vec<(Concept, Concept)> {
    origins
        .iter()
        .flat_map(|o| destinations.iter().map(move |d| (o.clone(), d.clone())))
        .collect()
}

/// Regroup `pairs` into `(origins, destinations)` blocks whose Cartesian
/// products together cover exactly the distinct pairs given.
pub fn cartesian_blocks(
    pairs: &[(Concept, Concept)],
) -> Vec<(BTreeSet<Concept>, BTreeSet<Concept>)> {
    let mut rows: BTreeMap<&Concept, BTreeSet<Concept>> = BTreeMap::new();
    for (origin, destination) in pairs {
        rows.entry(origin).or_default().insert(destination.clone());
    }
    let mut blocks: BTreeMap<BTreeSet<Concept>, BTreeSet<Concept>> = BTreeMap::new();
    for (origin, destinations) in rows {
        blocks.entry(destinations).or_default().insert(origin.clone());
    }
    blocks
        .into_iter()
        .map(|(destinations, origins)| (origins, destinations))
        .collect()
}

/// Indices of `pairs` grouped by origin, groups in first-seen order.
fn origin_groups(pairs: &[(Concept, Concept)]) -> Vec<Vec<usize>> {
    let mut slot: BTreeMap<&Concept, usize> = BTreeMap::new();
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for (i, (origin, _)) in pairs.iter().enumerate() {
        let g = *slot.entry(origin).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[g].push(i);
    }
    groups
}
