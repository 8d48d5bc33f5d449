//! # capmatch Matcher (`matcher`)
//!
//! ## Purpose
//!
//! `matcher` is the bottom layer of capmatch. It defines what it means for one
//! semantic concept to match another, and the queries every other layer asks
//! of a matcher. Discovery and composition never compare concepts themselves;
//! they go through the [`Matcher`] trait and the [`MatchExecutor`].
//!
//! ## Core Types
//!
//! - [`Concept`]: opaque, cheaply cloneable concept identifier (usually a URI).
//! - [`MatchTypes`] / [`MatchType`]: a totally ordered set of verdicts plus
//!   range predicates ([`TypeRange`]) over it. [`LogicMatchType`] is the stock
//!   `Fail < Subsume < Plugin < Exact` lattice.
//! - [`MatchResult`], [`CompositeMatchResult`], [`MatchRecord`]: one
//!   comparison, an aggregate of comparisons, and either of the two.
//! - [`Matcher`]: the comparison contract. Only `match_concepts` is required;
//!   Cartesian, range and batch queries have default implementations.
//! - [`MatchExecutor`]: runs comparisons sequentially or on a rayon pool under
//!   a [`RunContext`] (cancellation, per-call budget, first-failure tracking).
//! - [`MatcherRegistry`]: name → lazily-built matcher instance.
//! - [`HierarchyMatcher`]: deterministic in-process matcher over an explicit
//!   sub-concept / equivalence hierarchy.
//!
//! ## Example Usage
//!
//! ```
//! use std::collections::BTreeSet;
//! use matcher::{HierarchyMatcher, LogicMatchType, Matcher};
//!
//! let m = HierarchyMatcher::new()
//!     .with_subconcept("ex:Car", "ex:Vehicle");
//! let candidates: BTreeSet<_> = ["ex:Vehicle", "ex:Price"].into_iter().map(Into::into).collect();
//! let hits = m
//!     .list_matches_at_least_of_type(&"ex:Car".into(), &candidates, LogicMatchType::Plugin)
//!     .unwrap();
//! assert_eq!(hits.len(), 1);
//! ```
//!
//! ## Observability
//!
//! Every matcher call issued through a [`MatchExecutor`] emits a `tracing`
//! event and, when a [`MatchMetrics`] recorder is installed with
//! [`set_match_metrics`], a latency sample.

pub mod concept;
pub mod error;
pub mod executor;
pub mod hierarchy;
pub mod lattice;
pub mod matcher;
pub mod metrics;
pub mod registry;
pub mod result;

#[doc(hidden)]
pub mod demo_utils;

pub use crate::concept::Concept;
pub use crate::error::MatchError;
pub use crate::executor::{
    cartesian, cartesian_blocks, CancellationToken, ExecutorConfig, MatchExecutor, RunContext,
};
pub use crate::hierarchy::{ConceptDefinition, HierarchyMatcher};
pub use crate::lattice::{BoundType, LogicMatchType, MatchType, MatchTypes, TypeRange};
pub use crate::matcher::{MatchTable, Matcher, MatcherInfo};
pub use crate::metrics::{set_match_metrics, MatchMetrics};
pub use crate::registry::{MatcherFactory, MatcherRegistry};
pub use crate::result::{CompositeMatchResult, MatchRecord, MatchResult, ScoreAggregation};
