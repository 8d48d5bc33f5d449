//! # capmatch Composition (`composition`)
//!
//! Forward-chaining service composition over a [`catalogue::Catalogue`].
//!
//! [`CompositionPlanner::search`] grows a set of available concepts pass by
//! pass, recording which operations became invokable in each pass as a
//! [`Layer`]. [`CompositionGraph`] turns layers (or any two operation
//! collections) into a producer → consumer dependency graph.
//!
//! ```
//! use std::collections::BTreeSet;
//! use std::sync::Arc;
//! use catalogue::{InMemoryCatalogue, Operation, Service};
//! use composition::{CompositionPlanner, PlannerConfig};
//! use matcher::{demo_utils::TableMatcher, Concept, LogicMatchType};
//!
//! let catalogue = InMemoryCatalogue::from_services([Service::new("svc").with_operation(
//!     Operation::new("op", "svc", [Concept::new("A")], [Concept::new("B")]),
//! )])
//! .unwrap();
//! let planner: CompositionPlanner = CompositionPlanner::new(
//!     Arc::new(TableMatcher::new()),
//!     Arc::new(catalogue),
//!     PlannerConfig::default(),
//! )
//! .unwrap();
//! let plan = planner
//!     .search(&BTreeSet::from([Concept::new("A")]), LogicMatchType::Exact)
//!     .unwrap();
//! assert_eq!(plan.layer_of(&"op".into()), Some(0));
//! ```
//!
//! Install a [`PlanMetrics`] recorder with [`set_plan_metrics`] to observe
//! completed runs.

mod assignment;
mod config;
mod error;
mod graph;
mod metrics;
mod planner;

pub use crate::assignment::{greedy, hopcroft_karp, maximum_matching};
pub use crate::config::{AssignmentStrategy, PlannerConfig};
pub use crate::error::PlanError;
pub use crate::graph::{CompositionGraph, ConceptEdge};
pub use crate::metrics::{set_plan_metrics, PlanMetrics};
pub use crate::planner::{
    consumes_any, is_invokable, CompositionPlan, CompositionPlanner, Layer, PlanStats,
};
