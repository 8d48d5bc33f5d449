//! # capmatch Discovery (`discovery`)
//!
//! Ranks candidate resources from their match records. A
//! [`DiscoveryPipeline`] runs every [`MatchFilter`] first, so a rejected
//! candidate is never scored; survivors are scored by each [`Scorer`] and
//! the contributions reduced by one [`Composer`] into a rank.
//!
//! ```
//! use std::collections::BTreeMap;
//! use discovery::{DiscoveryPipeline, MatchScoreScorer, TypeRangeFilter};
//! use matcher::{LogicMatchType, MatchResult};
//!
//! let mut candidates = BTreeMap::new();
//! for (id, verdict, score) in [
//!     ("op:a", LogicMatchType::Plugin, 0.75),
//!     ("op:b", LogicMatchType::Fail, 0.0),
//! ] {
//!     let record = MatchResult::new("req".into(), "cap".into(), verdict, score, "doc");
//!     candidates.insert(id.into(), record.into());
//! }
//!
//! let results = DiscoveryPipeline::default()
//!     .with_filter(TypeRangeFilter::new(LogicMatchType::types().at_least(LogicMatchType::Subsume)))
//!     .with_scorer(MatchScoreScorer)
//!     .discover(candidates);
//! assert_eq!(results.len(), 1);
//! assert_eq!(results.ranked()[0].resource.as_str(), "op:a");
//! ```
//!
//! [`OperationDiscoverer`] builds candidates straight from a catalogue.

mod config;
mod error;
mod functional;
mod pipeline;
mod stages;

pub use crate::config::DiscoveryConfig;
pub use crate::error::DiscoveryError;
pub use crate::functional::{DiscoveryMode, OperationDiscoverer};
pub use crate::pipeline::{discover, DiscoveryPipeline, DiscoveryResult, DiscoveryResults};
pub use crate::stages::{
    filter_fn, scorer_fn, Composer, FilterFn, MatchFilter, MatchScoreScorer, MaxComposer,
    MinScoreFilter, NamespaceFilter, NeutralComposer, Scorer, ScorerFn, SumComposer,
    TypeRangeFilter, TypeRankScorer, WeightedComposer,
};
