//! Deterministic in-process matcher over an explicit concept hierarchy.
//!
//! Stands in for a remote reasoner in tests, benches and the CLI. Verdicts,
//! with `origin` the offered concept and `destination` the requested one:
//! - `Exact` when the concepts are equal or declared equivalent;
//! - `Plugin` when `origin` is a (transitive) sub-concept of `destination`;
//! - `Subsume` when `origin` is a (transitive) super-concept of `destination`;
//! - `Fail` otherwise.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::concept::Concept;
use crate::error::MatchError;
use crate::lattice::{LogicMatchType, MatchTypes};
use crate::matcher::Matcher;
use crate::result::MatchResult;

/// One concept and its declared relations, as read from a catalogue file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptDefinition {
    pub id: Concept,
    #[serde(default)]
    pub parents: Vec<Concept>,
    #[serde(default)]
    pub equivalents: Vec<Concept>,
}

#[derive(Debug, Clone)]
pub struct HierarchyMatcher {
    name: String,
    parents: BTreeMap<Concept, BTreeSet<Concept>>,
    equivalents: BTreeMap<Concept, BTreeSet<Concept>>,
}

impl Default for HierarchyMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl HierarchyMatcher {
    pub const NAME: &'static str = "hierarchy";

    pub fn new() -> Self {
        Self {
            name: Self::NAME.to_string(),
            parents: BTreeMap::new(),
            equivalents: BTreeMap::new(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn from_definitions<'a>(defs: impl IntoIterator<Item = &'a ConceptDefinition>) -> Self {
        let mut matcher = Self::new();
        for def in defs {
            for parent in &def.parents {
                matcher.add_subconcept(def.id.clone(), parent.clone());
            }
            for eq in &def.equivalents {
                matcher.add_equivalence(def.id.clone(), eq.clone());
            }
        }
        matcher
    }

    /// Declare `child` a direct sub-concept of `parent`.
    pub fn add_subconcept(&mut self, child: impl Into<Concept>, parent: impl Into<Concept>) {
        self.parents
            .entry(child.into())
            .or_default()
            .insert(parent.into());
    }

    pub fn with_subconcept(mut self, child: impl Into<Concept>, parent: impl Into<Concept>) -> Self {
        self.add_subconcept(child, parent);
        self
    }

    /// Declare two concepts equivalent (symmetric).
    pub fn add_equivalence(&mut self, a: impl Into<Concept>, b: impl Into<Concept>) {
        let (a, b) = (a.into(), b.into());
        self.equivalents.entry(a.clone()).or_default().insert(b.clone());
        self.equivalents.entry(b).or_default().insert(a);
    }

    pub fn with_equivalence(mut self, a: impl Into<Concept>, b: impl Into<Concept>) -> Self {
        self.add_equivalence(a, b);
        self
    }

    /// `concept` plus everything transitively declared equivalent to it.
    fn equivalence_class(&self, concept: &Concept) -> BTreeSet<Concept> {
        let mut class = BTreeSet::from([concept.clone()]);
        let mut queue = VecDeque::from([concept.clone()]);
        while let Some(c) = queue.pop_front() {
            for eq in self.equivalents.get(&c).into_iter().flatten() {
                if class.insert(eq.clone()) {
                    queue.push_back(eq.clone());
                }
            }
        }
        class
    }

    /// Strict ancestors of `concept`, closed under equivalence.
    fn ancestors(&self, concept: &Concept) -> BTreeSet<Concept> {
        let own = self.equivalence_class(concept);
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<Concept> = own.iter().cloned().collect();
        while let Some(c) = queue.pop_front() {
            for parent in self.parents.get(&c).into_iter().flatten() {
                for p in self.equivalence_class(parent) {
                    if seen.insert(p.clone()) {
                        queue.push_back(p);
                    }
                }
            }
        }
        seen.retain(|c| !own.contains(c));
        seen
    }

    /// Every concept mentioned by the hierarchy.
    pub fn concepts(&self) -> BTreeSet<Concept> {
        let mut all = BTreeSet::new();
        for (child, parents) in &self.parents {
            all.insert(child.clone());
            all.extend(parents.iter().cloned());
        }
        for (a, eqs) in &self.equivalents {
            all.insert(a.clone());
            all.extend(eqs.iter().cloned());
        }
        all
    }

    fn classify(&self, origin: &Concept, destination: &Concept) -> (LogicMatchType, String) {
        if origin == destination {
            return (LogicMatchType::Exact, format!("{origin} is {destination}"));
        }
        if self.equivalence_class(origin).contains(destination) {
            return (
                LogicMatchType::Exact,
                format!("{origin} is equivalent to {destination}"),
            );
        }
        if self.ancestors(origin).contains(destination) {
            return (
                LogicMatchType::Plugin,
                format!("{origin} is a sub-concept of {destination}"),
            );
        }
        if self.ancestors(destination).contains(origin) {
            return (
                LogicMatchType::Subsume,
                format!("{origin} is a super-concept of {destination}"),
            );
        }
        (
            LogicMatchType::Fail,
            format!("{origin} and {destination} are unrelated"),
        )
    }
}

impl Matcher for HierarchyMatcher {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "subsumption over an explicit concept hierarchy"
    }

    fn match_types(&self) -> MatchTypes<LogicMatchType> {
        LogicMatchType::types()
    }

    fn match_concepts(
        &self,
        origin: &Concept,
        destination: &Concept,
    ) -> Result<MatchResult<LogicMatchType>, MatchError> {
        let (verdict, why) = self.classify(origin, destination);
        Ok(MatchResult::new(
            origin.clone(),
            destination.clone(),
            verdict,
            verdict.default_score(),
            self.name.clone(),
        )
        .with_explanation(why))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use LogicMatchType::*;

    fn verdict(m: &HierarchyMatcher, a: &str, b: &str) -> LogicMatchType {
        m.match_concepts(&a.into(), &b.into()).unwrap().match_type
    }

    #[test]
    fn classifies_subsumption_both_ways() {
        let m = HierarchyMatcher::new()
            .with_subconcept("SportsCar", "Car")
            .with_subconcept("Car", "Vehicle");
        assert_eq!(verdict(&m, "Car", "Car"), Exact);
        assert_eq!(verdict(&m, "SportsCar", "Vehicle"), Plugin);
        assert_eq!(verdict(&m, "Vehicle", "SportsCar"), Subsume);
        assert_eq!(verdict(&m, "Car", "Boat"), Fail);
    }

    #[test]
    fn equivalence_is_exact_and_inherits_parents() {
        let m = HierarchyMatcher::new()
            .with_equivalence("Auto", "Car")
            .with_subconcept("Car", "Vehicle");
        assert_eq!(verdict(&m, "Auto", "Car"), Exact);
        assert_eq!(verdict(&m, "Car", "Auto"), Exact);
        assert_eq!(verdict(&m, "Auto", "Vehicle"), Plugin);
    }

    #[test]
    fn cycles_in_declarations_terminate() {
        let m = HierarchyMatcher::new()
            .with_subconcept("A", "B")
            .with_subconcept("B", "A");
        // Mutual sub-concepts are neither strictly above nor below each other
        // once the cycle is closed; the call must simply return.
        let _ = verdict(&m, "A", "B");
    }

    #[test]
    fn definitions_build_the_same_hierarchy() {
        let defs = vec![
            ConceptDefinition {
                id: "Car".into(),
                parents: vec!["Vehicle".into()],
                equivalents: vec!["Auto".into()],
            },
        ];
        let m = HierarchyMatcher::from_definitions(&defs);
        assert_eq!(verdict(&m, "Auto", "Vehicle"), Plugin);
        assert_eq!(m.concepts().len(), 3);
    }

    #[test]
    fn scores_follow_verdicts() {
        let m = HierarchyMatcher::new().with_subconcept("Car", "Vehicle");
        let r = m.match_concepts(&"Car".into(), &"Vehicle".into()).unwrap();
        assert_eq!(r.score, Plugin.default_score());
        assert_eq!(r.produced_by, "hierarchy");
        assert!(r.explanation.contains("sub-concept"));
    }
}
