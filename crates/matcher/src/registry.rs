//! Explicit name → factory table for matcher implementations.
//!
//! Entries are registered at process start. Each instance is built on first
//! lookup and reused afterwards; a failing factory is not cached, so a later
//! lookup retries construction.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::error::MatchError;
use crate::lattice::{LogicMatchType, MatchType};
use crate::matcher::{Matcher, MatcherInfo};

/// Builds a matcher instance on demand.
pub type MatcherFactory<T> =
    Box<dyn Fn() -> Result<Arc<dyn Matcher<T>>, MatchError> + Send + Sync>;

const DEFAULT_KEY: &str = "<default>";

struct Slot<T: MatchType> {
    name: String,
    factory: MatcherFactory<T>,
    instance: OnceCell<Arc<dyn Matcher<T>>>,
}

/// Lazily-constructed matchers addressed by name, plus a default.
pub struct MatcherRegistry<T: MatchType = LogicMatchType> {
    slots: Vec<Slot<T>>,
    index: HashMap<String, usize>,
    default: Option<String>,
}

impl<T: MatchType> Default for MatcherRegistry<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            index: HashMap::new(),
            default: None,
        }
    }
}

impl<T: MatchType> MatcherRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `name`. Re-registering a name replaces the
    /// previous factory and drops any instance it had built.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Result<Arc<dyn Matcher<T>>, MatchError> + Send + Sync + 'static,
    {
        let name = name.into();
        self.insert(Slot {
            name,
            factory: Box::new(factory),
            instance: OnceCell::new(),
        });
    }

    /// Register an already constructed matcher.
    pub fn register_instance(&mut self, name: impl Into<String>, matcher: Arc<dyn Matcher<T>>) {
        let shared = matcher.clone();
        self.insert(Slot {
            name: name.into(),
            factory: Box::new(move || Ok(shared.clone())),
            instance: OnceCell::with_value(matcher),
        });
    }

    fn insert(&mut self, slot: Slot<T>) {
        match self.index.get(&slot.name) {
            Some(&idx) => {
                tracing::warn!(matcher = %slot.name, "replacing registered matcher");
                self.slots[idx] = slot;
            }
            None => {
                self.index.insert(slot.name.clone(), self.slots.len());
                self.slots.push(slot);
            }
        }
    }

    /// Make `name` the default. Fails if nothing is registered under it.
    pub fn set_default(&mut self, name: impl Into<String>) -> Result<(), MatchError> {
        let name = name.into();
        if !self.index.contains_key(&name) {
            return Err(MatchError::UnknownMatcher(name));
        }
        self.default = Some(name);
        Ok(())
    }

    /// The configured default name, or the first registered one.
    pub fn default_name(&self) -> Option<&str> {
        self.default
            .as_deref()
            .or_else(|| self.slots.first().map(|s| s.name.as_str()))
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Matcher<T>>, MatchError> {
        let idx = self
            .index
            .get(name)
            .copied()
            .ok_or_else(|| MatchError::UnknownMatcher(name.to_string()))?;
        let slot = &self.slots[idx];
        let matcher = slot.instance.get_or_try_init(|| {
            tracing::debug!(matcher = %slot.name, "constructing matcher");
            (slot.factory)()
        })?;
        Ok(matcher.clone())
    }

    pub fn get_default(&self) -> Result<Arc<dyn Matcher<T>>, MatchError> {
        let name = self
            .default_name()
            .ok_or_else(|| MatchError::UnknownMatcher(DEFAULT_KEY.to_string()))?;
        self.get(name)
    }

    /// Registered names in registration order.
    pub fn list_available(&self) -> Vec<&str> {
        self.slots.iter().map(|s| s.name.as_str()).collect()
    }

    /// Whether the named matcher has been constructed yet.
    pub fn is_instantiated(&self, name: &str) -> bool {
        self.index
            .get(name)
            .is_some_and(|&idx| self.slots[idx].instance.get().is_some())
    }

    /// Describe every registered matcher, constructing them if needed.
    pub fn describe(&self) -> Result<Vec<MatcherInfo>, MatchError> {
        self.slots
            .iter()
            .map(|s| self.get(&s.name).map(|m| m.info()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
