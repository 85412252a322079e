//! Feature sets attached to secret managers and sources.
//!
//! A feature set has two wire encodings. On create, unset features are simply
//! left out. On update, the payload must name every feature the server might
//! hold: anything no longer set is sent as an explicit `null`, because the API
//! reads an absent key as "leave unchanged".

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// An unordered set of named capabilities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureSet(BTreeMap<String, Value>);

impl FeatureSet {
    /// Creates an empty feature set.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Builds a feature set from a JSON object. Null entries count as unset.
    #[must_use]
    pub fn from_map(map: &Map<String, Value>) -> Self {
        Self(
            map.iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// Adds a feature with the given value.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.insert(name, value);
        self
    }

    /// Adds a boolean feature switched on.
    #[must_use]
    pub fn enable(self, name: impl Into<String>) -> Self {
        self.with(name, Value::Bool(true))
    }

    /// Sets a feature. Setting `null` removes it.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        if value.is_null() {
            self.0.remove(&name);
        } else {
            self.0.insert(name, value);
        }
    }

    /// Removes a feature.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.0.remove(name)
    }

    /// Gets a feature value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Returns true if the feature is set.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Returns true if no feature is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of features set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterates over the names of the set features.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Encodes for create: only set features appear.
    #[must_use]
    pub fn to_omit_empty(&self) -> Value {
        Value::Object(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// Encodes for update: every name in `universe` that is not set is sent as `null`.
    #[must_use]
    pub fn to_explicit_null<'a>(&self, universe: impl IntoIterator<Item = &'a str>) -> Value {
        let mut map: Map<String, Value> = universe
            .into_iter()
            .map(|name| (name.to_string(), Value::Null))
            .collect();
        for (k, v) in &self.0 {
            map.insert(k.clone(), v.clone());
        }
        Value::Object(map)
    }

    /// Encodes for update against the previously observed set: features that
    /// were set before (or are known to the kind) and are now absent become `null`.
    #[must_use]
    pub fn to_explicit_null_against(&self, previous: &Self, known: &[&str]) -> Value {
        self.to_explicit_null(previous.names().chain(known.iter().copied()))
    }

    /// Compares two sets under the explicit-null encoding over the union of
    /// their names and the kind's known features.
    #[must_use]
    pub fn equivalent(&self, other: &Self, known: &[&str]) -> bool {
        let universe: BTreeSet<&str> = self
            .names()
            .chain(other.names())
            .chain(known.iter().copied())
            .collect();

        self.to_explicit_null(universe.iter().copied())
            == other.to_explicit_null(universe.iter().copied())
    }

    /// Applies an explicit-null update payload: nulls clear, values set.
    pub fn apply_update(&mut self, payload: &Map<String, Value>) {
        for (name, value) in payload {
            self.insert(name.clone(), value.clone());
        }
    }
}
