//! The keyed application-state tree.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// An immutable tree of named slices.
///
/// Each slice is an `Arc<Value>` owned by exactly one slice reducer. Slices
/// are shared between successive states, so "did this slice change" is a
/// pointer comparison ([`Arc::ptr_eq`]) rather than a deep compare.
///
/// Serializes as a plain JSON object:
///
/// ```
/// use cartfold::State;
/// use serde_json::json;
///
/// let state = State::from_json(json!({"cart": {"entries": {}, "write": {}}})).unwrap();
/// assert_eq!(state.slice("cart").unwrap()["entries"], json!({}));
/// assert_eq!(state.to_json(), json!({"cart": {"entries": {}, "write": {}}}));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct State {
    slices: BTreeMap<String, Arc<Value>>,
}

impl State {
    pub fn new() -> Self {
        State::default()
    }

    /// Build a state from a JSON object, one slice per top-level key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotAnObject`] for any other JSON value.
    pub fn from_json(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(map.into_iter().collect()),
            other => Err(Error::NotAnObject {
                what: "preloaded state",
                found: json_kind(&other),
            }),
        }
    }

    /// Return a copy of this state with `key` set to `value`.
    pub fn with_slice(mut self, key: impl Into<String>, value: Value) -> Self {
        self.slices.insert(key.into(), Arc::new(value));
        self
    }

    pub fn slice(&self, key: &str) -> Option<&Arc<Value>> {
        self.slices.get(key)
    }

    /// Deserialize a slice into a typed view.
    ///
    /// A missing slice deserializes from `null`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Shape`] if the slice does not fit `T`.
    pub fn slice_as<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let value = self.slices.get(key).map_or(&Value::Null, |v| v.as_ref());
        T::deserialize(value).map_err(|source| Error::Shape {
            slice: key.to_string(),
            source,
        })
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.slices.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.slices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    /// The whole tree as one JSON object.
    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .slices
            .iter()
            .map(|(k, v)| (k.clone(), v.as_ref().clone()))
            .collect();
        Value::Object(map)
    }

    pub(crate) fn insert(&mut self, key: &str, value: Arc<Value>) {
        self.slices.insert(key.to_string(), value);
    }
}

/// Article and name of a JSON value's type, for error messages.
pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

impl FromIterator<(String, Value)> for State {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        State {
            slices: iter.into_iter().map(|(k, v)| (k, Arc::new(v))).collect(),
        }
    }
}
