//! Opaque key-value metadata attached to groups.
//!
//! Metadata is stored as-is and only validated when it is used as a
//! containment filter.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CohortError;

/// A JSON object document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(Map<String, Value>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Whether this document is a superset of `filter`.
    ///
    /// Objects match key by key recursively. A filter array matches when
    /// each of its elements equals some element of the stored array. Any
    /// other value matches by equality.
    pub fn contains(&self, filter: &Metadata) -> bool {
        object_contains(&self.0, &filter.0)
    }
}

fn object_contains(doc: &Map<String, Value>, filter: &Map<String, Value>) -> bool {
    filter.iter().all(|(key, wanted)| match doc.get(key) {
        Some(found) => value_contains(found, wanted),
        None => false,
    })
}

fn value_contains(found: &Value, wanted: &Value) -> bool {
    match (found, wanted) {
        (Value::Object(doc), Value::Object(filter)) => object_contains(doc, filter),
        (Value::Array(doc), Value::Array(filter)) => filter.iter().all(|w| doc.contains(w)),
        _ => found == wanted,
    }
}

impl TryFrom<Value> for Metadata {
    type Error = CohortError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Metadata(map)),
            Value::Null => Ok(Metadata::default()),
            other => Err(CohortError::malformed(format!(
                "metadata must be an object, got {other}"
            ))),
        }
    }
}

impl From<Map<String, Value>> for Metadata {
    fn from(map: Map<String, Value>) -> Self {
        Metadata(map)
    }
}

impl From<Metadata> for Value {
    fn from(metadata: Metadata) -> Self {
        metadata.into_value()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn doc(value: Value) -> Metadata {
        Metadata::try_from(value).unwrap()
    }

    #[test]
    fn superset_matches() {
        let stored = doc(json!({
            "region": "eu",
            "rack": { "row": 3, "slot": 7 },
            "tags": ["edge", "gpu"],
        }));

        assert!(stored.contains(&doc(json!({}))));
        assert!(stored.contains(&doc(json!({ "region": "eu" }))));
        assert!(stored.contains(&doc(json!({ "rack": { "row": 3 } }))));
        assert!(stored.contains(&doc(json!({ "tags": ["gpu"] }))));
    }

    #[test]
    fn non_superset_does_not_match() {
        let stored = doc(json!({ "region": "eu", "tags": ["edge"] }));

        assert!(!stored.contains(&doc(json!({ "region": "us" }))));
        assert!(!stored.contains(&doc(json!({ "zone": "a" }))));
        assert!(!stored.contains(&doc(json!({ "tags": ["edge", "gpu"] }))));
        assert!(!stored.contains(&doc(json!({ "region": { "name": "eu" } }))));
    }

    #[test]
    fn non_object_is_rejected() {
        assert!(Metadata::try_from(json!([1, 2])).is_err());
        assert!(Metadata::try_from(json!("eu")).is_err());
        assert!(Metadata::try_from(Value::Null).unwrap().is_empty());
    }
}
