//! Materialized result rows.

use std::sync::Arc;

use serde::Serialize;

use crate::types::Value;

/// One result row: values keyed by the row descriptor's data-row keys.
///
/// Rows produced from the same descriptor share one key list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DataRow {
    keys: Arc<[String]>,
    values: Vec<Value>,
}

impl DataRow {
    pub fn new(keys: Arc<[String]>, values: Vec<Value>) -> Self {
        debug_assert_eq!(keys.len(), values.len());
        Self { keys, values }
    }

    pub fn from_pairs<K: Into<String>>(pairs: impl IntoIterator<Item = (K, Value)>) -> Self {
        let (keys, values): (Vec<String>, Vec<Value>) =
            pairs.into_iter().map(|(k, v)| (k.into(), v)).unzip();
        Self {
            keys: keys.into(),
            values,
        }
    }

    /// Value stored under `key`; exact match first, then case-insensitive.
    pub fn get(&self, key: &str) -> Option<&Value> {
        let index = self
            .keys
            .iter()
            .position(|k| k == key)
            .or_else(|| self.keys.iter().position(|k| k.eq_ignore_ascii_case(key)))?;
        self.values.get(index)
    }

    pub fn value(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.keys.iter().map(String::as_str).zip(self.values.iter())
    }

    pub fn to_json(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_json()))
            .collect();
        serde_json::Value::Object(map)
    }
}

impl Serialize for DataRow {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_json().serialize(serializer)
    }
}
