//! SQL template directives.
//!
//! A template is SQL text with embedded directives, expanded against named parameters:
//!
//! | Directive | Output |
//! |---|---|
//! | `$name` | the parameter rendered inline |
//! | `#bind($name)`, `#bind($name 'TYPE')`, `#bind($name 'TYPE' scale)` | `?`, or `?,?,..` for a list |
//! | `#bindEqual($name)` | `= ?`, or `IS NULL` for a null value |
//! | `#bindNotEqual($name)` | `<> ?`, or `IS NOT NULL` for a null value |
//! | `#result('column' 'type' 'alias')` | `column AS alias`, declaring a result column |

mod processor;

pub use processor::{variable_names, TemplateProcessor};

use std::collections::BTreeMap;

use serde::Serialize;

use crate::types::Value;

/// Value of a template parameter
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TemplateValue {
    Scalar(Value),
    /// Expanded to one placeholder per element by `#bind`
    List(Vec<Value>),
}

impl TemplateValue {
    pub fn scalar(value: impl Into<Value>) -> Self {
        TemplateValue::Scalar(value.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, TemplateValue::Scalar(Value::Null))
    }

    /// JSON arrays become lists, everything else a scalar.
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Array(items) => {
                TemplateValue::List(items.iter().map(Value::from_json).collect())
            }
            other => TemplateValue::Scalar(Value::from_json(other)),
        }
    }
}

impl From<Value> for TemplateValue {
    fn from(value: Value) -> Self {
        TemplateValue::Scalar(value)
    }
}

impl From<Vec<Value>> for TemplateValue {
    fn from(values: Vec<Value>) -> Self {
        TemplateValue::List(values)
    }
}

/// Named parameters of one template execution
pub type TemplateParameters = BTreeMap<String, TemplateValue>;
