//! Metadata filters and exclusions
//!
//! A metadata filter is a JSON object mapping a metadata key to a condition:
//!
//! - a scalar: the field must equal it
//! - an array of scalars: the field must equal one of them
//! - an operator object: `$eq`, `$ne`, `$in`, `$nin`, `$exists`
//!
//! Keys resolve through [`FragmentMetadata::field`] (`source`, `chapter`,
//! `content_type`, `topic`, then any extra key). Filters are parsed once, up
//! front, so a malformed filter fails before any backend is called.

use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::core::fragment::FragmentMetadata;
use crate::error::{RagError, Result};

#[derive(Debug, Clone, PartialEq)]
enum Condition {
    Eq(Value),
    Ne(Value),
    In(Vec<Value>),
    NotIn(Vec<Value>),
    Exists(bool),
}

impl Condition {
    fn matches(&self, actual: Option<&Value>) -> bool {
        match self {
            Self::Eq(expected) => actual.is_some_and(|v| scalar_eq(v, expected)),
            Self::Ne(expected) => !actual.is_some_and(|v| scalar_eq(v, expected)),
            Self::In(options) => {
                actual.is_some_and(|v| options.iter().any(|o| scalar_eq(v, o)))
            }
            Self::NotIn(options) => {
                !actual.is_some_and(|v| options.iter().any(|o| scalar_eq(v, o)))
            }
            Self::Exists(expected) => actual.is_some() == *expected,
        }
    }
}

/// Parsed metadata filter; every clause must hold
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataFilter {
    clauses: Vec<(String, Condition)>,
}

impl MetadataFilter {
    /// Parse and validate a JSON filter.
    ///
    /// # Errors
    ///
    /// [`RagError::MalformedMetadataFilter`] when the value is not an object,
    /// uses an unknown operator, or nests non-scalar values.
    pub fn from_json(value: &Value) -> Result<Self> {
        let object = value.as_object().ok_or_else(|| {
            malformed(format!("filter must be a JSON object, got {}", kind(value)))
        })?;

        let mut clauses = Vec::with_capacity(object.len());
        for (key, condition) in object {
            if key.trim().is_empty() {
                return Err(malformed("filter keys must not be empty"));
            }
            clauses.push((key.clone(), parse_condition(key, condition)?));
        }
        Ok(Self { clauses })
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn matches(&self, metadata: &FragmentMetadata) -> bool {
        self.clauses
            .iter()
            .all(|(key, condition)| condition.matches(metadata.field(key).as_ref()))
    }
}

fn parse_condition(key: &str, value: &Value) -> Result<Condition> {
    match value {
        Value::Null => Err(malformed(format!(
            "{key}: null is not a condition, use {{\"$exists\": false}}"
        ))),
        Value::Array(items) => Ok(Condition::In(scalars(key, items)?)),
        Value::Object(ops) => parse_operator(key, ops),
        scalar => Ok(Condition::Eq(scalar.clone())),
    }
}

fn parse_operator(key: &str, ops: &Map<String, Value>) -> Result<Condition> {
    let mut iter = ops.iter();
    let (Some((op, arg)), None) = (iter.next(), iter.next()) else {
        return Err(malformed(format!(
            "{key}: operator object must have exactly one operator"
        )));
    };

    match op.as_str() {
        "$eq" => Ok(Condition::Eq(scalar(key, arg)?)),
        "$ne" => Ok(Condition::Ne(scalar(key, arg)?)),
        "$in" | "$nin" => {
            let items = arg
                .as_array()
                .ok_or_else(|| malformed(format!("{key}: {op} expects an array")))?;
            let values = scalars(key, items)?;
            Ok(if op == "$in" {
                Condition::In(values)
            } else {
                Condition::NotIn(values)
            })
        }
        "$exists" => arg
            .as_bool()
            .map(Condition::Exists)
            .ok_or_else(|| malformed(format!("{key}: $exists expects a boolean"))),
        other => Err(malformed(format!("{key}: unknown operator {other}"))),
    }
}

fn scalar(key: &str, value: &Value) -> Result<Value> {
    match value {
        Value::String(_) | Value::Number(_) | Value::Bool(_) => Ok(value.clone()),
        other => Err(malformed(format!(
            "{key}: expected a scalar, got {}",
            kind(other)
        ))),
    }
}

fn scalars(key: &str, items: &[Value]) -> Result<Vec<Value>> {
    if items.is_empty() {
        return Err(malformed(format!("{key}: value list must not be empty")));
    }
    items.iter().map(|item| scalar(key, item)).collect()
}

fn scalar_eq(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => actual == expected,
    }
}

const fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn malformed(message: impl Into<String>) -> RagError {
    RagError::MalformedMetadataFilter(message.into())
}

/// Fragment ids and sources the caller wants left out
#[derive(Debug, Clone, Default)]
pub struct Exclusions {
    ids: HashSet<String>,
    sources: HashSet<String>,
}

impl Exclusions {
    pub fn new(ids: &[String], sources: &[String]) -> Self {
        Self {
            ids: ids.iter().cloned().collect(),
            sources: sources.iter().cloned().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty() && self.sources.is_empty()
    }

    pub fn excludes(&self, fragment_id: &str, metadata: &FragmentMetadata) -> bool {
        self.ids.contains(fragment_id) || self.sources.contains(&metadata.source)
    }
}
