//! Predicates, sort descriptors and fetch requests.
//!
//! Predicates and sort keys are evaluated against an entity's attribute
//! payload, the JSON form of its serialized fields.

use crate::EntityName;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

/// A filter over attribute payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Predicate {
    /// `key == value`. A missing attribute compares as `null`.
    Equals { key: String, value: Value },
    /// All inner predicates hold. An empty conjunction matches everything.
    And { predicates: Vec<Predicate> },
}

impl Predicate {
    /// Equality predicate on one attribute.
    pub fn equals(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::Equals {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Conjunction of predicates.
    pub fn and(predicates: impl IntoIterator<Item = Predicate>) -> Self {
        Predicate::And {
            predicates: predicates.into_iter().collect(),
        }
    }

    /// Attribute names this predicate reads.
    pub fn keys(&self) -> Vec<&str> {
        match self {
            Predicate::Equals { key, .. } => vec![key.as_str()],
            Predicate::And { predicates } => predicates.iter().flat_map(|p| p.keys()).collect(),
        }
    }

    /// Evaluate against an attribute payload.
    pub fn evaluate(&self, payload: &Value) -> bool {
        match self {
            Predicate::Equals { key, value } => payload.get(key).unwrap_or(&Value::Null) == value,
            Predicate::And { predicates } => predicates.iter().all(|p| p.evaluate(payload)),
        }
    }
}

/// Sort on one attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortDescriptor {
    pub key: String,
    pub ascending: bool,
}

impl SortDescriptor {
    pub fn new(key: impl Into<String>, ascending: bool) -> Self {
        Self {
            key: key.into(),
            ascending,
        }
    }

    /// Build descriptors from a comma-separated list of attribute names that
    /// share one direction, e.g. `"lastName,firstName"`.
    pub fn parse_list(terms: &str, ascending: bool) -> Vec<SortDescriptor> {
        terms
            .split(',')
            .map(str::trim)
            .filter(|term| !term.is_empty())
            .map(|term| SortDescriptor::new(term, ascending))
            .collect()
    }

    /// Compare two payloads on this descriptor's key.
    pub fn compare(&self, a: &Value, b: &Value) -> Ordering {
        let ordering = compare_values(
            a.get(&self.key).unwrap_or(&Value::Null),
            b.get(&self.key).unwrap_or(&Value::Null),
        );
        if self.ascending {
            ordering
        } else {
            ordering.reverse()
        }
    }
}

/// Compare two payloads on a list of descriptors, first difference wins.
pub fn compare_by(descriptors: &[SortDescriptor], a: &Value, b: &Value) -> Ordering {
    descriptors
        .iter()
        .map(|d| d.compare(a, b))
        .find(|o| *o != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

// null < bool < number < string < array/object
fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) | Value::Object(_) => 4,
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .unwrap_or(Ordering::Equal),
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(_), _) | (Value::Object(_), _)
            if type_rank(a) == type_rank(b) =>
        {
            a.to_string().cmp(&b.to_string())
        }
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// A fetch against one entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchRequest {
    pub entity: EntityName,
    pub predicate: Option<Predicate>,
    pub sort: Vec<SortDescriptor>,
}

impl FetchRequest {
    /// Fetch every entity of the named type, in store order.
    pub fn new(entity: impl Into<EntityName>) -> Self {
        Self {
            entity: entity.into(),
            predicate: None,
            sort: Vec::new(),
        }
    }

    pub fn with_predicate(mut self, predicate: Option<Predicate>) -> Self {
        self.predicate = predicate;
        self
    }

    pub fn with_sort(mut self, sort: Vec<SortDescriptor>) -> Self {
        self.sort = sort;
        self
    }

    /// Every attribute name the request reads.
    pub fn referenced_keys(&self) -> Vec<&str> {
        let mut keys = self.predicate.as_ref().map(Predicate::keys).unwrap_or_default();
        keys.extend(self.sort.iter().map(|d| d.key.as_str()));
        keys
    }

    /// Whether a payload passes the request's predicate.
    pub fn matches(&self, payload: &Value) -> bool {
        self.predicate
            .as_ref()
            .map_or(true, |predicate| predicate.evaluate(payload))
    }
}
