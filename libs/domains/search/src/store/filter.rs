use mongodb::bson::{Bson, Document, doc};
use serde_json::Value;
use std::cmp::Ordering;

/// Scalar operand of a [`Filter`]
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::String(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        FilterValue::String(value)
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        FilterValue::Int(value)
    }
}

impl From<f64> for FilterValue {
    fn from(value: f64) -> Self {
        FilterValue::Float(value)
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        FilterValue::Bool(value)
    }
}

impl FilterValue {
    fn to_bson(&self) -> Bson {
        match self {
            FilterValue::String(s) => Bson::String(s.clone()),
            FilterValue::Int(i) => Bson::Int64(*i),
            FilterValue::Float(f) => Bson::Double(*f),
            FilterValue::Bool(b) => Bson::Boolean(*b),
        }
    }

    /// Ordering of `other` relative to this operand; `None` when the types differ
    fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (FilterValue::String(a), Value::String(b)) => Some(b.as_str().cmp(a.as_str())),
            (FilterValue::Bool(a), Value::Bool(b)) => Some(b.cmp(a)),
            (FilterValue::Int(a), Value::Number(n)) => n.as_f64()?.partial_cmp(&(*a as f64)),
            (FilterValue::Float(a), Value::Number(n)) => n.as_f64()?.partial_cmp(a),
            _ => None,
        }
    }

    fn equals(&self, other: &Value) -> bool {
        self.compare(other) == Some(Ordering::Equal)
    }
}

/// Query primitive understood by every document store.
///
/// Only these four shapes exist; free-form query strings never reach the store.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq {
        field: String,
        value: FilterValue,
    },
    /// Inclusive on both ends; an absent bound is open
    Range {
        field: String,
        min: Option<FilterValue>,
        max: Option<FilterValue>,
    },
    In {
        field: String,
        values: Vec<FilterValue>,
    },
    /// Field present and not null
    Exists { field: String },
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Filter::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn range(
        field: impl Into<String>,
        min: Option<FilterValue>,
        max: Option<FilterValue>,
    ) -> Self {
        Filter::Range {
            field: field.into(),
            min,
            max,
        }
    }

    pub fn is_in(field: impl Into<String>, values: Vec<FilterValue>) -> Self {
        Filter::In {
            field: field.into(),
            values,
        }
    }

    pub fn exists(field: impl Into<String>) -> Self {
        Filter::Exists {
            field: field.into(),
        }
    }

    /// Evaluate against a JSON document (top-level fields)
    pub fn matches(&self, data: &Value) -> bool {
        match self {
            Filter::Eq { field, value } => data.get(field).is_some_and(|v| value.equals(v)),
            Filter::Range { field, min, max } => {
                let Some(v) = data.get(field) else {
                    return false;
                };
                let above_min = min.as_ref().is_none_or(|min| {
                    matches!(min.compare(v), Some(Ordering::Greater | Ordering::Equal))
                });
                let below_max = max.as_ref().is_none_or(|max| {
                    matches!(max.compare(v), Some(Ordering::Less | Ordering::Equal))
                });
                above_min && below_max
            }
            Filter::In { field, values } => data
                .get(field)
                .is_some_and(|v| values.iter().any(|candidate| candidate.equals(v))),
            Filter::Exists { field } => data.get(field).is_some_and(|v| !v.is_null()),
        }
    }

    /// Translate into a MongoDB query clause
    pub fn to_document(&self) -> Document {
        match self {
            Filter::Eq { field, value } => doc! { field.as_str(): value.to_bson() },
            Filter::Range { field, min, max } => {
                let mut bounds = Document::new();
                if let Some(min) = min {
                    bounds.insert("$gte", min.to_bson());
                }
                if let Some(max) = max {
                    bounds.insert("$lte", max.to_bson());
                }
                doc! { field.as_str(): bounds }
            }
            Filter::In { field, values } => {
                let values: Vec<Bson> = values.iter().map(FilterValue::to_bson).collect();
                doc! { field.as_str(): { "$in": values } }
            }
            Filter::Exists { field } => doc! { field.as_str(): { "$exists": true, "$ne": Bson::Null } },
        }
    }
}

/// Conjunction of filters as one MongoDB query document
pub fn to_query(filters: &[Filter]) -> Document {
    match filters {
        [] => Document::new(),
        [single] => single.to_document(),
        many => doc! { "$and": many.iter().map(Filter::to_document).collect::<Vec<_>>() },
    }
}
