//! Searchable text extraction.
//!
//! Each collection maps to an ordered list of attribute paths whose values are
//! concatenated into the text that gets embedded. Paths use dots to reach into
//! nested objects (`client.name`). Collections without an entry fall back to
//! every top-level string field that is not owned by the indexer.

use serde_json::Value;
use std::collections::HashMap;

use crate::models::RESERVED_FIELDS;

/// Collections searched by `search_all` when the caller names none
pub const DEFAULT_SEARCH_COLLECTIONS: [&str; 6] = [
    "projects",
    "tasks",
    "clients",
    "employees",
    "invoices",
    "documents",
];

/// Top-level bookkeeping fields never worth embedding
const SYSTEM_FIELDS: [&str; 6] = ["_id", "id", "createdAt", "updatedAt", "createdBy", "updatedBy"];

/// Collection → attribute paths registry
#[derive(Debug, Clone, Default)]
pub struct TextExtractor {
    fields: HashMap<String, Vec<String>>,
}

impl TextExtractor {
    /// Registry with no entries; every collection uses the fallback
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry preloaded with the business collections
    pub fn with_defaults() -> Self {
        Self::empty()
            .register("projects", &["name", "description", "client.name", "address", "status", "tags"])
            .register("tasks", &["title", "description", "projectName", "assigneeName", "status"])
            .register("clients", &["name", "companyName", "email", "phone", "address", "notes"])
            .register("employees", &["firstName", "lastName", "role", "department", "email", "skills"])
            .register("invoices", &["invoiceNumber", "clientName", "description", "lineItems", "notes"])
            .register("documents", &["title", "fileName", "category", "description", "content"])
    }

    /// Add or replace the paths for one collection
    pub fn register(mut self, collection: &str, paths: &[&str]) -> Self {
        self.fields.insert(
            collection.to_string(),
            paths.iter().map(|p| p.to_string()).collect(),
        );
        self
    }

    pub fn is_registered(&self, collection: &str) -> bool {
        self.fields.contains_key(collection)
    }

    /// Text to embed for `data`; empty when nothing searchable is present
    pub fn extract(&self, collection: &str, data: &Value) -> String {
        let parts: Vec<String> = match self.fields.get(collection) {
            Some(paths) => paths
                .iter()
                .filter_map(|path| lookup(data, path))
                .filter_map(flatten)
                .collect(),
            None => fallback(data),
        };

        parts
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn lookup<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(data, |current, segment| current.get(segment))
}

/// Scalars stringified, arrays of scalars joined, objects and nulls ignored
fn flatten(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(items) => {
            let joined: Vec<String> = items
                .iter()
                .filter(|item| !item.is_array())
                .filter_map(flatten)
                .collect();
            (!joined.is_empty()).then(|| joined.join(" "))
        }
        Value::Null | Value::Object(_) => None,
    }
}

fn fallback(data: &Value) -> Vec<String> {
    let Some(object) = data.as_object() else {
        return vec![];
    };
    object
        .iter()
        .filter(|(key, _)| {
            !RESERVED_FIELDS.contains(&key.as_str()) && !SYSTEM_FIELDS.contains(&key.as_str())
        })
        .filter_map(|(_, value)| value.as_str().map(str::to_string))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_registered_paths_in_order() {
        let extractor = TextExtractor::with_defaults();
        let project = json!({
            "status": "active",
            "name": "Roof repair",
            "description": "Replace shingles",
            "client": { "name": "ACME" },
            "tags": ["urgent", "roofing"],
            "organizationId": "org-1"
        });
        assert_eq!(
            extractor.extract("projects", &project),
            "Roof repair Replace shingles ACME active urgent roofing"
        );
    }

    #[test]
    fn test_numbers_stringified_and_missing_skipped() {
        let extractor = TextExtractor::empty().register("invoices", &["invoiceNumber", "total", "paid"]);
        let invoice = json!({ "invoiceNumber": "INV-7", "total": 1250.5, "paid": false });
        assert_eq!(extractor.extract("invoices", &invoice), "INV-7 1250.5 false");
        assert_eq!(extractor.extract("invoices", &json!({})), "");
    }

    #[test]
    fn test_fallback_uses_top_level_strings() {
        let extractor = TextExtractor::with_defaults();
        let doc = json!({
            "id": "x-1",
            "label": "Gutter cleaning",
            "count": 3,
            "embeddingText": "stale",
            "organizationId": "org-1"
        });
        assert!(!extractor.is_registered("services"));
        assert_eq!(extractor.extract("services", &doc), "Gutter cleaning");
    }

    #[test]
    fn test_blank_values_produce_empty_text() {
        let extractor = TextExtractor::with_defaults();
        let doc = json!({ "name": "   ", "description": null });
        assert_eq!(extractor.extract("projects", &doc), "");
    }

    #[test]
    fn test_default_collections_are_registered() {
        let extractor = TextExtractor::with_defaults();
        for collection in DEFAULT_SEARCH_COLLECTIONS {
            assert!(extractor.is_registered(collection), "{collection}");
        }
    }
}
