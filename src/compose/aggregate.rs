//! Folds over joined relations.

use crate::database::Document;
use serde_json::Value;

/// Length of a joined relation; 0 when absent.
pub fn count(relation: Option<&Value>) -> u64 {
    relation
        .and_then(Value::as_array)
        .map_or(0, |records| records.len() as u64)
}

/// First record of a joined relation, for to-one relations.
pub fn first(relation: Option<&Value>) -> Option<&Document> {
    relation
        .and_then(Value::as_array)
        .and_then(|records| records.first())
        .and_then(Value::as_object)
}

/// Sum of an integer field; anything else counts as 0.
pub fn sum(documents: &[Document], field: &str) -> u64 {
    documents
        .iter()
        .filter_map(|d| d.get(field).and_then(Value::as_u64))
        .sum()
}
