//! Attaches foreign records to base documents.

use super::{apply_stages, Stage, Viewer};
use crate::database::{Collection, Document, Filter, Key, Store};
use crate::error::Result;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Attach to each base document, under `as_field`, the records of `from`
/// whose `foreign_field` equals the base document's `local_field`.
#[derive(Clone, Debug, PartialEq)]
pub struct JoinSpec {
    pub from: Collection,
    pub local_field: &'static str,
    pub foreign_field: &'static str,
    pub as_field: &'static str,
}

fn values(field: Option<&Value>) -> Vec<&Value> {
    match field {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(value) => vec![value],
    }
}

/// Runs one join level for the whole batch. `children` are applied once to
/// the fetched foreign records. Never adds or drops base documents.
pub fn resolve(
    store: &Store,
    documents: &mut [Document],
    spec: &JoinSpec,
    children: &[Stage],
    viewer: Viewer,
) -> Result<()> {
    let mut seen = HashSet::new();
    let mut wanted = Vec::new();
    for document in documents.iter() {
        for value in values(document.get(spec.local_field)) {
            if let Some(key) = Key::from_value(value) {
                if seen.insert(key) {
                    wanted.push(value.clone());
                }
            }
        }
    }

    let mut foreign = if wanted.is_empty() {
        Vec::new()
    } else {
        store.find(spec.from, &Filter::In(spec.foreign_field, wanted))?
    };

    // Bucket before the children run, they may project the foreign field away.
    let mut buckets: HashMap<Key, Vec<usize>> = HashMap::new();
    for (i, record) in foreign.iter().enumerate() {
        for value in values(record.get(spec.foreign_field)) {
            if let Some(key) = Key::from_value(value) {
                buckets.entry(key).or_default().push(i);
            }
        }
    }

    apply_stages(store, &mut foreign, children, viewer)?;

    for document in documents.iter_mut() {
        let mut taken = HashSet::new();
        let mut joined = Vec::new();
        for value in values(document.get(spec.local_field)) {
            let matches = Key::from_value(value).and_then(|key| buckets.get(&key));
            for i in matches.into_iter().flatten() {
                if taken.insert(*i) {
                    joined.push(Value::Object(foreign[*i].clone()));
                }
            }
        }
        document.insert(spec.as_field.to_owned(), Value::Array(joined));
    }
    Ok(())
}
