//! View composition: turns stored records into denormalized, viewer-relative
//! documents.
//!
//! A view is a base collection plus a tree of [`Stage`]s. The base set is
//! filtered, sorted and windowed first; stages then run over the window only,
//! so joined relations never influence which base records are returned.

pub mod aggregate;
pub mod join;
pub mod paginate;
pub mod registry;
pub mod viewer;

pub use join::JoinSpec;
pub use paginate::{Page, PageQuery, PageRequest};
pub use registry::{ViewName, ViewSpec};
pub use viewer::Viewer;

use crate::database::{Document, Filter, Store, ID_FIELD};
use crate::error::Result;
use serde_json::Value;
use std::cmp::Ordering;

#[derive(Clone, Debug, PartialEq)]
pub enum Stage {
    /// Attach matching foreign records as an array; `children` shape them.
    Join {
        spec: JoinSpec,
        children: Vec<Stage>,
    },
    /// Replace nothing, add `into` = length of the `relation` array.
    Count {
        relation: &'static str,
        into: &'static str,
    },
    /// Replace the array in `field` by its first element or null.
    First { field: &'static str },
    /// Add `into` = whether the viewer is `key` of any record in `relation`.
    Flag {
        relation: &'static str,
        key: &'static str,
        into: &'static str,
    },
    /// Keep only these fields and `_id`.
    Project(&'static [&'static str]),
    Exclude(&'static [&'static str]),
}

#[derive(Clone, Debug, PartialEq)]
pub struct SortKey {
    pub field: String,
    pub descending: bool,
}

impl SortKey {
    pub fn asc(field: impl Into<String>) -> SortKey {
        SortKey {
            field: field.into(),
            descending: false,
        }
    }

    pub fn desc(field: impl Into<String>) -> SortKey {
        SortKey {
            field: field.into(),
            descending: true,
        }
    }
}

pub(crate) fn apply_stages(
    store: &Store,
    documents: &mut Vec<Document>,
    stages: &[Stage],
    viewer: Viewer,
) -> Result<()> {
    for stage in stages {
        match stage {
            Stage::Join { spec, children } => {
                join::resolve(store, documents, spec, children, viewer)?;
            }
            Stage::Count { relation, into } => {
                for document in documents.iter_mut() {
                    let n = aggregate::count(document.get(*relation));
                    document.insert((*into).to_owned(), Value::from(n));
                }
            }
            Stage::First { field } => {
                for document in documents.iter_mut() {
                    let first = aggregate::first(document.get(*field))
                        .cloned()
                        .map_or(Value::Null, Value::Object);
                    document.insert((*field).to_owned(), first);
                }
            }
            Stage::Flag {
                relation,
                key,
                into,
            } => {
                for document in documents.iter_mut() {
                    let flag = viewer::is_member(viewer, document.get(*relation), key);
                    document.insert((*into).to_owned(), Value::Bool(flag));
                }
            }
            Stage::Project(fields) => {
                for document in documents.iter_mut() {
                    let dropped: Vec<String> = document
                        .keys()
                        .filter(|k| k.as_str() != ID_FIELD && !fields.iter().any(|f| *f == k.as_str()))
                        .cloned()
                        .collect();
                    for key in dropped {
                        document.remove(&key);
                    }
                }
            }
            Stage::Exclude(fields) => {
                for document in documents.iter_mut() {
                    for field in fields.iter() {
                        document.remove(*field);
                    }
                }
            }
        }
    }
    Ok(())
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

/// Stable sort; records missing a key sort last either way.
pub fn sort_documents(documents: &mut [Document], sort: &[SortKey]) {
    documents.sort_by(|a, b| {
        for key in sort {
            let (x, y) = (a.get(&key.field), b.get(&key.field));
            let ordering = match (x, y) {
                (Some(_), Some(_)) if key.descending => compare_values(y, x),
                _ => compare_values(x, y),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

/// Runs the stages of `spec` over given base documents.
pub fn compose(
    store: &Store,
    spec: &ViewSpec,
    mut base: Vec<Document>,
    viewer: Viewer,
) -> Result<Vec<Document>> {
    apply_stages(store, &mut base, &spec.stages, viewer)?;
    Ok(base)
}

/// The view of the first record matching `filter`.
pub fn compose_one(
    store: &Store,
    spec: &ViewSpec,
    filter: &Filter,
    viewer: Viewer,
) -> Result<Option<Document>> {
    let base: Vec<Document> = store
        .find(spec.collection, filter)?
        .into_iter()
        .take(1)
        .collect();
    Ok(compose(store, spec, base, viewer)?.into_iter().next())
}

/// The view of every record matching `filter`, in the view's default order.
pub fn compose_all(
    store: &Store,
    spec: &ViewSpec,
    filter: &Filter,
    viewer: Viewer,
) -> Result<Vec<Document>> {
    let mut base = store.find(spec.collection, filter)?;
    sort_documents(&mut base, &spec.sort);
    compose(store, spec, base, viewer)
}

/// Sorts and windows `base`, then composes the window.
pub fn compose_window(
    store: &Store,
    spec: &ViewSpec,
    mut base: Vec<Document>,
    sort: &[SortKey],
    request: PageRequest,
    viewer: Viewer,
) -> Result<Page<Document>> {
    debug_assert!(spec.paginated, "{} is not a paged view", spec.name);
    sort_documents(&mut base, sort);
    paginate::paginate(base, request).map_docs(|docs| compose(store, spec, docs, viewer))
}

pub fn compose_page(
    store: &Store,
    spec: &ViewSpec,
    filter: &Filter,
    request: PageRequest,
    viewer: Viewer,
) -> Result<Page<Document>> {
    let base = store.find(spec.collection, filter)?;
    compose_window(store, spec, base, &spec.sort, request, viewer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{document_id, Collection};
    use crate::model::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn folds_flags_and_projection() {
        let store = Store::temporary().unwrap();
        let mut docs = vec![doc(json!({
            "_id": 1,
            "title": "t",
            "secret": "x",
            "likes": [{ "likedBy": 5 }, { "likedBy": 6 }],
            "owner": [{ "username": "ann" }],
        }))];
        let stages = vec![
            Stage::Count { relation: "likes", into: "likesCount" },
            Stage::Flag { relation: "likes", key: "likedBy", into: "isLiked" },
            Stage::First { field: "owner" },
            Stage::Exclude(&["likes"]),
            Stage::Project(&["title", "likesCount", "isLiked", "owner"]),
        ];
        apply_stages(&store, &mut docs, &stages, Viewer::user(6)).unwrap();
        assert_eq!(
            Value::Object(docs.remove(0)),
            json!({
                "_id": 1,
                "title": "t",
                "likesCount": 2,
                "isLiked": true,
                "owner": { "username": "ann" },
            })
        );
    }

    #[test]
    fn first_of_empty_is_null() {
        let store = Store::temporary().unwrap();
        let mut docs = vec![doc(json!({ "_id": 1, "owner": [] }))];
        apply_stages(&store, &mut docs, &[Stage::First { field: "owner" }], Viewer::anonymous())
            .unwrap();
        assert_eq!(docs[0]["owner"], Value::Null);
    }

    #[test]
    fn sort_descending_and_missing_last() {
        let mut docs = vec![
            doc(json!({ "_id": 1, "views": 5 })),
            doc(json!({ "_id": 2 })),
            doc(json!({ "_id": 3, "views": 9 })),
        ];
        sort_documents(&mut docs, &[SortKey::desc("views")]);
        let ids: Vec<_> = docs.iter().filter_map(document_id).collect();
        assert_eq!(ids, vec![3, 1, 2]);
    }

    #[test]
    fn pagination_ignores_joined_sizes() {
        let store = Store::temporary().unwrap();
        let mut ids = Vec::new();
        for i in 0..15 {
            ids.push(
                store
                    .insert(&Comment {
                        content: format!("c{}", i),
                        video: 1,
                        owner: 1,
                    })
                    .unwrap(),
            );
        }
        for user in 100..120 {
            store.insert(&Like::new(user, LikeTarget::Comment(ids[0]))).unwrap();
        }
        let spec = ViewSpec {
            name: "test",
            collection: Collection::Comments,
            stages: vec![Stage::Join {
                spec: JoinSpec {
                    from: Collection::Likes,
                    local_field: ID_FIELD,
                    foreign_field: "comment",
                    as_field: "likes",
                },
                children: vec![],
            }],
            sort: vec![],
            paginated: true,
        };
        let page = compose_page(
            &store,
            &spec,
            &Filter::eq("video", 1u64),
            PageRequest::new(2, 10),
            Viewer::anonymous(),
        )
        .unwrap();
        assert_eq!(page.docs.len(), 5);
        assert_eq!(page.total_docs, 15);
        assert!(!page.has_next);
        assert!(page.has_prev);

        let first = compose_page(
            &store,
            &spec,
            &Filter::eq("video", 1u64),
            PageRequest::new(1, 10),
            Viewer::anonymous(),
        )
        .unwrap();
        assert_eq!(first.docs.len(), 10);
        assert_eq!(first.docs[0]["likes"].as_array().unwrap().len(), 20);
    }
}
