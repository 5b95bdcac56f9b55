//! Writes. Every operation runs its checks and its writes inside one store
//! transaction, so a failed check leaves nothing behind.

pub mod content;
pub mod playlist;
pub mod toggle;

use crate::database::{abort, Store, Tx, TxResult};
use crate::error::{Error, Result};
use crate::model::{Id, Owned};

fn capitalized(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub(crate) fn not_found(kind: &str) -> Error {
    Error::not_found(format!("{} not found", capitalized(kind)))
}

/// Trimmed `value`, or a validation error when it is blank.
pub(crate) fn required(value: &str, message: &'static str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        Err(Error::validation(message))
    } else {
        Ok(value.to_owned())
    }
}

/// Like [`required`], for fields that may be left out of an update.
pub(crate) fn optional(value: Option<&str>, message: &'static str) -> Result<Option<String>> {
    value.map(|v| required(v, message)).transpose()
}

/// Loads record `id` if `viewer` owns it.
pub(crate) fn owned<T: Owned>(tx: &Tx<'_>, id: Id, viewer: Id, action: &str) -> TxResult<T> {
    match tx.get::<T>(id)? {
        None => abort(Err(not_found(T::KIND))),
        Some(record) if record.owner() != viewer => abort(Err(Error::forbidden(format!(
            "Unauthorized to {} this {}",
            action,
            T::KIND
        )))),
        Some(record) => Ok(record),
    }
}

/// Same check outside a transaction, for work that has to happen before it.
pub(crate) fn check_owner<T: Owned>(store: &Store, id: Id, viewer: Id, action: &str) -> Result<T> {
    store.transaction(|tx| owned::<T>(tx, id, viewer, action))
}

/// Applies `edit` to an owned record. Returns the old and the new version.
pub(crate) fn update_owned<T, F>(
    store: &Store,
    id: Id,
    viewer: Id,
    action: &str,
    edit: F,
) -> Result<(T, T)>
where
    T: Owned,
    F: Fn(&mut T) -> Result<()>,
{
    store.transaction(|tx| {
        let old = owned::<T>(tx, id, viewer, action)?;
        let mut new = old.clone();
        abort(edit(&mut new))?;
        tx.replace(id, &old, &new)?;
        Ok((old, new))
    })
}
