//! Document store over sled.
//!
//! Every collection lives in its own tree keyed by big-endian id, so iteration
//! order is creation order. Each indexed field gets a tree mapping the field
//! value to a posting list of ids, and each collection has one tree of unique
//! keys. All writes go through [`Store::transaction`], which spans every tree,
//! so index, uniqueness and search maintenance commits or aborts together
//! with the record itself.

use crate::error::{Error, Result};
use crate::fts_tree::{FTSExt, FTSTransaction, FTSTree};
use crate::model::*;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use sled::transaction::{ConflictableTransactionError, ConflictableTransactionResult};
use sled::transaction::{Transactional, TransactionalTree};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

pub type Document = Map<String, Value>;
pub type TxResult<T> = ConflictableTransactionResult<T, Error>;

pub const ID_FIELD: &str = "_id";

fn serialize_id(id: Id) -> [u8; 8] {
    id.to_be_bytes()
}

fn deserialize_id<V: AsRef<[u8]>>(id: V) -> Result<Id> {
    use std::convert::TryInto;
    id.as_ref()
        .try_into()
        .map(u64::from_be_bytes)
        .map_err(|_| Error::upstream(id.as_ref().to_vec(), "Corrupt record id"))
}

fn encode_ids(ids: &[Id]) -> Result<Vec<u8>> {
    Ok(bincode::serialize(ids)?)
}

fn decode_ids(data: &[u8]) -> Result<Vec<Id>> {
    Ok(bincode::deserialize(data)?)
}

/// Lifts a domain error into a transaction abort.
pub fn abort<T>(result: Result<T>) -> TxResult<T> {
    result.map_err(ConflictableTransactionError::Abort)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Users,
    Videos,
    Comments,
    Likes,
    Subscriptions,
    Playlists,
}

impl Collection {
    pub const ALL: [Collection; 6] = [
        Collection::Users,
        Collection::Videos,
        Collection::Comments,
        Collection::Likes,
        Collection::Subscriptions,
        Collection::Playlists,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Videos => "videos",
            Collection::Comments => "comments",
            Collection::Likes => "likes",
            Collection::Subscriptions => "subscriptions",
            Collection::Playlists => "playlists",
        }
    }

    /// Fields with a secondary index. Must agree with `Record::index_entries`.
    pub fn indexed_fields(self) -> &'static [&'static str] {
        match self {
            Collection::Users => &["username", "email"],
            Collection::Videos => &["owner"],
            Collection::Comments => &["video", "owner"],
            Collection::Likes => &["likedBy", "video", "comment", "tweet"],
            Collection::Subscriptions => &["channel", "subscriber"],
            Collection::Playlists => &["owner", "videos"],
        }
    }

    /// Fields never exposed in documents.
    pub fn hidden_fields(self) -> &'static [&'static str] {
        match self {
            Collection::Users => &["passwordHash"],
            _ => &[],
        }
    }

    fn conflict_message(self) -> &'static str {
        match self {
            Collection::Users => "User with this email or username already exists",
            Collection::Likes => "Like already exists",
            Collection::Subscriptions => "Subscription already exists",
            _ => "Duplicate record",
        }
    }

    fn position(self) -> usize {
        self as usize
    }

    fn document(self, id: Id, bytes: &[u8]) -> Result<Document> {
        match self {
            Collection::Users => to_document(id, &decode::<User>(bytes)?),
            Collection::Videos => to_document(id, &decode::<Video>(bytes)?),
            Collection::Comments => to_document(id, &decode::<Comment>(bytes)?),
            Collection::Likes => to_document(id, &decode::<Like>(bytes)?),
            Collection::Subscriptions => to_document(id, &decode::<Subscription>(bytes)?),
            Collection::Playlists => to_document(id, &decode::<Playlist>(bytes)?),
        }
    }
}

/// Index and unique-key bytes. Index trees are per field, so keys only need to
/// be unambiguous within one field.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(Vec<u8>);

impl Key {
    pub fn id(id: Id) -> Key {
        Key(serialize_id(id).to_vec())
    }

    pub fn text(text: &str) -> Key {
        Key(text.as_bytes().to_vec())
    }

    pub fn tagged(tag: &[u8], ids: &[Id]) -> Key {
        let mut bytes = tag.to_vec();
        bytes.push(0);
        for id in ids {
            bytes.extend_from_slice(&serialize_id(*id));
        }
        Key(bytes)
    }

    pub fn tagged_text(tag: &[u8], text: &str) -> Key {
        let mut bytes = tag.to_vec();
        bytes.push(0);
        bytes.extend_from_slice(text.as_bytes());
        Key(bytes)
    }

    /// Key of a scalar document value, as produced by `Record::index_entries`.
    pub fn from_value(value: &Value) -> Option<Key> {
        match value {
            Value::Number(n) => n.as_u64().map(Key::id),
            Value::String(s) => Some(Key::text(s)),
            Value::Bool(b) => Some(Key(vec![*b as u8])),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

pub trait Record: Serialize + DeserializeOwned + Clone {
    const COLLECTION: Collection;

    /// (field, key) pairs kept in secondary indexes. A field may repeat.
    fn index_entries(&self) -> Vec<(&'static str, Key)>;

    fn unique_keys(&self) -> Vec<Key> {
        Vec::new()
    }

    /// Text kept in the full-text index, if the collection is searchable.
    fn search_text(&self) -> Option<String> {
        None
    }
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(bincode::deserialize(bytes)?)
}

/// The JSON form of a record, with `_id` added and hidden fields removed.
pub fn to_document<T: Record>(id: Id, record: &T) -> Result<Document> {
    let mut document = match serde_json::to_value(record)? {
        Value::Object(map) => map,
        other => return Err(Error::upstream(other, "Record is not a document")),
    };
    for field in T::COLLECTION.hidden_fields() {
        document.remove(*field);
    }
    document.insert(ID_FIELD.to_owned(), Value::from(id));
    Ok(document)
}

pub fn document_id(document: &Document) -> Option<Id> {
    document.get(ID_FIELD).and_then(Value::as_u64)
}

/// Declarative record filter, evaluated against documents.
#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    All,
    /// Equal, or contained in when the field holds an array.
    Eq(&'static str, Value),
    In(&'static str, Vec<Value>),
    /// Present and not null.
    Exists(&'static str),
    And(Vec<Filter>),
}

impl Filter {
    pub fn id(id: Id) -> Filter {
        Filter::Eq(ID_FIELD, Value::from(id))
    }

    pub fn eq(field: &'static str, value: impl Into<Value>) -> Filter {
        Filter::Eq(field, value.into())
    }

    pub fn matches(&self, document: &Document) -> bool {
        match self {
            Filter::All => true,
            Filter::Eq(field, value) => field_matches(document.get(*field), |v| v == value),
            Filter::In(field, values) => {
                field_matches(document.get(*field), |v| values.iter().any(|x| x == v))
            }
            Filter::Exists(field) => !matches!(document.get(*field), None | Some(Value::Null)),
            Filter::And(filters) => filters.iter().all(|f| f.matches(document)),
        }
    }
}

fn field_matches(field: Option<&Value>, pred: impl Fn(&Value) -> bool) -> bool {
    match field {
        Some(Value::Array(items)) => items.iter().any(|v| pred(v)),
        Some(v) => pred(v),
        None => false,
    }
}

#[derive(Clone)]
pub struct Store {
    db: sled::Db,
    /// Data trees in `Collection::ALL` order, then unique-key trees in the
    /// same order, then index trees, then the three search trees.
    trees: Arc<Vec<sled::Tree>>,
    index_slots: Arc<HashMap<(Collection, &'static str), usize>>,
    search_slot: usize,
    search: FTSTree,
}

impl Store {
    pub fn open(db: sled::Db) -> Result<Store> {
        let mut trees = Vec::new();
        for collection in Collection::ALL.iter() {
            trees.push(db.open_tree(collection.name())?);
        }
        for collection in Collection::ALL.iter() {
            trees.push(db.open_tree(format!("{}_unique", collection.name()))?);
        }
        let mut index_slots = HashMap::new();
        for collection in Collection::ALL.iter() {
            for field in collection.indexed_fields() {
                index_slots.insert((*collection, *field), trees.len());
                trees.push(db.open_tree(format!("{}_by_{}", collection.name(), field))?);
            }
        }
        let search = db.open_fts("videos_search")?;
        let search_slot = trees.len();
        trees.extend(search.trees().iter().cloned());
        Ok(Store {
            db,
            trees: Arc::new(trees),
            index_slots: Arc::new(index_slots),
            search_slot,
            search,
        })
    }

    pub fn temporary() -> Result<Store> {
        Store::open(sled::Config::new().temporary(true).open()?)
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    fn data_slot(collection: Collection) -> usize {
        collection.position()
    }

    fn unique_slot(collection: Collection) -> usize {
        Collection::ALL.len() + collection.position()
    }

    fn index_slot(&self, collection: Collection, field: &str) -> Option<usize> {
        self.index_slots
            .iter()
            .find(|((c, f), _)| *c == collection && *f == field)
            .map(|(_, slot)| *slot)
    }

    /// Runs `f` atomically over every tree. sled may call `f` more than once
    /// on conflict, so it must not have side effects outside the transaction.
    pub fn transaction<F, R>(&self, f: F) -> Result<R>
    where
        F: Fn(&Tx<'_>) -> TxResult<R>,
    {
        let result = self.trees.as_slice().transaction(|view| {
            f(&Tx {
                store: self,
                view: view.as_slice(),
            })
        });
        Ok(result?)
    }

    pub fn get<T: Record>(&self, id: Id) -> Result<Option<T>> {
        match self.trees[Self::data_slot(T::COLLECTION)].get(serialize_id(id))? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn insert<T: Record>(&self, record: &T) -> Result<Id> {
        self.transaction(|tx| tx.insert(record))
    }

    /// Ids of records whose indexed `field` equals `key`, in creation order.
    pub fn lookup(&self, collection: Collection, field: &str, key: &Key) -> Result<Vec<Id>> {
        let slot = self.index_slot(collection, field).ok_or_else(|| {
            Error::upstream(field.to_owned(), "Lookup on a field without index")
        })?;
        match self.trees[slot].get(key.as_bytes())? {
            Some(data) => decode_ids(&data),
            None => Ok(Vec::new()),
        }
    }

    /// Ids that can possibly match `filter`, or `None` when a scan is needed.
    fn candidates(&self, collection: Collection, filter: &Filter) -> Result<Option<Vec<Id>>> {
        let values: Vec<&Value> = match filter {
            Filter::Eq(_, value) => vec![value],
            Filter::In(_, values) => values.iter().collect(),
            Filter::And(filters) => {
                let mut best: Option<Vec<Id>> = None;
                for f in filters {
                    if let Some(ids) = self.candidates(collection, f)? {
                        if best.as_ref().map_or(true, |b| ids.len() < b.len()) {
                            best = Some(ids);
                        }
                    }
                }
                return Ok(best);
            }
            Filter::All | Filter::Exists(_) => return Ok(None),
        };
        let field = match filter {
            Filter::Eq(field, _) | Filter::In(field, _) => *field,
            _ => return Ok(None),
        };
        let mut ids = BTreeSet::new();
        if field == ID_FIELD {
            ids.extend(values.iter().filter_map(|v| v.as_u64()));
        } else if self.index_slot(collection, field).is_some() {
            for key in values.iter().filter_map(|v| Key::from_value(v)) {
                ids.extend(self.lookup(collection, field, &key)?);
            }
        } else {
            return Ok(None);
        }
        Ok(Some(ids.into_iter().collect()))
    }

    /// Documents of `collection` matching `filter`, in creation order.
    pub fn find(&self, collection: Collection, filter: &Filter) -> Result<Vec<Document>> {
        let tree = &self.trees[Self::data_slot(collection)];
        let mut documents = Vec::new();
        match self.candidates(collection, filter)? {
            Some(ids) => {
                for id in ids {
                    if let Some(bytes) = tree.get(serialize_id(id))? {
                        documents.push(collection.document(id, &bytes)?);
                    }
                }
            }
            None => {
                for entry in tree.iter() {
                    let (key, bytes) = entry?;
                    documents.push(collection.document(deserialize_id(key)?, &bytes)?);
                }
            }
        }
        documents.retain(|d| filter.matches(d));
        Ok(documents)
    }

    pub fn find_one(&self, collection: Collection, filter: &Filter) -> Result<Option<Document>> {
        Ok(self.find(collection, filter)?.into_iter().next())
    }

    /// Video ids matching `query` with their relevance.
    pub fn search_videos(&self, query: &str) -> Result<Vec<(Id, f32)>> {
        let mut hits = Vec::new();
        for (key, score) in self.search.query(query)? {
            hits.push((deserialize_id(key)?, score));
        }
        Ok(hits)
    }
}

/// A view of the store inside a transaction.
pub struct Tx<'a> {
    store: &'a Store,
    view: &'a [TransactionalTree],
}

impl Tx<'_> {
    fn tree(&self, slot: usize) -> &TransactionalTree {
        &self.view[slot]
    }

    fn search(&self) -> TxResult<FTSTransaction<'_>> {
        let slot = self.store.search_slot;
        match self.view.get(slot..).and_then(FTSTransaction::new) {
            Some(search) => Ok(search),
            None => abort(Err(Error::upstream(slot, "Search trees missing"))),
        }
    }

    fn index_text(&self, id: Id, text: Option<String>) -> TxResult<()> {
        match text {
            Some(text) => self.search()?.insert(&serialize_id(id), &text),
            None => Ok(()),
        }
    }

    fn unindex_text(&self, id: Id, text: Option<String>) -> TxResult<()> {
        match text {
            Some(text) => self.search()?.remove(&serialize_id(id), &text),
            None => Ok(()),
        }
    }

    fn index_tree(&self, collection: Collection, field: &str) -> TxResult<&TransactionalTree> {
        match self.store.index_slot(collection, field) {
            Some(slot) => Ok(self.tree(slot)),
            None => abort(Err(Error::upstream(
                field.to_owned(),
                "Index entry for a field without index",
            ))),
        }
    }

    pub fn get<T: Record>(&self, id: Id) -> TxResult<Option<T>> {
        match self
            .tree(Store::data_slot(T::COLLECTION))
            .get(serialize_id(id))?
        {
            Some(bytes) => Ok(Some(abort(decode(&bytes))?)),
            None => Ok(None),
        }
    }

    pub fn exists<T: Record>(&self, id: Id) -> TxResult<bool> {
        Ok(self
            .tree(Store::data_slot(T::COLLECTION))
            .get(serialize_id(id))?
            .is_some())
    }

    /// Id holding unique `key` in the collection of `T`.
    pub fn unique<T: Record>(&self, key: &Key) -> TxResult<Option<Id>> {
        match self
            .tree(Store::unique_slot(T::COLLECTION))
            .get(key.as_bytes())?
        {
            Some(id) => Ok(Some(abort(deserialize_id(id))?)),
            None => Ok(None),
        }
    }

    pub fn lookup<T: Record>(&self, field: &str, key: &Key) -> TxResult<Vec<Id>> {
        match self.index_tree(T::COLLECTION, field)?.get(key.as_bytes())? {
            Some(data) => abort(decode_ids(&data)),
            None => Ok(Vec::new()),
        }
    }

    fn add_posting(&self, collection: Collection, field: &str, key: &Key, id: Id) -> TxResult<()> {
        let tree = self.index_tree(collection, field)?;
        let mut ids = match tree.get(key.as_bytes())? {
            Some(data) => abort(decode_ids(&data))?,
            None => Vec::new(),
        };
        if let Err(pos) = ids.binary_search(&id) {
            ids.insert(pos, id);
        }
        tree.insert(key.as_bytes(), abort(encode_ids(&ids))?)?;
        Ok(())
    }

    fn remove_posting(
        &self,
        collection: Collection,
        field: &str,
        key: &Key,
        id: Id,
    ) -> TxResult<()> {
        let tree = self.index_tree(collection, field)?;
        let mut ids = match tree.get(key.as_bytes())? {
            Some(data) => abort(decode_ids(&data))?,
            None => return Ok(()),
        };
        ids.retain(|x| *x != id);
        if ids.is_empty() {
            tree.remove(key.as_bytes())?;
        } else {
            tree.insert(key.as_bytes(), abort(encode_ids(&ids))?)?;
        }
        Ok(())
    }

    fn claim_unique(&self, collection: Collection, key: &Key, id: Id) -> TxResult<()> {
        let tree = self.tree(Store::unique_slot(collection));
        match tree.get(key.as_bytes())? {
            Some(owner) if abort(deserialize_id(&owner))? != id => {
                abort(Err(Error::conflict(collection.conflict_message())))
            }
            _ => {
                tree.insert(key.as_bytes(), serialize_id(id).as_ref())?;
                Ok(())
            }
        }
    }

    /// Inserts a new record. Aborts with a conflict when a unique key is taken.
    pub fn insert<T: Record>(&self, record: &T) -> TxResult<Id> {
        let collection = T::COLLECTION;
        let id = self.tree(Store::data_slot(collection)).generate_id()?;
        for key in record.unique_keys() {
            self.claim_unique(collection, &key, id)?;
        }
        for (field, key) in record.index_entries() {
            self.add_posting(collection, field, &key, id)?;
        }
        self.index_text(id, record.search_text())?;
        let bytes = abort(bincode::serialize(record).map_err(Error::from))?;
        self.tree(Store::data_slot(collection))
            .insert(serialize_id(id).as_ref(), bytes)?;
        Ok(id)
    }

    /// Overwrites record `id`, moving index and unique entries from `old`
    /// to `new`.
    pub fn replace<T: Record>(&self, id: Id, old: &T, new: &T) -> TxResult<()> {
        let collection = T::COLLECTION;
        let old_unique = old.unique_keys();
        let new_unique = new.unique_keys();
        for key in old_unique.iter().filter(|k| !new_unique.contains(k)) {
            self.tree(Store::unique_slot(collection))
                .remove(key.as_bytes())?;
        }
        for key in new_unique.iter() {
            self.claim_unique(collection, key, id)?;
        }
        let old_entries = old.index_entries();
        let new_entries = new.index_entries();
        for (field, key) in old_entries.iter().filter(|e| !new_entries.contains(e)) {
            self.remove_posting(collection, field, key, id)?;
        }
        for (field, key) in new_entries.iter().filter(|e| !old_entries.contains(e)) {
            self.add_posting(collection, field, key, id)?;
        }
        let (old_text, new_text) = (old.search_text(), new.search_text());
        if old_text != new_text {
            self.unindex_text(id, old_text)?;
            self.index_text(id, new_text)?;
        }
        let bytes = abort(bincode::serialize(new).map_err(Error::from))?;
        self.tree(Store::data_slot(collection))
            .insert(serialize_id(id).as_ref(), bytes)?;
        Ok(())
    }

    /// Deletes record `id` with its index and unique entries.
    pub fn remove<T: Record>(&self, id: Id) -> TxResult<Option<T>> {
        let collection = T::COLLECTION;
        let record: T = match self.get(id)? {
            Some(record) => record,
            None => return Ok(None),
        };
        for key in record.unique_keys() {
            self.tree(Store::unique_slot(collection))
                .remove(key.as_bytes())?;
        }
        for (field, key) in record.index_entries() {
            self.remove_posting(collection, field, &key, id)?;
        }
        self.unindex_text(id, record.search_text())?;
        self.tree(Store::data_slot(collection))
            .remove(serialize_id(id).as_ref())?;
        Ok(Some(record))
    }
}
