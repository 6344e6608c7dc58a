//! In-process document store
//!
//! Holds collections in memory, keyed by collection path and then document id.
//! A store can be loaded from a JSON dump of the form
//! `{ "<collection path>": { "<id>": { ...fields... } } }`, which is how the CLI
//! runs without a live backend. Reads are counted so callers can check how
//! many metered calls a code path made.

use futures::future::{self, BoxFuture};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{
    field_at, subcollection_path, Document, DocumentStore, StoreError, StoredDocument,
};

type Collections = BTreeMap<String, BTreeMap<String, Document>>;

/// Document store backed by ordered in-memory maps
///
/// Listing and querying return documents in ascending id order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: Mutex<Collections>,
    reads: AtomicUsize,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a store from a JSON dump file
    pub fn from_dump_file(path: &Path) -> Result<Self, StoreError> {
        let content = fs::read_to_string(path)?;
        let collections: Collections = serde_json::from_str(&content)?;
        Ok(Self {
            collections: Mutex::new(collections),
            ..Self::default()
        })
    }

    /// Inserts or replaces a document without counting as a backend call
    pub fn insert(&self, collection: &str, id: &str, document: Document) {
        self.lock()
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), document);
    }

    /// Number of read calls served so far
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Makes every subsequent call fail with [`StoreError::Unavailable`]
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn lock(&self) -> MutexGuard<'_, Collections> {
        self.collections.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store set to fail".to_string()));
        }
        Ok(())
    }

    fn read<T>(&self, op: impl FnOnce(&Collections) -> T) -> Result<T, StoreError> {
        self.check_available()?;
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(op(&self.lock()))
    }

    fn list(&self, path: &str) -> Result<Vec<StoredDocument>, StoreError> {
        self.read(|collections| {
            collections
                .get(path)
                .map(|docs| {
                    docs.iter()
                        .map(|(id, doc)| (id.clone(), doc.clone()))
                        .collect()
                })
                .unwrap_or_default()
        })
    }
}

impl DocumentStore for MemoryStore {
    fn get_by_id<'a>(
        &'a self,
        collection: &'a str,
        id: &'a str,
    ) -> BoxFuture<'a, Result<Option<Document>, StoreError>> {
        let result = self.read(|collections| {
            collections
                .get(collection)
                .and_then(|docs| docs.get(id))
                .cloned()
        });
        Box::pin(future::ready(result))
    }

    fn query_equals<'a>(
        &'a self,
        collection: &'a str,
        field_path: &'a str,
        value: &'a Value,
    ) -> BoxFuture<'a, Result<Vec<StoredDocument>, StoreError>> {
        let result = self.read(|collections| {
            collections
                .get(collection)
                .map(|docs| {
                    docs.iter()
                        .filter(|(_, doc)| field_at(doc, field_path) == Some(value))
                        .map(|(id, doc)| (id.clone(), doc.clone()))
                        .collect()
                })
                .unwrap_or_default()
        });
        Box::pin(future::ready(result))
    }

    fn list_collection<'a>(
        &'a self,
        collection: &'a str,
    ) -> BoxFuture<'a, Result<Vec<StoredDocument>, StoreError>> {
        Box::pin(future::ready(self.list(collection)))
    }

    fn list_subcollection<'a>(
        &'a self,
        collection: &'a str,
        parent_id: &'a str,
        name: &'a str,
    ) -> BoxFuture<'a, Result<Vec<StoredDocument>, StoreError>> {
        let path = subcollection_path(collection, parent_id, name);
        Box::pin(future::ready(self.list(&path)))
    }

    fn set_document<'a>(
        &'a self,
        collection: &'a str,
        id: &'a str,
        document: Document,
        merge: bool,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        let result = self.check_available().map(|()| {
            let mut collections = self.lock();
            let docs = collections.entry(collection.to_string()).or_default();
            match docs.get_mut(id) {
                Some(existing) if merge => existing.extend(document),
                _ => {
                    docs.insert(id.to_string(), document);
                }
            }
        });
        Box::pin(future::ready(result))
    }

    fn delete_document<'a>(
        &'a self,
        collection: &'a str,
        id: &'a str,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        let result = self.check_available().map(|()| {
            if let Some(docs) = self.lock().get_mut(collection) {
                docs.remove(id);
            }
        });
        Box::pin(future::ready(result))
    }
}
