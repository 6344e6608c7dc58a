//! Document store clients
//!
//! The storefront data lives in a metered document database: top-level
//! collections of JSON-like documents, each of which can own subcollections.
//! Every call on [`DocumentStore`] is assumed to cost money, which is why the
//! visitor path only reaches it through the read governor.

mod firestore;
mod memory;

pub use firestore::FirestoreStore;
pub use memory::MemoryStore;

use futures::future::BoxFuture;
use serde_json::{Map, Value};
use thiserror::Error;

/// A stored document: a JSON object keyed by field name
pub type Document = Map<String, Value>;

/// A document together with its storage key
pub type StoredDocument = (String, Document);

/// Errors that can occur when talking to a document store
#[derive(Debug, Error)]
pub enum StoreError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with a non-success status
    #[error("Backend returned {status}: {message}")]
    Status { status: u16, message: String },

    /// The backend answered with something we could not decode
    #[error("Failed to decode backend response: {0}")]
    Decode(String),

    /// Local dump file could not be read or written
    #[error("Store file error: {0}")]
    Io(#[from] std::io::Error),

    /// Local dump file is not valid JSON
    #[error("Store file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The store is unreachable
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Operations the storefront needs from the backend
///
/// Collection paths are slash-separated (`users`, `users/<id>/products`).
/// Methods return boxed futures so the trait can be used as `dyn DocumentStore`.
pub trait DocumentStore: Send + Sync {
    /// Fetches one document, `None` if it does not exist
    fn get_by_id<'a>(
        &'a self,
        collection: &'a str,
        id: &'a str,
    ) -> BoxFuture<'a, Result<Option<Document>, StoreError>>;

    /// Returns every document of `collection` whose `field_path` equals `value`
    ///
    /// `field_path` may be dotted to reach into maps (`companyData.slug`).
    fn query_equals<'a>(
        &'a self,
        collection: &'a str,
        field_path: &'a str,
        value: &'a Value,
    ) -> BoxFuture<'a, Result<Vec<StoredDocument>, StoreError>>;

    /// Returns every document of a top-level collection
    fn list_collection<'a>(
        &'a self,
        collection: &'a str,
    ) -> BoxFuture<'a, Result<Vec<StoredDocument>, StoreError>>;

    /// Returns every document of `collection/parent_id/name`
    fn list_subcollection<'a>(
        &'a self,
        collection: &'a str,
        parent_id: &'a str,
        name: &'a str,
    ) -> BoxFuture<'a, Result<Vec<StoredDocument>, StoreError>>;

    /// Writes a document; with `merge` only the given top-level fields change
    fn set_document<'a>(
        &'a self,
        collection: &'a str,
        id: &'a str,
        document: Document,
        merge: bool,
    ) -> BoxFuture<'a, Result<(), StoreError>>;

    /// Deletes a document; deleting a missing document is not an error
    fn delete_document<'a>(
        &'a self,
        collection: &'a str,
        id: &'a str,
    ) -> BoxFuture<'a, Result<(), StoreError>>;
}

/// Builds the path of a subcollection
pub fn subcollection_path(collection: &str, parent_id: &str, name: &str) -> String {
    format!("{}/{}/{}", collection, parent_id, name)
}

/// Looks up a dotted field path inside a document
pub fn field_at<'a>(document: &'a Document, field_path: &str) -> Option<&'a Value> {
    let mut parts = field_path.split('.');
    let mut current = document.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}
