//! Finds the business record behind a slug or id
//!
//! A slug is first matched against the canonical `companyData.slug` field.
//! If no business uses it today, the business that used it before (listed in
//! its `oldSlugs`) is returned, so old links keep working.

use serde_json::Value;

use crate::data::{BUSINESS_COLLECTION, COMPANY_FIELD, OLD_SLUGS_FIELD, SLUG_FIELD_PATH};
use crate::store::{Document, DocumentStore, StoreError};

/// How a business was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// By id or by canonical slug
    Direct,
    /// Through a previously used slug
    Alias,
}

/// A business document located by the resolver
#[derive(Debug, Clone)]
pub struct FoundBusiness {
    pub id: String,
    pub document: Document,
    pub resolution: Resolution,
}

fn has_company(doc: &Document) -> bool {
    doc.get(COMPANY_FIELD).is_some_and(Value::is_object)
}

fn lists_old_slug(doc: &Document, slug: &str) -> bool {
    doc.get(OLD_SLUGS_FIELD)
        .and_then(Value::as_array)
        .is_some_and(|slugs| slugs.iter().any(|s| s.as_str() == Some(slug)))
}

/// Resolves a slug, trying the canonical slug before aliases
pub async fn resolve_slug(
    store: &dyn DocumentStore,
    slug: &str,
) -> Result<Option<FoundBusiness>, StoreError> {
    if let Some(found) = resolve_canonical(store, slug).await? {
        return Ok(Some(found));
    }
    resolve_alias(store, slug).await
}

/// Finds the business whose current slug is `slug`
pub async fn resolve_canonical(
    store: &dyn DocumentStore,
    slug: &str,
) -> Result<Option<FoundBusiness>, StoreError> {
    let wanted = Value::String(slug.to_string());
    let matches = store
        .query_equals(BUSINESS_COLLECTION, SLUG_FIELD_PATH, &wanted)
        .await?;

    Ok(matches
        .into_iter()
        .find(|(_, doc)| has_company(doc))
        .map(|(id, document)| FoundBusiness {
            id,
            document,
            resolution: Resolution::Direct,
        }))
}

/// Finds a business that used to be reachable under `slug`
///
/// Scans the whole business collection. When several businesses list the same
/// old slug, the first one in the store's listing order wins.
pub async fn resolve_alias(
    store: &dyn DocumentStore,
    slug: &str,
) -> Result<Option<FoundBusiness>, StoreError> {
    let businesses = store.list_collection(BUSINESS_COLLECTION).await?;

    let found = businesses
        .into_iter()
        .find(|(_, doc)| has_company(doc) && lists_old_slug(doc, slug))
        .map(|(id, document)| FoundBusiness {
            id,
            document,
            resolution: Resolution::Alias,
        });

    if let Some(found) = &found {
        tracing::debug!(slug, business_id = %found.id, "Resolved slug through alias");
    }
    Ok(found)
}

/// Fetches a business by owner id
pub async fn resolve_id(
    store: &dyn DocumentStore,
    id: &str,
) -> Result<Option<FoundBusiness>, StoreError> {
    let document = store.get_by_id(BUSINESS_COLLECTION, id).await?;
    Ok(document.filter(has_company).map(|document| FoundBusiness {
        id: id.to_string(),
        document,
        resolution: Resolution::Direct,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().expect("test document must be an object")
    }

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store.insert(
            "users",
            "u1",
            doc(json!({ "companyData": { "name": "Acme", "slug": "acme-2" }, "oldSlugs": ["acme"] })),
        );
        store.insert(
            "users",
            "u2",
            doc(json!({ "companyData": { "name": "Bolt", "slug": "bolt" } })),
        );
        // Account without finished onboarding
        store.insert("users", "u3", doc(json!({ "email": "x@y.z", "oldSlugs": ["ghost"] })));
        store
    }

    #[tokio::test]
    async fn test_canonical_slug_resolves_directly() {
        let store = store();

        let found = resolve_slug(&store, "bolt").await.unwrap().unwrap();

        assert_eq!(found.id, "u2");
        assert_eq!(found.resolution, Resolution::Direct);
        assert_eq!(store.read_count(), 1, "Direct hit should not scan aliases");
    }

    #[tokio::test]
    async fn test_old_slug_resolves_through_alias() {
        let store = store();

        let found = resolve_slug(&store, "acme").await.unwrap().unwrap();

        assert_eq!(found.id, "u1");
        assert_eq!(found.resolution, Resolution::Alias);
        assert_eq!(store.read_count(), 2);
    }

    #[tokio::test]
    async fn test_unknown_slug_is_none() {
        let store = store();
        assert!(resolve_slug(&store, "nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_alias_ignores_documents_without_company() {
        let store = store();
        assert!(resolve_slug(&store, "ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_alias_first_in_listing_order_wins() {
        let store = store();
        store.insert(
            "users",
            "u0",
            doc(json!({ "companyData": { "name": "Early", "slug": "early" }, "oldSlugs": ["acme"] })),
        );

        let found = resolve_slug(&store, "acme").await.unwrap().unwrap();

        // MemoryStore lists by ascending id
        assert_eq!(found.id, "u0");
    }

    #[tokio::test]
    async fn test_resolve_id() {
        let store = store();
        assert_eq!(resolve_id(&store, "u1").await.unwrap().unwrap().id, "u1");
        assert!(resolve_id(&store, "u3").await.unwrap().is_none());
        assert!(resolve_id(&store, "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_store_errors_propagate() {
        let store = store();
        store.set_failing(true);
        assert!(resolve_slug(&store, "acme").await.is_err());
    }
}
