//! Builds a [`WebsitePayload`] from raw store documents
//!
//! Items have been stored two ways over time: as documents in a `products`
//! subcollection (current) and as a `products` array embedded on the business
//! document (legacy). [`ItemSource`] decides once which of the two applies;
//! the two are never merged.

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;

use super::{
    slugify, BusinessRecord, Item, ItemKind, WebsitePayload, BUSINESS_COLLECTION, COMPANY_FIELD,
    ITEMS_SUBCOLLECTION, LEGACY_ITEMS_FIELD, OLD_SLUGS_FIELD,
};
use crate::clock::Clock;
use crate::store::{Document, DocumentStore, StoreError, StoredDocument};

/// Where a business's items come from
#[derive(Debug, Clone, PartialEq)]
pub enum ItemSource {
    /// Documents of the items subcollection, with their storage keys
    Subcollection(Vec<StoredDocument>),
    /// Entries of the legacy embedded array
    Embedded(Vec<Value>),
}

impl ItemSource {
    /// Chooses the source for a business
    ///
    /// The embedded array is used only when the subcollection came back empty
    /// and the business document carries a non-empty legacy array. An empty
    /// subcollection cannot be told apart from a missing one, so a business
    /// whose items were all deleted will show its legacy items again if the
    /// legacy array was never cleared.
    pub fn select(subcollection: Vec<StoredDocument>, business_doc: &Document) -> Self {
        if subcollection.is_empty() {
            if let Some(Value::Array(legacy)) = business_doc.get(LEGACY_ITEMS_FIELD) {
                if !legacy.is_empty() {
                    return ItemSource::Embedded(legacy.clone());
                }
            }
        }
        ItemSource::Subcollection(subcollection)
    }

    /// Normalizes the source into items
    ///
    /// `now` fills in missing timestamps, and for embedded entries without an
    /// id, a `<millis>-<index>` id.
    pub fn into_items(self, now: DateTime<Utc>) -> Vec<Item> {
        match self {
            ItemSource::Subcollection(docs) => docs
                .into_iter()
                .map(|(key, doc)| parse_item(key, &doc, now))
                .collect(),
            ItemSource::Embedded(entries) => entries
                .iter()
                .enumerate()
                .filter_map(|(index, entry)| {
                    let Some(doc) = entry.as_object() else {
                        tracing::warn!(index, "Skipping non-object legacy item");
                        return None;
                    };
                    let fallback_id = format!("{}-{}", now.timestamp_millis(), index);
                    Some(parse_item(fallback_id, doc, now))
                })
                .collect(),
        }
    }
}

/// Loads and normalizes the items of a business
pub async fn assemble_items(
    store: &dyn DocumentStore,
    business_id: &str,
    business_doc: &Document,
    clock: &dyn Clock,
) -> Result<Vec<Item>, StoreError> {
    let subcollection = store
        .list_subcollection(BUSINESS_COLLECTION, business_id, ITEMS_SUBCOLLECTION)
        .await?;
    let source = ItemSource::select(subcollection, business_doc);
    if let ItemSource::Embedded(entries) = &source {
        tracing::debug!(
            business_id,
            count = entries.len(),
            "Using legacy embedded items"
        );
    }
    Ok(source.into_items(clock.now()))
}

/// Builds the full payload for a business document
///
/// Returns `None` when the document has no business attributes (an account
/// that never finished onboarding).
pub async fn assemble_payload(
    store: &dyn DocumentStore,
    business_id: &str,
    business_doc: &Document,
    clock: &dyn Clock,
) -> Result<Option<WebsitePayload>, StoreError> {
    let Some(business) = parse_business(business_id, business_doc) else {
        return Ok(None);
    };
    let items = assemble_items(store, business_id, business_doc, clock).await?;
    Ok(Some(WebsitePayload { business, items }))
}

/// Business attributes as stored under `companyData`
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct StoredCompany {
    name: String,
    town: String,
    description: Option<String>,
    swish_number: Option<String>,
    instagram: Option<String>,
    facebook: Option<String>,
    tiktok: Option<String>,
    owners: Vec<String>,
    slug: Option<String>,
}

/// Reads the business attributes of a business document
///
/// Records written before slugs existed get one derived from their name.
pub fn parse_business(id: &str, doc: &Document) -> Option<BusinessRecord> {
    let company = doc.get(COMPANY_FIELD)?;
    let company: StoredCompany = match serde_json::from_value(company.clone()) {
        Ok(company) => company,
        Err(e) => {
            tracing::warn!(business_id = id, error = %e, "Unreadable business attributes");
            return None;
        }
    };

    let old_slugs = doc
        .get(OLD_SLUGS_FIELD)
        .and_then(Value::as_array)
        .map(|slugs| {
            slugs
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let slug = company
        .slug
        .filter(|slug| !slug.is_empty())
        .unwrap_or_else(|| slugify(&company.name));

    Some(BusinessRecord {
        id: id.to_string(),
        name: company.name,
        town: company.town,
        description: company.description,
        swish_number: company.swish_number,
        instagram: company.instagram,
        facebook: company.facebook,
        tiktok: company.tiktok,
        owners: company.owners,
        slug,
        old_slugs,
    })
}

/// Maps one stored item to an [`Item`]
///
/// The document's own `id` field wins over `fallback_id`.
fn parse_item(fallback_id: String, doc: &Document, now: DateTime<Utc>) -> Item {
    let id = match doc.get("id") {
        Some(Value::String(id)) if !id.is_empty() => id.clone(),
        Some(Value::Number(id)) => id.to_string(),
        _ => fallback_id,
    };

    let price = doc.get("price").and_then(parse_price).unwrap_or(0.0);
    let price = if price < 0.0 {
        tracing::warn!(item_id = %id, price, "Clamping negative price");
        0.0
    } else {
        price
    };

    Item {
        name: string_field(doc, "name"),
        description: string_field(doc, "description"),
        price,
        kind: ItemKind::from_stored(doc.get("type").and_then(Value::as_str)),
        image_url: doc
            .get("imageUrl")
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty())
            .map(str::to_string),
        created_at: doc.get("createdAt").and_then(parse_timestamp).unwrap_or(now),
        updated_at: doc.get("updatedAt").and_then(parse_timestamp).unwrap_or(now),
        id,
    }
}

fn string_field(doc: &Document, field: &str) -> String {
    doc.get(field)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Prices are numbers, but older forms stored the raw input string
fn parse_price(value: &Value) -> Option<f64> {
    let price = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    price.is_finite().then_some(price)
}

/// Accepts RFC 3339 strings, epoch milliseconds, and `{seconds, nanos}` maps
pub(crate) fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        Value::Number(n) => Utc.timestamp_millis_opt(n.as_i64()?).single(),
        Value::Object(map) => {
            let seconds = map
                .get("seconds")
                .or_else(|| map.get("_seconds"))
                .and_then(Value::as_i64)?;
            let nanos = map
                .get("nanos")
                .or_else(|| map.get("nanoseconds"))
                .or_else(|| map.get("_nanoseconds"))
                .and_then(Value::as_u64)
                .unwrap_or(0);
            Utc.timestamp_opt(seconds, u32::try_from(nanos).ok()?).single()
        }
        _ => None,
    }
}
