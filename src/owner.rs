//! Owner-side edits of a business and its items
//!
//! These writes go straight to the store without passing the read governor.
//! Each one invalidates the cached copies of the business afterwards, so the
//! next visitor lookup fetches the edited site.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::data::assembler::parse_timestamp;
use crate::data::{
    allocate_slug, parse_business, slugify, BusinessRecord, ItemKind, BUSINESS_COLLECTION,
    COMPANY_FIELD, ITEMS_SUBCOLLECTION, OLD_SLUGS_FIELD,
};
use crate::service::StorefrontService;
use crate::store::{subcollection_path, Document, StoreError};

/// Images at or above this many characters are not stored
pub const MAX_IMAGE_CHARS: usize = 1_000_000;

/// Errors that can occur while editing a business
#[derive(Debug, Error)]
pub enum EditError {
    /// Input failed validation
    #[error("Invalid input: {0}")]
    Invalid(String),

    /// The owner has no business yet
    #[error("No business found for owner {0}")]
    MissingBusiness(String),

    /// The store rejected the write
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Business attributes as entered by the owner
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BusinessDraft {
    pub name: String,
    pub town: String,
    pub description: Option<String>,
    pub swish_number: Option<String>,
    pub instagram: Option<String>,
    pub facebook: Option<String>,
    pub tiktok: Option<String>,
    pub owners: Vec<String>,
}

impl BusinessDraft {
    fn validate(&self) -> Result<(), EditError> {
        if self.name.trim().is_empty() {
            return Err(EditError::Invalid("business name is required".to_string()));
        }
        if self.town.trim().is_empty() {
            return Err(EditError::Invalid("town is required".to_string()));
        }
        Ok(())
    }

    /// Builds the stored `companyData` map
    fn company_fields(&self, slug: &str) -> Map<String, Value> {
        let mut company = Map::new();
        company.insert("name".into(), json!(self.name.trim()));
        company.insert("town".into(), json!(self.town.trim()));
        let optional = [
            ("description", &self.description),
            ("swishNumber", &self.swish_number),
            ("instagram", &self.instagram),
            ("facebook", &self.facebook),
            ("tiktok", &self.tiktok),
        ];
        for (field, value) in optional {
            if let Some(value) = trimmed(value.as_deref()) {
                company.insert(field.into(), json!(value));
            }
        }
        let owners: Vec<&str> = self
            .owners
            .iter()
            .map(|owner| owner.trim())
            .filter(|owner| !owner.is_empty())
            .collect();
        company.insert("owners".into(), json!(owners));
        company.insert("slug".into(), json!(slug));
        company
    }
}

/// An item as entered by the owner
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemDraft {
    pub name: String,
    pub description: String,
    pub price: f64,
    pub kind: ItemKind,
    pub image_url: Option<String>,
}

impl ItemDraft {
    fn validate(&self) -> Result<(), EditError> {
        if self.name.trim().is_empty() {
            return Err(EditError::Invalid("item name is required".to_string()));
        }
        if self.description.trim().is_empty() {
            return Err(EditError::Invalid("item description is required".to_string()));
        }
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(EditError::Invalid(format!("invalid price {}", self.price)));
        }
        Ok(())
    }
}

fn trimmed(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn timestamp(at: DateTime<Utc>) -> Value {
    json!(at.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Edits a business on behalf of its owner
///
/// Obtained from [`StorefrontService::editor`].
pub struct OwnerEditor<'a> {
    service: &'a StorefrontService,
}

impl<'a> OwnerEditor<'a> {
    pub(crate) fn new(service: &'a StorefrontService) -> Self {
        Self { service }
    }

    async fn load_business(&self, owner_id: &str) -> Result<BusinessRecord, EditError> {
        let document = self
            .service
            .store()
            .get_by_id(BUSINESS_COLLECTION, owner_id)
            .await?
            .ok_or_else(|| EditError::MissingBusiness(owner_id.to_string()))?;
        parse_business(owner_id, &document)
            .ok_or_else(|| EditError::MissingBusiness(owner_id.to_string()))
    }

    async fn write_business(&self, owner_id: &str, fields: Document) -> Result<(), EditError> {
        self.service
            .store()
            .set_document(BUSINESS_COLLECTION, owner_id, fields, true)
            .await?;
        Ok(())
    }

    /// Onboards a business for `owner_id`
    pub async fn create_business(
        &self,
        owner_id: &str,
        draft: &BusinessDraft,
    ) -> Result<BusinessRecord, EditError> {
        draft.validate()?;
        let slug = allocate_slug(self.service.store(), draft.name.trim(), draft.town.trim()).await;

        let mut fields = Document::new();
        fields.insert(COMPANY_FIELD.into(), Value::Object(draft.company_fields(&slug)));
        fields.insert("updatedAt".into(), timestamp(self.service.clock().now()));
        self.write_business(owner_id, fields).await?;

        let business = self.load_business(owner_id).await?;
        self.service.invalidate_business(&business);
        tracing::info!(owner_id, slug = %business.slug, "Created business");
        Ok(business)
    }

    /// Updates the attributes of an existing business
    ///
    /// A rename that changes the name's slug gives the business a new slug;
    /// the previous one is kept in `oldSlugs` so old links still resolve.
    pub async fn update_business(
        &self,
        owner_id: &str,
        draft: &BusinessDraft,
    ) -> Result<BusinessRecord, EditError> {
        draft.validate()?;
        let current = self.load_business(owner_id).await?;

        let base = slugify(draft.name.trim());
        let renamed = base != slugify(&current.name);
        let mut slug = current.slug.clone();
        let mut old_slugs = current.old_slugs.clone();
        // A business never collides with its own slug
        if renamed && base != current.slug {
            slug = allocate_slug(self.service.store(), draft.name.trim(), draft.town.trim()).await;
            if slug != current.slug && !old_slugs.contains(&current.slug) {
                old_slugs.push(current.slug.clone());
            }
            old_slugs.retain(|old| *old != slug);
        }

        let mut fields = Document::new();
        fields.insert(COMPANY_FIELD.into(), Value::Object(draft.company_fields(&slug)));
        fields.insert(OLD_SLUGS_FIELD.into(), json!(old_slugs));
        fields.insert("updatedAt".into(), timestamp(self.service.clock().now()));
        self.write_business(owner_id, fields).await?;

        let updated = self.load_business(owner_id).await?;
        self.service.invalidate_business(&current);
        self.service.invalidate_business(&updated);
        if updated.slug != current.slug {
            tracing::info!(owner_id, from = %current.slug, to = %updated.slug, "Business slug changed");
        }
        Ok(updated)
    }

    /// Creates an item, or replaces `existing_id` if given
    ///
    /// Returns the item id.
    pub async fn save_item(
        &self,
        owner_id: &str,
        draft: &ItemDraft,
        existing_id: Option<&str>,
    ) -> Result<String, EditError> {
        draft.validate()?;
        let business = self.load_business(owner_id).await?;
        let store = self.service.store();
        let items = subcollection_path(BUSINESS_COLLECTION, owner_id, ITEMS_SUBCOLLECTION);
        let now = self.service.clock().now();

        let (id, created_at) = match existing_id {
            Some(id) => {
                let existing = store.get_by_id(&items, id).await?;
                let created_at = existing
                    .as_ref()
                    .and_then(|doc| doc.get("createdAt"))
                    .and_then(parse_timestamp)
                    .unwrap_or(now);
                (id.to_string(), created_at)
            }
            None => (now.timestamp_millis().to_string(), now),
        };

        let image_url = match trimmed(draft.image_url.as_deref()) {
            Some(image) if image.chars().count() >= MAX_IMAGE_CHARS => {
                tracing::warn!(owner_id, item_id = %id, "Image too large, saving item without it");
                None
            }
            image => image,
        };

        let mut document = Document::new();
        document.insert("id".into(), json!(id));
        document.insert("name".into(), json!(draft.name.trim()));
        document.insert("description".into(), json!(draft.description.trim()));
        document.insert("price".into(), json!(draft.price));
        document.insert("type".into(), json!(draft.kind.as_str()));
        if let Some(image) = image_url {
            document.insert("imageUrl".into(), json!(image));
        }
        document.insert("createdAt".into(), timestamp(created_at));
        document.insert("updatedAt".into(), timestamp(now));

        store.set_document(&items, &id, document, false).await?;
        self.service.invalidate_business(&business);
        tracing::debug!(owner_id, item_id = %id, "Saved item");
        Ok(id)
    }

    /// Deletes an item of the owner's business
    pub async fn delete_item(&self, owner_id: &str, item_id: &str) -> Result<(), EditError> {
        let business = self.load_business(owner_id).await?;
        let items = subcollection_path(BUSINESS_COLLECTION, owner_id, ITEMS_SUBCOLLECTION);

        self.service.store().delete_document(&items, item_id).await?;
        self.service.invalidate_business(&business);
        tracing::debug!(owner_id, item_id, "Deleted item");
        Ok(())
    }
}
