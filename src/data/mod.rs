//! Storefront data models
//!
//! A business owns a public site addressed by its slug. The site shows the
//! business attributes and its list of products and services.

pub mod assembler;
pub mod slug;

pub use assembler::{assemble_items, assemble_payload, parse_business, ItemSource};
pub use slug::{allocate_slug, slugify};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Collection holding one document per business owner
pub const BUSINESS_COLLECTION: &str = "users";

/// Subcollection (under a business) holding item documents
pub const ITEMS_SUBCOLLECTION: &str = "products";

/// Business document field holding the business attributes
pub const COMPANY_FIELD: &str = "companyData";

/// Business document field listing previously used slugs
pub const OLD_SLUGS_FIELD: &str = "oldSlugs";

/// Business document field holding items embedded by older versions
pub const LEGACY_ITEMS_FIELD: &str = "products";

/// Field path of the canonical slug
pub const SLUG_FIELD_PATH: &str = "companyData.slug";

/// A business and its public identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessRecord {
    /// Owner id, also the business document id
    pub id: String,
    pub name: String,
    pub town: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Payment handle
    #[serde(skip_serializing_if = "Option::is_none")]
    pub swish_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instagram: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facebook: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tiktok: Option<String>,
    pub owners: Vec<String>,
    /// Canonical URL identifier
    pub slug: String,
    /// Slugs this business was reachable under before, kept for redirects
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub old_slugs: Vec<String>,
}

impl BusinessRecord {
    /// Every cache key under which this business may be stored
    pub fn cache_keys(&self) -> Vec<String> {
        let mut keys = vec![self.id.clone(), self.slug.clone()];
        keys.extend(self.old_slugs.iter().cloned());
        keys
    }
}

/// Whether an item is a physical product or a service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    #[default]
    Product,
    Service,
}

impl ItemKind {
    /// Parses the stored discriminator; anything but `service` is a product
    pub fn from_stored(value: Option<&str>) -> Self {
        match value {
            Some("service") => ItemKind::Service,
            _ => ItemKind::Product,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Product => "product",
            ItemKind::Service => "service",
        }
    }
}

/// A product or service offered by a business
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Never negative
    pub price: f64,
    #[serde(rename = "type")]
    pub kind: ItemKind,
    /// Image payload (usually a data URL)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Everything a public site shows: the business and its items
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebsitePayload {
    pub business: BusinessRecord,
    pub items: Vec<Item>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn business() -> BusinessRecord {
        BusinessRecord {
            id: "owner-1".to_string(),
            name: "Acme".to_string(),
            town: "Umeå".to_string(),
            description: None,
            swish_number: None,
            instagram: Some("acme".to_string()),
            facebook: None,
            tiktok: None,
            owners: vec!["Ada".to_string()],
            slug: "acme-2".to_string(),
            old_slugs: vec!["acme".to_string()],
        }
    }

    #[test]
    fn test_cache_keys_cover_id_slug_and_aliases() {
        assert_eq!(business().cache_keys(), vec!["owner-1", "acme-2", "acme"]);
    }

    #[test]
    fn test_item_kind_from_stored() {
        assert_eq!(ItemKind::from_stored(Some("service")), ItemKind::Service);
        assert_eq!(ItemKind::from_stored(Some("product")), ItemKind::Product);
        assert_eq!(ItemKind::from_stored(Some("gadget")), ItemKind::Product);
        assert_eq!(ItemKind::from_stored(None), ItemKind::Product);
    }

    #[test]
    fn test_business_serializes_camel_case_without_empty_options() {
        let json = serde_json::to_value(business()).unwrap();
        assert_eq!(json["oldSlugs"], serde_json::json!(["acme"]));
        assert_eq!(json["instagram"], "acme");
        assert!(json.get("swishNumber").is_none());
    }

    #[test]
    fn test_item_kind_serializes_as_type() {
        let item = Item {
            id: "1".to_string(),
            name: "Haircut".to_string(),
            description: "Short".to_string(),
            price: 300.0,
            kind: ItemKind::Service,
            image_url: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["type"], "service");
        assert!(json.get("imageUrl").is_none());
    }
}
