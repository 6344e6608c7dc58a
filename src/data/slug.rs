//! URL slugs for business sites

use serde_json::Value;

use super::{BUSINESS_COLLECTION, SLUG_FIELD_PATH};
use crate::store::DocumentStore;

/// Turns a display name into a URL-safe slug
///
/// Swedish vowels fold to their plain form, every other character outside
/// `a-z0-9` becomes a dash, and dashes are collapsed and trimmed.
///
/// ```
/// use sitecache::data::slugify;
///
/// assert_eq!(slugify("Kafé Åre & Co"), "kaf-are-co");
/// ```
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.to_lowercase().chars() {
        let c = match c {
            'å' | 'ä' => 'a',
            'ö' => 'o',
            c if c.is_ascii_lowercase() || c.is_ascii_digit() => c,
            _ => '-',
        };
        if c == '-' && (slug.is_empty() || slug.ends_with('-')) {
            continue;
        }
        slug.push(c);
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Picks a slug for a new business name
///
/// Uses the plain name slug unless another business already owns it, in which
/// case the town is appended. If the uniqueness check itself fails, the plain
/// slug is used.
pub async fn allocate_slug(store: &dyn DocumentStore, name: &str, town: &str) -> String {
    let base = slugify(name);
    let wanted = Value::String(base.clone());

    match store
        .query_equals(BUSINESS_COLLECTION, SLUG_FIELD_PATH, &wanted)
        .await
    {
        Ok(taken) if taken.is_empty() => base,
        Ok(_) => {
            let qualified = format!("{}-{}", base, slugify(town));
            tracing::debug!(base = %base, slug = %qualified, "Slug taken, qualifying with town");
            qualified
        }
        Err(e) => {
            tracing::warn!(error = %e, slug = %base, "Slug uniqueness check failed");
            base
        }
    }
}
