//! Visitor-facing lookup of storefront sites
//!
//! [`StorefrontService`] ties the cache, the read governor and the backend
//! together. A lookup is served from fresh cache when possible; otherwise the
//! governor decides whether the backend may be read. When it may not, the last
//! known (possibly expired) copy is served, or nothing. Backend faults are
//! logged and reported as "unavailable", never retried.

use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::cache::{CacheStore, EntryInfo};
use crate::clock::{Clock, SystemClock};
use crate::config::SafetyConfig;
use crate::data::{assemble_payload, BusinessRecord, WebsitePayload};
use crate::governor::{GovernorStats, ReadGovernor};
use crate::owner::OwnerEditor;
use crate::resolver;
use crate::store::{DocumentStore, StoreError};

/// Where a returned payload came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Served {
    /// Fresh cache entry, no backend read
    Cache,
    /// Read from the backend just now
    Backend,
    /// Expired cache entry, served because the governor refused a read
    Stale,
}

impl Served {
    pub fn as_str(&self) -> &'static str {
        match self {
            Served::Cache => "cache",
            Served::Backend => "backend",
            Served::Stale => "stale cache",
        }
    }
}

/// A site found for a lookup
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedWebsite {
    /// The slug or id that was asked for
    pub requested: String,
    /// The business's current slug
    pub canonical_slug: String,
    pub served: Served,
    pub site: WebsitePayload,
}

impl ResolvedWebsite {
    fn new(requested: &str, site: WebsitePayload, served: Served) -> Self {
        Self {
            requested: requested.to_string(),
            canonical_slug: site.business.slug.clone(),
            served,
            site,
        }
    }

    /// Whether the visitor asked for an old slug and should be sent to the
    /// canonical one
    ///
    /// Id lookups never redirect.
    pub fn needs_redirect(&self) -> bool {
        self.requested != self.canonical_slug && self.requested != self.site.business.id
    }
}

/// What a lookup is keyed by
#[derive(Debug, Clone, Copy)]
enum Lookup<'a> {
    Slug(&'a str),
    Id(&'a str),
}

impl<'a> Lookup<'a> {
    fn key(&self) -> &'a str {
        match self {
            Lookup::Slug(key) | Lookup::Id(key) => key,
        }
    }
}

/// Cached, rate-governed access to storefront sites
pub struct StorefrontService {
    store: Arc<dyn DocumentStore>,
    cache: Mutex<CacheStore>,
    governor: Mutex<ReadGovernor>,
    clock: Arc<dyn Clock>,
    config: SafetyConfig,
}

impl StorefrontService {
    /// Creates a service using wall-clock time
    pub fn new(store: Arc<dyn DocumentStore>, config: SafetyConfig) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    /// Creates a service with a custom time source
    pub fn with_clock(
        store: Arc<dyn DocumentStore>,
        config: SafetyConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            cache: Mutex::new(CacheStore::new(config.cache_freshness, clock.clone())),
            governor: Mutex::new(ReadGovernor::new(&config, clock.clone())),
            store,
            clock,
            config,
        }
    }

    fn cache(&self) -> MutexGuard<'_, CacheStore> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn governor(&self) -> MutexGuard<'_, ReadGovernor> {
        self.governor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &SafetyConfig {
        &self.config
    }

    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Owner-side edits that keep this service's cache coherent
    pub fn editor(&self) -> OwnerEditor<'_> {
        OwnerEditor::new(self)
    }

    /// Looks up the site published under `slug` (current or former)
    pub async fn resolve_website_by_slug(&self, slug: &str) -> Option<ResolvedWebsite> {
        self.resolve(Lookup::Slug(slug)).await
    }

    /// Looks up the site of the business owned by `business_id`
    pub async fn resolve_website_by_id(&self, business_id: &str) -> Option<ResolvedWebsite> {
        self.resolve(Lookup::Id(business_id)).await
    }

    async fn resolve(&self, lookup: Lookup<'_>) -> Option<ResolvedWebsite> {
        let key = lookup.key();

        let cached = self.cache().get(key);
        if let Some(site) = cached {
            tracing::debug!(key, "Cache hit");
            return Some(ResolvedWebsite::new(key, site, Served::Cache));
        }

        let admission = self.governor().check();
        if let Err(denial) = admission {
            let stale = self.cache().get_stale(key);
            tracing::info!(
                key,
                reason = %denial,
                stale_available = stale.is_some(),
                "Backend read denied"
            );
            return stale.map(|cached| ResolvedWebsite::new(key, cached.payload, Served::Stale));
        }

        match self.fetch(lookup).await {
            Ok(Some(site)) => {
                {
                    let mut cache = self.cache();
                    if !cache.contains_key(key) {
                        self.governor().maybe_evict(&mut cache);
                    }
                    cache.put(key, site.clone());
                }
                self.governor().record_read();
                tracing::debug!(key, items = site.items.len(), "Fetched site from backend");
                Some(ResolvedWebsite::new(key, site, Served::Backend))
            }
            Ok(None) => {
                // The queries still cost reads, even though nothing is cached
                self.governor().record_read();
                tracing::debug!(key, "No site found");
                None
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "Backend fault, reporting site unavailable");
                None
            }
        }
    }

    async fn fetch(&self, lookup: Lookup<'_>) -> Result<Option<WebsitePayload>, StoreError> {
        let store = self.store.as_ref();
        let found = match lookup {
            Lookup::Slug(slug) => resolver::resolve_slug(store, slug).await?,
            Lookup::Id(id) => resolver::resolve_id(store, id).await?,
        };
        let Some(found) = found else {
            return Ok(None);
        };
        assemble_payload(store, &found.id, &found.document, self.clock.as_ref()).await
    }

    /// Drops the cached copy stored under `key`
    pub fn invalidate(&self, key: &str) -> bool {
        let removed = self.cache().invalidate(key);
        if removed {
            tracing::debug!(key, "Invalidated cache entry");
        }
        removed
    }

    /// Drops every cached copy of a business: by id, current slug and old slugs
    pub fn invalidate_business(&self, business: &BusinessRecord) {
        let mut cache = self.cache();
        for key in business.cache_keys() {
            cache.invalidate(&key);
        }
        tracing::debug!(business_id = %business.id, "Invalidated business cache entries");
    }

    pub fn clear_cache(&self) {
        self.cache().clear_all();
        tracing::info!("Cleared site cache");
    }

    /// Current read usage and cache fill, without side effects
    pub fn governor_stats(&self) -> GovernorStats {
        let cache_size = self.cache().len();
        self.governor().stats(cache_size)
    }

    /// Cached entries, oldest first
    pub fn cache_entries(&self) -> Vec<EntryInfo> {
        self.cache().entries()
    }
}
