//! Cache store for website payloads
//!
//! Provides a `CacheStore` mapping lookup keys to assembled payloads with the
//! time they were fetched, supporting stale reads when fresh data is
//! unavailable.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;

use crate::clock::Clock;
use crate::data::WebsitePayload;

/// A cached payload and when it was fetched
#[derive(Debug, Clone)]
struct CacheEntry {
    payload: WebsitePayload,
    fetched_at: DateTime<Utc>,
}

/// Result of a stale-tolerant read
#[derive(Debug, Clone)]
pub struct CachedPayload {
    pub payload: WebsitePayload,
    pub fetched_at: DateTime<Utc>,
    /// Whether the entry is past the freshness window
    pub is_expired: bool,
}

/// Summary of one entry, for display
#[derive(Debug, Clone, PartialEq)]
pub struct EntryInfo {
    pub key: String,
    pub age: Duration,
    pub is_fresh: bool,
}

/// Maps lookup keys to website payloads
///
/// An entry is fresh while `now - fetched_at < freshness`; at exactly the
/// window it counts as expired.
pub struct CacheStore {
    entries: HashMap<String, CacheEntry>,
    freshness: Duration,
    clock: Arc<dyn Clock>,
}

impl CacheStore {
    /// Creates an empty store
    pub fn new(freshness: std::time::Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: HashMap::new(),
            freshness: Duration::from_std(freshness).unwrap_or(Duration::MAX),
            clock,
        }
    }

    fn is_fresh(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        now - entry.fetched_at < self.freshness
    }

    /// Returns the payload for `key` if it is present and fresh
    ///
    /// Missing and expired entries both give `None`.
    pub fn get(&self, key: &str) -> Option<WebsitePayload> {
        let entry = self.entries.get(key)?;
        if self.is_fresh(entry, self.clock.now()) {
            Some(entry.payload.clone())
        } else {
            None
        }
    }

    /// Returns the entry for `key` whatever its age
    pub fn get_stale(&self, key: &str) -> Option<CachedPayload> {
        let entry = self.entries.get(key)?;
        Some(CachedPayload {
            payload: entry.payload.clone(),
            fetched_at: entry.fetched_at,
            is_expired: !self.is_fresh(entry, self.clock.now()),
        })
    }

    /// Inserts or replaces the payload for `key`, stamped now
    pub fn put(&mut self, key: &str, payload: WebsitePayload) {
        let entry = CacheEntry {
            payload,
            fetched_at: self.clock.now(),
        };
        self.entries.insert(key.to_string(), entry);
    }

    /// Removes the oldest `ceil(len * fraction)` entries
    ///
    /// Returns how many entries were removed.
    pub fn evict_oldest(&mut self, fraction: f64) -> usize {
        let len = self.entries.len();
        let count = ((len as f64) * fraction.clamp(0.0, 1.0)).ceil() as usize;
        let count = count.min(len);
        if count == 0 {
            return 0;
        }

        let mut by_age: Vec<(DateTime<Utc>, String)> = self
            .entries
            .iter()
            .map(|(key, entry)| (entry.fetched_at, key.clone()))
            .collect();
        by_age.sort();

        for (_, key) in by_age.into_iter().take(count) {
            self.entries.remove(&key);
        }
        count
    }

    /// Removes the entry for `key`; returns whether one existed
    pub fn invalidate(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Removes every entry
    pub fn clear_all(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Lists entries oldest first
    pub fn entries(&self) -> Vec<EntryInfo> {
        let now = self.clock.now();
        let mut infos: Vec<(DateTime<Utc>, EntryInfo)> = self
            .entries
            .iter()
            .map(|(key, entry)| {
                let info = EntryInfo {
                    key: key.clone(),
                    age: now - entry.fetched_at,
                    is_fresh: self.is_fresh(entry, now),
                };
                (entry.fetched_at, info)
            })
            .collect();
        infos.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.key.cmp(&b.1.key)));
        infos.into_iter().map(|(_, info)| info).collect()
    }
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("len", &self.entries.len())
            .field("freshness", &self.freshness)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::data::BusinessRecord;
    use chrono::TimeZone;
    use std::time::Duration as StdDuration;

    fn payload(slug: &str) -> WebsitePayload {
        WebsitePayload {
            business: BusinessRecord {
                id: format!("id-{}", slug),
                name: slug.to_string(),
                town: "Town".to_string(),
                description: None,
                swish_number: None,
                instagram: None,
                facebook: None,
                tiktok: None,
                owners: Vec::new(),
                slug: slug.to_string(),
                old_slugs: Vec::new(),
            },
            items: Vec::new(),
        }
    }

    fn create_test_cache(freshness_secs: u64) -> (CacheStore, ManualClock) {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap());
        let cache = CacheStore::new(
            StdDuration::from_secs(freshness_secs),
            Arc::new(clock.clone()),
        );
        (cache, clock)
    }

    #[test]
    fn test_get_returns_none_for_missing_key() {
        let (cache, _clock) = create_test_cache(60);
        assert!(cache.get("nope").is_none());
    }

    #[test]
    fn test_get_returns_fresh_payload() {
        let (mut cache, clock) = create_test_cache(60);
        cache.put("acme", payload("acme"));

        clock.advance(Duration::seconds(59));

        assert_eq!(cache.get("acme"), Some(payload("acme")));
    }

    #[test]
    fn test_entry_at_exact_window_is_expired() {
        let (mut cache, clock) = create_test_cache(60);
        cache.put("acme", payload("acme"));

        clock.advance(Duration::seconds(60));

        assert!(cache.get("acme").is_none(), "Boundary should be exclusive");
        let stale = cache.get_stale("acme").expect("Stale entry should remain");
        assert!(stale.is_expired);
        assert_eq!(stale.payload, payload("acme"));
    }

    #[test]
    fn test_get_stale_reports_fresh_entries() {
        let (mut cache, _clock) = create_test_cache(60);
        cache.put("acme", payload("acme"));
        assert!(!cache.get_stale("acme").unwrap().is_expired);
    }

    #[test]
    fn test_put_overwrites_and_restamps() {
        let (mut cache, clock) = create_test_cache(60);
        cache.put("acme", payload("old"));
        clock.advance(Duration::seconds(50));
        cache.put("acme", payload("new"));
        clock.advance(Duration::seconds(50));

        assert_eq!(cache.get("acme"), Some(payload("new")));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_invalidate_removes_fresh_entry() {
        let (mut cache, _clock) = create_test_cache(60);
        cache.put("acme", payload("acme"));

        assert!(cache.invalidate("acme"));
        assert!(!cache.invalidate("acme"));
        assert!(cache.get("acme").is_none());
        assert!(cache.get_stale("acme").is_none());
    }

    #[test]
    fn test_evict_oldest_removes_ceil_fraction_by_age() {
        let (mut cache, clock) = create_test_cache(600);
        for slug in ["a", "b", "c", "d", "e", "f", "g"] {
            cache.put(slug, payload(slug));
            clock.advance(Duration::seconds(1));
        }

        // ceil(7 * 0.2) = 2
        let removed = cache.evict_oldest(0.2);

        assert_eq!(removed, 2);
        assert_eq!(cache.len(), 5);
        assert!(!cache.contains_key("a"));
        assert!(!cache.contains_key("b"));
        assert!(cache.contains_key("c"));
    }

    #[test]
    fn test_evict_oldest_on_single_entry_removes_it() {
        let (mut cache, _clock) = create_test_cache(600);
        cache.put("only", payload("only"));
        assert_eq!(cache.evict_oldest(0.2), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_evict_oldest_on_empty_cache() {
        let (mut cache, _clock) = create_test_cache(600);
        assert_eq!(cache.evict_oldest(0.2), 0);
    }

    #[test]
    fn test_clear_all() {
        let (mut cache, _clock) = create_test_cache(60);
        cache.put("a", payload("a"));
        cache.put("b", payload("b"));
        cache.clear_all();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_entries_lists_oldest_first_with_freshness() {
        let (mut cache, clock) = create_test_cache(60);
        cache.put("old", payload("old"));
        clock.advance(Duration::seconds(90));
        cache.put("new", payload("new"));
        clock.advance(Duration::seconds(10));

        let entries = cache.entries();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].key, "old");
        assert!(!entries[0].is_fresh);
        assert_eq!(entries[0].age, Duration::seconds(100));
        assert_eq!(entries[1].key, "new");
        assert!(entries[1].is_fresh);
    }
}
