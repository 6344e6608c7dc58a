//! In-memory cache of assembled storefront sites
//!
//! Entries are keyed by slug or business id and stamped with the time they were
//! fetched. Freshness is checked lazily on read; nothing expires in the
//! background. Expired entries stay reachable through
//! [`CacheStore::get_stale`] so a visitor can still be served something when
//! the read governor refuses a backend read.

mod store;

pub use store::{CacheStore, CachedPayload, EntryInfo};
