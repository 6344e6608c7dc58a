//! Static snapshot export
//!
//! Writes every onboarded business to `<id>.json` plus an `index.json` listing
//! them, so sites can be served from static files. This is an administrative
//! job: it reads the whole store and does not go through the read governor.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::clock::Clock;
use crate::data::{assemble_items, parse_business, Item, BUSINESS_COLLECTION, COMPANY_FIELD};
use crate::store::{DocumentStore, StoreError};

/// Errors that can occur during export
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One exported business file
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BusinessSnapshot<'a> {
    company_data: &'a Value,
    products: &'a [Item],
    last_updated: String,
}

/// Contents of `index.json`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotIndex {
    /// Exported business ids, in store listing order
    pub companies: Vec<String>,
    pub total_companies: usize,
    pub generated_at: String,
}

fn iso(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), SnapshotError> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).map_err(|source| SnapshotError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Exports every business with business attributes into `out_dir`
///
/// Business attributes are written as stored, with a derived slug filled in
/// where none was saved.
pub async fn export_snapshot(
    store: &dyn DocumentStore,
    clock: &dyn Clock,
    out_dir: &Path,
) -> Result<SnapshotIndex, SnapshotError> {
    fs::create_dir_all(out_dir).map_err(|source| SnapshotError::Write {
        path: out_dir.to_path_buf(),
        source,
    })?;

    let mut companies = Vec::new();
    for (id, document) in store.list_collection(BUSINESS_COLLECTION).await? {
        let Some(business) = parse_business(&id, &document) else {
            continue;
        };
        let mut company_data = document.get(COMPANY_FIELD).cloned().unwrap_or(Value::Null);
        if let Some(company) = company_data.as_object_mut() {
            let has_slug = company
                .get("slug")
                .and_then(Value::as_str)
                .is_some_and(|slug| !slug.is_empty());
            if !has_slug {
                company.insert("slug".into(), Value::String(business.slug.clone()));
            }
        }

        let products = assemble_items(store, &id, &document, clock).await?;
        let snapshot = BusinessSnapshot {
            company_data: &company_data,
            products: &products,
            last_updated: iso(clock.now()),
        };
        write_json(&out_dir.join(format!("{}.json", id)), &snapshot)?;
        tracing::debug!(business_id = %id, items = products.len(), "Exported business");
        companies.push(id);
    }

    let index = SnapshotIndex {
        total_companies: companies.len(),
        companies,
        generated_at: iso(clock.now()),
    };
    write_json(&out_dir.join("index.json"), &index)?;
    tracing::info!(
        total = index.total_companies,
        dir = %out_dir.display(),
        "Snapshot export complete"
    );
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::{Document, MemoryStore};
    use chrono::TimeZone;
    use serde_json::json;
    use tempfile::TempDir;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().expect("test document must be an object")
    }

    fn read_json(path: &Path) -> Value {
        let content = fs::read_to_string(path).expect("Should read file");
        serde_json::from_str(&content).expect("Should parse JSON")
    }

    #[tokio::test]
    async fn test_export_writes_business_files_and_index() {
        let store = MemoryStore::new();
        store.insert(
            "users",
            "u1",
            doc(json!({ "companyData": { "name": "Café Ön", "town": "Piteå" } })),
        );
        store.insert("users/u1/products", "p1", doc(json!({ "name": "Kaka", "price": 12 })));
        store.insert("users", "u2", doc(json!({ "email": "no-company@example.com" })));
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap());
        let dir = TempDir::new().unwrap();

        let index = export_snapshot(&store, &clock, dir.path()).await.unwrap();

        assert_eq!(index.companies, vec!["u1".to_string()]);
        assert_eq!(index.total_companies, 1);

        let business = read_json(&dir.path().join("u1.json"));
        assert_eq!(business["companyData"]["slug"], "caf-on");
        assert_eq!(business["products"][0]["name"], "Kaka");
        assert_eq!(business["lastUpdated"], "2025-06-01T12:00:00.000Z");
        assert!(!dir.path().join("u2.json").exists());

        let written = read_json(&dir.path().join("index.json"));
        assert_eq!(written["totalCompanies"], 1);
        assert_eq!(written["generatedAt"], "2025-06-01T12:00:00.000Z");
    }

    #[tokio::test]
    async fn test_export_keeps_stored_slug() {
        let store = MemoryStore::new();
        store.insert(
            "users",
            "u1",
            doc(json!({ "companyData": { "name": "Acme", "slug": "acme-umea" } })),
        );
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap());
        let dir = TempDir::new().unwrap();

        export_snapshot(&store, &clock, dir.path()).await.unwrap();

        let business = read_json(&dir.path().join("u1.json"));
        assert_eq!(business["companyData"]["slug"], "acme-umea");
        assert_eq!(business["products"], json!([]));
    }

    #[tokio::test]
    async fn test_export_fails_when_store_fails() {
        let store = MemoryStore::new();
        store.set_failing(true);
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap());
        let dir = TempDir::new().unwrap();

        let result = export_snapshot(&store, &clock, dir.path()).await;

        assert!(matches!(result, Err(SnapshotError::Store(_))));
    }
}
