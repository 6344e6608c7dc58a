//! Firestore REST client
//!
//! Talks to the Firestore v1 REST API and converts its typed values
//! (`{"stringValue": "x"}`, `{"mapValue": {"fields": ...}}`, ...) to and from
//! plain JSON so the rest of the crate only ever sees [`Document`]s.

use futures::future::BoxFuture;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Number, Value};

use super::{subcollection_path, Document, DocumentStore, StoreError, StoredDocument};

/// Base URL of the Firestore REST API
const FIRESTORE_BASE_URL: &str = "https://firestore.googleapis.com/v1";

/// Page size used when listing collections
const LIST_PAGE_SIZE: u32 = 300;

/// A document as returned by the REST API
#[derive(Debug, Deserialize)]
struct RawDocument {
    /// Full resource name, ending in the document id
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

/// Response of a collection listing
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    documents: Vec<RawDocument>,
    next_page_token: Option<String>,
}

/// One element of a `:runQuery` response stream
#[derive(Debug, Deserialize)]
struct QueryResult {
    document: Option<RawDocument>,
}

/// Client for a Firestore database
#[derive(Debug, Clone)]
pub struct FirestoreStore {
    http_client: Client,
    /// `.../projects/<id>/databases/(default)/documents`
    documents_url: String,
    api_key: Option<String>,
    bearer_token: Option<String>,
}

impl FirestoreStore {
    /// Creates a client for the default database of `project_id`
    pub fn new(project_id: &str) -> Self {
        Self::with_base_url(FIRESTORE_BASE_URL, project_id)
    }

    /// Creates a client against a custom API root (emulator, tests)
    pub fn with_base_url(base_url: &str, project_id: &str) -> Self {
        Self {
            http_client: Client::new(),
            documents_url: format!(
                "{}/projects/{}/databases/(default)/documents",
                base_url.trim_end_matches('/'),
                project_id
            ),
            api_key: None,
            bearer_token: None,
        }
    }

    /// Sends `key=<api_key>` with every request
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Sends an OAuth bearer token with every request
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    fn document_url(&self, collection: &str, id: &str) -> String {
        format!("{}/{}/{}", self.documents_url, collection, id)
    }

    /// Adds credentials to a request
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let request = match &self.api_key {
            Some(key) => request.query(&[("key", key.as_str())]),
            None => request,
        };
        match &self.bearer_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, StoreError> {
        let response = self.authorize(request).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(StoreError::Status {
            status: status.as_u16(),
            message,
        })
    }

    async fn list_path(&self, path: &str) -> Result<Vec<StoredDocument>, StoreError> {
        let url = format!("{}/{}", self.documents_url, path);
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .http_client
                .get(&url)
                .query(&[("pageSize", LIST_PAGE_SIZE.to_string())]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let page: ListResponse = self.send(request).await?.json().await?;
            for raw in page.documents {
                documents.push(decode_document(raw)?);
            }

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(documents)
    }
}

impl DocumentStore for FirestoreStore {
    fn get_by_id<'a>(
        &'a self,
        collection: &'a str,
        id: &'a str,
    ) -> BoxFuture<'a, Result<Option<Document>, StoreError>> {
        Box::pin(async move {
            let request = self.http_client.get(self.document_url(collection, id));
            match self.send(request).await {
                Ok(response) => {
                    let raw: RawDocument = response.json().await?;
                    Ok(Some(decode_document(raw)?.1))
                }
                Err(StoreError::Status { status, .. })
                    if status == StatusCode::NOT_FOUND.as_u16() =>
                {
                    Ok(None)
                }
                Err(e) => Err(e),
            }
        })
    }

    fn query_equals<'a>(
        &'a self,
        collection: &'a str,
        field_path: &'a str,
        value: &'a Value,
    ) -> BoxFuture<'a, Result<Vec<StoredDocument>, StoreError>> {
        Box::pin(async move {
            let (parent, collection_id) = split_collection(collection);
            let url = match parent {
                Some(parent) => format!("{}/{}:runQuery", self.documents_url, parent),
                None => format!("{}:runQuery", self.documents_url),
            };
            let body = json!({
                "structuredQuery": {
                    "from": [{ "collectionId": collection_id }],
                    "where": {
                        "fieldFilter": {
                            "field": { "fieldPath": field_path },
                            "op": "EQUAL",
                            "value": encode_value(value),
                        }
                    }
                }
            });

            let request = self.http_client.post(url).json(&body);
            let results: Vec<QueryResult> = self.send(request).await?.json().await?;
            results
                .into_iter()
                .filter_map(|result| result.document)
                .map(decode_document)
                .collect()
        })
    }

    fn list_collection<'a>(
        &'a self,
        collection: &'a str,
    ) -> BoxFuture<'a, Result<Vec<StoredDocument>, StoreError>> {
        Box::pin(self.list_path(collection))
    }

    fn list_subcollection<'a>(
        &'a self,
        collection: &'a str,
        parent_id: &'a str,
        name: &'a str,
    ) -> BoxFuture<'a, Result<Vec<StoredDocument>, StoreError>> {
        Box::pin(async move {
            let path = subcollection_path(collection, parent_id, name);
            self.list_path(&path).await
        })
    }

    fn set_document<'a>(
        &'a self,
        collection: &'a str,
        id: &'a str,
        document: Document,
        merge: bool,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let mut request = self.http_client.patch(self.document_url(collection, id));
            if merge {
                let mask: Vec<(&str, &str)> = document
                    .keys()
                    .map(|field| ("updateMask.fieldPaths", field.as_str()))
                    .collect();
                request = request.query(&mask);
            }
            let body = json!({ "fields": encode_fields(&document) });
            self.send(request.json(&body)).await?;
            Ok(())
        })
    }

    fn delete_document<'a>(
        &'a self,
        collection: &'a str,
        id: &'a str,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let request = self.http_client.delete(self.document_url(collection, id));
            self.send(request).await?;
            Ok(())
        })
    }
}

/// Splits `users/abc/products` into (`Some("users/abc")`, `"products"`)
fn split_collection(collection: &str) -> (Option<&str>, &str) {
    match collection.rsplit_once('/') {
        Some((parent, id)) => (Some(parent), id),
        None => (None, collection),
    }
}

fn decode_document(raw: RawDocument) -> Result<StoredDocument, StoreError> {
    let id = raw
        .name
        .rsplit('/')
        .next()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| StoreError::Decode(format!("invalid document name: {}", raw.name)))?
        .to_string();
    Ok((id, decode_fields(&raw.fields)?))
}

fn decode_fields(fields: &Map<String, Value>) -> Result<Document, StoreError> {
    fields
        .iter()
        .map(|(name, value)| decode_value(value).map(|value| (name.clone(), value)))
        .collect()
}

/// Converts a Firestore typed value into plain JSON
///
/// Timestamps come back as RFC 3339 strings.
fn decode_value(value: &Value) -> Result<Value, StoreError> {
    let (kind, inner) = value
        .as_object()
        .and_then(|map| map.iter().next())
        .ok_or_else(|| StoreError::Decode(format!("expected typed value, got {}", value)))?;

    match (kind.as_str(), inner) {
        ("nullValue", _) => Ok(Value::Null),
        ("booleanValue", Value::Bool(b)) => Ok(Value::Bool(*b)),
        ("integerValue", Value::String(s)) => s
            .parse::<i64>()
            .map(Value::from)
            .map_err(|e| StoreError::Decode(format!("bad integerValue {}: {}", s, e))),
        ("integerValue", Value::Number(n)) => Ok(Value::Number(n.clone())),
        ("doubleValue", Value::Number(n)) => Ok(Value::Number(n.clone())),
        // NaN and infinities have no JSON number representation
        ("doubleValue", Value::String(_)) => Ok(Value::Null),
        ("stringValue", Value::String(s))
        | ("timestampValue", Value::String(s))
        | ("referenceValue", Value::String(s))
        | ("bytesValue", Value::String(s)) => Ok(Value::String(s.clone())),
        ("geoPointValue", point) => Ok(point.clone()),
        ("mapValue", map) => {
            let fields = map
                .get("fields")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            decode_fields(&fields).map(Value::Object)
        }
        ("arrayValue", array) => array
            .get("values")
            .and_then(Value::as_array)
            .map(|values| values.iter().map(decode_value).collect::<Result<Vec<_>, _>>())
            .unwrap_or_else(|| Ok(Vec::new()))
            .map(Value::Array),
        (kind, _) => Err(StoreError::Decode(format!("unsupported value type {}", kind))),
    }
}

fn encode_fields(document: &Document) -> Map<String, Value> {
    document
        .iter()
        .map(|(name, value)| (name.clone(), encode_value(value)))
        .collect()
}

/// Converts plain JSON into a Firestore typed value
fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => encode_number(n),
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(values) => {
            let values: Vec<Value> = values.iter().map(encode_value).collect();
            json!({ "arrayValue": { "values": values } })
        }
        Value::Object(map) => {
            let fields: Map<String, Value> = map
                .iter()
                .map(|(name, value)| (name.clone(), encode_value(value)))
                .collect();
            json!({ "mapValue": { "fields": fields } })
        }
    }
}

fn encode_number(n: &Number) -> Value {
    match n.as_i64() {
        Some(i) => json!({ "integerValue": i.to_string() }),
        None => json!({ "doubleValue": n }),
    }
}
