// Navigable documents built from API responses
// Nested objects become sub-documents typed through the class mapping, resource
// links under "resources" become fetchable, and fetched documents are cached per
// instance against the ETag they came with

use parking_lot::Mutex;
use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

use crate::client::{Client, FetchOutcome};
use crate::config::{ClassMapping, DocumentKind};
use crate::errors::{Result, TapiError};
use crate::utils::{Param, Params};

const RESOURCES: &str = "resources";
const FETCH_PREFIX: &str = "fetch_";
const URL_SUFFIX: &str = "_url";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
    Document(Document),
    List(Vec<Value>),
}

impl Value {
    // Objects anywhere below `field` take the kind mapped for that field
    fn build(field: &str, value: serde_json::Value, mapping: &ClassMapping) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(flag) => Value::Bool(flag),
            serde_json::Value::Number(number) => Value::Number(number),
            // serde_json only hands out valid UTF-8
            serde_json::Value::String(text) => Value::Text(text),
            serde_json::Value::Object(map) => Value::Document(Document::from_map(
                map,
                mapping.kind_for(field),
                None,
                false,
                mapping,
            )),
            serde_json::Value::Array(items) => Value::List(
                items
                    .into_iter()
                    .map(|item| Value::build(field, item, mapping))
                    .collect(),
            ),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Number(number) => number.as_i64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(number) => number.as_f64(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(flag) => Some(*flag),
            _ => None,
        }
    }

    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Value::Document(document) => Some(document),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn to_json_value(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(flag) => serde_json::Value::Bool(*flag),
            Value::Number(number) => serde_json::Value::Number(number.clone()),
            Value::Text(text) => serde_json::Value::String(text.clone()),
            Value::Document(document) => document.to_json_value(),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json_value).collect())
            }
        }
    }

    // Text rendering used for ids and parameters
    fn to_text(&self) -> Option<String> {
        match self {
            Value::Text(text) => Some(text.clone()),
            Value::Number(number) => Some(number.to_string()),
            Value::Bool(flag) => Some(flag.to_string()),
            _ => None,
        }
    }
}

// Knobs for a resource fetch; the control flags never reach the query or the cache key
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub params: Params,
    pub instantiate_as: Option<DocumentKind>,
    // Serve a cached document without touching the network
    pub skip_refresh: bool,
    // Fetch unconditionally and leave the cache alone
    pub skip_cache: bool,
}

impl FetchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<Param>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn instantiated_as(mut self, kind: DocumentKind) -> Self {
        self.instantiate_as = Some(kind);
        self
    }

    pub fn skipping_refresh(mut self) -> Self {
        self.skip_refresh = true;
        self
    }

    pub fn skipping_cache(mut self) -> Self {
        self.skip_cache = true;
        self
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    etag: String,
    document: Arc<Document>,
}

// Field lookup that may have gone to the network
#[derive(Debug)]
pub enum Resolved<'a> {
    Field(&'a Value),
    Fetched(Arc<Document>),
}

#[derive(Debug)]
pub struct Document {
    kind: DocumentKind,
    fields: BTreeMap<String, Value>,
    etag: Option<String>,
    root: bool,
    remote_cache: Mutex<HashMap<String, CacheEntry>>,
}

// A copy is a new instance and starts with its own, empty cache
impl Clone for Document {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind.clone(),
            fields: self.fields.clone(),
            etag: self.etag.clone(),
            root: self.root,
            remote_cache: Mutex::new(HashMap::new()),
        }
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.fields == other.fields && self.etag == other.etag
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(&self.fields)
    }
}

impl Document {
    pub fn from_json(
        value: serde_json::Value,
        kind: DocumentKind,
        etag: Option<String>,
        is_root: bool,
        mapping: &ClassMapping,
    ) -> Result<Self> {
        match value {
            serde_json::Value::Object(map) => {
                Ok(Self::from_map(map, kind, etag, is_root, mapping))
            }
            other => Err(TapiError::TypeMismatch(format!(
                "a document needs a JSON object, got {}",
                other
            ))),
        }
    }

    // Parses a response body into a root document
    pub fn parse(
        body: &str,
        kind: DocumentKind,
        etag: Option<String>,
        mapping: &ClassMapping,
    ) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(body)?;
        Self::from_json(value, kind, etag, true, mapping)
    }

    fn from_map(
        map: serde_json::Map<String, serde_json::Value>,
        kind: DocumentKind,
        etag: Option<String>,
        root: bool,
        mapping: &ClassMapping,
    ) -> Self {
        let fields = map
            .into_iter()
            .map(|(key, value)| {
                let value = Value::build(&key, value, mapping);
                (key, value)
            })
            .collect();

        Self {
            kind,
            fields,
            etag,
            root,
            remote_cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn kind(&self) -> &DocumentKind {
        &self.kind
    }

    pub fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    pub fn is_root(&self) -> bool {
        self.root
    }

    pub fn attributes(&self) -> Vec<&str> {
        self.fields.keys().map(String::as_str).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    // Stored field or MethodNotFound naming this document's kind
    pub fn field(&self, name: &str) -> Result<&Value> {
        self.fields
            .get(name)
            .ok_or_else(|| TapiError::method_not_found(name, self.kind.name()))
    }

    pub fn document(&self, name: &str) -> Option<&Document> {
        self.get(name).and_then(Value::as_document)
    }

    // Moves a sub-document out of this one
    pub fn into_document(mut self, name: &str) -> Result<Document> {
        match self.fields.remove(name) {
            Some(Value::Document(document)) => Ok(document),
            Some(other) => Err(TapiError::TypeMismatch(format!(
                "`{}' is not a document: {:?}",
                name, other
            ))),
            None => Err(TapiError::method_not_found(name, self.kind.name())),
        }
    }

    pub fn id(&self) -> Option<String> {
        self.get("id").and_then(Value::to_text)
    }

    pub fn to_param(&self) -> Option<String> {
        self.id()
    }

    // Resource links; a document wrapping a search answers with the search's links
    pub fn urls(&self) -> BTreeMap<String, String> {
        if let Some(search) = self.document("search") {
            return search.urls();
        }

        match self.document(RESOURCES) {
            Some(resources) => resources
                .fields
                .iter()
                .filter_map(|(key, value)| value.as_str().map(|url| (key.clone(), url.to_string())))
                .collect(),
            None => BTreeMap::new(),
        }
    }

    pub fn remote_calls(&self) -> Vec<String> {
        let mut calls: Vec<String> = self
            .urls()
            .keys()
            .filter_map(|key| key.strip_suffix(URL_SUFFIX))
            .map(|base| format!("{}{}", FETCH_PREFIX, base))
            .collect();
        calls.sort();
        calls
    }

    // Accepts either `fetch_<name>` or the bare resource name
    pub fn resource_url(&self, name: &str) -> Option<String> {
        let base = name.strip_prefix(FETCH_PREFIX).unwrap_or(name);
        self.urls().remove(&format!("{}{}", base, URL_SUFFIX))
    }

    pub fn responds_to(&self, name: &str) -> bool {
        self.fields.contains_key(name)
            || (name.starts_with(FETCH_PREFIX) && self.resource_url(name).is_some())
    }

    pub fn to_json_value(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.fields
                .iter()
                .map(|(key, value)| (key.clone(), value.to_json_value()))
                .collect(),
        )
    }

    pub fn to_json(&self) -> String {
        self.to_json_value().to_string()
    }

    // Stored field first, then a `fetch_<name>` resource link
    pub async fn resolve(
        &self,
        client: &Client,
        name: &str,
        options: FetchOptions,
    ) -> Result<Resolved<'_>> {
        if let Some(value) = self.fields.get(name) {
            return Ok(Resolved::Field(value));
        }
        if !name.starts_with(FETCH_PREFIX) {
            return Err(TapiError::method_not_found(name, self.kind.name()));
        }
        self.fetch_resource(client, name, options)
            .await
            .map(Resolved::Fetched)
    }

    pub async fn fetch_resource(
        &self,
        client: &Client,
        name: &str,
        options: FetchOptions,
    ) -> Result<Arc<Document>> {
        let url = self
            .resource_url(name)
            .ok_or_else(|| TapiError::method_not_found(name, self.kind.name()))?;

        let call = if name.starts_with(FETCH_PREFIX) {
            name.to_string()
        } else {
            format!("{}{}", FETCH_PREFIX, name)
        };
        let kind = client.config().class_mapping.kind_for(&call);

        self.fetch(client, &url, kind, options).await
    }

    // Conditional GET against this document's cache
    pub async fn fetch(
        &self,
        client: &Client,
        url: &str,
        kind: DocumentKind,
        options: FetchOptions,
    ) -> Result<Arc<Document>> {
        let FetchOptions {
            params,
            instantiate_as,
            skip_refresh,
            skip_cache,
        } = options;
        let kind = instantiate_as.unwrap_or(kind);

        let cache_key = cache_fingerprint(url, &params);
        let cached = self.remote_cache.lock().get(&cache_key).cloned();

        if skip_refresh {
            if let Some(entry) = cached {
                debug!(url = %url, "Skipping refresh. Returning data from internal cache.");
                return Ok(entry.document);
            }
        }

        if skip_cache {
            return match client.new_from_get(url, &params, kind, None).await? {
                FetchOutcome::Fetched { document, .. } => Ok(Arc::new(document)),
                FetchOutcome::Unchanged { .. } => Err(TapiError::NotCached(url.to_string())),
            };
        }

        let old_etag = cached.as_ref().map(|entry| entry.etag.clone());
        let outcome = client
            .new_from_get(url, &params, kind, old_etag.as_deref())
            .await?;
        match outcome {
            FetchOutcome::Unchanged { .. } => {
                debug!(url = %url, "ETag match. Returning data from internal cache.");
                cached
                    .map(|entry| entry.document)
                    .ok_or_else(|| TapiError::NotCached(url.to_string()))
            }
            FetchOutcome::Fetched { document, etag } => {
                debug!(url = %url, "Returning fetched data.");
                let document = Arc::new(document);
                if let Some(etag) = etag {
                    self.remote_cache.lock().insert(
                        cache_key,
                        CacheEntry {
                            etag,
                            document: Arc::clone(&document),
                        },
                    );
                }
                Ok(document)
            }
        }
    }

    pub fn cached_etag(&self, url: &str, params: &Params) -> Option<String> {
        self.remote_cache
            .lock()
            .get(&cache_fingerprint(url, params))
            .map(|entry| entry.etag.clone())
    }
}

// SHA-256 over the url and the key-sorted params
pub fn cache_fingerprint(url: &str, params: &Params) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    for (key, value) in params {
        hasher.update([0u8]);
        hasher.update(key.as_bytes());
        hasher.update([b'=']);
        hasher.update(format!("{:?}", value).as_bytes());
    }
    hex::encode(hasher.finalize())
}
