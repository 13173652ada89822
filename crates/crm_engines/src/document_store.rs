#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::env;
use std::time::Duration;

use crm_contracts::documents::{CollectionId, DatabaseId};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

pub const DOCUMENT_STORE_DEFAULT_LIMIT: u32 = 25;
pub const DOCUMENT_STORE_CONNECT_TIMEOUT_MS_DEFAULT: u64 = 3_000;
pub const DOCUMENT_STORE_REQUEST_TIMEOUT_MS_DEFAULT: u64 = 10_000;

const ERROR_MESSAGE_MAX_CHARS: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentQuery {
    Equal { attribute: String, value: String },
    Limit(u32),
    Offset(u64),
}

impl DocumentQuery {
    pub fn equal(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Equal {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Wire form accepted in `queries[]` by the backend's REST API.
    pub fn to_wire(&self) -> String {
        let v = match self {
            Self::Equal { attribute, value } => {
                json!({ "method": "equal", "attribute": attribute, "values": [value] })
            }
            Self::Limit(n) => json!({ "method": "limit", "values": [n] }),
            Self::Offset(n) => json!({ "method": "offset", "values": [n] }),
        };
        v.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "$id")]
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    pub fn field_str(&self, attribute: &str) -> Option<&str> {
        self.fields.get(attribute).and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DocumentList {
    pub total: u64,
    pub documents: Vec<Document>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DocumentStoreError {
    #[error("document store returned http status {code}: {message}")]
    Status { code: u16, message: String },
    #[error("document store transport error: {0}")]
    Transport(String),
    #[error("document store response decode failed: {0}")]
    Decode(String),
    #[error("document store request invalid: {0}")]
    InvalidRequest(String),
    #[error("document store unavailable: {0}")]
    Unavailable(String),
    #[error("document store not configured: {0}")]
    NotConfigured(String),
}

impl DocumentStoreError {
    fn status(code: u16, message: impl Into<String>) -> Self {
        Self::Status {
            code,
            message: bounded_message(message.into()),
        }
    }
}

/// Remote document store consumed by the gate and the collection pager.
pub trait DocumentStore {
    fn list_documents(
        &self,
        database_id: &DatabaseId,
        collection_id: &CollectionId,
        queries: &[DocumentQuery],
    ) -> Result<DocumentList, DocumentStoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpDocumentStoreConfig {
    pub endpoint: String,
    pub project_id: String,
    pub api_key: Option<String>,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
}

impl HttpDocumentStoreConfig {
    pub fn from_env() -> Option<Self> {
        let endpoint = non_empty_env("CRM_BACKEND_ENDPOINT")?;
        let Some(project_id) = non_empty_env("CRM_BACKEND_PROJECT_ID") else {
            tracing::warn!("CRM_BACKEND_ENDPOINT is set without CRM_BACKEND_PROJECT_ID; ignoring");
            return None;
        };
        let api_key = non_empty_env("CRM_BACKEND_API_KEY");
        let connect_timeout_ms = env::var("CRM_BACKEND_CONNECT_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| (100..=60_000).contains(v))
            .unwrap_or(DOCUMENT_STORE_CONNECT_TIMEOUT_MS_DEFAULT);
        let request_timeout_ms = env::var("CRM_BACKEND_REQUEST_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| (100..=120_000).contains(v))
            .unwrap_or(DOCUMENT_STORE_REQUEST_TIMEOUT_MS_DEFAULT);

        Some(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            project_id,
            api_key,
            connect_timeout_ms,
            request_timeout_ms,
        })
    }
}

#[derive(Debug, Clone)]
pub struct HttpDocumentStore {
    config: HttpDocumentStoreConfig,
    agent: ureq::Agent,
}

impl HttpDocumentStore {
    pub fn new(config: HttpDocumentStoreConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_millis(config.connect_timeout_ms))
            .timeout_read(Duration::from_millis(config.request_timeout_ms))
            .timeout_write(Duration::from_millis(config.request_timeout_ms))
            .build();
        Self { config, agent }
    }
}

impl DocumentStore for HttpDocumentStore {
    fn list_documents(
        &self,
        database_id: &DatabaseId,
        collection_id: &CollectionId,
        queries: &[DocumentQuery],
    ) -> Result<DocumentList, DocumentStoreError> {
        let url = build_list_documents_url(
            &self.config.endpoint,
            database_id,
            collection_id,
            queries,
        )?;
        let mut req = self
            .agent
            .get(&url)
            .set("content-type", "application/json")
            .set("x-appwrite-project", &self.config.project_id);
        if let Some(key) = self.config.api_key.as_ref() {
            req = req.set("x-appwrite-key", key);
        }
        tracing::debug!(%database_id, %collection_id, queries = queries.len(), "listing documents");
        match req.call() {
            Ok(resp) => {
                let body = resp
                    .into_string()
                    .map_err(|err| DocumentStoreError::Transport(err.to_string()))?;
                parse_document_list(&body)
            }
            Err(ureq::Error::Status(code, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                Err(DocumentStoreError::status(code, error_message_from_body(&body)))
            }
            Err(ureq::Error::Transport(err)) => Err(DocumentStoreError::Transport(
                bounded_message(err.to_string()),
            )),
        }
    }
}

pub fn build_list_documents_url(
    endpoint: &str,
    database_id: &DatabaseId,
    collection_id: &CollectionId,
    queries: &[DocumentQuery],
) -> Result<String, DocumentStoreError> {
    let base = format!(
        "{}/databases/{}/collections/{}/documents",
        endpoint.trim_end_matches('/'),
        database_id.as_str(),
        collection_id.as_str()
    );
    let mut url = url::Url::parse(&base)
        .map_err(|err| DocumentStoreError::InvalidRequest(format!("bad endpoint: {err}")))?;
    if !queries.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for q in queries {
            pairs.append_pair("queries[]", &q.to_wire());
        }
    }
    Ok(url.into())
}

pub fn parse_document_list(body: &str) -> Result<DocumentList, DocumentStoreError> {
    serde_json::from_str::<DocumentList>(body)
        .map_err(|err| DocumentStoreError::Decode(bounded_message(err.to_string())))
}

fn error_message_from_body(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

fn bounded_message(msg: String) -> String {
    if msg.chars().count() > ERROR_MESSAGE_MAX_CHARS {
        msg.chars().take(ERROR_MESSAGE_MAX_CHARS).collect()
    } else {
        msg
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name).ok().and_then(|v| {
        let s = v.trim().to_string();
        if s.is_empty() {
            None
        } else {
            Some(s)
        }
    })
}

/// Seeded collections with the same equal/limit/offset semantics as the backend.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDocumentStore {
    collections: BTreeMap<(DatabaseId, CollectionId), Vec<Document>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_document(
        &mut self,
        database_id: &DatabaseId,
        collection_id: &CollectionId,
        document: Document,
    ) {
        self.collections
            .entry((database_id.clone(), collection_id.clone()))
            .or_default()
            .push(document);
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn list_documents(
        &self,
        database_id: &DatabaseId,
        collection_id: &CollectionId,
        queries: &[DocumentQuery],
    ) -> Result<DocumentList, DocumentStoreError> {
        let Some(rows) = self
            .collections
            .get(&(database_id.clone(), collection_id.clone()))
        else {
            return Err(DocumentStoreError::status(
                404,
                format!("collection {collection_id} not found"),
            ));
        };

        let mut limit = DOCUMENT_STORE_DEFAULT_LIMIT as usize;
        let mut offset = 0usize;
        let mut filters = Vec::new();
        for q in queries {
            match q {
                DocumentQuery::Equal { attribute, value } => filters.push((attribute, value)),
                DocumentQuery::Limit(n) => limit = *n as usize,
                DocumentQuery::Offset(n) => {
                    offset = usize::try_from(*n).unwrap_or(usize::MAX);
                }
            }
        }

        let matching: Vec<&Document> = rows
            .iter()
            .filter(|doc| {
                filters
                    .iter()
                    .all(|(attribute, value)| field_equals(doc, attribute, value))
            })
            .collect();
        let total = matching.len() as u64;
        let documents = matching
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();
        Ok(DocumentList { total, documents })
    }
}

fn field_equals(doc: &Document, attribute: &str, value: &str) -> bool {
    match doc.fields.get(attribute) {
        Some(Value::String(s)) => s == value,
        Some(Value::Null) | None => false,
        Some(other) => other.to_string() == value,
    }
}

#[derive(Debug, Clone)]
pub enum DocumentStoreRuntime {
    InMemory(InMemoryDocumentStore),
    Http(HttpDocumentStore),
    AlwaysFail { message: String },
}

impl DocumentStoreRuntime {
    /// Backend for the binaries. An unset endpoint is a configuration error:
    /// an empty in-memory store would deny every code.
    pub fn from_env() -> Result<Self, DocumentStoreError> {
        Self::from_http_config(HttpDocumentStoreConfig::from_env())
    }

    pub fn from_http_config(
        config: Option<HttpDocumentStoreConfig>,
    ) -> Result<Self, DocumentStoreError> {
        let config = config.ok_or_else(|| {
            DocumentStoreError::NotConfigured(
                "set CRM_BACKEND_ENDPOINT and CRM_BACKEND_PROJECT_ID".to_string(),
            )
        })?;
        Ok(Self::Http(HttpDocumentStore::new(config)))
    }

    pub fn always_fail(message: &str) -> Self {
        Self::AlwaysFail {
            message: message.to_string(),
        }
    }

    pub fn kind_label(&self) -> &'static str {
        match self {
            Self::InMemory(_) => "in_memory",
            Self::Http(_) => "http",
            Self::AlwaysFail { .. } => "always_fail",
        }
    }
}

impl DocumentStore for DocumentStoreRuntime {
    fn list_documents(
        &self,
        database_id: &DatabaseId,
        collection_id: &CollectionId,
        queries: &[DocumentQuery],
    ) -> Result<DocumentList, DocumentStoreError> {
        match self {
            Self::InMemory(store) => store.list_documents(database_id, collection_id, queries),
            Self::Http(store) => store.list_documents(database_id, collection_id, queries),
            Self::AlwaysFail { message } => Err(DocumentStoreError::Unavailable(message.clone())),
        }
    }
}
