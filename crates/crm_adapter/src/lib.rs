#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use crm_contracts::access::AccessGateState;
use crm_contracts::documents::CollectionId;
use crm_contracts::pagination::{PaginatedResult, PaginationState, MAX_PAGE_SIZE};
use crm_contracts::UnixTimeMs;
use crm_engines::document_store::{Document, DocumentStoreError, DocumentStoreRuntime};
use crm_os::access_gate::{AccessGate, AccessGateConfig};
use crm_os::collection_pages::CollectionPageFetcher;
use crm_os::pagination::{default_page_size_from_env, PaginatedQueryController};
use crm_storage::{FileKeyValueStore, KeyValueStore};

pub type AdapterPersistence = Box<dyn KeyValueStore + Send>;
pub type AdapterGate = AccessGate<DocumentStoreRuntime, AdapterPersistence>;

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("access gate is locked")]
    GateLocked,
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Store(#[from] DocumentStoreError),
}

impl AdapterError {
    pub fn http_status_code(&self) -> u16 {
        match self {
            Self::GateLocked => 403,
            Self::InvalidRequest(_) => 400,
            Self::Store(DocumentStoreError::Status { code, .. }) if *code == 404 => 404,
            Self::Store(_) => 502,
        }
    }

    pub fn outcome(&self) -> &'static str {
        match self {
            Self::GateLocked => "GATE_LOCKED",
            Self::InvalidRequest(_) => "REJECTED",
            Self::Store(_) => "STORE_FAILED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AdapterHealthResponse {
    pub status: String,
    pub outcome: String,
    pub document_store: String,
    pub gate_state: String,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct GateVerifyRequest {
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct GateStatusResponse {
    pub status: String,
    pub outcome: String,
    pub authorized: bool,
    pub authorized_until_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageAction {
    Next,
    Prev,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct CollectionPageQuery {
    pub page: Option<i64>,
    pub page_size: Option<u32>,
    pub action: Option<PageAction>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CollectionPageResponse {
    pub status: String,
    pub collection_id: String,
    pub documents: Vec<Document>,
    pub pagination: PaginationState,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AdapterErrorResponse {
    pub status: String,
    pub outcome: String,
    pub reason: String,
}

impl From<&AdapterError> for AdapterErrorResponse {
    fn from(err: &AdapterError) -> Self {
        Self {
            status: "error".to_string(),
            outcome: err.outcome().to_string(),
            reason: err.to_string(),
        }
    }
}

/// Owns the device gate plus one page cursor per browsed collection.
pub struct AdapterRuntime {
    gate: AdapterGate,
    pagers: BTreeMap<CollectionId, PaginatedQueryController>,
    default_page_size: u32,
}

impl AdapterRuntime {
    pub fn new(
        config: AccessGateConfig,
        store: DocumentStoreRuntime,
        persistence: AdapterPersistence,
        default_page_size: u32,
        now: UnixTimeMs,
    ) -> Self {
        Self {
            gate: AccessGate::new(config, store, persistence, now),
            pagers: BTreeMap::new(),
            default_page_size: default_page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn default_from_env() -> Result<Self, String> {
        let config = AccessGateConfig::from_env().map_err(|e| format!("invalid gate config: {e}"))?;
        let store = DocumentStoreRuntime::from_env().map_err(|e| e.to_string())?;
        let persistence = FileKeyValueStore::default_local();
        tracing::info!(
            document_store = store.kind_label(),
            local_store = %persistence.path().display(),
            database_id = %config.database_id,
            "crm adapter runtime configured"
        );
        Ok(Self::new(
            config,
            store,
            Box::new(persistence),
            default_page_size_from_env(),
            UnixTimeMs::now(),
        ))
    }

    pub fn health_report(&self) -> AdapterHealthResponse {
        AdapterHealthResponse {
            status: "ok".to_string(),
            outcome: "HEALTHY".to_string(),
            document_store: self.gate.document_store().kind_label().to_string(),
            gate_state: self.gate.state().as_str().to_string(),
        }
    }

    pub fn gate_status(&mut self, now: UnixTimeMs) -> GateStatusResponse {
        self.gate.check_stored_authorization(now);
        self.gate_status_snapshot()
    }

    pub fn verify_access_code(
        &mut self,
        request: &GateVerifyRequest,
        now: UnixTimeMs,
    ) -> GateStatusResponse {
        self.gate.verify_access_code(&request.code, now);
        self.gate_status_snapshot()
    }

    pub fn reset_gate(&mut self) -> GateStatusResponse {
        self.gate.reset_authorization();
        self.pagers.clear();
        self.gate_status_snapshot()
    }

    pub fn list_collection_page(
        &mut self,
        collection_id: &str,
        query: &CollectionPageQuery,
        now: UnixTimeMs,
    ) -> Result<CollectionPageResponse, AdapterError> {
        if !self.gate.check_stored_authorization(now) {
            return Err(AdapterError::GateLocked);
        }
        let collection_id = CollectionId::new(collection_id)
            .map_err(|e| AdapterError::InvalidRequest(e.to_string()))?;
        if let Some(size) = query.page_size {
            if !(1..=MAX_PAGE_SIZE).contains(&size) {
                return Err(AdapterError::InvalidRequest(format!(
                    "page_size must be within 1..={MAX_PAGE_SIZE}"
                )));
            }
        }

        let fresh = PaginatedQueryController::new(self.default_page_size)
            .map_err(|e| AdapterError::InvalidRequest(e.to_string()))?;
        let pager = self
            .pagers
            .entry(collection_id.clone())
            .or_insert(fresh);
        if let Some(size) = query.page_size.filter(|s| *s != pager.page_size()) {
            pager
                .set_page_size(size)
                .map_err(|e| AdapterError::InvalidRequest(e.to_string()))?;
        }

        let fetcher = CollectionPageFetcher::new(
            self.gate.document_store(),
            self.gate.config().database_id.clone(),
            collection_id.clone(),
        );
        let result: PaginatedResult<Document> = match (query.action, query.page) {
            (Some(action), _) => {
                if !pager.has_result() {
                    pager.fetch(|r| fetcher.fetch_page(r))?;
                }
                match action {
                    PageAction::Next => pager.next_page(),
                    PageAction::Prev => pager.prev_page(),
                }
                pager.fetch(|r| fetcher.fetch_page(r))?
            }
            (None, Some(page)) => pager.fetch_page_at(page, |r| fetcher.fetch_page(r))?,
            (None, None) => pager.fetch(|r| fetcher.fetch_page(r))?,
        };

        Ok(CollectionPageResponse {
            status: "ok".to_string(),
            collection_id: collection_id.as_str().to_string(),
            documents: result.data,
            pagination: result.pagination,
        })
    }

    fn gate_status_snapshot(&self) -> GateStatusResponse {
        let state = self.gate.state();
        GateStatusResponse {
            status: "ok".to_string(),
            outcome: state.as_str().to_string(),
            authorized: state == AccessGateState::Authorized,
            authorized_until_ms: self.gate.authorized_until().map(|t| t.0),
        }
    }
}
