#![forbid(unsafe_code)]

//! Shared access-code gate.
//!
//! A successful code lookup is remembered in the local key/value store for a
//! bounded window, so a device does not re-prompt on every start. The gate
//! never fails loudly: corrupt local state is deleted, backend failures read
//! as "denied".

use std::env;

use crm_contracts::access::{
    AccessAuthorization, AccessCode, AccessGateState, ACCESS_AUTHORIZATION_STORAGE_KEY,
    ACCESS_CODE_ATTRIBUTE,
};
use crm_contracts::documents::{CollectionId, DatabaseId};
use crm_contracts::{ContractViolation, UnixTimeMs};
use crm_engines::document_store::{DocumentQuery, DocumentStore};
use crm_storage::KeyValueStore;
use sha2::{Digest, Sha256};

pub const ACCESS_GATE_EXPIRATION_MS_DEFAULT: u64 = 24 * 60 * 60 * 1_000;
pub const ACCESS_GATE_EXPIRATION_MS_MIN: u64 = 1_000;
pub const ACCESS_GATE_EXPIRATION_MS_MAX: u64 = 30 * 24 * 60 * 60 * 1_000;
pub const DATABASE_ID_DEFAULT: &str = "crm";
pub const ACCESS_CODE_COLLECTION_ID_DEFAULT: &str = "access_codes";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessGateConfig {
    pub database_id: DatabaseId,
    pub access_code_collection_id: CollectionId,
    pub code_attribute: String,
    pub expiration_window_ms: u64,
}

impl AccessGateConfig {
    pub fn new(
        database_id: DatabaseId,
        access_code_collection_id: CollectionId,
        expiration_window_ms: u64,
    ) -> Result<Self, ContractViolation> {
        if expiration_window_ms == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "access_gate_config.expiration_window_ms",
                reason: "must be > 0",
            });
        }
        Ok(Self {
            database_id,
            access_code_collection_id,
            code_attribute: ACCESS_CODE_ATTRIBUTE.to_string(),
            expiration_window_ms,
        })
    }

    pub fn from_env() -> Result<Self, ContractViolation> {
        let database_id = env::var("CRM_DATABASE_ID")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DATABASE_ID_DEFAULT.to_string());
        let collection_id = env::var("CRM_ACCESS_CODE_COLLECTION_ID")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| ACCESS_CODE_COLLECTION_ID_DEFAULT.to_string());
        let expiration_window_ms = env::var("CRM_ACCESS_GATE_EXPIRATION_MS")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|v| (ACCESS_GATE_EXPIRATION_MS_MIN..=ACCESS_GATE_EXPIRATION_MS_MAX).contains(v))
            .unwrap_or(ACCESS_GATE_EXPIRATION_MS_DEFAULT);
        Self::new(
            DatabaseId::new(database_id)?,
            CollectionId::new(collection_id)?,
            expiration_window_ms,
        )
    }
}

#[derive(Debug)]
pub struct AccessGate<S, P> {
    config: AccessGateConfig,
    store: S,
    persistence: P,
    state: AccessGateState,
    verified_at: Option<UnixTimeMs>,
}

impl<S, P> AccessGate<S, P>
where
    S: DocumentStore,
    P: KeyValueStore,
{
    /// Builds the gate and settles its initial state from the persisted record.
    pub fn new(config: AccessGateConfig, store: S, persistence: P, now: UnixTimeMs) -> Self {
        let mut gate = Self {
            config,
            store,
            persistence,
            state: AccessGateState::Unauthenticated,
            verified_at: None,
        };
        gate.check_stored_authorization(now);
        gate
    }

    pub fn config(&self) -> &AccessGateConfig {
        &self.config
    }

    pub fn state(&self) -> AccessGateState {
        self.state
    }

    pub fn is_authorized(&self) -> bool {
        self.state == AccessGateState::Authorized
    }

    pub fn document_store(&self) -> &S {
        &self.store
    }

    pub fn persistence(&self) -> &P {
        &self.persistence
    }

    /// End of the current authorization window, if authorized.
    pub fn authorized_until(&self) -> Option<UnixTimeMs> {
        if !self.is_authorized() {
            return None;
        }
        self.verified_at
            .map(|t| UnixTimeMs(t.0.saturating_add(self.config.expiration_window_ms)))
    }

    pub fn check_stored_authorization(&mut self, now: UnixTimeMs) -> bool {
        let raw = match self.persistence.get(ACCESS_AUTHORIZATION_STORAGE_KEY) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(error = %err, "access gate could not read stored authorization");
                self.discard_stored_record();
                None
            }
        };
        let Some(raw) = raw else {
            self.mark_unauthenticated();
            return false;
        };

        match serde_json::from_str::<AccessAuthorization>(&raw) {
            Ok(record) if record.is_fresh(now, self.config.expiration_window_ms) => {
                self.state = AccessGateState::Authorized;
                self.verified_at = Some(record.verified_at_time());
                tracing::debug!(
                    remaining_ms = record.remaining_ms(now, self.config.expiration_window_ms),
                    "access gate restored stored authorization"
                );
                true
            }
            Ok(_) => {
                tracing::debug!("access gate stored authorization expired");
                self.discard_stored_record();
                self.mark_unauthenticated();
                false
            }
            Err(err) => {
                tracing::warn!(error = %err, "access gate stored authorization is malformed");
                self.discard_stored_record();
                self.mark_unauthenticated();
                false
            }
        }
    }

    /// Looks the code up and remembers a match. The state is `Verifying` only
    /// while the lookup runs inside this call.
    pub fn verify_access_code(&mut self, raw_code: &str, now: UnixTimeMs) -> bool {
        let Some(code) = AccessCode::parse(raw_code) else {
            return false;
        };
        let previous = self.state;
        self.state = AccessGateState::Verifying;

        let queries = [DocumentQuery::equal(
            self.config.code_attribute.clone(),
            code.as_str(),
        )];
        let matched = match self.store.list_documents(
            &self.config.database_id,
            &self.config.access_code_collection_id,
            &queries,
        ) {
            Ok(list) => list
                .documents
                .iter()
                .any(|doc| doc.field_str(&self.config.code_attribute) == Some(code.as_str())),
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    code_fingerprint = %code_fingerprint(&code),
                    "access code lookup failed"
                );
                false
            }
        };

        if !matched {
            self.state = previous;
            tracing::debug!(code_fingerprint = %code_fingerprint(&code), "access code rejected");
            return false;
        }

        self.state = AccessGateState::Authorized;
        self.verified_at = Some(now);
        let record = AccessAuthorization::verified_at(now);
        let persisted = serde_json::to_string(&record)
            .map_err(|err| err.to_string())
            .and_then(|json| {
                self.persistence
                    .set(ACCESS_AUTHORIZATION_STORAGE_KEY, &json)
                    .map_err(|err| err.to_string())
            });
        if let Err(err) = persisted {
            tracing::warn!(error = %err, "access gate could not persist authorization");
        }
        tracing::debug!(code_fingerprint = %code_fingerprint(&code), "access code accepted");
        true
    }

    pub fn reset_authorization(&mut self) {
        self.mark_unauthenticated();
        self.discard_stored_record();
    }

    fn mark_unauthenticated(&mut self) {
        self.state = AccessGateState::Unauthenticated;
        self.verified_at = None;
    }

    fn discard_stored_record(&mut self) {
        if let Err(err) = self.persistence.delete(ACCESS_AUTHORIZATION_STORAGE_KEY) {
            tracing::warn!(error = %err, "access gate could not delete stored authorization");
        }
    }
}

/// Short stable fingerprint so logs can correlate attempts without the code.
pub fn code_fingerprint(code: &AccessCode) -> String {
    let digest = Sha256::digest(code.as_str().as_bytes());
    digest[..4].iter().map(|b| format!("{b:02x}")).collect()
}
