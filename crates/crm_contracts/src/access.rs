#![forbid(unsafe_code)]

use crate::common::validate_not_blank;
use crate::{ContractViolation, UnixTimeMs, Validate};

/// Persistence key holding the serialized [`AccessAuthorization`].
pub const ACCESS_AUTHORIZATION_STORAGE_KEY: &str = "accessCodeVerified";
/// Document attribute the access-code collection is filtered on.
pub const ACCESS_CODE_ATTRIBUTE: &str = "code";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessGateState {
    Unauthenticated,
    /// Held only for the duration of a lookup. Lookups block the owning
    /// caller, so with `&mut` access this is never observed from outside.
    Verifying,
    Authorized,
}

impl AccessGateState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::Verifying => "VERIFYING",
            Self::Authorized => "AUTHORIZED",
        }
    }
}

/// Locally remembered proof that an access code was accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AccessAuthorization {
    pub verified: bool,
    pub timestamp: u64,
}

impl AccessAuthorization {
    pub fn verified_at(now: UnixTimeMs) -> Self {
        Self {
            verified: true,
            timestamp: now.0,
        }
    }

    pub fn verified_at_time(&self) -> UnixTimeMs {
        UnixTimeMs(self.timestamp)
    }

    /// A record is honored only while `now - timestamp < window_ms`.
    pub fn is_fresh(&self, now: UnixTimeMs, window_ms: u64) -> bool {
        self.verified && now.saturating_elapsed_since(self.verified_at_time()) < window_ms
    }

    pub fn remaining_ms(&self, now: UnixTimeMs, window_ms: u64) -> u64 {
        if !self.verified {
            return 0;
        }
        window_ms.saturating_sub(now.saturating_elapsed_since(self.verified_at_time()))
    }
}

/// User-supplied access code, trimmed on construction.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct AccessCode(String);

impl AccessCode {
    /// Returns `None` for blank input so callers can short-circuit before any I/O.
    /// Length is not capped; the backend decides what a valid code is.
    pub fn parse(raw: &str) -> Option<Self> {
        let v = Self(raw.trim().to_string());
        v.validate().ok()?;
        Some(v)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AccessCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessCode(<redacted>)")
    }
}

impl Validate for AccessCode {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_not_blank("access_code", &self.0)
    }
}
