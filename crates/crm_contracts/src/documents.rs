#![forbid(unsafe_code)]

use crate::{ContractViolation, Validate};

pub const DOCUMENT_ID_MAX_LEN: usize = 36;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DatabaseId(String);

impl DatabaseId {
    pub fn new(id: impl Into<String>) -> Result<Self, ContractViolation> {
        let v = Self(id.into());
        v.validate()?;
        Ok(v)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for DatabaseId {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_id("database_id", &self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CollectionId(String);

impl CollectionId {
    pub fn new(id: impl Into<String>) -> Result<Self, ContractViolation> {
        let v = Self(id.into());
        v.validate()?;
        Ok(v)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for CollectionId {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_id("collection_id", &self.0)
    }
}

impl std::fmt::Display for DatabaseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Display for CollectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// Backend ids: 1..=36 chars of [A-Za-z0-9._-], no leading special char.
fn validate_id(field: &'static str, id: &str) -> Result<(), ContractViolation> {
    if id.is_empty() {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "must not be empty",
        });
    }
    if id.len() > DOCUMENT_ID_MAX_LEN {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "must be <= 36 chars",
        });
    }
    if id.starts_with(['.', '-', '_']) {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "must not start with a special char",
        });
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
    {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "must contain only [A-Za-z0-9._-]",
        });
    }
    Ok(())
}
