#![forbid(unsafe_code)]

pub mod access;
pub mod common;
pub mod documents;
pub mod pagination;

pub use common::{ContractViolation, UnixTimeMs, Validate};
