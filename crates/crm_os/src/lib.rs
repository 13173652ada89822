#![forbid(unsafe_code)]

pub mod access_gate;
pub mod collection_pages;
pub mod pagination;
