#![forbid(unsafe_code)]

pub mod docs_cli;
pub mod gate_cli;
