#![forbid(unsafe_code)]

use std::env;
use std::io::{self, IsTerminal, Read};

use crm_contracts::UnixTimeMs;
use crm_engines::document_store::DocumentStoreRuntime;
use crm_os::access_gate::{AccessGate, AccessGateConfig};
use crm_os::pagination::default_page_size_from_env;
use crm_storage::FileKeyValueStore;
use crm_tools::docs_cli::execute_docs_command;
use crm_tools::gate_cli::{execute_gate_command, GATE_USAGE};

const USAGE: &str = "usage: crm <gate|docs> ...";

fn main() {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(2);
    }
}

fn run() -> Result<(), String> {
    let args: Vec<String> = env::args().skip(1).collect();
    let command = args.first().ok_or_else(|| USAGE.to_string())?.as_str();

    let now = UnixTimeMs::now();
    let config = AccessGateConfig::from_env().map_err(|e| format!("invalid gate config: {e}"))?;
    let store = DocumentStoreRuntime::from_env().map_err(|e| e.to_string())?;
    let mut gate = AccessGate::new(
        config,
        store,
        FileKeyValueStore::default_local(),
        now,
    );

    let output = match command {
        "gate" => {
            let subcommand = args.get(1).ok_or_else(|| GATE_USAGE.to_string())?.as_str();
            let code = if subcommand == "verify" {
                Some(read_access_code()?)
            } else {
                None
            };
            execute_gate_command(&mut gate, subcommand, code.as_deref(), now)?
        }
        "docs" => execute_docs_command(
            &gate,
            args.get(1).map(String::as_str),
            args.get(2).map(String::as_str),
            args.get(3).map(String::as_str),
            default_page_size_from_env(),
        )?,
        _ => return Err(USAGE.to_string()),
    };
    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}

fn read_access_code() -> Result<String, String> {
    let code = if io::stdin().is_terminal() {
        rpassword::prompt_password("Access code:").map_err(|e| e.to_string())?
    } else {
        let mut input = String::new();
        io::stdin()
            .read_to_string(&mut input)
            .map_err(|e| e.to_string())?;
        input
    };
    let trimmed = code.trim().to_string();
    if trimmed.is_empty() {
        return Err("access code must not be empty".to_string());
    }
    Ok(trimmed)
}
