#![forbid(unsafe_code)]

use crm_contracts::UnixTimeMs;
use crm_engines::document_store::DocumentStore;
use crm_os::access_gate::AccessGate;
use crm_storage::KeyValueStore;

pub const GATE_USAGE: &str = "usage: crm gate <status|verify|reset>";

pub fn execute_gate_command<S, P>(
    gate: &mut AccessGate<S, P>,
    subcommand: &str,
    code: Option<&str>,
    now: UnixTimeMs,
) -> Result<String, String>
where
    S: DocumentStore,
    P: KeyValueStore,
{
    match subcommand {
        "status" => {
            gate.check_stored_authorization(now);
            Ok(status_line(gate, now))
        }
        "verify" => {
            let code = code.ok_or_else(|| "missing access code input".to_string())?;
            if gate.verify_access_code(code, now) {
                Ok(status_line(gate, now))
            } else {
                Err("access denied".to_string())
            }
        }
        "reset" => {
            gate.reset_authorization();
            Ok("OK".to_string())
        }
        _ => Err(format!(
            "unknown gate subcommand: {subcommand}. expected one of: status, verify, reset"
        )),
    }
}

fn status_line<S, P>(gate: &AccessGate<S, P>, now: UnixTimeMs) -> String
where
    S: DocumentStore,
    P: KeyValueStore,
{
    match gate.authorized_until() {
        Some(until) => format!(
            "{} (expires in {}s)",
            gate.state().as_str(),
            until.0.saturating_sub(now.0) / 1_000
        ),
        None => gate.state().as_str().to_string(),
    }
}
